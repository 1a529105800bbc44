//! Context assembly: turns one line of input into the ordered message list of a request.
//!
//! A request is built from the [`ContextSource`] list the config selects for
//! the turn (`initial` before the first committed turn, `follow_up` after).
//! Each source names a [`ContextHandler`]; handlers yield lazily and their
//! output is concatenated in source order. Nothing is cached between turns.

pub mod handlers;

pub use handlers::{
    default_handlers, CurrentMessageHandler, PriorMessagesHandler, SystemMessageHandler, ToolCallHandler,
    ToolContextHandler, PRIOR_MESSAGES_PLACEHOLDER,
};

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};

use crate::agent::ChatAgent;
use crate::config::{ChatConfig, ContextSource};
use crate::error::{ParleyError, Result};
use crate::tools::ToolRegistry;
use crate::types::ModelMessage;

/// Everything a handler may look at while producing messages.
#[derive(Clone, Copy)]
pub struct ContextScope<'a> {
    pub input: &'a str,
    pub config: &'a ChatConfig,
    pub source: &'a ContextSource,
    pub agent: &'a ChatAgent,
    pub tools: &'a ToolRegistry,
    pub handlers: &'a ContextHandlerRegistry,
}

impl<'a> ContextScope<'a> {
    /// The same scope pointed at a different source.
    pub fn with_source(self, source: &'a ContextSource) -> ContextScope<'a> {
        ContextScope { source, ..self }
    }
}

/// A named producer of context messages.
///
/// The returned stream is finite and consumed exactly once.
pub trait ContextHandler: Send + Sync {
    fn produce<'a>(&'a self, scope: ContextScope<'a>) -> BoxStream<'a, Result<ModelMessage>>;
}

type EagerProducer = dyn for<'a> Fn(ContextScope<'a>) -> Result<Vec<ModelMessage>> + Send + Sync;

/// A handler backed by a synchronous closure.
pub struct FnContextHandler {
    produce: Box<EagerProducer>,
}

impl FnContextHandler {
    pub fn new<F>(produce: F) -> Self
    where
        F: for<'a> Fn(ContextScope<'a>) -> Result<Vec<ModelMessage>> + Send + Sync + 'static,
    {
        Self {
            produce: Box::new(produce),
        }
    }
}

impl ContextHandler for FnContextHandler {
    fn produce<'a>(&'a self, scope: ContextScope<'a>) -> BoxStream<'a, Result<ModelMessage>> {
        match (self.produce)(scope) {
            Ok(messages) => stream::iter(messages.into_iter().map(Ok)).boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }
}

/// Context handlers by name.
#[derive(Default)]
pub struct ContextHandlerRegistry {
    handlers: HashMap<String, Arc<dyn ContextHandler>>,
}

impl ContextHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding [`default_handlers`].
    pub fn with_defaults() -> Self {
        Self {
            handlers: default_handlers()
                .into_iter()
                .map(|(name, handler)| (name.to_string(), handler))
                .collect(),
        }
    }

    /// Registering a name twice is an error.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ContextHandler>) -> Result<()> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(ParleyError::duplicate("Context handler", name));
        }
        tracing::debug!(handler = %name, "registered context handler");
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn register_all<I, S>(&mut self, handlers: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Arc<dyn ContextHandler>)>,
        S: Into<String>,
    {
        for (name, handler) in handlers {
            self.register(name, handler)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ContextHandler>> {
        self.handlers.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&Arc<dyn ContextHandler>> {
        self.get(name)
            .ok_or_else(|| ParleyError::UnknownContextHandler(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Assembles request messages from the registered handlers.
pub struct ContextPipeline<'a> {
    pub tools: &'a ToolRegistry,
    pub handlers: &'a ContextHandlerRegistry,
}

impl<'a> ContextPipeline<'a> {
    pub fn new(tools: &'a ToolRegistry, handlers: &'a ContextHandlerRegistry) -> Self {
        Self { tools, handlers }
    }

    pub async fn assemble(&self, input: &str, config: &ChatConfig, agent: &ChatAgent) -> Result<Vec<ModelMessage>> {
        let first_turn = agent.state().last_turn().is_none();
        let sources = if first_turn {
            &config.context.initial
        } else {
            &config.context.follow_up
        };

        let mut messages = Vec::new();
        for source in sources {
            let handler = self.handlers.require(&source.kind)?;
            let scope = ContextScope {
                input,
                config,
                source,
                agent,
                tools: self.tools,
                handlers: self.handlers,
            };
            let mut produced = handler.produce(scope);
            while let Some(message) = produced.next().await {
                messages.push(message?);
            }
        }

        tracing::debug!(
            agent = %agent.name(),
            first_turn,
            messages = messages.len(),
            "assembled context"
        );
        Ok(messages)
    }
}
