//! Parley: the conversational core of an AI chat agent.
//!
//! Owns per-agent conversation state, assembles each request from a
//! pluggable set of context handlers, drives the multi-step request loop
//! against an external model client, and compacts history when it grows
//! too close to the model's context window.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use parley::prelude::*;
//!
//! # async fn example(client: Arc<dyn ChatClient>) -> parley::error::Result<()> {
//! let models = StaticModelRegistry::new().with_client(client);
//! let service = ChatService::new(ChatServiceConfig::default(), Arc::new(models));
//!
//! let mut agent = service.attach("assistant", &ChatConfigOverride::default())?;
//! let (text, _response) = service.submit_turn(&mut agent, "Hello!").await?;
//! println!("{text}");
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod chat;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod prelude;
pub mod stop;
pub mod tools;
pub mod types;
pub mod util;
