//! Context assembly through the service's handler registry.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::*;
use parley::config::{ChatConfigOverride, ContextConfig, ContextSource, SystemPrompt};
use parley::context::{ContextHandler, FnContextHandler, PRIOR_MESSAGES_PLACEHOLDER};
use parley::error::ParleyError;
use parley::tools::{AgentTool, AgentToolParameters, Tool};
use parley::types::*;

fn tool_needing(name: &str, handlers: &[&str]) -> Arc<dyn Tool> {
    Arc::new(
        AgentTool::new(name, "test tool", AgentToolParameters::empty(), |_args, _ctx| async {
            Ok(serde_json::json!("ok"))
        })
        .with_required_context(handlers.iter().copied()),
    )
}

#[tokio::test]
async fn tool_context_runs_each_required_handler_once() {
    let client = Arc::new(ScriptedClient::new("scripted", 10_000));
    let mut service = service_with(client.clone());

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let repo_map: Arc<dyn ContextHandler> = Arc::new(FnContextHandler::new(move |_scope| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(vec![ModelMessage::user("repo map")])
    }));
    let style: Arc<dyn ContextHandler> = Arc::new(FnContextHandler::new(|scope| {
        Ok(vec![ModelMessage::user(format!("style guide for {}", scope.agent.name()))])
    }));
    service
        .register_context_handlers(vec![("repo-map", repo_map), ("style-guide", style)])
        .unwrap();
    service
        .register_tools(
            "code",
            vec![
                tool_needing("edit", &["repo-map", "style-guide"]),
                tool_needing("search", &["repo-map"]),
            ],
        )
        .unwrap();

    let layer = ChatConfigOverride {
        system_prompt: Some("sys".into()),
        enabled_tools: Some(vec!["code/*".into()]),
        ..Default::default()
    };
    let mut agent = service.attach("coder", &layer).unwrap();

    service.submit_turn(&mut agent, "refactor").await.unwrap();

    assert_eq!(
        texts(&client.calls()[0].messages),
        vec!["sys", "repo map", "style guide for coder", "refactor"]
    );
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_source_type_is_a_configuration_error() {
    let client = Arc::new(ScriptedClient::new("scripted", 10_000));
    let service = service_with(client.clone());
    let layer = ChatConfigOverride {
        context: Some(ContextConfig {
            initial: vec![ContextSource::new("memories"), ContextSource::new("current-message")],
            follow_up: Vec::new(),
        }),
        ..Default::default()
    };
    let mut agent = service.attach("a", &layer).unwrap();

    let err = service.submit_turn(&mut agent, "hi").await.unwrap_err();

    assert!(matches!(err, ParleyError::UnknownContextHandler(ref name) if name == "memories"));
    assert_eq!(client.call_count(), 0);
    assert!(agent.state().messages().is_empty());
}

#[tokio::test]
async fn template_prompt_is_rendered_per_request() {
    let client = Arc::new(ScriptedClient::new("scripted", 10_000));
    let service = service_with(client.clone());
    let layer = ChatConfigOverride {
        system_prompt: Some(SystemPrompt::template(|agent| {
            format!("You are {}.", agent.name())
        })),
        ..Default::default()
    };
    let agent = service.attach("navigator", &layer).unwrap();

    let messages = service
        .build_chat_messages("hi", agent.state().config(), &agent)
        .await
        .unwrap();

    assert_eq!(texts(&messages), vec!["You are navigator.", "hi"]);
}

#[tokio::test]
async fn tool_call_source_injects_tool_output() {
    let client = Arc::new(ScriptedClient::new("scripted", 10_000));
    let mut service = service_with(client);
    let listing: Arc<dyn Tool> = Arc::new(AgentTool::new(
        "list",
        "list files",
        AgentToolParameters::object().string("dir", "directory", true).build(),
        |args, _ctx| async move {
            let dir = args.get_str("dir")?;
            Ok(serde_json::json!({ "dir": dir, "files": ["a.rs"] }))
        },
    ));
    service.register_tools("fs", vec![listing]).unwrap();

    let source = ContextSource::new("tool-call")
        .with_param("role", "system")
        .with_param("header", "## Project files")
        .with_param("toolName", "fs/list")
        .with_param("toolInput", serde_json::json!({ "dir": "src" }));
    let layer = ChatConfigOverride {
        context: Some(ContextConfig {
            initial: vec![source, ContextSource::new("current-message")],
            follow_up: Vec::new(),
        }),
        ..Default::default()
    };
    let agent = service.attach("a", &layer).unwrap();

    let messages = service
        .build_chat_messages("hi", agent.state().config(), &agent)
        .await
        .unwrap();

    assert_eq!(messages[0].role, Role::System);
    assert_eq!(
        messages[0].text(),
        "## Project files\n\n{\n  \"dir\": \"src\",\n  \"files\": [\n    \"a.rs\"\n  ]\n}"
    );
}

#[tokio::test]
async fn tool_call_source_rejects_bad_params() {
    let client = Arc::new(ScriptedClient::new("scripted", 10_000));
    let service = service_with(client);
    let layer = ChatConfigOverride {
        context: Some(ContextConfig {
            initial: vec![ContextSource::new("tool-call").with_param("role", "assistant")],
            follow_up: Vec::new(),
        }),
        ..Default::default()
    };
    let agent = service.attach("a", &layer).unwrap();

    let err = service
        .build_chat_messages("hi", agent.state().config(), &agent)
        .await
        .unwrap_err();

    assert!(matches!(err, ParleyError::InvalidContextParams { ref handler, .. } if handler == "tool-call"));
}

#[tokio::test]
async fn prior_messages_collapse_long_history() {
    let client = Arc::new(ScriptedClient::new("scripted", 10_000));
    client.queue(Script::Steps(
        (0..8).map(|i| ScriptedStep::text(&format!("r{i}"))).collect(),
    ));
    let service = service_with(client.clone());
    let layer = ChatConfigOverride {
        system_prompt: Some("sys".into()),
        context: Some(ContextConfig {
            follow_up: vec![
                ContextSource::new("prior-messages").with_param("maxMessages", 4),
                ContextSource::new("current-message"),
            ],
            ..Default::default()
        }),
        ..Default::default()
    };
    let mut agent = service.attach("a", &layer).unwrap();
    service.submit_turn(&mut agent, "q").await.unwrap();

    let messages = service
        .build_chat_messages("next", agent.state().config(), &agent)
        .await
        .unwrap();

    // sys, q, r0..r7 is ten messages; two survive on each side
    assert_eq!(
        texts(&messages),
        vec!["sys", "q", PRIOR_MESSAGES_PLACEHOLDER, "r6", "r7", "next"]
    );
}

#[tokio::test]
async fn context_preview_lists_everything_but_the_input() {
    let client = Arc::new(ScriptedClient::new("scripted", 10_000));
    let service = service_with(client);
    let long_prompt = "x".repeat(150);
    let layer = ChatConfigOverride {
        system_prompt: Some(long_prompt.as_str().into()),
        ..Default::default()
    };
    let agent = service.attach("a", &layer).unwrap();

    let lines = service.context_preview(&agent).await.unwrap();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "Total messages: 2");
    assert_eq!(lines[1], format!("1. [system] {}...", "x".repeat(130)));
}
