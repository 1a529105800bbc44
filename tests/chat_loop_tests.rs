//! Turn loop: assembly, stop decisions, commit and failure behavior.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use common::*;
use parley::agent::ChatAgent;
use parley::chat::{ChatAnalyticsHook, ChatCompletionHook, ChatService};
use parley::client::StaticModelRegistry;
use parley::config::{ChatConfigOverride, ChatServiceConfig};
use parley::error::{ParleyError, Result};
use parley::tools::{AgentTool, AgentToolParameters, Tool};
use parley::types::*;
use parley::util::retry::RetryPolicy;

fn agent_with(service: &ChatService, layer: ChatConfigOverride, io: Arc<RecordingIo>, headless: bool) -> ChatAgent {
    service
        .attach("tester", &layer)
        .unwrap()
        .with_io(io)
        .with_headless(headless)
}

fn prompt(text: &str) -> ChatConfigOverride {
    ChatConfigOverride {
        system_prompt: Some(text.into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn first_turn_sends_system_and_current_message_only() {
    let client = Arc::new(ScriptedClient::new("scripted", 10_000));
    client.queue_text("Hi there");
    let service = service_with(client.clone());
    let io = RecordingIo::new();
    let mut agent = agent_with(&service, prompt("Be brief."), io.clone(), false);

    let (text, response) = service.submit_turn(&mut agent, "hello").await.unwrap();

    assert_eq!(text, "Hi there");
    assert_eq!(response.text(), "Hi there");
    let call = &client.calls()[0];
    assert_eq!(roles(&call.messages), vec![Role::System, Role::User]);
    assert_eq!(texts(&call.messages), vec!["Be brief.", "hello"]);
    assert!(call.tool_names.is_empty());

    assert_eq!(agent.state().messages().len(), 1);
    assert!(io.info_lines().contains(&"Using model scripted".to_string()));
    assert_eq!(io.last_busy(), Some(None));
}

#[tokio::test]
async fn follow_up_turn_replays_previous_exchange() {
    let client = Arc::new(ScriptedClient::new("scripted", 10_000));
    client.queue_text("Hi there").queue_text("Sure");
    let service = service_with(client.clone());
    let mut agent = agent_with(&service, prompt("Be brief."), RecordingIo::new(), false);

    service.submit_turn(&mut agent, "hello").await.unwrap();
    service.submit_turn(&mut agent, "again").await.unwrap();

    let second = &client.calls()[1];
    assert_eq!(texts(&second.messages), vec!["Be brief.", "hello", "Hi there", "again"]);
    assert_eq!(agent.state().messages().len(), 2);
}

#[tokio::test]
async fn headless_agent_stops_after_exceeding_max_steps() {
    let client = Arc::new(ScriptedClient::new("scripted", 10_000));
    client.queue(Script::Endless(ScriptedStep::text("working")));
    let service = service_with(client.clone());
    let layer = ChatConfigOverride {
        max_steps: Some(3),
        ..Default::default()
    };
    let io = RecordingIo::new();
    let mut agent = agent_with(&service, layer, io.clone(), true);

    let outcome = service
        .submit_turn_with(&mut agent, "go", &ChatConfigOverride::default())
        .await
        .unwrap();

    assert_eq!(outcome.stop_reason, StopReason::MaxSteps);
    assert_eq!(outcome.steps, 4);
    assert_eq!(client.calls()[0].steps_run, 4);
    assert_eq!(agent.state().messages().len(), 1);
    assert_eq!(io.times_asked(), 0);
}

#[tokio::test]
async fn interactive_agent_is_asked_to_continue_past_the_limit() {
    let client = Arc::new(ScriptedClient::new("scripted", 10_000));
    client.queue(Script::Endless(ScriptedStep::text(".")));
    let service = service_with(client.clone());
    let layer = ChatConfigOverride {
        max_steps: Some(2),
        ..Default::default()
    };
    let io = RecordingIo::new();
    io.answer(Some(true));
    // second prompt goes unanswered and falls back to "stop"
    io.answer(None);
    let mut agent = agent_with(&service, layer, io.clone(), false);

    let outcome = service
        .submit_turn_with(&mut agent, "go", &ChatConfigOverride::default())
        .await
        .unwrap();

    assert_eq!(outcome.stop_reason, StopReason::MaxSteps);
    assert_eq!(outcome.steps, 4);
    assert_eq!(
        io.prompt_messages()[0],
        "The agent has completed 3 steps, which is longer than your configured limit of 2. Would you like to continue?"
    );
    assert!(!io.prompts.lock().unwrap()[0].default);
}

#[tokio::test]
async fn long_step_stops_regardless_of_step_count() {
    let client = Arc::new(ScriptedClient::new("scripted", 1000));
    client.queue(Script::Steps(vec![
        ScriptedStep::text("reading").with_usage(900, 50),
        ScriptedStep::text("never reached"),
    ]));
    let service = service_with(client.clone());
    let layer = ChatConfigOverride {
        auto_compact: Some(false),
        ..Default::default()
    };
    let io = RecordingIo::new();
    io.answer(Some(false));
    let mut agent = agent_with(&service, layer, io.clone(), false);

    let outcome = service
        .submit_turn_with(&mut agent, "go", &ChatConfigOverride::default())
        .await
        .unwrap();

    assert_eq!(outcome.stop_reason, StopReason::LongContext);
    assert_eq!(outcome.steps, 1);
    assert_eq!(outcome.output, "reading");
    assert_eq!(
        io.prompt_messages(),
        vec!["Context is getting long. Would you like to compact it to save tokens?"]
    );
    // declined compaction keeps the turn as-is
    assert_eq!(agent.state().messages().len(), 1);
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn long_context_compacts_and_continues_with_remaining_budget() {
    let client = Arc::new(ScriptedClient::new("scripted", 1000));
    client
        .queue(Script::Steps(vec![
            ScriptedStep::text("step one "),
            ScriptedStep::text("step two").with_usage(940, 10),
        ]))
        .queue_text("summary of work")
        .queue_text("done");
    let service = service_with(client.clone());
    let layer = ChatConfigOverride {
        max_steps: Some(5),
        ..prompt("Be brief.")
    };
    let io = RecordingIo::new();
    let mut agent = agent_with(&service, layer, io.clone(), false);

    let outcome = service
        .submit_turn_with(&mut agent, "build it", &ChatConfigOverride::default())
        .await
        .unwrap();

    assert_eq!(outcome.output, "done");
    assert_eq!(outcome.stop_reason, StopReason::Finished);
    assert_eq!(client.call_count(), 3);

    let continuation = &client.calls()[2];
    assert_eq!(continuation.messages.last().unwrap().text(), "Continue");
    assert_eq!(
        texts(&continuation.messages),
        vec!["Be brief.", "summary of work", "Continue"]
    );

    let info = io.info_lines();
    assert!(info.contains(&"Context is getting long. Compacting context...".to_string()));
    assert!(info.contains(&"Context compacted, and agent still has work to do. Continuing work...".to_string()));
    // the summary turn plus the continued turn
    assert_eq!(agent.state().messages().len(), 2);
    assert_eq!(io.times_asked(), 0);
    assert_eq!(io.last_busy(), Some(None));
}

#[tokio::test]
async fn continuation_is_capped_by_the_remaining_step_budget() {
    let client = Arc::new(ScriptedClient::new("scripted", 1000));
    client
        .queue(Script::Steps(vec![
            ScriptedStep::text("one"),
            ScriptedStep::text("two").with_usage(940, 10),
        ]))
        .queue_text("summary")
        .queue(Script::Endless(ScriptedStep::text(".")));
    let service = service_with(client.clone());
    let layer = ChatConfigOverride {
        max_steps: Some(5),
        ..Default::default()
    };
    let mut agent = agent_with(&service, layer, RecordingIo::new(), true);

    let outcome = service
        .submit_turn_with(&mut agent, "keep going", &ChatConfigOverride::default())
        .await
        .unwrap();

    // two steps were spent before compacting, leaving three; the fourth trips the limit
    assert_eq!(outcome.stop_reason, StopReason::MaxSteps);
    assert_eq!(outcome.steps, 4);
    assert_eq!(client.call_count(), 3);
    assert_eq!(client.calls()[0].steps_run, 2);
    assert_eq!(client.calls()[2].steps_run, 4);
}

#[tokio::test]
async fn failed_stream_leaves_history_untouched() {
    let client = Arc::new(ScriptedClient::new("scripted", 10_000));
    client.queue_text("first").queue(Script::Fail("connection reset".into()));
    let service = service_with(client.clone());
    let io = RecordingIo::new();
    let mut agent = agent_with(&service, ChatConfigOverride::default(), io.clone(), false);

    service.submit_turn(&mut agent, "one").await.unwrap();
    let before = agent.state().messages().to_vec();

    let err = service.submit_turn(&mut agent, "two").await.unwrap_err();

    assert!(matches!(err, ParleyError::TurnFailed(_)));
    assert!(err.to_string().contains("prior conversation history was not modified"));
    assert_eq!(agent.state().messages(), before.as_slice());
    assert_eq!(io.last_busy(), Some(None));
}

#[tokio::test(start_paused = true)]
async fn missing_client_exhausts_backoff() {
    let service = ChatService::new(ChatServiceConfig::default(), Arc::new(StaticModelRegistry::new()))
        .with_retry_policy(RetryPolicy {
            jitter: false,
            ..Default::default()
        });
    let io = RecordingIo::new();
    let mut agent = agent_with(&service, ChatConfigOverride::default(), io.clone(), true);

    let err = service.submit_turn(&mut agent, "hello").await.unwrap_err();

    assert!(matches!(err, ParleyError::NoClient { ref model, attempts: 5 } if model == "auto"));
    assert!(agent.state().messages().is_empty());
    assert_eq!(
        io.busy.lock().unwrap().first().cloned().flatten().as_deref(),
        Some("Waiting for an online model to respond...")
    );
    assert_eq!(io.last_busy(), Some(None));
}

struct CountingHook {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl ChatCompletionHook for CountingHook {
    async fn after_chat_completion(&self, agent: &ChatAgent, output: &str, _response: &ChatResponse) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(agent.state().messages().len(), self.calls.load(Ordering::SeqCst));
        assert_eq!(output, "ok");
        if self.fail {
            return Err(ParleyError::InvalidState("hook exploded".into()));
        }
        Ok(())
    }
}

#[tokio::test]
async fn hooks_run_after_commit_and_cannot_fail_the_turn() {
    let client = Arc::new(ScriptedClient::new("scripted", 10_000));
    let hook = Arc::new(CountingHook {
        calls: AtomicUsize::new(0),
        fail: true,
    });
    let service = service_with(client).with_hook(hook.clone());
    let mut agent = agent_with(&service, ChatConfigOverride::default(), RecordingIo::new(), false);

    service.submit_turn(&mut agent, "a").await.unwrap();
    service.submit_turn(&mut agent, "b").await.unwrap();

    assert_eq!(hook.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn analytics_hook_reports_usage_after_each_turn() {
    let client = Arc::new(ScriptedClient::new("scripted", 10_000));
    let service = service_with(client).with_hook(Arc::new(ChatAnalyticsHook::new()));
    let io = RecordingIo::new();
    let mut agent = agent_with(&service, ChatConfigOverride::default(), io.clone(), false);

    service.submit_turn(&mut agent, "hello").await.unwrap();

    let info = io.info_lines();
    assert!(info.contains(&"[Chat Complete] Input Tokens: 10, Output: 20, Total: 30".to_string()));
    assert!(info.contains(&"[Chat Complete] Time: 0.00s, Throughput: N/A tokens/sec".to_string()));
    assert!(!info.iter().any(|line| line.contains("Input Cost")));
}

#[tokio::test]
async fn stored_request_drops_tools_but_keeps_settings() {
    let client = Arc::new(ScriptedClient::new("scripted", 10_000));
    let mut service = service_with(client.clone());
    let tool: Arc<dyn Tool> = Arc::new(AgentTool::new(
        "status",
        "repo status",
        AgentToolParameters::empty(),
        |_args, _ctx| async { Ok(serde_json::json!("clean")) },
    ));
    service.register_tools("git", vec![tool]).unwrap();

    let layer = ChatConfigOverride {
        enabled_tools: Some(vec!["git/*".into()]),
        settings: Some(GenerationSettings::builder().temperature(0.2).build()),
        ..Default::default()
    };
    let mut agent = agent_with(&service, layer, RecordingIo::new(), false);

    service.submit_turn(&mut agent, "status?").await.unwrap();

    assert_eq!(client.calls()[0].tool_names, vec!["git_status"]);
    let stored = &agent.state().messages()[0];
    assert_eq!(stored.request.settings.temperature, Some(0.2));
    let json = serde_json::to_value(stored).unwrap();
    assert!(json["request"].get("tools").is_none());
}
