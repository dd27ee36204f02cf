//! Tests for the Coordinator (component C7, spec §4.7): task submission,
//! cancellation idempotence, and scenario 5 from spec §8 (cancellation
//! mid-tool-call never produces a `task_complete`).

use std::sync::Arc;
use std::time::Duration;

use alex_events::{Event, EventKind, ErrorKind, Redactor};
use alex_llm::{ChatMessage, CompletionResponse, FinishReason, MockLlmPort, ToolCallRequest};
use alex_session::domain::TaskStatus;
use alex_session::FileSessionStore;
use alex_tools::builtins::EchoTool;
use alex_tools::{ChunkSink, Tool, ToolContext, ToolError, ToolRegistry, ToolSpec};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::*;
use crate::broadcaster::{Broadcaster, BroadcasterConfig};
use crate::policy::EnginePolicy;

/// A tool that sleeps far longer than any test's patience, so a test can
/// reliably observe `tool_call_start` before cancelling.
struct SleepForeverTool;

#[async_trait]
impl Tool for SleepForeverTool {
    fn spec(&self) -> &ToolSpec {
        static SPEC: std::sync::OnceLock<ToolSpec> = std::sync::OnceLock::new();
        SPEC.get_or_init(|| ToolSpec {
            name: "sleep_forever",
            description: "never returns on its own",
            arguments_schema: json!({"type": "object"}),
            capabilities: vec![],
            default_timeout: Duration::from_secs(3600),
            supports_streaming: false,
            parallel_safe: false,
        })
    }

    async fn invoke(&self, _args: Value, _ctx: &ToolContext, _chunks: Option<ChunkSink>) -> Result<String, ToolError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("never".into())
    }
}

fn test_coordinator(llm: MockLlmPort, root: &std::path::Path) -> (Coordinator, Broadcaster) {
    let broadcaster = Broadcaster::new(BroadcasterConfig {
        ingest_capacity: 64,
        subscriber_queue_size: 64,
        replay_window: 64,
    });
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool));
    registry.register(Arc::new(SleepForeverTool));

    let deps = CoordinatorDeps {
        session_store: Arc::new(FileSessionStore::new(root)),
        tools: Arc::new(registry),
        llm: Arc::new(llm),
        broadcaster: broadcaster.clone(),
        policy: EnginePolicy {
            task_timeout: Duration::from_secs(60),
            tool_force_kill_grace: Duration::from_millis(50),
            ..EnginePolicy::default()
        },
        redactor: Arc::new(Redactor::new(&[])),
    };
    (Coordinator::new(deps), broadcaster)
}

async fn next_event(subscriber: &crate::broadcaster::Subscriber) -> Event {
    tokio::time::timeout(Duration::from_secs(2), subscriber.recv())
        .await
        .expect("event within timeout")
        .expect("subscriber still live")
}

#[tokio::test]
async fn submit_task_eventually_emits_task_started_then_completes() {
    let dir = tempfile::tempdir().unwrap();
    let llm = MockLlmPort::new(vec![Ok(CompletionResponse {
        message: ChatMessage::assistant("done"),
        finish_reason: FinishReason::Stop,
        usage: None,
    })]);
    let (coordinator, broadcaster) = test_coordinator(llm, dir.path());
    let subscriber = broadcaster.subscribe("s1");

    let task_id = coordinator
        .submit_task("u1", "s1", "hello", Vec::new())
        .await
        .unwrap();

    assert!(matches!(next_event(&subscriber).await.kind, EventKind::TaskStarted));

    // Poll until the background task flips to a terminal status.
    for _ in 0..50 {
        if matches!(coordinator.get_task("u1", &task_id).unwrap(), TaskStatus::Completed) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(coordinator.get_task("u1", &task_id).unwrap(), TaskStatus::Completed);
}

#[tokio::test]
async fn get_task_for_unknown_id_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _broadcaster) = test_coordinator(MockLlmPort::new(vec![]), dir.path());
    let err = coordinator.get_task("u1", "nope").unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn cancel_task_for_unknown_id_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _broadcaster) = test_coordinator(MockLlmPort::new(vec![]), dir.path());
    let err = coordinator.cancel_task("u1", "nope").unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

/// Spec §8 round-trip property: cancelling an already-terminal task is a
/// no-op returning current status, not an error.
#[tokio::test]
async fn cancelling_an_already_terminal_task_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let llm = MockLlmPort::new(vec![Ok(CompletionResponse {
        message: ChatMessage::assistant("done"),
        finish_reason: FinishReason::Stop,
        usage: None,
    })]);
    let (coordinator, broadcaster) = test_coordinator(llm, dir.path());
    let subscriber = broadcaster.subscribe("s1");
    let task_id = coordinator
        .submit_task("u1", "s1", "hello", Vec::new())
        .await
        .unwrap();

    loop {
        let event = next_event(&subscriber).await;
        if event.is_terminal() {
            break;
        }
    }
    for _ in 0..50 {
        if coordinator.get_task("u1", &task_id).unwrap() == TaskStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Still succeeds (no error) and status is unchanged.
    coordinator.cancel_task("u1", &task_id).unwrap();
    assert_eq!(coordinator.get_task("u1", &task_id).unwrap(), TaskStatus::Completed);
}

/// Spec §3 invariant 5: a task belongs to the user who submitted it, and
/// `GetTask`/`CancelTask` must reject a different caller with `unauthorized`
/// rather than leaking status or honoring the cancellation.
#[tokio::test]
async fn get_and_cancel_task_reject_a_different_user() {
    let dir = tempfile::tempdir().unwrap();
    let llm = MockLlmPort::new(vec![Ok(CompletionResponse {
        message: ChatMessage::assistant("done"),
        finish_reason: FinishReason::Stop,
        usage: None,
    })]);
    let (coordinator, _broadcaster) = test_coordinator(llm, dir.path());
    let task_id = coordinator
        .submit_task("u1", "s1", "hello", Vec::new())
        .await
        .unwrap();

    assert!(matches!(
        coordinator.get_task("u2", &task_id).unwrap_err(),
        EngineError::Unauthorized
    ));
    assert!(matches!(
        coordinator.cancel_task("u2", &task_id).unwrap_err(),
        EngineError::Unauthorized
    ));
    // The owning user can still see it; the other user's failed attempt
    // must not have cancelled it.
    assert!(coordinator.get_task("u1", &task_id).is_ok());
}

/// Scenario 5 (spec §8): cancelling mid-tool-call yields `error(kind=cancelled)`
/// and a `cancelled` task status, never `task_complete`.
#[tokio::test]
async fn cancellation_mid_tool_call_never_completes() {
    let dir = tempfile::tempdir().unwrap();
    let mut calls_sleep_tool = ChatMessage::assistant("");
    calls_sleep_tool.tool_calls = Some(vec![ToolCallRequest {
        id: "c1".into(),
        name: "sleep_forever".into(),
        arguments: json!({}),
    }]);
    let llm = MockLlmPort::new(vec![Ok(CompletionResponse {
        message: calls_sleep_tool,
        finish_reason: FinishReason::ToolCalls,
        usage: None,
    })]);
    let (coordinator, broadcaster) = test_coordinator(llm, dir.path());
    let subscriber = broadcaster.subscribe("s1");

    let task_id = coordinator
        .submit_task("u1", "s1", "run a long command", Vec::new())
        .await
        .unwrap();

    let mut saw_tool_start = false;
    let mut saw_cancelled_error = false;
    let mut saw_task_complete = false;
    loop {
        let event = next_event(&subscriber).await;
        match event.kind {
            EventKind::ToolCallStart { .. } if !saw_tool_start => {
                saw_tool_start = true;
                coordinator.cancel_task("u1", &task_id).unwrap();
            }
            EventKind::Error { kind: ErrorKind::Cancelled, .. } => {
                saw_cancelled_error = true;
                break;
            }
            EventKind::TaskComplete { .. } => {
                saw_task_complete = true;
                break;
            }
            _ => {}
        }
    }

    assert!(saw_tool_start, "expected to observe tool_call_start before cancelling");
    assert!(saw_cancelled_error, "expected a terminal cancelled error event");
    assert!(!saw_task_complete);

    for _ in 0..100 {
        if coordinator.get_task("u1", &task_id).unwrap() == TaskStatus::Cancelled {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(coordinator.get_task("u1", &task_id).unwrap(), TaskStatus::Cancelled);
}
