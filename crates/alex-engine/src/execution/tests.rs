//! End-to-end tests for the ReAct state machine (spec §8 scenarios 1-4),
//! driven against `MockLlmPort` and a real `FileSessionStore` over a
//! tempdir, matching the corpus's preference for hand-built test doubles
//! over a mocking framework (see `alex_llm::mock`'s own test module).

use std::sync::Arc;
use std::time::Duration;

use alex_events::{ErrorKind, EventKind, Redactor};
use alex_llm::{ChatMessage, CompletionResponse, FinishReason, MockLlmPort, ToolCallRequest};
use alex_session::FileSessionStore;
use alex_tools::builtins::EchoTool;
use alex_tools::ToolRegistry;

use super::*;
use crate::broadcaster::{Broadcaster, BroadcasterConfig};
use crate::policy::EnginePolicy;

fn test_deps_with_limit(llm: MockLlmPort, root: &std::path::Path, max_iterations: u32) -> (EngineDeps, Broadcaster) {
    let broadcaster = Broadcaster::new(BroadcasterConfig {
        ingest_capacity: 64,
        subscriber_queue_size: 64,
        replay_window: 64,
    });
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool));

    let deps = EngineDeps {
        session_store: Arc::new(FileSessionStore::new(root)),
        tools: Arc::new(registry),
        llm: Arc::new(llm),
        broadcaster: broadcaster.clone(),
        policy: EnginePolicy {
            max_iterations,
            ..EnginePolicy::default()
        },
        redactor: Arc::new(Redactor::new(&[])),
    };
    (deps, broadcaster)
}

fn test_deps(llm: MockLlmPort, root: &std::path::Path) -> (EngineDeps, Broadcaster) {
    test_deps_with_limit(llm, root, 3)
}

async fn ctx(deps: &EngineDeps, session_id: &str, task_id: &str, prompt: &str) -> TaskContext {
    deps.session_store.create("u1", session_id).await.unwrap();
    let message = Message::user(prompt);
    deps.session_store
        .append_message("u1", session_id, message.clone())
        .await
        .unwrap();
    TaskContext {
        user_id: "u1".into(),
        session_id: session_id.into(),
        task_id: task_id.into(),
        messages: vec![message],
    }
}

async fn drain(subscriber: &crate::broadcaster::Subscriber) -> Vec<EventKind> {
    let mut events = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_millis(200), subscriber.recv()).await {
            Ok(Some(event)) => {
                let terminal = event.is_terminal();
                events.push(event.kind);
                if terminal {
                    break;
                }
            }
            _ => break,
        }
    }
    events
}

fn type_names(events: &[EventKind]) -> Vec<&'static str> {
    events.iter().map(|k| k.type_name()).collect()
}

/// Scenario 1 (spec §8): a plain answer with no tool calls completes in
/// one iteration.
#[tokio::test]
async fn plain_answer_completes_in_one_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let llm = MockLlmPort::new(vec![Ok(CompletionResponse {
        message: ChatMessage::assistant("Hello!"),
        finish_reason: FinishReason::Stop,
        usage: None,
    })]);
    let (deps, broadcaster) = test_deps(llm, dir.path());
    let task_ctx = ctx(&deps, "s1", "t1", "Say hello.").await;
    let subscriber = broadcaster.subscribe("s1");

    let outcome = run_task(&deps, task_ctx, CancellationToken::new()).await;

    match outcome {
        TaskOutcome::Completed { final_answer } => assert_eq!(final_answer, "Hello!"),
        _ => panic!("expected completion"),
    }

    let events = drain(&subscriber).await;
    let names = type_names(&events);
    assert_eq!(
        names,
        vec![
            "task_started",
            "iteration_start",
            "think_complete",
            "assistant_message",
            "iteration_complete",
            "task_complete",
        ]
    );
    assert!(matches!(&events[5], EventKind::TaskComplete { final_answer, total_iterations: 1, .. } if final_answer == "Hello!"));

    let session = deps.session_store.get("u1", "s1").await.unwrap();
    assert_eq!(session.messages.len(), 2);
}

/// Scenario 2 (spec §8): a tool call on iteration 1, answer on iteration 2.
#[tokio::test]
async fn single_tool_use_then_answers_next_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let mut with_tool_call = ChatMessage::assistant("");
    with_tool_call.tool_calls = Some(vec![ToolCallRequest {
        id: "c1".into(),
        name: "echo".into(),
        arguments: serde_json::json!({"text": "./a.go\n./b.go"}),
    }]);
    let llm = MockLlmPort::new(vec![
        Ok(CompletionResponse {
            message: with_tool_call,
            finish_reason: FinishReason::ToolCalls,
            usage: None,
        }),
        Ok(CompletionResponse {
            message: ChatMessage::assistant("Found 2 Go files: a.go, b.go"),
            finish_reason: FinishReason::Stop,
            usage: None,
        }),
    ]);
    let (deps, broadcaster) = test_deps(llm, dir.path());
    let task_ctx = ctx(&deps, "s2", "t2", "List .go files").await;
    let subscriber = broadcaster.subscribe("s2");

    let outcome = run_task(&deps, task_ctx, CancellationToken::new()).await;

    match outcome {
        TaskOutcome::Completed { final_answer } => {
            assert_eq!(final_answer, "Found 2 Go files: a.go, b.go")
        }
        _ => panic!("expected completion"),
    }

    let events = drain(&subscriber).await;
    assert!(events.iter().any(|e| matches!(
        e,
        EventKind::ToolCallStart { call_id, tool_name, .. } if call_id == "c1" && tool_name == "echo"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        EventKind::ToolCallComplete { call_id, status: alex_events::ToolCallStatus::Ok, .. } if call_id == "c1"
    )));
    // Exactly one tool_call_start and one tool_call_complete for c1 (invariant 1).
    let starts = events
        .iter()
        .filter(|e| matches!(e, EventKind::ToolCallStart { call_id, .. } if call_id == "c1"))
        .count();
    let completes = events
        .iter()
        .filter(|e| matches!(e, EventKind::ToolCallComplete { call_id, .. } if call_id == "c1"))
        .count();
    assert_eq!((starts, completes), (1, 1));

    // Sequence strictly increasing (invariant 2 is the broadcaster's job,
    // checked in `broadcaster::tests`; here just confirm two iterations ran).
    let iteration_starts = events.iter().filter(|e| matches!(e, EventKind::IterationStart)).count();
    assert_eq!(iteration_starts, 2);
}

/// Scenario 3 (spec §8): an unknown tool name is fed back as a structured
/// error tool message, and the task recovers on the next iteration.
#[tokio::test]
async fn unknown_tool_recovers_on_next_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let mut with_unknown_tool = ChatMessage::assistant("");
    with_unknown_tool.tool_calls = Some(vec![ToolCallRequest {
        id: "c1".into(),
        name: "quantum_solve".into(),
        arguments: serde_json::json!({}),
    }]);
    let llm = MockLlmPort::new(vec![
        Ok(CompletionResponse {
            message: with_unknown_tool,
            finish_reason: FinishReason::ToolCalls,
            usage: None,
        }),
        Ok(CompletionResponse {
            message: ChatMessage::assistant("I don't have that tool, here's my best answer."),
            finish_reason: FinishReason::Stop,
            usage: None,
        }),
    ]);
    let (deps, broadcaster) = test_deps(llm, dir.path());
    let task_ctx = ctx(&deps, "s3", "t3", "Solve with quantum_solve").await;
    let subscriber = broadcaster.subscribe("s3");

    let outcome = run_task(&deps, task_ctx, CancellationToken::new()).await;
    assert!(matches!(outcome, TaskOutcome::Completed { .. }));

    let events = drain(&subscriber).await;
    assert!(events.iter().any(|e| matches!(
        e,
        EventKind::ToolCallComplete { status: alex_events::ToolCallStatus::Error, result, .. }
            if result.contains("unknown_tool")
    )));

    let session = deps.session_store.get("u1", "s3").await.unwrap();
    let tool_message = session
        .messages
        .iter()
        .find(|m| m.role == alex_session::domain::Role::Tool)
        .expect("synthetic tool error message appended");
    assert!(tool_message.content.contains("unknown_tool"));
}

/// Scenario 4 (spec §8): hitting `max_iterations` with the model always
/// requesting a tool yields exactly one `iteration_complete` at the limit
/// followed by a terminal `iteration_limit` error.
#[tokio::test]
async fn iteration_limit_is_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let always_calls_tool = || {
        let mut message = ChatMessage::assistant("");
        message.tool_calls = Some(vec![ToolCallRequest {
            id: "c1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({"text": "x"}),
        }]);
        Ok(CompletionResponse {
            message,
            finish_reason: FinishReason::ToolCalls,
            usage: None,
        })
    };
    let llm = MockLlmPort::new(vec![always_calls_tool(), always_calls_tool()]);
    let (deps, broadcaster) = test_deps_with_limit(llm, dir.path(), 2);
    let task_ctx = ctx(&deps, "s4", "t4", "loop forever").await;
    let subscriber = broadcaster.subscribe("s4");

    let outcome = run_task(&deps, task_ctx, CancellationToken::new()).await;
    match outcome {
        TaskOutcome::Failed { error } => assert_eq!(error.kind(), "iteration_limit"),
        _ => panic!("expected iteration_limit failure"),
    }

    let events = drain(&subscriber).await;
    let iteration_completes = events
        .iter()
        .filter(|e| matches!(e, EventKind::IterationComplete { .. }))
        .count();
    assert_eq!(iteration_completes, 2);
    assert!(matches!(
        events.last(),
        Some(EventKind::Error {
            kind: ErrorKind::IterationLimit,
            recoverable: false,
            ..
        })
    ));

    let session = deps.session_store.get("u1", "s4").await.unwrap();
    assert!(matches!(
        session.messages.last().unwrap().role,
        alex_session::domain::Role::Assistant
    ));
}

/// Cancellation observed between iterations (spec §4.5 edge cases, §5):
/// a token cancelled before the loop starts yields `Cancelled` with no
/// `task_complete`.
#[tokio::test]
async fn cancellation_before_start_yields_cancelled_with_no_task_complete() {
    let dir = tempfile::tempdir().unwrap();
    let llm = MockLlmPort::new(vec![Ok(CompletionResponse {
        message: ChatMessage::assistant("should never be reached"),
        finish_reason: FinishReason::Stop,
        usage: None,
    })]);
    let (deps, broadcaster) = test_deps(llm, dir.path());
    let task_ctx = ctx(&deps, "s5", "t5", "anything").await;
    let subscriber = broadcaster.subscribe("s5");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = run_task(&deps, task_ctx, cancel).await;
    assert!(matches!(outcome, TaskOutcome::Cancelled));

    let events = drain(&subscriber).await;
    assert!(events
        .iter()
        .any(|e| matches!(e, EventKind::Error { kind: ErrorKind::Cancelled, .. })));
    assert!(!events.iter().any(|e| matches!(e, EventKind::TaskComplete { .. })));
}
