//! Terminal rendering of the domain event stream. Markdown buffering is a
//! small, self-contained state machine kept narrow and literal: flush on a
//! whitespace-safe boundary outside a fenced code block, otherwise hold
//! back up to 3 tokens or until a fence/line boundary.

use std::collections::HashMap;
use std::time::Instant;

use colored::Colorize;

use alex_events::{Event, EventKind, ToolCallStatus};

/// Buffers incremental `assistant_message` deltas before they hit the
/// terminal, so a fenced code block doesn't get torn mid-token by naive
/// flushing. `raw` mode disables buffering entirely and writes every delta
/// through unchanged.
pub struct MarkdownBuffer {
    raw: bool,
    pending: String,
    in_fence: bool,
    held: usize,
}

impl MarkdownBuffer {
    pub fn new(raw: bool) -> Self {
        Self {
            raw,
            pending: String::new(),
            in_fence: false,
            held: 0,
        }
    }

    /// Feed one incremental delta; returns a chunk ready to write, if any.
    pub fn push(&mut self, delta: &str) -> Option<String> {
        if self.raw {
            return Some(delta.to_string());
        }
        if delta.is_empty() {
            return None;
        }

        self.pending.push_str(delta);
        self.track_fences(delta);

        let ends_on_safe_whitespace =
            !self.in_fence && delta.chars().last().is_some_and(|c| c.is_whitespace());
        let hit_line_boundary = delta.contains('\n');

        if ends_on_safe_whitespace || hit_line_boundary || self.held >= 3 {
            self.held = 0;
            Some(std::mem::take(&mut self.pending))
        } else {
            self.held += 1;
            None
        }
    }

    /// Flush anything retained. Called once the iteration's final
    /// aggregated text arrives, so nothing is ever silently dropped.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            self.held = 0;
            Some(std::mem::take(&mut self.pending))
        }
    }

    fn track_fences(&mut self, delta: &str) {
        if delta.matches("```").count() % 2 == 1 {
            self.in_fence = !self.in_fence;
        }
    }
}

/// Tracks in-flight tool calls so completions can report elapsed time,
/// rendered as collapsed single-line status updates.
#[derive(Default)]
pub struct ToolStatusTracker {
    started: HashMap<String, (Instant, String)>,
}

impl ToolStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, call_id: &str, tool_name: &str) {
        self.started.insert(call_id.to_string(), (Instant::now(), tool_name.to_string()));
        println!("{} {}", "→".blue(), tool_name.dimmed());
    }

    pub fn complete(&mut self, call_id: &str, status: ToolCallStatus, duration_ms: u64) {
        let name = self
            .started
            .remove(call_id)
            .map(|(_, name)| name)
            .unwrap_or_else(|| "tool".to_string());
        match status {
            ToolCallStatus::Ok => println!("{} {} ({duration_ms}ms)", "✓".green(), name),
            ToolCallStatus::Error => println!("{} {} failed ({duration_ms}ms)", "✗".red(), name),
            ToolCallStatus::Timeout => println!("{} {} timed out ({duration_ms}ms)", "✗".red(), name),
        }
    }
}

/// Outcome of rendering one task's event stream to completion.
pub enum RenderedOutcome {
    Completed { final_answer: String },
    Failed { message: String },
    Cancelled,
}

/// Render one task's events until its terminal event arrives. Events for
/// other tasks sharing the same session's replay window are ignored.
pub async fn render_task(
    subscriber: &alex_engine::Subscriber,
    task_id: &str,
    raw_stream: bool,
) -> RenderedOutcome {
    let mut buffer = MarkdownBuffer::new(raw_stream);
    let mut tools = ToolStatusTracker::new();
    // Whether any streamed (non-final) delta has been seen for the current
    // iteration. A non-streaming `LlmPort` emits no deltas at all, only the
    // final aggregated text, so the final branch below must fall back to
    // printing it directly in that case instead of assuming it is a
    // duplicate of already-streamed content.
    let mut streamed_any = false;

    loop {
        let event: Event = match subscriber.recv().await {
            Some(event) => event,
            None => return RenderedOutcome::Failed {
                message: "event stream closed before the task completed".to_string(),
            },
        };
        if event.task_id != task_id {
            continue;
        }

        match event.kind {
            EventKind::AssistantMessage { delta, is_final, .. } => {
                // The final event's `delta` carries the complete aggregated
                // text (spec §4.5 step 4), not a fresh increment. When
                // content was already streamed this iteration it has been
                // printed piece by piece already, so just flush whatever
                // the buffer is still holding back; a non-streaming `LlmPort`
                // never emits incremental deltas, so in that case the final
                // event is the only chance to print the answer at all.
                if is_final {
                    if !streamed_any {
                        if let Some(chunk) = buffer.push(&delta) {
                            print!("{chunk}");
                        }
                    }
                    if let Some(chunk) = buffer.flush() {
                        print!("{chunk}");
                    }
                    streamed_any = false;
                } else {
                    streamed_any = true;
                    if let Some(chunk) = buffer.push(&delta) {
                        print!("{chunk}");
                    }
                }
            }
            EventKind::ToolCallStart { call_id, tool_name, .. } => {
                tools.start(&call_id, &tool_name);
            }
            EventKind::ToolCallComplete { call_id, status, duration_ms, .. } => {
                tools.complete(&call_id, status, duration_ms);
            }
            EventKind::TaskComplete { final_answer, .. } => {
                println!();
                return RenderedOutcome::Completed { final_answer };
            }
            EventKind::Error { kind, message, .. } => {
                if matches!(kind, alex_events::ErrorKind::Cancelled) {
                    return RenderedOutcome::Cancelled;
                }
                return RenderedOutcome::Failed { message };
            }
            _ => {}
        }
    }
}
