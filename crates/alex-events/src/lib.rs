//! Domain event model for the ALEX agent runtime core (component C1).
//!
//! Everything here is a plain, serialisable value type — no I/O, no
//! channels. [`alex_engine`] owns sequencing and emission; this crate owns
//! only the shape of an event and its redaction rule.

mod event;
mod observer;
mod redact;
mod usage;

pub use event::{ErrorKind, Event, EventKind, RedactedArguments, ToolCallStatus};
pub use observer::EventObserver;
pub use redact::Redactor;
pub use usage::TokenUsage;
