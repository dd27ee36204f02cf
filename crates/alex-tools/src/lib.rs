//! Tool registry: capability-scoped, schema-validated, cancellation-aware
//! invocation of the tools an agent iteration may call (spec §4.3/§4.5).

pub mod builtins;
mod error;
mod preset;
mod registry;
mod tool;

pub use error::ToolError;
pub use preset::{Preset, UnknownPreset};
pub use registry::ToolRegistry;
pub use tool::{Capability, ChunkSink, Tool, ToolContext, ToolSpec};
