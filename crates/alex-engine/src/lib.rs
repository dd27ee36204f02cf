//! ALEX's streaming execution pipeline: the ReAct Engine (C5), the Event
//! Broadcaster (C6) and the Coordinator (C7) that binds them to the
//! Session Store, Tool Registry and LLM Port.

pub mod broadcaster;
pub mod coordinator;
pub mod error;
pub mod execution;
pub mod observability;
pub mod policy;

pub use broadcaster::{Broadcaster, BroadcasterConfig, Subscriber};
pub use coordinator::{Coordinator, CoordinatorDeps};
pub use error::EngineError;
pub use execution::{run_task, EngineDeps, TaskContext, TaskOutcome};
pub use observability::TracingEventObserver;
pub use policy::EnginePolicy;
