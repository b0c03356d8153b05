//! Task module.
//!
//! Provides:
//! - Task identity and the lifecycle state machine
//! - Typed status events and the per-task event handle
//! - The bounded supervisor log
//! - The single-slot supervisor and the run pipeline

pub mod events;
pub mod log;
mod runner;
pub mod state;
pub mod supervisor;

pub use events::{TaskEvent, TaskHandle, TaskOutcome};
pub use log::LogBuffer;
pub use state::{ProgressSnapshot, Task, TaskId, TaskPhase};
pub use supervisor::{ActiveTask, CancelAck, Rejection, SourceKind, Supervisor, TaskRequest};
