//! Agent allocation: pick a free agent for each work item and record the
//! pairing atomically.
//!
//! - [`selector`] claims the oldest free agent without waiting on contended rows.
//! - [`AssignmentCoordinator`] drives one work item through lock, select,
//!   session insert and commit, retrying with backoff while no agent is free.
//! - [`BatchRunner`] processes a list of work items in order and keeps going
//!   past individual failures.

mod batch;
mod coordinator;
pub mod model;
mod retry;
pub mod selector;

pub use batch::{BatchReport, BatchRunner, Outcome};
pub use coordinator::AssignmentCoordinator;
pub use model::{
    Agent, AgentStatus, NewAgent, SessionRecord, SessionStatus, WorkItem, WorkItemId,
    WorkItemStatus, new_session_id, store_now,
};
pub use retry::RetryPolicy;
