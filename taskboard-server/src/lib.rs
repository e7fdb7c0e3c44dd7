//! Taskboard server library.
//!
//! Exposes the HTTP server for use in tests and embedding. The server keeps
//! tasks and users in an in-memory document store and keeps each task's
//! assignment consistent with its assignee's `pendingTasks`.

pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod sync;
pub mod tasks;
pub mod users;
