//! Shared wire definitions for the Taskboard API.
//!
//! Documents, request bodies, the response envelope, and the typed query
//! language used by list endpoints. Nothing in this crate performs I/O.

pub mod body;
pub mod envelope;
pub mod model;
pub mod query;
pub mod schema;
