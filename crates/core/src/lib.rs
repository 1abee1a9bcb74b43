//! Core of the form synchronizer: identifier rules, schema extraction, row
//! transformation, batch loading, drift audit and the sync orchestrator.
//!
//! Storage and the remote API are reached through the traits in [`sync`];
//! this crate performs no I/O itself.

pub mod config;
pub mod errors;
pub mod forms;
pub mod identifiers;
pub mod submissions;
pub mod sync;

pub use errors::{DatabaseError, Error, Result};
