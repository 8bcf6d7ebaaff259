//! Domain logic for the imagegate service.
//!
//! Pure building blocks with no process or network access: the error
//! taxonomy, the typed request schema and its validation, the bounded job
//! queue, and workflow template materialization.

pub mod error;
pub mod queue;
pub mod request;
pub mod schema;
pub mod types;
pub mod workflow;
