//! Generation pipeline: admission, serialization, and artifact recovery.
//!
//! [`Pipeline::submit`] takes a validated request through the whole path:
//! queue admission, the single-slot serialization gate, workflow
//! materialization, the backend run, and output recovery.

pub mod generator;
pub mod materialize;

pub use generator::{GeneratedImage, Generator, Pipeline};
