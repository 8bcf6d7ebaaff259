//! ComfyUI backend integration.
//!
//! Drives a local ComfyUI instance through the `comfy` CLI: process
//! lifecycle (tracking opt-out, stop, background launch), workflow runs,
//! a REST readiness probe, and recovery of the produced image from the
//! shared output directory.

pub mod api;
pub mod model_paths;
pub mod process;
pub mod runner;
pub mod settings;
pub mod subprocess;
pub mod watcher;
