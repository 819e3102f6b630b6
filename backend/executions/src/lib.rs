//! Execution-state store access used by plugin implementations.

pub mod client;

pub use client::{step_url, HttpStepUpdater, StepUpdateError, StepUpdater};
