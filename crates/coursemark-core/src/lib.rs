//! coursemark-core — learner progress, assessment scoring, and certification.
//!
//! This crate defines the course and progress data model, the pure recording
//! and evaluation rules, and the engine that serializes them per enrollment
//! on top of a pluggable store.

pub mod certification;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod evaluator;
pub mod model;
pub mod parser;
pub mod progress;
pub mod recorder;
pub mod store;

pub use error::{ProgressError, Result};
