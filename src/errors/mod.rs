//! Centralized error handling module
//!
//! Structured, typed errors for the pipeline. Binaries wrap these in
//! `anyhow::Error` at the very top; the library never does.

pub mod context;
pub mod types;

pub use context::ErrorContextExt;
pub use types::{AppError, AppResult};
