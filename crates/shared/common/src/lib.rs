//! Common utilities shared by the identity store and its tools.
//!
//! This crate provides:
//! - Unified error handling for the store layer
//! - Configuration structures loaded from the environment
//! - Tracing initialisation for binaries

pub mod config;
pub mod error;
pub mod telemetry;

pub use config::*;
pub use error::{AppError, AppResult, OptionExt};
