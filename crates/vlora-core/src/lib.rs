//! Core types, traits, and configuration for vlora VLM fine-tuning.
//!
//! This crate provides the foundational abstractions used throughout the
//! vlora data-preparation pipeline, including:
//!
//! - Configuration types for the conversation data stage
//! - The `Dataset` collaborator trait consumed by training loops
//! - Error handling infrastructure

#![warn(missing_docs)]

mod config;
mod error;
mod traits;

pub use config::*;
pub use error::*;
pub use traits::*;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::*;
    pub use crate::error::{Result, VloraError};
    pub use crate::traits::*;
}
