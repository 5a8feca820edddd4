//! Conversation data preparation for vlora.
//!
//! This crate provides:
//! - Conversation state and separator-style prompt assembly
//! - A registry of named conversation templates (cloned on lookup)
//! - Loss-mask construction for SFT samples
//! - Conversation dataset loading from JSONL
//! - Tokenizer integration

#![warn(missing_docs)]

pub mod conversation;
pub mod dataset;
pub mod masking;
pub mod templates;
pub mod tokenizer;

pub use conversation::*;
pub use dataset::*;
pub use masking::*;
pub use templates::*;
pub use tokenizer::*;
