//! Shared domain types for Ideaforge.
//!
//! Everything that crosses a crate boundary lives here: the discovery field
//! catalog, the versioned record wire shape, LLM request/response types,
//! workflow result envelopes, and the error enums. This crate depends only
//! on serde/chrono/thiserror -- never on IO or runtime crates.

pub mod error;
pub mod field;
pub mod llm;
pub mod record;
pub mod result;
