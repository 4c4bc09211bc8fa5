//! Business logic and collaborator trait definitions for Ideaforge.
//!
//! This crate defines the "ports" (the [`llm::LlmProvider`],
//! [`prompt::PromptAssembler`], and [`store::RecordStore`] traits) that the
//! infrastructure layer implements, plus the three engines that drive
//! discovery-document generation: the validation engine, the field
//! generator, and the workflow engine. It depends only on
//! `ideaforge-types` -- never on `ideaforge-infra` or any IO crate.

pub mod document;
pub mod generator;
pub mod llm;
pub mod prompt;
pub mod store;
pub mod validation;
pub mod workflow;
