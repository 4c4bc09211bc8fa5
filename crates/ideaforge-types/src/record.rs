//! The versioned discovery record -- the unit of persistence.
//!
//! One record is written per version; versions are positive, monotonically
//! assigned, and never reused. Field names serialize in camelCase for
//! compatibility with records persisted by earlier revisions of the store.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::field::FIELD_DEFINITIONS;

/// Per-field approval state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldApproval {
    pub approved: bool,
    pub approved_at: Option<DateTime<Utc>>,
}

/// One entry in a record's append-only change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub stage: ChangeStage,
}

/// The workflow transition a change-log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStage {
    DiscoveryGeneration,
    DiscoveryUpdate,
    GenerateAllCanceled,
    GenerateAllComplete,
    FieldApproved,
    FieldRegenerated,
    FieldCleared,
    DocumentSaved,
    DocumentCleared,
    VersionApproved,
}

impl fmt::Display for ChangeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeStage::DiscoveryGeneration => "discovery_generation",
            ChangeStage::DiscoveryUpdate => "discovery_update",
            ChangeStage::GenerateAllCanceled => "generate_all_canceled",
            ChangeStage::GenerateAllComplete => "generate_all_complete",
            ChangeStage::FieldApproved => "field_approved",
            ChangeStage::FieldRegenerated => "field_regenerated",
            ChangeStage::FieldCleared => "field_cleared",
            ChangeStage::DocumentSaved => "document_saved",
            ChangeStage::DocumentCleared => "document_cleared",
            ChangeStage::VersionApproved => "version_approved",
        };
        write!(f, "{s}")
    }
}

/// One entry in a record's approval history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalEntry {
    pub timestamp: DateTime<Utc>,
    pub approver: String,
}

/// Outcome of the most recent generation attempt, kept on the record as a
/// diagnostic snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Valid,
}

/// A versioned snapshot of a discovery document in progress.
///
/// Every mutating workflow operation loads the record for a version,
/// transforms a private copy, appends exactly one [`ChangeLogEntry`], and
/// writes the whole record back. There is no concurrent-writer coordination;
/// the caller serializes mutations to a given version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRecord {
    /// Durable version number. 0 means "not yet persisted".
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub product_idea: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user: Option<String>,
    /// The nested document object being built field by field.
    pub discovery_document: Value,
    /// Approval state per field key, covering every catalog field.
    pub field_status: BTreeMap<String, FieldApproval>,
    /// The next field awaiting generation or approval; `None` when complete.
    pub current_field_key: Option<String>,
    /// True iff every field is approved.
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    pub change_reason: String,
    #[serde(default)]
    pub change_log: Vec<ChangeLogEntry>,
    // Diagnostic snapshot of the most recent generation attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_prompt_field_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output_field_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validation_status: Option<ValidationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status_message: Option<String>,
    #[serde(default)]
    pub approval_history: Vec<ApprovalEntry>,
}

impl DiscoveryRecord {
    /// Whether every catalog field is marked approved.
    pub fn all_fields_approved(&self) -> bool {
        FIELD_DEFINITIONS.iter().all(|field| {
            self.field_status
                .get(field.key)
                .is_some_and(|status| status.approved)
        })
    }

    /// The first catalog field that is not yet approved.
    pub fn next_unapproved_field_key(&self) -> Option<&'static str> {
        FIELD_DEFINITIONS
            .iter()
            .find(|field| {
                !self
                    .field_status
                    .get(field.key)
                    .is_some_and(|status| status.approved)
            })
            .map(|field| field.key)
    }
}
