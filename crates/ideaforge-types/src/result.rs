//! Workflow result envelopes returned to the request-handling layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{DiscoveryRecord, ValidationStatus};

/// Coarse state of the discovery workflow after an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    NeedsInput,
    InProgress,
    Approved,
}

/// Finer qualification of a [`WorkflowStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    MissingInputs,
    Created,
    Updated,
    Canceled,
    Existing,
}

/// Result of a document-level workflow operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub status: WorkflowStatus,
    pub result_type: ResultType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<DiscoveryRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Whether the operation wrote the record to the store.
    #[serde(default)]
    pub persisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_status: Option<ValidationStatus>,
}

impl WorkflowResult {
    /// A `needs_input` result listing the missing inputs and the questions
    /// to re-prompt the caller with.
    pub fn needs_input(missing_fields: Vec<String>, questions: Vec<String>) -> Self {
        Self {
            status: WorkflowStatus::NeedsInput,
            result_type: ResultType::MissingInputs,
            version: None,
            record: None,
            missing_fields,
            questions,
            message: None,
            persisted: false,
            validation_status: None,
        }
    }

    /// The single-document-at-a-time conflict result carrying the existing,
    /// unresolved record.
    pub fn existing(record: DiscoveryRecord, message: impl Into<String>) -> Self {
        Self {
            status: WorkflowStatus::InProgress,
            result_type: ResultType::Existing,
            version: Some(record.version),
            record: Some(record),
            missing_fields: vec![],
            questions: vec![],
            message: Some(message.into()),
            persisted: false,
            validation_status: None,
        }
    }
}

/// Result of a field- or document-mutating operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
    pub record: DiscoveryRecord,
    /// Whether the mutation was written to the store.
    pub persisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_status: Option<ValidationStatus>,
}

/// Result of approving a whole record version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionApproval {
    pub record: DiscoveryRecord,
    /// True when the version was already approved and no write happened.
    pub already_approved: bool,
    pub persisted: bool,
}

/// Caller-supplied inputs for starting a discovery draft.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryInput {
    #[serde(default)]
    pub product_idea: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_reason: Option<String>,
}

impl DiscoveryInput {
    /// Resolve a required-input key to its supplied value, if any.
    pub fn value_for(&self, key: &str) -> Option<&str> {
        match key {
            "productIdea" => Some(self.product_idea.as_str()),
            "targetUser" => self.target_user.as_deref(),
            _ => None,
        }
    }
}

/// Parameters for approving one field with a caller-supplied value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveFieldParams {
    pub version: u32,
    pub field_key: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
}

/// Parameters for regenerating one field (and invalidating its successors).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateFieldParams {
    pub version: u32,
    pub field_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
    /// Optional replacement product idea to regenerate against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_idea: Option<String>,
}

/// Parameters for clearing one field (and invalidating its successors).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearFieldParams {
    pub version: u32,
    pub field_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
}

/// Parameters for replacing a version's whole document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveDocumentParams {
    pub version: u32,
    pub discovery_document: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serde() {
        assert_eq!(
            serde_json::to_string(&WorkflowStatus::NeedsInput).unwrap(),
            "\"needs_input\""
        );
        assert_eq!(
            serde_json::to_string(&ResultType::MissingInputs).unwrap(),
            "\"missing_inputs\""
        );
    }

    #[test]
    fn test_needs_input_result() {
        let result = WorkflowResult::needs_input(
            vec!["productIdea".to_string()],
            vec!["What product idea?".to_string()],
        );
        assert_eq!(result.status, WorkflowStatus::NeedsInput);
        assert_eq!(result.result_type, ResultType::MissingInputs);
        assert!(result.record.is_none());
        assert!(!result.persisted);
    }

    #[test]
    fn test_discovery_input_value_for() {
        let input = DiscoveryInput {
            product_idea: "idea".to_string(),
            target_user: None,
            change_reason: None,
        };
        assert_eq!(input.value_for("productIdea"), Some("idea"));
        assert_eq!(input.value_for("targetUser"), None);
        assert_eq!(input.value_for("unknown"), None);
    }

    #[test]
    fn test_discovery_input_accepts_camel_case() {
        let input: DiscoveryInput =
            serde_json::from_str(r#"{"productIdea":"x","targetUser":"devs"}"#).unwrap();
        assert_eq!(input.product_idea, "x");
        assert_eq!(input.target_user.as_deref(), Some("devs"));
    }
}
