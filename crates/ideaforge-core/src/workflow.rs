//! The discovery workflow engine.
//!
//! A state machine over one [`DiscoveryRecord`]: `empty` (nothing generated)
//! -> `in_progress` (fields generated/approved one at a time) -> `approved`
//! (every field approved). Clearing or regenerating any field re-enters
//! `in_progress` and invalidates every field from that index onward --
//! later fields may have been generated against now-stale context.
//!
//! Every persisted mutation reads the record by version, transforms a
//! private copy, appends exactly one change-log entry, and writes the whole
//! record back. A single-document gate refuses to start a new draft while
//! the latest record is neither approved nor cleared.

use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use ideaforge_types::error::WorkflowError;
use ideaforge_types::field::{
    FIELD_DEFINITIONS, FieldDefinition, FieldType, REQUIRED_INPUTS, field_by_key, field_index,
};
use ideaforge_types::record::{
    ApprovalEntry, ChangeLogEntry, ChangeStage, DiscoveryRecord, FieldApproval,
};
use ideaforge_types::result::{
    ApproveFieldParams, ClearFieldParams, DiscoveryInput, RecordUpdate, RegenerateFieldParams,
    ResultType, SaveDocumentParams, VersionApproval, WorkflowResult, WorkflowStatus,
};

use crate::document::{build_field_status, empty_document, empty_value_for, set_path};
use crate::generator::{FieldGenerator, GenerateFieldRequest};
use crate::prompt::PromptAssembler;
use crate::store::RecordStore;

const GATE_MESSAGE: &str = "Finish approving the current document before creating a new one.";

/// Orchestrates field generation, approval gating, and versioned
/// persistence for discovery documents.
pub struct WorkflowEngine<S: RecordStore, A: PromptAssembler> {
    store: S,
    generator: FieldGenerator<A>,
}

impl<S: RecordStore, A: PromptAssembler> WorkflowEngine<S, A> {
    pub fn new(store: S, generator: FieldGenerator<A>) -> Self {
        Self { store, generator }
    }

    /// Access the underlying record store.
    pub fn store(&self) -> &S {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Document-level operations
    // -----------------------------------------------------------------------

    /// Start a new discovery draft: generate the first field only and
    /// persist it as a fresh version.
    ///
    /// Returns `needs_input` when required inputs are blank and the
    /// `in_progress`/`existing` conflict result when an unresolved prior
    /// draft exists; neither is an error.
    pub async fn run_discovery_workflow(
        &self,
        input: &DiscoveryInput,
    ) -> Result<WorkflowResult, WorkflowError> {
        let (missing_fields, questions) = validate_user_input(input);
        if !missing_fields.is_empty() {
            return Ok(WorkflowResult::needs_input(missing_fields, questions));
        }
        if let Some(conflict) = self.check_approval_gate().await? {
            return Ok(conflict);
        }

        let change_reason = input
            .change_reason
            .clone()
            .unwrap_or_else(|| "Start discovery draft".to_string());
        let mut record = new_draft_record(input, change_reason, "Generating first section...");

        let first_field = &FIELD_DEFINITIONS[0];
        record.current_field_key = Some(first_field.key.to_string());
        self.generate_into(&mut record, first_field).await?;
        record.last_status_message = Some(format!(
            "{} generated and saved. Review and approve.",
            first_field.label
        ));

        let record = self.persist_new(record).await?;
        tracing::info!(version = record.version, "discovery draft created");
        Ok(WorkflowResult {
            status: WorkflowStatus::InProgress,
            result_type: ResultType::Created,
            version: Some(record.version),
            missing_fields: vec![],
            questions: vec![],
            message: None,
            persisted: true,
            validation_status: record.last_validation_status,
            record: Some(record),
        })
    }

    /// Generate every field of a fresh draft in catalog order, then mark the
    /// whole record approved.
    ///
    /// Cancellation is cooperative and poll-based: the token is consulted
    /// once per field boundary, so an in-flight generation always completes
    /// before cancellation is honored.
    pub async fn generate_entire_document(
        &self,
        input: &DiscoveryInput,
        cancel: &CancellationToken,
    ) -> Result<WorkflowResult, WorkflowError> {
        let (missing_fields, questions) = validate_user_input(input);
        if !missing_fields.is_empty() {
            return Ok(WorkflowResult::needs_input(missing_fields, questions));
        }
        if let Some(conflict) = self.check_approval_gate().await? {
            return Ok(conflict);
        }

        let mut record = new_draft_record(
            input,
            "Generating entire document".to_string(),
            "Generating entire document...",
        );

        let first_field = &FIELD_DEFINITIONS[0];
        record.current_field_key = Some(first_field.key.to_string());
        self.generate_into(&mut record, first_field).await?;
        let mut record = self.persist_new(record).await?;

        for field in &FIELD_DEFINITIONS[1..] {
            record.current_field_key = Some(field.key.to_string());
            let status_message = format!("Generating {}...", field.label);
            record.last_status_message = Some(status_message.clone());
            record = self
                .update_record(record, ChangeStage::DiscoveryGeneration, &status_message)
                .await?;

            if cancel.is_cancelled() {
                tracing::info!(
                    version = record.version,
                    field = field.key,
                    "whole-document generation canceled"
                );
                record.last_status_message = Some("Generation canceled.".to_string());
                let record = self
                    .update_record(
                        record,
                        ChangeStage::GenerateAllCanceled,
                        "Generation canceled.",
                    )
                    .await?;
                return Ok(WorkflowResult {
                    status: WorkflowStatus::InProgress,
                    result_type: ResultType::Canceled,
                    version: Some(record.version),
                    missing_fields: vec![],
                    questions: vec![],
                    message: None,
                    persisted: true,
                    validation_status: None,
                    record: Some(record),
                });
            }

            self.generate_into(&mut record, field).await?;
        }

        let approved_at = Utc::now();
        for field in FIELD_DEFINITIONS {
            record.field_status.insert(
                field.key.to_string(),
                FieldApproval {
                    approved: true,
                    approved_at: Some(approved_at),
                },
            );
        }
        record.approved = true;
        record.approved_at = Some(approved_at);
        record.current_field_key = None;
        record.last_status_message = Some("Full document generated and ready.".to_string());
        record.change_reason = "Generated entire document".to_string();

        let record = self
            .update_record(
                record,
                ChangeStage::GenerateAllComplete,
                "Full document generated and ready.",
            )
            .await?;
        tracing::info!(version = record.version, "entire document generated");
        Ok(WorkflowResult {
            status: WorkflowStatus::Approved,
            result_type: ResultType::Updated,
            version: Some(record.version),
            missing_fields: vec![],
            questions: vec![],
            message: None,
            persisted: true,
            validation_status: record.last_validation_status,
            record: Some(record),
        })
    }

    /// The latest record, if any (read-only passthrough).
    pub async fn latest_record(
        &self,
        scope: Option<&str>,
    ) -> Result<Option<DiscoveryRecord>, WorkflowError> {
        Ok(self.store.fetch_latest(scope).await?)
    }

    // -----------------------------------------------------------------------
    // Field-level operations
    // -----------------------------------------------------------------------

    /// Write the caller-supplied value for a field and mark it approved.
    ///
    /// The value is trusted as-is -- it is not re-validated against the
    /// field's schema, unlike every generation path. Only string fields get
    /// a type check (and are trimmed). Advances `current_field_key` and
    /// approves the whole record when this was the last unapproved field.
    pub async fn approve_field(
        &self,
        params: &ApproveFieldParams,
    ) -> Result<RecordUpdate, WorkflowError> {
        let field = require_field(&params.field_key)?;
        let mut record = self.load_record(params.version).await?;

        if field.field_type == FieldType::String {
            let Some(text) = params.value.as_str() else {
                return Err(WorkflowError::InvalidValue {
                    field_key: params.field_key.clone(),
                    expected: "string",
                });
            };
            set_path(&mut record.discovery_document, field.key, json!(text.trim()));
        } else {
            set_path(
                &mut record.discovery_document,
                field.key,
                params.value.clone(),
            );
        }

        record.field_status.insert(
            field.key.to_string(),
            FieldApproval {
                approved: true,
                approved_at: Some(Utc::now()),
            },
        );

        let status_message = if record.all_fields_approved() {
            record.approved = true;
            record.approved_at = Some(Utc::now());
            record.current_field_key = None;
            "All fields approved. Discovery document is complete."
        } else {
            record.current_field_key = record.next_unapproved_field_key().map(String::from);
            "Field approved. Next field is ready."
        };
        record.last_status_message = Some(status_message.to_string());
        record.change_reason = attributed_reason(params.approver.as_deref(), "Approved", "Field approved");
        record.last_validation_status = None;

        let record = self
            .update_record(record, ChangeStage::FieldApproved, status_message)
            .await?;
        Ok(RecordUpdate {
            record,
            persisted: true,
            validation_status: None,
        })
    }

    /// Invalidate a field and everything after it, then immediately
    /// regenerate that field before persisting.
    pub async fn regenerate_field(
        &self,
        params: &RegenerateFieldParams,
    ) -> Result<RecordUpdate, WorkflowError> {
        let field = require_field(&params.field_key)?;
        let index = field_index(field.key).expect("catalog field has an index");
        let mut record = self.load_record(params.version).await?;

        invalidate_from(&mut record, index);
        record.current_field_key = Some(field.key.to_string());
        record.change_reason =
            attributed_reason(params.approver.as_deref(), "Regenerated", "Regenerated field");
        record.last_status_message = Some("Field regenerated. Review and approve.".to_string());
        if let Some(product_idea) = params
            .product_idea
            .as_deref()
            .map(str::trim)
            .filter(|idea| !idea.is_empty())
        {
            record.product_idea = product_idea.to_string();
        }

        self.generate_into(&mut record, field).await?;

        let validation_status = record.last_validation_status;
        let record = self
            .update_record(
                record,
                ChangeStage::FieldRegenerated,
                "Field regenerated. Review and approve.",
            )
            .await?;
        Ok(RecordUpdate {
            record,
            persisted: true,
            validation_status,
        })
    }

    /// Invalidate a field and everything after it, leaving the field empty.
    pub async fn clear_field(
        &self,
        params: &ClearFieldParams,
    ) -> Result<RecordUpdate, WorkflowError> {
        let field = require_field(&params.field_key)?;
        let index = field_index(field.key).expect("catalog field has an index");
        let mut record = self.load_record(params.version).await?;

        invalidate_from(&mut record, index);
        record.current_field_key = Some(field.key.to_string());
        clear_diagnostics(&mut record);
        record.change_reason =
            attributed_reason(params.approver.as_deref(), "Cleared", "Cleared field");
        record.last_status_message = Some("Field cleared.".to_string());

        let record = self
            .update_record(record, ChangeStage::FieldCleared, "Field cleared.")
            .await?;
        Ok(RecordUpdate {
            record,
            persisted: true,
            validation_status: None,
        })
    }

    /// Replace a version's whole document with a caller-supplied one.
    /// No validation -- the caller owns the shape.
    pub async fn save_document(
        &self,
        params: &SaveDocumentParams,
    ) -> Result<RecordUpdate, WorkflowError> {
        if !params.discovery_document.is_object() {
            return Err(WorkflowError::InvalidValue {
                field_key: "discoveryDocument".to_string(),
                expected: "object",
            });
        }
        let mut record = self.load_record(params.version).await?;
        record.discovery_document = params.discovery_document.clone();
        record.change_reason =
            attributed_reason(params.approver.as_deref(), "Saved", "Saved document");
        record.last_status_message = Some("Document saved.".to_string());

        let record = self
            .update_record(record, ChangeStage::DocumentSaved, "Document saved.")
            .await?;
        Ok(RecordUpdate {
            record,
            persisted: true,
            validation_status: None,
        })
    }

    /// Reset a version's document and field status entirely; the record
    /// itself is never deleted.
    pub async fn clear_document(
        &self,
        version: u32,
        approver: Option<&str>,
    ) -> Result<RecordUpdate, WorkflowError> {
        let mut record = self.load_record(version).await?;
        record.discovery_document = empty_document();
        record.field_status = build_field_status();
        record.current_field_key = None;
        record.approved = false;
        record.approved_at = None;
        clear_diagnostics(&mut record);
        record.change_reason = attributed_reason(approver, "Cleared", "Cleared document");
        record.last_status_message = Some("Document cleared.".to_string());

        let record = self
            .update_record(record, ChangeStage::DocumentCleared, "Document cleared.")
            .await?;
        Ok(RecordUpdate {
            record,
            persisted: true,
            validation_status: None,
        })
    }

    /// Mark a whole version approved. Idempotent: an already-approved
    /// version is returned unchanged with no write.
    pub async fn approve_version(
        &self,
        version: u32,
        approver: Option<&str>,
    ) -> Result<VersionApproval, WorkflowError> {
        let mut record = self.load_record(version).await?;
        if record.approved {
            return Ok(VersionApproval {
                record,
                already_approved: true,
                persisted: false,
            });
        }

        let timestamp = Utc::now();
        record.approved = true;
        record.approved_at = Some(timestamp);
        record.approval_history.push(ApprovalEntry {
            timestamp,
            approver: approver.unwrap_or("system").to_string(),
        });
        let reason = attributed_reason(approver, "Approved", "Version approved");
        record.change_reason = reason.clone();

        let record = self
            .update_record(record, ChangeStage::VersionApproved, &reason)
            .await?;
        tracing::info!(version, "discovery version approved");
        Ok(VersionApproval {
            record,
            already_approved: false,
            persisted: true,
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Generate one field and fold the result into the working record.
    async fn generate_into(
        &self,
        record: &mut DiscoveryRecord,
        field: &'static FieldDefinition,
    ) -> Result<(), WorkflowError> {
        let generated = self
            .generator
            .generate_field_value(GenerateFieldRequest {
                field,
                product_idea: &record.product_idea,
                target_user: record.target_user.as_deref(),
                current_document: &record.discovery_document,
                field_status: &record.field_status,
            })
            .await?;

        set_path(&mut record.discovery_document, field.key, generated.value);
        record.last_prompt = Some(generated.prompt);
        record.last_prompt_field_key = Some(field.key.to_string());
        record.last_output = Some(generated.raw_text);
        record.last_output_field_key = Some(field.key.to_string());
        record.last_validation_status = generated.validation_status;
        Ok(())
    }

    /// Next version number: `(latest or 0) + 1`.
    async fn next_version(&self) -> Result<u32, WorkflowError> {
        let latest = self.store.fetch_latest(None).await?;
        Ok(latest.map(|record| record.version).unwrap_or(0) + 1)
    }

    async fn load_record(&self, version: u32) -> Result<DiscoveryRecord, WorkflowError> {
        self.store
            .fetch_by_version(version)
            .await?
            .ok_or(WorkflowError::VersionNotFound(version))
    }

    /// Assign a durable version and insert the record with its initial
    /// change-log entry.
    async fn persist_new(
        &self,
        mut record: DiscoveryRecord,
    ) -> Result<DiscoveryRecord, WorkflowError> {
        let version = self.next_version().await?;
        let timestamp = Utc::now();
        record.version = version;
        record.timestamp = timestamp;
        if record.change_reason.is_empty() {
            record.change_reason = "Initial discovery draft".to_string();
        }
        record.change_log = vec![ChangeLogEntry {
            version,
            timestamp,
            reason: record.change_reason.clone(),
            stage: ChangeStage::DiscoveryGeneration,
        }];
        self.store.insert(version, &record).await?;
        tracing::debug!(version, "record inserted");
        Ok(record)
    }

    /// Append one change-log entry and write the record back.
    async fn update_record(
        &self,
        mut record: DiscoveryRecord,
        stage: ChangeStage,
        reason: &str,
    ) -> Result<DiscoveryRecord, WorkflowError> {
        let timestamp = Utc::now();
        record.timestamp = timestamp;
        record.change_log.push(ChangeLogEntry {
            version: record.version,
            timestamp,
            reason: reason.to_string(),
            stage,
        });
        self.store.update(record.version, &record).await?;
        tracing::debug!(version = record.version, stage = %stage, "record updated");
        Ok(record)
    }

    /// The single-document-at-a-time gate: a latest record that is neither
    /// approved nor cleared blocks new drafts.
    async fn check_approval_gate(&self) -> Result<Option<WorkflowResult>, WorkflowError> {
        let Some(latest) = self.store.fetch_latest(None).await? else {
            return Ok(None);
        };
        if latest.field_status.is_empty() {
            return Ok(None);
        }
        if latest.approved || is_document_cleared(&latest) {
            return Ok(None);
        }
        tracing::debug!(version = latest.version, "approval gate refused new draft");
        Ok(Some(WorkflowResult::existing(latest, GATE_MESSAGE)))
    }
}

// ---------------------------------------------------------------------------
// Free helpers
// ---------------------------------------------------------------------------

fn validate_user_input(input: &DiscoveryInput) -> (Vec<String>, Vec<String>) {
    let mut missing_fields = vec![];
    let mut questions = vec![];
    for required in REQUIRED_INPUTS {
        let value = input.value_for(required.key).unwrap_or_default();
        if value.trim().is_empty() {
            missing_fields.push(required.key.to_string());
            questions.push(required.question.to_string());
        }
    }
    (missing_fields, questions)
}

fn require_field(field_key: &str) -> Result<&'static FieldDefinition, WorkflowError> {
    field_by_key(field_key).ok_or_else(|| WorkflowError::UnknownFieldKey(field_key.to_string()))
}

fn is_document_cleared(record: &DiscoveryRecord) -> bool {
    record.change_reason == "Cleared document"
        || record.last_status_message.as_deref() == Some("Document cleared.")
}

fn attributed_reason(approver: Option<&str>, verb: &str, fallback: &str) -> String {
    match approver.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => format!("{verb} by {name}"),
        None => fallback.to_string(),
    }
}

/// Reset every field at or after `index` to unapproved and empty; later
/// fields may have been generated against now-stale context.
fn invalidate_from(record: &mut DiscoveryRecord, index: usize) {
    for field in &FIELD_DEFINITIONS[index..] {
        record
            .field_status
            .insert(field.key.to_string(), FieldApproval::default());
        set_path(
            &mut record.discovery_document,
            field.key,
            empty_value_for(field),
        );
    }
    record.approved = false;
    record.approved_at = None;
}

fn clear_diagnostics(record: &mut DiscoveryRecord) {
    record.last_prompt = None;
    record.last_prompt_field_key = None;
    record.last_output = None;
    record.last_output_field_key = None;
    record.last_validation_status = None;
}

fn new_draft_record(
    input: &DiscoveryInput,
    change_reason: String,
    status_message: &str,
) -> DiscoveryRecord {
    DiscoveryRecord {
        version: 0,
        timestamp: Utc::now(),
        product_idea: input.product_idea.clone(),
        target_user: input.target_user.clone(),
        discovery_document: empty_document(),
        field_status: build_field_status(),
        current_field_key: None,
        approved: false,
        approved_at: None,
        change_reason,
        change_log: vec![],
        last_prompt: None,
        last_prompt_field_key: None,
        last_output: None,
        last_output_field_key: None,
        last_validation_status: None,
        last_status_message: Some(status_message.to_string()),
        approval_history: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::{Arc, Mutex};

    use serde_json::Value;

    use ideaforge_types::error::{LlmError, PromptError, StoreError};
    use ideaforge_types::llm::{CompletionRequest, CompletionResponse, ResponseContent};

    use crate::document::get_path;
    use crate::llm::{BoxLlmProvider, LlmProvider};
    use crate::prompt::{IncomingInfoContext, PromptAssets, build_incoming_info};

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// In-memory record store with an optional cancellation hook: when an
    /// update's change-log reason contains the trigger string, the token is
    /// cancelled. Lets tests cancel whole-document generation at an exact
    /// field boundary.
    #[derive(Default)]
    struct MockStore {
        rows: Mutex<BTreeMap<u32, DiscoveryRecord>>,
        cancel_on_reason: Mutex<Option<(String, CancellationToken)>>,
    }

    impl MockStore {
        fn seed(&self, record: DiscoveryRecord) {
            self.rows.lock().unwrap().insert(record.version, record);
        }

        fn row_count(&self) -> usize {
            self.rows.lock().unwrap().len()
        }

        fn get(&self, version: u32) -> Option<DiscoveryRecord> {
            self.rows.lock().unwrap().get(&version).cloned()
        }

        fn cancel_when_reason_contains(&self, needle: &str, token: CancellationToken) {
            *self.cancel_on_reason.lock().unwrap() = Some((needle.to_string(), token));
        }
    }

    impl RecordStore for MockStore {
        async fn fetch_latest(
            &self,
            _scope: Option<&str>,
        ) -> Result<Option<DiscoveryRecord>, StoreError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .last_key_value()
                .map(|(_, record)| record.clone()))
        }

        async fn fetch_by_version(
            &self,
            version: u32,
        ) -> Result<Option<DiscoveryRecord>, StoreError> {
            Ok(self.get(version))
        }

        async fn insert(
            &self,
            version: u32,
            record: &DiscoveryRecord,
        ) -> Result<DiscoveryRecord, StoreError> {
            self.rows.lock().unwrap().insert(version, record.clone());
            Ok(record.clone())
        }

        async fn update(
            &self,
            version: u32,
            record: &DiscoveryRecord,
        ) -> Result<DiscoveryRecord, StoreError> {
            if let Some((needle, token)) = &*self.cancel_on_reason.lock().unwrap()
                && record
                    .change_log
                    .last()
                    .is_some_and(|entry| entry.reason.contains(needle.as_str()))
            {
                token.cancel();
            }
            self.rows.lock().unwrap().insert(version, record.clone());
            Ok(record.clone())
        }
    }

    /// Assembler serving fixed in-memory assets.
    struct StaticAssembler {
        assets: Arc<PromptAssets>,
    }

    impl StaticAssembler {
        fn empty() -> Self {
            Self {
                assets: Arc::new(PromptAssets::default()),
            }
        }

        /// A permissive object schema for the market section lets the
        /// whole-payload resolution branch accept canonical market shapes.
        fn with_market_schema() -> Self {
            let mut assets = PromptAssets::default();
            assets.section_schemas.insert(
                ideaforge_types::field::SECTION_MARKET_ANALYSIS.to_string(),
                json!({"type": "object"}),
            );
            Self {
                assets: Arc::new(assets),
            }
        }
    }

    impl PromptAssembler for StaticAssembler {
        async fn assets(&self) -> Result<Arc<PromptAssets>, PromptError> {
            Ok(Arc::clone(&self.assets))
        }

        async fn incoming_info(
            &self,
            field_key: &str,
            context: &IncomingInfoContext<'_>,
        ) -> Result<Value, PromptError> {
            Ok(build_incoming_info(&self.assets, field_key, context))
        }
    }

    /// Provider replaying scripted response texts in order.
    struct ScriptedProvider {
        script: Mutex<VecDeque<String>>,
    }

    impl ScriptedProvider {
        fn new(responses: &[&str]) -> Self {
            Self {
                script: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            }
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let content = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::Provider("script exhausted".to_string()))?;
            Ok(CompletionResponse {
                model: "mock".to_string(),
                content: ResponseContent::Text(content),
            })
        }
    }

    // -----------------------------------------------------------------------
    // Fixtures
    // -----------------------------------------------------------------------

    /// One scripted response per catalog field, in order, each shaped the
    /// way the model plausibly answers that field.
    fn catalog_responses() -> Vec<&'static str> {
        vec![
            r#"{"problemStatement": "Generated problem statement"}"#,
            r#"{"targetUsersSegments": {"user_segments": [{"name": "Devs", "segment_type": "primary"}]}}"#,
            r#"{"userPainPoints": {"user_segments": []}}"#,
            r#"{"contextualFactors": {}}"#,
            r#"{"constraints": [{"name": "Budget cap", "description": "Small team"}]}"#,
            r#"{"market_definition": "Generated market", "alternatives": {}}"#,
            r#"{"competitors": [{"name": "Toggl", "url": "https://toggl.com", "category": "direct"}]}"#,
            r#"{"competitor_capabilities": {"Functional": [{"capability": "Time tracking"}], "Technical": [], "Business": []}}"#,
            r#"{"opportunities": [{"opportunity": "Offline mode"}]}"#,
            r#"{"opportunityStatement": {"opportunity_statement": "A calmer focus timer"}}"#,
            r#"{"valueDrivers": {"value_drivers": ["Speed"]}}"#,
            r#"{"marketFitHypothesis": {"desirability": []}}"#,
            r#"{"feasibility_risks": [{"feasibility_risk_type": "technical", "feasibility_risk": "Scaling", "why_it_matters": "Growth"}]}"#,
        ]
    }

    fn scripted_engine(responses: &[&str]) -> WorkflowEngine<MockStore, StaticAssembler> {
        let provider = BoxLlmProvider::new(ScriptedProvider::new(responses));
        let generator = FieldGenerator::new(
            StaticAssembler::with_market_schema(),
            Some(provider),
            "mock-model",
        );
        WorkflowEngine::new(MockStore::default(), generator)
    }

    fn fallback_engine() -> WorkflowEngine<MockStore, StaticAssembler> {
        let generator = FieldGenerator::new(StaticAssembler::empty(), None, "mock-model")
            .with_deterministic_fallback(true);
        WorkflowEngine::new(MockStore::default(), generator)
    }

    fn input() -> DiscoveryInput {
        DiscoveryInput {
            product_idea: "A focus timer for remote teams".to_string(),
            target_user: Some("remote engineering teams".to_string()),
            change_reason: None,
        }
    }

    fn draft_record(version: u32) -> DiscoveryRecord {
        let mut record =
            new_draft_record(&input(), "Start discovery draft".to_string(), "In progress.");
        record.version = version;
        record
    }

    fn fully_approved_record(version: u32) -> DiscoveryRecord {
        let mut record = draft_record(version);
        let approved_at = Some(Utc::now());
        for field in FIELD_DEFINITIONS {
            let value = match field.field_type {
                FieldType::String => json!("approved text"),
                FieldType::Array => json!(["approved"]),
                FieldType::Object => json!({"approved": true}),
            };
            set_path(&mut record.discovery_document, field.key, value);
            record.field_status.insert(
                field.key.to_string(),
                FieldApproval {
                    approved: true,
                    approved_at,
                },
            );
        }
        record.approved = true;
        record.approved_at = approved_at;
        record
    }

    // -----------------------------------------------------------------------
    // Input validation + approval gate
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_blank_product_idea_needs_input() {
        let engine = fallback_engine();
        let result = engine
            .run_discovery_workflow(&DiscoveryInput {
                product_idea: "".to_string(),
                target_user: None,
                change_reason: None,
            })
            .await
            .unwrap();

        assert_eq!(result.status, WorkflowStatus::NeedsInput);
        assert_eq!(result.result_type, ResultType::MissingInputs);
        assert!(result.missing_fields.contains(&"productIdea".to_string()));
        assert_eq!(result.missing_fields.len(), result.questions.len());
        assert_eq!(engine.store().row_count(), 0);
    }

    #[tokio::test]
    async fn test_gate_blocks_while_prior_draft_unresolved() {
        let engine = fallback_engine();
        engine.store().seed(draft_record(3));

        let result = engine.run_discovery_workflow(&input()).await.unwrap();

        assert_eq!(result.status, WorkflowStatus::InProgress);
        assert_eq!(result.result_type, ResultType::Existing);
        assert_eq!(result.record.as_ref().unwrap().version, 3);
        assert!(!result.persisted);
        // No new version was inserted.
        assert_eq!(engine.store().row_count(), 1);
    }

    #[tokio::test]
    async fn test_gate_ignores_approved_record() {
        let engine = fallback_engine();
        engine.store().seed(fully_approved_record(1));

        let result = engine.run_discovery_workflow(&input()).await.unwrap();
        assert_eq!(result.result_type, ResultType::Created);
        assert_eq!(result.record.as_ref().unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_gate_ignores_cleared_record() {
        let engine = fallback_engine();
        let mut cleared = draft_record(1);
        cleared.change_reason = "Cleared document".to_string();
        engine.store().seed(cleared);

        let result = engine.run_discovery_workflow(&input()).await.unwrap();
        assert_eq!(result.result_type, ResultType::Created);
        assert_eq!(result.record.as_ref().unwrap().version, 2);
    }

    // -----------------------------------------------------------------------
    // run_discovery_workflow
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_run_discovery_generates_first_field_only() {
        let engine = scripted_engine(&catalog_responses()[..1]);
        let result = engine.run_discovery_workflow(&input()).await.unwrap();

        assert_eq!(result.status, WorkflowStatus::InProgress);
        assert_eq!(result.result_type, ResultType::Created);
        assert!(result.persisted);

        let record = result.record.unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(
            record.current_field_key.as_deref(),
            Some(FIELD_DEFINITIONS[0].key)
        );
        assert_eq!(
            get_path(&record.discovery_document, FIELD_DEFINITIONS[0].key),
            Some(&json!("Generated problem statement"))
        );
        // Later fields stay empty.
        assert_eq!(
            get_path(&record.discovery_document, FIELD_DEFINITIONS[1].key),
            Some(&json!({}))
        );
        assert!(!record.approved);
        assert_eq!(record.change_log.len(), 1);
        assert_eq!(record.change_log[0].stage, ChangeStage::DiscoveryGeneration);
        assert_eq!(
            record.last_output_field_key.as_deref(),
            Some(FIELD_DEFINITIONS[0].key)
        );
        assert_eq!(engine.store().row_count(), 1);
    }

    #[tokio::test]
    async fn test_versions_increment_monotonically() {
        let engine = scripted_engine(&catalog_responses()[..1]);
        engine.store().seed(fully_approved_record(7));

        let result = engine.run_discovery_workflow(&input()).await.unwrap();
        assert_eq!(result.record.unwrap().version, 8);
    }

    // -----------------------------------------------------------------------
    // approve_field
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_approve_field_advances_to_next() {
        let engine = fallback_engine();
        engine.store().seed(draft_record(1));

        let update = engine
            .approve_field(&ApproveFieldParams {
                version: 1,
                field_key: FIELD_DEFINITIONS[0].key.to_string(),
                value: json!("  The problem statement.  "),
                approver: Some("dana".to_string()),
            })
            .await
            .unwrap();

        let record = &update.record;
        assert!(update.persisted);
        // String values are trimmed on the way in.
        assert_eq!(
            get_path(&record.discovery_document, FIELD_DEFINITIONS[0].key),
            Some(&json!("The problem statement."))
        );
        assert!(record.field_status[FIELD_DEFINITIONS[0].key].approved);
        assert_eq!(
            record.current_field_key.as_deref(),
            Some(FIELD_DEFINITIONS[1].key)
        );
        assert!(!record.approved);
        assert_eq!(record.change_reason, "Approved by dana");
        assert_eq!(
            record.change_log.last().unwrap().stage,
            ChangeStage::FieldApproved
        );
    }

    #[tokio::test]
    async fn test_approve_last_field_approves_record() {
        let engine = fallback_engine();
        let mut record = fully_approved_record(1);
        let last_key = FIELD_DEFINITIONS.last().unwrap().key;
        record.approved = false;
        record.approved_at = None;
        record
            .field_status
            .insert(last_key.to_string(), FieldApproval::default());
        record.current_field_key = Some(last_key.to_string());
        engine.store().seed(record);

        let update = engine
            .approve_field(&ApproveFieldParams {
                version: 1,
                field_key: last_key.to_string(),
                value: json!({"feasibility_risks": []}),
                approver: None,
            })
            .await
            .unwrap();

        assert!(update.record.approved);
        assert!(update.record.approved_at.is_some());
        assert_eq!(update.record.current_field_key, None);
        assert_eq!(
            update.record.last_status_message.as_deref(),
            Some("All fields approved. Discovery document is complete.")
        );
    }

    #[tokio::test]
    async fn test_approve_string_field_rejects_non_string() {
        let engine = fallback_engine();
        engine.store().seed(draft_record(1));

        let error = engine
            .approve_field(&ApproveFieldParams {
                version: 1,
                field_key: FIELD_DEFINITIONS[0].key.to_string(),
                value: json!(42),
                approver: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(error, WorkflowError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_unknown_field_key_rejected_before_store_access() {
        let engine = fallback_engine();
        // Version 999 does not exist; the key check must fire first.
        let error = engine
            .approve_field(&ApproveFieldParams {
                version: 999,
                field_key: "no.such.field".to_string(),
                value: json!("x"),
                approver: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(error, WorkflowError::UnknownFieldKey(_)));
    }

    #[tokio::test]
    async fn test_missing_version_is_an_error() {
        let engine = fallback_engine();
        let error = engine
            .approve_field(&ApproveFieldParams {
                version: 999,
                field_key: FIELD_DEFINITIONS[0].key.to_string(),
                value: json!("x"),
                approver: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(error, WorkflowError::VersionNotFound(999)));
    }

    // -----------------------------------------------------------------------
    // Cascading invalidation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_clear_field_resets_everything_at_and_after_index() {
        let engine = fallback_engine();
        engine.store().seed(fully_approved_record(1));

        let pivot = 5;
        let update = engine
            .clear_field(&ClearFieldParams {
                version: 1,
                field_key: FIELD_DEFINITIONS[pivot].key.to_string(),
                approver: None,
            })
            .await
            .unwrap();

        let record = &update.record;
        for (index, field) in FIELD_DEFINITIONS.iter().enumerate() {
            let status = &record.field_status[field.key];
            let value = get_path(&record.discovery_document, field.key).unwrap();
            if index < pivot {
                assert!(status.approved, "field {} should stay approved", field.key);
                assert_ne!(*value, empty_value_for(field));
            } else {
                assert!(!status.approved, "field {} should be reset", field.key);
                assert_eq!(*value, empty_value_for(field));
            }
        }
        assert!(!record.approved);
        assert_eq!(
            record.current_field_key.as_deref(),
            Some(FIELD_DEFINITIONS[pivot].key)
        );
        assert!(record.last_prompt.is_none());
        assert_eq!(
            record.change_log.last().unwrap().stage,
            ChangeStage::FieldCleared
        );
    }

    #[tokio::test]
    async fn test_regenerate_unapproves_fully_approved_record() {
        let responses = catalog_responses();
        let last_index = FIELD_DEFINITIONS.len() - 1;
        let engine = scripted_engine(&responses[last_index..]);
        engine.store().seed(fully_approved_record(1));

        let update = engine
            .regenerate_field(&RegenerateFieldParams {
                version: 1,
                field_key: FIELD_DEFINITIONS[last_index].key.to_string(),
                approver: None,
                product_idea: None,
            })
            .await
            .unwrap();

        let record = &update.record;
        assert!(!record.approved);
        assert!(record.approved_at.is_none());
        assert!(!record.field_status[FIELD_DEFINITIONS[last_index].key].approved);
        // The field was regenerated in the same operation.
        let value = get_path(&record.discovery_document, FIELD_DEFINITIONS[last_index].key)
            .unwrap();
        assert!(value.get("feasibility_risks").is_some());
        assert_eq!(
            record.last_output_field_key.as_deref(),
            Some(FIELD_DEFINITIONS[last_index].key)
        );
        assert_eq!(
            record.change_log.last().unwrap().stage,
            ChangeStage::FieldRegenerated
        );
    }

    #[tokio::test]
    async fn test_regenerate_adopts_replacement_product_idea() {
        let engine = fallback_engine();
        engine.store().seed(draft_record(1));

        let update = engine
            .regenerate_field(&RegenerateFieldParams {
                version: 1,
                field_key: FIELD_DEFINITIONS[0].key.to_string(),
                approver: None,
                product_idea: Some("  A sharper idea  ".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(update.record.product_idea, "A sharper idea");
    }

    // -----------------------------------------------------------------------
    // save / clear document
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_save_document_replaces_wholesale() {
        let engine = fallback_engine();
        engine.store().seed(draft_record(1));

        let replacement = json!({"problemUnderstanding": {"problemStatement": "Edited"}});
        let update = engine
            .save_document(&SaveDocumentParams {
                version: 1,
                discovery_document: replacement.clone(),
                approver: Some("dana".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(update.record.discovery_document, replacement);
        assert_eq!(update.record.change_reason, "Saved by dana");
        assert_eq!(
            update.record.change_log.last().unwrap().stage,
            ChangeStage::DocumentSaved
        );
    }

    #[tokio::test]
    async fn test_save_document_requires_object() {
        let engine = fallback_engine();
        engine.store().seed(draft_record(1));
        let error = engine
            .save_document(&SaveDocumentParams {
                version: 1,
                discovery_document: json!("not a document"),
                approver: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(error, WorkflowError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_clear_document_resets_in_place() {
        let engine = fallback_engine();
        engine.store().seed(fully_approved_record(1));

        let update = engine.clear_document(1, None).await.unwrap();
        let record = &update.record;

        assert_eq!(record.discovery_document, empty_document());
        assert!(record.field_status.values().all(|status| !status.approved));
        assert!(!record.approved);
        assert_eq!(record.current_field_key, None);
        assert_eq!(record.change_reason, "Cleared document");
        assert_eq!(record.last_status_message.as_deref(), Some("Document cleared."));
        // Cleared, not deleted: the version still exists.
        assert_eq!(engine.store().row_count(), 1);
    }

    // -----------------------------------------------------------------------
    // approve_version
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_approve_version_records_history() {
        let engine = fallback_engine();
        engine.store().seed(draft_record(1));

        let approval = engine.approve_version(1, Some("dana")).await.unwrap();
        assert!(!approval.already_approved);
        assert!(approval.persisted);
        assert!(approval.record.approved);
        assert_eq!(approval.record.approval_history.len(), 1);
        assert_eq!(approval.record.approval_history[0].approver, "dana");
    }

    #[tokio::test]
    async fn test_approve_version_is_idempotent() {
        let engine = fallback_engine();
        engine.store().seed(draft_record(1));

        let first = engine.approve_version(1, None).await.unwrap();
        assert!(!first.already_approved);
        assert_eq!(first.record.approval_history[0].approver, "system");
        let log_len = first.record.change_log.len();

        let second = engine.approve_version(1, None).await.unwrap();
        assert!(second.already_approved);
        assert!(!second.persisted);
        assert_eq!(second.record.approval_history.len(), 1);
        assert_eq!(second.record.change_log.len(), log_len);
    }

    // -----------------------------------------------------------------------
    // generate_entire_document
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_generate_entire_document_approves_everything() {
        let engine = scripted_engine(&catalog_responses());
        let cancel = CancellationToken::new();

        let result = engine
            .generate_entire_document(&input(), &cancel)
            .await
            .unwrap();

        assert_eq!(result.status, WorkflowStatus::Approved);
        assert_eq!(result.result_type, ResultType::Updated);

        let record = result.record.unwrap();
        assert!(record.approved);
        assert_eq!(record.current_field_key, None);
        let approved_at = record.approved_at.unwrap();
        for field in FIELD_DEFINITIONS {
            let status = &record.field_status[field.key];
            assert!(status.approved, "field {} approved", field.key);
            // One timestamp for the whole batch.
            assert_eq!(status.approved_at, Some(approved_at));
            assert_ne!(
                *get_path(&record.discovery_document, field.key).unwrap(),
                empty_value_for(field),
                "field {} has a generated value",
                field.key
            );
        }
        assert_eq!(
            record.change_log.last().unwrap().stage,
            ChangeStage::GenerateAllComplete
        );
    }

    #[tokio::test]
    async fn test_generate_entire_document_cancels_at_field_boundary() {
        // Only the first two fields' responses are scripted; the store hook
        // cancels the token when the engine announces the third field.
        let engine = scripted_engine(&catalog_responses()[..2]);
        let cancel = CancellationToken::new();
        engine.store().cancel_when_reason_contains(
            &format!("Generating {}...", FIELD_DEFINITIONS[2].label),
            cancel.clone(),
        );

        let result = engine
            .generate_entire_document(&input(), &cancel)
            .await
            .unwrap();

        assert_eq!(result.status, WorkflowStatus::InProgress);
        assert_eq!(result.result_type, ResultType::Canceled);

        let record = result.record.unwrap();
        // Fields before the cancellation point keep their generated values.
        assert_eq!(
            get_path(&record.discovery_document, FIELD_DEFINITIONS[0].key),
            Some(&json!("Generated problem statement"))
        );
        assert!(
            get_path(&record.discovery_document, FIELD_DEFINITIONS[1].key)
                .unwrap()
                .get("user_segments")
                .is_some()
        );
        // Fields at and after it stay empty, and nothing is approved.
        for field in &FIELD_DEFINITIONS[2..] {
            assert_eq!(
                *get_path(&record.discovery_document, field.key).unwrap(),
                empty_value_for(field)
            );
        }
        assert!(record.field_status.values().all(|status| !status.approved));
        assert!(!record.approved);
        assert_eq!(
            record.change_log.last().unwrap().stage,
            ChangeStage::GenerateAllCanceled
        );
        assert_eq!(
            record.last_status_message.as_deref(),
            Some("Generation canceled.")
        );
    }

    #[tokio::test]
    async fn test_generate_entire_document_precancelled_token() {
        let engine = scripted_engine(&catalog_responses()[..1]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = engine
            .generate_entire_document(&input(), &cancel)
            .await
            .unwrap();

        // The first field generates before the first boundary check.
        assert_eq!(result.result_type, ResultType::Canceled);
        let record = result.record.unwrap();
        assert_eq!(
            get_path(&record.discovery_document, FIELD_DEFINITIONS[0].key),
            Some(&json!("Generated problem statement"))
        );
        for field in &FIELD_DEFINITIONS[1..] {
            assert_eq!(
                *get_path(&record.discovery_document, field.key).unwrap(),
                empty_value_for(field)
            );
        }
    }

    #[tokio::test]
    async fn test_latest_record_passthrough() {
        let engine = fallback_engine();
        assert!(engine.latest_record(None).await.unwrap().is_none());
        engine.store().seed(draft_record(4));
        assert_eq!(engine.latest_record(None).await.unwrap().unwrap().version, 4);
    }
}
