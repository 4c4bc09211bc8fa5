//! The field generator: one validated field value out of an unreliable
//! text-generating backend.
//!
//! Each call assembles the field's prompt, drives the LLM through a bounded
//! attempt loop, and resolves a candidate value from whatever shape the
//! model produced -- whole-payload, declared output key, field name, or
//! dot-path -- validating every candidate before accepting it. The
//! generator is pure with respect to the discovery record; callers apply
//! the returned value.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use ideaforge_types::error::GenerateError;
use ideaforge_types::field::{FieldDefinition, FieldType};
use ideaforge_types::llm::{CompletionRequest, CompletionResponse, Message};
use ideaforge_types::record::{FieldApproval, ValidationStatus};

use crate::document::{build_approved_document, empty_value_for, get_path};
use crate::llm::{AttemptOutcome, BoxLlmProvider, invoke_with_retries};
use crate::prompt::{
    DEFAULT_SYSTEM_PROMPT, IncomingInfoContext, PromptAssembler, build_field_prompt,
    try_parse_json_text,
};
use crate::validation::normalize::apply_normalizer;
use crate::validation::{
    normalize_raw_field_value, validate_against_schema, validate_competitor_inventory,
};

/// Default attempt budget per field.
const DEFAULT_ATTEMPTS: u32 = 3;

const COMPETITOR_INVENTORY_KEY: &str = "marketAndCompetitorAnalysis.competitorInventory";

/// Inputs for generating one field value.
#[derive(Debug, Clone, Copy)]
pub struct GenerateFieldRequest<'a> {
    pub field: &'static FieldDefinition,
    pub product_idea: &'a str,
    pub target_user: Option<&'a str>,
    pub current_document: &'a Value,
    pub field_status: &'a BTreeMap<String, FieldApproval>,
}

/// A validated field value plus the diagnostic snapshot of how it was made.
#[derive(Debug, Clone)]
pub struct GeneratedField {
    pub value: Value,
    pub prompt: String,
    pub raw_text: String,
    pub validation_status: Option<ValidationStatus>,
}

/// Drives prompt assembly, LLM invocation, and output validation for one
/// field at a time.
///
/// `provider` is optional: when absent and `deterministic_fallback` is set,
/// generation returns the field type's empty value instead of failing
/// (useful for offline runs); otherwise unavailability is a hard error.
pub struct FieldGenerator<A: PromptAssembler> {
    assembler: A,
    provider: Option<BoxLlmProvider>,
    model: String,
    temperature: Option<f64>,
    attempts: u32,
    deterministic_fallback: bool,
}

impl<A: PromptAssembler> FieldGenerator<A> {
    pub fn new(assembler: A, provider: Option<BoxLlmProvider>, model: impl Into<String>) -> Self {
        Self {
            assembler,
            provider,
            model: model.into(),
            temperature: None,
            attempts: DEFAULT_ATTEMPTS,
            deterministic_fallback: false,
        }
    }

    /// Return the field type's empty value instead of failing when no
    /// provider is available.
    pub fn with_deterministic_fallback(mut self, enabled: bool) -> Self {
        self.deterministic_fallback = enabled;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Generate one validated field value.
    ///
    /// Fails with [`GenerateError::OutputInvalid`] (carrying the last
    /// prompt, output, and validation errors) when the attempt budget is
    /// exhausted -- never silently returns an unvalidated value.
    pub async fn generate_field_value(
        &self,
        request: GenerateFieldRequest<'_>,
    ) -> Result<GeneratedField, GenerateError> {
        let field = request.field;
        let assets = self.assembler.assets().await?;
        let approved_document =
            build_approved_document(request.current_document, request.field_status);
        let context = IncomingInfoContext {
            product_idea: request.product_idea,
            target_user: request.target_user,
            approved_document: &approved_document,
            current_document: request.current_document,
        };
        let incoming_info = self.assembler.incoming_info(field.key, &context).await?;
        let prompt = build_field_prompt(&assets, field, &incoming_info, &context);

        let Some(provider) = &self.provider else {
            if self.deterministic_fallback {
                let value = empty_value_for(field);
                let raw_text =
                    serde_json::to_string_pretty(&value).unwrap_or_else(|_| "null".to_string());
                tracing::debug!(
                    field = field.key,
                    "chat model unavailable; using deterministic fallback value"
                );
                return Ok(GeneratedField {
                    value,
                    prompt,
                    raw_text,
                    validation_status: None,
                });
            }
            return Err(GenerateError::ProviderUnavailable);
        };

        let system_prompt = if assets.system_prompt.is_empty() {
            DEFAULT_SYSTEM_PROMPT.to_string()
        } else {
            assets.system_prompt.clone()
        };
        let completion_request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::user(prompt.clone())],
            system: Some(system_prompt),
            temperature: self.temperature,
        };

        let section_schema = assets.section_schema(field.section);
        let outcome = invoke_with_retries(
            provider,
            completion_request,
            self.attempts,
            |response| resolve_response(field, response, section_schema, &approved_document),
        )
        .await;

        match outcome.value {
            Some(value) => Ok(GeneratedField {
                value,
                prompt,
                raw_text: outcome.last_raw_text.unwrap_or_default(),
                validation_status: Some(ValidationStatus::Valid),
            }),
            None => {
                tracing::warn!(
                    field = field.key,
                    attempts = self.attempts,
                    "field generation exhausted its attempt budget"
                );
                Err(GenerateError::OutputInvalid {
                    field_key: field.key.to_string(),
                    last_prompt: prompt,
                    last_output: outcome.last_raw_text,
                    validation_errors: outcome.last_validation_errors,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Response resolution
// ---------------------------------------------------------------------------

/// Resolve one completion response into a validated candidate value.
///
/// Resolution order: (a) the whole payload against an object section schema,
/// (b) the field's declared output key (optionally re-wrapped), (c) the last
/// segment of the field key, (d) the field's own dot-path inside the
/// payload. A parse failure falls back to raw-text recovery.
fn resolve_response(
    field: &FieldDefinition,
    response: &CompletionResponse,
    section_schema: Option<&Value>,
    approved_document: &Value,
) -> AttemptOutcome {
    let raw_text = response.text();
    let schema_is_object =
        section_schema.and_then(|schema| schema.get("type")).and_then(Value::as_str)
            == Some("object");

    let Some(parsed) = try_parse_json_text(&raw_text) else {
        let normalized = normalize_raw_field_value(&raw_text, field.field_type);
        let candidate_for_validation = if schema_is_object {
            json!({ field.display_key(): normalized.clone() })
        } else {
            normalized.clone()
        };
        let report = validate_against_schema(&candidate_for_validation, section_schema, "");
        if report.valid {
            return AttemptOutcome::Done {
                value: normalized,
                raw_text,
            };
        }
        return retry(field, raw_text, report.errors);
    };

    let parsed = apply_normalizer(field.key, parsed, approved_document);
    let mut last_errors: Vec<String> = vec![];

    // (a) the whole payload is the section object
    if field.field_type == FieldType::Object && parsed.is_object() && schema_is_object {
        let report = validate_against_schema(&parsed, section_schema, "");
        if report.valid {
            let semantic = semantic_errors(field, &parsed);
            if semantic.is_empty() {
                return AttemptOutcome::Done {
                    value: parsed,
                    raw_text,
                };
            }
            return retry(field, raw_text, semantic);
        }
        last_errors = report.errors;
    }

    // (b) the declared output key
    if let Some(output_key) = field.output_key
        && let Some(extracted) = parsed.get(output_key)
    {
        if field.wrap_output_key {
            let candidate = json!({ output_key: extracted.clone() });
            let report = validate_against_schema(&candidate, section_schema, "");
            if !report.valid {
                return retry(field, raw_text, report.errors);
            }
            let semantic = semantic_errors(field, &candidate);
            if !semantic.is_empty() {
                return retry(field, raw_text, semantic);
            }
            return AttemptOutcome::Done {
                value: candidate,
                raw_text,
            };
        }
        let value = extracted.clone();
        let candidate_for_validation = if schema_is_object {
            json!({ output_key: value.clone() })
        } else {
            value.clone()
        };
        let report = validate_against_schema(&candidate_for_validation, section_schema, "");
        if !report.valid {
            return retry(field, raw_text, report.errors);
        }
        return AttemptOutcome::Done { value, raw_text };
    }

    // (c) the last segment of the field key
    let field_name = field.name();
    if let Some(extracted) = parsed.get(field_name) {
        let value = extracted.clone();
        let candidate_for_validation = if schema_is_object {
            json!({ field_name: value.clone() })
        } else {
            value.clone()
        };
        let report = validate_against_schema(&candidate_for_validation, section_schema, "");
        if !report.valid {
            return retry(field, raw_text, report.errors);
        }
        return AttemptOutcome::Done { value, raw_text };
    }

    // (d) the field's own dot-path inside the payload
    if let Some(nested) = get_path(&parsed, field.key) {
        let value = nested.clone();
        let report = validate_against_schema(&value, section_schema, "");
        if !report.valid {
            return retry(field, raw_text, report.errors);
        }
        return AttemptOutcome::Done { value, raw_text };
    }

    retry(field, raw_text, last_errors)
}

fn retry(field: &FieldDefinition, raw_text: String, errors: Vec<String>) -> AttemptOutcome {
    let followup = corrective_followup(field, &errors);
    AttemptOutcome::Retry {
        raw_text,
        validation_errors: errors,
        followup,
    }
}

/// Field-specific semantic check on top of schema validation.
fn semantic_errors(field: &FieldDefinition, value: &Value) -> Vec<String> {
    if field.key == COMPETITOR_INVENTORY_KEY {
        validate_competitor_inventory(value)
    } else {
        vec![]
    }
}

/// Corrective follow-up message for the next attempt, enumerating the prior
/// validation errors verbatim. Only the competitor inventory gets one --
/// the model reliably drifts into generic category names there.
fn corrective_followup(field: &FieldDefinition, errors: &[String]) -> Option<Message> {
    if field.key != COMPETITOR_INVENTORY_KEY || errors.is_empty() {
        return None;
    }
    Some(Message::user(format!(
        "The previous response was rejected for these reasons:\n- {}\n\n\
         Remember: every competitor must be a specific, named product or company \
         with its official website URL, never a generic category like \
         \"project management software\".",
        errors.join("\n- ")
    )))
}
