//! Prompt assembly: the `PromptAssembler` port plus the glue that turns
//! section assets into one field-generation prompt.
//!
//! The assembler supplies raw assets (system prompt, per-section prompts and
//! schemas, output-format rules, field dependency lists); this module owns
//! the assembly itself -- the `## Inputs (JSON)` context block, the
//! human-readable schema sketch embedded in prompts, and `{{placeholder}}`
//! template rendering.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use ideaforge_types::error::PromptError;
use ideaforge_types::field::{FIELD_DEFINITIONS, FieldDefinition};

use crate::document::get_path;

/// Fallback system prompt when no prompt file is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the Discovery Agent. Respond only with JSON \
     that matches the required schema. Do not write prose.";

/// The prompt assets a discovery run needs, loaded once and shared.
#[derive(Debug, Clone, Default)]
pub struct PromptAssets {
    pub system_prompt: String,
    pub output_rules: String,
    /// Section id -> section prompt template.
    pub section_prompts: HashMap<String, String>,
    /// Section id -> parsed JSON schema for the section.
    pub section_schemas: HashMap<String, Value>,
    /// Field key -> display keys of the fields this field's prompt depends on.
    pub section_inputs: HashMap<String, Vec<String>>,
}

impl PromptAssets {
    pub fn section_prompt(&self, section: &str) -> Option<&str> {
        self.section_prompts.get(section).map(String::as_str)
    }

    pub fn section_schema(&self, section: &str) -> Option<&Value> {
        self.section_schemas.get(section)
    }
}

/// Document state a field prompt is assembled from.
#[derive(Debug, Clone, Copy)]
pub struct IncomingInfoContext<'a> {
    pub product_idea: &'a str,
    pub target_user: Option<&'a str>,
    pub approved_document: &'a Value,
    pub current_document: &'a Value,
}

/// External collaborator supplying prompt assets and dependency-derived
/// input context. Implementations live in ideaforge-infra; tests use
/// in-memory fakes.
pub trait PromptAssembler: Send + Sync {
    /// The shared prompt assets, loaded on first use.
    fn assets(&self) -> impl Future<Output = Result<Arc<PromptAssets>, PromptError>> + Send;

    /// Dependency-derived input context for one field.
    fn incoming_info(
        &self,
        field_key: &str,
        context: &IncomingInfoContext<'_>,
    ) -> impl Future<Output = Result<Value, PromptError>> + Send;
}

/// Build the `## Inputs (JSON)` payload for a field: caller inputs plus
/// every declared dependency, resolved from the approved document and
/// falling back to the in-progress document.
pub fn build_incoming_info(
    assets: &PromptAssets,
    field_key: &str,
    context: &IncomingInfoContext<'_>,
) -> Value {
    let mut info = Map::new();
    info.insert("productIdea".to_string(), json!(context.product_idea));
    info.insert(
        "targetUser".to_string(),
        json!(context.target_user.unwrap_or_default()),
    );

    let display_key_map: HashMap<&str, &str> = FIELD_DEFINITIONS
        .iter()
        .map(|field| (field.display_key(), field.key))
        .collect();

    for display_key in assets.section_inputs.get(field_key).into_iter().flatten() {
        let Some(dependency_key) = display_key_map.get(display_key.as_str()) else {
            continue;
        };
        let value = get_path(context.approved_document, dependency_key)
            .or_else(|| get_path(context.current_document, dependency_key))
            .cloned()
            .unwrap_or(Value::Null);
        info.insert(display_key.clone(), value);
    }
    Value::Object(info)
}

// ---------------------------------------------------------------------------
// Schema sketch
// ---------------------------------------------------------------------------

/// Resolve a `#/`-local `$ref` pointer against the schema document root.
/// Unresolvable refs fall back to the schema that carried them.
fn resolve_schema_ref<'a>(schema: &'a Value, root: &'a Value) -> &'a Value {
    let Some(reference) = schema.get("$ref").and_then(Value::as_str) else {
        return schema;
    };
    let Some(pointer_path) = reference.strip_prefix("#/") else {
        return schema;
    };
    let mut current = root;
    for part in pointer_path.split('/') {
        match current.get(part) {
            Some(next) => current = next,
            None => return schema,
        }
    }
    current
}

/// Short human-readable type description for one schema node.
fn format_schema_type(schema: &Value, root: &Value) -> String {
    if !schema.is_object() {
        return "unknown".to_string();
    }
    let resolved = resolve_schema_ref(schema, root);
    if !std::ptr::eq(resolved, schema) {
        return format_schema_type(resolved, root);
    }
    if let Some(options) = schema.get("enum").and_then(Value::as_array) {
        return options
            .iter()
            .map(|option| match option {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("|");
    }
    match schema.get("type").and_then(Value::as_str) {
        Some("string") => "string".to_string(),
        Some("array") => {
            let item_type = schema
                .get("items")
                .map(|items| format_schema_type(items, root))
                .unwrap_or_else(|| "unknown".to_string());
            format!("array<{item_type}>")
        }
        Some("object") => {
            let empty = Map::new();
            let properties = schema
                .get("properties")
                .and_then(Value::as_object)
                .unwrap_or(&empty);
            let required: Vec<&str> = schema
                .get("required")
                .and_then(Value::as_array)
                .map(|keys| keys.iter().filter_map(Value::as_str).collect())
                .filter(|keys: &Vec<&str>| !keys.is_empty())
                .unwrap_or_else(|| properties.keys().map(String::as_str).collect());
            if required.is_empty() {
                return "object".to_string();
            }
            let fields: Vec<String> = required
                .iter()
                .map(|key| {
                    let type_label = properties
                        .get(*key)
                        .map(|property| format_schema_type(property, root))
                        .unwrap_or_else(|| "unknown".to_string());
                    format!("{key} ({type_label})")
                })
                .collect();
            format!("object {{ {} }}", fields.join(", "))
        }
        _ => "unknown".to_string(),
    }
}

/// Human-readable summary of a section schema's required keys and types,
/// embedded in generation prompts.
pub fn build_schema_sketch(schema: Option<&Value>) -> String {
    let header = "### JSON schema (define output format)";
    let Some(schema) = schema.filter(|schema| schema.is_object()) else {
        return format!("{header}\n\nSchema missing.");
    };

    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut lines = vec![];
    if !required.is_empty() {
        lines.push(format!("Required keys: {}.", required.join(", ")));
    }
    let keys_to_describe: Vec<&str> = if required.is_empty() {
        properties.keys().map(String::as_str).collect()
    } else {
        required.clone()
    };
    for key in keys_to_describe {
        if let Some(property) = properties.get(key) {
            lines.push(format!("{key}: {}", format_schema_type(property, schema)));
        }
    }
    format!("{header}\n\n{}", lines.join("\n"))
}

// ---------------------------------------------------------------------------
// JSON extraction
// ---------------------------------------------------------------------------

/// The first `{...}` substring of `text` (first `{` through last `}`).
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse model output as JSON, tolerating ``` fences and surrounding prose.
pub fn try_parse_json_text(text: &str) -> Option<Value> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    let candidate = if cleaned.starts_with('{') {
        cleaned
    } else {
        extract_json_block(cleaned)?
    };
    serde_json::from_str(candidate).ok()
}

// ---------------------------------------------------------------------------
// Template rendering + prompt assembly
// ---------------------------------------------------------------------------

/// Replace `{{placeholder}}` markers with values from the map. Unknown
/// placeholders render as empty strings.
pub fn render_template(template: &str, values: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let key = after_open[..close].trim();
                if let Some(value) = values.get(key) {
                    out.push_str(value);
                }
                rest = &after_open[close + 2..];
            }
            None => {
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Assemble the full generation prompt for one field.
pub fn build_field_prompt(
    assets: &PromptAssets,
    field: &FieldDefinition,
    incoming_info: &Value,
    context: &IncomingInfoContext<'_>,
) -> String {
    let system_prompt = if assets.system_prompt.is_empty() {
        DEFAULT_SYSTEM_PROMPT
    } else {
        assets.system_prompt.as_str()
    };
    let inputs_block = format!(
        "## Inputs (JSON)\n{}",
        serde_json::to_string_pretty(incoming_info).unwrap_or_else(|_| "{}".to_string())
    );
    let section_prompt = assets
        .section_prompt(field.section)
        .unwrap_or("Section prompt missing.");
    let schema_block = build_schema_sketch(assets.section_schema(field.section));

    let prompt = [
        system_prompt,
        inputs_block.as_str(),
        section_prompt,
        assets.output_rules.as_str(),
        schema_block.as_str(),
    ]
    .iter()
    .filter(|block| !block.is_empty())
    .copied()
    .collect::<Vec<_>>()
    .join("\n\n");

    let mut values: HashMap<&str, String> = HashMap::new();
    values.insert("productIdea", context.product_idea.to_string());
    values.insert(
        "targetUser",
        context.target_user.unwrap_or_default().to_string(),
    );
    values.insert("outputKey", field.display_key().to_string());
    values.insert(
        "currentDocument",
        serde_json::to_string_pretty(context.current_document)
            .unwrap_or_else(|_| "{}".to_string()),
    );
    values.insert(
        "approvedDocument",
        serde_json::to_string_pretty(context.approved_document)
            .unwrap_or_else(|_| "{}".to_string()),
    );
    for dependency in FIELD_DEFINITIONS {
        let value = get_path(context.approved_document, dependency.key)
            .or_else(|| get_path(context.current_document, dependency.key))
            .cloned()
            .unwrap_or_else(|| dependency.field_type.empty_value());
        values.insert(
            dependency.display_key(),
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| "null".to_string()),
        );
    }

    render_template(&prompt, &values)
}
