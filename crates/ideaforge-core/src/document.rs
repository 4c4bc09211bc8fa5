//! Dot-path access into the nested discovery document.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use ideaforge_types::field::{FIELD_DEFINITIONS, FieldDefinition};
use ideaforge_types::record::FieldApproval;

/// Resolve a dot-path inside a JSON object. Returns `None` when any segment
/// is missing or a non-object is hit mid-path.
pub fn get_path<'a>(document: &'a Value, key: &str) -> Option<&'a Value> {
    let mut current = document;
    for part in key.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Write a value at a dot-path, creating intermediate objects as needed.
/// Non-object intermediates are replaced with objects.
pub fn set_path(document: &mut Value, key: &str, value: Value) {
    if !document.is_object() {
        *document = json!({});
    }
    let mut current = document;
    let parts: Vec<&str> = key.split('.').collect();
    for (index, part) in parts.iter().enumerate() {
        let map = current.as_object_mut().expect("current is always an object");
        if index == parts.len() - 1 {
            map.insert((*part).to_string(), value);
            return;
        }
        let entry = map
            .entry((*part).to_string())
            .or_insert_with(|| json!({}));
        if !entry.is_object() {
            *entry = json!({});
        }
        current = entry;
    }
}

/// The structurally-empty value for a field's type.
pub fn empty_value_for(field: &FieldDefinition) -> Value {
    field.field_type.empty_value()
}

/// An empty discovery document: every catalog path present, filled with its
/// type's empty value.
pub fn empty_document() -> Value {
    let mut document = json!({});
    for field in FIELD_DEFINITIONS {
        set_path(&mut document, field.key, empty_value_for(field));
    }
    document
}

/// A fresh field-status map covering every catalog field, all unapproved.
pub fn build_field_status() -> BTreeMap<String, FieldApproval> {
    FIELD_DEFINITIONS
        .iter()
        .map(|field| (field.key.to_string(), FieldApproval::default()))
        .collect()
}

/// Project the approved subset of a document: only fields whose status is
/// approved are copied into the result.
pub fn build_approved_document(
    document: &Value,
    field_status: &BTreeMap<String, FieldApproval>,
) -> Value {
    let mut approved = Value::Object(Map::new());
    for field in FIELD_DEFINITIONS {
        let is_approved = field_status
            .get(field.key)
            .is_some_and(|status| status.approved);
        if !is_approved {
            continue;
        }
        if let Some(value) = get_path(document, field.key) {
            set_path(&mut approved, field.key, value.clone());
        }
    }
    approved
}
