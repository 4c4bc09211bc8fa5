//! Schema-subset validation.
//!
//! Supports the subset the section schemas actually use: `enum`, `anyOf`,
//! `oneOf`, `type: string` with `minLength`, `type: array` with `minItems`
//! and recursive `items`, and `type: object` with `required`,
//! `additionalProperties: false`, and recursive `properties`. Anything else
//! validates permissively. Errors are human-readable strings prefixed with
//! their dot/bracket path; callers pattern-match only on `valid`.

use serde_json::Value;

/// Outcome of validating a candidate value against a schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl SchemaReport {
    fn ok() -> Self {
        Self {
            valid: true,
            errors: vec![],
        }
    }

    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

fn prefixed(path: &str, message: &str) -> String {
    if path.is_empty() {
        message.to_string()
    } else {
        format!("{path}: {message}")
    }
}

fn key_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Validate `value` against `schema`, qualifying errors with `path`.
///
/// `None` (or a non-object schema) validates permissively -- the caller may
/// not have a schema for every section.
pub fn validate_against_schema(value: &Value, schema: Option<&Value>, path: &str) -> SchemaReport {
    let Some(schema) = schema else {
        return SchemaReport::ok();
    };
    let Some(schema_map) = schema.as_object() else {
        return SchemaReport::ok();
    };

    if let Some(branches) = schema_map.get("anyOf").and_then(Value::as_array) {
        // Valid if any branch accepts; errors are the union of failures.
        let mut errors = vec![];
        let mut any_valid = false;
        for branch in branches {
            let report = validate_against_schema(value, Some(branch), path);
            if report.valid {
                any_valid = true;
            } else {
                errors.extend(report.errors);
            }
        }
        return if any_valid {
            SchemaReport::ok()
        } else {
            SchemaReport::from_errors(errors)
        };
    }

    if let Some(branches) = schema_map.get("oneOf").and_then(Value::as_array) {
        // Valid iff exactly one branch accepts.
        let reports: Vec<SchemaReport> = branches
            .iter()
            .map(|branch| validate_against_schema(value, Some(branch), path))
            .collect();
        let valid_count = reports.iter().filter(|report| report.valid).count();
        let errors = reports.into_iter().flat_map(|report| report.errors).collect();
        return SchemaReport {
            valid: valid_count == 1,
            errors,
        };
    }

    if let Some(options) = schema_map.get("enum").and_then(Value::as_array) {
        if !options.contains(value) {
            let allowed = options
                .iter()
                .map(|option| match option {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            return SchemaReport::from_errors(vec![prefixed(
                path,
                &format!("Value must be one of {allowed}."),
            )]);
        }
        return SchemaReport::ok();
    }

    match schema_map.get("type").and_then(Value::as_str) {
        Some("string") => {
            let Some(text) = value.as_str() else {
                return SchemaReport::from_errors(vec![prefixed(path, "Expected string.")]);
            };
            let mut errors = vec![];
            if let Some(min) = schema_map.get("minLength").and_then(Value::as_u64)
                && (text.chars().count() as u64) < min
            {
                errors.push(prefixed(path, &format!("String length must be >= {min}.")));
            }
            SchemaReport::from_errors(errors)
        }
        Some("array") => {
            let Some(items) = value.as_array() else {
                return SchemaReport::from_errors(vec![prefixed(path, "Expected array.")]);
            };
            let mut errors = vec![];
            if let Some(min) = schema_map.get("minItems").and_then(Value::as_u64)
                && (items.len() as u64) < min
            {
                errors.push(prefixed(path, &format!("Array length must be >= {min}.")));
            }
            if let Some(item_schema) = schema_map.get("items") {
                for (index, item) in items.iter().enumerate() {
                    let report =
                        validate_against_schema(item, Some(item_schema), &format!("{path}[{index}]"));
                    errors.extend(report.errors);
                }
            }
            SchemaReport::from_errors(errors)
        }
        Some("object") => {
            let Some(map) = value.as_object() else {
                return SchemaReport::from_errors(vec![prefixed(path, "Expected object.")]);
            };
            let mut errors = vec![];
            let properties = schema_map
                .get("properties")
                .and_then(Value::as_object);

            if let Some(required) = schema_map.get("required").and_then(Value::as_array) {
                for key in required.iter().filter_map(Value::as_str) {
                    if !map.contains_key(key) {
                        errors.push(format!(
                            "{}: Missing required property.",
                            key_path(path, key)
                        ));
                    }
                }
            }

            if schema_map.get("additionalProperties") == Some(&Value::Bool(false)) {
                for key in map.keys() {
                    let known = properties.is_some_and(|props| props.contains_key(key));
                    if !known {
                        errors.push(format!(
                            "{}: Additional property not allowed.",
                            key_path(path, key)
                        ));
                    }
                }
            }

            if let Some(properties) = properties {
                for (key, property_schema) in properties {
                    if let Some(property_value) = map.get(key) {
                        let report = validate_against_schema(
                            property_value,
                            Some(property_schema),
                            &key_path(path, key),
                        );
                        errors.extend(report.errors);
                    }
                }
            }

            SchemaReport::from_errors(errors)
        }
        // Unrecognized or absent type: advisory schema, accept.
        _ => SchemaReport::ok(),
    }
}
