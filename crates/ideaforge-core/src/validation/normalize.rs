//! Model-output normalization.
//!
//! Two layers of repair run before schema validation: `normalize_raw_field_value`
//! recovers a usable value when the response is not parseable JSON, and the
//! per-field normalizers rewrite the alias shapes the model tends to emit
//! (camelCase vs snake_case keys, singular vs wrapper objects, ungrouped
//! legacy lists) into the canonical section shape. The alias rules are
//! business logic, kept as a strategy table of pure functions so each one is
//! independently testable.

use serde_json::{Value, json};

use ideaforge_types::field::FieldType;

use crate::document::get_path;

/// A pure per-field normalizer: `(parsed payload, approved document) ->
/// canonical payload`.
pub type Normalizer = fn(Value, &Value) -> Value;

/// Look up the normalizer for a field key, if one exists.
pub fn normalizer_for(field_key: &str) -> Option<Normalizer> {
    match field_key {
        "problemUnderstanding.targetUsersSegments" => Some(normalize_target_users_segments),
        "problemUnderstanding.userPainPoints" => Some(normalize_user_pain_points),
        "problemUnderstanding.contextualFactors" => Some(normalize_contextual_factors),
        "problemUnderstanding.constraints" => Some(normalize_constraints),
        "marketAndCompetitorAnalysis.marketLandscape" => Some(normalize_market_landscape),
        "marketAndCompetitorAnalysis.competitorInventory" => Some(normalize_competitor_inventory),
        "marketAndCompetitorAnalysis.competitorCapabilities" => {
            Some(normalize_competitor_capabilities)
        }
        "marketAndCompetitorAnalysis.gapsOpportunities" => Some(normalize_gaps_opportunities),
        "opportunityDefinition.valueDrivers" => Some(normalize_value_drivers),
        "opportunityDefinition.feasibilityRisks" => Some(normalize_feasibility_risks),
        _ => None,
    }
}

/// Apply the field's normalizer to a parsed payload. Non-object payloads and
/// fields without a normalizer pass through unchanged.
pub fn apply_normalizer(field_key: &str, parsed: Value, approved_document: &Value) -> Value {
    if !parsed.is_object() {
        return parsed;
    }
    match normalizer_for(field_key) {
        Some(normalizer) => normalizer(parsed, approved_document),
        None => parsed,
    }
}

/// Recover a field value from unparseable response text.
///
/// Array fields split on newlines stripping leading bullet markers, object
/// fields attempt a strict JSON re-parse falling back to `{}`, and string
/// fields are trimmed.
pub fn normalize_raw_field_value(text: &str, field_type: FieldType) -> Value {
    match field_type {
        FieldType::Array => {
            let items: Vec<Value> = text
                .lines()
                .map(|line| {
                    line.trim_start()
                        .trim_start_matches(['-', '*'])
                        .trim()
                        .to_string()
                })
                .filter(|line| !line.is_empty())
                .map(Value::String)
                .collect();
            if items.is_empty() {
                json!([text.trim()])
            } else {
                Value::Array(items)
            }
        }
        FieldType::Object => serde_json::from_str(text).unwrap_or_else(|_| json!({})),
        FieldType::String => json!(text.trim()),
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn first_present<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| {
        let found = value.get(*key)?;
        if found.is_null() { None } else { Some(found) }
    })
}

/// Coerce a list of strings or `{name, description}` objects into a list of
/// non-empty name strings.
fn to_name_list(value: Option<&Value>) -> Value {
    let Some(items) = value.and_then(Value::as_array) else {
        return json!([]);
    };
    let names: Vec<Value> = items
        .iter()
        .map(|item| match item {
            Value::String(s) => s.trim().to_string(),
            Value::Object(map) => map
                .get("name")
                .or_else(|| map.get("description"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string(),
            other => other.to_string().trim().to_string(),
        })
        .filter(|name| !name.is_empty())
        .map(Value::String)
        .collect();
    Value::Array(names)
}

/// Split a string value on newlines into trimmed, non-empty entries; pass
/// arrays through.
fn lines_or_list(value: Option<&Value>) -> Option<Vec<Value>> {
    match value? {
        Value::Array(items) => Some(items.clone()),
        Value::String(text) => Some(
            text.lines()
                .map(|line| line.trim().to_string())
                .filter(|line| !line.is_empty())
                .map(Value::String)
                .collect(),
        ),
        _ => None,
    }
}

fn named_entries(value: Option<&Value>) -> Vec<Value> {
    let Some(items) = value.and_then(Value::as_array) else {
        return vec![];
    };
    items
        .iter()
        .map(|item| {
            json!({
                "name": str_field(item, "name"),
                "description": str_field(item, "description"),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// problemUnderstanding.targetUsersSegments
// ---------------------------------------------------------------------------

fn normalize_target_users_segments(mut parsed: Value, approved_document: &Value) -> Value {
    // Accept the `target_segments` alias by renaming and re-running.
    if parsed.get("user_segments").and_then(Value::as_array).is_none()
        && let Some(alias) = parsed.get("target_segments").cloned()
        && alias.is_array()
    {
        let map = parsed.as_object_mut().expect("checked object");
        map.remove("target_segments");
        map.insert("user_segments".to_string(), alias);
        return normalize_target_users_segments(parsed, approved_document);
    }

    let Some(segments) = parsed.get("user_segments").and_then(Value::as_array).cloned() else {
        return parsed;
    };

    let mut normalized: Vec<Value> = segments
        .iter()
        .map(|segment| {
            let Some(segment_map) = segment.as_object() else {
                return segment.clone();
            };
            let mut out = segment_map.clone();

            let segment_type = if segment_map.get("segment_type").and_then(Value::as_str)
                == Some("primary")
            {
                "primary"
            } else {
                "secondary"
            };
            out.insert("segment_type".to_string(), json!(segment_type));

            let usage_contexts = lines_or_list(segment_map.get("usage_contexts"))
                .or_else(|| lines_or_list(segment_map.get("usage_context")))
                .or_else(|| lines_or_list(segment_map.get("business_relevance")))
                .unwrap_or_default();
            out.insert("usage_contexts".to_string(), Value::Array(usage_contexts));

            let characteristics = match segment_map.get("characteristics") {
                Some(Value::Array(items)) => items.clone(),
                _ => segment_map
                    .get("user_groups")
                    .and_then(Value::as_array)
                    .map(|groups| {
                        groups
                            .iter()
                            .flat_map(|group| {
                                group
                                    .get("characteristics")
                                    .and_then(Value::as_array)
                                    .cloned()
                                    .unwrap_or_default()
                            })
                            .filter(|item| item.is_string())
                            .collect()
                    })
                    .unwrap_or_default(),
            };
            out.insert("characteristics".to_string(), Value::Array(characteristics));
            Value::Object(out)
        })
        .collect();

    // Exactly one primary segment, ordered first.
    if !normalized.is_empty() {
        let primary_index = normalized
            .iter()
            .position(|segment| {
                segment.get("segment_type").and_then(Value::as_str) == Some("primary")
            })
            .unwrap_or(0);
        let primary = normalized.remove(primary_index);
        normalized.insert(0, primary);
        for (index, segment) in normalized.iter_mut().enumerate() {
            if let Some(map) = segment.as_object_mut() {
                let segment_type = if index == 0 { "primary" } else { "secondary" };
                map.insert("segment_type".to_string(), json!(segment_type));
            }
        }
    }

    if let Some(map) = parsed.as_object_mut() {
        map.insert("user_segments".to_string(), Value::Array(normalized));
    }
    parsed
}

// ---------------------------------------------------------------------------
// problemUnderstanding.userPainPoints
// ---------------------------------------------------------------------------

fn clamp_level(value: Option<&Value>) -> &'static str {
    match value.and_then(Value::as_str) {
        Some("high") => "high",
        Some("low") => "low",
        _ => "medium",
    }
}

fn normalize_pain_points(points: Option<&Value>) -> Vec<Value> {
    let Some(points) = points.and_then(Value::as_array) else {
        return vec![];
    };
    points
        .iter()
        .map(|point| {
            json!({
                "name": str_field(point, "name"),
                "description": str_field(point, "description"),
                "severity": clamp_level(point.get("severity")),
                "frequency": clamp_level(point.get("frequency")),
            })
        })
        .collect()
}

fn normalize_pain_point_groups(groups: Option<&Value>) -> Vec<Value> {
    let Some(groups) = groups.and_then(Value::as_array) else {
        return vec![];
    };
    groups
        .iter()
        .map(|group| {
            let segment = group
                .get("user_segment")
                .or_else(|| group.get("user_group"))
                .or_else(|| group.get("theme_name"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            json!({
                "user_segment": segment,
                "pain_points": normalize_pain_points(group.get("pain_points")),
            })
        })
        .collect()
}

/// Segment names the approved document has already locked in.
fn approved_segment_names(approved_document: &Value) -> Vec<String> {
    get_path(approved_document, "problemUnderstanding.targetUsersSegments")
        .and_then(|value| value.get("user_segments"))
        .and_then(Value::as_array)
        .map(|segments| {
            segments
                .iter()
                .filter_map(|segment| segment.get("name").and_then(Value::as_str))
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn normalize_user_pain_points(parsed: Value, approved_document: &Value) -> Value {
    let groups = first_present(&parsed, &["user_segments", "user_groups", "pain_point_themes"])
        .or_else(|| {
            let wrapper = parsed.get("user_pain_points")?;
            first_present(wrapper, &["user_segments", "user_groups", "pain_point_themes"])
        });
    let Some(groups) = groups else {
        return parsed;
    };

    let mut normalized = normalize_pain_point_groups(Some(groups));

    // Cross-reference the group names against the approved target segments;
    // keep the full list when filtering would empty it.
    let valid_names = approved_segment_names(approved_document);
    if !valid_names.is_empty() {
        let filtered: Vec<Value> = normalized
            .iter()
            .filter_map(|group| {
                let segment = group.get("user_segment").and_then(Value::as_str)?;
                let canonical = valid_names
                    .iter()
                    .find(|name| name.eq_ignore_ascii_case(segment.trim()))?;
                let mut out = group.as_object().cloned().unwrap_or_default();
                out.insert("user_segment".to_string(), json!(canonical));
                Some(Value::Object(out))
            })
            .collect();
        if !filtered.is_empty() {
            normalized = filtered;
        }
    }

    json!({ "user_segments": normalized })
}

// ---------------------------------------------------------------------------
// problemUnderstanding.contextualFactors / constraints
// ---------------------------------------------------------------------------

fn grouped_entries(
    groups: &Value,
    group_key: &str,
    items_key: &str,
) -> Vec<Value> {
    let Some(groups) = groups.as_array() else {
        return vec![];
    };
    groups
        .iter()
        .map(|group| {
            let name = group
                .get(group_key)
                .or_else(|| group.get("group_name"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let items = group
                .get(items_key)
                .or_else(|| group.get("items"))
                .cloned()
                .unwrap_or(Value::Null);
            json!({
                group_key: name,
                items_key: named_entries(Some(&items)),
            })
        })
        .collect()
}

/// An ungrouped legacy list: entries with neither a group label nor a nested
/// item list.
fn is_legacy_flat_list(groups: &Value, group_key: &str, items_key: &str) -> bool {
    groups.as_array().is_some_and(|items| {
        !items.is_empty()
            && items
                .iter()
                .all(|item| item.get(group_key).is_none() && item.get(items_key).is_none())
    })
}

fn normalize_grouped_field(
    parsed: &Value,
    aliases: &[&str],
    wrapper_path: &str,
    group_key: &str,
    items_key: &str,
) -> Value {
    let groups = aliases
        .iter()
        .find_map(|alias| {
            let found = parsed.get(*alias)?;
            found.is_array().then_some(found)
        })
        .or_else(|| {
            let nested = parsed.get("contextConstraints")?.get(wrapper_path)?;
            nested.is_array().then_some(nested)
        })
        .cloned()
        .unwrap_or(json!([]));

    let normalized = if is_legacy_flat_list(&groups, group_key, items_key) {
        vec![json!({
            group_key: "General",
            items_key: named_entries(Some(&groups)),
        })]
    } else {
        grouped_entries(&groups, group_key, items_key)
    };
    json!({ wrapper_path: normalized })
}

fn normalize_contextual_factors(parsed: Value, _approved_document: &Value) -> Value {
    normalize_grouped_field(
        &parsed,
        &["contextual_factors", "contextualFactors"],
        "contextual_factors",
        "factor_group",
        "factors",
    )
}

fn normalize_constraints(parsed: Value, _approved_document: &Value) -> Value {
    normalize_grouped_field(
        &parsed,
        &["constraints", "constraintGroups"],
        "constraints",
        "constraint_group",
        "constraints",
    )
}

// ---------------------------------------------------------------------------
// marketAndCompetitorAnalysis.marketLandscape
// ---------------------------------------------------------------------------

fn normalize_market_landscape(parsed: Value, _approved_document: &Value) -> Value {
    let raw_definition =
        first_present(&parsed, &["market_definition", "market_landscape", "marketLandscape"]);
    let market_definition = match raw_definition {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Object(map)) => map
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    };

    let alternatives = parsed.get("alternatives").cloned().unwrap_or(json!({}));
    let pick = |keys: [&str; 2]| {
        first_present(&alternatives, &keys)
            .or_else(|| first_present(&parsed, &keys))
            .cloned()
    };

    json!({
        "market_definition": market_definition,
        "alternatives": {
            "direct_competitor_segments": to_name_list(
                pick(["direct_competitor_segments", "direct_competitors"]).as_ref()
            ),
            "indirect_competitor_segments": to_name_list(
                pick(["indirect_competitor_segments", "indirect_competitors"]).as_ref()
            ),
            "substitute_segments": to_name_list(
                pick(["substitute_segments", "non_product_substitutes"]).as_ref()
            ),
        },
        "market_norms": to_name_list(parsed.get("market_norms")),
        "adoption_drivers": to_name_list(parsed.get("adoption_drivers")),
        "adoption_barriers": to_name_list(parsed.get("adoption_barriers")),
    })
}

// ---------------------------------------------------------------------------
// marketAndCompetitorAnalysis.competitorInventory
// ---------------------------------------------------------------------------

const GENERIC_NAME_WORDS: &[&str] = &[
    "software", "platform", "solution", "tool", "service", "system", "app", "product", "suite",
];

fn is_generic_product_name(name: &str) -> bool {
    if name.trim().is_empty() {
        return true;
    }
    let lowered = name.to_lowercase();
    GENERIC_NAME_WORDS.iter().any(|word| lowered.contains(word))
}

fn competitor_entry(item: &Value) -> Value {
    let name = item
        .get("product_name")
        .or_else(|| item.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    json!({
        "product_name": name,
        "url": str_field(item, "url"),
        "description": str_field(item, "description"),
        "target_audience": str_field(item, "target_audience"),
        "positioning": str_field(item, "positioning"),
    })
}

/// Drop entries that name nothing, or whose name is generic and carries no
/// URL to anchor it to a real product.
fn sanitize_competitors(items: Option<&Value>) -> Vec<Value> {
    let Some(items) = items.and_then(Value::as_array) else {
        return vec![];
    };
    items
        .iter()
        .filter(|item| {
            let name = item
                .get("product_name")
                .or_else(|| item.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if name.trim().is_empty() {
                return false;
            }
            if item.get("url").and_then(Value::as_str).is_some_and(|url| !url.is_empty()) {
                return true;
            }
            !is_generic_product_name(name)
        })
        .cloned()
        .collect()
}

fn normalize_competitor_group(grouped: Option<&Value>) -> Value {
    let items_of = |category: &str| -> Vec<Value> {
        sanitize_competitors(grouped.and_then(|group| group.get(category)))
            .iter()
            .map(competitor_entry)
            .collect()
    };
    json!({
        "direct": items_of("direct"),
        "indirect": items_of("indirect"),
        "substitute": items_of("substitute"),
    })
}

fn split_competitors_by_category(list: &Value) -> Value {
    let sanitized = sanitize_competitors(Some(list));
    let mut direct = vec![];
    let mut indirect = vec![];
    let mut substitute = vec![];
    for item in &sanitized {
        let entry = competitor_entry(item);
        match item.get("category").and_then(Value::as_str) {
            Some("indirect") => indirect.push(entry),
            Some("substitute") => substitute.push(entry),
            _ => direct.push(entry),
        }
    }
    json!({"direct": direct, "indirect": indirect, "substitute": substitute})
}

fn normalize_competitor_inventory(parsed: Value, _approved_document: &Value) -> Value {
    for wrapper in ["competitor_inventory", "competitorInventory"] {
        if let Some(competitors) = parsed.get(wrapper).and_then(|inner| inner.get("competitors")) {
            return json!({"competitors": normalize_competitor_group(Some(competitors))});
        }
    }
    match parsed.get("competitors").or_else(|| parsed.get("Competitors")) {
        Some(list @ Value::Array(_)) => {
            json!({"competitors": split_competitors_by_category(list)})
        }
        Some(grouped @ Value::Object(_)) => {
            json!({"competitors": normalize_competitor_group(Some(grouped))})
        }
        _ => parsed,
    }
}

/// Semantic check applied on top of schema validation: every competitor must
/// be a specific, named product with a plausible official URL.
pub fn validate_competitor_inventory(value: &Value) -> Vec<String> {
    let mut errors = vec![];
    let Some(competitors) = value.get("competitors").and_then(Value::as_object) else {
        return errors;
    };
    for category in ["direct", "indirect", "substitute"] {
        let items = competitors
            .get(category)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for (index, item) in items.iter().enumerate() {
            let name = item
                .get("product_name")
                .or_else(|| item.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if is_generic_product_name(name) {
                errors.push(format!(
                    "competitors.{category}[{index}].product_name: Must be a specific product or company name (no generic categories)."
                ));
            }
            if let Some(url) = item.get("url").and_then(Value::as_str)
                && !url.is_empty()
                && !is_valid_competitor_url(url)
            {
                errors.push(format!(
                    "competitors.{category}[{index}].url: Must be a valid official product URL (no app stores/review sites)."
                ));
            }
        }
    }
    errors
}

const BLOCKED_URL_HOSTS: &[&str] = &[
    "play.google.com",
    "apps.apple.com",
    "itunes.apple.com",
    "g2.com",
    "capterra.com",
    "trustpilot.com",
];

fn is_valid_competitor_url(url: &str) -> bool {
    let trimmed = url.trim();
    let rest = if let Some(rest) = trimmed.strip_prefix("https://") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        rest
    } else {
        return false;
    };
    let host = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .split(':')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    if host.is_empty() || !host.contains('.') {
        return false;
    }
    !BLOCKED_URL_HOSTS
        .iter()
        .any(|blocked| host == *blocked || host.ends_with(&format!(".{blocked}")))
}

// ---------------------------------------------------------------------------
// marketAndCompetitorAnalysis.competitorCapabilities
// ---------------------------------------------------------------------------

/// Accept a newline-joined string, a plain list, or an alias key as a list
/// of strings.
fn string_list_or_split(item: &Value, key: &str, aliases: &[&str]) -> Vec<Value> {
    match item.get(key) {
        Some(Value::Array(entries)) => entries.clone(),
        Some(Value::String(text)) => text
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .map(Value::String)
            .collect(),
        _ => aliases
            .iter()
            .find_map(|alias| item.get(*alias))
            .map(|found| match found {
                Value::Array(entries) => entries.clone(),
                Value::String(text) => vec![json!(text)],
                _ => vec![],
            })
            .unwrap_or_default(),
    }
}

fn normalize_capability_items(items: Option<&Value>) -> Vec<Value> {
    let Some(items) = items.and_then(Value::as_array) else {
        return vec![];
    };
    items
        .iter()
        .map(|item| {
            json!({
                "capability": str_field(item, "capability"),
                "alignment_with_user_needs": str_field(item, "alignment_with_user_needs"),
                "owning_competitors": string_list_or_split(
                    item, "owning_competitors", &["competitor_name"]
                ),
                "gaps_and_limitations": string_list_or_split(
                    item, "gaps_and_limitations", &["limitations"]
                ),
            })
        })
        .collect()
}

fn normalize_capability_buckets(value: Option<&Value>) -> Value {
    json!({
        "Functional": normalize_capability_items(value.and_then(|v| v.get("Functional"))),
        "Technical": normalize_capability_items(value.and_then(|v| v.get("Technical"))),
        "Business": normalize_capability_items(value.and_then(|v| v.get("Business"))),
    })
}

fn bucket_for_group_label(label: &str) -> &'static str {
    let lowered = label.to_lowercase();
    if lowered.contains("technical") {
        "Technical"
    } else if lowered.contains("business") {
        "Business"
    } else {
        "Functional"
    }
}

fn normalize_competitor_capabilities(parsed: Value, _approved_document: &Value) -> Value {
    if let Some(inner) = parsed
        .get("competitorCapabilities")
        .and_then(|wrapper| wrapper.get("competitor_capabilities"))
    {
        return json!({"competitor_capabilities": normalize_capability_buckets(Some(inner))});
    }
    match parsed.get("competitor_capabilities") {
        // Flat list: bucket each item by its group label.
        Some(Value::Array(items)) => {
            let mut buckets = serde_json::Map::new();
            for bucket in ["Functional", "Technical", "Business"] {
                buckets.insert(bucket.to_string(), json!([]));
            }
            for item in items {
                let label = item
                    .get("capability_group")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let bucket = bucket_for_group_label(label);
                let normalized = normalize_capability_items(Some(&json!([item])));
                if let Some(Value::Array(entries)) = buckets.get_mut(bucket) {
                    entries.extend(normalized);
                }
            }
            return json!({"competitor_capabilities": Value::Object(buckets)});
        }
        Some(grouped @ Value::Object(_)) => {
            return json!({
                "competitor_capabilities": normalize_capability_buckets(Some(grouped))
            });
        }
        _ => {}
    }
    if let Some(by_group) = parsed.get("competitor_capabilities_by_group") {
        return json!({"competitor_capabilities": normalize_capability_buckets(Some(by_group))});
    }
    if ["functional_capabilities", "technical_capabilities", "business_capabilities"]
        .iter()
        .any(|key| parsed.get(*key).is_some())
    {
        return json!({
            "competitor_capabilities": {
                "Functional": normalize_capability_items(parsed.get("functional_capabilities")),
                "Technical": normalize_capability_items(parsed.get("technical_capabilities")),
                "Business": normalize_capability_items(parsed.get("business_capabilities")),
            }
        });
    }
    if let Some(label) = parsed.get("capability_group").and_then(Value::as_str) {
        let bucket = bucket_for_group_label(label);
        let items = normalize_capability_items(Some(&json!([parsed])));
        let mut buckets = serde_json::Map::new();
        for name in ["Functional", "Technical", "Business"] {
            let entries = if name == bucket { items.clone() } else { vec![] };
            buckets.insert(name.to_string(), Value::Array(entries));
        }
        return json!({"competitor_capabilities": Value::Object(buckets)});
    }
    parsed
}

// ---------------------------------------------------------------------------
// marketAndCompetitorAnalysis.gapsOpportunities
// ---------------------------------------------------------------------------

fn normalize_opportunity(item: &Value) -> Value {
    if !item.is_object() {
        return item.clone();
    }
    let opportunity = first_present(
        item,
        &["opportunity", "opportunity_description", "gap_description", "description"],
    )
    .and_then(Value::as_str)
    .unwrap_or_default();
    let why = first_present(
        item,
        &["why_it_remains_unaddressed", "persistence_reason", "reason", "why"],
    )
    .and_then(Value::as_str)
    .unwrap_or_default();
    let user_value = item
        .get("user_value_potential")
        .and_then(Value::as_str)
        .unwrap_or_default();
    // Back-fill a missing confidence attribute with the default.
    let confidence = match item.get("confidence").and_then(Value::as_str) {
        Some(level @ ("low" | "medium" | "high")) => level,
        _ => "medium",
    };
    json!({
        "opportunity": opportunity,
        "why_it_remains_unaddressed": why,
        "user_value_potential": user_value,
        "confidence": confidence,
    })
}

fn normalize_gaps_opportunities(parsed: Value, _approved_document: &Value) -> Value {
    if let Some(opportunities) = parsed.get("opportunities").and_then(Value::as_array) {
        return json!({
            "opportunities": opportunities.iter().map(normalize_opportunity).collect::<Vec<_>>()
        });
    }
    if let Some(opportunities) = parsed
        .get("gapsOpportunities")
        .and_then(|inner| inner.get("opportunities"))
        .and_then(Value::as_array)
    {
        return json!({
            "opportunities": opportunities.iter().map(normalize_opportunity).collect::<Vec<_>>()
        });
    }
    if let Some(legacy) = parsed.get("gaps_and_opportunities").and_then(Value::as_object) {
        let merged: Vec<Value> = ["functional", "technical", "business"]
            .iter()
            .flat_map(|bucket| {
                legacy
                    .get(*bucket)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default()
            })
            .collect();
        return json!({
            "opportunities": merged.iter().map(normalize_opportunity).collect::<Vec<_>>()
        });
    }
    parsed
}

// ---------------------------------------------------------------------------
// opportunityDefinition.valueDrivers
// ---------------------------------------------------------------------------

fn stringify_drivers(value: Option<&Value>) -> Vec<Value> {
    let Some(items) = value.and_then(Value::as_array) else {
        return vec![];
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .filter(|driver| !driver.is_empty())
        .map(Value::String)
        .collect()
}

fn normalize_value_drivers(parsed: Value, _approved_document: &Value) -> Value {
    let drivers = parsed
        .get("valueDrivers")
        .and_then(|inner| inner.get("value_drivers"))
        .or_else(|| parsed.get("value_drivers"))
        .or_else(|| parsed.get("Value Drivers"));
    match drivers {
        Some(found) => json!({"value_drivers": stringify_drivers(Some(found))}),
        None => parsed,
    }
}

// ---------------------------------------------------------------------------
// opportunityDefinition.feasibilityRisks
// ---------------------------------------------------------------------------

fn normalize_feasibility_risks(parsed: Value, _approved_document: &Value) -> Value {
    let raw = parsed
        .get("feasibility_risks")
        .or_else(|| {
            parsed
                .get("feasibilityRisks")
                .and_then(|inner| inner.get("feasibility_risks"))
        })
        .and_then(Value::as_array)
        .cloned();
    let Some(raw) = raw else {
        return parsed;
    };

    // Already grouped: entries carry their own risk lists.
    if raw.iter().any(|item| item.get("risks").and_then(Value::as_array).is_some()) {
        return json!({"feasibility_risks": raw});
    }

    let groups: Vec<Value> = ["business", "user", "technical"]
        .into_iter()
        .map(|risk_type| {
            let risks: Vec<Value> = raw
                .iter()
                .filter(|item| {
                    item.get("feasibility_risk_type").and_then(Value::as_str) == Some(risk_type)
                })
                .map(|item| {
                    json!({
                        "feasibility_risk": str_field(item, "feasibility_risk"),
                        "why_it_matters": str_field(item, "why_it_matters"),
                    })
                })
                .collect();
            json!({"feasibility_risk_type": risk_type, "risks": risks})
        })
        .collect();
    json!({"feasibility_risks": groups})
}
