//! The discovery field catalog.
//!
//! A discovery document is generated one field at a time, in the order this
//! catalog declares. The ordering is load-bearing: it is both the generation
//! order (later fields consume earlier, approved fields as prompt context)
//! and the invalidation order (clearing or regenerating a field resets every
//! field after it).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// The JSON shape a field's value takes inside the discovery document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Array,
    Object,
}

impl FieldType {
    /// The structurally-empty value for this type (`""`, `[]`, or `{}`).
    pub fn empty_value(&self) -> Value {
        match self {
            FieldType::String => json!(""),
            FieldType::Array => json!([]),
            FieldType::Object => json!({}),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "string"),
            FieldType::Array => write!(f, "array"),
            FieldType::Object => write!(f, "object"),
        }
    }
}

/// One addressable leaf of the discovery document.
///
/// `key` is a dot-path into the nested document object. `section` groups
/// fields that share a prompt template and schema fragment. `output_key` is
/// the top-level key the model is asked to emit for this field; when
/// `wrap_output_key` is set the extracted value is re-wrapped under that key
/// before validation (the section schemas describe the wrapped shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDefinition {
    pub key: &'static str,
    pub label: &'static str,
    pub section: &'static str,
    pub field_type: FieldType,
    pub output_key: Option<&'static str>,
    pub wrap_output_key: bool,
}

impl FieldDefinition {
    /// The last segment of the dot-path key (e.g. `problemStatement`).
    pub fn name(&self) -> &'static str {
        self.key.rsplit('.').next().unwrap_or(self.key)
    }

    /// The key the model is expected to emit for this field: the declared
    /// `output_key` when present, else the field name.
    pub fn display_key(&self) -> &'static str {
        self.output_key.unwrap_or_else(|| self.name())
    }
}

/// Section identifiers, used to locate prompt and schema assets.
pub const SECTION_PROBLEM_UNDERSTANDING: &str = "problem-understanding";
pub const SECTION_MARKET_ANALYSIS: &str = "market-and-competitor-analysis";
pub const SECTION_OPPORTUNITY_DEFINITION: &str = "opportunity-definition";

/// The ordered discovery field catalog.
pub const FIELD_DEFINITIONS: &[FieldDefinition] = &[
    FieldDefinition {
        key: "problemUnderstanding.problemStatement",
        label: "Problem Statement",
        section: SECTION_PROBLEM_UNDERSTANDING,
        field_type: FieldType::String,
        output_key: None,
        wrap_output_key: false,
    },
    FieldDefinition {
        key: "problemUnderstanding.targetUsersSegments",
        label: "Target Users & Segments",
        section: SECTION_PROBLEM_UNDERSTANDING,
        field_type: FieldType::Object,
        output_key: Some("user_segments"),
        wrap_output_key: true,
    },
    FieldDefinition {
        key: "problemUnderstanding.userPainPoints",
        label: "User Pain Points",
        section: SECTION_PROBLEM_UNDERSTANDING,
        field_type: FieldType::Object,
        output_key: Some("pain_point_themes"),
        wrap_output_key: false,
    },
    FieldDefinition {
        key: "problemUnderstanding.contextualFactors",
        label: "Contextual Factors",
        section: SECTION_PROBLEM_UNDERSTANDING,
        field_type: FieldType::Object,
        output_key: Some("contextual_factors"),
        wrap_output_key: true,
    },
    FieldDefinition {
        key: "problemUnderstanding.constraints",
        label: "Constraints",
        section: SECTION_PROBLEM_UNDERSTANDING,
        field_type: FieldType::Object,
        output_key: Some("constraints"),
        wrap_output_key: true,
    },
    FieldDefinition {
        key: "marketAndCompetitorAnalysis.marketLandscape",
        label: "Market Landscape",
        section: SECTION_MARKET_ANALYSIS,
        field_type: FieldType::Object,
        output_key: None,
        wrap_output_key: false,
    },
    FieldDefinition {
        key: "marketAndCompetitorAnalysis.competitorInventory",
        label: "Competitor Inventory",
        section: SECTION_MARKET_ANALYSIS,
        field_type: FieldType::Object,
        output_key: Some("competitors"),
        wrap_output_key: true,
    },
    FieldDefinition {
        key: "marketAndCompetitorAnalysis.competitorCapabilities",
        label: "Competitor Capabilities",
        section: SECTION_MARKET_ANALYSIS,
        field_type: FieldType::Object,
        output_key: Some("competitor_capabilities"),
        wrap_output_key: true,
    },
    FieldDefinition {
        key: "marketAndCompetitorAnalysis.gapsOpportunities",
        label: "Gaps & Opportunities",
        section: SECTION_MARKET_ANALYSIS,
        field_type: FieldType::Object,
        output_key: Some("opportunities"),
        wrap_output_key: true,
    },
    FieldDefinition {
        key: "opportunityDefinition.opportunityStatement",
        label: "Opportunity Statement",
        section: SECTION_OPPORTUNITY_DEFINITION,
        field_type: FieldType::Object,
        output_key: Some("opportunity_statement"),
        wrap_output_key: true,
    },
    FieldDefinition {
        key: "opportunityDefinition.valueDrivers",
        label: "Value Drivers",
        section: SECTION_OPPORTUNITY_DEFINITION,
        field_type: FieldType::Object,
        output_key: Some("value_drivers"),
        wrap_output_key: true,
    },
    FieldDefinition {
        key: "opportunityDefinition.marketFitHypothesis",
        label: "Market Fit Hypothesis",
        section: SECTION_OPPORTUNITY_DEFINITION,
        field_type: FieldType::Object,
        output_key: Some("market_fit_hypothesis"),
        wrap_output_key: true,
    },
    FieldDefinition {
        key: "opportunityDefinition.feasibilityRisks",
        label: "Feasibility Risks",
        section: SECTION_OPPORTUNITY_DEFINITION,
        field_type: FieldType::Object,
        output_key: Some("feasibility_risks"),
        wrap_output_key: true,
    },
];

/// Look up a field definition by its dot-path key.
pub fn field_by_key(key: &str) -> Option<&'static FieldDefinition> {
    FIELD_DEFINITIONS.iter().find(|field| field.key == key)
}

/// Position of a field in the catalog order.
pub fn field_index(key: &str) -> Option<usize> {
    FIELD_DEFINITIONS.iter().position(|field| field.key == key)
}

/// A caller-supplied input the workflow requires before any generation
/// starts, with the question to re-prompt the caller when it is missing.
#[derive(Debug, Clone, Copy)]
pub struct RequiredInput {
    pub key: &'static str,
    pub question: &'static str,
}

/// Inputs that must be present and non-blank to start a discovery draft.
pub const REQUIRED_INPUTS: &[RequiredInput] = &[RequiredInput {
    key: "productIdea",
    question: "What product idea should the discovery document explore?",
}];
