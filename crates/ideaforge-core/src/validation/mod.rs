//! The validation engine: schema-subset validation plus model-output
//! normalization.
//!
//! Section schemas are advisory sketches, not exhaustive contracts: any
//! construct outside the supported subset validates permissively. The
//! normalizers repair the alias shapes the model tends to emit before
//! validation runs.

pub mod normalize;
pub mod schema;

pub use normalize::{normalize_raw_field_value, normalizer_for, validate_competitor_inventory};
pub use schema::{SchemaReport, validate_against_schema};
