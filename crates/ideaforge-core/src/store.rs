//! The record store port.
//!
//! The workflow engine persists every transition through this trait. Store
//! unavailability is always a fatal, immediately-surfaced error -- there is
//! no local fallback store.

use std::future::Future;

use ideaforge_types::error::StoreError;
use ideaforge_types::record::DiscoveryRecord;

/// Versioned record store consumed by the workflow engine.
///
/// The engine computes the next version as `(latest version or 0) + 1` and
/// never reuses or decrements version numbers. Uses RPITIT consistent with
/// the other collaborator traits.
pub trait RecordStore: Send + Sync {
    /// The highest-versioned record, optionally scoped (e.g. per project).
    fn fetch_latest(
        &self,
        scope: Option<&str>,
    ) -> impl Future<Output = Result<Option<DiscoveryRecord>, StoreError>> + Send;

    /// Fetch one record by its version number.
    fn fetch_by_version(
        &self,
        version: u32,
    ) -> impl Future<Output = Result<Option<DiscoveryRecord>, StoreError>> + Send;

    /// Insert a new version. The version must not already exist.
    fn insert(
        &self,
        version: u32,
        record: &DiscoveryRecord,
    ) -> impl Future<Output = Result<DiscoveryRecord, StoreError>> + Send;

    /// Overwrite an existing version with a full record.
    fn update(
        &self,
        version: u32,
        record: &DiscoveryRecord,
    ) -> impl Future<Output = Result<DiscoveryRecord, StoreError>> + Send;
}
