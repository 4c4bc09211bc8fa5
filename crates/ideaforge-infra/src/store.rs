//! PostgREST-style HTTP record store.
//!
//! One row per version: `{version, record, scope, updated_at}` with the
//! full [`DiscoveryRecord`] serialized into the `record` column. The
//! service key is wrapped in [`secrecy::SecretString`] and only exposed
//! when building request headers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ideaforge_core::store::RecordStore;
use ideaforge_types::error::StoreError;
use ideaforge_types::record::DiscoveryRecord;

use crate::config::StoreConfig;

/// One row of the records table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRow {
    pub version: u32,
    pub record: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl RecordRow {
    fn into_record(self) -> Result<DiscoveryRecord, StoreError> {
        let mut record: DiscoveryRecord = serde_json::from_value(self.record)
            .map_err(|err| StoreError::Deserialization(err.to_string()))?;
        // The row's version column is authoritative.
        record.version = self.version;
        Ok(record)
    }
}

/// [`RecordStore`] over a PostgREST-compatible endpoint.
pub struct RestRecordStore {
    client: reqwest::Client,
    base_url: String,
    service_key: SecretString,
    table: String,
}

impl RestRecordStore {
    pub fn new(
        base_url: impl Into<String>,
        service_key: SecretString,
        table: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to create reqwest client");
        Self {
            client,
            base_url: base_url.into(),
            service_key,
            table: table.into(),
        }
    }

    /// Build a store from configuration. Fails when the endpoint or key is
    /// not configured -- there is no local fallback store.
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        let base_url = config.base_url.clone().ok_or_else(|| {
            StoreError::NotConfigured("store.base_url is not set".to_string())
        })?;
        let service_key = config.service_key.clone().ok_or_else(|| {
            StoreError::NotConfigured("store.service_key is not set".to_string())
        })?;
        Ok(Self::new(
            base_url,
            SecretString::from(service_key),
            config.table.clone(),
        ))
    }

    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.base_url.trim_end_matches('/'),
            self.table
        )
    }

    fn latest_query(scope: Option<&str>) -> String {
        let scope_filter = scope
            .map(|scope| format!("&scope=eq.{scope}"))
            .unwrap_or_default();
        format!("?select=version,record&order=version.desc&limit=1{scope_filter}")
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", self.service_key.expose_secret())
            .header(
                "Authorization",
                format!("Bearer {}", self.service_key.expose_secret()),
            )
    }

    /// Send a request and parse the row-list reply, mapping HTTP failures
    /// to [`StoreError`].
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Vec<RecordRow>, StoreError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Request {
                status: status.as_u16(),
                body,
            });
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(vec![]);
        }
        response
            .json()
            .await
            .map_err(|err| StoreError::Deserialization(err.to_string()))
    }

    fn row_for(version: u32, record: &DiscoveryRecord) -> Result<RecordRow, StoreError> {
        Ok(RecordRow {
            version,
            record: serde_json::to_value(record)
                .map_err(|err| StoreError::Deserialization(err.to_string()))?,
            scope: None,
            updated_at: Utc::now(),
        })
    }
}

impl RecordStore for RestRecordStore {
    async fn fetch_latest(
        &self,
        scope: Option<&str>,
    ) -> Result<Option<DiscoveryRecord>, StoreError> {
        let url = format!("{}{}", self.table_url(), Self::latest_query(scope));
        let rows = self.send(self.client.get(url)).await?;
        rows.into_iter().next().map(RecordRow::into_record).transpose()
    }

    async fn fetch_by_version(
        &self,
        version: u32,
    ) -> Result<Option<DiscoveryRecord>, StoreError> {
        let url = format!(
            "{}?select=version,record&version=eq.{version}&limit=1",
            self.table_url()
        );
        let rows = self.send(self.client.get(url)).await?;
        rows.into_iter().next().map(RecordRow::into_record).transpose()
    }

    async fn insert(
        &self,
        version: u32,
        record: &DiscoveryRecord,
    ) -> Result<DiscoveryRecord, StoreError> {
        let row = Self::row_for(version, record)?;
        let request = self
            .client
            .post(self.table_url())
            .header("Prefer", "return=representation")
            .json(&row);
        let rows = self.send(request).await?;
        tracing::debug!(version, "record row inserted");
        rows.into_iter()
            .next()
            .ok_or(StoreError::EmptyReply)?
            .into_record()
    }

    async fn update(
        &self,
        version: u32,
        record: &DiscoveryRecord,
    ) -> Result<DiscoveryRecord, StoreError> {
        let row = Self::row_for(version, record)?;
        let url = format!("{}?version=eq.{version}", self.table_url());
        let request = self
            .client
            .patch(url)
            .header("Prefer", "return=representation")
            .json(&row);
        let rows = self.send(request).await?;
        tracing::debug!(version, "record row updated");
        rows.into_iter()
            .next()
            .ok_or(StoreError::EmptyReply)?
            .into_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> RestRecordStore {
        RestRecordStore::new(
            "https://records.example.com/",
            SecretString::from("key"),
            "discovery_records",
        )
    }

    #[test]
    fn test_table_url_normalizes_trailing_slash() {
        assert_eq!(
            store().table_url(),
            "https://records.example.com/rest/v1/discovery_records"
        );
    }

    #[test]
    fn test_latest_query_with_and_without_scope() {
        assert_eq!(
            RestRecordStore::latest_query(None),
            "?select=version,record&order=version.desc&limit=1"
        );
        assert_eq!(
            RestRecordStore::latest_query(Some("proj-7")),
            "?select=version,record&order=version.desc&limit=1&scope=eq.proj-7"
        );
    }

    #[test]
    fn test_from_config_requires_endpoint_and_key() {
        let missing = StoreConfig::default();
        assert!(matches!(
            RestRecordStore::from_config(&missing),
            Err(StoreError::NotConfigured(_))
        ));

        let configured = StoreConfig {
            base_url: Some("https://records.example.com".to_string()),
            service_key: Some("key".to_string()),
            table: "drafts".to_string(),
        };
        let store = RestRecordStore::from_config(&configured).unwrap();
        assert_eq!(store.table_url(), "https://records.example.com/rest/v1/drafts");
    }

    #[test]
    fn test_row_version_is_authoritative() {
        let row = RecordRow {
            version: 9,
            record: json!({
                "version": 1,
                "timestamp": "2026-01-01T00:00:00Z",
                "productIdea": "idea",
                "discoveryDocument": {},
                "fieldStatus": {},
                "currentFieldKey": null,
                "approved": false,
                "changeReason": "Start discovery draft",
            }),
            scope: None,
            updated_at: Utc::now(),
        };
        let record = row.into_record().unwrap();
        assert_eq!(record.version, 9);
        assert_eq!(record.product_idea, "idea");
    }

    #[test]
    fn test_malformed_row_is_deserialization_error() {
        let row = RecordRow {
            version: 1,
            record: json!({"not": "a record"}),
            scope: None,
            updated_at: Utc::now(),
        };
        assert!(matches!(
            row.into_record(),
            Err(StoreError::Deserialization(_))
        ));
    }
}
