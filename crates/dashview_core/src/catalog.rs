use crate::ExplorerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Connection status reported for a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    ConnectionFailed,
    #[default]
    #[serde(other)]
    Untested,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub name: String,

    #[serde(rename = "type", default)]
    pub source_type: String,

    #[serde(default)]
    pub status: ConnectionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceInfo {
    pub fn new(name: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_type: source_type.into(),
            status: ConnectionStatus::Untested,
            error: None,
        }
    }

    pub fn with_status(mut self, status: ConnectionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.status = ConnectionStatus::ConnectionFailed;
        self.error = Some(error.into());
        self
    }

    pub fn config(&self) -> SourceConfig {
        SourceConfig {
            name: self.name.clone(),
            source_type: self.source_type.clone(),
            options: BTreeMap::new(),
        }
    }
}

/// Connection settings handed to `CatalogClient::test_connection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,

    #[serde(rename = "type", default)]
    pub source_type: String,

    #[serde(default, flatten)]
    pub options: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,

    #[serde(rename = "type", default)]
    pub type_name: String,
}

/// Cached result of a schema-level fetch, carrying the learned topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaListing {
    pub has_schemas: bool,
    pub schemas: Vec<SchemaInfo>,
}

// --- Wire payloads ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesResponse {
    #[serde(default)]
    pub sources: Vec<SourceInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabasesResponse {
    #[serde(default)]
    pub databases: Vec<DatabaseInfo>,

    #[serde(default)]
    pub status: ConnectionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemasResponse {
    #[serde(default)]
    pub schemas: Option<Vec<SchemaInfo>>,

    #[serde(default)]
    pub has_schemas: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TablesResponse {
    #[serde(default)]
    pub tables: Vec<TableInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnsResponse {
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionCheck {
    #[serde(default)]
    pub status: ConnectionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionCheck {
    pub fn connected() -> Self {
        Self {
            status: ConnectionStatus::Connected,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ConnectionStatus::ConnectionFailed,
            error: Some(error.into()),
        }
    }
}

// Error payloads are folded into `Err` here so the store only deals with one
// failure shape.

impl SourcesResponse {
    pub fn into_result(self) -> Result<Vec<SourceInfo>, ExplorerError> {
        match self.error {
            Some(error) => Err(ExplorerError::fetch_failed(error)),
            None => Ok(self.sources),
        }
    }
}

impl DatabasesResponse {
    pub fn into_result(self) -> Result<Vec<DatabaseInfo>, ExplorerError> {
        if self.status == ConnectionStatus::ConnectionFailed {
            return Err(ExplorerError::connection_failed(
                self.error.unwrap_or_else(|| "Connection failed".to_string()),
            ));
        }

        match self.error {
            Some(error) => Err(ExplorerError::fetch_failed(error)),
            None => Ok(self.databases),
        }
    }
}

impl SchemasResponse {
    pub fn into_result(self) -> Result<SchemaListing, ExplorerError> {
        if let Some(error) = self.error {
            return Err(ExplorerError::fetch_failed(error));
        }

        Ok(SchemaListing {
            has_schemas: self.has_schemas,
            schemas: self.schemas.unwrap_or_default(),
        })
    }
}

impl TablesResponse {
    pub fn into_result(self) -> Result<Vec<TableInfo>, ExplorerError> {
        match self.error {
            Some(error) => Err(ExplorerError::fetch_failed(error)),
            None => Ok(self.tables),
        }
    }
}

impl ColumnsResponse {
    pub fn into_result(self) -> Result<Vec<ColumnInfo>, ExplorerError> {
        match self.error {
            Some(error) => Err(ExplorerError::fetch_failed(error)),
            None => Ok(self.columns),
        }
    }
}

/// Backend that answers catalog queries one level at a time.
///
/// Implementations may fail either by returning `Err` or by returning a
/// payload with `error` set; `MetadataStore` treats both the same way.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn fetch_sources(&self) -> Result<SourcesResponse, ExplorerError>;

    async fn fetch_databases(&self, source: &str) -> Result<DatabasesResponse, ExplorerError>;

    async fn fetch_schemas(
        &self,
        source: &str,
        database: &str,
    ) -> Result<SchemasResponse, ExplorerError>;

    async fn fetch_tables(
        &self,
        source: &str,
        database: &str,
        schema: Option<&str>,
    ) -> Result<TablesResponse, ExplorerError>;

    async fn fetch_columns(
        &self,
        source: &str,
        database: &str,
        table: &str,
        schema: Option<&str>,
    ) -> Result<ColumnsResponse, ExplorerError>;

    async fn test_connection(&self, config: &SourceConfig)
    -> Result<ConnectionCheck, ExplorerError>;
}
