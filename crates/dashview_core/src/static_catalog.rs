use crate::catalog::{
    CatalogClient, ColumnInfo, ColumnsResponse, ConnectionCheck, ConnectionStatus, DatabaseInfo,
    DatabasesResponse, SchemaInfo, SchemasResponse, SourceConfig, SourceInfo, SourcesResponse,
    TableInfo, TablesResponse,
};
use crate::ExplorerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Whole catalog as a nested JSON document.
///
/// A database listing `schemas` has a schema level; one listing `tables`
/// directly does not. A source with `error` set behaves as unreachable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub name: String,

    #[serde(rename = "type", default)]
    pub source_type: String,

    #[serde(default)]
    pub status: Option<ConnectionStatus>,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub databases: Vec<DatabaseEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseEntry {
    pub name: String,

    #[serde(default)]
    pub schemas: Option<Vec<SchemaEntry>>,

    #[serde(default)]
    pub tables: Vec<TableEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub name: String,

    #[serde(default)]
    pub tables: Vec<TableEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableEntry {
    pub name: String,

    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
}

impl SourceEntry {
    fn status(&self) -> ConnectionStatus {
        match (self.status, &self.error) {
            (Some(status), _) => status,
            (None, Some(_)) => ConnectionStatus::ConnectionFailed,
            (None, None) => ConnectionStatus::Untested,
        }
    }
}

/// `CatalogClient` answering from an in-memory `CatalogDocument`.
pub struct StaticCatalog {
    document: CatalogDocument,
}

impl StaticCatalog {
    pub fn new(document: CatalogDocument) -> Self {
        Self { document }
    }

    pub fn from_json(json: &str) -> Result<Self, ExplorerError> {
        let document = serde_json::from_str(json)
            .map_err(|e| ExplorerError::InvalidConfig(format!("catalog document: {}", e)))?;
        Ok(Self::new(document))
    }

    pub fn from_path(path: &Path) -> Result<Self, ExplorerError> {
        let content = fs::read_to_string(path)?;
        let document = serde_json::from_str(&content).map_err(|e| {
            ExplorerError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        Ok(Self::new(document))
    }

    pub fn document(&self) -> &CatalogDocument {
        &self.document
    }

    fn source(&self, name: &str) -> Result<&SourceEntry, ExplorerError> {
        self.document
            .sources
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ExplorerError::fetch_failed(format!("Unknown source: {}", name)))
    }

    fn database(&self, source: &str, database: &str) -> Result<&DatabaseEntry, ExplorerError> {
        self.source(source)?
            .databases
            .iter()
            .find(|d| d.name == database)
            .ok_or_else(|| {
                ExplorerError::fetch_failed(format!("Unknown database: {}.{}", source, database))
            })
    }

    fn tables_of(
        &self,
        source: &str,
        database: &str,
        schema: Option<&str>,
    ) -> Result<&[TableEntry], ExplorerError> {
        let db = self.database(source, database)?;

        match (schema, &db.schemas) {
            (Some(schema), Some(schemas)) => schemas
                .iter()
                .find(|s| s.name == schema)
                .map(|s| s.tables.as_slice())
                .ok_or_else(|| {
                    ExplorerError::fetch_failed(format!(
                        "Unknown schema: {}.{}.{}",
                        source, database, schema
                    ))
                }),
            (None, None) => Ok(db.tables.as_slice()),
            (Some(schema), None) => Err(ExplorerError::fetch_failed(format!(
                "Database {}.{} has no schema {}",
                source, database, schema
            ))),
            (None, Some(_)) => Err(ExplorerError::fetch_failed(format!(
                "Database {}.{} requires a schema",
                source, database
            ))),
        }
    }
}

#[async_trait]
impl CatalogClient for StaticCatalog {
    async fn fetch_sources(&self) -> Result<SourcesResponse, ExplorerError> {
        let sources = self
            .document
            .sources
            .iter()
            .map(|s| SourceInfo {
                name: s.name.clone(),
                source_type: s.source_type.clone(),
                status: s.status(),
                error: s.error.clone(),
            })
            .collect();

        Ok(SourcesResponse {
            sources,
            error: None,
        })
    }

    async fn fetch_databases(&self, source: &str) -> Result<DatabasesResponse, ExplorerError> {
        let entry = self.source(source)?;

        if let Some(error) = &entry.error {
            return Ok(DatabasesResponse {
                databases: Vec::new(),
                status: ConnectionStatus::ConnectionFailed,
                error: Some(error.clone()),
            });
        }

        Ok(DatabasesResponse {
            databases: entry
                .databases
                .iter()
                .map(|d| DatabaseInfo {
                    name: d.name.clone(),
                })
                .collect(),
            status: ConnectionStatus::Connected,
            error: None,
        })
    }

    async fn fetch_schemas(
        &self,
        source: &str,
        database: &str,
    ) -> Result<SchemasResponse, ExplorerError> {
        let db = self.database(source, database)?;

        Ok(SchemasResponse {
            schemas: db.schemas.as_ref().map(|schemas| {
                schemas
                    .iter()
                    .map(|s| SchemaInfo {
                        name: s.name.clone(),
                    })
                    .collect()
            }),
            has_schemas: db.schemas.is_some(),
            error: None,
        })
    }

    async fn fetch_tables(
        &self,
        source: &str,
        database: &str,
        schema: Option<&str>,
    ) -> Result<TablesResponse, ExplorerError> {
        let tables = self
            .tables_of(source, database, schema)?
            .iter()
            .map(|t| TableInfo {
                name: t.name.clone(),
            })
            .collect();

        Ok(TablesResponse {
            tables,
            error: None,
        })
    }

    async fn fetch_columns(
        &self,
        source: &str,
        database: &str,
        table: &str,
        schema: Option<&str>,
    ) -> Result<ColumnsResponse, ExplorerError> {
        let columns = self
            .tables_of(source, database, schema)?
            .iter()
            .find(|t| t.name == table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| ExplorerError::fetch_failed(format!("Unknown table: {}", table)))?;

        Ok(ColumnsResponse {
            columns,
            error: None,
        })
    }

    async fn test_connection(
        &self,
        config: &SourceConfig,
    ) -> Result<ConnectionCheck, ExplorerError> {
        let entry = self.source(&config.name)?;

        Ok(match &entry.error {
            Some(error) => ConnectionCheck::failed(error.clone()),
            None => ConnectionCheck::connected(),
        })
    }
}
