use async_trait::async_trait;
use dashview_core::{
    CatalogClient, ColumnInfo, ColumnsResponse, ConnectionCheck, ConnectionStatus, DatabaseInfo,
    DatabasesResponse, ExplorerError, SchemaInfo, SchemasResponse, SourceConfig, SourceInfo,
    SourcesResponse, TableInfo, TablesResponse,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// One request made against the fake catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CatalogCall {
    Sources,
    Databases {
        source: String,
    },
    Schemas {
        source: String,
        database: String,
    },
    Tables {
        source: String,
        database: String,
        schema: Option<String>,
    },
    Columns {
        source: String,
        database: String,
        schema: Option<String>,
        table: String,
    },
    TestConnection {
        source: String,
    },
}

impl CatalogCall {
    pub fn databases(source: &str) -> Self {
        Self::Databases {
            source: source.into(),
        }
    }

    pub fn schemas(source: &str, database: &str) -> Self {
        Self::Schemas {
            source: source.into(),
            database: database.into(),
        }
    }

    pub fn tables(source: &str, database: &str, schema: Option<&str>) -> Self {
        Self::Tables {
            source: source.into(),
            database: database.into(),
            schema: schema.map(String::from),
        }
    }

    pub fn columns(source: &str, database: &str, schema: Option<&str>, table: &str) -> Self {
        Self::Columns {
            source: source.into(),
            database: database.into(),
            schema: schema.map(String::from),
            table: table.into(),
        }
    }

    pub fn test_connection(source: &str) -> Self {
        Self::TestConnection {
            source: source.into(),
        }
    }
}

impl fmt::Display for CatalogCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sources => write!(f, "sources"),
            Self::Databases { source } => write!(f, "databases:{}", source),
            Self::Schemas { source, database } => write!(f, "schemas:{}.{}", source, database),
            Self::Tables {
                source,
                database,
                schema,
            } => write!(
                f,
                "tables:{}.{}.{}",
                source,
                database,
                schema.as_deref().unwrap_or("-")
            ),
            Self::Columns {
                source,
                database,
                schema,
                table,
            } => write!(
                f,
                "columns:{}.{}.{}.{}",
                source,
                database,
                schema.as_deref().unwrap_or("-"),
                table
            ),
            Self::TestConnection { source } => write!(f, "test_connection:{}", source),
        }
    }
}

/// Start/finish marker recorded around every call, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    Started(CatalogCall),
    Finished(CatalogCall),
}

impl fmt::Display for CallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started(call) => write!(f, "start {}", call),
            Self::Finished(call) => write!(f, "end {}", call),
        }
    }
}

#[derive(Debug, Clone)]
enum FakeOutcome {
    Sources(SourcesResponse),
    Databases(DatabasesResponse),
    Schemas(SchemasResponse),
    Tables(TablesResponse),
    Columns(ColumnsResponse),
    Check(ConnectionCheck),
    Reject(String),
}

#[derive(Debug, Clone, Default)]
pub struct FakeCatalogStats {
    pub events: Vec<CallEvent>,
}

impl FakeCatalogStats {
    pub fn calls(&self) -> Vec<CatalogCall> {
        self.events
            .iter()
            .filter_map(|event| match event {
                CallEvent::Started(call) => Some(call.clone()),
                CallEvent::Finished(_) => None,
            })
            .collect()
    }

    pub fn call_count(&self, call: &CatalogCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn event_labels(&self) -> Vec<String> {
        self.events.iter().map(ToString::to_string).collect()
    }
}

#[derive(Default)]
struct FakeCatalogState {
    outcomes: RwLock<HashMap<CatalogCall, FakeOutcome>>,
    latency: RwLock<HashMap<CatalogCall, Duration>>,
    default_latency: RwLock<Duration>,
    events: Mutex<Vec<CallEvent>>,
}

/// Scripted `CatalogClient` for tests.
///
/// Every call is recorded. Calls that were not scripted fail with a fetch
/// error naming the call.
#[derive(Clone, Default)]
pub struct FakeCatalog {
    state: Arc<FakeCatalogState>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sources(self, sources: Vec<SourceInfo>) -> Self {
        self.set_outcome(
            CatalogCall::Sources,
            FakeOutcome::Sources(SourcesResponse {
                sources,
                error: None,
            }),
        );
        self
    }

    pub fn with_databases(self, source: &str, names: &[&str]) -> Self {
        self.set_outcome(
            CatalogCall::databases(source),
            FakeOutcome::Databases(DatabasesResponse {
                databases: names
                    .iter()
                    .map(|name| DatabaseInfo {
                        name: name.to_string(),
                    })
                    .collect(),
                status: ConnectionStatus::Connected,
                error: None,
            }),
        );
        self
    }

    /// Databases payload reporting that the source could not be reached.
    pub fn with_unreachable_source(self, source: &str, error: &str) -> Self {
        self.set_outcome(
            CatalogCall::databases(source),
            FakeOutcome::Databases(DatabasesResponse {
                databases: Vec::new(),
                status: ConnectionStatus::ConnectionFailed,
                error: Some(error.to_string()),
            }),
        );
        self
    }

    pub fn with_schemas(self, source: &str, database: &str, names: &[&str]) -> Self {
        self.set_outcome(
            CatalogCall::schemas(source, database),
            FakeOutcome::Schemas(SchemasResponse {
                schemas: Some(
                    names
                        .iter()
                        .map(|name| SchemaInfo {
                            name: name.to_string(),
                        })
                        .collect(),
                ),
                has_schemas: true,
                error: None,
            }),
        );
        self
    }

    pub fn without_schemas(self, source: &str, database: &str) -> Self {
        self.set_outcome(
            CatalogCall::schemas(source, database),
            FakeOutcome::Schemas(SchemasResponse {
                schemas: None,
                has_schemas: false,
                error: None,
            }),
        );
        self
    }

    pub fn with_tables(
        self,
        source: &str,
        database: &str,
        schema: Option<&str>,
        names: &[&str],
    ) -> Self {
        self.set_outcome(
            CatalogCall::tables(source, database, schema),
            FakeOutcome::Tables(TablesResponse {
                tables: names
                    .iter()
                    .map(|name| TableInfo {
                        name: name.to_string(),
                    })
                    .collect(),
                error: None,
            }),
        );
        self
    }

    pub fn with_columns(
        self,
        source: &str,
        database: &str,
        schema: Option<&str>,
        table: &str,
        columns: &[(&str, &str)],
    ) -> Self {
        self.set_outcome(
            CatalogCall::columns(source, database, schema, table),
            FakeOutcome::Columns(ColumnsResponse {
                columns: columns
                    .iter()
                    .map(|(name, type_name)| ColumnInfo {
                        name: name.to_string(),
                        type_name: type_name.to_string(),
                    })
                    .collect(),
                error: None,
            }),
        );
        self
    }

    pub fn with_connection_check(self, source: &str, check: ConnectionCheck) -> Self {
        self.set_outcome(CatalogCall::test_connection(source), FakeOutcome::Check(check));
        self
    }

    /// Makes `call` reject with `message`.
    pub fn with_rejection(self, call: CatalogCall, message: impl Into<String>) -> Self {
        self.set_outcome(call, FakeOutcome::Reject(message.into()));
        self
    }

    /// Makes `call` resolve with an error payload instead of rejecting.
    pub fn with_error_payload(self, call: CatalogCall, message: impl Into<String>) -> Self {
        let error = Some(message.into());
        let outcome = match &call {
            CatalogCall::Sources => FakeOutcome::Sources(SourcesResponse {
                sources: Vec::new(),
                error,
            }),
            CatalogCall::Databases { .. } => FakeOutcome::Databases(DatabasesResponse {
                databases: Vec::new(),
                status: ConnectionStatus::Connected,
                error,
            }),
            CatalogCall::Schemas { .. } => FakeOutcome::Schemas(SchemasResponse {
                schemas: None,
                has_schemas: false,
                error,
            }),
            CatalogCall::Tables { .. } => FakeOutcome::Tables(TablesResponse {
                tables: Vec::new(),
                error,
            }),
            CatalogCall::Columns { .. } => FakeOutcome::Columns(ColumnsResponse {
                columns: Vec::new(),
                error,
            }),
            CatalogCall::TestConnection { .. } => FakeOutcome::Check(ConnectionCheck {
                status: ConnectionStatus::ConnectionFailed,
                error,
            }),
        };
        self.set_outcome(call, outcome);
        self
    }

    /// Delay applied to every call before it answers.
    pub fn with_latency(self, latency: Duration) -> Self {
        *rwlock_write(&self.state.default_latency) = latency;
        self
    }

    /// Delay for one specific call, overriding the default latency.
    pub fn with_call_latency(self, call: CatalogCall, latency: Duration) -> Self {
        rwlock_write(&self.state.latency).insert(call, latency);
        self
    }

    pub fn stats(&self) -> FakeCatalogStats {
        FakeCatalogStats {
            events: mutex_lock(&self.state.events).clone(),
        }
    }

    pub fn as_client_arc(self) -> Arc<dyn CatalogClient> {
        Arc::new(self)
    }

    fn set_outcome(&self, call: CatalogCall, outcome: FakeOutcome) {
        rwlock_write(&self.state.outcomes).insert(call, outcome);
    }

    async fn answer(&self, call: CatalogCall) -> Result<FakeOutcome, ExplorerError> {
        mutex_lock(&self.state.events).push(CallEvent::Started(call.clone()));

        let latency = rwlock_read(&self.state.latency)
            .get(&call)
            .copied()
            .unwrap_or_else(|| *rwlock_read(&self.state.default_latency));

        if latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(latency).await;
        }

        let outcome = rwlock_read(&self.state.outcomes).get(&call).cloned();
        mutex_lock(&self.state.events).push(CallEvent::Finished(call.clone()));

        match outcome {
            Some(FakeOutcome::Reject(message)) => Err(ExplorerError::fetch_failed(message)),
            Some(outcome) => Ok(outcome),
            None => Err(ExplorerError::fetch_failed(format!("not scripted: {}", call))),
        }
    }
}

fn unexpected(call: &str) -> ExplorerError {
    ExplorerError::fetch_failed(format!("scripted outcome does not match {}", call))
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn fetch_sources(&self) -> Result<SourcesResponse, ExplorerError> {
        match self.answer(CatalogCall::Sources).await? {
            FakeOutcome::Sources(response) => Ok(response),
            _ => Err(unexpected("sources")),
        }
    }

    async fn fetch_databases(&self, source: &str) -> Result<DatabasesResponse, ExplorerError> {
        match self.answer(CatalogCall::databases(source)).await? {
            FakeOutcome::Databases(response) => Ok(response),
            _ => Err(unexpected("databases")),
        }
    }

    async fn fetch_schemas(
        &self,
        source: &str,
        database: &str,
    ) -> Result<SchemasResponse, ExplorerError> {
        match self.answer(CatalogCall::schemas(source, database)).await? {
            FakeOutcome::Schemas(response) => Ok(response),
            _ => Err(unexpected("schemas")),
        }
    }

    async fn fetch_tables(
        &self,
        source: &str,
        database: &str,
        schema: Option<&str>,
    ) -> Result<TablesResponse, ExplorerError> {
        match self
            .answer(CatalogCall::tables(source, database, schema))
            .await?
        {
            FakeOutcome::Tables(response) => Ok(response),
            _ => Err(unexpected("tables")),
        }
    }

    async fn fetch_columns(
        &self,
        source: &str,
        database: &str,
        table: &str,
        schema: Option<&str>,
    ) -> Result<ColumnsResponse, ExplorerError> {
        match self
            .answer(CatalogCall::columns(source, database, schema, table))
            .await?
        {
            FakeOutcome::Columns(response) => Ok(response),
            _ => Err(unexpected("columns")),
        }
    }

    async fn test_connection(
        &self,
        config: &SourceConfig,
    ) -> Result<ConnectionCheck, ExplorerError> {
        match self
            .answer(CatalogCall::test_connection(&config.name))
            .await?
        {
            FakeOutcome::Check(check) => Ok(check),
            _ => Err(unexpected("test_connection")),
        }
    }
}

fn rwlock_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    }
}

fn rwlock_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    }
}

fn mutex_lock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    }
}
