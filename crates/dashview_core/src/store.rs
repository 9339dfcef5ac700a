use crate::catalog::{
    CatalogClient, ColumnInfo, ConnectionCheck, ConnectionStatus, DatabaseInfo, SchemaListing,
    SourceConfig, SourceInfo, TableInfo,
};
use crate::expansion::CatalogLoader;
use crate::{DataKey, ExplorerConfig, ExplorerError};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

/// Catalog level a cache slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CatalogLevel {
    Sources,
    Databases,
    Schemas,
    Tables,
    Columns,
    ConnectionTest,
}

/// A cache map entry plus its level; the unit of "one fetch in flight".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Slot {
    pub level: CatalogLevel,
    pub key: DataKey,
}

impl Slot {
    pub fn new(level: CatalogLevel, key: DataKey) -> Self {
        Self { level, key }
    }
}

/// Settled value of a cache slot. A slot that was never fetched has no entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry<T> {
    Loaded(T),
    Failed(String),
}

impl<T> CacheEntry<T> {
    fn from_result(result: Result<T, ExplorerError>) -> Self {
        match result {
            Ok(value) => Self::Loaded(value),
            Err(e) => Self::Failed(e.cache_message()),
        }
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            Self::Loaded(value) => Some(value),
            Self::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Loaded(_) => None,
            Self::Failed(message) => Some(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceConnection {
    pub status: ConnectionStatus,
    pub error: Option<String>,
}

impl SourceConnection {
    pub fn is_failed(&self) -> bool {
        self.status == ConnectionStatus::ConnectionFailed
    }
}

impl From<ConnectionCheck> for SourceConnection {
    fn from(check: ConnectionCheck) -> Self {
        Self {
            status: check.status,
            error: check.error,
        }
    }
}

/// Immutable copy of the store's caches, handed to the presentation layer.
#[derive(Debug, Clone, Default)]
pub struct MetadataSnapshot {
    pub(crate) sources: Option<CacheEntry<Vec<SourceInfo>>>,
    pub(crate) databases: HashMap<DataKey, CacheEntry<Vec<DatabaseInfo>>>,
    pub(crate) schemas: HashMap<DataKey, CacheEntry<SchemaListing>>,
    pub(crate) tables: HashMap<DataKey, CacheEntry<Vec<TableInfo>>>,
    pub(crate) columns: HashMap<DataKey, CacheEntry<Vec<ColumnInfo>>>,
    pub(crate) connections: HashMap<String, SourceConnection>,
    pub(crate) loading: HashSet<Slot>,
}

impl MetadataSnapshot {
    pub fn sources(&self) -> Option<&CacheEntry<Vec<SourceInfo>>> {
        self.sources.as_ref()
    }

    pub fn databases(&self, source: &str) -> Option<&CacheEntry<Vec<DatabaseInfo>>> {
        self.databases.get(&DataKey::databases(source))
    }

    pub fn schemas(&self, source: &str, database: &str) -> Option<&CacheEntry<SchemaListing>> {
        self.schemas.get(&DataKey::schemas(source, database))
    }

    pub fn tables(
        &self,
        source: &str,
        database: &str,
        schema: Option<&str>,
    ) -> Option<&CacheEntry<Vec<TableInfo>>> {
        self.tables.get(&DataKey::tables(source, database, schema))
    }

    pub fn columns(
        &self,
        source: &str,
        database: &str,
        schema: Option<&str>,
        table: &str,
    ) -> Option<&CacheEntry<Vec<ColumnInfo>>> {
        self.columns
            .get(&DataKey::columns(source, database, schema, table))
    }

    pub fn connection(&self, source: &str) -> Option<&SourceConnection> {
        self.connections.get(source)
    }

    pub fn has_schemas(&self, source: &str, database: &str) -> Option<bool> {
        self.schemas(source, database)
            .and_then(CacheEntry::loaded)
            .map(|listing| listing.has_schemas)
    }

    pub fn is_loading(&self, level: CatalogLevel, key: &DataKey) -> bool {
        self.loading.contains(&Slot::new(level, key.clone()))
    }

    pub fn loading_slots(&self) -> &HashSet<Slot> {
        &self.loading
    }

    fn entry_count(&self) -> usize {
        self.databases.len() + self.schemas.len() + self.tables.len() + self.columns.len()
    }

    fn is_settled(&self, slot: &Slot) -> bool {
        match slot.level {
            CatalogLevel::Sources => self.sources.is_some(),
            CatalogLevel::Databases => self.databases.contains_key(&slot.key),
            CatalogLevel::Schemas => self.schemas.contains_key(&slot.key),
            CatalogLevel::Tables => self.tables.contains_key(&slot.key),
            CatalogLevel::Columns => self.columns.contains_key(&slot.key),
            // Connection checks are never cached, only coalesced.
            CatalogLevel::ConnectionTest => false,
        }
    }
}

#[derive(Default)]
struct StoreState {
    data: MetadataSnapshot,
    in_flight: HashMap<Slot, watch::Receiver<bool>>,
}

fn lock_state(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poison_err) => {
            warn!("Metadata store lock poisoned, recovering...");
            poison_err.into_inner()
        }
    }
}

/// Ownership of an in-flight slot. Clears the slot when settled or dropped.
struct InFlight<'a> {
    state: &'a Mutex<StoreState>,
    slot: Slot,
    done: Option<watch::Sender<bool>>,
}

impl InFlight<'_> {
    fn settle(mut self, commit: impl FnOnce(&mut MetadataSnapshot)) {
        {
            let mut state = lock_state(self.state);
            commit(&mut state.data);
            state.in_flight.remove(&self.slot);
        }

        if let Some(done) = self.done.take() {
            let _ = done.send(true);
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        // Only reached without `settle` when the loading future was dropped.
        if self.done.is_some() {
            debug!("Fetch for {:?} dropped before completion", self.slot);
            lock_state(self.state).in_flight.remove(&self.slot);
        }
    }
}

enum Claim<'a> {
    Settled,
    Pending(watch::Receiver<bool>),
    Owner(InFlight<'a>),
}

/// Lazily populated catalog cache shared by the explorer.
///
/// `load_*` operations are the only way data enters the cache. Each one checks
/// the cache and the in-flight set under a single lock acquisition before
/// fetching, so overlapping callers for the same slot share one request: the
/// first caller fetches, later callers wait for it to settle.
pub struct MetadataStore {
    client: Arc<dyn CatalogClient>,
    fetch_timeout: Option<Duration>,
    state: Mutex<StoreState>,
}

impl MetadataStore {
    pub fn new(client: Arc<dyn CatalogClient>) -> Self {
        Self {
            client,
            fetch_timeout: None,
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn with_config(client: Arc<dyn CatalogClient>, config: &ExplorerConfig) -> Self {
        Self::new(client).with_fetch_timeout(config.fetch_timeout())
    }

    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn snapshot(&self) -> MetadataSnapshot {
        let state = lock_state(&self.state);
        let mut snapshot = state.data.clone();
        snapshot.loading = state.in_flight.keys().cloned().collect();
        snapshot
    }

    pub fn has_schemas(&self, source: &str, database: &str) -> Option<bool> {
        lock_state(&self.state).data.has_schemas(source, database)
    }

    pub fn is_loading(&self, level: CatalogLevel, key: &DataKey) -> bool {
        lock_state(&self.state)
            .in_flight
            .contains_key(&Slot::new(level, key.clone()))
    }

    pub async fn load_sources(&self) {
        let client = self.client.clone();

        self.load(
            Slot::new(CatalogLevel::Sources, DataKey::root()),
            || async move { client.fetch_sources().await?.into_result() },
            |data, result| {
                if let Ok(sources) = &result {
                    info!("Fetched {} sources", sources.len());
                    for source in sources {
                        data.connections
                            .entry(source.name.clone())
                            .or_insert_with(|| SourceConnection {
                                status: source.status,
                                error: source.error.clone(),
                            });
                    }
                }
                data.sources = Some(CacheEntry::from_result(result));
            },
        )
        .await;
    }

    pub async fn load_databases(&self, source: &str) {
        let known_failed = lock_state(&self.state)
            .data
            .connection(source)
            .is_some_and(SourceConnection::is_failed);

        if known_failed {
            debug!("Skipping database fetch for failed source {}", source);
            return;
        }

        let client = self.client.clone();
        let owned_source = source.to_string();

        self.load(
            Slot::new(CatalogLevel::Databases, DataKey::databases(source)),
            || async move {
                client
                    .fetch_databases(&owned_source)
                    .await?
                    .into_result()
            },
            |data, result| {
                match &result {
                    Ok(databases) => {
                        info!("Fetched {} databases for {}", databases.len(), source);
                    }
                    Err(ExplorerError::ConnectionFailed(message)) => {
                        data.connections.insert(
                            source.to_string(),
                            SourceConnection {
                                status: ConnectionStatus::ConnectionFailed,
                                error: Some(message.clone()),
                            },
                        );
                    }
                    Err(_) => {}
                }
                data.databases
                    .insert(DataKey::databases(source), CacheEntry::from_result(result));
            },
        )
        .await;
    }

    pub async fn load_schemas(&self, source: &str, database: &str) {
        let client = self.client.clone();
        let (owned_source, owned_database) = (source.to_string(), database.to_string());

        self.load(
            Slot::new(CatalogLevel::Schemas, DataKey::schemas(source, database)),
            || async move {
                client
                    .fetch_schemas(&owned_source, &owned_database)
                    .await?
                    .into_result()
            },
            |data, result| {
                if let Ok(listing) = &result {
                    info!(
                        "Fetched {} schemas for {}.{} (has_schemas: {})",
                        listing.schemas.len(),
                        source,
                        database,
                        listing.has_schemas
                    );
                }
                data.schemas.insert(
                    DataKey::schemas(source, database),
                    CacheEntry::from_result(result),
                );
            },
        )
        .await;
    }

    pub async fn load_tables(&self, source: &str, database: &str, schema: Option<&str>) {
        let client = self.client.clone();
        let key = DataKey::tables(source, database, schema);
        let (owned_source, owned_database) = (source.to_string(), database.to_string());
        let owned_schema = schema.map(str::to_string);

        self.load(
            Slot::new(CatalogLevel::Tables, key.clone()),
            || async move {
                client
                    .fetch_tables(&owned_source, &owned_database, owned_schema.as_deref())
                    .await?
                    .into_result()
            },
            |data, result| {
                if let Ok(tables) = &result {
                    info!("Fetched {} tables for {}", tables.len(), key);
                }
                data.tables.insert(key, CacheEntry::from_result(result));
            },
        )
        .await;
    }

    pub async fn load_columns(
        &self,
        source: &str,
        database: &str,
        table: &str,
        schema: Option<&str>,
    ) {
        let client = self.client.clone();
        let key = DataKey::columns(source, database, schema, table);
        let (owned_source, owned_database, owned_table) =
            (source.to_string(), database.to_string(), table.to_string());
        let owned_schema = schema.map(str::to_string);

        self.load(
            Slot::new(CatalogLevel::Columns, key.clone()),
            || async move {
                client
                    .fetch_columns(
                        &owned_source,
                        &owned_database,
                        &owned_table,
                        owned_schema.as_deref(),
                    )
                    .await?
                    .into_result()
            },
            |data, result| {
                if let Ok(columns) = &result {
                    info!("Fetched {} columns for {}", columns.len(), key);
                }
                data.columns.insert(key, CacheEntry::from_result(result));
            },
        )
        .await;
    }

    /// Re-checks one source's connectivity and records the outcome.
    ///
    /// Touches only the connection status map; cached catalog levels are kept.
    pub async fn test_connection(&self, config: &SourceConfig) {
        let client = self.client.clone();
        let owned_config = config.clone();
        let source = config.name.as_str();

        self.load(
            Slot::new(CatalogLevel::ConnectionTest, DataKey::databases(source)),
            || async move { client.test_connection(&owned_config).await },
            |data, result| {
                let connection = match result {
                    Ok(check) => SourceConnection::from(check),
                    Err(e) => SourceConnection {
                        status: ConnectionStatus::ConnectionFailed,
                        error: Some(e.cache_message()),
                    },
                };
                info!("Connection test for {}: {:?}", source, connection.status);
                data.connections.insert(source.to_string(), connection);
            },
        )
        .await;
    }

    /// Drops every cached level under `source` so the next expansion refetches.
    ///
    /// Fetches already in flight are left to complete and will repopulate
    /// their slots.
    pub fn invalidate_source(&self, source: &str) -> usize {
        let mut state = lock_state(&self.state);
        let data = &mut state.data;
        let before = data.entry_count();

        data.databases.retain(|key, _| !key.belongs_to_source(source));
        data.schemas.retain(|key, _| !key.belongs_to_source(source));
        data.tables.retain(|key, _| !key.belongs_to_source(source));
        data.columns.retain(|key, _| !key.belongs_to_source(source));

        let removed = before - data.entry_count();
        info!("Invalidated {} cached entries for {}", removed, source);
        removed
    }

    fn claim(&self, slot: &Slot) -> Claim<'_> {
        let mut state = lock_state(&self.state);

        if state.data.is_settled(slot) {
            return Claim::Settled;
        }

        if let Some(pending) = state.in_flight.get(slot) {
            return Claim::Pending(pending.clone());
        }

        let (done, pending) = watch::channel(false);
        state.in_flight.insert(slot.clone(), pending);

        Claim::Owner(InFlight {
            state: &self.state,
            slot: slot.clone(),
            done: Some(done),
        })
    }

    async fn load<T, F, Fut>(
        &self,
        slot: Slot,
        fetch: F,
        commit: impl FnOnce(&mut MetadataSnapshot, Result<T, ExplorerError>),
    ) where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ExplorerError>>,
    {
        match self.claim(&slot) {
            Claim::Settled => {
                debug!("{:?} already cached", slot);
            }
            Claim::Pending(mut pending) => {
                debug!("{:?} already in flight, waiting", slot);
                // A closed channel means the owner was dropped; either way the
                // slot is no longer in flight.
                let _ = pending.wait_for(|done| *done).await;
            }
            Claim::Owner(flight) => {
                let result = self.with_timeout(fetch()).await;
                if let Err(e) = &result {
                    warn!("Fetch for {:?} failed: {}", slot, e);
                }
                flight.settle(|data| commit(data, result));
            }
        }
    }

    async fn with_timeout<T>(
        &self,
        fetch: impl Future<Output = Result<T, ExplorerError>>,
    ) -> Result<T, ExplorerError> {
        match self.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .unwrap_or_else(|_| Err(ExplorerError::Timeout(limit.as_millis() as u64))),
            None => fetch.await,
        }
    }
}

#[async_trait]
impl CatalogLoader for MetadataStore {
    async fn load_databases(&self, source: &str) {
        MetadataStore::load_databases(self, source).await
    }

    async fn load_schemas(&self, source: &str, database: &str) {
        MetadataStore::load_schemas(self, source, database).await
    }

    async fn load_tables(&self, source: &str, database: &str, schema: Option<&str>) {
        MetadataStore::load_tables(self, source, database, schema).await
    }

    async fn load_columns(
        &self,
        source: &str,
        database: &str,
        table: &str,
        schema: Option<&str>,
    ) {
        MetadataStore::load_columns(self, source, database, table, schema).await
    }

    fn has_schemas(&self, source: &str, database: &str) -> Option<bool> {
        MetadataStore::has_schemas(self, source, database)
    }
}
