use crate::{NodeId, NodeKind};
use async_trait::async_trait;
use indexmap::IndexSet;
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard};

/// Load operations the controller dispatches; implemented by `MetadataStore`.
///
/// Loads never fail from the caller's point of view: failures are recorded in
/// the cache by the implementation.
#[async_trait]
pub trait CatalogLoader: Send + Sync {
    async fn load_databases(&self, source: &str);

    async fn load_schemas(&self, source: &str, database: &str);

    async fn load_tables(&self, source: &str, database: &str, schema: Option<&str>);

    async fn load_columns(&self, source: &str, database: &str, table: &str, schema: Option<&str>);

    /// Learned topology of a database, once its schema level has been fetched.
    fn has_schemas(&self, source: &str, database: &str) -> Option<bool>;
}

/// What a single `toggle` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToggleReport {
    /// Newly expanded nodes that triggered a load, in dispatch order.
    pub dispatched: Vec<NodeId>,

    /// Newly expanded identities that were ignored (columns, undecodable or
    /// wrongly shaped identities).
    pub skipped: Vec<String>,
}

/// Owns the set of expanded nodes and drives the load cascade on expansion.
pub struct ExpansionController<L: CatalogLoader> {
    loader: Arc<L>,
    expanded: Mutex<IndexSet<String>>,
}

impl<L: CatalogLoader> ExpansionController<L> {
    pub fn new(loader: Arc<L>) -> Self {
        Self {
            loader,
            expanded: Mutex::new(IndexSet::new()),
        }
    }

    pub fn loader(&self) -> &Arc<L> {
        &self.loader
    }

    /// Current expansion set, in the order it was last supplied.
    pub fn expanded(&self) -> IndexSet<String> {
        self.lock_expanded().clone()
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.lock_expanded().contains(id)
    }

    /// Replaces the expansion set with `next` and loads every newly expanded
    /// node, one at a time in the supplied order.
    ///
    /// Collapsed identities are simply dropped from the set; cached data is
    /// kept for fast re-expansion. Each load settles before the next starts.
    pub async fn toggle<I, S>(&self, next: I) -> ToggleReport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let next: IndexSet<String> = next.into_iter().map(Into::into).collect();

        let newly_expanded: Vec<String> = {
            let mut expanded = self.lock_expanded();
            let added = next
                .iter()
                .filter(|id| !expanded.contains(*id))
                .cloned()
                .collect();
            *expanded = next;
            added
        };

        let mut report = ToggleReport::default();

        for raw in newly_expanded {
            let Ok(id) = raw.parse::<NodeId>() else {
                debug!("Ignoring undecodable node id {:?}", raw);
                report.skipped.push(raw);
                continue;
            };

            if self.dispatch(&id).await {
                report.dispatched.push(id);
            } else {
                report.skipped.push(raw);
            }
        }

        report
    }

    async fn dispatch(&self, id: &NodeId) -> bool {
        let path: Vec<&str> = id.path().iter().map(String::as_str).collect();

        match (id.kind(), path.as_slice()) {
            (NodeKind::Source, [source]) => {
                self.loader.load_databases(source).await;
            }
            (NodeKind::Database, [source, database]) => {
                self.loader.load_schemas(source, database).await;

                if self.loader.has_schemas(source, database) == Some(false) {
                    self.loader.load_tables(source, database, None).await;
                }
            }
            (NodeKind::Schema, [source, database, schema]) => {
                self.loader
                    .load_tables(source, database, Some(*schema))
                    .await;
            }
            (NodeKind::Table, [source, database, table]) => {
                self.loader
                    .load_columns(source, database, table, None)
                    .await;
            }
            (NodeKind::Table, [source, database, schema, table]) => {
                self.loader
                    .load_columns(source, database, table, Some(*schema))
                    .await;
            }
            (kind, _) => {
                debug!("No load for {} node {}", kind.label(), id);
                return false;
            }
        }

        true
    }

    fn lock_expanded(&self) -> MutexGuard<'_, IndexSet<String>> {
        match self.expanded.lock() {
            Ok(guard) => guard,
            Err(poison_err) => poison_err.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct RecordingLoader {
        calls: Mutex<Vec<String>>,
        topology: HashMap<(String, String), bool>,
    }

    impl RecordingLoader {
        fn with_topology(mut self, source: &str, database: &str, has_schemas: bool) -> Self {
            self.topology
                .insert((source.to_string(), database.to_string()), has_schemas);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl CatalogLoader for RecordingLoader {
        async fn load_databases(&self, source: &str) {
            self.record(format!("databases:{}", source));
        }

        async fn load_schemas(&self, source: &str, database: &str) {
            self.record(format!("schemas:{}.{}", source, database));
        }

        async fn load_tables(&self, source: &str, database: &str, schema: Option<&str>) {
            self.record(format!(
                "tables:{}.{}.{}",
                source,
                database,
                schema.unwrap_or("-")
            ));
        }

        async fn load_columns(
            &self,
            source: &str,
            database: &str,
            table: &str,
            schema: Option<&str>,
        ) {
            self.record(format!(
                "columns:{}.{}.{}.{}",
                source,
                database,
                schema.unwrap_or("-"),
                table
            ));
        }

        fn has_schemas(&self, source: &str, database: &str) -> Option<bool> {
            self.topology
                .get(&(source.to_string(), database.to_string()))
                .copied()
        }
    }

    fn ids(nodes: &[NodeId]) -> Vec<String> {
        nodes.iter().map(NodeId::to_string).collect()
    }

    #[tokio::test]
    async fn dispatches_one_load_per_kind_in_supplied_order() {
        let loader = Arc::new(RecordingLoader::default().with_topology("pg", "prod", true));
        let controller = ExpansionController::new(loader.clone());

        let report = controller
            .toggle(ids(&[
                NodeId::table("pg", "prod", Some("public"), "users"),
                NodeId::source("pg"),
                NodeId::schema("pg", "prod", "public"),
                NodeId::database("pg", "prod"),
            ]))
            .await;

        assert_eq!(
            loader.calls(),
            vec![
                "columns:pg.prod.public.users",
                "databases:pg",
                "tables:pg.prod.public",
                "schemas:pg.prod",
            ]
        );
        assert_eq!(report.dispatched.len(), 4);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn schema_less_database_cascades_to_tables() {
        let loader = Arc::new(RecordingLoader::default().with_topology("duck", "main", false));
        let controller = ExpansionController::new(loader.clone());

        controller
            .toggle(ids(&[NodeId::database("duck", "main")]))
            .await;

        assert_eq!(loader.calls(), vec!["schemas:duck.main", "tables:duck.main.-"]);
    }

    #[tokio::test]
    async fn unknown_topology_does_not_cascade() {
        let loader = Arc::new(RecordingLoader::default());
        let controller = ExpansionController::new(loader.clone());

        controller.toggle(ids(&[NodeId::database("pg", "prod")])).await;

        assert_eq!(loader.calls(), vec!["schemas:pg.prod"]);
    }

    #[tokio::test]
    async fn schema_less_table_passes_no_schema() {
        let loader = Arc::new(RecordingLoader::default());
        let controller = ExpansionController::new(loader.clone());

        controller
            .toggle(ids(&[NodeId::table("duck", "main", None, "events")]))
            .await;

        assert_eq!(loader.calls(), vec!["columns:duck.main.-.events"]);
    }

    #[tokio::test]
    async fn only_newly_expanded_nodes_are_loaded() {
        let loader = Arc::new(RecordingLoader::default());
        let controller = ExpansionController::new(loader.clone());
        let source = NodeId::source("pg").to_string();
        let other = NodeId::source("duck").to_string();

        controller.toggle([source.clone()]).await;
        controller.toggle([source.clone(), other.clone()]).await;

        assert_eq!(loader.calls(), vec!["databases:pg", "databases:duck"]);
        assert_eq!(
            controller.expanded().into_iter().collect::<Vec<_>>(),
            vec![source.clone(), other.clone()]
        );
    }

    #[tokio::test]
    async fn collapse_then_expand_dispatches_again() {
        let loader = Arc::new(RecordingLoader::default());
        let controller = ExpansionController::new(loader.clone());
        let source = NodeId::source("pg").to_string();

        controller.toggle([source.clone()]).await;
        let report = controller.toggle(Vec::<String>::new()).await;
        assert!(report.dispatched.is_empty());
        assert!(!controller.is_expanded(&source));

        controller.toggle([source.clone()]).await;

        // The loader dedupes via its cache; the controller just dispatches.
        assert_eq!(loader.calls(), vec!["databases:pg", "databases:pg"]);
    }

    #[tokio::test]
    async fn malformed_and_leaf_ids_are_skipped() {
        let loader = Arc::new(RecordingLoader::default());
        let controller = ExpansionController::new(loader.clone());
        let column = NodeId::column("pg", "prod", Some("public"), "users", "id").to_string();
        let wrong_shape = NodeId::new(NodeKind::Schema, ["pg"]).to_string();

        let report = controller
            .toggle([
                "garbage".to_string(),
                column.clone(),
                wrong_shape.clone(),
                NodeId::source("pg").to_string(),
            ])
            .await;

        assert_eq!(loader.calls(), vec!["databases:pg"]);
        assert_eq!(report.skipped, vec!["garbage".to_string(), column, wrong_shape]);
        assert!(controller.is_expanded("garbage"));
    }

    #[tokio::test]
    async fn non_canonical_spelling_does_not_dispatch() {
        let loader = Arc::new(RecordingLoader::default());
        let controller = ExpansionController::new(loader.clone());

        let report = controller
            .toggle(["SRC|%70g".to_string(), "SRC|%zz".to_string()])
            .await;

        assert!(loader.calls().is_empty());
        assert!(report.dispatched.is_empty());
        assert_eq!(report.skipped, vec!["SRC|%70g", "SRC|%zz"]);
    }
}
