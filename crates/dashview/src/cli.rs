use anyhow::{Context, bail};
use clap::Parser;
use dashview_core::{ExplorerConfig, ExplorerError, MetadataStore, NodeId};
use std::path::PathBuf;

/// Browse a data-source catalog one level at a time.
#[derive(Debug, Parser)]
#[command(name = "dashview")]
#[command(version)]
pub struct Cli {
    /// Catalog document (JSON). Falls back to `catalog_path` from the config.
    #[arg(short, long)]
    pub catalog: Option<PathBuf>,

    /// Config file to use instead of the platform default.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Node to expand, as `source/database[/schema]/table` or an encoded
    /// node id (any argument containing `|`). Applied in order; repeat to
    /// expand several nodes.
    #[arg(short, long = "expand", value_name = "PATH")]
    pub expand: Vec<String>,

    /// Keep expanding every visible node up to the configured depth.
    #[arg(long)]
    pub expand_all: bool,

    /// Re-check a source's connectivity before rendering. Repeatable.
    #[arg(long = "test-connection", value_name = "SOURCE")]
    pub test_connection: Vec<String>,

    /// Print the tree as JSON instead of text.
    #[arg(long)]
    pub json: bool,

    /// Only log warnings and errors.
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    pub fn log_filter(&self) -> &'static str {
        if self.quiet { "warn" } else { "info" }
    }

    pub fn catalog_path(&self, config: &ExplorerConfig) -> anyhow::Result<PathBuf> {
        self.catalog
            .clone()
            .or_else(|| config.catalog_path.clone())
            .context("No catalog given: pass --catalog or set catalog_path in the config")
    }
}

/// Turns an `--expand` argument into a node identity.
///
/// Slash paths are resolved against the catalog's topology: a third segment
/// is a schema when the database has a schema level and a table otherwise.
/// The schema level is loaded first when it is not cached yet. Arguments
/// containing `|` are decoded as node ids.
pub async fn resolve_node(store: &MetadataStore, raw: &str) -> anyhow::Result<NodeId> {
    if raw.contains('|') {
        let id = raw.parse::<NodeId>().map_err(ExplorerError::from)?;
        return Ok(id);
    }

    let segments: Vec<&str> = raw.split('/').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        bail!("Invalid path {:?}: empty segment", raw);
    }

    match segments.as_slice() {
        [source] => Ok(NodeId::source(*source)),
        [source, database] => Ok(NodeId::database(*source, *database)),
        [source, database, rest @ ..] => {
            store.load_schemas(source, database).await;

            let Some(has_schemas) = store.has_schemas(source, database) else {
                bail!("Could not load schemas of {}/{}", source, database);
            };

            match (has_schemas, rest) {
                (true, [schema]) => Ok(NodeId::schema(*source, *database, *schema)),
                (true, [schema, table]) => {
                    Ok(NodeId::table(*source, *database, Some(*schema), *table))
                }
                (false, [table]) => Ok(NodeId::table(*source, *database, None, *table)),
                _ => bail!("Path {:?} does not name an expandable node", raw),
            }
        }
        _ => bail!("Invalid path {:?}", raw),
    }
}
