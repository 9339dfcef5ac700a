mod catalog;
mod config;
mod error;
mod expansion;
mod node_id;
mod static_catalog;
mod store;
mod tree;

pub use catalog::{
    CatalogClient, ColumnInfo, ColumnsResponse, ConnectionCheck, ConnectionStatus, DatabaseInfo,
    DatabasesResponse, SchemaInfo, SchemaListing, SchemasResponse, SourceConfig, SourceInfo,
    SourcesResponse, TableInfo, TablesResponse,
};
pub use config::{ConfigStore, ExplorerConfig};
pub use error::ExplorerError;
pub use expansion::{CatalogLoader, ExpansionController, ToggleReport};
pub use node_id::{DataKey, NodeId, NodeKind, ParseNodeIdError};
pub use static_catalog::{
    CatalogDocument, DatabaseEntry, SchemaEntry, SourceEntry, StaticCatalog, TableEntry,
};
pub use store::{
    CacheEntry, CatalogLevel, MetadataSnapshot, MetadataStore, SourceConnection, Slot,
};
pub use tree::{
    EMPTY_LABEL, LOADING_LABEL, PLACEHOLDER_LABEL, TreeNode, TreeNodeKind, VisibleRow,
    build_tree, expandable_ids, find_node, render_text, visible_rows,
};

pub use indexmap::IndexSet;
