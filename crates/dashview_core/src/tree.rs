//! Display tree for the catalog explorer.
//!
//! The tree is a pure function of a [`MetadataSnapshot`] and the expansion
//! set: building it never triggers a fetch. A node's children are read from
//! the cache entry of its data key:
//!
//! - no entry: a `Loading` leaf while the fetch is in flight, otherwise an
//!   inert placeholder
//! - failed entry: an inline error leaf scoped to that node
//! - loaded entry: one child per item, built recursively
//!
//! Collapsed nodes carry no children.

use crate::store::{CacheEntry, CatalogLevel, MetadataSnapshot};
use crate::{DataKey, NodeId, NodeKind};
use indexmap::IndexSet;
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNodeKind {
    Source,
    Database,
    Schema,
    Table,
    Column,
    Loading,
    Placeholder,
    Empty,
    Error,
}

impl From<NodeKind> for TreeNodeKind {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Source => TreeNodeKind::Source,
            NodeKind::Database => TreeNodeKind::Database,
            NodeKind::Schema => TreeNodeKind::Schema,
            NodeKind::Table => TreeNodeKind::Table,
            NodeKind::Column => TreeNodeKind::Column,
        }
    }
}

impl TreeNodeKind {
    pub fn is_status(&self) -> bool {
        matches!(
            self,
            TreeNodeKind::Loading
                | TreeNodeKind::Placeholder
                | TreeNodeKind::Empty
                | TreeNodeKind::Error
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub id: String,
    pub kind: TreeNodeKind,
    pub label: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    pub expandable: bool,
    pub expanded: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    fn status(parent_id: &str, kind: TreeNodeKind, label: impl Into<String>) -> Self {
        let suffix = match kind {
            TreeNodeKind::Loading => "loading",
            TreeNodeKind::Placeholder => "placeholder",
            TreeNodeKind::Empty => "empty",
            _ => "error",
        };

        Self {
            id: format!("{}#{}", parent_id, suffix),
            kind,
            label: label.into(),
            detail: None,
            expandable: false,
            expanded: false,
            children: Vec::new(),
        }
    }

    pub fn node_id(&self) -> Option<NodeId> {
        if self.kind.is_status() {
            return None;
        }
        self.id.parse().ok()
    }
}

pub const LOADING_LABEL: &str = "Loading...";
pub const PLACEHOLDER_LABEL: &str = "Expand to load";
pub const EMPTY_LABEL: &str = "(empty)";
const ROOT_ID: &str = "root";

/// One catalog child to render, before recursion.
struct Entry {
    id: NodeId,
    detail: Option<String>,
}

impl Entry {
    fn new(id: NodeId) -> Self {
        Self { id, detail: None }
    }
}

/// Children of a node as read from the snapshot.
enum Listing<'a> {
    Leaf,
    Pending { loading: bool },
    Failed(&'a str),
    Entries(Vec<Entry>),
}

struct TreeBuilder<'a> {
    snapshot: &'a MetadataSnapshot,
    expanded: &'a IndexSet<String>,
}

impl<'a> TreeBuilder<'a> {
    fn node(&self, id: NodeId, detail: Option<String>) -> TreeNode {
        let encoded = id.to_string();
        let expandable = id.kind() != NodeKind::Column;
        let expanded = expandable && self.expanded.contains(&encoded);

        let children = if expanded {
            self.children(&id, &encoded)
        } else {
            Vec::new()
        };

        TreeNode {
            label: id.name().to_string(),
            kind: id.kind().into(),
            id: encoded,
            detail,
            expandable,
            expanded,
            children,
        }
    }

    fn children(&self, id: &NodeId, encoded: &str) -> Vec<TreeNode> {
        match self.listing(id) {
            Listing::Leaf => Vec::new(),
            Listing::Pending { loading: true } => {
                vec![TreeNode::status(encoded, TreeNodeKind::Loading, LOADING_LABEL)]
            }
            Listing::Pending { loading: false } => {
                vec![TreeNode::status(
                    encoded,
                    TreeNodeKind::Placeholder,
                    PLACEHOLDER_LABEL,
                )]
            }
            Listing::Failed(message) => {
                vec![TreeNode::status(encoded, TreeNodeKind::Error, message)]
            }
            Listing::Entries(entries) if entries.is_empty() => {
                vec![TreeNode::status(encoded, TreeNodeKind::Empty, EMPTY_LABEL)]
            }
            Listing::Entries(entries) => entries
                .into_iter()
                .map(|entry| self.node(entry.id, entry.detail))
                .collect(),
        }
    }

    fn listing(&self, id: &NodeId) -> Listing<'a> {
        let snapshot = self.snapshot;
        let path: Vec<&str> = id.path().iter().map(String::as_str).collect();

        match (id.kind(), path.as_slice()) {
            (NodeKind::Source, [source]) => {
                if let Some(connection) = snapshot.connection(source)
                    && connection.is_failed()
                {
                    return Listing::Failed(
                        connection.error.as_deref().unwrap_or("Connection failed"),
                    );
                }

                self.read(
                    snapshot.databases(source),
                    CatalogLevel::Databases,
                    DataKey::databases(source),
                    |databases| {
                        databases
                            .iter()
                            .map(|db| Entry::new(id.child(NodeKind::Database, &db.name)))
                            .collect()
                    },
                )
            }
            (NodeKind::Database, [source, database]) => match snapshot.schemas(source, database) {
                Some(CacheEntry::Loaded(listing)) if !listing.has_schemas => {
                    self.tables(id, source, database, None)
                }
                entry => self.read(
                    entry,
                    CatalogLevel::Schemas,
                    DataKey::schemas(source, database),
                    |listing| {
                        listing
                            .schemas
                            .iter()
                            .map(|schema| Entry::new(id.child(NodeKind::Schema, &schema.name)))
                            .collect()
                    },
                ),
            },
            (NodeKind::Schema, [source, database, schema]) => {
                self.tables(id, source, database, Some(*schema))
            }
            (NodeKind::Table, [source, database, table]) => {
                self.columns(id, source, database, None, table)
            }
            (NodeKind::Table, [source, database, schema, table]) => {
                self.columns(id, source, database, Some(*schema), table)
            }
            _ => Listing::Leaf,
        }
    }

    fn tables(
        &self,
        parent: &NodeId,
        source: &str,
        database: &str,
        schema: Option<&str>,
    ) -> Listing<'a> {
        self.read(
            self.snapshot.tables(source, database, schema),
            CatalogLevel::Tables,
            DataKey::tables(source, database, schema),
            |tables| {
                tables
                    .iter()
                    .map(|table| Entry::new(parent.child(NodeKind::Table, &table.name)))
                    .collect()
            },
        )
    }

    fn columns(
        &self,
        parent: &NodeId,
        source: &str,
        database: &str,
        schema: Option<&str>,
        table: &str,
    ) -> Listing<'a> {
        self.read(
            self.snapshot.columns(source, database, schema, table),
            CatalogLevel::Columns,
            DataKey::columns(source, database, schema, table),
            |columns| {
                columns
                    .iter()
                    .map(|column| Entry {
                        id: parent.child(NodeKind::Column, &column.name),
                        detail: (!column.type_name.is_empty()).then(|| column.type_name.clone()),
                    })
                    .collect()
            },
        )
    }

    fn read<T>(
        &self,
        entry: Option<&'a CacheEntry<T>>,
        level: CatalogLevel,
        key: DataKey,
        entries: impl FnOnce(&T) -> Vec<Entry>,
    ) -> Listing<'a> {
        match entry {
            None => Listing::Pending {
                loading: self.snapshot.is_loading(level, &key),
            },
            Some(CacheEntry::Failed(message)) => Listing::Failed(message),
            Some(CacheEntry::Loaded(value)) => Listing::Entries(entries(value)),
        }
    }
}

/// Builds the visible explorer tree from a snapshot and the expansion set.
pub fn build_tree(snapshot: &MetadataSnapshot, expanded: &IndexSet<String>) -> Vec<TreeNode> {
    let builder = TreeBuilder { snapshot, expanded };

    match snapshot.sources() {
        None if snapshot.is_loading(CatalogLevel::Sources, &DataKey::root()) => {
            vec![TreeNode::status(ROOT_ID, TreeNodeKind::Loading, LOADING_LABEL)]
        }
        None => Vec::new(),
        Some(CacheEntry::Failed(message)) => {
            vec![TreeNode::status(ROOT_ID, TreeNodeKind::Error, message)]
        }
        Some(CacheEntry::Loaded(sources)) => sources
            .iter()
            .map(|source| {
                let detail = (!source.source_type.is_empty()).then(|| source.source_type.clone());
                builder.node(NodeId::source(&source.name), detail)
            })
            .collect(),
    }
}

/// A node in depth-first display order.
#[derive(Debug, Clone, Copy)]
pub struct VisibleRow<'a> {
    pub depth: usize,
    pub node: &'a TreeNode,
}

pub fn visible_rows(nodes: &[TreeNode]) -> Vec<VisibleRow<'_>> {
    fn walk<'a>(nodes: &'a [TreeNode], depth: usize, rows: &mut Vec<VisibleRow<'a>>) {
        for node in nodes {
            rows.push(VisibleRow { depth, node });
            walk(&node.children, depth + 1, rows);
        }
    }

    let mut rows = Vec::new();
    walk(nodes, 0, &mut rows);
    rows
}

/// Identities of visible nodes that could be expanded but are not yet.
pub fn expandable_ids(nodes: &[TreeNode]) -> Vec<String> {
    visible_rows(nodes)
        .into_iter()
        .filter(|row| row.node.expandable && !row.node.expanded)
        .map(|row| row.node.id.clone())
        .collect()
}

pub fn find_node<'a>(nodes: &'a [TreeNode], id: &str) -> Option<&'a TreeNode> {
    visible_rows(nodes)
        .into_iter()
        .map(|row| row.node)
        .find(|node| node.id == id)
}

/// Plain-text rendering, two spaces of indent per level.
pub fn render_text(nodes: &[TreeNode]) -> String {
    let mut out = String::new();

    for row in visible_rows(nodes) {
        let node = row.node;
        let marker = match node.kind {
            TreeNodeKind::Loading => "~",
            TreeNodeKind::Error => "!",
            _ if node.expanded => "-",
            _ if node.expandable => "+",
            _ => " ",
        };

        let _ = write!(out, "{}{} {}", "  ".repeat(row.depth), marker, node.label);
        if let Some(detail) = &node.detail {
            let _ = write!(out, " ({})", detail);
        }
        out.push('\n');
    }

    out
}
