use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Typed representation of an explorer tree node ID.
///
/// Every catalog node is addressed by its kind and the ordered path of names
/// from the owning source down to the node itself. The string form is used as
/// the key of expansion sets and as the UI identifier, so it must be a pure
/// function of `(kind, path)`.
///
/// Encoding writes a short kind tag followed by each path segment,
/// percent-encoded and separated by pipes (`|`). A pipe inside a name is
/// always encoded, so names containing separators, dots, unicode, or empty
/// names never collide with a differently-shaped path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    kind: NodeKind,
    path: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Source,
    Database,
    Schema,
    Table,
    Column,
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Source => "source",
            NodeKind::Database => "database",
            NodeKind::Schema => "schema",
            NodeKind::Table => "table",
            NodeKind::Column => "column",
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            NodeKind::Source => P_SOURCE,
            NodeKind::Database => P_DATABASE,
            NodeKind::Schema => P_SCHEMA,
            NodeKind::Table => P_TABLE,
            NodeKind::Column => P_COLUMN,
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            P_SOURCE => Some(NodeKind::Source),
            P_DATABASE => Some(NodeKind::Database),
            P_SCHEMA => Some(NodeKind::Schema),
            P_TABLE => Some(NodeKind::Table),
            P_COLUMN => Some(NodeKind::Column),
            _ => None,
        }
    }
}

// Prefix tags used in the pipe-delimited encoding.
const P_SOURCE: &str = "SRC";
const P_DATABASE: &str = "DB";
const P_SCHEMA: &str = "S";
const P_TABLE: &str = "T";
const P_COLUMN: &str = "CL";

const SEPARATOR: char = '|';

impl NodeId {
    pub fn new<I, S>(kind: NodeKind, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    pub fn source(source: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Source,
            path: vec![source.into()],
        }
    }

    pub fn database(source: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Database,
            path: vec![source.into(), database.into()],
        }
    }

    pub fn schema(
        source: impl Into<String>,
        database: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            kind: NodeKind::Schema,
            path: vec![source.into(), database.into(), schema.into()],
        }
    }

    /// Table node; `schema` is `None` for databases without a schema level.
    pub fn table(
        source: impl Into<String>,
        database: impl Into<String>,
        schema: Option<&str>,
        table: impl Into<String>,
    ) -> Self {
        let mut path = vec![source.into(), database.into()];
        path.extend(schema.map(str::to_string));
        path.push(table.into());

        Self {
            kind: NodeKind::Table,
            path,
        }
    }

    pub fn column(
        source: impl Into<String>,
        database: impl Into<String>,
        schema: Option<&str>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        let mut id = Self::table(source, database, schema, table);
        id.kind = NodeKind::Column;
        id.path.push(column.into());
        id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// The node's own name (last path segment).
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    pub fn source_name(&self) -> &str {
        self.path.first().map(String::as_str).unwrap_or_default()
    }

    /// Identity of a child of this node.
    pub fn child(&self, kind: NodeKind, name: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push(name.into());
        Self { kind, path }
    }

    /// Data key of this node's own children.
    pub fn data_key(&self) -> DataKey {
        DataKey::from_path(&self.path)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.tag())?;
        for segment in &self.path {
            write!(f, "{}{}", SEPARATOR, urlencoding::encode(segment))?;
        }
        Ok(())
    }
}

/// Error returned when parsing a `NodeId` from a string fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid node id {input:?}: {reason}")]
pub struct ParseNodeIdError {
    pub input: String,
    pub reason: &'static str,
}

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| ParseNodeIdError {
            input: s.to_string(),
            reason,
        };

        let mut parts = s.split(SEPARATOR);
        let tag = parts.next().filter(|t| !t.is_empty()).ok_or(err("empty"))?;
        let kind = NodeKind::from_tag(tag).ok_or(err("unknown kind tag"))?;

        let path = parts
            .map(|segment| {
                let decoded = urlencoding::decode(segment)
                    .map_err(|_| err("segment is not valid UTF-8"))?
                    .into_owned();

                // Only the exact encoding `Display` produces is accepted, so
                // one node never has two spellings.
                if urlencoding::encode(&decoded) != segment {
                    return Err(err("non-canonical segment"));
                }

                Ok(decoded)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if path.is_empty() {
            return Err(err("missing path"));
        }

        Ok(Self { kind, path })
    }
}

impl Serialize for NodeId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Cache key derived from a parent node's path.
///
/// The root (list of sources) has the empty key. Segments are percent-encoded
/// before joining so distinct paths never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DataKey(String);

impl DataKey {
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn from_path<S: AsRef<str>>(path: &[S]) -> Self {
        let encoded: Vec<_> = path
            .iter()
            .map(|segment| urlencoding::encode(segment.as_ref()))
            .collect();
        Self(encoded.join("/"))
    }

    pub fn databases(source: &str) -> Self {
        Self::from_path(&[source])
    }

    pub fn schemas(source: &str, database: &str) -> Self {
        Self::from_path(&[source, database])
    }

    pub fn tables(source: &str, database: &str, schema: Option<&str>) -> Self {
        match schema {
            Some(schema) => Self::from_path(&[source, database, schema]),
            None => Self::from_path(&[source, database]),
        }
    }

    pub fn columns(source: &str, database: &str, schema: Option<&str>, table: &str) -> Self {
        match schema {
            Some(schema) => Self::from_path(&[source, database, schema, table]),
            None => Self::from_path(&[source, database, table]),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key lies under `source` (or is the key of its databases).
    pub fn belongs_to_source(&self, source: &str) -> bool {
        let prefix = urlencoding::encode(source);
        match self.0.strip_prefix(prefix.as_ref()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
