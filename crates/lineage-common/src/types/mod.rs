//! Common types used across the lineage workspace

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::error::{LineageError, Result};

/// Name of the query parameter carrying the child identifier
pub const GUID_QUERY_PARAM: &str = "guid";

// ============================================================================
// Entity Kinds
// ============================================================================

/// Kind of metadata entity
///
/// Parsed from the metadata service's type names (`hive_table`, `hive_column`,
/// ...). Unrecognised type names are kept verbatim in [`EntityKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityKind {
    Table,
    Column,
    Process,
    Other(String),
}

impl EntityKind {
    pub fn as_str(&self) -> &str {
        match self {
            EntityKind::Table => "table",
            EntityKind::Column => "column",
            EntityKind::Process => "process",
            EntityKind::Other(name) => name,
        }
    }
}

impl From<&str> for EntityKind {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "table" | "hive_table" => EntityKind::Table,
            "column" | "hive_column" => EntityKind::Column,
            "process" | "hive_process" | "hive_column_lineage" => EntityKind::Process,
            _ => EntityKind::Other(s.to_string()),
        }
    }
}

impl From<String> for EntityKind {
    fn from(s: String) -> Self {
        EntityKind::from(s.as_str())
    }
}

impl From<EntityKind> for String {
    fn from(kind: EntityKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Parser Kinds
// ============================================================================

/// Tag selecting the response parser for a child request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    /// Entity detail of a table, yields its columns
    TableDetail,
    /// Lineage graph of a column, yields related entities
    ColumnLineage,
}

impl ParserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserKind::TableDetail => "table_detail",
            ParserKind::ColumnLineage => "column_lineage",
        }
    }
}

impl std::str::FromStr for ParserKind {
    type Err = LineageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table_detail" | "table-detail" => Ok(ParserKind::TableDetail),
            "column_lineage" | "column-lineage" => Ok(ParserKind::ColumnLineage),
            _ => Err(LineageError::UnknownParserKind(s.to_string())),
        }
    }
}

impl std::fmt::Display for ParserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Child References
// ============================================================================

/// A link from a record to a related entity that still has to be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildReference {
    /// Identifier of the child entity
    pub guid: String,

    /// Request template for the child's detail, relative to the service base URL
    /// (e.g. `/api/atlas/v2/entity/guid`) or absolute
    pub template: String,

    /// Parser responsible for the response
    pub parser: ParserKind,
}

impl ChildReference {
    pub fn new(guid: impl Into<String>, template: impl Into<String>, parser: ParserKind) -> Self {
        Self {
            guid: guid.into(),
            template: template.into(),
            parser,
        }
    }

    /// Request URL for this reference: the template with `guid=<child>` appended
    /// as a query parameter.
    ///
    /// ```
    /// use lineage_common::types::{ChildReference, ParserKind};
    ///
    /// let child = ChildReference::new("c 1", "/api/lineage", ParserKind::ColumnLineage);
    /// assert_eq!(child.request_url(), "/api/lineage?guid=c+1");
    /// ```
    pub fn request_url(&self) -> String {
        let encoded: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair(GUID_QUERY_PARAM, &self.guid)
            .finish();

        let separator = match self.template.find('?') {
            None => "?",
            Some(idx) if idx + 1 == self.template.len() || self.template.ends_with('&') => "",
            Some(_) => "&",
        };

        format!("{}{}{}", self.template, separator, encoded)
    }
}

// ============================================================================
// Entity Records
// ============================================================================

/// One metadata node (table, column, process, ...) and the children it links to.
///
/// Records are immutable once built: parsers construct them, the extractor
/// reads them, sinks store them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Globally unique identifier; blank or absent marks a leaf
    #[serde(default)]
    pub guid: Option<String>,

    /// Entity kind
    pub kind: EntityKind,

    /// Short name (e.g. the column name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Fully qualified name (e.g. `db.table.column@cluster`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualified_name: Option<String>,

    /// Owning table for columns, own name for tables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,

    /// Raw attribute object as returned by the metadata service
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub attributes: serde_json::Value,

    /// Children still to be resolved
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_references: Vec<ChildReference>,
}

impl EntityRecord {
    pub fn new(guid: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            guid: Some(guid.into()),
            kind,
            name: None,
            qualified_name: None,
            table_name: None,
            attributes: serde_json::Value::Null,
            child_references: Vec::new(),
        }
    }

    /// A record without identifier; never crawled further
    pub fn leaf(kind: EntityKind) -> Self {
        Self {
            guid: None,
            ..Self::new(String::new(), kind)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_qualified_name(mut self, qualified_name: impl Into<String>) -> Self {
        self.qualified_name = Some(qualified_name.into());
        self
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn with_child(mut self, child: ChildReference) -> Self {
        self.child_references.push(child);
        self
    }

    /// Identifier, if present and not blank
    pub fn guid(&self) -> Option<&str> {
        self.guid
            .as_deref()
            .map(str::trim)
            .filter(|guid| !guid.is_empty())
    }

    /// Whether this record has an identifier worth crawling
    pub fn has_guid(&self) -> bool {
        self.guid().is_some()
    }

    /// Key under which sinks upsert this record: the guid, else the
    /// qualified name
    pub fn upsert_key(&self) -> Option<&str> {
        self.guid().or_else(|| {
            self.qualified_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
        })
    }

    /// Label used in log messages
    pub fn display_name(&self) -> &str {
        self.table_name
            .as_deref()
            .or(self.name.as_deref())
            .or(self.guid())
            .unwrap_or("<unnamed>")
    }
}

/// Read a JSON array of records, the shape a top-level batch is supplied in
pub fn load_batch(path: impl AsRef<Path>) -> Result<Vec<EntityRecord>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

// ============================================================================
// URL Resolution
// ============================================================================

/// Resolve a request URL against the metadata service base URL.
///
/// Absolute request URLs are used as they are. Relative ones are appended to
/// the base URL, keeping any path prefix the base URL carries.
pub fn resolve_request_url(base_url: &str, request: &str) -> Result<Url> {
    let request = request.trim();
    if request.is_empty() {
        return Err(LineageError::invalid_url(request, "request URL is empty"));
    }

    if let Ok(absolute) = Url::parse(request) {
        return Ok(absolute);
    }

    let base = base_url.trim().trim_end_matches('/');
    if base.is_empty() {
        return Err(LineageError::invalid_url(request, "base URL is empty"));
    }

    let joined = if request.starts_with('/') {
        format!("{}{}", base, request)
    } else {
        format!("{}/{}", base, request)
    };

    Url::parse(&joined).map_err(|e| LineageError::invalid_url(joined.clone(), e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_entity_kind_from_type_name() {
        assert_eq!(EntityKind::from("hive_table"), EntityKind::Table);
        assert_eq!(EntityKind::from("HIVE_COLUMN"), EntityKind::Column);
        assert_eq!(EntityKind::from("hive_column_lineage"), EntityKind::Process);
        assert_eq!(
            EntityKind::from("kafka_topic"),
            EntityKind::Other("kafka_topic".to_string())
        );
    }

    #[test]
    fn test_parser_kind_from_str() {
        assert_eq!("table_detail".parse::<ParserKind>().unwrap(), ParserKind::TableDetail);
        assert_eq!("Column-Lineage".parse::<ParserKind>().unwrap(), ParserKind::ColumnLineage);
        assert!("html".parse::<ParserKind>().is_err());
    }

    #[test]
    fn test_request_url_appends_guid() {
        let child = ChildReference::new("abc", "/api/atlas/v2/entity/guid", ParserKind::TableDetail);
        assert_eq!(child.request_url(), "/api/atlas/v2/entity/guid?guid=abc");

        let child = ChildReference::new("abc", "/api/lineage?depth=3", ParserKind::ColumnLineage);
        assert_eq!(child.request_url(), "/api/lineage?depth=3&guid=abc");

        let child = ChildReference::new("abc", "/api/lineage?", ParserKind::ColumnLineage);
        assert_eq!(child.request_url(), "/api/lineage?guid=abc");
    }

    #[test]
    fn test_blank_guid_is_leaf() {
        let record = EntityRecord::new("   ", EntityKind::Table);
        assert!(!record.has_guid());
        assert!(!EntityRecord::leaf(EntityKind::Column).has_guid());
        assert!(EntityRecord::new("g1", EntityKind::Table).has_guid());
    }

    #[test]
    fn test_upsert_key_falls_back_to_qualified_name() {
        let record = EntityRecord::leaf(EntityKind::Column).with_qualified_name("db.t.c@cl");
        assert_eq!(record.upsert_key(), Some("db.t.c@cl"));
        assert_eq!(EntityRecord::leaf(EntityKind::Column).upsert_key(), None);
    }

    #[test]
    fn test_record_deserializes_with_defaults() {
        let record: EntityRecord = serde_json::from_value(serde_json::json!({
            "guid": "t1",
            "kind": "hive_table",
            "child_references": [
                {"guid": "t1", "template": "/api/atlas/v2/entity/guid", "parser": "table_detail"}
            ]
        }))
        .unwrap();

        assert_eq!(record.kind, EntityKind::Table);
        assert_eq!(record.child_references[0].parser, ParserKind::TableDetail);
        assert!(record.attributes.is_null());
    }

    #[test]
    fn test_load_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        std::fs::write(
            &path,
            r#"[{"guid": "t1", "kind": "hive_table", "name": "orders"}, {"kind": "column"}]"#,
        )
        .unwrap();

        let records = load_batch(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name.as_deref(), Some("orders"));
        assert!(!records[1].has_guid());
    }

    #[test]
    fn test_load_batch_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_batch(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, LineageError::Io(_)));

        let path = dir.path().join("object.json");
        std::fs::write(&path, r#"{"guid": "t1"}"#).unwrap();
        let malformed = load_batch(&path).unwrap_err();
        assert!(matches!(malformed, LineageError::Serialization(_)));
    }

    #[test]
    fn test_resolve_request_url() {
        let url = resolve_request_url("http://localhost:8111/", "/api/x?guid=1").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8111/api/x?guid=1");

        let url = resolve_request_url("http://meta:21000/atlas", "api/x?guid=1").unwrap();
        assert_eq!(url.as_str(), "http://meta:21000/atlas/api/x?guid=1");

        let url = resolve_request_url("http://ignored", "http://other/api?guid=2").unwrap();
        assert_eq!(url.host_str(), Some("other"));

        assert!(resolve_request_url("http://localhost:8111", "  ").is_err());
        assert!(resolve_request_url("", "/api").is_err());
    }

    proptest! {
        #[test]
        fn request_url_round_trips_guid(guid in "\\PC{1,40}") {
            let child = ChildReference::new(guid.clone(), "/api/atlas/v2/entity/guid", ParserKind::TableDetail);
            let url = resolve_request_url("http://localhost:8111", &child.request_url()).unwrap();
            let decoded: Vec<(String, String)> = url.query_pairs().into_owned().collect();
            prop_assert_eq!(decoded, vec![(GUID_QUERY_PARAM.to_string(), guid)]);
        }
    }
}
