//! Wire models of the metadata service (Atlas v2 REST shapes)
//!
//! Only the fields the parsers read are modelled. Everything is optional at
//! the serde level; parsers decide which fields are required.

use lineage_common::types::{EntityKind, EntityRecord};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::non_blank;

pub const NAME_ATTRIBUTE: &str = "name";
pub const QUALIFIED_NAME_ATTRIBUTE: &str = "qualifiedName";
pub const COLUMNS_ATTRIBUTE: &str = "columns";

/// A full entity as returned by the entity endpoints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasEntity {
    #[serde(default)]
    pub guid: Option<String>,

    #[serde(default)]
    pub type_name: Option<String>,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    #[serde(default)]
    pub display_text: Option<String>,
}

impl AtlasEntity {
    pub fn string_attribute(&self, key: &str) -> Option<String> {
        non_blank(
            self.attributes
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string),
        )
    }

    pub fn name(&self) -> Option<String> {
        self.string_attribute(NAME_ATTRIBUTE)
            .or_else(|| non_blank(self.display_text.clone()))
    }

    pub fn qualified_name(&self) -> Option<String> {
        self.string_attribute(QUALIFIED_NAME_ATTRIBUTE)
    }

    pub fn kind_or(&self, fallback: EntityKind) -> EntityKind {
        self.type_name
            .as_deref()
            .map(EntityKind::from)
            .unwrap_or(fallback)
    }

    /// Record for this entity without child references
    pub fn to_record(&self, guid: &str, fallback: EntityKind) -> EntityRecord {
        let mut record = EntityRecord::new(guid, self.kind_or(fallback));
        record.name = self.name();
        record.qualified_name = self.qualified_name();
        if !self.attributes.is_empty() {
            record.attributes = Value::Object(self.attributes.clone());
        }
        record
    }
}

/// `{"entity": ..., "referredEntities": {...}}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityWithExtInfo {
    #[serde(default)]
    pub entity: Option<AtlasEntity>,

    #[serde(default)]
    pub referred_entities: HashMap<String, AtlasEntity>,
}

/// Reference to another entity inside an attribute value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasObjectId {
    #[serde(default)]
    pub guid: Option<String>,

    #[serde(default)]
    pub type_name: Option<String>,
}

/// Lineage graph around one base entity
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageInfo {
    #[serde(default)]
    pub base_entity_guid: Option<String>,

    #[serde(default)]
    pub guid_entity_map: HashMap<String, AtlasEntity>,

    #[serde(default)]
    pub relations: Vec<LineageRelation>,
}

/// Directed edge of a lineage graph
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageRelation {
    #[serde(default)]
    pub from_entity_id: Option<String>,

    #[serde(default)]
    pub to_entity_id: Option<String>,
}
