//! Table detail parser
//!
//! Reads an entity-with-extinfo document for a table and yields one record per
//! column. Each column carries a reference to its lineage so the crawl
//! continues one level down.

use lineage_common::types::{ChildReference, EntityKind, EntityRecord, ParserKind};
use std::collections::HashSet;
use tracing::debug;

use super::models::{AtlasObjectId, EntityWithExtInfo, COLUMNS_ATTRIBUTE};
use super::{non_blank, ParseError, ResponseParser, Result};
use crate::bus::{CompletionSignal, SignalContext, SignalKind};

pub struct TableDetailParser {
    column_lineage_template: String,
}

impl TableDetailParser {
    pub fn new(column_lineage_template: impl Into<String>) -> Self {
        Self {
            column_lineage_template: column_lineage_template.into(),
        }
    }
}

impl ResponseParser for TableDetailParser {
    fn kind(&self) -> ParserKind {
        ParserKind::TableDetail
    }

    fn parse(&self, body: &[u8]) -> Result<Vec<EntityRecord>> {
        let document: EntityWithExtInfo = serde_json::from_slice(body)?;
        let table = document.entity.ok_or(ParseError::MissingField("entity"))?;
        let table_guid =
            non_blank(table.guid.clone()).ok_or(ParseError::MissingField("entity.guid"))?;
        let table_name = table
            .name()
            .or_else(|| table.qualified_name())
            .unwrap_or_else(|| table_guid.clone());

        let columns: Vec<AtlasObjectId> = match table.attributes.get(COLUMNS_ATTRIBUTE) {
            Some(value) if !value.is_null() => serde_json::from_value(value.clone())?,
            _ => Vec::new(),
        };

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(columns.len());

        for column in columns {
            let Some(guid) = non_blank(column.guid) else {
                debug!(table = %table_name, "Skipping column reference without guid");
                continue;
            };
            if !seen.insert(guid.clone()) {
                continue;
            }

            let fallback = column
                .type_name
                .as_deref()
                .map(EntityKind::from)
                .unwrap_or(EntityKind::Column);

            let record = match document.referred_entities.get(&guid) {
                Some(detail) => detail.to_record(&guid, fallback),
                None => EntityRecord::new(guid.as_str(), fallback),
            }
            .with_table_name(table_name.as_str())
            .with_child(ChildReference::new(
                guid.as_str(),
                self.column_lineage_template.as_str(),
                ParserKind::ColumnLineage,
            ));

            records.push(record);
        }

        debug!(
            table = %table_name,
            table_guid = %table_guid,
            columns = records.len(),
            "Parsed table detail"
        );

        Ok(records)
    }

    fn completion_signal(
        &self,
        records: Vec<EntityRecord>,
        context: &SignalContext,
    ) -> CompletionSignal {
        let table = records
            .first()
            .and_then(|record| record.table_name.clone())
            .unwrap_or_default();
        let message = format!("The {} details resolved {} columns", table, records.len());

        CompletionSignal::new(SignalKind::TableDetail, records, message, context)
    }
}
