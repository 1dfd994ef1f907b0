//! Column lineage parser
//!
//! Reads the lineage graph around a column and yields the related entities
//! (upstream and downstream columns, the processes linking them). These are
//! leaves: the crawl stops here.

use lineage_common::types::{EntityKind, EntityRecord, ParserKind};
use std::collections::HashSet;
use tracing::debug;

use super::models::LineageInfo;
use super::{non_blank, ParseError, ResponseParser, Result};
use crate::bus::{CompletionSignal, SignalContext, SignalKind};

#[derive(Default)]
pub struct ColumnLineageParser;

impl ColumnLineageParser {
    pub fn new() -> Self {
        Self
    }
}

impl ResponseParser for ColumnLineageParser {
    fn kind(&self) -> ParserKind {
        ParserKind::ColumnLineage
    }

    fn parse(&self, body: &[u8]) -> Result<Vec<EntityRecord>> {
        let lineage: LineageInfo = serde_json::from_slice(body)?;
        let base = non_blank(lineage.base_entity_guid.clone())
            .ok_or(ParseError::MissingField("baseEntityGuid"))?;

        // Relation order first, then whatever is left in the map, sorted
        let mut seen: HashSet<&str> = HashSet::from([base.as_str()]);
        let mut order: Vec<&str> = Vec::new();

        let related = lineage
            .relations
            .iter()
            .flat_map(|relation| [&relation.from_entity_id, &relation.to_entity_id])
            .filter_map(|guid| guid.as_deref());
        for guid in related {
            if seen.insert(guid) {
                order.push(guid);
            }
        }

        let mut remaining: Vec<&str> = lineage
            .guid_entity_map
            .keys()
            .map(String::as_str)
            .filter(|guid| !seen.contains(guid))
            .collect();
        remaining.sort_unstable();
        order.extend(remaining);

        let records: Vec<EntityRecord> = order
            .into_iter()
            .filter(|guid| !guid.trim().is_empty())
            .filter_map(|guid| {
                lineage
                    .guid_entity_map
                    .get(guid)
                    .map(|entity| entity.to_record(guid, EntityKind::Column))
            })
            .collect();

        debug!(
            column_guid = %base,
            relations = lineage.relations.len(),
            related = records.len(),
            "Parsed column lineage"
        );

        Ok(records)
    }

    fn completion_signal(
        &self,
        records: Vec<EntityRecord>,
        context: &SignalContext,
    ) -> CompletionSignal {
        let message = format!("{} lineage entities resolved", records.len());
        CompletionSignal::new(SignalKind::ColumnLineage, records, message, context)
    }
}
