//! Response parsers
//!
//! One parser per [`ParserKind`]. A parser turns the JSON body of a successful
//! response into child records and builds the completion signal announcing
//! them. Parsing is a pure function of the body, so parsers can run on any
//! worker thread.

pub mod column_lineage;
pub mod models;
pub mod table_detail;

pub use column_lineage::ColumnLineageParser;
pub use table_detail::TableDetailParser;

use lineage_common::types::{EntityRecord, ParserKind};
use std::collections::HashMap;
use std::sync::Arc;

use crate::bus::{CompletionSignal, SignalContext};
use crate::config::CrawlConfig;

/// Result type for parser operations
pub type Result<T> = std::result::Result<T, ParseError>;

/// Error types for response parsing
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),
}

/// Parser for one kind of metadata response
pub trait ResponseParser: Send + Sync {
    /// Tag this parser is registered under
    fn kind(&self) -> ParserKind;

    /// Parse a raw JSON body into child records. An empty result means the
    /// entity has nothing further to resolve.
    fn parse(&self, body: &[u8]) -> Result<Vec<EntityRecord>>;

    /// Signal announcing `records`. Only called with a non-empty sequence.
    fn completion_signal(
        &self,
        records: Vec<EntityRecord>,
        context: &SignalContext,
    ) -> CompletionSignal;
}

/// Parsers by kind
#[derive(Default, Clone)]
pub struct ParserRegistry {
    parsers: HashMap<ParserKind, Arc<dyn ResponseParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in table detail and column lineage parsers
    pub fn with_defaults(config: &CrawlConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TableDetailParser::new(
            config.column_lineage_template.clone(),
        )));
        registry.register(Arc::new(ColumnLineageParser::new()));
        registry
    }

    /// Register a parser, replacing any previous one of the same kind
    pub fn register(&mut self, parser: Arc<dyn ResponseParser>) {
        self.parsers.insert(parser.kind(), parser);
    }

    pub fn get(&self, kind: ParserKind) -> Option<Arc<dyn ResponseParser>> {
        self.parsers.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

/// Non-blank string or `None`
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
