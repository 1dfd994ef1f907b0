//! Reference extraction
//!
//! Turns a batch of records into the set of requests needed to resolve their
//! children. Requests are keyed by URL, so two records pointing at the same
//! child through the same template produce a single request.

use lineage_common::types::{EntityRecord, ParserKind};
use std::collections::btree_map::{self, BTreeMap};
use tracing::debug;

/// One request to issue: the request URL and the parser for its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// Template plus `guid` query parameter, relative to the service base URL
    /// unless the template was absolute
    pub url: String,
    pub parser: ParserKind,
}

impl RequestDescriptor {
    pub fn new(url: impl Into<String>, parser: ParserKind) -> Self {
        Self {
            url: url.into(),
            parser,
        }
    }
}

/// Deduplicated requests of one batch, keyed by URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSet {
    requests: BTreeMap<String, ParserKind>,
}

impl RequestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request; an existing entry for the same URL is replaced
    pub fn insert(&mut self, url: String, parser: ParserKind) {
        self.requests.insert(url, parser);
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.requests.contains_key(url)
    }

    pub fn parser_for(&self, url: &str) -> Option<ParserKind> {
        self.requests.get(url).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ParserKind)> {
        self.requests.iter().map(|(url, parser)| (url.as_str(), *parser))
    }
}

impl IntoIterator for RequestSet {
    type Item = RequestDescriptor;
    type IntoIter = std::iter::Map<
        btree_map::IntoIter<String, ParserKind>,
        fn((String, ParserKind)) -> RequestDescriptor,
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.requests
            .into_iter()
            .map(descriptor as fn((String, ParserKind)) -> RequestDescriptor)
    }
}

fn descriptor((url, parser): (String, ParserKind)) -> RequestDescriptor {
    RequestDescriptor { url, parser }
}

/// Build the request set for a batch.
///
/// Records without a guid are leaves and contribute nothing. Performs no I/O.
pub fn extract(records: &[EntityRecord]) -> RequestSet {
    let mut set = RequestSet::new();
    let mut references = 0usize;

    for record in records.iter().filter(|record| record.has_guid()) {
        for child in &record.child_references {
            references += 1;
            set.insert(child.request_url(), child.parser);
        }
    }

    debug!(
        records = records.len(),
        references,
        requests = set.len(),
        "Extracted child requests"
    );

    set
}
