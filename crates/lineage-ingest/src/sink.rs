//! Record sinks
//!
//! Batch-upsert targets for resolved records. The engine only ever calls
//! [`RecordSink::upsert_batch`] and does not retry on failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lineage_common::types::EntityRecord;
use serde::{Deserialize, Serialize};
use serde_jsonlines::JsonLinesWriter;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Result type for sink operations
pub type Result<T> = std::result::Result<T, SinkError>;

/// Error types for record sinks
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sink task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Batch-upsert target keyed by [`EntityRecord::upsert_key`]
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Store a batch. Returns the number of records written; records without
    /// an upsert key are skipped.
    async fn upsert_batch(&self, records: &[EntityRecord]) -> Result<usize>;
}

// ============================================================================
// In-memory sink
// ============================================================================

/// Keeps the latest version of every record in memory
#[derive(Default)]
pub struct MemorySink {
    records: RwLock<HashMap<String, EntityRecord>>,
    batches: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct records stored
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<EntityRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Number of upsert calls received
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// All records, ordered by key
    pub fn snapshot(&self) -> Vec<EntityRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut keyed: Vec<(&String, &EntityRecord)> = records.iter().collect();
        keyed.sort_by(|a, b| a.0.cmp(b.0));
        keyed.into_iter().map(|(_, record)| record.clone()).collect()
    }

    /// Write the snapshot as JSON lines. Returns the number of lines written.
    pub fn write_json_lines<W: Write>(&self, writer: W) -> Result<usize> {
        let records = self.snapshot();
        let mut lines = JsonLinesWriter::new(writer);
        lines.write_all(&records)?;
        lines.flush()?;
        Ok(records.len())
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn upsert_batch(&self, records: &[EntityRecord]) -> Result<usize> {
        self.batches.fetch_add(1, Ordering::SeqCst);

        let mut stored = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let mut written = 0;
        for record in records {
            match record.upsert_key() {
                Some(key) => {
                    stored.insert(key.to_string(), record.clone());
                    written += 1;
                },
                None => debug!(kind = %record.kind, "Skipping record without upsert key"),
            }
        }

        Ok(written)
    }
}

// ============================================================================
// JSON-lines sink
// ============================================================================

/// One line of the JSON-lines output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedRecord {
    pub ingested_at: DateTime<Utc>,
    pub record: EntityRecord,
}

/// Appends every upserted record to a JSON-lines file.
///
/// The file is an append-only log; readers apply last-write-wins per guid.
pub struct JsonLinesSink {
    path: PathBuf,
    written: AtomicUsize,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of lines written so far
    pub fn written(&self) -> usize {
        self.written.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSink for JsonLinesSink {
    async fn upsert_batch(&self, records: &[EntityRecord]) -> Result<usize> {
        let ingested_at = Utc::now();
        let lines: Vec<IngestedRecord> = records
            .iter()
            .filter(|record| record.upsert_key().is_some())
            .map(|record| IngestedRecord {
                ingested_at,
                record: record.clone(),
            })
            .collect();

        if lines.is_empty() {
            return Ok(0);
        }

        let count = lines.len();
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || serde_jsonlines::append_json_lines(path, lines))
            .await??;

        self.written.fetch_add(count, Ordering::SeqCst);
        debug!(path = %self.path.display(), lines = count, "Appended records");
        Ok(count)
    }
}
