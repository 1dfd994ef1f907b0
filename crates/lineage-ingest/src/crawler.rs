//! Crawler wiring
//!
//! [`LineageCrawler`] owns the bus, the dispatcher and the orchestrator for one
//! sink. It is the entry point the binary and the integration tests use.

use lineage_common::types::{ChildReference, EntityKind, EntityRecord, ParserKind};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::{CompletionSignal, SignalBus, SignalContext, SignalKind};
use crate::config::CrawlConfig;
use crate::dispatcher::{FetchDispatcher, FetchError};
use crate::orchestrator::BatchOrchestrator;
use crate::parser::ParserRegistry;
use crate::sink::RecordSink;

pub struct LineageCrawler {
    config: CrawlConfig,
    bus: Arc<SignalBus>,
    dispatcher: FetchDispatcher,
    // Subscriptions on the bus are weak; this keeps them alive
    _orchestrator: Arc<BatchOrchestrator>,
}

impl LineageCrawler {
    /// Crawler with the built-in parsers
    pub fn new(config: &CrawlConfig, sink: Arc<dyn RecordSink>) -> Result<Self, FetchError> {
        Self::with_parsers(config, ParserRegistry::with_defaults(config), sink)
    }

    pub fn with_parsers(
        config: &CrawlConfig,
        parsers: ParserRegistry,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Self, FetchError> {
        let bus = Arc::new(SignalBus::new());
        let dispatcher = FetchDispatcher::new(config, Arc::new(parsers), Arc::clone(&bus))?;
        let orchestrator = Arc::new(BatchOrchestrator::new(
            sink,
            dispatcher.clone(),
            config.max_depth,
        ));
        orchestrator.register(&bus);

        Ok(Self {
            config: config.clone(),
            bus,
            dispatcher,
            _orchestrator: orchestrator,
        })
    }

    /// Bus the crawl runs on, for extra subscribers
    pub fn bus(&self) -> &Arc<SignalBus> {
        &self.bus
    }

    pub fn dispatcher(&self) -> &FetchDispatcher {
        &self.dispatcher
    }

    /// Publish an externally supplied batch as a `Lineage` signal.
    ///
    /// Returns the batch id, or `None` for an empty batch.
    pub fn submit_batch(&self, records: Vec<EntityRecord>) -> Option<Uuid> {
        if records.is_empty() {
            warn!("Ignoring empty batch");
            return None;
        }

        let context = SignalContext::root();
        let message = format!("Received {} lineage records", records.len());
        let signal = CompletionSignal::new(SignalKind::Lineage, records, message, &context);

        let reached = self.bus.publish(signal);
        info!(batch_id = %context.batch_id, handlers = reached, "Submitted batch");

        Some(context.batch_id)
    }

    /// Give every table that has a guid but no child reference a reference to
    /// its own detail, so the crawl starts from the table's columns.
    pub fn with_table_detail_references(&self, records: Vec<EntityRecord>) -> Vec<EntityRecord> {
        records
            .into_iter()
            .map(|record| match record.guid().map(str::to_string) {
                Some(guid)
                    if record.kind == EntityKind::Table && record.child_references.is_empty() =>
                {
                    record.with_child(ChildReference::new(
                        guid,
                        self.config.table_detail_template.as_str(),
                        ParserKind::TableDetail,
                    ))
                },
                _ => record,
            })
            .collect()
    }

    /// Wait until every request and persistence task has finished
    pub async fn wait_idle(&self) {
        self.dispatcher.wait_idle().await;
    }
}
