//! Batch orchestrator
//!
//! Reacts to completion signals: persists the batch on its own task, then
//! extracts child references and hands them to the dispatcher. Parser signals
//! flow back in here, which is what makes the crawl recursive.

use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

use crate::bus::{CompletionSignal, SignalBus, SignalHandler, SignalKind};
use crate::dispatcher::FetchDispatcher;
use crate::extractor::extract;
use crate::sink::RecordSink;

/// Signal kinds the orchestrator reacts to
pub const HANDLED_KINDS: [SignalKind; 3] = [
    SignalKind::Lineage,
    SignalKind::TableDetail,
    SignalKind::ColumnLineage,
];

/// Where a batch ended up after [`BatchOrchestrator::on_batch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Persisted; nothing was dispatched
    Received,
    /// Persisted and at least one child request was spawned
    Dispatched,
}

pub struct BatchOrchestrator {
    sink: Arc<dyn RecordSink>,
    dispatcher: FetchDispatcher,
    max_depth: u32,
}

impl BatchOrchestrator {
    pub fn new(sink: Arc<dyn RecordSink>, dispatcher: FetchDispatcher, max_depth: u32) -> Self {
        Self {
            sink,
            dispatcher,
            max_depth,
        }
    }

    /// Subscribe to every kind in [`HANDLED_KINDS`].
    ///
    /// The bus only keeps a weak reference; once the last strong reference to
    /// the orchestrator is gone, its subscriptions become no-ops.
    pub fn register(self: &Arc<Self>, bus: &SignalBus) {
        for kind in HANDLED_KINDS {
            let orchestrator: Weak<Self> = Arc::downgrade(self);
            bus.subscribe(
                kind,
                Arc::new(move |signal: Arc<CompletionSignal>| {
                    if let Some(orchestrator) = orchestrator.upgrade() {
                        orchestrator.on_batch(signal);
                    }
                }),
            );
        }
    }

    /// Handle one batch. Never waits on I/O.
    pub fn on_batch(&self, signal: Arc<CompletionSignal>) -> BatchState {
        let context = signal.context();
        info!(
            batch_id = %context.batch_id,
            depth = context.depth,
            kind = %signal.kind,
            records = signal.records.len(),
            "{}",
            signal.message
        );

        if signal.records.is_empty() {
            return BatchState::Received;
        }

        self.persist(Arc::clone(&signal));

        if context.depth >= self.max_depth {
            warn!(
                batch_id = %context.batch_id,
                depth = context.depth,
                max_depth = self.max_depth,
                "Depth budget exhausted, not crawling further"
            );
            return BatchState::Received;
        }

        let requests = extract(&signal.records);
        if requests.is_empty() {
            debug!(batch_id = %context.batch_id, "No child references to resolve");
            return BatchState::Received;
        }

        if let Some(first) = signal.records.first() {
            info!("The {} details are being resolved", first.display_name());
        }

        let report = self.dispatcher.dispatch(requests, &context);
        debug!(
            batch_id = %context.batch_id,
            spawned = report.spawned,
            rejected = report.rejected.len(),
            "Dispatched child requests"
        );

        if report.spawned > 0 {
            BatchState::Dispatched
        } else {
            BatchState::Received
        }
    }

    fn persist(&self, signal: Arc<CompletionSignal>) {
        let sink = Arc::clone(&self.sink);
        self.dispatcher.spawn(async move {
            match sink.upsert_batch(&signal.records).await {
                Ok(written) => debug!(
                    batch_id = %signal.batch_id,
                    kind = %signal.kind,
                    written,
                    "Persisted batch"
                ),
                Err(e) => error!(
                    batch_id = %signal.batch_id,
                    kind = %signal.kind,
                    records = signal.records.len(),
                    "Failed to persist batch: {}",
                    e
                ),
            }
        });
    }
}

impl SignalHandler for BatchOrchestrator {
    fn handle(&self, signal: Arc<CompletionSignal>) {
        self.on_batch(signal);
    }
}
