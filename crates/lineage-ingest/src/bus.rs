//! Completion signal bus
//!
//! In-process publish/subscribe keyed by [`SignalKind`]. Publishing calls every
//! handler registered for the signal's kind at that moment. There is no queue:
//! a signal nobody subscribed to is dropped, and handlers registered later
//! never see it.

use lineage_common::types::EntityRecord;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Kind of a completion signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// A batch of top-level lineage records arrived
    Lineage,
    /// Columns of a table were resolved
    TableDetail,
    /// Entities related to a column were resolved
    ColumnLineage,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Lineage => "lineage",
            SignalKind::TableDetail => "table_detail",
            SignalKind::ColumnLineage => "column_lineage",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a signal sits in the crawl of one top-level batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalContext {
    /// Correlates every signal descending from the same top-level batch
    pub batch_id: Uuid,

    /// 0 for the top-level batch, parent depth + 1 below it
    pub depth: u32,
}

impl SignalContext {
    /// Context of a new top-level batch
    pub fn root() -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            depth: 0,
        }
    }

    /// Context for records discovered while resolving this one
    pub fn child(&self) -> Self {
        Self {
            batch_id: self.batch_id,
            depth: self.depth.saturating_add(1),
        }
    }
}

/// "N entities of kind K resolved"
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    pub kind: SignalKind,
    pub records: Vec<EntityRecord>,
    pub message: String,
    pub batch_id: Uuid,
    pub depth: u32,
}

impl CompletionSignal {
    pub fn new(
        kind: SignalKind,
        records: Vec<EntityRecord>,
        message: impl Into<String>,
        context: &SignalContext,
    ) -> Self {
        Self {
            kind,
            records,
            message: message.into(),
            batch_id: context.batch_id,
            depth: context.depth,
        }
    }

    pub fn context(&self) -> SignalContext {
        SignalContext {
            batch_id: self.batch_id,
            depth: self.depth,
        }
    }
}

/// Receives published signals.
///
/// Handlers run on the publisher's task and must not block; long work belongs
/// on a spawned task.
pub trait SignalHandler: Send + Sync {
    fn handle(&self, signal: Arc<CompletionSignal>);
}

impl<F> SignalHandler for F
where
    F: Fn(Arc<CompletionSignal>) + Send + Sync,
{
    fn handle(&self, signal: Arc<CompletionSignal>) {
        self(signal)
    }
}

/// Dispatch table from signal kind to registered handlers
#[derive(Default)]
pub struct SignalBus {
    handlers: RwLock<HashMap<SignalKind, Vec<Arc<dyn SignalHandler>>>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for every future signal of `kind`
    pub fn subscribe(&self, kind: SignalKind, handler: Arc<dyn SignalHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(handler);
    }

    /// Number of handlers registered for `kind`
    pub fn subscriber_count(&self, kind: SignalKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Deliver a signal to every handler of its kind.
    ///
    /// Returns the number of handlers reached.
    pub fn publish(&self, signal: CompletionSignal) -> usize {
        // Snapshot so handlers may subscribe or publish without deadlocking
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&signal.kind)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            debug!(
                kind = %signal.kind,
                records = signal.records.len(),
                "No subscriber for signal, dropping it"
            );
            return 0;
        }

        let signal = Arc::new(signal);
        for handler in &handlers {
            handler.handle(Arc::clone(&signal));
        }

        handlers.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use lineage_common::types::EntityKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn signal(kind: SignalKind, n: usize) -> CompletionSignal {
        let records = (0..n)
            .map(|i| EntityRecord::new(format!("g{}", i), EntityKind::Column))
            .collect();
        CompletionSignal::new(kind, records, "resolved", &SignalContext::root())
    }

    #[test]
    fn test_publish_reaches_all_subscribers_of_kind() {
        let bus = SignalBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let hits = Arc::clone(&hits);
            bus.subscribe(
                SignalKind::TableDetail,
                Arc::new(move |s: Arc<CompletionSignal>| {
                    hits.fetch_add(s.records.len(), Ordering::SeqCst);
                }),
            );
        }

        assert_eq!(bus.publish(signal(SignalKind::TableDetail, 3)), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_other_kinds_are_not_delivered() {
        let bus = SignalBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(
            SignalKind::Lineage,
            Arc::new(move |s: Arc<CompletionSignal>| sink.lock().unwrap().push(s.kind)),
        );

        bus.publish(signal(SignalKind::ColumnLineage, 1));
        bus.publish(signal(SignalKind::Lineage, 1));

        assert_eq!(*seen.lock().unwrap(), vec![SignalKind::Lineage]);
    }

    #[test]
    fn test_signal_without_subscriber_is_lost() {
        let bus = SignalBus::new();
        assert_eq!(bus.publish(signal(SignalKind::Lineage, 1)), 0);

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        bus.subscribe(
            SignalKind::Lineage,
            Arc::new(move |_: Arc<CompletionSignal>| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        // Late subscriber does not receive the earlier signal
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count(SignalKind::Lineage), 1);
    }

    #[test]
    fn test_child_context_keeps_batch_id() {
        let root = SignalContext::root();
        let child = root.child();
        assert_eq!(child.batch_id, root.batch_id);
        assert_eq!(child.depth, 1);
        assert_eq!(child.child().depth, 2);
    }
}
