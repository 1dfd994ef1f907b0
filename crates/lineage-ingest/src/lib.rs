//! Lineage Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Recursive crawler for table and column lineage held by a metadata service.
//!
//! A batch of top-level records enters as a `Lineage` signal. Each record's
//! child references become HTTP requests; every successful response is parsed
//! into child records and announced on the same bus, which feeds them back
//! into the crawl until no references remain or the depth budget runs out.
//!
//! # Components
//!
//! - **extractor**: child references to a deduplicated request set
//! - **dispatcher**: concurrent GETs on tracked tasks, no retry
//! - **parser**: table detail and column lineage response parsers
//! - **bus**: in-process completion signals
//! - **orchestrator**: persist, extract, dispatch
//! - **sink**: where resolved records are stored
//!
//! # Example
//!
//! ```no_run
//! use lineage_common::types::{EntityKind, EntityRecord};
//! use lineage_ingest::{CrawlConfig, LineageCrawler, MemorySink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let sink = Arc::new(MemorySink::new());
//!     let crawler = LineageCrawler::new(&CrawlConfig::from_env()?, sink.clone())?;
//!
//!     let batch = crawler.with_table_detail_references(vec![
//!         EntityRecord::new("2f1c", EntityKind::Table).with_name("orders"),
//!     ]);
//!     crawler.submit_batch(batch);
//!     crawler.wait_idle().await;
//!
//!     println!("{} records resolved", sink.len());
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod config;
pub mod crawler;
pub mod dispatcher;
pub mod extractor;
pub mod orchestrator;
pub mod parser;
pub mod sink;

pub use bus::{CompletionSignal, SignalBus, SignalContext, SignalHandler, SignalKind};
pub use config::CrawlConfig;
pub use crawler::LineageCrawler;
pub use dispatcher::{DispatchReport, FetchDispatcher, FetchError};
pub use extractor::{extract, RequestDescriptor, RequestSet};
pub use orchestrator::{BatchOrchestrator, BatchState};
pub use parser::{ParseError, ParserRegistry, ResponseParser};
pub use sink::{JsonLinesSink, MemorySink, RecordSink, SinkError};
