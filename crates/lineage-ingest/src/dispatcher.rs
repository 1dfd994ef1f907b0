//! Fetch dispatcher
//!
//! Issues one GET per request descriptor on a tracked task, parses the body
//! with the parser the descriptor names and publishes the resulting
//! completion signal. Failures are logged and end that branch of the crawl;
//! there is no retry.
//!
//! Every task spawned here, including persistence tasks handed over by the
//! orchestrator, goes through a single [`TaskTracker`]. [`FetchDispatcher::wait_idle`]
//! resolves once that tracker has no task left.

use lineage_common::types::resolve_request_url;
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::future::Future;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};
use url::Url;

use crate::bus::{SignalBus, SignalContext};
use crate::config::CrawlConfig;
use crate::extractor::{RequestDescriptor, RequestSet};
use crate::parser::{ParseError, ParserRegistry, ResponseParser};

/// Error types for a single fetch
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid request '{url}': {reason}")]
    InvalidRequest { url: String, reason: String },

    #[error("Call interface [[ {url} ]] is connect refused")]
    ConnectionRefused {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Call interface [[ {url} ]] failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Call interface [[ {url} ]] returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to parse response of [[ {url} ]]: {source}")]
    Parse {
        url: String,
        #[source]
        source: ParseError,
    },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

impl FetchError {
    fn transport(url: &Url, source: reqwest::Error) -> Self {
        let url = url.to_string();
        if source.is_connect() {
            Self::ConnectionRefused { url, source }
        } else {
            Self::Transport { url, source }
        }
    }

    /// Whether the remote service could not be reached at all
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, Self::ConnectionRefused { .. })
    }
}

/// Outcome of handing a request set to the dispatcher
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Requests now running on their own task
    pub spawned: usize,

    /// Requests rejected before any I/O
    pub rejected: Vec<FetchError>,
}

/// Runs requests concurrently and publishes what they resolve
#[derive(Clone)]
pub struct FetchDispatcher {
    client: Client,
    base_url: String,
    parsers: Arc<ParserRegistry>,
    bus: Arc<SignalBus>,
    tracker: TaskTracker,
}

impl FetchDispatcher {
    pub fn new(
        config: &CrawlConfig,
        parsers: Arc<ParserRegistry>,
        bus: Arc<SignalBus>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            parsers,
            bus,
            tracker: TaskTracker::new(),
        })
    }

    pub fn bus(&self) -> &Arc<SignalBus> {
        &self.bus
    }

    /// Submit every request of a set. Returns as soon as the tasks are spawned.
    pub fn dispatch(&self, requests: RequestSet, context: &SignalContext) -> DispatchReport {
        let mut report = DispatchReport::default();

        for request in requests {
            match self.submit(request, context) {
                Ok(()) => report.spawned += 1,
                Err(e) => {
                    error!(batch_id = %context.batch_id, "{}", e);
                    report.rejected.push(e);
                },
            }
        }

        report
    }

    /// Validate a request and run it on a tracked task.
    ///
    /// Only problems detectable without I/O are returned; anything that goes
    /// wrong later is logged by the task.
    pub fn submit(&self, request: RequestDescriptor, context: &SignalContext) -> Result<(), FetchError> {
        self.resolve(&request)?;
        self.parser_for(&request)?;

        let dispatcher = self.clone();
        let context = *context;
        self.tracker.spawn(async move {
            if let Err(e) = dispatcher.fetch(&request, &context).await {
                error!(
                    batch_id = %context.batch_id,
                    depth = context.depth,
                    parser = %request.parser,
                    unreachable = e.is_connection_refused(),
                    "{}",
                    e
                );
            }
        });

        Ok(())
    }

    /// Fetch, parse and publish one request on the current task.
    ///
    /// Returns the number of records resolved. An empty parse publishes
    /// nothing.
    pub async fn fetch(
        &self,
        request: &RequestDescriptor,
        context: &SignalContext,
    ) -> Result<usize, FetchError> {
        let parser = self.parser_for(request)?;
        let url = self.resolve(request)?;

        debug!(url = %url, parser = %request.parser, "Fetching");

        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::transport(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::transport(&url, e))?;

        let records = parser.parse(&body).map_err(|source| FetchError::Parse {
            url: url.to_string(),
            source,
        })?;

        if records.is_empty() {
            debug!(url = %url, "Nothing resolved");
            return Ok(0);
        }

        let count = records.len();
        let signal = parser.completion_signal(records, &context.child());
        let delivered = self.bus.publish(signal);
        debug!(url = %url, records = count, handlers = delivered, "Published signal");

        Ok(count)
    }

    /// Run arbitrary work under the same tracker as the fetches
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(future);
    }

    /// Number of tracked tasks still running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until no tracked task is left.
    ///
    /// Tasks spawned by running tasks are waited for as well. This is a
    /// process-wide probe: it covers every batch submitted so far.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn parser_for(&self, request: &RequestDescriptor) -> Result<Arc<dyn ResponseParser>, FetchError> {
        self.parsers
            .get(request.parser)
            .ok_or_else(|| FetchError::InvalidRequest {
                url: request.url.clone(),
                reason: format!("no parser registered for '{}'", request.parser),
            })
    }

    fn resolve(&self, request: &RequestDescriptor) -> Result<Url, FetchError> {
        resolve_request_url(&self.base_url, &request.url).map_err(|e| FetchError::InvalidRequest {
            url: request.url.clone(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::bus::{CompletionSignal, SignalKind};
    use lineage_common::types::ParserKind;
    use std::sync::Mutex;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dispatcher(base_url: &str) -> (FetchDispatcher, Arc<Mutex<Vec<Arc<CompletionSignal>>>>) {
        let config = CrawlConfig::default().with_base_url(base_url);
        let bus = Arc::new(SignalBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        for kind in [SignalKind::TableDetail, SignalKind::ColumnLineage] {
            let seen = Arc::clone(&seen);
            bus.subscribe(
                kind,
                Arc::new(move |s: Arc<CompletionSignal>| seen.lock().unwrap().push(s)),
            );
        }

        let parsers = Arc::new(ParserRegistry::with_defaults(&config));
        (FetchDispatcher::new(&config, parsers, bus).unwrap(), seen)
    }

    #[tokio::test]
    async fn test_fetch_publishes_child_signal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/atlas/v2/entity/guid"))
            .and(query_param("guid", "t1"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "entity": {"guid": "t1", "attributes": {"name": "orders", "columns": [{"guid": "c1"}]}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (dispatcher, seen) = dispatcher(&server.uri());
        let root = SignalContext::root();
        let request =
            RequestDescriptor::new("/api/atlas/v2/entity/guid?guid=t1", ParserKind::TableDetail);

        assert_eq!(dispatcher.fetch(&request, &root).await.unwrap(), 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, SignalKind::TableDetail);
        assert_eq!(seen[0].batch_id, root.batch_id);
        assert_eq!(seen[0].depth, 1);
    }

    #[tokio::test]
    async fn test_error_status_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let (dispatcher, seen) = dispatcher(&server.uri());
        let request = RequestDescriptor::new("/api/atlas/v2/lineage?guid=c1", ParserKind::ColumnLineage);

        let err = dispatcher.fetch(&request, &SignalContext::root()).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 500, .. }));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_connection_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let (dispatcher, seen) = dispatcher(&base_url);
        let request =
            RequestDescriptor::new("/api/atlas/v2/entity/guid?guid=t1", ParserKind::TableDetail);

        let err = dispatcher.fetch(&request, &SignalContext::root()).await.unwrap_err();
        assert!(matches!(err, FetchError::ConnectionRefused { .. }));
        assert!(err.is_connection_refused());
        assert!(err.to_string().contains("is connect refused"));
        assert!(err.to_string().contains("guid=t1"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_requests_ask_for_compressed_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("accept", "application/json"))
            .and(|request: &wiremock::Request| {
                request
                    .headers
                    .get("accept-encoding")
                    .and_then(|value| value.to_str().ok())
                    .is_some_and(|value| value.contains("gzip"))
            })
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "baseEntityGuid": "c1", "guidEntityMap": {}, "relations": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (dispatcher, _) = dispatcher(&server.uri());
        let request = RequestDescriptor::new("/api/atlas/v2/lineage?guid=c1", ParserKind::ColumnLineage);
        assert_eq!(dispatcher.fetch(&request, &SignalContext::root()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_parse_publishes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "baseEntityGuid": "c1", "guidEntityMap": {}, "relations": []
            })))
            .mount(&server)
            .await;

        let (dispatcher, seen) = dispatcher(&server.uri());
        let request = RequestDescriptor::new("/api/atlas/v2/lineage?guid=c1", ParserKind::ColumnLineage);

        assert_eq!(dispatcher.fetch(&request, &SignalContext::root()).await.unwrap(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_request_synchronously() {
        let (dispatcher, _) = dispatcher("http://localhost:8111");
        let err = dispatcher
            .submit(RequestDescriptor::new("  ", ParserKind::TableDetail), &SignalContext::root())
            .unwrap_err();

        assert!(matches!(err, FetchError::InvalidRequest { .. }));
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_submit_rejects_unregistered_parser() {
        let config = CrawlConfig::default();
        let dispatcher = FetchDispatcher::new(
            &config,
            Arc::new(ParserRegistry::new()),
            Arc::new(SignalBus::new()),
        )
        .unwrap();

        let err = dispatcher
            .submit(
                RequestDescriptor::new("/api/atlas/v2/lineage?guid=c1", ParserKind::ColumnLineage),
                &SignalContext::root(),
            )
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_wait_idle_covers_spawned_work() {
        let (dispatcher, _) = dispatcher("http://localhost:8111");
        let done = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&done);

        dispatcher.spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            *flag.lock().unwrap() = true;
        });

        dispatcher.wait_idle().await;
        assert!(*done.lock().unwrap());
        assert_eq!(dispatcher.in_flight(), 0);

        // Usable again after going idle
        dispatcher.spawn(async {});
        dispatcher.wait_idle().await;
    }
}
