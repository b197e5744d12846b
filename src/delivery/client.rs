//! Public delivery client.

use std::{sync::Arc, thread, time::Duration};

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use ureq::{Agent, AgentBuilder};

use crate::{
    bulk::BulkRequest,
    future::{DeliveryFuture, Resolver, WaitStatus},
    rate_limited_warner::RateLimitedWarner,
};

use super::{
    builder::BuildError,
    config::{BULK_PATH, DeliveryConfig},
    response::{DeliveryError, DeliveryFailure, JsonObject},
    worker::{PendingRequest, Transport, enqueue_request, join_workers, reject_closed, spawn_workers},
};

/// Future returned by [`DeliveryClient::execute`].
pub type BulkFuture = DeliveryFuture<JsonObject, DeliveryFailure>;
pub(crate) type BulkResolver = Resolver<JsonObject, DeliveryFailure>;

/// Trim surrounding whitespace and strip one trailing `/`.
///
/// ```
/// use logship::delivery::normalise_endpoint;
///
/// assert_eq!(normalise_endpoint("  http://host/  "), "http://host");
/// assert_eq!(normalise_endpoint("http://host//"), "http://host/");
/// ```
pub fn normalise_endpoint(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed.strip_suffix('/').unwrap_or(trimmed).to_string()
}

/// Client posting bulk requests to an ingestion endpoint.
///
/// Requests are executed asynchronously by a fixed pool of I/O threads.
/// Dropping the client delivers everything already queued, then joins the
/// workers.
pub struct DeliveryClient {
    endpoint: String,
    index: String,
    resource_timeout: Duration,
    tx: Mutex<Option<Sender<PendingRequest>>>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
    warner: RateLimitedWarner,
}

impl DeliveryClient {
    /// Construct the client and start its I/O workers.
    pub fn with_config(config: DeliveryConfig) -> Result<Self, BuildError> {
        let endpoint = normalise_endpoint(&config.endpoint);
        let agent = build_agent(&config)?;
        let transport = Arc::new(Transport::new(
            agent,
            format!("{endpoint}{BULK_PATH}"),
            &config,
        ));
        let pool = spawn_workers(transport, &config)?;
        Ok(Self {
            endpoint,
            index: config.index,
            resource_timeout: config.resource_timeout,
            tx: Mutex::new(Some(pool.tx)),
            handles: Mutex::new(pool.handles),
            warner: RateLimitedWarner::new(config.warn_interval),
        })
    }

    /// Normalised endpoint, without the bulk path.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Default bound for waiting on a returned future.
    pub fn wait_timeout(&self) -> Duration {
        self.resource_timeout
    }

    /// Submit `batch` and return a future for its outcome.
    ///
    /// Never blocks on the network. If the client is closed or its queue is
    /// full the returned future is already resolved with a failure.
    pub fn execute(&self, batch: &BulkRequest) -> BulkFuture {
        let (future, resolver) = BulkFuture::pending();
        let request = PendingRequest {
            body: batch.to_body(&self.index),
            document_count: batch.len(),
            resolver,
        };
        match self.sender() {
            Some(tx) => enqueue_request(&tx, request, &self.warner),
            None => reject_closed(request, &self.warner),
        }
        future
    }

    /// Submit `batch` and wait up to [`wait_timeout`](Self::wait_timeout)
    /// for its outcome.
    pub fn execute_blocking(&self, batch: &BulkRequest) -> Result<JsonObject, DeliveryFailure> {
        let future = self.execute(batch);
        if future.wait(Some(self.resource_timeout)) == WaitStatus::TimedOut {
            return Err(DeliveryFailure::new(DeliveryError::TimedOut));
        }
        future
            .outcome()
            .cloned()
            .unwrap_or_else(|| Err(DeliveryFailure::new(DeliveryError::TimedOut)))
    }

    /// Stop accepting requests, deliver queued ones, and join the workers.
    pub fn shutdown(&self) {
        drop(self.tx.lock().take());
        let handles = std::mem::take(&mut *self.handles.lock());
        join_workers(handles);
        self.warner.flush(|count| {
            log::warn!("DeliveryClient rejected {count} requests in the last interval");
        });
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    fn sender(&self) -> Option<Sender<PendingRequest>> {
        self.tx.lock().as_ref().cloned()
    }
}

/// Redirects are not followed: a 3xx is the endpoint's answer and is
/// classified like any other non-2xx status.
fn build_agent(config: &DeliveryConfig) -> Result<Agent, BuildError> {
    let connector = native_tls::TlsConnector::new()?;
    Ok(AgentBuilder::new()
        .timeout_connect(config.connect_timeout)
        .timeout(config.resource_timeout)
        .redirects(0)
        .tls_connector(Arc::new(connector))
        .build())
}

impl Drop for DeliveryClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DeliveryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryClient")
            .field("endpoint", &self.endpoint)
            .field("index", &self.index)
            .field("resource_timeout", &self.resource_timeout)
            .finish()
    }
}
