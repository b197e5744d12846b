//! I/O worker threads driving HTTP requests.
//!
//! Workers share one `ureq::Agent` (and so its connection pool) and pull
//! requests from a bounded channel. Each request is attempted once and its
//! future is resolved on the worker thread. A request dropped without an
//! outcome resolves as [`DeliveryError::Closed`].

use std::{
    io::{self, Read},
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, warn};
use ureq::Agent;

use crate::rate_limited_warner::RateLimitedWarner;

use super::{
    client::BulkResolver,
    config::{ACCEPT, CONTENT_TYPE, DeliveryConfig},
    response::{DeliveryError, DeliveryFailure, ResponseMeta, response_outcome},
};

/// Upper bound on the number of response body bytes retained.
const MAX_RESPONSE_BYTES: u64 = 16 * 1024 * 1024;

/// A serialised bulk request waiting for an I/O worker.
pub(crate) struct PendingRequest {
    pub(crate) body: String,
    pub(crate) document_count: usize,
    pub(crate) resolver: BulkResolver,
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        // No-op once delivered or rejected.
        self.resolver
            .resolve_failure(DeliveryFailure::new(DeliveryError::Closed));
    }
}

/// Everything the workers need to issue a request.
pub(crate) struct Transport {
    agent: Agent,
    url: String,
    headers: Vec<(String, String)>,
}

impl Transport {
    pub(crate) fn new(agent: Agent, url: String, config: &DeliveryConfig) -> Self {
        Self {
            agent,
            url,
            headers: config.headers.clone(),
        }
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    fn send(&self, body: &str) -> Result<super::JsonObject, DeliveryFailure> {
        let mut request = self
            .agent
            .post(&self.url)
            .set("Content-Type", CONTENT_TYPE)
            .set("Accept", ACCEPT);
        for (key, value) in &self.headers {
            request = request.set(key, value);
        }
        match request.send_string(body) {
            Ok(response) => read_outcome(response),
            Err(ureq::Error::Status(_, response)) => read_outcome(response),
            Err(ureq::Error::Transport(err)) => Err(DeliveryFailure::new(
                DeliveryError::Transport(err.to_string()),
            )),
        }
    }
}

fn read_outcome(response: ureq::Response) -> Result<super::JsonObject, DeliveryFailure> {
    let meta = response_meta(&response);
    match read_body(response) {
        Ok(body) => response_outcome(meta, body),
        Err(err) => {
            warn!("failed to read bulk response body: {err}");
            response_outcome(meta, Vec::new())
        }
    }
}

fn response_meta(response: &ureq::Response) -> ResponseMeta {
    let headers = response
        .headers_names()
        .into_iter()
        .filter_map(|name| {
            let value = response.header(&name)?.to_string();
            Some((name, value))
        })
        .collect();
    ResponseMeta {
        status: response.status(),
        status_text: response.status_text().to_string(),
        headers,
    }
}

fn read_body(response: ureq::Response) -> io::Result<Vec<u8>> {
    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_RESPONSE_BYTES)
        .read_to_end(&mut body)?;
    Ok(body)
}

/// Handles to the running worker pool.
pub(crate) struct WorkerPool {
    pub(crate) tx: Sender<PendingRequest>,
    pub(crate) handles: Vec<thread::JoinHandle<()>>,
}

/// Spawn `config.io_threads` workers sharing `transport`.
///
/// If spawning fails part-way, the sender is dropped so already running
/// workers exit, and they are joined before the error is returned.
pub(crate) fn spawn_workers(
    transport: Arc<Transport>,
    config: &DeliveryConfig,
) -> io::Result<WorkerPool> {
    let (tx, rx) = bounded(config.capacity);
    let mut handles = Vec::with_capacity(config.io_threads);
    for id in 0..config.io_threads {
        let rx = rx.clone();
        let transport = Arc::clone(&transport);
        let spawned = thread::Builder::new()
            .name(format!("logship-io-{id}"))
            .spawn(move || worker_loop(&rx, &transport));
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                drop(tx);
                join_workers(handles);
                return Err(err);
            }
        }
    }
    Ok(WorkerPool { tx, handles })
}

fn worker_loop(rx: &Receiver<PendingRequest>, transport: &Transport) {
    // Queued requests are still delivered after the sender is dropped.
    while let Ok(request) = rx.recv() {
        let count = request.document_count;
        if panic::catch_unwind(AssertUnwindSafe(|| deliver(transport, request))).is_err() {
            warn!("I/O worker panicked delivering {count} documents; continuing");
        }
    }
}

fn deliver(transport: &Transport, request: PendingRequest) {
    let outcome = transport.send(&request.body);
    match &outcome {
        Ok(_) => debug!(
            "delivered {} documents to {}",
            request.document_count,
            transport.url()
        ),
        Err(failure) => debug!(
            "delivery of {} documents to {} failed: {failure}",
            request.document_count,
            transport.url()
        ),
    }
    request.resolver.resolve(outcome);
}

/// Join `handles`, skipping the calling thread when shutdown is requested
/// from inside a completion callback.
pub(crate) fn join_workers(handles: Vec<thread::JoinHandle<()>>) {
    let current = thread::current().id();
    for handle in handles {
        if handle.thread().id() == current {
            continue;
        }
        if handle.join().is_err() {
            warn!("DeliveryClient: I/O worker thread panicked");
        }
    }
}

/// Queue `request`, resolving it immediately if it cannot be queued.
pub(crate) fn enqueue_request(
    tx: &Sender<PendingRequest>,
    request: PendingRequest,
    warner: &RateLimitedWarner,
) {
    match tx.try_send(request) {
        Ok(()) => {}
        Err(TrySendError::Full(request)) => {
            warner.record_and_warn(|count| {
                warn!("DeliveryClient queue full; rejected {count} requests");
            });
            request
                .resolver
                .resolve_failure(DeliveryFailure::new(DeliveryError::QueueFull));
        }
        Err(TrySendError::Disconnected(request)) => {
            reject_closed(request, warner);
        }
    }
}

/// Resolve a request submitted after shutdown.
pub(crate) fn reject_closed(request: PendingRequest, warner: &RateLimitedWarner) {
    warner.record_and_warn(|count| {
        warn!("DeliveryClient is closed; rejected {count} requests");
    });
    request
        .resolver
        .resolve_failure(DeliveryFailure::new(DeliveryError::Closed));
}
