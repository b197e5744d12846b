//! Configuration consumed by the delivery client.
//!
//! `DeliveryClientBuilder` validates these values before
//! [`DeliveryClient`](super::DeliveryClient) uses them at runtime.

use std::time::Duration;

use crate::rate_limited_warner::DEFAULT_WARN_INTERVAL;

/// Path appended to the normalised endpoint.
pub const BULK_PATH: &str = "/_bulk";
/// `Content-Type` sent with every bulk request.
pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";
/// `Accept` sent with every bulk request.
pub const ACCEPT: &str = "application/json";

/// Default bounded queue capacity between callers and the I/O workers.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
/// Default connection timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default per-request timeout, also the default bound for waiting on a
/// delivery future.
pub const DEFAULT_RESOURCE_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of I/O worker threads.
pub const DEFAULT_IO_THREADS: usize = 2;

/// Runtime configuration of a [`DeliveryClient`](super::DeliveryClient).
#[derive(Clone, Debug)]
pub struct DeliveryConfig {
    /// Base URL of the ingestion service. Normalised by the client.
    pub endpoint: String,
    /// Destination index written into every action line.
    pub index: String,
    /// Timeout for establishing connections.
    pub connect_timeout: Duration,
    /// Timeout for a whole request.
    pub resource_timeout: Duration,
    /// Number of threads performing HTTP I/O.
    pub io_threads: usize,
    /// Bounded queue capacity for submitted requests.
    pub capacity: usize,
    /// Extra headers added to each request.
    pub headers: Vec<(String, String)>,
    /// Interval between rate-limited warnings about dropped requests.
    pub warn_interval: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            index: String::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            resource_timeout: DEFAULT_RESOURCE_TIMEOUT,
            io_threads: DEFAULT_IO_THREADS,
            capacity: DEFAULT_CHANNEL_CAPACITY,
            headers: Vec::new(),
            warn_interval: DEFAULT_WARN_INTERVAL,
        }
    }
}
