//! Bulk delivery over HTTP.
//!
//! [`DeliveryClient`] posts a [`BulkRequest`](crate::bulk::BulkRequest) to
//! `{endpoint}/_bulk` from a pool of I/O worker threads and hands the caller
//! a [`BulkFuture`] straight away. The worker that performs the request
//! resolves the future, so callbacks run on that worker thread.
//!
//! # Outcome Classification
//!
//! - **Transport error** (no response): failure without response metadata.
//! - **Status outside 2xx**: failure carrying the response metadata and the
//!   raw body, if any.
//! - **2xx**: success with the body parsed as a JSON object. An unparseable
//!   body yields an empty object and a warning; an empty body yields an
//!   empty object without one.
//!
//! Redirects are not followed, so a 3xx is a failure like any other non-2xx.
//!
//! The client makes exactly one attempt per [`DeliveryClient::execute`]
//! call. Retry policy belongs to the caller.

mod builder;
mod client;
mod config;
mod response;
mod worker;

#[cfg(test)]
mod tests;

pub use builder::{BuildError, DeliveryClientBuilder};
pub use client::{BulkFuture, DeliveryClient, normalise_endpoint};
pub use config::{
    ACCEPT, BULK_PATH, CONTENT_TYPE, DEFAULT_CHANNEL_CAPACITY, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_IO_THREADS, DEFAULT_RESOURCE_TIMEOUT, DeliveryConfig,
};
pub use response::{
    DeliveryError, DeliveryFailure, JsonObject, ResponseClass, ResponseMeta, classify_status,
};
