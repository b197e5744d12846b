//! Builder for [`DeliveryClient`](super::DeliveryClient).
//!
//! Validates the endpoint, destination index, timeouts, and pool sizing
//! before any thread is started.

use std::{io, time::Duration};

use thiserror::Error;

use super::{DeliveryClient, config::DeliveryConfig};

/// Errors that may occur while building a delivery client.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Invalid user supplied configuration.
    #[error("invalid delivery configuration: {0}")]
    InvalidConfig(String),
    /// Starting the I/O workers failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The TLS backend could not be initialised.
    #[error("failed to initialise TLS: {0}")]
    Tls(#[from] native_tls::Error),
}

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(BuildError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Builder for constructing [`DeliveryClient`] instances.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryClientBuilder {
    endpoint: Option<String>,
    index: Option<String>,
    headers: Vec<(String, String)>,
    capacity: Option<usize>,
    io_threads: Option<usize>,
    connect_timeout_ms: Option<u64>,
    resource_timeout_ms: Option<u64>,
    warn_interval_ms: Option<u64>,
}

impl DeliveryClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ingestion endpoint (required).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the destination index token (required).
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Add a header sent with every request.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    option_setter!(
        #[doc = "Set the bounded submission queue capacity."]
        with_capacity,
        capacity,
        usize
    );
    option_setter!(
        #[doc = "Set the number of I/O worker threads."]
        with_io_threads,
        io_threads,
        usize
    );
    option_setter!(
        #[doc = "Set the connect timeout in milliseconds."]
        with_connect_timeout_ms,
        connect_timeout_ms,
        u64
    );
    option_setter!(
        #[doc = "Set the request timeout in milliseconds."]
        with_resource_timeout_ms,
        resource_timeout_ms,
        u64
    );
    option_setter!(
        #[doc = "Set the interval between dropped-request warnings in milliseconds."]
        with_warn_interval_ms,
        warn_interval_ms,
        u64
    );

    fn validate(&self) -> Result<(), BuildError> {
        self.validate_endpoint()?;
        self.validate_index()?;
        self.validate_sizes()?;
        self.validate_timeouts()?;
        Ok(())
    }

    fn validate_endpoint(&self) -> Result<(), BuildError> {
        match &self.endpoint {
            None => Err(BuildError::InvalidConfig(
                "delivery client requires an endpoint".into(),
            )),
            Some(endpoint) if endpoint.trim().trim_end_matches('/').is_empty() => Err(
                BuildError::InvalidConfig("endpoint must not be empty".into()),
            ),
            _ => Ok(()),
        }
    }

    fn validate_index(&self) -> Result<(), BuildError> {
        match &self.index {
            None => Err(BuildError::InvalidConfig(
                "delivery client requires a destination index".into(),
            )),
            Some(index) if index.trim().is_empty() => Err(BuildError::InvalidConfig(
                "index must not be empty".into(),
            )),
            _ => Ok(()),
        }
    }

    fn validate_sizes(&self) -> Result<(), BuildError> {
        if let Some(capacity) = self.capacity {
            ensure_positive!(capacity, "capacity")?;
        }
        if let Some(threads) = self.io_threads {
            ensure_positive!(threads, "io_threads")?;
        }
        Ok(())
    }

    fn validate_timeouts(&self) -> Result<(), BuildError> {
        if let Some(timeout) = self.connect_timeout_ms {
            ensure_positive!(timeout, "connect_timeout_ms")?;
        }
        if let Some(timeout) = self.resource_timeout_ms {
            ensure_positive!(timeout, "resource_timeout_ms")?;
        }
        Ok(())
    }

    /// Validate and produce the runtime configuration.
    pub fn build_config(&self) -> Result<DeliveryConfig, BuildError> {
        self.validate()?;

        let defaults = DeliveryConfig::default();
        Ok(DeliveryConfig {
            endpoint: self.endpoint.clone().unwrap_or_default(),
            index: self.index.clone().unwrap_or_default(),
            connect_timeout: self
                .connect_timeout_ms
                .map_or(defaults.connect_timeout, Duration::from_millis),
            resource_timeout: self
                .resource_timeout_ms
                .map_or(defaults.resource_timeout, Duration::from_millis),
            io_threads: self.io_threads.unwrap_or(defaults.io_threads),
            capacity: self.capacity.unwrap_or(defaults.capacity),
            headers: self.headers.clone(),
            warn_interval: self
                .warn_interval_ms
                .map_or(defaults.warn_interval, Duration::from_millis),
        })
    }

    /// Validate the configuration and start a client.
    pub fn build(&self) -> Result<DeliveryClient, BuildError> {
        DeliveryClient::with_config(self.build_config()?)
    }
}
