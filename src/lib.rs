//! Client-side log shipping.
//!
//! - [`bulk`] serialises documents into the newline-delimited bulk body.
//! - [`delivery`] posts bulk bodies from a pool of I/O threads and reports
//!   each outcome through a [`DeliveryFuture`].
//! - [`reachability`] watches connectivity flags and reports transitions.
//! - [`config`] loads both from an INI file.

pub mod bulk;
pub mod config;
pub mod delivery;
pub mod future;
pub mod reachability;
pub mod rate_limited_warner;

#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;

pub use bulk::{BulkRequest, Document, serialise_bulk_body};
pub use config::{ConfigError, LogshipConfig, ReachabilitySettings};
pub use delivery::{
    BuildError, BulkFuture, DeliveryClient, DeliveryClientBuilder, DeliveryError,
    DeliveryFailure, JsonObject,
};
pub use future::{DeliveryFuture, Resolver, WaitStatus};
pub use reachability::{
    FlagSource, ManualFlagSource, ReachabilityChanged, ReachabilityError, ReachabilityFlags,
    ReachabilityMonitor, ReachabilityPolicy, ReachabilityStatus, SysfsFlagSource,
};
