//! Network reachability monitoring.
//!
//! A [`FlagSource`] reports raw connectivity flags. The
//! [`ReachabilityMonitor`] subscribes to one, classifies each new snapshot
//! into a [`ReachabilityStatus`], drops repeats, and fans changes out to
//! callbacks, listeners and event channels.
//!
//! Two sources ship with the crate: [`ManualFlagSource`], driven by the
//! embedding application, and [`SysfsFlagSource`], which polls the Linux
//! interface and routing tables.

mod flags;
mod monitor;
mod source;
mod status;
mod sysfs;

pub use flags::ReachabilityFlags;
pub use monitor::{
    ListenerId, MonitorId, REACHABILITY_CHANGED, ReachabilityChanged, ReachabilityMonitor,
};
pub use source::{FlagCallback, FlagSource, ManualFlagSource, ReachabilityError, SubscriptionToken};
pub use status::{ReachabilityPolicy, ReachabilityStatus, classify};
pub use sysfs::{DEFAULT_POLL_INTERVAL, SysfsFlagSource, SysfsPaths, read_flags};
