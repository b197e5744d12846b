//! Connectivity flag sources.
//!
//! A [`FlagSource`] reports the current [`ReachabilityFlags`] and pushes new
//! snapshots to subscribed callbacks. Each subscription is identified by a
//! [`SubscriptionToken`] owned by whoever registered it, so sources never
//! hold references back into their subscribers.

use std::io;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use parking_lot::Mutex;
use thiserror::Error;

use super::flags::ReachabilityFlags;

/// Callback receiving flag snapshots. May be invoked from any thread.
pub type FlagCallback = Box<dyn Fn(ReachabilityFlags) + Send + Sync>;

/// Errors raised by flag sources and the monitor.
#[derive(Debug, Error)]
pub enum ReachabilityError {
    /// Registering the change callback or serial queue failed.
    #[error("reachability setup failed: {0}")]
    Setup(String),
    /// Reading the platform connectivity state failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Handle identifying one subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

/// Capability interface over a platform connectivity API.
pub trait FlagSource: Send + Sync {
    /// Read the current flags.
    fn current_flags(&self) -> Result<ReachabilityFlags, ReachabilityError>;

    /// Register `callback` for flag changes.
    fn subscribe(&self, callback: FlagCallback) -> Result<SubscriptionToken, ReachabilityError>;

    /// Remove a subscription. Unknown tokens are ignored.
    fn unsubscribe(&self, token: SubscriptionToken);
}

/// Token-keyed callback registry shared by the bundled sources.
#[derive(Default)]
pub(crate) struct Subscribers {
    next: AtomicU64,
    entries: Mutex<Vec<(SubscriptionToken, Arc<FlagCallback>)>>,
}

impl Subscribers {
    pub(crate) fn insert(&self, callback: FlagCallback) -> SubscriptionToken {
        let token = SubscriptionToken(self.next.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((token, Arc::new(callback)));
        token
    }

    /// Remove `token`, returning whether it was registered.
    pub(crate) fn remove(&self, token: SubscriptionToken) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(t, _)| *t != token);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Invoke every callback outside the registry lock.
    pub(crate) fn notify(&self, flags: ReachabilityFlags) {
        let callbacks: Vec<Arc<FlagCallback>> = self
            .entries
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(flags);
        }
    }
}

/// In-memory source driven explicitly through [`set_flags`](Self::set_flags).
///
/// Useful for embedding applications that learn about connectivity from
/// their own platform layer, and for tests.
#[derive(Default)]
pub struct ManualFlagSource {
    flags: Mutex<ReachabilityFlags>,
    subscribers: Subscribers,
    reject_subscriptions: AtomicBool,
}

impl ManualFlagSource {
    pub fn new(initial: ReachabilityFlags) -> Self {
        Self {
            flags: Mutex::new(initial),
            ..Self::default()
        }
    }

    /// Store `flags` and push them to every subscriber, even when unchanged.
    pub fn set_flags(&self, flags: ReachabilityFlags) {
        *self.flags.lock() = flags;
        self.subscribers.notify(flags);
    }

    /// Make subsequent `subscribe` calls fail.
    pub fn reject_subscriptions(&self, reject: bool) {
        self.reject_subscriptions.store(reject, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl FlagSource for ManualFlagSource {
    fn current_flags(&self) -> Result<ReachabilityFlags, ReachabilityError> {
        Ok(*self.flags.lock())
    }

    fn subscribe(&self, callback: FlagCallback) -> Result<SubscriptionToken, ReachabilityError> {
        if self.reject_subscriptions.load(Ordering::SeqCst) {
            return Err(ReachabilityError::Setup(
                "flag source rejected the subscription".into(),
            ));
        }
        Ok(self.subscribers.insert(callback))
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        self.subscribers.remove(token);
    }
}

impl std::fmt::Debug for ManualFlagSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualFlagSource")
            .field("flags", &*self.flags.lock())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
