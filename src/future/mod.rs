//! Single-shot delivery future.
//!
//! [`DeliveryFuture`] bridges a completion that happens on an I/O thread to
//! synchronous callers. Producers hold a [`Resolver`]; consumers register
//! callbacks and may block in [`DeliveryFuture::wait`] until the outcome is
//! known.
//!
//! Resolution is recorded exactly once. Whichever of
//! [`Resolver::resolve_success`] or [`Resolver::resolve_failure`] stores its
//! outcome first wins; later attempts return `false` and have no effect.
//! Callbacks run on the resolving thread before any waiter is released, so
//! a caller that registered callbacks has observed the outcome by the time
//! `wait` returns. A callback that panics is logged and skipped; the
//! remaining callbacks still run and waiters are still released.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};

use log::warn;
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};


type ValueCallback<T> = Box<dyn FnOnce(&T) + Send>;
type OutcomeCallback<T, E> = Box<dyn FnOnce(&Result<T, E>) + Send>;

/// Result of blocking on a future.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    /// The future resolved before the deadline.
    Resolved,
    /// The deadline elapsed first. The underlying operation keeps running.
    TimedOut,
}

struct Callbacks<T, E> {
    success: Option<ValueCallback<T>>,
    failure: Option<ValueCallback<E>>,
    always: Option<OutcomeCallback<T, E>>,
    /// Set once the resolver has collected the callbacks; later
    /// registrations run immediately instead.
    taken: bool,
    released: bool,
}

impl<T, E> Default for Callbacks<T, E> {
    fn default() -> Self {
        Self {
            success: None,
            failure: None,
            always: None,
            taken: false,
            released: false,
        }
    }
}

struct Shared<T, E> {
    outcome: OnceCell<Result<T, E>>,
    state: Mutex<Callbacks<T, E>>,
    resolved: Condvar,
}

impl<T, E> Shared<T, E> {
    fn resolve(&self, result: Result<T, E>) -> bool {
        if self.outcome.set(result).is_err() {
            return false;
        }
        let (success, failure, always) = {
            let mut state = self.state.lock();
            state.taken = true;
            (
                state.success.take(),
                state.failure.take(),
                state.always.take(),
            )
        };
        if let Some(outcome) = self.outcome.get() {
            match outcome {
                Ok(value) => {
                    if let Some(callback) = success {
                        run_isolated("success", || callback(value));
                    }
                }
                Err(err) => {
                    if let Some(callback) = failure {
                        run_isolated("failure", || callback(err));
                    }
                }
            }
            if let Some(callback) = always {
                run_isolated("always", || callback(outcome));
            }
        }
        let mut state = self.state.lock();
        state.released = true;
        self.resolved.notify_all();
        true
    }
}

/// Runs a completion callback on the resolving thread, containing any panic
/// so the thread survives and waiters are not stranded.
fn run_isolated(kind: &str, callback: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        warn!("delivery future {kind} callback panicked: {message}");
    }
}

/// Consumer side of a single-shot delivery outcome.
///
/// Clones observe the same outcome.
pub struct DeliveryFuture<T, E> {
    shared: Arc<Shared<T, E>>,
}

/// Producer side of a [`DeliveryFuture`].
pub struct Resolver<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> DeliveryFuture<T, E> {
    /// Create an unresolved future together with its resolver.
    pub fn pending() -> (Self, Resolver<T, E>) {
        let shared = Arc::new(Shared {
            outcome: OnceCell::new(),
            state: Mutex::new(Callbacks::default()),
            resolved: Condvar::new(),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            Resolver { shared },
        )
    }

    /// Create a future that is already resolved with `result`.
    pub fn ready(result: Result<T, E>) -> Self {
        let (future, resolver) = Self::pending();
        resolver.resolve(result);
        future
    }

    /// Register the callback run when the future resolves successfully.
    ///
    /// Replaces any previous success callback. Runs immediately on the
    /// calling thread if the outcome has already been delivered.
    pub fn success(&self, callback: impl FnOnce(&T) + Send + 'static) -> &Self {
        let mut state = self.shared.state.lock();
        if state.taken {
            drop(state);
            if let Some(Ok(value)) = self.shared.outcome.get() {
                callback(value);
            }
        } else {
            state.success = Some(Box::new(callback));
        }
        self
    }

    /// Register the callback run when the future resolves with a failure.
    pub fn failure(&self, callback: impl FnOnce(&E) + Send + 'static) -> &Self {
        let mut state = self.shared.state.lock();
        if state.taken {
            drop(state);
            if let Some(Err(err)) = self.shared.outcome.get() {
                callback(err);
            }
        } else {
            state.failure = Some(Box::new(callback));
        }
        self
    }

    /// Register the callback run after success or failure handling.
    pub fn always(&self, callback: impl FnOnce(&Result<T, E>) + Send + 'static) -> &Self {
        let mut state = self.shared.state.lock();
        if state.taken {
            drop(state);
            if let Some(outcome) = self.shared.outcome.get() {
                callback(outcome);
            }
        } else {
            state.always = Some(Box::new(callback));
        }
        self
    }

    /// Block until the future resolves or `timeout` elapses.
    ///
    /// `None` waits without a bound.
    pub fn wait(&self, timeout: Option<Duration>) -> WaitStatus {
        match timeout.and_then(|t| Instant::now().checked_add(t)) {
            Some(deadline) => self.wait_until(deadline),
            None => {
                let mut state = self.shared.state.lock();
                while !state.released {
                    self.shared.resolved.wait(&mut state);
                }
                WaitStatus::Resolved
            }
        }
    }

    /// Block until the future resolves or `deadline` passes.
    pub fn wait_until(&self, deadline: Instant) -> WaitStatus {
        let mut state = self.shared.state.lock();
        while !state.released {
            if self
                .shared
                .resolved
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return if state.released {
                    WaitStatus::Resolved
                } else {
                    WaitStatus::TimedOut
                };
            }
        }
        WaitStatus::Resolved
    }

    /// Whether an outcome has been recorded.
    pub fn is_resolved(&self) -> bool {
        self.shared.outcome.get().is_some()
    }

    /// Borrow the recorded outcome, if any.
    pub fn outcome(&self) -> Option<&Result<T, E>> {
        self.shared.outcome.get()
    }
}

impl<T, E> Clone for DeliveryFuture<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> std::fmt::Debug for DeliveryFuture<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryFuture")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl<T, E> Resolver<T, E> {
    /// Resolve with a value. Returns `false` if already resolved.
    pub fn resolve_success(&self, value: T) -> bool {
        self.shared.resolve(Ok(value))
    }

    /// Resolve with a failure. Returns `false` if already resolved.
    pub fn resolve_failure(&self, err: E) -> bool {
        self.shared.resolve(Err(err))
    }

    pub fn resolve(&self, result: Result<T, E>) -> bool {
        self.shared.resolve(result)
    }
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> std::fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("resolved", &self.shared.outcome.get().is_some())
            .finish()
    }
}
