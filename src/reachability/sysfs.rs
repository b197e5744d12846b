//! Linux flag source backed by `/sys/class/net` and `/proc/net/route`.
//!
//! The kernel offers no reachability callback comparable to the mobile
//! platform APIs, so a poller thread re-reads interface and routing state at
//! a fixed interval and notifies subscribers when the derived flags change.
//! The poller runs only while at least one subscription exists.
//!
//! Mapping:
//!
//! - no operational non-loopback interface → no bits set;
//! - an operational interface but no default route → `connection_required`
//!   and `is_local`;
//! - a default route → `reachable`, with `is_cellular` when the route's
//!   interface is a WWAN device and `is_direct` when it has no gateway.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use log::{debug, warn};
use parking_lot::Mutex;

use crate::rate_limited_warner::RateLimitedWarner;

use super::{
    flags::ReachabilityFlags,
    source::{FlagCallback, FlagSource, ReachabilityError, Subscribers, SubscriptionToken},
};

/// Default interval between two polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

const RTF_UP: u32 = 0x1;
const CELLULAR_PREFIXES: [&str; 3] = ["wwan", "rmnet", "ppp"];

/// Filesystem locations read by [`SysfsFlagSource`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SysfsPaths {
    /// Directory with one entry per interface, normally `/sys/class/net`.
    pub net_class: PathBuf,
    /// IPv4 routing table, normally `/proc/net/route`.
    pub route_table: PathBuf,
}

impl Default for SysfsPaths {
    fn default() -> Self {
        Self {
            net_class: PathBuf::from("/sys/class/net"),
            route_table: PathBuf::from("/proc/net/route"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct DefaultRoute {
    interface: String,
    has_gateway: bool,
    metric: u32,
}

struct Poller {
    stop: Sender<()>,
    handle: thread::JoinHandle<()>,
}

struct Shared {
    paths: SysfsPaths,
    subscribers: Subscribers,
    warner: RateLimitedWarner,
}

/// Polling flag source for Linux hosts.
pub struct SysfsFlagSource {
    shared: Arc<Shared>,
    poll_interval: Duration,
    poller: Mutex<Option<Poller>>,
}

impl SysfsFlagSource {
    /// Source reading the live system paths.
    pub fn system(poll_interval: Duration) -> Self {
        Self::with_paths(SysfsPaths::default(), poll_interval)
    }

    pub fn with_paths(paths: SysfsPaths, poll_interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                paths,
                subscribers: Subscribers::default(),
                warner: RateLimitedWarner::default(),
            }),
            poll_interval,
            poller: Mutex::new(None),
        }
    }

    pub fn paths(&self) -> &SysfsPaths {
        &self.shared.paths
    }

    fn spawn_poller(&self) -> io::Result<Poller> {
        let (stop, stop_rx) = bounded::<()>(1);
        let shared = Arc::clone(&self.shared);
        let interval = self.poll_interval;
        let mut last = read_flags(&shared.paths).ok();
        let handle = thread::Builder::new()
            .name("logship-netpoll".into())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    match read_flags(&shared.paths) {
                        Ok(flags) if last != Some(flags) => {
                            debug!("network flags changed to {flags}");
                            last = Some(flags);
                            shared.subscribers.notify(flags);
                        }
                        Ok(_) => {}
                        Err(err) => shared.warner.record_and_warn(|count| {
                            warn!("failed to read network state ({count} times): {err}");
                        }),
                    }
                }
            })?;
        Ok(Poller { stop, handle })
    }
}

impl Poller {
    fn shutdown(self) {
        let _ = self.stop.send(());
        if self.handle.thread().id() != thread::current().id() && self.handle.join().is_err() {
            warn!("SysfsFlagSource: poller thread panicked");
        }
    }
}

impl FlagSource for SysfsFlagSource {
    fn current_flags(&self) -> Result<ReachabilityFlags, ReachabilityError> {
        Ok(read_flags(&self.shared.paths)?)
    }

    // Subscriber set changes happen under the poller lock so a concurrent
    // subscribe cannot land between the last unsubscribe and the poller stop.
    fn subscribe(&self, callback: FlagCallback) -> Result<SubscriptionToken, ReachabilityError> {
        let mut poller = self.poller.lock();
        let token = self.shared.subscribers.insert(callback);
        if poller.is_none() {
            match self.spawn_poller() {
                Ok(spawned) => *poller = Some(spawned),
                Err(err) => {
                    self.shared.subscribers.remove(token);
                    return Err(ReachabilityError::Setup(format!(
                        "failed to start network poller: {err}"
                    )));
                }
            }
        }
        Ok(token)
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        let idle = {
            let mut poller = self.poller.lock();
            if !self.shared.subscribers.remove(token) || self.shared.subscribers.len() > 0 {
                return;
            }
            poller.take()
        };
        if let Some(poller) = idle {
            poller.shutdown();
        }
    }
}

impl Drop for SysfsFlagSource {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.get_mut().take() {
            poller.shutdown();
        }
    }
}

impl std::fmt::Debug for SysfsFlagSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysfsFlagSource")
            .field("paths", &self.shared.paths)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

/// Derive flags from interface and routing state under `paths`.
pub fn read_flags(paths: &SysfsPaths) -> io::Result<ReachabilityFlags> {
    let routes = fs::read_to_string(&paths.route_table)?;
    let active = active_interfaces(&paths.net_class)?;
    let route = default_route(&routes).filter(|r| active.iter().any(|i| *i == r.interface));

    Ok(match route {
        Some(route) => ReachabilityFlags {
            reachable: true,
            is_cellular: is_cellular_interface(&paths.net_class, &route.interface),
            is_direct: !route.has_gateway,
            ..ReachabilityFlags::none()
        },
        None if !active.is_empty() => ReachabilityFlags {
            connection_required: true,
            is_local: true,
            ..ReachabilityFlags::none()
        },
        None => ReachabilityFlags::none(),
    })
}

/// Non-loopback interfaces whose link is operational.
fn active_interfaces(net_class: &Path) -> io::Result<Vec<String>> {
    let mut active = Vec::new();
    for entry in fs::read_dir(net_class)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == "lo" {
            continue;
        }
        if is_operational(&entry.path()) {
            active.push(name);
        }
    }
    active.sort();
    Ok(active)
}

/// `up`, or `unknown` with carrier, as point-to-point links report.
fn is_operational(interface: &Path) -> bool {
    let read = |file: &str| {
        fs::read_to_string(interface.join(file))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };
    match read("operstate").as_str() {
        "up" => true,
        "unknown" => read("carrier") == "1",
        _ => false,
    }
}

fn is_cellular_interface(net_class: &Path, name: &str) -> bool {
    if CELLULAR_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return true;
    }
    fs::read_to_string(net_class.join(name).join("uevent"))
        .map(|uevent| uevent.lines().any(|l| l.trim() == "DEVTYPE=wwan"))
        .unwrap_or(false)
}

/// Pick the usable default route with the lowest metric.
fn default_route(table: &str) -> Option<DefaultRoute> {
    table
        .lines()
        .skip(1)
        .filter_map(parse_route_line)
        .min_by_key(|route| route.metric)
}

/// Columns: Iface Destination Gateway Flags RefCnt Use Metric Mask ...
fn parse_route_line(line: &str) -> Option<DefaultRoute> {
    let cols: Vec<&str> = line.split_whitespace().collect();
    let [iface, destination, gateway, flags, _, _, metric, mask, ..] = cols.as_slice() else {
        return None;
    };
    let flags = u32::from_str_radix(flags, 16).ok()?;
    let is_default = u32::from_str_radix(destination, 16).ok()? == 0
        && u32::from_str_radix(mask, 16).ok()? == 0;
    if !is_default || flags & RTF_UP == 0 {
        return None;
    }
    Some(DefaultRoute {
        interface: (*iface).to_string(),
        has_gateway: u32::from_str_radix(gateway, 16).ok()? != 0,
        metric: metric.parse().ok()?,
    })
}
