//! Fixtures for reachability tests.
//!
//! [`SysfsFixture`] lays out a fake `/sys/class/net` tree and routing table in
//! a temporary directory. [`EventLog`] records monitor events for
//! assertions.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;

use crate::reachability::{ReachabilityChanged, SysfsPaths};

const ROUTE_HEADER: &str =
    "Iface\tDestination\tGateway\tFlags\tRefCnt\tUse\tMetric\tMask\tMTU\tWindow\tIRTT";

/// Temporary directory mimicking the files read by the sysfs source.
pub struct SysfsFixture {
    dir: TempDir,
}

impl SysfsFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        fs::create_dir_all(dir.path().join("net")).expect("create net dir");
        Self { dir }
    }

    pub fn paths(&self) -> SysfsPaths {
        SysfsPaths {
            net_class: self.dir.path().join("net"),
            route_table: self.dir.path().join("route"),
        }
    }

    fn interface_dir(&self, name: &str) -> PathBuf {
        self.dir.path().join("net").join(name)
    }

    /// Create or update an interface with `operstate` and an optional
    /// `uevent` body.
    pub fn interface(&self, name: &str, operstate: &str, uevent: Option<&str>) {
        let dir = self.interface_dir(name);
        fs::create_dir_all(&dir).expect("create interface dir");
        fs::write(dir.join("operstate"), format!("{operstate}\n")).expect("write operstate");
        if let Some(uevent) = uevent {
            fs::write(dir.join("uevent"), format!("INTERFACE={name}\n{uevent}\n"))
                .expect("write uevent");
        }
    }

    pub fn carrier(&self, name: &str, up: bool) {
        let value = if up { "1\n" } else { "0\n" };
        fs::write(self.interface_dir(name).join("carrier"), value).expect("write carrier");
    }

    /// Replace the routing table with `rows` below the standard header.
    pub fn routes(&self, rows: &[&str]) {
        let mut table = String::from(ROUTE_HEADER);
        table.push('\n');
        for row in rows {
            table.push_str(row);
            table.push('\n');
        }
        fs::write(self.paths().route_table, table).expect("write route table");
    }
}

impl Default for SysfsFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared record of events delivered to a monitor callback or listener.
#[derive(Clone)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ReachabilityChanged>>>,
    tx: Arc<Mutex<mpsc::Sender<()>>>,
    rx: Arc<Mutex<mpsc::Receiver<()>>>,
}

impl EventLog {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            tx: Arc::new(Mutex::new(tx)),
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Closure suitable for registration as a callback or listener.
    pub fn recorder(&self) -> impl Fn(&ReachabilityChanged) + Send + Sync + 'static {
        let log = self.clone();
        move |event| {
            log.events.lock().push(event.clone());
            let _ = log.tx.lock().send(());
        }
    }

    /// Block until `count` events in total have been recorded.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let rx = self.rx.lock();
        while self.events.lock().len() < count {
            if rx.recv_timeout(timeout).is_err() {
                return false;
            }
        }
        true
    }

    pub fn events(&self) -> Vec<ReachabilityChanged> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
