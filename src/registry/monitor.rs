//! Per-name alert channels
//!
//! Each monitored name owns one bounded queue of depth 10. The registry is
//! the only writer and never blocks: a full or closed channel counts the
//! alert as dropped and moves on. Readers may block on the receive side.

use std::sync::atomic::Ordering;

use crossbeam_channel::{bounded, Receiver};

use crate::error::{Error, CTX_COUNT};
use crate::registry::{self, global};

/// Queue depth of every alert channel.
pub(crate) const ALERT_DEPTH: usize = 10;

/// Read handle on a per-name alert channel.
///
/// Dropping a `Monitor` does not close the channel; call [`Monitor::close`]
/// to tear it down and deregister the name.
pub struct Monitor {
    name: String,
    rx: Receiver<Error>,
}

impl Monitor {
    /// Attach to the alert channel for `name`, creating a bounded channel
    /// of depth 10 when none exists yet.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let rx = {
            let entry = global()
                .alerts
                .entry(name.clone())
                .or_insert_with(|| bounded(ALERT_DEPTH));
            entry.value().1.clone()
        };
        Self { name, rx }
    }

    /// The monitored name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive side of the channel. Alerts carry a copy of the last
    /// instance with the occurrence total under the `"count"` context key.
    pub fn alerts(&self) -> &Receiver<Error> {
        &self.rx
    }

    /// Close the channel and remove the registry entry. Safe to call
    /// repeatedly; later calls are no-ops. In-flight alerts remain
    /// drainable until the queue empties, after which receives report
    /// disconnection.
    pub fn close(&self) {
        global().alerts.remove(&self.name);
    }
}

/// Send a copy of the last instance for `name`, tagged with the current
/// total, to the matching alert channel. Never blocks: a missing channel is
/// silent, a full or disconnected channel increments the dropped counter.
pub(crate) fn dispatch(name: &str, total: u64) {
    let reg = global();
    let sender = match reg.alerts.get(name) {
        Some(entry) => entry.value().0.clone(),
        None => return,
    };
    let last = match registry::last_error(name) {
        Some(last) => last,
        None => return,
    };

    let alert = last.with(CTX_COUNT, total);
    if sender.try_send(alert).is_err() {
        reg.dropped_alerts.fetch_add(1, Ordering::Relaxed);
        log::debug!("alert dropped for {} (queue full or closed)", name);
    }
}
