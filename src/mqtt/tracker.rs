use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Attributes MQTT packet ids to the topics (or filters) they were requested for.
///
/// Requests go through the client's channel in order, and the event loop reports
/// the packet id it assigned to each one as it goes out. `enqueue` records the
/// label when the request is queued, `sent` pairs it with the packet id, and
/// `acknowledge` resolves it once the broker confirms.
///
/// The client keeps unacknowledged publishes across reconnects and sends them
/// again under the same packet id, so entries survive until acknowledged,
/// expired or [`reset`](AckTracker::reset).
#[derive(Debug, Default)]
pub struct AckTracker {
    queued: VecDeque<String>,
    inflight: HashMap<u16, Inflight>,
    // Packet ids given up on that the client may still send again
    expired: HashSet<u16>,
}

#[derive(Debug)]
struct Inflight {
    label: String,
    since: Instant,
}

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, label: impl Into<String>) {
        self.queued.push_back(label.into());
    }

    /// Records that the next queued request went out with `pkid`. Resends of a
    /// packet id that is in flight keep their label; resends of an expired one
    /// are not tracked again.
    pub fn sent(&mut self, pkid: u16, now: Instant) -> Option<&str> {
        if self.expired.contains(&pkid) {
            return None;
        }
        if !self.inflight.contains_key(&pkid) {
            let label = self.queued.pop_front()?;
            self.inflight.insert(pkid, Inflight { label, since: now });
        }
        self.inflight.get(&pkid).map(|inflight| inflight.label.as_str())
    }

    pub fn acknowledge(&mut self, pkid: u16) -> Option<String> {
        self.expired.remove(&pkid);
        self.inflight.remove(&pkid).map(|inflight| inflight.label)
    }

    /// Removes and returns requests that have waited longer than `timeout`.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<String> {
        let stale: Vec<u16> = self
            .inflight
            .iter()
            .filter(|(_, inflight)| now.saturating_duration_since(inflight.since) >= timeout)
            .map(|(pkid, _)| *pkid)
            .collect();

        stale
            .into_iter()
            .filter_map(|pkid| {
                self.expired.insert(pkid);
                self.inflight.remove(&pkid).map(|inflight| inflight.label)
            })
            .collect()
    }

    /// Drops every in-flight request, e.g. subscriptions the client forgets on reconnect.
    pub fn drain_inflight(&mut self) -> Vec<String> {
        self.expired.clear();
        self.inflight.drain().map(|(_, inflight)| inflight.label).collect()
    }

    /// Forgets everything, returning the labels that were still in flight. Used
    /// when a new client replaces the one whose packet ids were tracked.
    pub fn reset(&mut self) -> Vec<String> {
        self.queued.clear();
        self.drain_inflight()
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    #[cfg(test)]
    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }
}
