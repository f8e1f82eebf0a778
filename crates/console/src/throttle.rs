use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

/// Per-channel state: what was last emitted and when, plus the newest value
/// that arrived too early to send.
#[derive(Debug)]
struct Lane<V> {
    last_sent_at: Option<Instant>,
    last_value: Option<V>,
    pending: Option<V>,
}

impl<V> Default for Lane<V> {
    fn default() -> Self {
        Self {
            last_sent_at: None,
            last_value: None,
            pending: None,
        }
    }
}

/// Rate limiter for high-frequency input, one independent lane per channel.
///
/// A lane emits at most once per `interval` and never emits a value equal to
/// the last one it emitted. Values offered inside the interval are coalesced
/// (latest wins) and released by [`Throttle::poll`] once the interval has
/// passed, so the final position of a drag is never lost.
#[derive(Debug)]
pub struct Throttle<K, V> {
    interval: Duration,
    lanes: HashMap<K, Lane<V>>,
}

impl<K, V> Throttle<K, V>
where
    K: Copy + Eq + Hash,
    V: Clone + PartialEq,
{
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            lanes: HashMap::new(),
        }
    }

    /// Offer a mapped value on `channel`. Returns the value if it should be
    /// sent now.
    pub fn offer(&mut self, channel: K, value: V, now: Instant) -> Option<V> {
        let interval = self.interval;
        let lane = self.lanes.entry(channel).or_default();

        if lane.last_value.as_ref() == Some(&value) {
            // Back where we were: nothing to send, and any queued value is stale
            lane.pending = None;
            return None;
        }

        let due = match lane.last_sent_at {
            Some(at) => now.saturating_duration_since(at) >= interval,
            None => true,
        };
        if due {
            lane.last_sent_at = Some(now);
            lane.last_value = Some(value.clone());
            lane.pending = None;
            Some(value)
        } else {
            lane.pending = Some(value);
            None
        }
    }

    /// Release pending values whose lane interval has elapsed.
    pub fn poll(&mut self, now: Instant) -> Vec<(K, V)> {
        let interval = self.interval;
        let mut ready = Vec::new();
        for (channel, lane) in self.lanes.iter_mut() {
            let Some(at) = lane.last_sent_at else {
                continue;
            };
            if now.saturating_duration_since(at) < interval {
                continue;
            }
            if let Some(value) = lane.pending.take()
                && lane.last_value.as_ref() != Some(&value)
            {
                lane.last_sent_at = Some(now);
                lane.last_value = Some(value.clone());
                ready.push((*channel, value));
            }
        }
        ready
    }

    /// Drop the pending value on `channel` without forgetting what was sent.
    pub fn discard_pending(&mut self, channel: K) {
        if let Some(lane) = self.lanes.get_mut(&channel) {
            lane.pending = None;
        }
    }

    /// Forget everything about `channel`, so the next offer is sent even if it
    /// repeats the previous value.
    pub fn reset(&mut self, channel: K) {
        self.lanes.remove(&channel);
    }

    pub fn clear(&mut self) {
        self.lanes.clear();
    }

    pub fn has_pending(&self) -> bool {
        self.lanes.values().any(|lane| lane.pending.is_some())
    }
}
