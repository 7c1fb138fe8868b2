//! Heartbeat watchdog state.
//!
//! The link is DOWN until the first document arrives. Every poll compares the
//! idle time (since the newest heartbeat or any message) against `timeout`;
//! only `grace` consecutive misses take an UP link DOWN. Methods that change
//! `is_up` return the new value so the caller can notify exactly once per
//! transition.
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct HealthPolicy {
    pub timeout: Duration,
    pub grace: u32,
}

#[derive(Debug, Clone, Default)]
pub struct LinkState {
    pub is_up: bool,
    pub last_heartbeat_at: Option<Instant>,
    pub last_any_message_at: Option<Instant>,
    pub consecutive_misses: u32,
}

impl LinkState {
    /// Newest evidence that the drone is alive.
    pub fn last_seen(&self) -> Option<Instant> {
        self.last_heartbeat_at.max(self.last_any_message_at)
    }

    pub fn idle(&self, now: Instant) -> Option<Duration> {
        self.last_seen().map(|t| now.saturating_duration_since(t))
    }

    pub fn on_message(&mut self, now: Instant) {
        self.last_any_message_at = Some(now);
    }

    /// Fast recovery path: a heartbeat brings a DOWN link UP immediately.
    pub fn on_heartbeat(&mut self, now: Instant) -> Option<bool> {
        self.last_heartbeat_at = Some(now);
        self.consecutive_misses = 0;
        self.set_up(true)
    }

    /// One watchdog poll.
    pub fn tick(&mut self, now: Instant, policy: &HealthPolicy) -> Option<bool> {
        let Some(idle) = self.idle(now) else {
            // nothing ever received: counts as a miss, stays DOWN
            self.consecutive_misses = self.consecutive_misses.saturating_add(1);
            return None;
        };

        if idle > policy.timeout {
            self.consecutive_misses = self.consecutive_misses.saturating_add(1);
            if self.is_up && self.consecutive_misses >= policy.grace {
                return self.set_up(false);
            }
            None
        } else {
            self.consecutive_misses = 0;
            self.set_up(true)
        }
    }

    /// Session teardown: forget timestamps, force DOWN.
    pub fn reset(&mut self) -> Option<bool> {
        self.last_heartbeat_at = None;
        self.last_any_message_at = None;
        self.consecutive_misses = 0;
        self.set_up(false)
    }

    fn set_up(&mut self, up: bool) -> Option<bool> {
        if self.is_up == up {
            return None;
        }
        self.is_up = up;
        Some(up)
    }
}

/// Latest organic `mode_push` received from the drone.
#[derive(Debug, Clone)]
pub struct AckRecord {
    pub mode: String,
    pub received_at: Instant,
    pub ok: bool,
    pub message: String,
}

impl AckRecord {
    /// Whether this ack answers a command for `mode` sent at or after `since`.
    pub fn satisfies(&self, mode: &str, since: Instant) -> bool {
        self.mode == mode && self.received_at >= since
    }
}
