//! Send-with-retry for commands acknowledged out of band.
//!
//! The drone answers a mode command with a `mode_push` document at some later
//! point, interleaved with telemetry. A dispatch writes the command, then
//! polls the latest ack record until one for the expected mode shows up that
//! is no older than the current attempt.
use std::sync::Arc;
use std::time::Duration;

use skylink_proto::ModeAck;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::link::Shared;

#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Complete frame, delimiter included.
    pub payload: Vec<u8>,
    /// Ack token, already uppercased.
    pub expected_mode: String,
    /// Sends after the first one; 0 still sends once.
    pub retries: u32,
    pub ack_wait: Duration,
    pub ack_poll: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Matching ack seen after the given 1-based attempt.
    Acked { attempt: u32 },
    /// Attempts exhausted; a failed ack was reported to the observer.
    TimedOut,
    /// Channel closed before or between attempts; nothing was reported.
    ChannelClosed,
}

/// Caller's view of a running dispatch.
pub struct DispatchHandle {
    mode: String,
    rx: oneshot::Receiver<DispatchOutcome>,
}

impl DispatchHandle {
    pub(crate) fn new(mode: String, rx: oneshot::Receiver<DispatchOutcome>) -> Self {
        Self { mode, rx }
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// Waits for resolution. `None` if the dispatch was aborted.
    pub async fn outcome(self) -> Option<DispatchOutcome> {
        self.rx.await.ok()
    }
}

pub(crate) async fn run_dispatch(shared: Arc<Shared>, req: DispatchRequest) -> DispatchOutcome {
    let total = req.retries.saturating_add(1);
    let mode = req.expected_mode.as_str();

    for attempt in 1..=total {
        if !shared.is_open().await {
            warn!("dispatch: serial closed, dropping {}", mode);
            return DispatchOutcome::ChannelClosed;
        }

        let started = Instant::now();
        match shared.write_frame(&req.payload).await {
            Ok(()) => info!("dispatch: sent {} (attempt {}/{})", mode, attempt, total),
            Err(LinkError::NotOpen) => {
                warn!("dispatch: serial closed, dropping {}", mode);
                return DispatchOutcome::ChannelClosed;
            }
            Err(e) => {
                warn!("dispatch: send {} failed (attempt {}/{}): {}", mode, attempt, total, e);
                tokio::time::sleep(req.ack_wait).await;
                continue;
            }
        }

        if wait_for_ack(&shared, mode, started, req.ack_wait, req.ack_poll).await {
            info!("dispatch: {} acknowledged on attempt {}", mode, attempt);
            return DispatchOutcome::Acked { attempt };
        }
        debug!("dispatch: no ack for {} within {:?}", mode, req.ack_wait);
    }

    warn!("dispatch: {} unacknowledged after {} attempt(s)", mode, total);
    shared.observer.on_mode_ack(&ModeAck::timed_out(mode));
    DispatchOutcome::TimedOut
}

async fn wait_for_ack(shared: &Shared, mode: &str, since: Instant, wait: Duration, poll: Duration) -> bool {
    let deadline = since + wait;
    loop {
        if shared.ack_satisfies(mode, since) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(poll.min(deadline - now)).await;
    }
}
