use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt};
use tracing::{debug, info, warn};

use skylink_proto::command::{encode_line, SESSION_OFF, SESSION_ON};
use skylink_proto::{Mode, ModeCommand, TelemetryEvent, Waypoint, WaypointUpload};

use crate::config::LinkConfig;
use crate::decode::decode;
use crate::dispatch::{run_dispatch, DispatchHandle, DispatchRequest};
use crate::error::LinkError;
use crate::extract::extract_object;
use crate::framer::LineFramer;
use crate::health::{AckRecord, LinkState};
use crate::observer::LinkObserver;

const READ_CHUNK: usize = 256;
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(500);
const LOG_PREVIEW_CHARS: usize = 120;

/// Anything that can stand in for the radio: the serial port, or an
/// in-memory duplex pipe in tests.
pub trait Channel: AsyncRead + AsyncWrite + Send + Unpin + 'static {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Channel for T {}

type Reader = Box<dyn AsyncRead + Send + Unpin>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// At most [`LOG_PREVIEW_CHARS`] characters of `line`, for log messages.
fn preview(line: &str) -> &str {
    match line.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((end, _)) => &line[..end],
        None => line,
    }
}

/// Watchdog and ack state written by the receive loop and read by the
/// monitor and dispatch tasks.
#[derive(Debug, Default)]
pub(crate) struct Tracked {
    pub(crate) link: LinkState,
    pub(crate) last_ack: Option<AckRecord>,
}

pub(crate) struct Shared {
    pub(crate) cfg: LinkConfig,
    pub(crate) observer: Arc<dyn LinkObserver>,
    pub(crate) tracked: Mutex<Tracked>,
    /// Held from a link transition decision until its notification has been
    /// delivered, so UP/DOWN reach the observer in decision order.
    transitions: Mutex<()>,
    /// `None` while the channel is closed.
    writer: tokio::sync::Mutex<Option<Writer>>,
}

impl Shared {
    pub(crate) async fn is_open(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Writes one complete frame. Frames never interleave.
    pub(crate) async fn write_frame(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut guard = self.writer.lock().await;
        let w = guard.as_mut().ok_or(LinkError::NotOpen)?;
        w.write_all(bytes).await?;
        w.flush().await?;
        Ok(())
    }

    pub(crate) fn ack_satisfies(&self, mode: &str, since: Instant) -> bool {
        lock(&self.tracked).last_ack.as_ref().map_or(false, |ack| ack.satisfies(mode, since))
    }

    fn notify_link(&self, up: bool) {
        if up {
            info!("link: UP");
        } else {
            warn!("link: DOWN");
        }
        self.observer.on_link_state(up);
    }

    /// Runs one framed line through extraction and decoding, updates the
    /// watchdog and ack state, then hands events to the observer.
    fn handle_line(&self, line: &str) {
        let Some(obj) = extract_object(line) else {
            warn!("link: skipping invalid frame: {}", preview(line));
            return;
        };
        debug!("link: raw {}", preview(obj));

        let events = match decode(obj) {
            Ok(evs) => evs,
            Err(e) => {
                warn!("link: undecodable frame {}: {}", preview(obj), e);
                return;
            }
        };

        let _order = lock(&self.transitions);
        let now = Instant::now();
        let mut change = None;
        {
            let mut t = lock(&self.tracked);
            t.link.on_message(now);
            for ev in &events {
                match ev {
                    TelemetryEvent::ModeAck(ack) => {
                        t.last_ack = Some(AckRecord {
                            mode: ack.mode.clone(),
                            received_at: now,
                            ok: ack.ok,
                            message: ack.message.clone(),
                        });
                    }
                    TelemetryEvent::Heartbeat => change = t.link.on_heartbeat(now),
                    _ => {}
                }
            }
        }

        for ev in &events {
            match ev {
                TelemetryEvent::ModeAck(ack) => {
                    info!("link: mode ack {} ok={} msg={:?}", ack.mode, ack.ok, ack.message);
                    self.observer.on_mode_ack(ack);
                }
                TelemetryEvent::Heartbeat => {
                    self.observer.on_telemetry(ev);
                    if let Some(up) = change.take() {
                        self.notify_link(up);
                    }
                }
                other => {
                    debug!("link: {:?}", other);
                    self.observer.on_telemetry(other);
                }
            }
        }
    }
}

struct Session {
    running: Arc<AtomicBool>,
    rx: JoinHandle<()>,
    monitor: JoinHandle<()>,
}

/// Ground side of the LoRa link: owns the channel, the receive and watchdog
/// tasks, outstanding command dispatches and the active waypoint set.
pub struct Link {
    shared: Arc<Shared>,
    reader: Mutex<Option<Reader>>,
    session: tokio::sync::Mutex<Option<Session>>,
    dispatches: Mutex<Vec<JoinHandle<()>>>,
    waypoints: Mutex<Vec<Waypoint>>,
}

impl Link {
    pub fn new(cfg: LinkConfig, observer: Arc<dyn LinkObserver>) -> Self {
        Self {
            shared: Arc::new(Shared {
                cfg,
                observer,
                tracked: Mutex::new(Tracked::default()),
                transitions: Mutex::new(()),
                writer: tokio::sync::Mutex::new(None),
            }),
            reader: Mutex::new(None),
            session: tokio::sync::Mutex::new(None),
            dispatches: Mutex::new(Vec::new()),
            waypoints: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.shared.cfg
    }

    /// Opens and configures the serial device. On failure the channel stays
    /// unset and later operations fail with [`LinkError::NotOpen`].
    pub async fn open(&self) -> Result<(), LinkError> {
        if self.is_open().await {
            return Ok(());
        }
        let s = &self.shared.cfg.serial;

        let port = tokio_serial::new(&s.dev, s.baud)
            .timeout(s.read_timeout())
            .open_native_async()
            .and_then(|port| port.clear(ClearBuffer::All).map(|_| port))
            .map_err(|source: tokio_serial::Error| {
                let e = LinkError::Open { dev: s.dev.clone(), source };
                warn!("link: cannot connect: {}", e);
                e
            })?;

        tokio::time::sleep(s.settle()).await;
        info!("link: connected {} @ {}", s.dev, s.baud);
        self.attach(port).await;
        Ok(())
    }

    /// Installs an already-open channel.
    pub async fn attach<C: Channel>(&self, channel: C) {
        let (r, w) = tokio::io::split(channel);
        *lock(&self.reader) = Some(Box::new(r));
        *self.shared.writer.lock().await = Some(Box::new(w));
    }

    pub async fn is_open(&self) -> bool {
        self.shared.is_open().await
    }

    /// Sends the ON sentinel and spawns the receive and watchdog loops.
    pub async fn start(&self) -> Result<(), LinkError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Err(LinkError::AlreadyRunning);
        }
        if !self.is_open().await {
            warn!("link: serial not open");
            return Err(LinkError::NotOpen);
        }
        let reader = lock(&self.reader).take().ok_or(LinkError::NotOpen)?;

        info!("link: sending ON");
        if let Err(e) = self.shared.write_frame(SESSION_ON).await {
            warn!("link: ON not sent: {}", e);
        }

        let running = Arc::new(AtomicBool::new(true));
        let rx = tokio::spawn(receive_loop(self.shared.clone(), reader, running.clone()));
        let monitor = tokio::spawn(monitor_loop(self.shared.clone(), running.clone()));
        *session = Some(Session { running, rx, monitor });
        Ok(())
    }

    /// Open (if needed) and start.
    pub async fn start_session(&self) -> Result<(), LinkError> {
        self.open().await?;
        self.start().await
    }

    /// Ends the session: stops both loops, forces the link DOWN, sends OFF
    /// best-effort and closes the channel. Safe to call repeatedly.
    /// Outstanding dispatches are left to finish on their own.
    pub async fn stop(&self) {
        if let Some(s) = self.session.lock().await.take() {
            s.running.store(false, Ordering::Release);
            for (name, task) in [("receive", s.rx), ("monitor", s.monitor)] {
                if let Err(e) = task.await {
                    warn!("link: {} loop ended abnormally: {}", name, e);
                }
            }
        }

        {
            let _order = lock(&self.shared.transitions);
            let change = lock(&self.shared.tracked).link.reset();
            if let Some(up) = change {
                self.shared.notify_link(up);
            }
        }

        lock(&self.reader).take();
        let writer = self.shared.writer.lock().await.take();
        match writer {
            Some(mut w) => {
                info!("link: sending OFF");
                if let Err(e) = send_raw(&mut w, SESSION_OFF).await {
                    warn!("link: OFF not sent: {}", e);
                }
                if let Err(e) = w.shutdown().await {
                    warn!("link: error closing serial: {}", e);
                }
                info!("link: serial closed");
            }
            None => info!("link: serial already closed or never opened"),
        }
    }

    pub async fn stop_session(&self) {
        self.stop().await
    }

    pub fn is_up(&self) -> bool {
        lock(&self.shared.tracked).link.is_up
    }

    pub fn link_state(&self) -> LinkState {
        lock(&self.shared.tracked).link.clone()
    }

    pub fn last_ack(&self) -> Option<AckRecord> {
        lock(&self.shared.tracked).last_ack.clone()
    }

    /// Sends a raw command and waits for its ack on a separate task.
    pub fn dispatch(&self, req: DispatchRequest) -> DispatchHandle {
        let (tx, rx) = oneshot::channel();
        let mode = req.expected_mode.clone();
        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            let outcome = run_dispatch(shared, req).await;
            let _ = tx.send(outcome);
        });

        let mut tasks = lock(&self.dispatches);
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
        DispatchHandle::new(mode, rx)
    }

    /// Requests a flight mode change using the configured retry policy.
    pub async fn request_mode(&self, mode: Mode) -> Result<DispatchHandle, LinkError> {
        if !self.is_open().await {
            warn!("link: serial not open, {} not requested", mode.ack_token());
            return Err(LinkError::NotOpen);
        }
        let c = &self.shared.cfg.command;
        let req = DispatchRequest {
            payload: encode_line(&ModeCommand { cmd: mode })?,
            expected_mode: mode.ack_token(),
            retries: c.retries,
            ack_wait: c.ack_wait(),
            ack_poll: c.ack_poll(),
        };
        Ok(self.dispatch(req))
    }

    /// Waits for every outstanding dispatch to resolve.
    pub async fn join_dispatches(&self) {
        let tasks = std::mem::take(&mut *lock(&self.dispatches));
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Cancels outstanding dispatches without emitting failure acks.
    pub fn abort_dispatches(&self) {
        for task in lock(&self.dispatches).drain(..) {
            task.abort();
        }
    }

    /// Replaces the active waypoint set, skipping invalid entries.
    /// Returns how many were accepted.
    pub fn submit_waypoints(&self, entries: &[Value]) -> usize {
        let mut accepted = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            match Waypoint::from_value(entry) {
                Ok(wp) => {
                    debug!("waypoints: WP{}: lat={:.6}, lon={:.6}, alt={:.2}", i + 1, wp.lat, wp.lon, wp.alt);
                    accepted.push(wp);
                }
                Err(e) => warn!("waypoints: skipping entry {}: {}", i + 1, e),
            }
        }
        let n = accepted.len();
        *lock(&self.waypoints) = accepted;
        info!("waypoints: {} of {} accepted (gps)", n, entries.len());
        n
    }

    pub fn waypoints(&self) -> Vec<Waypoint> {
        lock(&self.waypoints).clone()
    }

    /// Removes a waypoint by its 1-based position.
    pub fn remove_waypoint(&self, index: usize) -> Result<Waypoint, LinkError> {
        let mut wps = lock(&self.waypoints);
        if index == 0 || index > wps.len() {
            warn!("waypoints: no waypoint with index {}", index);
            return Err(LinkError::NoSuchWaypoint(index));
        }
        Ok(wps.remove(index - 1))
    }

    /// Uploads the active waypoint set as one GPS document.
    pub async fn send_waypoints(&self) -> Result<usize, LinkError> {
        if !self.is_open().await {
            warn!("waypoints: serial not open");
            return Err(LinkError::NotOpen);
        }
        let wps = self.waypoints();
        if wps.is_empty() {
            warn!("waypoints: nothing to send");
            return Err(LinkError::NoWaypoints);
        }
        let line = encode_line(&WaypointUpload::gps(&wps))?;
        if let Err(e) = self.shared.write_frame(&line).await {
            warn!("waypoints: send failed: {}", e);
            return Err(e);
        }
        info!("waypoints: sent {} (gps) to drone", wps.len());
        Ok(wps.len())
    }
}

async fn send_raw(w: &mut Writer, bytes: &[u8]) -> io::Result<()> {
    w.write_all(bytes).await?;
    w.flush().await
}

async fn receive_loop(shared: Arc<Shared>, mut reader: Reader, running: Arc<AtomicBool>) {
    info!("link: receiving from drone");
    let mut framer = LineFramer::new(shared.cfg.serial.max_line_bytes);
    let read_timeout = shared.cfg.serial.read_timeout();
    let mut buf = [0u8; READ_CHUNK];

    while running.load(Ordering::Acquire) {
        match tokio::time::timeout(read_timeout, reader.read(&mut buf)).await {
            Err(_elapsed) => continue,
            Ok(Ok(0)) => {
                warn!("link: channel closed by peer");
                break;
            }
            Ok(Ok(n)) => {
                for line in framer.feed(&buf[..n]) {
                    shared.handle_line(&line);
                }
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => continue,
            Ok(Err(e)) => {
                warn!("link: serial read failed: {}", e);
                tokio::time::sleep(READ_ERROR_BACKOFF).await;
            }
        }
    }
    debug!("link: receive loop exited");
}

async fn monitor_loop(shared: Arc<Shared>, running: Arc<AtomicBool>) {
    let policy = shared.cfg.health.policy();
    let mut ticker = tokio::time::interval(shared.cfg.health.poll_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !running.load(Ordering::Acquire) {
            break;
        }
        let _order = lock(&shared.transitions);
        let change = lock(&shared.tracked).link.tick(Instant::now(), &policy);
        if let Some(up) = change {
            shared.notify_link(up);
        }
    }
    debug!("link: monitor loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_caps_long_lines_on_char_boundaries() {
        assert_eq!(preview("short"), "short");
        let long = "é".repeat(500);
        assert_eq!(preview(&long).chars().count(), LOG_PREVIEW_CHARS);
        assert!(long.starts_with(preview(&long)));
    }
}
