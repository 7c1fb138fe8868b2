#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use skylink_core::{Link, LinkConfig, LinkObserver};
use skylink_proto::{ModeAck, TelemetryEvent};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};

#[derive(Default)]
pub struct Recorder {
    telemetry: Mutex<Vec<TelemetryEvent>>,
    links: Mutex<Vec<bool>>,
    acks: Mutex<Vec<ModeAck>>,
}

impl Recorder {
    pub fn telemetry(&self) -> Vec<TelemetryEvent> {
        self.telemetry.lock().unwrap().clone()
    }

    pub fn links(&self) -> Vec<bool> {
        self.links.lock().unwrap().clone()
    }

    pub fn acks(&self) -> Vec<ModeAck> {
        self.acks.lock().unwrap().clone()
    }
}

impl LinkObserver for Recorder {
    fn on_telemetry(&self, event: &TelemetryEvent) {
        self.telemetry.lock().unwrap().push(event.clone());
    }

    fn on_link_state(&self, up: bool) {
        self.links.lock().unwrap().push(up);
    }

    fn on_mode_ack(&self, ack: &ModeAck) {
        self.acks.lock().unwrap().push(ack.clone());
    }
}

/// Drone end of the in-memory radio.
pub struct Drone {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    tx: WriteHalf<DuplexStream>,
}

impl Drone {
    pub async fn send(&mut self, bytes: &[u8]) {
        self.tx.write_all(bytes).await.unwrap();
        self.tx.flush().await.unwrap();
    }

    /// Next line written by the ground side, `None` on EOF or after 5s.
    pub async fn next_line(&mut self) -> Option<String> {
        self.next_line_within(Duration::from_secs(5)).await
    }

    pub async fn next_line_within(&mut self, wait: Duration) -> Option<String> {
        match tokio::time::timeout(wait, self.lines.next_line()).await {
            Ok(Ok(line)) => line,
            _ => None,
        }
    }
}

pub fn test_config() -> LinkConfig {
    let mut cfg = LinkConfig::default();
    cfg.serial.read_timeout_ms = 50;
    cfg.health.timeout_s = 2.0;
    cfg.health.poll_ms = 500;
    cfg.health.grace = 2;
    cfg.command.retries = 0;
    cfg.command.ack_wait_s = 1.0;
    cfg.command.ack_poll_ms = 50;
    cfg
}

pub async fn attached(cfg: LinkConfig) -> (Link, Arc<Recorder>, Drone) {
    let rec = Arc::new(Recorder::default());
    let link = Link::new(cfg, rec.clone());
    let (ground, drone) = tokio::io::duplex(4096);
    link.attach(ground).await;
    let (r, w) = tokio::io::split(drone);
    let drone = Drone { lines: BufReader::new(r).lines(), tx: w };
    (link, rec, drone)
}

/// Attached and started, with the ON sentinel already consumed.
pub async fn connected(cfg: LinkConfig) -> (Link, Arc<Recorder>, Drone) {
    let (link, rec, mut drone) = attached(cfg).await;
    link.start().await.unwrap();
    assert_eq!(drone.next_line().await.as_deref(), Some("ON"));
    (link, rec, drone)
}

pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
