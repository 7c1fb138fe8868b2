mod common;

use std::time::Duration;

use common::{attached, connected, test_config, wait_until, Recorder};
use serde_json::json;
use skylink_core::{Link, LinkError, NullObserver};
use skylink_proto::{Mode, TelemetryEvent, Waypoint};
use std::sync::Arc;

#[tokio::test(start_paused = true)]
async fn telemetry_from_noisy_chunks_reaches_observer() {
    let (link, rec, mut drone) = connected(test_config()).await;

    drone.send(b"RX> {\"x\":1,\"y\":2,\"z\":3,\"spe").await;
    drone.send(b"ed\":4}\r\nrssi=-97 garbage\n{\"battery\":{\"percent\":0.8}").await;
    drone.send(b"}\r").await;

    wait_until(|| rec.telemetry().len() == 3).await;
    assert_eq!(
        rec.telemetry(),
        vec![
            TelemetryEvent::LocalPosition { x: 1.0, y: 2.0, z: 3.0 },
            TelemetryEvent::Speed { value: 4.0 },
            TelemetryEvent::Battery { percent: Some(80.0), voltage: None },
        ]
    );
    link.stop().await;
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_do_not_stop_the_receive_loop() {
    let (link, rec, mut drone) = connected(test_config()).await;

    drone.send(b"garbage\n{\"hb\":1\n{bad json}\n{\"x\":1,\"y\":2}\n{\"speed\":5}\n").await;

    wait_until(|| !rec.telemetry().is_empty()).await;
    assert_eq!(rec.telemetry(), vec![TelemetryEvent::Speed { value: 5.0 }]);

    // the two valid frames count as traffic, so the next poll brings the link up
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(rec.links(), vec![true]);
    link.stop().await;
}

#[tokio::test(start_paused = true)]
async fn heartbeat_survives_non_finite_neighbours() {
    let (link, rec, mut drone) = connected(test_config()).await;

    drone.send(b"{\"hb\":1,\"lat\":NaN,\"lon\":106.6,\"alt\":1e400,\"speed\":2}\n").await;
    wait_until(|| rec.links() == vec![true]).await;
    assert_eq!(rec.telemetry(), vec![TelemetryEvent::Heartbeat, TelemetryEvent::Speed { value: 2.0 }]);
    assert!(link.is_up());
    link.stop().await;
}

#[tokio::test(start_paused = true)]
async fn heartbeat_brings_link_up_and_silence_takes_it_down_once() {
    let (link, rec, mut drone) = connected(test_config()).await;
    assert!(!link.is_up());

    drone.send(b"{\"hb\":1}\n").await;
    wait_until(|| rec.links() == vec![true]).await;
    assert!(link.is_up());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(rec.links(), vec![true, false]);
    assert!(!link.is_up());

    drone.send(b"{\"hb\":\"yes\"}\n").await;
    wait_until(|| rec.links() == vec![true, false, true]).await;
    link.stop().await;
}

#[tokio::test(start_paused = true)]
async fn single_transient_gap_keeps_link_up() {
    let (link, rec, mut drone) = connected(test_config()).await;

    drone.send(b"{\"hb\":1}\n").await;
    wait_until(|| rec.links() == vec![true]).await;

    tokio::time::sleep(Duration::from_millis(2600)).await;
    drone.send(b"{\"speed\":1}\n").await;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(rec.links(), vec![true]);
    assert_eq!(link.link_state().consecutive_misses, 0);
    link.stop().await;
}

#[tokio::test(start_paused = true)]
async fn plain_telemetry_brings_link_up_on_next_poll() {
    let (link, rec, mut drone) = connected(test_config()).await;

    drone.send(b"{\"lat\":10.8,\"lon\":106.6,\"alt\":20}\n").await;
    wait_until(|| !rec.telemetry().is_empty()).await;

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(rec.links(), vec![true]);
    link.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_forces_down_once_and_is_idempotent() {
    let (link, rec, mut drone) = connected(test_config()).await;

    drone.send(b"{\"hb\":1}\n").await;
    wait_until(|| rec.links() == vec![true]).await;

    link.stop().await;
    assert_eq!(rec.links(), vec![true, false]);
    assert_eq!(drone.next_line().await.as_deref(), Some("OFF"));
    assert_eq!(drone.next_line().await, None);
    assert!(!link.is_open().await);

    link.stop().await;
    link.stop_session().await;
    assert_eq!(rec.links(), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn stop_while_down_sends_no_notification() {
    let (link, rec, _drone) = connected(test_config()).await;
    link.stop().await;
    assert!(rec.links().is_empty());
}

#[tokio::test(start_paused = true)]
async fn start_twice_is_rejected() {
    let (link, _rec, _drone) = connected(test_config()).await;
    assert!(matches!(link.start().await, Err(LinkError::AlreadyRunning)));
    link.stop().await;
}

#[tokio::test]
async fn operations_fail_fast_without_channel() {
    let link = Link::new(test_config(), Arc::new(Recorder::default()));

    assert!(matches!(link.start().await, Err(LinkError::NotOpen)));
    assert!(matches!(link.request_mode(Mode::Land).await, Err(LinkError::NotOpen)));
    link.submit_waypoints(&[json!({"lat": 1, "lon": 2})]);
    assert!(matches!(link.send_waypoints().await, Err(LinkError::NotOpen)));
}

#[tokio::test]
async fn open_failure_leaves_channel_unset() {
    let mut cfg = test_config();
    cfg.serial.dev = "/nonexistent/skylink-test-radio".into();
    let link = Link::new(cfg, Arc::new(Recorder::default()));

    assert!(matches!(link.open().await, Err(LinkError::Open { .. })));
    assert!(!link.is_open().await);
    assert!(matches!(link.start_session().await, Err(LinkError::Open { .. })));
}

#[tokio::test(start_paused = true)]
async fn waypoints_are_validated_per_entry_and_uploaded() {
    let (link, _rec, mut drone) = attached(test_config()).await;

    let accepted = link.submit_waypoints(&[json!({"lat": 1, "lon": 2}), json!({"lon": 3})]);
    assert_eq!(accepted, 1);
    assert_eq!(link.waypoints(), vec![Waypoint { lat: 1.0, lon: 2.0, alt: 0.0 }]);

    assert_eq!(link.send_waypoints().await.unwrap(), 1);
    let line = drone.next_line().await.unwrap();
    let doc: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(doc, json!({"coord": "gps", "waypoints": [{"lat": 1.0, "lon": 2.0, "alt": 0.0}]}));
}

#[tokio::test(start_paused = true)]
async fn empty_waypoint_set_is_not_sent() {
    let (link, _rec, mut drone) = attached(test_config()).await;

    assert_eq!(link.submit_waypoints(&[json!({"alt": 5})]), 0);
    assert!(matches!(link.send_waypoints().await, Err(LinkError::NoWaypoints)));
    assert_eq!(drone.next_line_within(Duration::from_millis(200)).await, None);
}

#[tokio::test]
async fn remove_waypoint_by_position() {
    let link = Link::new(test_config(), Arc::new(NullObserver));
    link.submit_waypoints(&[
        json!({"lat": 1, "lon": 1}),
        json!({"lat": 2, "lon": 2, "alt": 10}),
        json!({"lat": 3, "lon": 3}),
    ]);

    assert_eq!(link.remove_waypoint(2).unwrap(), Waypoint { lat: 2.0, lon: 2.0, alt: 10.0 });
    assert!(matches!(link.remove_waypoint(0), Err(LinkError::NoSuchWaypoint(0))));
    assert!(matches!(link.remove_waypoint(3), Err(LinkError::NoSuchWaypoint(3))));
    assert_eq!(link.waypoints().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn link_notifications_alternate_under_flapping() {
    let mut cfg = test_config();
    cfg.serial.read_timeout_ms = 5;
    cfg.health.timeout_s = 0.02;
    cfg.health.poll_ms = 5;
    cfg.health.grace = 1;
    let (link, rec, mut drone) = connected(cfg).await;
    assert_eq!(link.config().health.grace, 1);

    for i in 0..120u64 {
        drone.send(b"{\"hb\":1}\n").await;
        tokio::time::sleep(Duration::from_millis(15 + (i % 4) * 5)).await;
    }
    link.stop().await;

    let links = rec.links();
    assert!(!links.is_empty());
    for (i, up) in links.iter().enumerate() {
        assert_eq!(*up, i % 2 == 0, "out of order notifications: {:?}", links);
    }
    assert_eq!(links.last(), Some(&false));
}
