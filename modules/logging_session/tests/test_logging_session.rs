// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use common::{device::DeviceDescriptor, notice::Notice, record::StreamKind};
use logging_session::LoggingSession;
use module_core::{
    Event, EventBus, EventKind, EventKindType, Module, payload_ref,
    test_helper::{stop_module, try_wait_for_event, wait_for_event, wait_for_matching_event},
};
use nmea::NmeaCodec;
use sampler::{NoPoseProvider, Sampler, SamplerConfig};
use serial_link::{Connection, SerialConfig, SerialLink, test_helper::VirtualSerialLink};
use std::{path::Path, sync::Arc, time::Duration};
use storage::{LogWriter, POSE_HEADER};
use tokio::sync::watch;

mod helper;
use helper::{MUNICH, setup_empty_test_folder, wait_for_notice};

type Handle = tokio::task::JoinHandle<Result<(), ()>>;

struct Fixture {
    eb: EventBus,
    link: VirtualSerialLink,
    device: DeviceDescriptor,
    _connection: Connection,
    _port: watch::Sender<Option<serial_link::ConnectionReader>>,
}

fn create_module(output_dir: &Path) -> (Fixture, Handle) {
    let eb = EventBus::default();
    let link = VirtualSerialLink::new();
    let device = DeviceDescriptor::new("/dev/ttyUSB0", 0x067b, 0x2303);
    link.attach(&device);
    link.grant(&device);
    let connection = link.open(&device, &SerialConfig::default()).unwrap();
    let (port, reader) = watch::channel(Some(connection.reader()));
    let config = SamplerConfig {
        read_timeout: Duration::from_millis(20),
        idle_poll: Duration::from_millis(5),
        pose_period: Duration::from_millis(20),
        ..Default::default()
    };
    let sampler = Sampler::new(
        eb.sender(),
        reader,
        NmeaCodec::default(),
        Arc::new(NoPoseProvider),
        config,
    );
    let mut session = LoggingSession::new(eb.context(), sampler, LogWriter::new(output_dir));
    let handle = tokio::spawn(async move { session.run().await });
    (
        Fixture {
            eb,
            link,
            device,
            _connection: connection,
            _port: port,
        },
        handle,
    )
}

fn toggle(eb: &EventBus, enabled: bool) {
    eb.publish(&Event {
        kind: EventKind::LoggingToggleEvent(enabled),
    });
}

#[tokio::test]
#[test_log::test]
async fn stop_persists_both_streams() {
    let dir = setup_empty_test_folder("stop_persists_both_streams");
    let (fixture, mut handle) = create_module(&dir);
    let mut rx = fixture.eb.subscribe();

    fixture
        .link
        .feed(&fixture.device, format!("{MUNICH}\r\n").as_bytes());
    toggle(&fixture.eb, true);
    wait_for_notice(&mut rx, Notice::LoggingStarted).await;
    wait_for_event(&mut rx, Duration::from_millis(500), EventKindType::GnssFixEvent).await;

    toggle(&fixture.eb, false);
    let event = wait_for_event(
        &mut rx,
        Duration::from_millis(500),
        EventKindType::LogPersistedEvent,
    )
    .await;
    let report = payload_ref!(event.kind, EventKind::LogPersistedEvent).unwrap();
    assert!(report.failed.is_empty());

    let raw_path = report.saved_path(StreamKind::RawNmea).unwrap();
    assert!(raw_path.file_name().unwrap().to_string_lossy().starts_with("USB_"));
    assert_eq!(std::fs::read_to_string(raw_path).unwrap(), format!("{MUNICH}\n"));

    let pose_path = report.saved_path(StreamKind::Pose).unwrap();
    assert!(pose_path.file_name().unwrap().to_string_lossy().starts_with("DEVICE_"));
    let pose = std::fs::read_to_string(pose_path).unwrap();
    assert_eq!(pose.lines().next(), Some(POSE_HEADER));
    assert!(pose.lines().skip(1).all(|row| row.starts_with(",,,,,,,")));

    wait_for_notice(&mut rx, Notice::LoggingStopped).await;
    stop_module(&fixture.eb, &mut handle).await;
}

#[tokio::test]
#[test_log::test]
async fn repeated_toggles_are_ignored() {
    let dir = setup_empty_test_folder("repeated_toggles_are_ignored");
    let (fixture, mut handle) = create_module(&dir);
    let mut rx = fixture.eb.subscribe();

    toggle(&fixture.eb, false);
    let persisted = try_wait_for_event(
        &mut rx,
        Duration::from_millis(100),
        EventKindType::LogPersistedEvent,
    )
    .await;
    assert!(persisted.is_none());

    toggle(&fixture.eb, true);
    toggle(&fixture.eb, true);
    wait_for_notice(&mut rx, Notice::LoggingStarted).await;
    let second_start = try_wait_for_event(&mut rx, Duration::from_millis(100), EventKindType::NoticeEvent).await;
    assert!(!matches!(
        second_start.map(|e| e.kind),
        Some(EventKind::NoticeEvent(Notice::LoggingStarted))
    ));

    toggle(&fixture.eb, false);
    toggle(&fixture.eb, false);
    wait_for_event(&mut rx, Duration::from_millis(500), EventKindType::LogPersistedEvent).await;
    let second_flush = try_wait_for_event(
        &mut rx,
        Duration::from_millis(100),
        EventKindType::LogPersistedEvent,
    )
    .await;
    assert!(second_flush.is_none());

    stop_module(&fixture.eb, &mut handle).await;
}

#[tokio::test]
#[test_log::test]
async fn quit_flushes_active_session() {
    let dir = setup_empty_test_folder("quit_flushes_active_session");
    let (fixture, mut handle) = create_module(&dir);
    let mut rx = fixture.eb.subscribe();

    toggle(&fixture.eb, true);
    wait_for_notice(&mut rx, Notice::LoggingStarted).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    stop_module(&fixture.eb, &mut handle).await;
    let saved = wait_for_matching_event(&mut rx, Duration::from_millis(100), |kind| {
        matches!(kind, EventKind::NoticeEvent(Notice::LogSaved(_)))
    })
    .await;
    let path = match saved.kind {
        EventKind::NoticeEvent(Notice::LogSaved(path)) => path,
        _ => unreachable!(),
    };
    assert!(path.starts_with(&dir));
    assert!(path.exists());
    // Without received sentences only the pose stream is written.
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);
}

#[tokio::test]
#[test_log::test]
async fn failed_write_is_reported() {
    let dir = setup_empty_test_folder("failed_write_is_reported");
    let blocked = dir.join("file_not_dir");
    std::fs::write(&blocked, "").unwrap();
    let (fixture, mut handle) = create_module(&blocked);
    let mut rx = fixture.eb.subscribe();

    toggle(&fixture.eb, true);
    wait_for_notice(&mut rx, Notice::LoggingStarted).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    toggle(&fixture.eb, false);

    wait_for_matching_event(&mut rx, Duration::from_millis(500), |kind| {
        matches!(kind, EventKind::NoticeEvent(Notice::LogSaveFailed(reason)) if reason.starts_with("DEVICE"))
    })
    .await;
    wait_for_notice(&mut rx, Notice::LoggingStopped).await;
    stop_module(&fixture.eb, &mut handle).await;
}
