// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use chrono::{Local, TimeZone};
use common::record::StreamKind;
use storage::{LogBuffer, LogSnapshot, LogWriter, POSE_HEADER};

mod helper;
use helper::{get_path, read_to_string, setup_empty_test_folder};

fn saved_at() -> chrono::DateTime<Local> {
    Local
        .with_ymd_and_hms(2024, 5, 17, 9, 3, 7)
        .single()
        .expect("Unambiguous local time")
}

#[test]
fn file_names_follow_stream_type() {
    assert_eq!(
        LogWriter::file_name(StreamKind::RawNmea, &saved_at()),
        "USB_20240517_090307.txt"
    );
    assert_eq!(
        LogWriter::file_name(StreamKind::Pose, &saved_at()),
        "DEVICE_20240517_090307.txt"
    );
}

#[tokio::test]
#[test_log::test]
async fn persist_writes_both_streams() {
    let dir = setup_empty_test_folder("persist_writes_both_streams");
    let buffer = LogBuffer::new();
    buffer.append_raw("$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47");
    buffer.append_pose("48.1,11.5,1.5,545.4,2.0,90.0,5.0,1700000000000");
    let writer = LogWriter::new(&dir);

    let report = writer.persist(&buffer.snapshot_and_clear(), &saved_at()).await;
    assert!(report.failed.is_empty());
    assert_eq!(report.saved.len(), 2);

    let raw_path = report.saved_path(StreamKind::RawNmea).unwrap();
    assert_eq!(*raw_path, dir.join("USB_20240517_090307.txt"));
    assert_eq!(
        read_to_string(raw_path),
        "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\n"
    );

    let pose_path = report.saved_path(StreamKind::Pose).unwrap();
    assert_eq!(*pose_path, dir.join("DEVICE_20240517_090307.txt"));
    let pose = read_to_string(pose_path);
    assert_eq!(pose.lines().next(), Some(POSE_HEADER));
    assert_eq!(pose.lines().count(), 2);
}

#[tokio::test]
#[test_log::test]
async fn empty_stream_creates_no_file() {
    let dir = setup_empty_test_folder("empty_stream_creates_no_file");
    let writer = LogWriter::new(&dir);
    let snapshot = LogSnapshot {
        raw: String::new(),
        pose: format!("{POSE_HEADER}\n,,,,,,,1700000000000\n"),
    };

    let report = writer.persist(&snapshot, &saved_at()).await;
    assert_eq!(report.saved.len(), 1);
    assert!(report.saved_path(StreamKind::RawNmea).is_none());
    assert!(!dir.join("USB_20240517_090307.txt").exists());

    let report = writer.persist(&LogSnapshot::default(), &saved_at()).await;
    assert!(report.is_empty());
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);
}

#[tokio::test]
#[test_log::test]
async fn existing_file_is_not_overwritten() {
    let dir = setup_empty_test_folder("existing_file_is_not_overwritten");
    std::fs::write(dir.join("USB_20240517_090307.txt"), "previous session\n").unwrap();
    let writer = LogWriter::new(&dir);
    let snapshot = LogSnapshot {
        raw: "first\n".to_owned(),
        pose: String::new(),
    };

    let first = writer.persist(&snapshot, &saved_at()).await;
    let second = writer.persist(&snapshot, &saved_at()).await;

    assert_eq!(
        *first.saved_path(StreamKind::RawNmea).unwrap(),
        dir.join("USB_20240517_090307_1.txt")
    );
    assert_eq!(
        *second.saved_path(StreamKind::RawNmea).unwrap(),
        dir.join("USB_20240517_090307_2.txt")
    );
    assert_eq!(
        read_to_string(&dir.join("USB_20240517_090307.txt")),
        "previous session\n"
    );
}

#[tokio::test]
#[test_log::test]
async fn missing_output_dir_is_created() {
    setup_empty_test_folder("missing_output_dir_is_created");
    let dir = get_path("missing_output_dir_is_created").join("nested").join("logs");
    let writer = LogWriter::new(&dir);
    let snapshot = LogSnapshot {
        raw: "line\n".to_owned(),
        pose: String::new(),
    };

    let report = writer.persist(&snapshot, &saved_at()).await;
    assert_eq!(report.saved.len(), 1);
    assert!(dir.join("USB_20240517_090307.txt").exists());
}

#[tokio::test]
#[test_log::test]
async fn write_failure_is_reported() {
    let dir = setup_empty_test_folder("write_failure_is_reported");
    // A regular file where the output directory is expected.
    let blocked = dir.join("not_a_dir");
    std::fs::write(&blocked, "").unwrap();
    let writer = LogWriter::new(&blocked);
    let snapshot = LogSnapshot {
        raw: "line\n".to_owned(),
        pose: format!("{POSE_HEADER}\n,,,,,,,1\n"),
    };

    let report = writer.persist(&snapshot, &saved_at()).await;
    assert!(report.saved.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert_eq!(report.failed[0].0, StreamKind::RawNmea);
}
