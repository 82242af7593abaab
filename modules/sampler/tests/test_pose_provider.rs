// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use chrono::{TimeZone, Utc};
use common::pose::PoseSample;
use sampler::{NoPoseProvider, PoseProvider, PoseReplayError, ReplayPoseProvider, pose_row};

#[test]
fn replay_cycles_through_poses() {
    let csv = "latitude,longitude,horizontalAccuracy,altitude,verticalAccuracy,heading,headingAccuracy\n\
               52.02, 11.27, 1.5, 80.0, 2.5, 180.0, 4.0\n\
               52.03, 11.28, 1.0, 81.0, 2.0, 181.0, 3.0\n";
    let provider = ReplayPoseProvider::from_reader(csv.as_bytes()).unwrap();
    assert_eq!(provider.len(), 2);

    let first = provider.current_pose().unwrap();
    let second = provider.current_pose().unwrap();
    let third = provider.current_pose().unwrap();
    assert_eq!(first.latitude, 52.02);
    assert_eq!(first.heading, 180.0);
    assert_eq!(second.latitude, 52.03);
    assert_eq!(third.latitude, 52.02);
    assert!(third.timestamp >= first.timestamp);
}

#[test]
fn replay_accepts_position_only_rows() {
    let csv = "latitude,longitude\n52.02,11.27\n";
    let pose = ReplayPoseProvider::from_reader(csv.as_bytes())
        .unwrap()
        .current_pose()
        .unwrap();
    assert_eq!(pose.longitude, 11.27);
    assert_eq!(pose.horizontal_accuracy, 0.0);
    assert_eq!(pose.heading_accuracy, 0.0);
}

#[test]
fn replay_rejects_empty_and_invalid_files() {
    assert!(matches!(
        ReplayPoseProvider::from_reader("latitude,longitude\n".as_bytes()),
        Err(PoseReplayError::Empty)
    ));
    assert!(matches!(
        ReplayPoseProvider::from_reader("latitude,longitude\nnorth,11.27\n".as_bytes()),
        Err(PoseReplayError::Csv(_))
    ));
    assert!(matches!(
        ReplayPoseProvider::from_path("/nonexistent/poses.csv"),
        Err(PoseReplayError::Io(_))
    ));
}

#[test]
fn rows_match_pose_header_columns() {
    let tick = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    assert!(NoPoseProvider.current_pose().is_none());
    assert_eq!(pose_row(None, tick), ",,,,,,,1700000000000");

    let pose = PoseSample {
        latitude: 52.5,
        longitude: 11.25,
        horizontal_accuracy: 1.5,
        altitude: 80.0,
        vertical_accuracy: 2.5,
        heading: 180.0,
        heading_accuracy: 4.0,
        timestamp: Utc.timestamp_millis_opt(1_700_000_000_250).unwrap(),
    };
    assert_eq!(
        pose_row(Some(&pose), tick),
        "52.5,11.25,1.5,80,2.5,180,4,1700000000250"
    );
}
