// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use common::notice::Notice;
use module_core::{Event, EventKind, test_helper::wait_for_matching_event};
use std::{path::PathBuf, time::Duration};
use tokio::sync::broadcast::Receiver;

pub const MUNICH: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

/// Creates an empty folder below the temp directory for a test.
pub fn setup_empty_test_folder(folder_name: &str) -> PathBuf {
    let path = std::env::temp_dir()
        .join("gnss_logger_session_tests")
        .join(folder_name);
    if let Ok(true) = std::fs::exists(&path) {
        std::fs::remove_dir_all(&path)
            .unwrap_or_else(|err| panic!("Failed to remove {path:?}. Reason: {err}"));
    }
    std::fs::create_dir_all(&path)
        .unwrap_or_else(|err| panic!("Failed to create {path:?}. Reason: {err}"));
    path
}

pub async fn wait_for_notice(rx: &mut Receiver<Event>, notice: Notice) {
    wait_for_matching_event(rx, Duration::from_millis(500), |kind| {
        matches!(kind, EventKind::NoticeEvent(n) if *n == notice)
    })
    .await;
}
