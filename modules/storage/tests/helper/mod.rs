// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use std::path::PathBuf;

pub fn get_path(folder_name: &str) -> PathBuf {
    std::env::temp_dir()
        .join("gnss_logger_storage_tests")
        .join(folder_name)
}

/// Creates an empty folder for a test, removing what a previous run left behind.
pub fn setup_empty_test_folder(folder_name: &str) -> PathBuf {
    let path = get_path(folder_name);
    if let Ok(true) = std::fs::exists(&path) {
        std::fs::remove_dir_all(&path)
            .unwrap_or_else(|err| panic!("Failed to remove {path:?}. Reason: {err}"));
    }
    std::fs::create_dir_all(&path)
        .unwrap_or_else(|err| panic!("Failed to create {path:?}. Reason: {err}"));
    path
}

pub fn read_to_string(path: &PathBuf) -> String {
    std::fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("Failed to read {path:?}. Reason: {err}"))
}
