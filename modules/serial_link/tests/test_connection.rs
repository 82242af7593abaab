// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use common::device::DeviceDescriptor;
use serial_link::{OpenError, SerialConfig, SerialLink, test_helper::VirtualSerialLink};
use std::{io::ErrorKind, time::Duration};

fn receiver() -> DeviceDescriptor {
    DeviceDescriptor::new("/dev/ttyACM0", 0x1546, 0x01a7)
}

#[test_log::test]
fn close_releases_port_exactly_once() {
    let link = VirtualSerialLink::new();
    let device = receiver();
    link.attach(&device);
    link.grant(&device);

    let connection = link.open(&device, &SerialConfig::default()).unwrap();
    assert!(connection.is_open());

    assert!(connection.close().unwrap());
    assert!(!connection.close().unwrap());
    link.close(Some(&connection));
    link.close(None);

    assert!(!connection.is_open());
    assert_eq!(link.open_count(), 1);
    assert_eq!(link.close_count(), 1);
}

#[test_log::test]
fn reader_fails_after_owner_closed() {
    let link = VirtualSerialLink::new();
    let device = receiver();
    link.attach(&device);
    link.grant(&device);
    let connection = link.open(&device, &SerialConfig::default()).unwrap();
    let reader = connection.reader();

    link.feed(&device, b"$GPGGA");
    assert_eq!(reader.read(64, Duration::from_millis(10)).unwrap(), b"$GPGGA");

    connection.close().unwrap();
    let error = reader.read(64, Duration::from_millis(10)).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotConnected);
}

#[test_log::test]
fn read_without_data_returns_empty() {
    let link = VirtualSerialLink::new();
    let device = receiver();
    link.attach(&device);
    link.grant(&device);
    let connection = link.open(&device, &SerialConfig::default()).unwrap();

    let data = link
        .read(&connection, 4096, Duration::from_millis(20))
        .unwrap();
    assert!(data.is_empty());
}

#[test_log::test]
fn read_is_bounded_by_max_bytes() {
    let link = VirtualSerialLink::new();
    let device = receiver();
    link.attach(&device);
    link.grant(&device);
    let connection = link.open(&device, &SerialConfig::default()).unwrap();

    link.feed(&device, b"0123456789");
    assert_eq!(connection.read(4, Duration::from_millis(10)).unwrap(), b"0123");
    assert_eq!(connection.read(64, Duration::from_millis(10)).unwrap(), b"456789");
}

#[test_log::test]
fn read_failure_is_reported() {
    let link = VirtualSerialLink::new();
    let device = receiver();
    link.attach(&device);
    link.grant(&device);
    let connection = link.open(&device, &SerialConfig::default()).unwrap();

    link.fail_next_read(&device);
    assert!(connection.read(64, Duration::from_millis(10)).is_err());
    assert!(connection.is_open());
}

#[test_log::test]
fn open_without_permission_fails() {
    let link = VirtualSerialLink::new();
    let device = receiver();
    link.attach(&device);

    let error = link.open(&device, &SerialConfig::default()).unwrap_err();
    assert_eq!(error, OpenError::PermissionDenied(device.id.clone()));
    assert_eq!(link.open_count(), 0);
}

#[test_log::test]
fn open_unknown_device_fails() {
    let link = VirtualSerialLink::new();
    let error = link
        .open(&receiver(), &SerialConfig::default())
        .unwrap_err();
    assert_eq!(error, OpenError::NoDriverAvailable);
}

#[test_log::test]
fn open_uses_given_line_settings() {
    let link = VirtualSerialLink::new();
    let device = receiver();
    link.attach(&device);
    link.grant(&device);
    let config = SerialConfig {
        baud_rate: 115200,
        ..Default::default()
    };

    link.open(&device, &config).unwrap();
    assert_eq!(link.last_config(), Some(config));
    assert_eq!(config.to_string(), "115200 8N1");
}

#[tokio::test]
#[test_log::test]
async fn permission_request_is_answered_asynchronously() {
    let link = VirtualSerialLink::new();
    let device = receiver();
    link.attach(&device);

    let answer = link.request_permission(&device);
    assert_eq!(link.pending_permission_requests(), 1);
    assert!(!link.has_permission(&device));

    assert!(link.resolve_permission(&device, true));
    assert!(answer.await.unwrap());
    assert!(link.has_permission(&device));
}

#[test]
fn line_settings_parse() {
    use serial_link::{DataBits, Parity, StopBits};
    assert_eq!(DataBits::try_from(7).unwrap(), DataBits::Seven);
    assert!(DataBits::try_from(9).is_err());
    assert_eq!(StopBits::try_from(2).unwrap(), StopBits::Two);
    assert_eq!("E".parse::<Parity>().unwrap(), Parity::Even);
    assert!("mark".parse::<Parity>().is_err());
    assert_eq!(SerialConfig::default().to_string(), "9600 8N1");
}
