// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use clap::Parser;
use dirs::{data_local_dir, download_dir};
use logging_session::LoggingSession;
use module_core::{Event, EventBus, EventKind, Module};
use nmea::NmeaCodec;
use sampler::{NoPoseProvider, PoseProvider, RawCapture, ReplayPoseProvider, Sampler, SamplerConfig};
use serial_link::{
    DataBits, Parity, SerialConfig, SerialLink, StopBits,
    hotplug::HotplugWatcher,
    system::{PermissionPolicy, SystemSerialLink},
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use storage::LogWriter;
use supervisor::ConnectionSupervisor;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod console;
use console::Console;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, default_value_t = 9600)]
    baud_rate: u32,
    #[arg(long, default_value_t = 8)]
    data_bits: u8,
    #[arg(long, default_value_t = 1)]
    stop_bits: u8,
    #[arg(long, default_value = "none")]
    parity: String,
    /// Additional serial port to consider, e.g. a virtual port. Repeatable.
    #[arg(short, long)]
    device: Vec<String>,
    /// Only grant access to these ports. Repeatable, all ports if omitted.
    #[arg(long)]
    allow_device: Vec<String>,
    #[arg(long, default_value = nmea::GPGGA)]
    sentence_id: String,
    #[arg(long)]
    validate_checksum: bool,
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// CSV file with poses to replay as pose provider.
    #[arg(short, long)]
    pose_file: Option<PathBuf>,
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    read_timeout_ms: u64,
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    pose_period_ms: u64,
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    hotplug_period_ms: u64,
    #[arg(long)]
    fix_sentences_only: bool,
    /// Start logging right away instead of waiting for the start command.
    #[arg(short, long)]
    autostart: bool,
    /// Print the discovered serial devices and exit.
    #[arg(short, long)]
    list_devices: bool,
}

fn get_serial_config(cli: &Cli) -> Result<SerialConfig, ()> {
    let data_bits = DataBits::try_from(cli.data_bits);
    let stop_bits = StopBits::try_from(cli.stop_bits);
    let parity = cli.parity.parse::<Parity>();
    match (data_bits, stop_bits, parity) {
        (Ok(data_bits), Ok(stop_bits), Ok(parity)) => Ok(SerialConfig {
            baud_rate: cli.baud_rate,
            data_bits,
            stop_bits,
            parity,
        }),
        (data_bits, stop_bits, parity) => {
            for e in [data_bits.err(), stop_bits.err(), parity.err()]
                .into_iter()
                .flatten()
            {
                error!("Invalid serial settings. Error: {}", e);
            }
            Err(())
        }
    }
}

fn get_output_dir(cli: &Cli) -> Result<PathBuf, ()> {
    if let Some(output_dir) = &cli.output_dir {
        return Ok(output_dir.clone());
    }
    if let Some(download_dir) = download_dir() {
        return Ok(download_dir);
    }
    let mut output_dir = data_local_dir().ok_or_else(|| {
        error!("Could not determine download or local data directory");
    })?;
    output_dir.push("gnss_logger");
    Ok(output_dir)
}

fn create_pose_provider(cli: &Cli) -> Result<Arc<dyn PoseProvider>, ()> {
    let Some(pose_file) = &cli.pose_file else {
        return Ok(Arc::new(NoPoseProvider));
    };
    match ReplayPoseProvider::from_path(pose_file) {
        Ok(provider) => {
            info!(
                "Replaying {} poses from {}",
                provider.len(),
                pose_file.to_string_lossy()
            );
            Ok(Arc::new(provider))
        }
        Err(e) => {
            error!(
                "Failed to load poses from {}. Error: {}",
                pose_file.to_string_lossy(),
                e
            );
            Err(())
        }
    }
}

fn main() -> Result<(), ()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let runtime = tokio::runtime::Runtime::new().map_err(|e| {
        error!("Failed to create runtime. Error: {}", e);
    })?;
    let result = runtime.block_on(run(cli));
    // A pending stdin read can't be cancelled, don't wait for it.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn run(cli: Cli) -> Result<(), ()> {
    let policy = if cli.allow_device.is_empty() {
        PermissionPolicy::GrantAll
    } else {
        PermissionPolicy::AllowList(cli.allow_device.clone())
    };
    let link: Arc<dyn SerialLink> =
        Arc::new(SystemSerialLink::new(policy).with_extra_ports(cli.device.clone()));
    if cli.list_devices {
        for device in link.discover() {
            println!("{device}");
        }
        return Ok(());
    }

    let serial_config = get_serial_config(&cli)?;
    let output_dir = get_output_dir(&cli)?;
    let pose_provider = create_pose_provider(&cli)?;
    let sampler_config = SamplerConfig {
        read_timeout: Duration::from_millis(cli.read_timeout_ms),
        pose_period: Duration::from_millis(cli.pose_period_ms),
        raw_capture: if cli.fix_sentences_only {
            RawCapture::FixSentencesOnly
        } else {
            RawCapture::AllSentences
        },
        ..Default::default()
    };
    let codec = NmeaCodec::new(&cli.sentence_id).with_checksum_validation(cli.validate_checksum);
    info!("Serial settings {}, saving logs to {}", serial_config, output_dir.to_string_lossy());

    let eb = EventBus::default();
    let sender = eb.sender();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = sender.send(Event {
            kind: EventKind::LoggingToggleEvent(false),
        });
        let _ = sender.send(Event {
            kind: EventKind::QuitEvent,
        });
    }) {
        error!("Failed to install ctrl-c handler. Error: {}", e);
    }

    let mut hotplug = HotplugWatcher::new(
        eb.context(),
        link.clone(),
        Duration::from_millis(cli.hotplug_period_ms),
    );
    let mut supervisor = ConnectionSupervisor::new(eb.context(), link, serial_config);
    let sampler = Sampler::new(
        eb.sender(),
        supervisor.port_watch(),
        codec,
        pose_provider,
        sampler_config,
    );
    let mut session = LoggingSession::new(eb.context(), sampler, LogWriter::new(output_dir));
    let mut console = Console::new(eb.context(), cli.autostart);

    info!("Starting modules...");
    let results = tokio::join!(
        hotplug.run(),
        supervisor.run(),
        session.run(),
        console.run()
    );
    results.0.and(results.1).and(results.2).and(results.3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn zero_periods_are_rejected() {
        for flag in ["--pose-period-ms", "--hotplug-period-ms", "--read-timeout-ms"] {
            assert!(
                Cli::try_parse_from(["gnss_logger_headless", flag, "0"]).is_err(),
                "{flag} accepted 0"
            );
        }
        let cli = Cli::try_parse_from(["gnss_logger_headless", "--pose-period-ms", "1"]).unwrap();
        assert_eq!(cli.pose_period_ms, 1);
        assert_eq!(cli.hotplug_period_ms, 1000);
    }

    #[test_log::test]
    fn serial_settings_from_cli() {
        let cli = Cli::try_parse_from([
            "gnss_logger_headless",
            "--baud-rate",
            "115200",
            "--parity",
            "even",
        ])
        .unwrap();
        let config = get_serial_config(&cli).unwrap();
        assert_eq!(config.to_string(), "115200 8E1");

        let cli = Cli::try_parse_from(["gnss_logger_headless", "--data-bits", "9"]).unwrap();
        assert!(get_serial_config(&cli).is_err());
    }
}
