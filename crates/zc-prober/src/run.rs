//! Turns parsed arguments into a scan and opens the real transports.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use zc_bus_probe::scan::transport_error;
use zc_bus_probe::{
    CaptureSink, Connection, Delay, Orchestrator, ProbeError, ProbeResult, ProgressReporter,
    ScanOutcome, ScanRequest, SerialTransport,
};

use crate::cli::{CanArgs, Command, SerialArgs};
use crate::config::ProberConfig;

/// Build the CAN range request from arguments and config overrides.
pub fn can_request(args: &CanArgs, config: &ProberConfig) -> ScanRequest {
    ScanRequest::can_range(args.start, args.end, args.dlc)
        .with_delay_secs(args.delay)
        .with_cadence(config.can.progress_every)
        .with_stop_grace_secs(config.recorder.stop_grace_secs)
}

/// Build the serial command request from config overrides.
pub fn serial_request(config: &ProberConfig) -> ScanRequest {
    ScanRequest::commands(config.serial.commands.clone(), config.serial.terminator.clone())
        .with_delay_secs(config.serial.delay_secs)
        .with_drain_secs(config.serial.drain_secs)
        .with_stop_grace_secs(config.recorder.stop_grace_secs)
}

/// Timestamped reply log name, e.g. `serial_probe_20240115_120001.log`.
pub fn default_log_path(now: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!("serial_probe_{}.log", now.format("%Y%m%d_%H%M%S")))
}

/// Run the subcommand to completion.
pub async fn run(
    command: &Command,
    config: &ProberConfig,
    delay: &dyn Delay,
    reporter: &dyn ProgressReporter,
) -> ScanOutcome {
    let orchestrator = Orchestrator::new(delay, reporter);
    match command {
        Command::Can(args) => {
            orchestrator
                .run(&can_request(args, config), |_| connect_can(args))
                .await
        }
        Command::Serial(args) => {
            orchestrator
                .run(&serial_request(config), |_| connect_serial(args))
                .await
        }
    }
}

fn open_sink(path: &Path) -> ProbeResult<CaptureSink> {
    let sink = CaptureSink::append_to_file(path)
        .map_err(|e| transport_error(format!("cannot open log {}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), "capture log opened");
    Ok(sink)
}

#[cfg(target_os = "linux")]
fn connect_can(args: &CanArgs) -> ProbeResult<Connection> {
    let transport = zc_bus_probe::SocketCanTransport::open(&args.interface)?;
    let sink = args.capture.as_deref().map(open_sink).transpose()?;
    Ok(Connection {
        transport: Arc::new(transport),
        sink,
    })
}

#[cfg(not(target_os = "linux"))]
fn connect_can(args: &CanArgs) -> ProbeResult<Connection> {
    Err(ProbeError::Interface(format!(
        "{}: SocketCAN is only available on Linux",
        args.interface
    )))
}

fn connect_serial(args: &SerialArgs) -> ProbeResult<Connection> {
    let transport = SerialTransport::open(&args.device, args.baud)?;
    let sink = if args.no_capture {
        None
    } else {
        let path = args
            .log
            .clone()
            .unwrap_or_else(|| default_log_path(Local::now()));
        Some(open_sink(&path)?)
    };
    Ok(Connection {
        transport: Arc::new(transport),
        sink,
    })
}

/// Exit code for errors raised before a scan could start.
pub fn config_error_exit(error: &anyhow::Error, reporter: &dyn ProgressReporter) -> u8 {
    let error = ProbeError::Config(format!("{error:#}"));
    reporter.on_rejected(&error);
    zc_bus_probe::scan::EXIT_CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;
    use zc_bus_probe::ProbePlan;

    fn can_args(start: i64, end: i64) -> CanArgs {
        CanArgs {
            interface: "vcan0".into(),
            start,
            end,
            dlc: 8,
            delay: 0.01,
            capture: None,
        }
    }

    #[test]
    fn can_request_carries_arguments() {
        let request = can_request(&can_args(0x100, 0x1FF), &ProberConfig::default());
        assert_eq!(
            request.plan,
            ProbePlan::CanRange {
                start: 0x100,
                end: 0x1FF,
                dlc: 8
            }
        );
        assert_eq!(request.delay_secs, 0.01);
        assert_eq!(request.cadence, Some(128));
        assert_eq!(request.drain_secs, 0.0);
    }

    #[test]
    fn serial_request_uses_fixed_pacing() {
        let request = serial_request(&ProberConfig::default());
        let scan = request.validate().unwrap();
        assert_eq!(scan.space.len(), 22);
        assert_eq!(scan.rate.delay(), Duration::from_millis(600));
        assert_eq!(scan.drain, Duration::from_secs(1));
        assert_eq!(scan.cadence.get(), 1);
    }

    #[test]
    fn negative_config_durations_fail_validation() {
        let config: ProberConfig = toml::from_str("[serial]\ndrain_secs = -1.0\n").unwrap();
        assert!(serial_request(&config).validate().is_err());

        let config: ProberConfig =
            toml::from_str("[recorder]\nstop_grace_secs = -5.0\n").unwrap();
        assert!(serial_request(&config).validate().is_err());
        assert!(can_request(&can_args(0, 1), &config).validate().is_err());
    }

    #[test]
    fn log_path_has_timestamp() {
        let now = Local.with_ymd_and_hms(2024, 1, 15, 12, 0, 1).unwrap();
        assert_eq!(
            default_log_path(now),
            PathBuf::from("serial_probe_20240115_120001.log")
        );
    }

    #[test]
    fn missing_serial_device_is_a_transport_error() {
        let args = SerialArgs {
            device: "/dev/zc-prober-does-not-exist".into(),
            baud: 115_200,
            log: None,
            no_capture: true,
        };
        let err = connect_serial(&args).err().unwrap();
        assert!(matches!(err, ProbeError::Interface(_)));
    }
}
