//! zc-prober: probe a CAN bus or serial device for hidden IDs and commands.
//!
//! Exit codes: 0 when every probe was sent, 1 for invalid configuration,
//! 2 when the transport could not be opened or a send failed.

use std::process::ExitCode;

use clap::Parser;

use zc_bus_probe::{ConsoleReporter, TokioDelay};
use zc_prober::cli::Cli;
use zc_prober::config::ProberConfig;
use zc_prober::{run, telemetry};

#[tokio::main]
async fn main() -> ExitCode {
    let reporter = ConsoleReporter::stdout();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Help and version are not errors.
            if !e.use_stderr() {
                return ExitCode::SUCCESS;
            }
            reporter.hint(zc_bus_probe::reporter::CONFIG_HINT);
            return ExitCode::from(zc_bus_probe::scan::EXIT_CONFIG);
        }
    };

    telemetry::init(cli.verbose, cli.log_json);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "zc-prober starting");

    // ── Load config ─────────────────────────────────────────────
    let config = match &cli.config {
        Some(path) => match ProberConfig::from_file(path) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "config loaded");
                config
            }
            Err(e) => {
                let e = e.context(format!("failed to load {}", path.display()));
                return ExitCode::from(run::config_error_exit(&e, &reporter));
            }
        },
        None => ProberConfig::default(),
    };

    // ── Scan ────────────────────────────────────────────────────
    let outcome = run::run(&cli.command, &config, &TokioDelay, &reporter).await;

    if cli.json {
        match serde_json::to_string(&outcome) {
            Ok(json) => reporter.print(json),
            Err(e) => tracing::warn!(error = %e, "failed to serialize outcome"),
        }
    }

    ExitCode::from(outcome.exit_code())
}
