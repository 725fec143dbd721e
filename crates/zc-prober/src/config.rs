//! Prober configuration overrides, loadable from TOML.
//!
//! Every field is optional; an absent file or section keeps the built-in
//! defaults (cadence 128, the 22-command list, CRLF, 0.6 s / 1 s pacing).
//! Values are range-checked later, with the rest of the scan request.

use serde::Deserialize;

use zc_bus_probe::recorder::DEFAULT_STOP_GRACE;
use zc_bus_probe::types::{
    DEFAULT_COMMANDS, DEFAULT_PROGRESS_CADENCE, DEFAULT_TERMINATOR, LITERAL_DRAIN_DELAY,
    LITERAL_PROBE_DELAY,
};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProberConfig {
    #[serde(default)]
    pub can: CanConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
}

/// CAN range scan settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CanConfig {
    /// Report progress every N IDs.
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            progress_every: default_progress_every(),
        }
    }
}

/// Serial command scan settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerialConfig {
    /// Commands in send order.
    #[serde(default = "default_commands")]
    pub commands: Vec<String>,
    /// Appended to every command.
    #[serde(default = "default_terminator")]
    pub terminator: String,
    /// Delay after each command, in seconds.
    #[serde(default = "default_command_delay")]
    pub delay_secs: f64,
    /// Wait after the last command for late replies, in seconds.
    #[serde(default = "default_drain")]
    pub drain_secs: f64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            commands: default_commands(),
            terminator: default_terminator(),
            delay_secs: default_command_delay(),
            drain_secs: default_drain(),
        }
    }
}

/// Passive recorder settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecorderConfig {
    /// How long to wait for the recorder to stop, in seconds.
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: f64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            stop_grace_secs: default_stop_grace(),
        }
    }
}

fn default_progress_every() -> usize {
    DEFAULT_PROGRESS_CADENCE
}

fn default_commands() -> Vec<String> {
    DEFAULT_COMMANDS.iter().map(|c| (*c).to_string()).collect()
}

fn default_terminator() -> String {
    DEFAULT_TERMINATOR.to_string()
}

fn default_command_delay() -> f64 {
    LITERAL_PROBE_DELAY.as_secs_f64()
}

fn default_drain() -> f64 {
    LITERAL_DRAIN_DELAY.as_secs_f64()
}

fn default_stop_grace() -> f64 {
    DEFAULT_STOP_GRACE.as_secs_f64()
}

impl ProberConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: ProberConfig = toml::from_str("").unwrap();
        assert_eq!(config.can.progress_every, 128);
        assert_eq!(config.serial.commands.len(), 22);
        assert_eq!(config.serial.commands[3], "GET FLAG");
        assert_eq!(config.serial.terminator, "\r\n");
        assert_eq!(config.serial.delay_secs, 0.6);
        assert_eq!(config.serial.drain_secs, 1.0);
        assert_eq!(config.recorder.stop_grace_secs, 2.0);
    }

    #[test]
    fn full_config() {
        let toml = r#"
[can]
progress_every = 64

[serial]
commands = ["ID", "flag?"]
terminator = "\n"
delay_secs = 0.25
drain_secs = 3.0

[recorder]
stop_grace_secs = 0.5
"#;
        let config: ProberConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.can.progress_every, 64);
        assert_eq!(config.serial.commands, ["ID", "flag?"]);
        assert_eq!(config.serial.terminator, "\n");
        assert_eq!(config.serial.delay_secs, 0.25);
        assert_eq!(config.serial.drain_secs, 3.0);
        assert_eq!(config.recorder.stop_grace_secs, 0.5);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: ProberConfig = toml::from_str("[serial]\nterminator = \"\\r\"\n").unwrap();
        assert_eq!(config.serial.terminator, "\r");
        assert_eq!(config.serial.commands.len(), 22);
        assert_eq!(config.serial.delay_secs, 0.6);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<ProberConfig>("[can]\nprogress = 5\n").is_err());
    }
}
