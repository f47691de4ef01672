//! CLI argument definitions for the Wakeprompt application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use clap::{Parser, Subcommand};

/// Wakeprompt: alarms that wake you with a generated voice message.
#[derive(Parser, Debug)]
#[command(name = "wakeprompt", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the alarm database, sounds, and credential.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an alarm and generate its wake-up message.
    Create {
        /// Local wall-clock time (HH:MM); the next occurrence is used.
        #[arg(long, conflicts_with = "fire_at", required_unless_present = "fire_at")]
        at: Option<String>,

        /// Absolute fire time (RFC 3339).
        #[arg(long = "fire-at")]
        fire_at: Option<String>,

        /// Voice for the spoken message.
        #[arg(short = 'v', long)]
        voice: Option<String>,

        /// Extra instructions for the message.
        #[arg(short = 'p', long)]
        prompt: Option<String>,
    },
    /// List alarms, newest first.
    List,
    /// Show one alarm in detail.
    Show { id: String },
    /// Discard generated audio and run generation again.
    Regenerate { id: String },
    /// Disable an alarm and release its sound; the record is kept.
    Cancel { id: String },
    /// Remove an alarm entirely.
    Delete { id: String },
    /// Manage the provider API key.
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Keep alarms armed and record firings until interrupted.
    Run,
}

#[derive(Subcommand, Debug)]
pub enum KeyAction {
    /// Store the API key. Reads stdin when no value is given; blank removes it.
    Set { value: Option<String> },
    /// Remove the stored API key.
    Clear,
    /// Report whether an API key is stored.
    Status,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > WAKEPROMPT_CONFIG env var > ~/.wakeprompt/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("WAKEPROMPT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory override.
    ///
    /// Priority: --data-dir flag > WAKEPROMPT_DATA_DIR env var.
    /// Returns `None` if neither is set (use the config value).
    pub fn resolve_data_dir(&self) -> Option<String> {
        if let Some(ref p) = self.data_dir {
            return Some(p.to_string_lossy().to_string());
        }
        std::env::var("WAKEPROMPT_DATA_DIR").ok()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".wakeprompt").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".wakeprompt").join("config.toml");
    }
    PathBuf::from("config.toml")
}

/// Next occurrence of a wall-clock time strictly after `now`.
///
/// Today if the time is still ahead, otherwise tomorrow. Returns `None` when
/// the time does not exist on either day (a DST gap).
pub fn next_occurrence<Tz: TimeZone>(time: NaiveTime, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let today = now.date_naive();
    for offset in 0..=2 {
        let day = today + Duration::days(offset);
        if let Some(candidate) = now
            .timezone()
            .from_local_datetime(&day.and_time(time))
            .earliest()
        {
            if candidate > *now {
                return Some(candidate);
            }
        }
    }
    None
}

/// Turn `--at` / `--fire-at` into an absolute future instant.
pub fn resolve_fire_time<Tz: TimeZone>(
    at: Option<&str>,
    fire_at: Option<&str>,
    now: &DateTime<Tz>,
) -> Result<DateTime<Utc>, String> {
    let fire_time = match (at, fire_at) {
        (Some(at), None) => {
            let time = NaiveTime::parse_from_str(at.trim(), "%H:%M")
                .map_err(|_| format!("invalid time '{}', expected HH:MM", at))?;
            next_occurrence(time, now)
                .ok_or_else(|| format!("{} does not occur in the local time zone", at))?
                .with_timezone(&Utc)
        }
        (None, Some(fire_at)) => DateTime::parse_from_rfc3339(fire_at.trim())
            .map_err(|e| format!("invalid fire time '{}': {}", fire_at, e))?
            .with_timezone(&Utc),
        _ => return Err("give exactly one of --at or --fire-at".to_string()),
    };

    if fire_time <= now.with_timezone(&Utc) {
        return Err(format!("fire time {} is not in the future", fire_time.to_rfc3339()));
    }
    Ok(fire_time)
}
