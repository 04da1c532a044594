use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_VOLUME_ROOT: &str = "/Volumes";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Mount root prepended to bare volume names.
    pub volume_root: PathBuf,
    pub pauses: Pauses,
    pub commands: Commands,
}

/// Human-pacing sleeps after messages the menu is about to redraw over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pauses {
    pub not_purgeable: Duration,
    pub invalid_choice: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Commands {
    pub diskutil: String,
    pub tmutil: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            volume_root: PathBuf::from(DEFAULT_VOLUME_ROOT),
            pauses: Pauses::default(),
            commands: Commands::default(),
        }
    }
}

impl Default for Pauses {
    fn default() -> Self {
        Pauses {
            not_purgeable: Duration::from_millis(1500),
            invalid_choice: Duration::from_millis(1200),
        }
    }
}

impl Pauses {
    #[cfg(test)]
    pub fn none() -> Self {
        Pauses {
            not_purgeable: Duration::ZERO,
            invalid_choice: Duration::ZERO,
        }
    }
}

impl Default for Commands {
    fn default() -> Self {
        Commands {
            diskutil: "diskutil".to_string(),
            tmutil: "tmutil".to_string(),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfig {
    volume_root: Option<String>,
    #[serde(default)]
    pause: RawPause,
    #[serde(default)]
    commands: RawCommands,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawPause {
    not_purgeable: Option<String>,
    invalid_choice: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawCommands {
    diskutil: Option<String>,
    tmutil: Option<String>,
}

/// Loads the TOML config at `config_path`, or the defaults when none is given.
pub fn load(config_path: Option<PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => {
            let raw = read_toml(&path)?;
            from_raw(raw, &path)
        }
        None => Ok(Config::default()),
    }
}

fn read_toml(path: &Path) -> Result<RawConfig> {
    let content = fs::read_to_string(path)
        .context(format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content).context(format!("Invalid TOML in config file: {}", path.display()))
}

fn from_raw(raw: RawConfig, path: &Path) -> Result<Config> {
    let defaults = Config::default();
    Ok(Config {
        volume_root: raw
            .volume_root
            .map(PathBuf::from)
            .unwrap_or(defaults.volume_root),
        pauses: Pauses {
            not_purgeable: parse_pause(raw.pause.not_purgeable, defaults.pauses.not_purgeable, path)?,
            invalid_choice: parse_pause(
                raw.pause.invalid_choice,
                defaults.pauses.invalid_choice,
                path,
            )?,
        },
        commands: Commands {
            diskutil: raw.commands.diskutil.unwrap_or(defaults.commands.diskutil),
            tmutil: raw.commands.tmutil.unwrap_or(defaults.commands.tmutil),
        },
    })
}

fn parse_pause(value: Option<String>, default: Duration, path: &Path) -> Result<Duration> {
    match value {
        Some(s) => Ok(s
            .parse::<humantime::Duration>()
            .context(format!(
                "Invalid pause duration '{}' in config file: {}",
                s,
                path.display()
            ))?
            .into()),
        None => Ok(default),
    }
}
