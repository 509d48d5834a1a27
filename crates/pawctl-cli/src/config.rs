//! Configuration vault – reads/writes `~/.pawctl/config.toml`.
//!
//! Only the operator-facing knobs are persisted; every other tunable keeps
//! its compiled-in default from [`ControllerConfig`].

use pawctl_runtime::{ControllerConfig, Gait};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadSection {
    /// Per-joint deadband of the head filter, in servo angle units.
    #[serde(default = "default_deadband")]
    pub deadband: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatrolSection {
    #[serde(default = "default_danger_distance_cm")]
    pub danger_distance_cm: f32,

    #[serde(default)]
    pub gait: Gait,

    /// Bark when an obstacle halts the walk.
    #[serde(default)]
    pub enable_bark: bool,
}

/// Persisted operator configuration stored in `~/.pawctl/config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub head: HeadSection,

    #[serde(default)]
    pub patrol: PatrolSection,
}

fn default_deadband() -> i32 {
    4
}
fn default_danger_distance_cm() -> f32 {
    18.0
}

impl Default for HeadSection {
    fn default() -> Self {
        Self {
            deadband: default_deadband(),
        }
    }
}

impl Default for PatrolSection {
    fn default() -> Self {
        Self {
            danger_distance_cm: default_danger_distance_cm(),
            gait: Gait::default(),
            enable_bark: false,
        }
    }
}

impl Config {
    /// Layer these settings over the compiled-in defaults.
    pub fn apply_to(&self, controller: &mut ControllerConfig) {
        controller.head.deadband = self.head.deadband;
        controller.patrol.danger_distance_cm = self.patrol.danger_distance_cm;
        controller.patrol.gait = self.patrol.gait;
        controller.patrol.enable_bark = self.patrol.enable_bark;
    }
}

/// Return the config path: `$PAWCTL_CONFIG` when set, otherwise
/// `~/.pawctl/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("PAWCTL_CONFIG")
        && !path.trim().is_empty()
    {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".pawctl").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `PAWCTL_*` environment variable overrides to `cfg`.
///
/// Unparseable values are logged and ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `PAWCTL_DANGER_DISTANCE_CM` | `patrol.danger_distance_cm` |
/// | `PAWCTL_HEAD_DEADBAND` | `head.deadband` |
/// | `PAWCTL_GAIT` | `patrol.gait` (`tick` / `continuous`) |
/// | `PAWCTL_ENABLE_BARK` | `patrol.enable_bark` (`1`/`true`/`yes`/`on`) |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("PAWCTL_DANGER_DISTANCE_CM") {
        match v.trim().parse::<f32>() {
            Ok(cm) => cfg.patrol.danger_distance_cm = cm,
            Err(_) => warn!(value = %v, "ignoring PAWCTL_DANGER_DISTANCE_CM"),
        }
    }
    if let Ok(v) = std::env::var("PAWCTL_HEAD_DEADBAND") {
        match v.trim().parse::<i32>() {
            Ok(deadband) => cfg.head.deadband = deadband,
            Err(_) => warn!(value = %v, "ignoring PAWCTL_HEAD_DEADBAND"),
        }
    }
    if let Ok(v) = std::env::var("PAWCTL_GAIT") {
        match v.parse::<Gait>() {
            Ok(gait) => cfg.patrol.gait = gait,
            Err(e) => warn!(error = %e, "ignoring PAWCTL_GAIT"),
        }
    }
    if let Ok(v) = std::env::var("PAWCTL_ENABLE_BARK") {
        match parse_flag(&v) {
            Some(flag) => cfg.patrol.enable_bark = flag,
            None => warn!(value = %v, "ignoring PAWCTL_ENABLE_BARK"),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Save the config to disk, creating the parent directory if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
