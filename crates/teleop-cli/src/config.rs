//! Operator configuration – reads/writes `~/.teleop/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use teleop_runtime::{SurfaceKind, SurfaceSettings};
use teleop_types::TeleopError;

/// Where commands go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// A `rosbridge_server` WebSocket.
    #[default]
    Rosbridge,
    /// In-memory recorder; frames are echoed to the terminal.
    Sim,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Rosbridge => write!(f, "rosbridge"),
            TransportKind::Sim => write!(f, "sim"),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = TeleopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rosbridge" | "ws" => Ok(TransportKind::Rosbridge),
            "sim" | "simulator" => Ok(TransportKind::Sim),
            other => Err(TeleopError::Config(format!("unknown transport '{other}'"))),
        }
    }
}

/// Persisted operator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// `ws://host:port` of the robot's rosbridge server.
    #[serde(default = "default_rosbridge_url")]
    pub rosbridge_url: String,

    #[serde(default)]
    pub transport: TransportKind,

    /// Surface mounted at startup, with its tuning.
    #[serde(default)]
    pub surface: SurfaceSettings,
}

fn default_rosbridge_url() -> String {
    "ws://localhost:9090".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rosbridge_url: default_rosbridge_url(),
            transport: TransportKind::default(),
            surface: SurfaceSettings::default(),
        }
    }
}

/// Return the path to `~/.teleop/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".teleop").join("config.toml")
}

/// Load the config from disk and apply environment overrides.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, TeleopError> {
    let mut loaded = load_from(&config_path())?;
    if let Some(cfg) = loaded.as_mut() {
        apply_env_overrides(cfg);
        cfg.surface.validate()?;
    }
    Ok(loaded)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, TeleopError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| TeleopError::Config(format!("failed to read {}: {e}", path.display())))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| TeleopError::Config(format!("failed to parse {}: {e}", path.display())))?;
    cfg.surface.validate()?;
    Ok(Some(cfg))
}

/// Apply `TELEOP_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TELEOP_ROSBRIDGE_URL` | `rosbridge_url` |
/// | `TELEOP_TRANSPORT` | `transport` |
/// | `TELEOP_SURFACE` | `surface.kind` |
/// | `TELEOP_THROTTLE_MS` | `surface.throttle_ms` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("TELEOP_ROSBRIDGE_URL") {
        cfg.rosbridge_url = v;
    }
    if let Ok(v) = std::env::var("TELEOP_TRANSPORT")
        && let Ok(kind) = v.parse::<TransportKind>()
    {
        cfg.transport = kind;
    }
    if let Ok(v) = std::env::var("TELEOP_SURFACE")
        && let Ok(kind) = v.parse::<SurfaceKind>()
    {
        cfg.surface.kind = kind;
    }
    if let Ok(v) = std::env::var("TELEOP_THROTTLE_MS")
        && let Ok(ms) = v.parse::<u64>()
        && ms > 0
    {
        cfg.surface.throttle_ms = ms;
    }
}

/// Save the config to disk, creating `~/.teleop/` if necessary.
pub fn save(cfg: &Config) -> Result<(), TeleopError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), TeleopError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| TeleopError::Config(format!("failed to create config directory: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| TeleopError::Config(format!("failed to set config directory permissions: {e}")))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| TeleopError::Serialization(e.to_string()))?;
    let write_err = |e: std::io::Error| TeleopError::Config(format!("failed to write {}: {e}", path.display()));
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}
