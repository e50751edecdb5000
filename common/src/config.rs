//! Server-wide configuration: a Figment-merge-then-extract layer that writes
//! its own defaults to disk on first run. There is no predecessor config
//! format to migrate from, so unlike some TOML-backed config layers this one
//! carries no versioned-upgrade wrapper (see `DESIGN.md`).

use std::path::{Path, PathBuf};

use figment::{
    providers::{Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{RialtoError, RialtoResult};
use crate::utils::get_app_config_path;

pub const FILE_NAME: &str = "rialto.toml";

fn default_max_playbacks() -> usize {
    2
}

fn default_max_web_audio_players() -> usize {
    1
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/rialto-0")
}

fn default_socket_permissions() -> u32 {
    0o660
}

fn default_shm_size_bytes() -> usize {
    // 21 MiB: enough partition headroom for a handful of concurrent sessions
    // at typical segment sizes.
    21 * 1024 * 1024
}

fn default_heartbeat_timeout_ms() -> u64 {
    1_000
}

fn default_underflow_margin_ms() -> u64 {
    // CheckAudioUnderflow: UNDERFLOW_MARGIN = 350ms.
    350
}

/// Process-level env vars the supervisor exports at boot: the client and
/// subtitles Wayland display names, derived from config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaylandEnv {
    pub wayland_display: String,
    pub wayland_display_subtitles: String,
}

impl Default for WaylandEnv {
    fn default() -> Self {
        Self {
            wayland_display: "westeros-rialto".to_owned(),
            wayland_display_subtitles: "westeros-rialto-subtitles".to_owned(),
        }
    }
}

/// Socket placement, permission bits and owning uid/gid for the
/// `NamedSocket` listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketSettings {
    #[serde(default = "default_socket_path")]
    pub path: PathBuf,
    #[serde(default = "default_socket_permissions")]
    pub permissions: u32,
    pub owner_uid: Option<u32>,
    pub owner_gid: Option<u32>,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            path: default_socket_path(),
            permissions: default_socket_permissions(),
            owner_uid: None,
            owner_gid: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RialtoConfig {
    /// Admission cap enforced by the Playback Service.
    #[serde(default = "default_max_playbacks")]
    pub max_playbacks: usize,
    #[serde(default = "default_max_web_audio_players")]
    pub max_web_audio_players: usize,
    pub socket: SocketSettings,
    #[serde(default = "default_shm_size_bytes")]
    pub shm_size_bytes: usize,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "default_underflow_margin_ms")]
    pub underflow_margin_ms: u64,
    pub wayland_env: WaylandEnv,
}

impl Default for RialtoConfig {
    fn default() -> Self {
        Self {
            max_playbacks: default_max_playbacks(),
            max_web_audio_players: default_max_web_audio_players(),
            socket: SocketSettings::default(),
            shm_size_bytes: default_shm_size_bytes(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            underflow_margin_ms: default_underflow_margin_ms(),
            wayland_env: WaylandEnv::default(),
        }
    }
}

impl RialtoConfig {
    /// Read a config file, creating one with defaults if it does not exist yet.
    pub fn from_file<P: AsRef<Path>>(path: P) -> RialtoResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            let config = Self::default();
            config.save_file(path)?;
            return Ok(config);
        }

        Figment::new()
            .merge(Toml::file(path))
            .extract()
            .map_err(|err| RialtoError::Setup(format!("failed to parse {}: {err}", path.display())))
    }

    pub fn from_default_path() -> RialtoResult<Self> {
        let path = get_app_config_path()
            .map_err(|err| RialtoError::Setup(err.to_string()))?
            .join(FILE_NAME);
        Self::from_file(path)
    }

    pub fn save_file<P: AsRef<Path>>(&self, path: P) -> RialtoResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| RialtoError::Setup(err.to_string()))?;
        }
        let data = toml::to_string_pretty(self)
            .map_err(|err| RialtoError::Setup(format!("failed to serialize config: {err}")))?;
        std::fs::write(path, data).map_err(|err| RialtoError::Setup(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = RialtoConfig::default();
        assert_eq!(cfg.max_playbacks, 2);
        assert_eq!(cfg.underflow_margin_ms, 350);
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = std::env::temp_dir().join(format!("rialto-cfg-test-{}", std::process::id()));
        let path = dir.join("rialto.toml");
        let cfg = RialtoConfig::from_file(&path).expect("bootstrap default config");
        assert_eq!(cfg.max_playbacks, 2);

        let reloaded = RialtoConfig::from_file(&path).expect("reload written config");
        assert_eq!(reloaded.socket.permissions, cfg.socket.permissions);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
