use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use crate::validate_enum;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub static_wallpaper: StaticWallpaperSettings,

    #[serde(default)]
    pub renderer: RendererSettings,
}

/// General daemon settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where bundled assets are read from and private data is written to
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    /// Root of the read-only asset bundle. Request asset paths are relative to it.
    #[serde(default = "default_asset_root")]
    pub asset_root: String,

    /// Private storage: copied videos, settings file, encoded static wallpapers
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            asset_root: default_asset_root(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_asset_root() -> String {
    "~/.local/share/kabe/bundle".to_string()
}
fn default_data_dir() -> String {
    "~/.local/share/kabe".to_string()
}

/// Static image wallpaper backend
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticWallpaperSettings {
    /// `gnome` (per-screen) or `command` (always both screens)
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Command template for the `command` backend; `{path}` is replaced
    /// with the encoded wallpaper file
    #[serde(default = "default_command")]
    pub command: String,
}

impl Default for StaticWallpaperSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            command: default_command(),
        }
    }
}

fn default_backend() -> String {
    "gnome".to_string()
}
fn default_command() -> String {
    "feh --bg-fill {path}".to_string()
}

/// Live wallpaper render host settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RendererSettings {
    /// GStreamer sink factory that provides the drawing surface
    #[serde(default = "default_video_sink")]
    pub video_sink: String,

    /// Re-instantiate the video renderer at startup if a video path is persisted
    #[serde(default = "default_true")]
    pub restore_on_start: bool,

    /// Interval between renderer ticks (bus draining, looping)
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            video_sink: default_video_sink(),
            restore_on_start: true,
            tick_ms: default_tick_ms(),
        }
    }
}

fn default_video_sink() -> String {
    "autovideosink".to_string()
}
fn default_true() -> bool {
    true
}
fn default_tick_ms() -> u64 {
    50
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded configuration from {}", path.display());
        config.validate()?;

        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("kabe");

        Ok(config_dir.join("config.toml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        Self::validate_log_level(&self.general.log_level)?;
        Self::validate_backend(&self.static_wallpaper.backend)?;

        if self.static_wallpaper.backend == "command"
            && !self.static_wallpaper.command.contains("{path}")
        {
            anyhow::bail!(
                "static_wallpaper.command must contain {{path}}: {}",
                self.static_wallpaper.command
            );
        }

        if self.renderer.video_sink.trim().is_empty() {
            anyhow::bail!("renderer.video_sink must not be empty");
        }

        if self.renderer.tick_ms == 0 {
            anyhow::bail!("renderer.tick_ms must be greater than zero");
        }

        Ok(())
    }

    fn validate_log_level(level: &str) -> Result<()> {
        validate_enum!(level, "trace", "debug", "info", "warn", "error")
    }

    fn validate_backend(backend: &str) -> Result<()> {
        validate_enum!(backend, "gnome", "command")
    }

    /// Bundled asset root with `~` expanded
    pub fn asset_root(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.storage.asset_root).to_string())
    }

    /// Private data directory with `~` expanded
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.storage.data_dir).to_string())
    }

    /// Private storage for copied assets
    pub fn files_dir(&self) -> PathBuf {
        self.data_dir().join("files")
    }
}
