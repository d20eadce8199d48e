//! Common types and utilities for kabe.
//!
//! This crate defines the shared data structures and IPC protocol used for
//! communication between the daemon (`kabe`) and client (`kabectl`).
//!
//! # IPC Protocol
//!
//! Communication happens over a Unix domain socket using JSON-serialized
//! messages, one per line. The client sends [`Command`] variants and receives
//! [`Response`] variants.
//!
//! # Examples
//!
//! ```no_run
//! use common::{Command, WallpaperRequest};
//!
//! // Ask the daemon to set a looping video as the live wallpaper
//! let cmd = Command::SetLiveWallpaper(WallpaperRequest {
//!     video_path: Some("assets/media/rain.mp4".to_string()),
//!     thumb_path: Some("assets/thumbs/rain.webp".to_string()),
//!     kind: Some("live".to_string()),
//!     screen: Some("both".to_string()),
//! });
//!
//! // Serialize for sending over IPC
//! let json = serde_json::to_string(&cmd).unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::ops::BitOr;
use thiserror::Error;

/// Common error types shared between client and daemon.
///
/// All errors are serializable for transmission over IPC.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum WallpaperError {
    #[error("IPC error: {0}")]
    Ipc(String),

    /// The single failure outcome of a wallpaper request.
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for WallpaperError {
    fn from(e: serde_json::Error) -> Self {
        Self::Ipc(e.to_string())
    }
}

/// Commands sent from client to daemon via IPC.
#[derive(Debug, Serialize, Deserialize)]
pub enum Command {
    /// Set a static or live wallpaper from bundled assets.
    ///
    /// The daemon answers [`Response::Ok`] on success and
    /// [`WallpaperError::Unavailable`] on any failure.
    SetLiveWallpaper(WallpaperRequest),
    /// Report wallpaper visibility to the active renderer.
    SetVisibility { visible: bool },
    /// Tear down the active live wallpaper surface
    ClearLiveWallpaper,
    /// Query daemon status
    Query,
    /// Kill the daemon
    Kill,
    /// Ping the daemon
    Ping,
}

/// Response from daemon to client
#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Error(WallpaperError),
    Status(DaemonStatus),
    Pong,
    /// The daemon does not know the requested method
    NotImplemented,
}

/// Daemon status information
#[derive(Debug, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub version: String,
    pub uptime_secs: u64,
    /// Whether a live wallpaper renderer is currently instantiated
    pub live_active: bool,
    /// Persisted video path the renderer plays, if any
    pub video_path: Option<String>,
}

/// A wallpaper request as sent by the UI layer.
///
/// Every field may be missing on the wire; the daemon rejects the request
/// unless all four are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallpaperRequest {
    /// Bundled video asset path, e.g. `assets/media/rain.mp4`
    #[serde(default)]
    pub video_path: Option<String>,
    /// Bundled image asset path used for static wallpapers
    #[serde(default)]
    pub thumb_path: Option<String>,
    /// `"static"` or `"live"`
    #[serde(default)]
    pub kind: Option<String>,
    /// `"home"`, `"lock"` or `"both"`
    #[serde(default)]
    pub screen: Option<String>,
}

/// What kind of wallpaper to set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WallpaperKind {
    /// A single decoded image handed to the wallpaper manager
    Static,
    /// A looping muted video played by the live renderer
    Live,
}

impl WallpaperKind {
    /// Parse the wire name. Unknown names are rejected.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "static" => Some(Self::Static),
            "live" => Some(Self::Live),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Live => "live",
        }
    }
}

/// Which screen(s) a wallpaper applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScreenTarget {
    Home,
    Lock,
    #[default]
    Both,
}

impl ScreenTarget {
    /// Parse the wire name. Anything unrecognized targets both screens.
    pub fn parse(s: &str) -> Self {
        match s {
            "home" => Self::Home,
            "lock" => Self::Lock,
            _ => Self::Both,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Lock => "lock",
            Self::Both => "both",
        }
    }

    /// Wallpaper-manager flags for this target
    pub fn flags(&self) -> ScreenFlags {
        match self {
            Self::Home => ScreenFlags::SYSTEM,
            Self::Lock => ScreenFlags::LOCK,
            Self::Both => ScreenFlags::SYSTEM | ScreenFlags::LOCK,
        }
    }
}

/// Screen selection bits passed to the wallpaper manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenFlags(u8);

impl ScreenFlags {
    /// Home screen
    pub const SYSTEM: Self = Self(1);
    /// Lock screen
    pub const LOCK: Self = Self(2);

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ScreenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// IPC socket path helper
pub fn get_socket_path() -> std::path::PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));

    std::path::PathBuf::from(runtime_dir).join("kabe.sock")
}
