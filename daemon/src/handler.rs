//! Wallpaper request handler.
//!
//! Turns one UI request into exactly one platform side effect:
//!
//! - `static`: decode the bundled image and hand it to the
//!   [`WallpaperManager`], as a PNG stream with screen flags when the
//!   backend supports them, as a bitmap for both screens otherwise.
//! - `live`: copy the bundled video into private storage, persist its path
//!   for the renderer, and dispatch the live wallpaper change.
//!
//! Every failure collapses to `false`; the cause is only logged.

use anyhow::{Context, Result};
use common::{ScreenTarget, WallpaperKind, WallpaperRequest};
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use crate::assets::{BundledAssets, strip_bundle_prefix};
use crate::host::{LiveWallpaperChooser, ProviderComponent};
use crate::settings::{SettingsStore, VIDEO_PATH_KEY};
use crate::wallpaper_manager::{WallpaperManager, encode_png};

/// A request with every field present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub video_path: String,
    pub thumb_path: String,
    pub kind: String,
    pub screen: ScreenTarget,
}

impl ValidatedRequest {
    /// `None` if any field is missing
    pub fn from_request(request: &WallpaperRequest) -> Option<Self> {
        Some(Self {
            video_path: request.video_path.clone()?,
            thumb_path: request.thumb_path.clone()?,
            kind: request.kind.clone()?,
            screen: ScreenTarget::parse(request.screen.as_deref()?),
        })
    }
}

pub struct WallpaperHandler {
    assets: BundledAssets,
    files_dir: PathBuf,
    settings: Arc<dyn SettingsStore>,
    manager: Box<dyn WallpaperManager>,
    chooser: Box<dyn LiveWallpaperChooser>,
    provider: ProviderComponent,
}

impl WallpaperHandler {
    pub fn new(
        assets: BundledAssets,
        files_dir: PathBuf,
        settings: Arc<dyn SettingsStore>,
        manager: Box<dyn WallpaperManager>,
        chooser: Box<dyn LiveWallpaperChooser>,
    ) -> Self {
        Self {
            assets,
            files_dir,
            settings,
            manager,
            chooser,
            provider: ProviderComponent::video_renderer(),
        }
    }

    /// Handle one request. `true` only if the side effect was carried out.
    pub fn set_wallpaper(&self, request: &WallpaperRequest) -> bool {
        let Some(request) = ValidatedRequest::from_request(request) else {
            log::warn!("Rejecting wallpaper request with missing fields: {:?}", request);
            return false;
        };

        let Some(kind) = WallpaperKind::from_str(&request.kind) else {
            log::warn!("Unknown wallpaper type: {}", request.kind);
            return false;
        };

        log::info!(
            "Setting {} wallpaper on {} screen(s)",
            kind.name(),
            request.screen.name()
        );

        let result = match kind {
            WallpaperKind::Static => self.set_static_wallpaper(&request.thumb_path, request.screen),
            WallpaperKind::Live => {
                self.set_video_live_wallpaper(&request.video_path, request.screen)
            }
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to set {} wallpaper: {:#}", kind.name(), e);
                false
            }
        }
    }

    fn set_static_wallpaper(&self, thumb_path: &str, screen: ScreenTarget) -> Result<()> {
        let file = self.assets.open(thumb_path)?;
        let image = image::ImageReader::new(BufReader::new(file))
            .with_guessed_format()
            .context("Failed to read image asset")?
            .decode()
            .with_context(|| format!("Failed to decode image asset: {}", thumb_path))?;

        log::debug!(
            "Decoded {}: {}x{}",
            thumb_path,
            image.width(),
            image.height()
        );

        if self.manager.supports_screen_flags() {
            let bytes = encode_png(&image)?;
            self.manager.set_stream(&bytes, screen.flags())?;
        } else {
            if screen != ScreenTarget::Both {
                log::info!(
                    "Wallpaper backend cannot target the {} screen alone, applying to both",
                    screen.name()
                );
            }
            self.manager.set_bitmap(&image)?;
        }

        Ok(())
    }

    fn set_video_live_wallpaper(&self, video_path: &str, screen: ScreenTarget) -> Result<()> {
        let internal_video = self.copy_asset_to_private_storage(video_path)?;

        let path_str = internal_video
            .to_str()
            .context("Copied video path is not valid UTF-8")?;
        self.settings.put_string(VIDEO_PATH_KEY, path_str)?;

        // Screen choice is made by whoever completes the selection
        log::debug!(
            "Requested {} screen(s) for live wallpaper; deferring to chooser",
            screen.name()
        );
        self.chooser.launch(&self.provider)?;

        Ok(())
    }

    /// Copy a bundled asset under `files_dir`, creating parent directories
    pub fn copy_asset_to_private_storage(&self, asset_path: &str) -> Result<PathBuf> {
        let mut input = self.assets.open(asset_path)?;

        let target = self.files_dir.join(strip_bundle_prefix(asset_path));
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut output = std::fs::File::create(&target)
            .with_context(|| format!("Failed to create {}", target.display()))?;
        let copied = std::io::copy(&mut input, &mut output)
            .with_context(|| format!("Failed to copy {} to private storage", asset_path))?;
        output.sync_all()?;

        log::info!("Copied {} ({} bytes) to {}", asset_path, copied, target.display());

        Ok(std::path::absolute(&target)?)
    }
}
