//! GStreamer setup for live wallpaper playback
//!
//! Playback uses a single `playbin`, which picks demuxers and decoders
//! (hardware ones when available) on its own. The surface decides the
//! video sink; audio is muted at the playbin.

use anyhow::{Context, Result};
use gstreamer as gst;
use gstreamer::prelude::*;
use std::path::Path;
use std::sync::OnceLock;

/// Initialize GStreamer (idempotent, safe to call multiple times)
pub fn initialize_gstreamer() -> Result<()> {
    static GSTREAMER_INITIALIZED: OnceLock<Result<(), String>> = OnceLock::new();

    GSTREAMER_INITIALIZED
        .get_or_init(|| {
            gst::init().map_err(|e| e.to_string())?;
            log::info!("GStreamer initialized");
            Ok(())
        })
        .clone()
        .map_err(|e| anyhow::anyhow!("Failed to initialize GStreamer: {}", e))
}

/// Create the playbin element that owns decoding and output
pub fn build_playbin() -> Result<gst::Element> {
    initialize_gstreamer()?;

    gst::ElementFactory::make("playbin")
        .name("kabe-playbin")
        .build()
        .context("Failed to create playbin (is gst-plugins-base installed?)")
}

/// Create the video sink that renders onto the wallpaper surface
pub fn build_video_sink(factory: &str) -> Result<gst::Element> {
    gst::ElementFactory::make(factory)
        .build()
        .with_context(|| format!("Failed to create video sink: {}", factory))
}

/// `file://` URI for a local video
pub fn file_uri(path: &Path) -> Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let uri = gst::glib::filename_to_uri(&absolute, None)
        .with_context(|| format!("Invalid video path: {}", absolute.display()))?;
    Ok(uri.to_string())
}

/// Wait for a pending state change to settle
pub fn wait_for_state(element: &gst::Element, timeout_secs: u64) -> Result<gst::State> {
    let (result, current, pending) = element.state(Some(gst::ClockTime::from_seconds(timeout_secs)));

    result.with_context(|| {
        format!(
            "State change failed (current={:?}, pending={:?})",
            current, pending
        )
    })?;

    Ok(current)
}
