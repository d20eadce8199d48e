//! [`MediaPlayer`] backed by a GStreamer `playbin`

use super::pipeline;
use crate::renderer::{MediaPlayer, Surface};
use anyhow::{Context, Result};
use gstreamer as gst;
use gstreamer::prelude::*;
use std::path::Path;

/// Seconds to wait for preroll before giving up
const PREPARE_TIMEOUT_SECS: u64 = 5;

pub struct GstPlayer {
    playbin: Option<gst::Element>,
    has_source: bool,
    looping: bool,
    is_playing: bool,
}

impl GstPlayer {
    pub fn new() -> Self {
        Self {
            playbin: None,
            has_source: false,
            looping: false,
            is_playing: false,
        }
    }

    fn playbin(&mut self) -> Result<&gst::Element> {
        if self.playbin.is_none() {
            self.playbin = Some(pipeline::build_playbin()?);
        }
        self.playbin
            .as_ref()
            .context("Playback session was released")
    }

    fn set_state(&mut self, state: gst::State) -> Result<()> {
        let playbin = self.playbin()?;
        playbin
            .set_state(state)
            .with_context(|| format!("Failed to set playbin to {:?}", state))?;
        Ok(())
    }
}

impl Default for GstPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaPlayer for GstPlayer {
    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn set_data_source(&mut self, path: &Path) -> Result<()> {
        let uri = pipeline::file_uri(path)?;
        log::debug!("Video data source: {}", uri);

        self.playbin()?.set_property("uri", uri.as_str());
        self.has_source = true;
        Ok(())
    }

    fn set_surface(&mut self, surface: &Surface) -> Result<()> {
        let sink = pipeline::build_video_sink(&surface.sink)?;
        self.playbin()?.set_property("video-sink", &sink);
        Ok(())
    }

    fn prepare(&mut self) -> Result<()> {
        if !self.has_source {
            anyhow::bail!("No data source set");
        }

        self.set_state(gst::State::Paused)?;
        let state = pipeline::wait_for_state(self.playbin()?, PREPARE_TIMEOUT_SECS)?;
        log::debug!("Video prerolled ({:?})", state);
        Ok(())
    }

    fn set_volume(&mut self, left: f32, right: f32) -> Result<()> {
        // playbin has a single volume; mute outright when both channels are silent
        let volume = left.max(right).clamp(0.0, 1.0) as f64;
        let playbin = self.playbin()?;
        playbin.set_property("volume", volume);
        playbin.set_property("mute", volume == 0.0);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.playbin.is_none() {
            return Ok(());
        }
        self.set_state(gst::State::Playing)?;
        self.is_playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        if self.playbin.is_none() {
            return Ok(());
        }
        self.set_state(gst::State::Paused)?;
        self.is_playing = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.playbin.is_none() {
            return Ok(());
        }
        self.set_state(gst::State::Ready)?;
        self.is_playing = false;
        Ok(())
    }

    fn release(&mut self) {
        if let Some(playbin) = self.playbin.take() {
            if let Err(e) = playbin.set_state(gst::State::Null) {
                log::warn!("Failed to set playbin state to Null: {}", e);
            }

            // Drain pending messages from bus
            if let Some(bus) = playbin.bus() {
                let mut drained = 0;
                while bus.pop().is_some() {
                    drained += 1;
                }
                if drained > 0 {
                    log::debug!("Drained {} pending messages from bus", drained);
                }
            }
        }
        self.has_source = false;
        self.is_playing = false;
    }

    fn poll(&mut self) {
        let Some(playbin) = self.playbin.as_ref() else {
            return;
        };
        let Some(bus) = playbin.bus() else {
            return;
        };

        // Drain ALL messages from the bus to prevent memory leak
        while let Some(msg) = bus.pop() {
            match msg.view() {
                gst::MessageView::Eos(_) => {
                    if self.looping {
                        log::debug!("Video reached EOS, looping...");
                        if let Err(e) = playbin.seek_simple(
                            gst::SeekFlags::FLUSH | gst::SeekFlags::KEY_UNIT,
                            gst::ClockTime::from_seconds(0),
                        ) {
                            log::warn!("Failed to loop video: {}", e);
                        }
                    } else {
                        log::info!("Video playback finished");
                        self.is_playing = false;
                    }
                }

                gst::MessageView::Error(err) => {
                    log::error!(
                        "GStreamer error: {} (debug: {:?})",
                        err.error(),
                        err.debug()
                    );
                    self.is_playing = false;
                }

                _ => {}
            }
        }
    }

    fn is_playing(&self) -> bool {
        self.is_playing
    }
}

impl Drop for GstPlayer {
    fn drop(&mut self) {
        if self.playbin.is_some() {
            self.release();
        }
    }
}
