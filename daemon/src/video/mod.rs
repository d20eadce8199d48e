//! Video playback for the live wallpaper renderer
//!
//! - `pipeline`: GStreamer initialization and element construction
//! - `player`: [`GstPlayer`], the `MediaPlayer` the renderer drives
//!
//! Built without the `video` feature, [`GstPlayer`] is a stub that refuses
//! to prepare, so the renderer leaves its surface blank.

#[cfg(feature = "video")]
mod pipeline;
#[cfg(feature = "video")]
mod player;

#[cfg(feature = "video")]
pub use player::GstPlayer;

#[cfg(not(feature = "video"))]
pub use player_stub::GstPlayer;

#[cfg(not(feature = "video"))]
mod player_stub {
    use crate::renderer::{MediaPlayer, Surface};
    use anyhow::Result;
    use std::path::Path;

    /// Stub player when video feature is disabled
    #[derive(Default)]
    pub struct GstPlayer;

    impl GstPlayer {
        pub fn new() -> Self {
            Self
        }
    }

    impl MediaPlayer for GstPlayer {
        fn set_looping(&mut self, _looping: bool) {}

        fn set_data_source(&mut self, _path: &Path) -> Result<()> {
            anyhow::bail!("Video support not compiled in")
        }

        fn set_surface(&mut self, _surface: &Surface) -> Result<()> {
            anyhow::bail!("Video support not compiled in")
        }

        fn prepare(&mut self) -> Result<()> {
            anyhow::bail!("Video support not compiled in")
        }

        fn set_volume(&mut self, _left: f32, _right: f32) -> Result<()> {
            Ok(())
        }

        fn start(&mut self) -> Result<()> {
            Ok(())
        }

        fn pause(&mut self) -> Result<()> {
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            Ok(())
        }

        fn release(&mut self) {}

        fn is_playing(&self) -> bool {
            false
        }
    }
}
