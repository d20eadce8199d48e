//! Live wallpaper rendering contract and the video renderer.
//!
//! The render host drives a [`WallpaperEngine`] through its lifecycle, one
//! callback at a time:
//!
//! ```text
//! on_create -> on_surface_created -> (on_visibility_changed)* -> on_surface_destroyed
//! ```
//!
//! [`VideoEngine`] plays the video whose path the request handler persisted,
//! muted and looping, onto the host-provided [`Surface`].

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::log_and_continue;
use crate::settings::{SettingsStore, VIDEO_PATH_KEY};

/// Drawing surface handed to a renderer by the host.
///
/// On desktop this names the GStreamer sink that owns the output window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub sink: String,
}

impl Surface {
    pub fn new(sink: impl Into<String>) -> Self {
        Self { sink: sink.into() }
    }
}

/// Lifecycle callbacks a live wallpaper renderer implements
pub trait WallpaperEngine: Send {
    fn on_create(&mut self);
    fn on_surface_created(&mut self, surface: &Surface);
    fn on_visibility_changed(&mut self, visible: bool);
    fn on_surface_destroyed(&mut self);

    /// Periodic housekeeping between callbacks
    fn tick(&mut self) {}
}

/// Decode/playback session bound to a surface
pub trait MediaPlayer: Send {
    fn set_looping(&mut self, looping: bool);
    fn set_data_source(&mut self, path: &Path) -> Result<()>;
    fn set_surface(&mut self, surface: &Surface) -> Result<()>;
    /// Preroll the source so `start` can begin immediately
    fn prepare(&mut self) -> Result<()>;
    /// Per-channel volume in `0.0..=1.0`
    fn set_volume(&mut self, left: f32, right: f32) -> Result<()>;
    fn start(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn release(&mut self);
    /// Drain pending player events (end of stream, errors)
    fn poll(&mut self) {}
    fn is_playing(&self) -> bool;
}

/// Where a [`VideoEngine`] is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Constructed, `on_create` not yet called
    New,
    Created,
    SurfaceReady { visible: bool },
    Destroyed,
}

type PlayerFactory = Box<dyn Fn() -> Box<dyn MediaPlayer> + Send>;

/// Video live wallpaper renderer
pub struct VideoEngine {
    settings: Arc<dyn SettingsStore>,
    new_player: PlayerFactory,
    player: Option<Box<dyn MediaPlayer>>,
    state: EngineState,
    video_path: Option<PathBuf>,
}

impl VideoEngine {
    pub fn new<F>(settings: Arc<dyn SettingsStore>, new_player: F) -> Self
    where
        F: Fn() -> Box<dyn MediaPlayer> + Send + 'static,
    {
        Self {
            settings,
            new_player: Box::new(new_player),
            player: None,
            state: EngineState::New,
            video_path: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Video currently bound to the player, if playback was started
    pub fn video_path(&self) -> Option<&Path> {
        self.video_path.as_deref()
    }

    pub fn is_playing(&self) -> bool {
        self.player.as_ref().is_some_and(|p| p.is_playing())
    }

    pub fn has_player(&self) -> bool {
        self.player.is_some()
    }

    /// Persisted video path, only if it names an existing file
    fn playable_path(&self) -> Option<PathBuf> {
        let Some(path) = self.settings.get_string(VIDEO_PATH_KEY) else {
            log::info!("No live wallpaper video configured, leaving surface blank");
            return None;
        };

        let path = PathBuf::from(path);
        if !path.is_file() {
            log::warn!(
                "Live wallpaper video missing, leaving surface blank: {}",
                path.display()
            );
            return None;
        }

        Some(path)
    }

    fn start_playback(&mut self, path: &Path, surface: &Surface) -> Result<()> {
        let player = self
            .player
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("No playback session"))?;

        player.set_data_source(path)?;
        player.set_surface(surface)?;
        player.prepare()?;
        player.set_volume(0.0, 0.0)?;
        player.start()?;
        Ok(())
    }
}

impl WallpaperEngine for VideoEngine {
    fn on_create(&mut self) {
        let mut player = (self.new_player)();
        player.set_looping(true);
        self.player = Some(player);
        self.state = EngineState::Created;
    }

    fn on_surface_created(&mut self, surface: &Surface) {
        self.state = EngineState::SurfaceReady { visible: true };

        let Some(path) = self.playable_path() else {
            return;
        };

        match self.start_playback(&path, surface) {
            Ok(()) => {
                log::info!(
                    "Started silent live video wallpaper: {} (sink: {})",
                    path.display(),
                    surface.sink
                );
                self.video_path = Some(path);
            }
            Err(e) => {
                log::error!("Error setting up video live wallpaper: {:#}", e);
            }
        }
    }

    fn on_visibility_changed(&mut self, visible: bool) {
        if let EngineState::SurfaceReady { .. } = self.state {
            self.state = EngineState::SurfaceReady { visible };
        }

        // Nothing bound means nothing to resume
        if self.video_path.is_none() {
            return;
        }

        if let Some(player) = self.player.as_mut() {
            if visible {
                log_and_continue!(player.start(), "resume video playback");
            } else {
                log_and_continue!(player.pause(), "pause video playback");
            }
        }
    }

    fn on_surface_destroyed(&mut self) {
        if let Some(mut player) = self.player.take() {
            log_and_continue!(player.stop(), "stop video playback");
            player.release();
            log::info!("Live video wallpaper released");
        }
        self.video_path = None;
        self.state = EngineState::Destroyed;
    }

    fn tick(&mut self) {
        if let Some(player) = self.player.as_mut() {
            player.poll();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettings;
    use std::sync::Mutex;

    /// Calls recorded by [`FakePlayer`], shared with the test
    #[derive(Debug, Default)]
    pub struct PlayerLog {
        pub calls: Vec<String>,
        pub looping: bool,
        pub volume: Option<(f32, f32)>,
        pub playing: bool,
        pub released: bool,
        pub live_players: i32,
    }

    pub struct FakePlayer {
        log: Arc<Mutex<PlayerLog>>,
        fail_prepare: bool,
    }

    impl FakePlayer {
        pub fn factory(
            log: Arc<Mutex<PlayerLog>>,
            fail_prepare: bool,
        ) -> impl Fn() -> Box<dyn MediaPlayer> + Send + 'static {
            move || {
                log.lock().unwrap().live_players += 1;
                Box::new(FakePlayer {
                    log: log.clone(),
                    fail_prepare,
                }) as Box<dyn MediaPlayer>
            }
        }

        fn record(&self, call: &str) {
            self.log.lock().unwrap().calls.push(call.to_string());
        }
    }

    impl MediaPlayer for FakePlayer {
        fn set_looping(&mut self, looping: bool) {
            self.record("set_looping");
            self.log.lock().unwrap().looping = looping;
        }

        fn set_data_source(&mut self, _path: &Path) -> Result<()> {
            self.record("set_data_source");
            Ok(())
        }

        fn set_surface(&mut self, _surface: &Surface) -> Result<()> {
            self.record("set_surface");
            Ok(())
        }

        fn prepare(&mut self) -> Result<()> {
            self.record("prepare");
            if self.fail_prepare {
                anyhow::bail!("decoder unavailable");
            }
            Ok(())
        }

        fn set_volume(&mut self, left: f32, right: f32) -> Result<()> {
            self.record("set_volume");
            self.log.lock().unwrap().volume = Some((left, right));
            Ok(())
        }

        fn start(&mut self) -> Result<()> {
            self.record("start");
            self.log.lock().unwrap().playing = true;
            Ok(())
        }

        fn pause(&mut self) -> Result<()> {
            self.record("pause");
            self.log.lock().unwrap().playing = false;
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.record("stop");
            self.log.lock().unwrap().playing = false;
            Ok(())
        }

        fn release(&mut self) {
            self.record("release");
            let mut log = self.log.lock().unwrap();
            log.released = true;
            log.live_players -= 1;
        }

        fn poll(&mut self) {
            self.record("poll");
        }

        fn is_playing(&self) -> bool {
            self.log.lock().unwrap().playing
        }
    }

    fn engine_with(
        settings: Arc<dyn SettingsStore>,
        fail_prepare: bool,
    ) -> (VideoEngine, Arc<Mutex<PlayerLog>>) {
        let log = Arc::new(Mutex::new(PlayerLog::default()));
        let engine = VideoEngine::new(settings, FakePlayer::factory(log.clone(), fail_prepare));
        (engine, log)
    }

    fn settings_with_video() -> (Arc<MemorySettings>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"not really a video").unwrap();

        let settings = Arc::new(MemorySettings::new());
        settings
            .put_string(VIDEO_PATH_KEY, video.to_str().unwrap())
            .unwrap();
        (settings, dir)
    }

    #[test]
    fn test_create_allocates_looping_player() {
        let (mut engine, log) = engine_with(Arc::new(MemorySettings::new()), false);
        assert_eq!(engine.state(), EngineState::New);
        assert!(!engine.has_player());

        engine.on_create();
        assert_eq!(engine.state(), EngineState::Created);
        assert!(engine.has_player());
        assert!(log.lock().unwrap().looping);
    }

    #[test]
    fn test_surface_ready_plays_muted_and_looping() {
        let (settings, _dir) = settings_with_video();
        let (mut engine, log) = engine_with(settings, false);

        engine.on_create();
        engine.on_surface_created(&Surface::new("fakesink"));

        assert_eq!(engine.state(), EngineState::SurfaceReady { visible: true });
        assert!(engine.is_playing());
        assert!(engine.video_path().is_some());

        let log = log.lock().unwrap();
        assert!(log.looping);
        assert_eq!(log.volume, Some((0.0, 0.0)));
        assert_eq!(
            log.calls,
            vec![
                "set_looping",
                "set_data_source",
                "set_surface",
                "prepare",
                "set_volume",
                "start"
            ]
        );
    }

    #[test]
    fn test_surface_destroyed_releases_player() {
        let (settings, _dir) = settings_with_video();
        let (mut engine, log) = engine_with(settings, false);

        engine.on_create();
        engine.on_surface_created(&Surface::new("fakesink"));
        engine.on_surface_destroyed();

        assert_eq!(engine.state(), EngineState::Destroyed);
        assert!(!engine.has_player());
        assert!(!engine.is_playing());

        let log = log.lock().unwrap();
        assert!(log.released);
        assert_eq!(log.live_players, 0);
        assert_eq!(&log.calls[log.calls.len() - 2..], &["stop", "release"]);
    }

    #[test]
    fn test_no_persisted_path_skips_playback() {
        let (mut engine, log) = engine_with(Arc::new(MemorySettings::new()), false);

        engine.on_create();
        engine.on_surface_created(&Surface::new("fakesink"));

        assert_eq!(engine.state(), EngineState::SurfaceReady { visible: true });
        assert!(!engine.is_playing());
        assert!(engine.video_path().is_none());
        assert_eq!(log.lock().unwrap().calls, vec!["set_looping"]);
    }

    #[test]
    fn test_missing_file_skips_playback() {
        let settings = Arc::new(MemorySettings::new());
        settings
            .put_string(VIDEO_PATH_KEY, "/nonexistent/kabe/clip.mp4")
            .unwrap();
        let (mut engine, log) = engine_with(settings, false);

        engine.on_create();
        engine.on_surface_created(&Surface::new("fakesink"));

        assert!(!engine.is_playing());
        assert!(!log.lock().unwrap().calls.contains(&"set_data_source".to_string()));
    }

    #[test]
    fn test_setup_failure_is_swallowed() {
        let (settings, _dir) = settings_with_video();
        let (mut engine, log) = engine_with(settings, true);

        engine.on_create();
        engine.on_surface_created(&Surface::new("fakesink"));

        assert_eq!(engine.state(), EngineState::SurfaceReady { visible: true });
        assert!(!engine.is_playing());
        assert!(engine.video_path().is_none());
        assert!(!log.lock().unwrap().calls.contains(&"start".to_string()));

        // Teardown still releases the session
        engine.on_surface_destroyed();
        assert!(log.lock().unwrap().released);
    }

    #[test]
    fn test_visibility_pauses_and_resumes() {
        let (settings, _dir) = settings_with_video();
        let (mut engine, log) = engine_with(settings, false);

        engine.on_create();
        engine.on_surface_created(&Surface::new("fakesink"));

        engine.on_visibility_changed(false);
        assert_eq!(engine.state(), EngineState::SurfaceReady { visible: false });
        assert!(!engine.is_playing());

        engine.on_visibility_changed(true);
        assert_eq!(engine.state(), EngineState::SurfaceReady { visible: true });
        assert!(engine.is_playing());

        let log = log.lock().unwrap();
        assert_eq!(&log.calls[log.calls.len() - 2..], &["pause", "start"]);
    }

    #[test]
    fn test_visibility_without_video_does_not_start() {
        let (mut engine, log) = engine_with(Arc::new(MemorySettings::new()), false);

        engine.on_create();
        engine.on_surface_created(&Surface::new("fakesink"));
        engine.on_visibility_changed(false);
        engine.on_visibility_changed(true);

        assert!(!engine.is_playing());
        assert_eq!(log.lock().unwrap().calls, vec!["set_looping"]);
    }

    #[test]
    fn test_tick_polls_player() {
        let (mut engine, log) = engine_with(Arc::new(MemorySettings::new()), false);
        engine.tick();
        assert!(log.lock().unwrap().calls.is_empty());

        engine.on_create();
        engine.tick();
        assert_eq!(log.lock().unwrap().calls.last().map(String::as_str), Some("poll"));
    }
}
