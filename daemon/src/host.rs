//! Live wallpaper render host.
//!
//! Plays the part of the platform's wallpaper-rendering service: it keeps a
//! registry of wallpaper providers, instantiates the one a "change live
//! wallpaper" request names, and delivers lifecycle callbacks to it one at a
//! time from a single task.

use anyhow::Result;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

use crate::DaemonState;
use crate::renderer::{Surface, WallpaperEngine};
use crate::settings::{SettingsStore, VIDEO_PATH_KEY};

/// Identity of a live wallpaper provider
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderComponent {
    pub package: String,
    pub service: String,
}

impl ProviderComponent {
    pub fn new(package: &str, service: &str) -> Self {
        Self {
            package: package.to_string(),
            service: service.to_string(),
        }
    }

    /// The video renderer this daemon ships
    pub fn video_renderer() -> Self {
        Self::new("kabe", "VideoLiveWallpaperService")
    }
}

impl fmt::Display for ProviderComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.service)
    }
}

/// Events delivered to the render host
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// Switch the live wallpaper to `provider`
    ChangeLiveWallpaper { provider: ProviderComponent },
    /// The wallpaper became visible or hidden
    Visibility(bool),
    /// Remove the live wallpaper
    Clear,
}

/// Hands a live wallpaper selection off to whoever renders it
pub trait LiveWallpaperChooser: Send + Sync {
    /// Dispatch the selection. Returns once dispatched, not once applied.
    fn launch(&self, provider: &ProviderComponent) -> Result<()>;
}

/// Chooser that forwards the selection to the in-process render host
pub struct HostChooser {
    tx: mpsc::UnboundedSender<HostEvent>,
}

impl HostChooser {
    pub fn new(tx: mpsc::UnboundedSender<HostEvent>) -> Self {
        Self { tx }
    }
}

impl LiveWallpaperChooser for HostChooser {
    fn launch(&self, provider: &ProviderComponent) -> Result<()> {
        self.tx
            .send(HostEvent::ChangeLiveWallpaper {
                provider: provider.clone(),
            })
            .map_err(|e| anyhow::anyhow!("Render host is not running: {}", e))?;
        log::info!("Live wallpaper change dispatched: {}", provider);
        Ok(())
    }
}

type EngineFactory = Box<dyn Fn() -> Box<dyn WallpaperEngine> + Send>;

pub struct RenderHost {
    services: HashMap<ProviderComponent, EngineFactory>,
    surface: Surface,
    active: Option<(ProviderComponent, Box<dyn WallpaperEngine>)>,
}

impl RenderHost {
    pub fn new(surface: Surface) -> Self {
        Self {
            services: HashMap::new(),
            surface,
            active: None,
        }
    }

    /// Register a wallpaper service the host may instantiate
    pub fn register<F>(&mut self, provider: ProviderComponent, factory: F)
    where
        F: Fn() -> Box<dyn WallpaperEngine> + Send + 'static,
    {
        log::debug!("Registered wallpaper service: {}", provider);
        self.services.insert(provider, Box::new(factory));
    }

    pub fn active_provider(&self) -> Option<&ProviderComponent> {
        self.active.as_ref().map(|(provider, _)| provider)
    }

    pub fn handle(&mut self, event: HostEvent) {
        match event {
            HostEvent::ChangeLiveWallpaper { provider } => self.activate(provider),
            HostEvent::Visibility(visible) => {
                if let Some((_, engine)) = self.active.as_mut() {
                    log::debug!("Wallpaper visibility: {}", visible);
                    engine.on_visibility_changed(visible);
                }
            }
            HostEvent::Clear => self.deactivate(),
        }
    }

    pub fn tick(&mut self) {
        if let Some((_, engine)) = self.active.as_mut() {
            engine.tick();
        }
    }

    /// Tear down the active engine
    pub fn deactivate(&mut self) {
        if let Some((provider, mut engine)) = self.active.take() {
            log::info!("Destroying live wallpaper: {}", provider);
            engine.on_surface_destroyed();
        }
    }

    fn activate(&mut self, provider: ProviderComponent) {
        let Some(factory) = self.services.get(&provider) else {
            log::warn!("Unknown live wallpaper provider: {}", provider);
            return;
        };
        let mut engine = factory();

        // Any previous wallpaper gives up its surface first
        self.deactivate();

        log::info!("Activating live wallpaper: {}", provider);
        engine.on_create();
        engine.on_surface_created(&self.surface);
        self.active = Some((provider, engine));
    }
}

/// Re-instantiate the video renderer when a video path survived a restart.
///
/// Returns whether a change was dispatched.
pub fn restore(
    settings: &dyn SettingsStore,
    tx: &mpsc::UnboundedSender<HostEvent>,
    enabled: bool,
) -> bool {
    if !enabled || settings.get_string(VIDEO_PATH_KEY).is_none() {
        return false;
    }

    log::info!("Restoring live wallpaper from previous session");
    let event = HostEvent::ChangeLiveWallpaper {
        provider: ProviderComponent::video_renderer(),
    };
    if let Err(e) = tx.send(event) {
        log::error!("Failed to restore live wallpaper: {}", e);
        return false;
    }
    true
}

/// Run the host until the daemon exits
pub async fn run(
    host: RenderHost,
    state: Arc<Mutex<DaemonState>>,
    events: mpsc::UnboundedReceiver<HostEvent>,
    tick: Duration,
) -> Result<()> {
    // Renderer callbacks block on GStreamer state changes
    tokio::task::spawn_blocking(move || run_blocking(host, state, events, tick)).await?
}

fn run_blocking(
    mut host: RenderHost,
    state: Arc<Mutex<DaemonState>>,
    mut events: mpsc::UnboundedReceiver<HostEvent>,
    tick: Duration,
) -> Result<()> {
    'host: loop {
        if state.blocking_lock().should_exit {
            break;
        }

        loop {
            match events.try_recv() {
                Ok(event) => {
                    host.handle(event);
                    let active = host.active_provider().is_some();
                    state.blocking_lock().live_active = active;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    log::info!("Render host channel closed");
                    break 'host;
                }
            }
        }

        host.tick();
        std::thread::sleep(tick);
    }

    host.deactivate();
    state.blocking_lock().live_active = false;
    log::info!("Render host stopped");
    Ok(())
}
