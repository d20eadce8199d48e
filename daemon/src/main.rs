mod assets;
mod config;
mod handler;
mod host;
mod ipc_server;
mod macros;
mod renderer;
mod settings;
mod video;
mod wallpaper_manager;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

use crate::host::{HostChooser, ProviderComponent, RenderHost};
use crate::renderer::{MediaPlayer, Surface, VideoEngine, WallpaperEngine};
use crate::settings::{JsonSettings, SettingsStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration before logging so the configured level applies
    let config_path = config::Config::default_config_path()?;
    let config_result = config::Config::load();
    let log_level = config_result
        .as_ref()
        .map(|cfg| cfg.general.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    log::info!("Starting kabe wallpaper daemon v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Looking for config at: {}", config_path.display());

    let config = match config_result {
        Ok(cfg) => {
            log::info!("✓ Configuration loaded successfully");
            log::info!("  Asset bundle: {}", cfg.asset_root().display());
            log::info!("  Private storage: {}", cfg.data_dir().display());
            log::info!("  Static backend: {}", cfg.static_wallpaper.backend);
            log::info!("  Video sink: {}", cfg.renderer.video_sink);
            cfg
        }
        Err(e) => {
            log::warn!("Failed to load config: {}. Using defaults.", e);
            config::Config::default()
        }
    };

    #[cfg(not(feature = "video"))]
    log::warn!("Video support not compiled (build with --features video to enable)");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    let json_settings = JsonSettings::open(&data_dir)?;
    log::info!("Settings file: {}", json_settings.path().display());
    let settings: Arc<dyn SettingsStore> = Arc::new(json_settings);

    // Channel from the request handler / IPC to the render host
    let (host_tx, host_rx) = mpsc::unbounded_channel();

    let handler = handler::WallpaperHandler::new(
        assets::BundledAssets::new(config.asset_root()),
        config.files_dir(),
        settings.clone(),
        wallpaper_manager::from_config(&config),
        Box::new(HostChooser::new(host_tx.clone())),
    );

    let mut render_host = RenderHost::new(Surface::new(config.renderer.video_sink.clone()));
    let engine_settings = settings.clone();
    render_host.register(ProviderComponent::video_renderer(), move || {
        Box::new(VideoEngine::new(engine_settings.clone(), || {
            Box::new(video::GstPlayer::new()) as Box<dyn MediaPlayer>
        })) as Box<dyn WallpaperEngine>
    });

    host::restore(settings.as_ref(), &host_tx, config.renderer.restore_on_start);

    let state = Arc::new(Mutex::new(DaemonState::new()));

    // Start IPC server
    let ipc_state = state.clone();
    let ipc_ctx = ipc_server::IpcContext {
        handler: Arc::new(handler),
        settings: settings.clone(),
        host_tx,
    };
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server::start(ipc_state.clone(), ipc_ctx).await {
            log::error!("IPC server error: {}", e);
            ipc_state.lock().await.should_exit = true;
        }
    });

    // Start render host
    let host_state = state.clone();
    let tick = Duration::from_millis(config.renderer.tick_ms);
    let host_handle = tokio::spawn(async move {
        if let Err(e) = host::run(render_host, host_state.clone(), host_rx, tick).await {
            log::error!("Render host error: {}", e);
            host_state.lock().await.should_exit = true;
        }
    });

    // Set up signal handlers
    let signal_state = state.clone();
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                log::info!("Received SIGTERM, shutting down...");
            }
            _ = sigint.recv() => {
                log::info!("Received SIGINT, shutting down...");
            }
        }

        signal_state.lock().await.should_exit = true;
    });

    // Both tasks watch `should_exit`; the host releases its renderer on the way out
    let (ipc_result, host_result) = tokio::join!(ipc_handle, host_handle);
    if let Err(e) = ipc_result {
        log::error!("IPC server task failed: {}", e);
    }
    if let Err(e) = host_result {
        log::error!("Render host task failed: {}", e);
    }

    log::info!("Daemon shutting down");
    Ok(())
}

/// Shared daemon state
pub struct DaemonState {
    pub should_exit: bool,
    pub start_time: std::time::Instant,
    /// A live wallpaper renderer is instantiated by the render host
    pub live_active: bool,
}

impl DaemonState {
    fn new() -> Self {
        Self {
            should_exit: false,
            start_time: std::time::Instant::now(),
            live_active: false,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
