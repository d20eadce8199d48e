use anyhow::Result;
use common::{Command, DaemonStatus, Response, WallpaperError};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, mpsc};

use crate::DaemonState;
use crate::handler::WallpaperHandler;
use crate::host::HostEvent;
use crate::settings::{SettingsStore, VIDEO_PATH_KEY};

/// Everything a client command may touch besides daemon state
#[derive(Clone)]
pub struct IpcContext {
    pub handler: Arc<WallpaperHandler>,
    pub settings: Arc<dyn SettingsStore>,
    pub host_tx: mpsc::UnboundedSender<HostEvent>,
}

pub async fn start(state: Arc<Mutex<DaemonState>>, ctx: IpcContext) -> Result<()> {
    let socket_path = common::get_socket_path();

    // Remove old socket if it exists
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }

    let listener = UnixListener::bind(&socket_path)?;
    log::info!("IPC server listening on: {}", socket_path.display());

    loop {
        // Check if we should exit
        if state.lock().await.should_exit {
            break;
        }

        // Accept connections with timeout
        let accept_result =
            tokio::time::timeout(std::time::Duration::from_millis(100), listener.accept()).await;

        match accept_result {
            Ok(Ok((stream, _addr))) => {
                let state = state.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, state, ctx).await {
                        log::error!("Error handling client: {}", e);
                    }
                });
            }
            Ok(Err(e)) => {
                log::error!("Error accepting connection: {}", e);
            }
            Err(_) => {
                // Timeout, continue loop to check exit condition
                continue;
            }
        }
    }

    // Clean up socket
    let _ = std::fs::remove_file(&socket_path);
    log::info!("IPC server stopped");
    Ok(())
}

async fn handle_client(
    stream: UnixStream,
    state: Arc<Mutex<DaemonState>>,
    ctx: IpcContext,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match parse_command(&line) {
            Ok(command) => handle_command(command, &state, &ctx).await,
            Err(response) => response,
        };

        // Send response
        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        line.clear();
    }

    Ok(())
}

/// Parse one request line. Well-formed JSON naming an unknown method is
/// answered with `NotImplemented`, anything else with an IPC error.
fn parse_command(line: &str) -> Result<Command, Response> {
    match serde_json::from_str::<Command>(line) {
        Ok(command) => Ok(command),
        Err(e) if serde_json::from_str::<serde_json::Value>(line).is_ok() => {
            log::warn!("Unsupported command: {}", e);
            Err(Response::NotImplemented)
        }
        Err(e) => {
            log::warn!("Invalid command: {}", e);
            Err(Response::Error(e.into()))
        }
    }
}

async fn handle_command(
    command: Command,
    state: &Arc<Mutex<DaemonState>>,
    ctx: &IpcContext,
) -> Response {
    log::debug!("Handling command: {:?}", command);

    match command {
        Command::Ping => Response::Pong,

        Command::Query => {
            let state = state.lock().await;
            Response::Status(DaemonStatus {
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_secs: state.uptime_secs(),
                live_active: state.live_active,
                video_path: ctx.settings.get_string(VIDEO_PATH_KEY),
            })
        }

        Command::SetLiveWallpaper(request) => {
            let handler = ctx.handler.clone();

            // Decode, copy and backend calls block; keep them off the runtime threads
            let success = tokio::task::spawn_blocking(move || handler.set_wallpaper(&request))
                .await
                .unwrap_or_else(|e| {
                    log::error!("Wallpaper request task failed: {}", e);
                    false
                });

            if success {
                Response::Ok
            } else {
                Response::Error(WallpaperError::Unavailable(
                    "Failed to set wallpaper".to_string(),
                ))
            }
        }

        Command::SetVisibility { visible } => send_to_host(ctx, HostEvent::Visibility(visible)),

        Command::ClearLiveWallpaper => {
            if let Err(e) = ctx.settings.remove(VIDEO_PATH_KEY) {
                log::warn!("Failed to forget live wallpaper video: {}", e);
            }
            send_to_host(ctx, HostEvent::Clear)
        }

        Command::Kill => {
            log::info!("Received kill command");
            state.lock().await.should_exit = true;
            Response::Ok
        }
    }
}

fn send_to_host(ctx: &IpcContext, event: HostEvent) -> Response {
    if let Err(e) = ctx.host_tx.send(event) {
        return Response::Error(WallpaperError::Ipc(format!(
            "Failed to send command to render host: {}",
            e
        )));
    }
    Response::Ok
}
