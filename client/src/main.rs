use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use common::{Command, Response, WallpaperRequest};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "kabectl")]
#[command(about = "kabe wallpaper daemon control", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set a static or live wallpaper from bundled assets
    Set {
        /// Wallpaper type
        #[arg(short = 't', long = "type", value_enum, default_value = "live")]
        kind: KindArg,

        /// Target screen(s)
        #[arg(short, long, value_enum, default_value = "both")]
        screen: ScreenArg,

        /// Bundled video asset (e.g. assets/media/rain.mp4)
        #[arg(short, long, env = "KABE_VIDEO")]
        video: Option<String>,

        /// Bundled image asset (e.g. assets/thumbs/rain.webp)
        #[arg(long, env = "KABE_THUMB")]
        thumb: Option<String>,
    },

    /// Tell the live wallpaper it is shown or hidden
    Visibility {
        #[arg(value_enum)]
        state: VisibilityArg,
    },

    /// Remove the live wallpaper
    Clear,

    /// Query daemon status
    Query,

    /// Kill the running daemon
    Kill,

    /// Ping the daemon to check if it's running
    Ping,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Static,
    Live,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScreenArg {
    Home,
    Lock,
    Both,
}

#[derive(Clone, Copy, ValueEnum)]
enum VisibilityArg {
    Show,
    Hide,
}

impl KindArg {
    fn wire_name(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Live => "live",
        }
    }
}

impl ScreenArg {
    fn wire_name(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Lock => "lock",
            Self::Both => "both",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Set {
            kind,
            screen,
            video,
            thumb,
        } => Command::SetLiveWallpaper(WallpaperRequest {
            video_path: video,
            thumb_path: thumb,
            kind: Some(kind.wire_name().to_string()),
            screen: Some(screen.wire_name().to_string()),
        }),
        Commands::Visibility { state } => Command::SetVisibility {
            visible: matches!(state, VisibilityArg::Show),
        },
        Commands::Clear => Command::ClearLiveWallpaper,
        Commands::Query => Command::Query,
        Commands::Kill => Command::Kill,
        Commands::Ping => Command::Ping,
    };

    match send_command(command).await {
        Ok(response) => {
            handle_response(response);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("\nIs the daemon running? Try starting it with: kabe");
            std::process::exit(1);
        }
    }
}

async fn send_command(command: Command) -> Result<Response> {
    let socket_path = common::get_socket_path();

    let stream = UnixStream::connect(&socket_path).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Send command
    let command_json = serde_json::to_string(&command)?;
    writer.write_all(command_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    // Read response
    let mut response_line = String::new();
    reader.read_line(&mut response_line).await?;

    let response: Response = serde_json::from_str(&response_line)?;
    Ok(response)
}

fn handle_response(response: Response) {
    match response {
        Response::Ok => {
            println!("✓ Success");
        }
        Response::Error(e) => {
            eprintln!("✗ Error: {}", e);
            std::process::exit(1);
        }
        Response::Status(status) => {
            println!("Daemon Status:");
            println!("  Version: {}", status.version);
            println!("  Uptime: {}s", status.uptime_secs);
            println!(
                "  Live wallpaper: {}",
                if status.live_active { "active" } else { "inactive" }
            );
            match status.video_path {
                Some(path) => println!("  Video: {}", path),
                None => println!("  Video: none"),
            }
        }
        Response::Pong => {
            println!("✓ Daemon is running");
        }
        Response::NotImplemented => {
            eprintln!("✗ Daemon does not support this command");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_set_defaults_to_live_on_both() {
        let cli = Cli::try_parse_from(["kabectl", "set", "--video", "assets/media/a.mp4"]).unwrap();
        match cli.command {
            Commands::Set {
                kind,
                screen,
                video,
                thumb,
            } => {
                assert_eq!(kind.wire_name(), "live");
                assert_eq!(screen.wire_name(), "both");
                assert_eq!(video.as_deref(), Some("assets/media/a.mp4"));
                assert!(thumb.is_none() || std::env::var("KABE_THUMB").is_ok());
            }
            _ => panic!("Wrong command type"),
        }
    }

    #[test]
    fn test_set_static_lock() {
        let cli = Cli::try_parse_from([
            "kabectl",
            "set",
            "-t",
            "static",
            "-s",
            "lock",
            "--thumb",
            "assets/thumbs/a.webp",
        ])
        .unwrap();
        match cli.command {
            Commands::Set { kind, screen, thumb, .. } => {
                assert_eq!(kind.wire_name(), "static");
                assert_eq!(screen.wire_name(), "lock");
                assert_eq!(thumb.as_deref(), Some("assets/thumbs/a.webp"));
            }
            _ => panic!("Wrong command type"),
        }
    }

    #[test]
    fn test_rejects_unknown_screen() {
        assert!(Cli::try_parse_from(["kabectl", "set", "-s", "desktop"]).is_err());
    }
}
