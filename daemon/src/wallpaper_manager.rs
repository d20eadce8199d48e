//! Static image wallpaper backends.
//!
//! A [`WallpaperManager`] takes either an encoded image stream with
//! per-screen flags or a decoded bitmap that always applies to both
//! screens. Backends that cannot target screens separately report
//! `supports_screen_flags() == false` and the handler falls back to
//! [`WallpaperManager::set_bitmap`].

use anyhow::{Context, Result};
use common::ScreenFlags;
use image::{DynamicImage, ImageFormat};
use std::hash::{Hash, Hasher};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::Config;

pub trait WallpaperManager: Send + Sync {
    /// Whether `set_stream` honours screen flags
    fn supports_screen_flags(&self) -> bool;

    /// Set an encoded image as wallpaper on the screens selected by `flags`
    fn set_stream(&self, bytes: &[u8], flags: ScreenFlags) -> Result<()>;

    /// Set a decoded image as wallpaper on both screens
    fn set_bitmap(&self, image: &DynamicImage) -> Result<()>;
}

/// Encode a decoded image as PNG
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("Failed to encode wallpaper as PNG")?;
    Ok(bytes)
}

/// Build the backend selected in the configuration
pub fn from_config(config: &Config) -> Box<dyn WallpaperManager> {
    let output_dir = config.data_dir().join("wallpaper");

    match config.static_wallpaper.backend.as_str() {
        "command" => {
            log::info!(
                "Static wallpapers via command: {}",
                config.static_wallpaper.command
            );
            Box::new(CommandWallpaperManager::new(
                output_dir,
                &config.static_wallpaper.command,
            ))
        }
        _ => {
            log::info!("Static wallpapers via GNOME settings");
            Box::new(GnomeWallpaperManager::new(output_dir))
        }
    }
}

/// Content-addressed file name, so the desktop reloads when the image changes
fn wallpaper_file_name(stem: &str, bytes: &[u8]) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{}-{:016x}.png", stem, hasher.finish())
}

/// Write `bytes` to `<dir>/<stem>-<hash>.png`. Older files for the stem are kept.
fn write_wallpaper(dir: &Path, stem: &str, bytes: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let path = dir.join(wallpaper_file_name(stem, bytes));
    std::fs::write(&path, bytes)
        .with_context(|| format!("Failed to write wallpaper: {}", path.display()))?;
    Ok(path)
}

/// Remove every file for `stem` except `keep`, once the desktop no longer uses them
fn remove_stale_wallpapers(dir: &Path, stem: &str, keep: &Path) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Failed to list {}: {}", dir.display(), e);
            return;
        }
    };

    let prefix = format!("{stem}-");
    for entry in entries.flatten() {
        let path = entry.path();
        let is_stale = entry.file_name().to_string_lossy().starts_with(&prefix) && path != keep;
        if is_stale && let Err(e) = std::fs::remove_file(&path) {
            log::warn!("Failed to remove old wallpaper {}: {}", path.display(), e);
        }
    }
}

fn file_uri(path: &Path) -> Result<String> {
    let s = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("path is not valid UTF-8"))?;
    Ok(format!("file://{s}"))
}

/// One gsettings key to point at a new image
struct SettingUpdate {
    schema: &'static str,
    key: &'static str,
    value: String,
    /// Failure of an optional key is logged and skipped
    required: bool,
}

/// GNOME backend: `org.gnome.desktop.background` for the home screen,
/// `org.gnome.desktop.screensaver` for the lock screen.
///
/// Keys are changed one by one; if a required key fails, the keys already
/// changed get their previous values back so a failed request leaves both
/// screens as they were.
pub struct GnomeWallpaperManager {
    output_dir: PathBuf,
    /// Program and leading arguments, `gsettings` in production
    program: Vec<String>,
}

impl GnomeWallpaperManager {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            program: vec!["gsettings".to_string()],
        }
    }

    #[cfg(test)]
    fn with_program(output_dir: PathBuf, program: &[&str]) -> Self {
        Self {
            output_dir,
            program: program.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn gsettings(&self, args: &[&str]) -> Result<std::process::Output> {
        let (program, leading) = self
            .program
            .split_first()
            .context("Empty gsettings command")?;
        let output = Command::new(program)
            .args(leading)
            .args(args)
            .output()
            .with_context(|| format!("run {} {}", program, args.join(" ")))?;
        if !output.status.success() {
            anyhow::bail!("{} failed ({})", program, args.join(" "));
        }
        Ok(output)
    }

    fn gsettings_get(&self, schema: &str, key: &str) -> Option<String> {
        let output = self.gsettings(&["get", schema, key]).ok()?;
        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!value.is_empty()).then_some(value)
    }

    fn gsettings_set(&self, schema: &str, key: &str, value: &str) -> Result<()> {
        self.gsettings(&["set", schema, key, value]).map(|_| ())
    }

    /// Restore keys changed by a failed request, newest first
    fn roll_back(&self, applied: &[(&SettingUpdate, Option<String>)]) {
        for (update, previous) in applied.iter().rev() {
            let Some(previous) = previous else {
                log::warn!(
                    "No previous value for {} {}, leaving it changed",
                    update.schema,
                    update.key
                );
                continue;
            };
            if let Err(e) = self.gsettings_set(update.schema, update.key, previous) {
                log::warn!("Failed to restore {} {}: {}", update.schema, update.key, e);
            }
        }
    }

    fn apply(&self, updates: &[SettingUpdate]) -> Result<()> {
        let mut applied = Vec::new();

        for update in updates {
            let previous = self.gsettings_get(update.schema, update.key);
            match self.gsettings_set(update.schema, update.key, &update.value) {
                Ok(()) => applied.push((update, previous)),
                Err(e) if !update.required => {
                    log::debug!("Skipping {} {}: {}", update.schema, update.key, e);
                }
                Err(e) => {
                    self.roll_back(&applied);
                    return Err(e);
                }
            }
        }

        Ok(())
    }
}

impl WallpaperManager for GnomeWallpaperManager {
    fn supports_screen_flags(&self) -> bool {
        true
    }

    fn set_stream(&self, bytes: &[u8], flags: ScreenFlags) -> Result<()> {
        let mut written = Vec::new();
        let mut updates = Vec::new();

        if flags.contains(ScreenFlags::SYSTEM) {
            let path = write_wallpaper(&self.output_dir, "home", bytes)?;
            let uri = file_uri(&path)?;
            updates.push(SettingUpdate {
                schema: "org.gnome.desktop.background",
                key: "picture-uri",
                value: uri.clone(),
                required: true,
            });
            // Dark variant only exists on GNOME 42+
            updates.push(SettingUpdate {
                schema: "org.gnome.desktop.background",
                key: "picture-uri-dark",
                value: uri,
                required: false,
            });
            written.push(("home", path));
        }

        if flags.contains(ScreenFlags::LOCK) {
            let path = write_wallpaper(&self.output_dir, "lock", bytes)?;
            updates.push(SettingUpdate {
                schema: "org.gnome.desktop.screensaver",
                key: "picture-uri",
                value: file_uri(&path)?,
                required: true,
            });
            written.push(("lock", path));
        }

        self.apply(&updates)?;

        for (stem, path) in &written {
            remove_stale_wallpapers(&self.output_dir, stem, path);
            log::info!("{} screen wallpaper set: {}", stem, path.display());
        }

        Ok(())
    }

    fn set_bitmap(&self, image: &DynamicImage) -> Result<()> {
        let bytes = encode_png(image)?;
        self.set_stream(&bytes, ScreenFlags::SYSTEM | ScreenFlags::LOCK)
    }
}

/// Generic backend running a user command such as `feh --bg-fill {path}`.
///
/// Desktop setters of this kind have a single background, so the request
/// always lands on both screens.
pub struct CommandWallpaperManager {
    output_dir: PathBuf,
    template: Vec<String>,
}

impl CommandWallpaperManager {
    pub fn new(output_dir: PathBuf, template: &str) -> Self {
        Self {
            output_dir,
            template: template.split_whitespace().map(str::to_string).collect(),
        }
    }

    fn run(&self, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        let mut args = self
            .template
            .iter()
            .map(|arg| arg.replace("{path}", &path_str));

        let program = args.next().context("Empty wallpaper command")?;
        let status = Command::new(&program)
            .args(args)
            .status()
            .with_context(|| format!("run {}", program))?;
        if !status.success() {
            anyhow::bail!("{} exited with {}", program, status);
        }

        log::info!("Wallpaper set with {}: {}", program, path.display());
        Ok(())
    }

    fn apply(&self, bytes: &[u8]) -> Result<()> {
        let path = write_wallpaper(&self.output_dir, "wallpaper", bytes)?;
        self.run(&path)?;
        remove_stale_wallpapers(&self.output_dir, "wallpaper", &path);
        Ok(())
    }
}

impl WallpaperManager for CommandWallpaperManager {
    fn supports_screen_flags(&self) -> bool {
        false
    }

    fn set_stream(&self, bytes: &[u8], flags: ScreenFlags) -> Result<()> {
        log::debug!(
            "Command backend ignores screen flags ({:#04b})",
            flags.bits()
        );
        self.apply(bytes)
    }

    fn set_bitmap(&self, image: &DynamicImage) -> Result<()> {
        self.apply(&encode_png(image)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn sample_image() -> DynamicImage {
        DynamicImage::ImageRgba8(ImageBuffer::from_pixel(4, 3, Rgba([10, 20, 30, 255])))
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_encode_png_decodes_back() {
        let bytes = encode_png(&sample_image()).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    /// Fake `gsettings` that logs its arguments, answers `get` with a fixed
    /// value and fails `set` for every schema listed in `failing`
    fn fake_gsettings(dir: &Path, failing: &[&str]) -> (GnomeWallpaperManager, PathBuf) {
        let log = dir.join("gsettings.log");
        let fail_cases: String = failing
            .iter()
            .map(|schema| format!("  \"set {schema}\") exit 1 ;;\n"))
            .collect();
        let script = format!(
            "echo \"$*\" >> '{}'\ncase \"$1 $2\" in\n  get*) echo \"'file:///previous.png'\" ;;\n{}esac\n",
            log.display(),
            fail_cases
        );
        let manager = GnomeWallpaperManager::with_program(
            dir.join("out"),
            &["sh", "-c", script.as_str(), "gsettings"],
        );
        (manager, log)
    }

    fn log_lines(log: &Path) -> Vec<String> {
        std::fs::read_to_string(log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_write_wallpaper_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();

        let first = write_wallpaper(dir.path(), "home", b"one").unwrap();
        let again = write_wallpaper(dir.path(), "home", b"one").unwrap();
        let second = write_wallpaper(dir.path(), "home", b"two").unwrap();

        assert_eq!(first, again);
        assert_ne!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
        // Nothing is removed until the new file is in use
        assert!(first.exists());

        remove_stale_wallpapers(dir.path(), "home", &second);
        assert!(!first.exists());
        assert!(second.exists());
    }

    #[test]
    fn test_stale_removal_keeps_other_stems() {
        let dir = tempfile::tempdir().unwrap();

        write_wallpaper(dir.path(), "home", b"one").unwrap();
        let lock = write_wallpaper(dir.path(), "lock", b"one").unwrap();
        let home = write_wallpaper(dir.path(), "home", b"two").unwrap();
        remove_stale_wallpapers(dir.path(), "home", &home);

        let names = files_in(dir.path());
        assert_eq!(names.len(), 2);
        assert!(names[0].starts_with("home-"));
        assert!(lock.exists());
    }

    #[test]
    fn test_gnome_writes_per_screen_files() {
        let dir = tempfile::tempdir().unwrap();
        let manager = GnomeWallpaperManager::with_program(dir.path().to_path_buf(), &["true"]);
        assert!(manager.supports_screen_flags());

        manager.set_stream(b"png", ScreenFlags::LOCK).unwrap();
        let names = files_in(dir.path());
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("lock-"));

        manager
            .set_stream(b"png", ScreenFlags::SYSTEM | ScreenFlags::LOCK)
            .unwrap();
        let names = files_in(dir.path());
        assert_eq!(names.len(), 2);
        assert!(names[0].starts_with("home-"));

        // A new image replaces the old file once applied
        manager.set_stream(b"new", ScreenFlags::SYSTEM).unwrap();
        let names = files_in(dir.path());
        assert_eq!(names.len(), 2);
        assert!(dir.path().join(wallpaper_file_name("home", b"new")).exists());
        assert!(!dir.path().join(wallpaper_file_name("home", b"png")).exists());
    }

    #[test]
    fn test_gnome_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let manager = GnomeWallpaperManager::with_program(dir.path().to_path_buf(), &["false"]);
        assert!(manager.set_stream(b"png", ScreenFlags::SYSTEM).is_err());
    }

    #[test]
    fn test_failed_write_keeps_current_wallpaper() {
        let dir = tempfile::tempdir().unwrap();
        let manager = GnomeWallpaperManager::with_program(dir.path().to_path_buf(), &["true"]);

        manager.set_stream(b"old", ScreenFlags::SYSTEM).unwrap();
        let current = dir.path().join(wallpaper_file_name("home", b"old"));
        assert!(current.exists());

        // A directory where the new file should go makes the write fail
        std::fs::create_dir(dir.path().join(wallpaper_file_name("home", b"new"))).unwrap();

        assert!(manager.set_stream(b"new", ScreenFlags::SYSTEM).is_err());
        assert_eq!(std::fs::read(&current).unwrap(), b"old");
    }

    #[test]
    fn test_gnome_lock_failure_restores_home() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, log) = fake_gsettings(dir.path(), &["org.gnome.desktop.screensaver"]);

        manager.set_stream(b"old", ScreenFlags::SYSTEM).unwrap();
        let current = dir.path().join("out").join(wallpaper_file_name("home", b"old"));
        std::fs::remove_file(&log).unwrap();

        assert!(
            manager
                .set_stream(b"new", ScreenFlags::SYSTEM | ScreenFlags::LOCK)
                .is_err()
        );

        let lines = log_lines(&log);
        assert_eq!(
            &lines[lines.len() - 2..],
            &[
                "set org.gnome.desktop.background picture-uri-dark 'file:///previous.png'",
                "set org.gnome.desktop.background picture-uri 'file:///previous.png'",
            ]
        );
        // The file the desktop still points at survives
        assert!(current.exists());
    }

    #[test]
    fn test_gnome_sets_light_and_dark_keys() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, log) = fake_gsettings(dir.path(), &[]);

        manager.set_stream(b"png", ScreenFlags::SYSTEM).unwrap();

        let sets: Vec<String> = log_lines(&log)
            .into_iter()
            .filter(|line| line.starts_with("set "))
            .collect();
        assert_eq!(sets.len(), 2);
        assert!(sets[0].starts_with("set org.gnome.desktop.background picture-uri file://"));
        assert!(sets[1].starts_with("set org.gnome.desktop.background picture-uri-dark file://"));
    }

    #[test]
    fn test_command_backend() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CommandWallpaperManager::new(dir.path().to_path_buf(), "true {path}");
        assert!(!manager.supports_screen_flags());

        manager.set_bitmap(&sample_image()).unwrap();
        let names = files_in(dir.path());
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("wallpaper-"));

        let failing = CommandWallpaperManager::new(dir.path().to_path_buf(), "false {path}");
        assert!(failing.set_bitmap(&sample_image()).is_err());

        let empty = CommandWallpaperManager::new(dir.path().to_path_buf(), "");
        assert!(empty.set_bitmap(&sample_image()).is_err());
    }
}
