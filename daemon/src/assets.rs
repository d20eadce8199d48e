//! Read-only bundled asset store.
//!
//! Requests name assets by bundle-relative paths such as
//! `assets/media/rain.mp4`. Lookups never leave the bundle root.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Component, Path, PathBuf};

/// Prefix the UI layer puts in front of every bundled asset path
const BUNDLE_PREFIX: &str = "assets/";

pub struct BundledAssets {
    root: PathBuf,
}

impl BundledAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve an asset path to a file under the bundle root
    pub fn resolve(&self, asset_path: &str) -> Result<PathBuf> {
        let relative = Path::new(asset_path);

        if asset_path.is_empty() {
            anyhow::bail!("Empty asset path");
        }

        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            anyhow::bail!("Asset path escapes the bundle: {}", asset_path);
        }

        Ok(self.root.join(relative))
    }

    /// Open a bundled asset for reading
    pub fn open(&self, asset_path: &str) -> Result<File> {
        let path = self.resolve(asset_path)?;
        File::open(&path).with_context(|| format!("Failed to open asset: {}", path.display()))
    }
}

/// Private-storage relative path for a bundled asset (`assets/` dropped)
pub fn strip_bundle_prefix(asset_path: &str) -> &str {
    asset_path.strip_prefix(BUNDLE_PREFIX).unwrap_or(asset_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_strip_bundle_prefix() {
        assert_eq!(strip_bundle_prefix("assets/media/a.mp4"), "media/a.mp4");
        assert_eq!(strip_bundle_prefix("media/a.mp4"), "media/a.mp4");
        // Only one leading prefix is removed
        assert_eq!(
            strip_bundle_prefix("assets/assets/a.mp4"),
            "assets/a.mp4"
        );
    }

    #[test]
    fn test_resolve_rejects_escaping_paths() {
        let assets = BundledAssets::new("/bundle");
        assert!(assets.resolve("../etc/passwd").is_err());
        assert!(assets.resolve("assets/../../secret").is_err());
        assert!(assets.resolve("/etc/passwd").is_err());
        assert!(assets.resolve("").is_err());
        assert_eq!(
            assets.resolve("assets/media/a.mp4").unwrap(),
            PathBuf::from("/bundle/assets/media/a.mp4")
        );
    }

    #[test]
    fn test_open_reads_bundled_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/hello.txt"), b"hi").unwrap();

        let assets = BundledAssets::new(dir.path());
        let mut contents = String::new();
        assets
            .open("assets/hello.txt")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "hi");

        assert!(assets.open("assets/missing.txt").is_err());
    }
}
