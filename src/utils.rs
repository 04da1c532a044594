use crate::error::SnapError;
use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Expands a bare volume name onto the mount root. Absolute paths, and
/// paths already naming the mount root, are taken as given.
pub fn expand_volume(arg: &str, volume_root: &Path) -> PathBuf {
    let root = volume_root.to_string_lossy().to_lowercase();
    let root = format!("{}/", root.trim_end_matches('/'));
    if arg.starts_with('/') || arg.to_lowercase().contains(&root) {
        PathBuf::from(arg)
    } else {
        volume_root.join(arg)
    }
}

/// Expands `arg` and checks that the volume is mounted.
pub fn resolve_volume(arg: &str, volume_root: &Path) -> Result<PathBuf> {
    let path = expand_volume(arg, volume_root);
    if !path.exists() {
        return Err(SnapError::VolumeNotFound {
            path,
            available: mounted_volumes(volume_root),
        }
        .into());
    }
    Ok(path)
}

/// Names of the directories directly under the mount root.
pub fn mounted_volumes(volume_root: &Path) -> Vec<String> {
    let mut names: Vec<String> = WalkDir::new(volume_root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter_map(|e| e.file_name().to_str().map(|s| s.to_string()))
        .collect();
    names.sort();
    names
}

/// Last path component, used as the volume's display name.
pub fn volume_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
