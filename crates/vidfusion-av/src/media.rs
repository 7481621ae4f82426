//! Source clip discovery.

use crate::{Error, Result};
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};

/// Pick up to `count` random files with `extension` from `dir`.
///
/// Only regular files directly inside `dir` are considered; the extension
/// match ignores case.
pub fn pick_random_clips(dir: &Path, extension: &str, count: usize) -> Result<Vec<PathBuf>> {
    let mut clips = list_clips(dir, extension)?;
    clips.shuffle(&mut rand::thread_rng());
    clips.truncate(count);
    Ok(clips)
}

/// Every file with `extension` directly inside `dir`, sorted by path.
pub fn list_clips(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let wanted = extension.trim_start_matches('.');
    let entries =
        std::fs::read_dir(dir).map_err(|e| Error::resource_at("failed to read", dir, e))?;

    let mut clips = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::resource_at("failed to read", dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(wanted))
            .unwrap_or(false);
        if matches {
            clips.push(path);
        }
    }

    clips.sort();
    Ok(clips)
}
