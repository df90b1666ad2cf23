// src/video_finder.rs

//! Finds the video that goes with a script file.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Checked in this order when looking for `<stem>.<ext>`.
pub const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mkv", "webm", "m4v", "mov", "avi"];

/// Looks for `<script stem>.<ext>` beside the script first, then for any
/// video in the same directory whose stem matches ignoring case.
pub fn find_video(script_path: &Path) -> Option<PathBuf> {
    let base = script_path.with_extension("");

    for ext in VIDEO_EXTENSIONS {
        // appended, not with_extension: "a.b.funscript" must map to "a.b.mp4"
        let mut name = base.clone().into_os_string();
        name.push(".");
        name.push(ext);
        let candidate = PathBuf::from(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    let stem = script_path.file_stem()?.to_string_lossy().to_lowercase();
    let dir = match script_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut matches: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_video(path))
        .filter(|path| {
            path.file_stem()
                .map(|s| s.to_string_lossy().to_lowercase() == stem)
                .unwrap_or(false)
        })
        .collect();

    matches.sort();
    matches.into_iter().next()
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .map(|e| {
            let e = e.to_string_lossy().to_lowercase();
            VIDEO_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}
