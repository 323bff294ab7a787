//! Training-dataset directory scan: media discovery and label derivation.
//!
//! Clip filenames carry their label in the stem (`Merhaba_abc123.mp4`,
//! `tesekkur-sample2.mp4`). The derived label set doubles as a whitelist for
//! predictions and as health diagnostics.

use std::path::{Path, PathBuf};

const MEDIA_SUFFIXES: [&str; 7] = ["mp4", "avi", "mov", "jpg", "jpeg", "png", "webp"];
const VIDEO_SUFFIXES: [&str; 3] = ["mp4", "avi", "mov"];
const STEM_SPLIT_TOKENS: [&str; 4] = ["_sample", "-sample", "_color", "-color"];

/// Canonical form used for label comparison: lowercase, separators collapsed
/// to single underscores.
pub fn normalize_label(text: &str) -> String {
    let mut normalized: String = text
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect();
    while normalized.contains("__") {
        normalized = normalized.replace("__", "_");
    }
    normalized.trim_matches('_').to_string()
}

/// Derive the word label from a clip's file stem.
pub fn label_from_stem(stem: &str) -> String {
    let raw = stem.trim();
    let lowered = raw.to_lowercase();
    for token in STEM_SPLIT_TOKENS {
        if let Some(idx) = lowered.find(token) {
            if idx > 0 {
                return raw[..idx].to_string();
            }
        }
    }
    if let Some(idx) = raw.find('_') {
        return raw[..idx].to_string();
    }
    if let Some(idx) = raw.find('-') {
        return raw[..idx].to_string();
    }
    raw.to_string()
}

fn has_suffix(path: &Path, suffixes: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| suffixes.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Whether the path is a video clip (needs ffmpeg frame extraction) rather
/// than a still image.
pub fn is_video(path: &Path) -> bool {
    has_suffix(path, &VIDEO_SUFFIXES)
}

/// All media files in the dataset directory, sorted for determinism.
/// A missing directory yields an empty list, not an error.
pub fn scan_media(dataset_path: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dataset_path) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_suffix(p, &MEDIA_SUFFIXES))
        .collect();
    files.sort();
    files
}

/// Distinct labels found in the dataset, sorted.
pub fn load_labels(dataset_path: &Path) -> Vec<String> {
    let mut labels: Vec<String> = scan_media(dataset_path)
        .iter()
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()))
        .map(label_from_stem)
        .map(|l| l.trim_matches(|c| c == ' ' || c == '_' || c == '-').to_string())
        .filter(|l| !l.is_empty())
        .collect();
    labels.sort();
    labels.dedup();
    labels
}
