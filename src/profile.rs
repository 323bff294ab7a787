//! Dataset profile: a mean-descriptor-plus-threshold summary of the training
//! distribution, used only for out-of-distribution gating at serving time.
//!
//! Built once from a bounded sample of training clips (midpoint frame of
//! each), cached as JSON, and reloaded on later startups. A thin or missing
//! dataset disables gating instead of failing startup: every match score
//! becomes 1.0 and the blend passes backend confidence through.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use image::DynamicImage;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::config::Config;
use crate::dataset;
use crate::features::{descriptor, euclidean};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const THRESHOLD_FLOOR: f32 = 1e-6;

/// The persisted form of a built profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileData {
    pub mean: Vec<f32>,
    pub threshold: f32,
    pub sample_count: usize,
}

/// Read-only OOD reference shared across requests. `None` inner data means
/// gating is disabled and `match_score` is identically 1.0.
pub struct DatasetProfile {
    data: Option<ProfileData>,
}

impl DatasetProfile {
    pub fn disabled() -> Self {
        DatasetProfile { data: None }
    }

    #[cfg(test)]
    pub fn from_data_for_tests(data: ProfileData) -> Self {
        DatasetProfile { data: Some(data) }
    }

    pub fn active(&self) -> bool {
        self.data.is_some()
    }

    pub fn status(&self) -> &'static str {
        if self.active() { "active" } else { "disabled" }
    }

    pub fn sample_count(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.sample_count)
    }

    pub fn threshold(&self) -> f32 {
        self.data.as_ref().map_or(0.0, |d| d.threshold)
    }

    /// `clamp(1 - dist/threshold, 0, 1)`, or 1.0 when gating is disabled.
    pub fn match_score(&self, descriptor: &[f32]) -> f32 {
        match &self.data {
            Some(data) => {
                let dist = euclidean(descriptor, &data.mean);
                (1.0 - dist / data.threshold).clamp(0.0, 1.0)
            }
            None => 1.0,
        }
    }

    /// Load the cached profile if it validates, otherwise rebuild from the
    /// dataset. Never fails startup: every failure path degrades to a
    /// disabled profile with a logged reason.
    pub async fn load_or_build(config: &Config) -> Self {
        let cache_path = Path::new(&config.profile_cache_path);
        match load_cache(cache_path, config.descriptor_dim()) {
            Ok(data) => {
                println!(
                    "[profile] loaded cache: {} samples, threshold {:.4}",
                    data.sample_count, data.threshold
                );
                return DatasetProfile { data: Some(data) };
            }
            Err(e) => {
                println!("[profile] cache unusable ({}), rebuilding", e);
            }
        }

        let profile = build_profile(config).await;
        if let Some(data) = &profile.data {
            if let Err(e) = save_cache(cache_path, data) {
                eprintln!("[profile] failed to write cache: {}", e);
            }
        }
        profile
    }
}

fn load_cache(path: &Path, expected_dim: usize) -> Result<ProfileData, BoxError> {
    let raw = std::fs::read_to_string(path)?;
    let data: ProfileData = serde_json::from_str(&raw)?;
    if data.mean.len() != expected_dim {
        return Err(format!(
            "dimension mismatch: cache {} vs expected {}",
            data.mean.len(),
            expected_dim
        )
        .into());
    }
    if data.threshold <= 0.0 {
        return Err("non-positive threshold".into());
    }
    Ok(data)
}

fn save_cache(path: &Path, data: &ProfileData) -> Result<(), BoxError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(data)?)?;
    println!("[profile] cache written to {}", path.display());
    Ok(())
}

/// Sample the dataset and compute the mean/threshold pair.
async fn build_profile(config: &Config) -> DatasetProfile {
    let mut media = dataset::scan_media(Path::new(&config.dataset_path));
    media.shuffle(&mut rand::rng());
    media.truncate(config.profile_max_samples);

    let mut descriptors: Vec<Vec<f32>> = Vec::new();
    for path in &media {
        match sample_descriptor(path, config.frame_size).await {
            Ok(desc) => descriptors.push(desc),
            Err(e) => {
                // Explicit per-item fallback: skip the clip, keep building.
                eprintln!("[profile] skipping {}: {}", path.display(), e);
            }
        }
    }

    if descriptors.len() < config.profile_min_samples {
        println!(
            "[profile] only {} usable samples (< {}), gating disabled",
            descriptors.len(),
            config.profile_min_samples
        );
        return DatasetProfile::disabled();
    }

    let data = summarize(&descriptors, config.profile_percentile);
    println!(
        "[profile] built from {} samples, threshold {:.4}",
        data.sample_count, data.threshold
    );
    DatasetProfile { data: Some(data) }
}

/// Mean vector plus the distance-percentile threshold.
fn summarize(descriptors: &[Vec<f32>], percentile: f64) -> ProfileData {
    let dim = descriptors[0].len();
    let count = descriptors.len();

    let mut mean = vec![0.0f32; dim];
    for desc in descriptors {
        for (m, v) in mean.iter_mut().zip(desc) {
            *m += v;
        }
    }
    for m in &mut mean {
        *m /= count as f32;
    }

    let mut distances: Vec<f32> = descriptors.iter().map(|d| euclidean(d, &mean)).collect();
    distances.sort_by(|a, b| a.partial_cmp(b).expect("NaN distance"));
    let threshold = percentile_of_sorted(&distances, percentile).max(THRESHOLD_FLOOR);

    ProfileData {
        mean,
        threshold,
        sample_count: count,
    }
}

/// Value at the given percentile of an ascending-sorted slice.
fn percentile_of_sorted(sorted: &[f32], percentile: f64) -> f32 {
    let n = sorted.len();
    let idx = ((n as f64 * percentile).ceil() as usize).clamp(1, n) - 1;
    sorted[idx]
}

/// One representative descriptor per clip: still images decode directly,
/// videos get their midpoint frame pulled through ffmpeg.
async fn sample_descriptor(path: &Path, frame_size: u32) -> Result<Vec<f32>, BoxError> {
    let img = if dataset::is_video(path) {
        video_midpoint_frame(path).await?
    } else {
        image::open(path)?
    };
    Ok(descriptor(&img, frame_size))
}

async fn video_midpoint_frame(path: &Path) -> Result<DynamicImage, BoxError> {
    let path_str = path.to_str().ok_or("non-UTF8 clip path")?;

    let probe = Command::new("ffprobe")
        .args(["-v", "error"])
        .args(["-show_entries", "format=duration"])
        .args(["-of", "default=noprint_wrappers=1:nokey=1"])
        .arg(path_str)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await?;
    let duration = String::from_utf8_lossy(&probe.stdout)
        .trim()
        .parse::<f64>()
        .unwrap_or(0.0);
    let midpoint = duration / 2.0;

    let out_path = temp_frame_path();
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
        .args(["-ss", &format!("{:.3}", midpoint)])
        .args(["-i", path_str])
        .args(["-frames:v", "1"])
        .args(["-q:v", "4"])
        .args(["-y", out_path.to_str().ok_or("non-UTF8 temp path")?])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let _ = tokio::fs::remove_file(&out_path).await;
        return Err(format!("ffmpeg midpoint extraction failed: {}", stderr).into());
    }

    let data = tokio::fs::read(&out_path).await?;
    let _ = tokio::fs::remove_file(&out_path).await;
    Ok(image::load_from_memory(&data)?)
}

fn temp_frame_path() -> PathBuf {
    std::env::temp_dir().join(format!("signstream_frame_{}.jpg", rand::random::<u64>()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn uniform(dim: usize, value: f32) -> Vec<f32> {
        vec![value; dim]
    }

    fn test_config(dataset: &Path, cache: &Path) -> Config {
        let mut config = Config::from_env();
        config.dataset_path = dataset.to_string_lossy().into_owned();
        config.profile_cache_path = cache.to_string_lossy().into_owned();
        config.profile_min_samples = 3;
        config.profile_max_samples = 350;
        config.profile_percentile = 0.92;
        config.frame_size = 8;
        config
    }

    #[test]
    fn test_disabled_profile_matches_everything() {
        let profile = DatasetProfile::disabled();
        assert_eq!(profile.match_score(&uniform(1024, 0.3)), 1.0);
        assert_eq!(profile.status(), "disabled");
    }

    #[test]
    fn test_match_score_clamped() {
        let profile = DatasetProfile {
            data: Some(ProfileData {
                mean: uniform(4, 0.0),
                threshold: 1.0,
                sample_count: 10,
            }),
        };
        // On the mean: perfect score.
        assert_eq!(profile.match_score(&uniform(4, 0.0)), 1.0);
        // Far beyond the threshold: clamped to zero, never negative.
        assert_eq!(profile.match_score(&uniform(4, 100.0)), 0.0);
        // At half the threshold distance: in between.
        let half = profile.match_score(&[0.5, 0.0, 0.0, 0.0]);
        assert!((half - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_percentile_of_sorted() {
        let values: Vec<f32> = (1..=100).map(|v| v as f32).collect();
        assert_eq!(percentile_of_sorted(&values, 0.92), 92.0);
        assert_eq!(percentile_of_sorted(&values, 1.0), 100.0);
        assert_eq!(percentile_of_sorted(&[5.0], 0.92), 5.0);
    }

    #[test]
    fn test_summarize_mean_and_threshold() {
        let descriptors = vec![uniform(2, 0.0), uniform(2, 1.0)];
        let data = summarize(&descriptors, 0.92);
        assert_eq!(data.mean, vec![0.5, 0.5]);
        assert_eq!(data.sample_count, 2);
        // Both samples sit sqrt(0.5) from the mean.
        assert!((data.threshold - 0.5f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_threshold_floor_on_identical_samples() {
        let descriptors = vec![uniform(2, 0.5); 4];
        let data = summarize(&descriptors, 0.92);
        assert_eq!(data.threshold, THRESHOLD_FLOOR);
    }

    #[test]
    fn test_cache_round_trip() {
        let path = std::env::temp_dir().join(format!("signstream_cache_{}.json", rand::random::<u64>()));
        let data = ProfileData {
            mean: vec![0.25, 0.5, 0.75],
            threshold: 0.1234,
            sample_count: 42,
        };
        save_cache(&path, &data).unwrap();
        let loaded = load_cache(&path, 3).unwrap();
        assert_eq!(loaded.sample_count, 42);
        assert!((loaded.threshold - data.threshold).abs() < 1e-7);
        for (a, b) in loaded.mean.iter().zip(&data.mean) {
            assert!((a - b).abs() < 1e-7);
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_cache_rejects_dimension_mismatch() {
        let path = std::env::temp_dir().join(format!("signstream_cache_{}.json", rand::random::<u64>()));
        let data = ProfileData {
            mean: vec![0.0; 3],
            threshold: 0.5,
            sample_count: 12,
        };
        save_cache(&path, &data).unwrap();
        assert!(load_cache(&path, 1024).is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_build_from_still_images_and_reload() {
        let dir = std::env::temp_dir().join(format!("signstream_ds_{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..4u8 {
            let img = RgbImage::from_pixel(8, 8, Rgb([i * 40, i * 40, i * 40]));
            img.save(dir.join(format!("Merhaba_{}.png", i))).unwrap();
        }
        let cache = dir.join("profile.json");
        let config = test_config(&dir, &cache);

        let built = DatasetProfile::load_or_build(&config).await;
        assert!(built.active());
        assert_eq!(built.sample_count(), 4);

        // Second load must come from the cache and reproduce the profile.
        let reloaded = DatasetProfile::load_or_build(&config).await;
        assert!(reloaded.active());
        assert!((reloaded.threshold() - built.threshold()).abs() < 1e-6);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_thin_dataset_disables_gating() {
        let dir = std::env::temp_dir().join(format!("signstream_thin_{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        let img = RgbImage::from_pixel(8, 8, Rgb([10, 10, 10]));
        img.save(dir.join("Evet_0.png")).unwrap();
        let config = test_config(&dir, &dir.join("profile.json"));

        let profile = DatasetProfile::load_or_build(&config).await;
        assert!(!profile.active());
        assert_eq!(profile.match_score(&vec![0.9; 64]), 1.0);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
