//! Environment-driven configuration, read once at startup.

use std::env;

const DEFAULT_SEQUENCE_LEN: usize = 4;
const DEFAULT_FRAME_SIZE: u32 = 32;
const DEFAULT_HISTORY_LEN: usize = 5;
const DEFAULT_MIN_CONFIDENCE: f32 = 0.35;
const DEFAULT_MATCH_FLOOR: f32 = 0.18;
const DEFAULT_BLEND_WEIGHT: f32 = 0.75;
const DEFAULT_PROFILE_MAX_SAMPLES: usize = 350;
const DEFAULT_PROFILE_MIN_SAMPLES: usize = 10;
const DEFAULT_PROFILE_PERCENTILE: f64 = 0.92;
const DEFAULT_MAX_SESSIONS: usize = 1024;

/// Which inference backend the service runs for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Classifier,
    Index,
    Remote,
}

impl BackendKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "classifier" | "local" => Some(BackendKind::Classifier),
            "index" | "nearest" => Some(BackendKind::Index),
            "remote" | "roboflow" => Some(BackendKind::Remote),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,

    // Remote detector credentials and endpoint.
    pub api_key: String,
    pub model_id: String,
    pub api_url: String,

    // Local artifacts and training data.
    pub dataset_path: String,
    pub model_path: String,
    pub index_path: String,
    pub profile_cache_path: String,

    pub min_confidence: f32,
    pub match_floor: f32,
    pub blend_weight: f32,
    pub profile_max_samples: usize,
    pub profile_min_samples: usize,
    pub profile_percentile: f64,

    pub sequence_len: usize,
    pub history_len: usize,
    pub frame_size: u32,
    pub max_sessions: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let backend = env::var("SIGN_BACKEND")
            .ok()
            .and_then(|s| BackendKind::parse(&s))
            .unwrap_or(BackendKind::Remote);

        Config {
            host: env_string("HOST", "127.0.0.1"),
            port: env_parsed("PORT", 8000),
            backend,
            api_key: env_string("ROBOFLOW_API_KEY", ""),
            model_id: env_string("ROBOFLOW_MODEL_ID", "turk-isaret-dili/2"),
            api_url: env_string("ROBOFLOW_API_URL", "https://serverless.roboflow.com"),
            dataset_path: env_string("DATASET1_PATH", "dataset1"),
            model_path: env_string("MODEL_PATH", "models/sign_classifier.json"),
            index_path: env_string("INDEX_PATH", "models/sign_index.json"),
            profile_cache_path: env_string("PROFILE_CACHE_PATH", "models/dataset_profile.json"),
            min_confidence: env_parsed("ROBOFLOW_MIN_CONFIDENCE", DEFAULT_MIN_CONFIDENCE),
            match_floor: env_parsed("MATCH_FLOOR", DEFAULT_MATCH_FLOOR),
            blend_weight: env_parsed("BLEND_WEIGHT", DEFAULT_BLEND_WEIGHT),
            profile_max_samples: env_bounded("PROFILE_MAX_SAMPLES", DEFAULT_PROFILE_MAX_SAMPLES),
            profile_min_samples: env_bounded("PROFILE_MIN_SAMPLES", DEFAULT_PROFILE_MIN_SAMPLES),
            profile_percentile: env_parsed("PROFILE_PERCENTILE", DEFAULT_PROFILE_PERCENTILE),
            sequence_len: env_bounded("SEQUENCE_LEN", DEFAULT_SEQUENCE_LEN),
            history_len: env_bounded("HISTORY_LEN", DEFAULT_HISTORY_LEN),
            frame_size: env_bounded("FRAME_SIZE", DEFAULT_FRAME_SIZE),
            max_sessions: env_bounded("MAX_SESSIONS", DEFAULT_MAX_SESSIONS),
        }
    }

    /// Descriptor length for a single frame.
    pub fn descriptor_dim(&self) -> usize {
        (self.frame_size * self.frame_size) as usize
    }
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Like `env_parsed` but rejects zero, which would break window/cap semantics.
fn env_bounded<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + PartialOrd + Default,
{
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .filter(|v: &T| *v > T::default())
        .unwrap_or(default)
}
