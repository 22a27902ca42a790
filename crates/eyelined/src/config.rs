use std::path::{Path, PathBuf};

use eyeline_core::{EngagementWeights, TrackerConfig};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown tracker preset: {0}")]
    UnknownPreset(String),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config file parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to apply tracker overrides: {0}")]
    Merge(#[from] toml::ser::Error),
    #[error(transparent)]
    Tracker(#[from] eyeline_core::config::ConfigError),
}

/// Daemon configuration, loaded from environment variables and an optional
/// TOML file.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Face-mesh model file name inside `model_dir`.
    pub model_file: String,
    /// Model takes NHWC input (TFLite conversions) rather than NCHW.
    pub model_channels_last: bool,
    /// Upper bound on concurrently open sessions.
    pub max_sessions: usize,
    /// Preset the tracker thresholds start from ("web" or "monitor").
    pub preset: String,
    /// Tracker thresholds: preset plus `[tracker]` overrides from the file.
    pub tracker: TrackerConfig,
    /// Engagement weights, overridable via `[engagement]`.
    pub weights: EngagementWeights,
    /// Register on the system bus instead of the session bus.
    pub system_bus: bool,
    /// File the overrides came from, if any.
    pub config_file: Option<PathBuf>,
}

/// Optional `EYELINE_CONFIG` file layout.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    preset: Option<String>,
    max_sessions: Option<usize>,
    tracker: Option<toml::Table>,
    engagement: Option<EngagementWeights>,
}

impl Config {
    /// Load configuration from `EYELINE_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an injectable variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let model_dir = var("EYELINE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(eyeline_core::default_model_dir);

        let config_file = var("EYELINE_CONFIG").map(PathBuf::from);
        let file = match &config_file {
            Some(path) => read_file(path)?,
            None => FileConfig::default(),
        };

        // Environment wins over the file, the file over built-in defaults.
        let preset = var("EYELINE_PRESET")
            .or(file.preset)
            .unwrap_or_else(|| "web".to_string());
        let base = TrackerConfig::preset(&preset)
            .ok_or_else(|| ConfigError::UnknownPreset(preset.clone()))?;
        let tracker = match file.tracker {
            Some(overrides) => apply_overrides(&base, overrides)?,
            None => base,
        };
        tracker.validate()?;

        Ok(Self {
            model_dir,
            model_file: var("EYELINE_MODEL_FILE")
                .unwrap_or_else(|| eyeline_core::FACE_MESH_MODEL.to_string()),
            model_channels_last: var("EYELINE_MODEL_NHWC").map(|v| v != "0").unwrap_or(true),
            max_sessions: parse_or(var("EYELINE_MAX_SESSIONS"), file.max_sessions.unwrap_or(16)),
            preset,
            tracker,
            weights: file.engagement.unwrap_or_default(),
            system_bus: var("EYELINE_SYSTEM_BUS").is_some_and(|v| v != "0"),
            config_file,
        })
    }

    /// Path to the face-mesh landmark model.
    pub fn model_path(&self) -> String {
        self.model_dir
            .join(&self.model_file)
            .to_string_lossy()
            .into_owned()
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file = toml::from_str(&text)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(file)
}

/// Overlay a `[tracker]` table onto a preset, key by key.
fn apply_overrides(
    base: &TrackerConfig,
    overrides: toml::Table,
) -> Result<TrackerConfig, ConfigError> {
    let mut merged = toml::Table::try_from(base)?;
    for (key, value) in overrides {
        if !merged.contains_key(&key) {
            tracing::warn!(key = %key, "ignoring unknown tracker setting");
            continue;
        }
        merged.insert(key, value);
    }
    Ok(toml::Value::Table(merged).try_into()?)
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
