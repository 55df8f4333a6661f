use std::path::{Path, PathBuf};

use clap::Parser;
use config::{builder::DefaultState, ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};

use crate::fuzzy::DEFAULT_FUZZY_THRESHOLD;
use crate::guess::GUESS_MATCH_THRESHOLD;
use crate::semantic::DEFAULT_SEMANTIC_THRESHOLD;

const DEFAULT_MODEL_DIR: &str = "models/all-MiniLM-L6-v2";
const DEFAULT_CACHE_CAPACITY: i64 = 10_000;
const DEFAULT_CACHE_TTL_SECS: i64 = 3600;

#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// File with one raw response per line.
    #[arg(value_name = "RESPONSES_PATH")]
    pub responses: PathBuf,

    /// Group with the embedding-based matcher instead of the fuzzy
    /// decider.
    #[arg(long)]
    pub semantic: bool,

    /// The day's prompt, used as semantic context.
    #[arg(long, value_name = "QUESTION")]
    pub question: Option<String>,

    /// Check this guess against the ranked answers after grouping.
    #[arg(long, value_name = "GUESS")]
    pub guess: Option<String>,

    /// How many ranked answers to print.
    #[arg(long, default_value_t = 5)]
    pub top: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Matching {
    pub fuzzy_threshold: f64,
    pub guess_threshold: f64,
    pub semantic_threshold: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Model {
    pub model_dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheSettings {
    pub capacity: u64,
    pub ttl_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Settings {
    pub matching: Matching,
    pub model: Model,
    pub cache: CacheSettings,
}

impl Settings {
    /// Load settings from the given TOML file, with sane defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let cfg = Self::builder()?.add_source(File::from(path)).build()?;

        cfg.try_deserialize()
    }

    /// Built-in defaults, no file.
    pub fn default_settings() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        ConfigBuilder::<DefaultState>::default()
            .set_default("matching.fuzzy_threshold", DEFAULT_FUZZY_THRESHOLD)?
            .set_default("matching.guess_threshold", GUESS_MATCH_THRESHOLD)?
            .set_default("matching.semantic_threshold", DEFAULT_SEMANTIC_THRESHOLD)?
            .set_default("model.model_dir", DEFAULT_MODEL_DIR)?
            .set_default("cache.capacity", DEFAULT_CACHE_CAPACITY)?
            .set_default("cache.ttl_secs", DEFAULT_CACHE_TTL_SECS)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::Settings;

    #[test]
    fn defaults() {
        let settings = Settings::default_settings().unwrap();
        assert!((settings.matching.fuzzy_threshold - 0.7).abs() < f64::EPSILON);
        assert!((settings.matching.guess_threshold - 0.85).abs() < f64::EPSILON);
        assert!((settings.matching.semantic_threshold - 0.75).abs() < f64::EPSILON);
        assert_eq!(settings.cache.capacity, 10_000);
        assert_eq!(settings.cache.ttl_secs, 3600);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[matching]\nsemantic_threshold = 0.9\n\n[model]\nmodel_dir = \"/opt/models/minilm\""
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert!((settings.matching.semantic_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(
            settings.model.model_dir.to_str().unwrap(),
            "/opt/models/minilm"
        );
        // Untouched keys keep their defaults.
        assert!((settings.matching.fuzzy_threshold - 0.7).abs() < f64::EPSILON);
    }
}
