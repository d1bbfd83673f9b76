use crate::error::{CitedupError, Result};
use crate::model::MarkerStyle;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_THRESHOLD: f64 = 0.90;

/// Settings read from `.citedup.toml`. Every key is optional.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Minimum context similarity (0.0 to 1.0) for two citations to be the same source
    pub threshold: f64,
    pub markers: Vec<MarkerStyle>,
    pub output_suffix: String,
    pub report_suffix: String,
    pub colors: Colors,
}

/// Hex RGB colors used in the annotated copy.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Colors {
    pub old: String,
    pub new: String,
    pub removed: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            threshold: DEFAULT_THRESHOLD,
            markers: vec![MarkerStyle::Bracket],
            output_suffix: "_modified".to_string(),
            report_suffix: "_citations".to_string(),
            colors: Colors::default(),
        }
    }
}

impl Default for Colors {
    fn default() -> Self {
        Colors {
            old: "C00000".to_string(),
            new: "0070C0".to_string(),
            removed: "808080".to_string(),
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path).map_err(|source| CitedupError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Config::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Config> {
        let config: Config =
            toml::from_str(content).map_err(|e| CitedupError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_threshold(mut self, threshold: Option<f64>) -> Result<Config> {
        if let Some(t) = threshold {
            self.threshold = t;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(CitedupError::Config(format!(
                "threshold must be between 0.0 and 1.0, got {}",
                self.threshold
            )));
        }
        if self.markers.is_empty() {
            return Err(CitedupError::Config(
                "at least one marker style is required".to_string(),
            ));
        }
        if self.output_suffix.is_empty() {
            return Err(CitedupError::Config(
                "output_suffix must not be empty".to_string(),
            ));
        }
        for (name, value) in [
            ("old", &self.colors.old),
            ("new", &self.colors.new),
            ("removed", &self.colors.removed),
        ] {
            if value.len() != 6 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(CitedupError::Config(format!(
                    "colors.{} must be a 6-digit hex color, got {:?}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    pub fn uses(&self, style: MarkerStyle) -> bool {
        self.markers.contains(&style)
    }
}
