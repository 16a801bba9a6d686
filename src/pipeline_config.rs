//! Mapping configuration: every tuned constant of the matching pipeline.
//!
//! The defaults come from field use on French administrative forms (tender
//! declarations, company identification sheets). Distance windows and score
//! floors have no derivation beyond that and are meant to be overridden from
//! a JSON file when a document family behaves differently.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read configuration file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid configuration file {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },

    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Which Ollama endpoint the oracle talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleEndpoint {
    /// `/api/generate`, plain string reply.
    #[default]
    Generate,
    /// `/api/chat`, object reply with a `content` field.
    Chat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub base_url: String,
    /// Model name; discovered from the installed models when absent.
    pub model: Option<String>,
    pub timeout_secs: u64,
    pub endpoint: OracleEndpoint,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: None,
            timeout_secs: 120,
            endpoint: OracleEndpoint::Generate,
        }
    }
}

/// Thresholds of the "should we segment" heuristic. Two of the three must hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationThresholds {
    /// Target document text length above which it counts as large.
    pub min_chars: usize,
    /// Reference tag count above which there are "many" tags.
    pub min_tags: usize,
    /// Distinct tag prefixes from which tags count as spread out.
    pub min_prefixes: usize,
    /// Minimum similarity for a reference segment to pair with a target segment.
    pub similarity_floor: f32,
}

impl Default for SegmentationThresholds {
    fn default() -> Self {
        Self {
            min_chars: 50_000,
            min_tags: 10,
            min_prefixes: 3,
            similarity_floor: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Oracle matches below this confidence are discarded at parse time.
    pub confidence_threshold: f32,
    /// Oracle rounds per matching run.
    pub max_iterations: usize,
    /// Minimum keyword score for the fallback scorer to accept a paragraph.
    pub pattern_score_floor: f32,
    /// Unmatched tag ratio above which the coverage warning fires.
    pub coverage_floor: f32,
    pub max_tags_per_call: usize,
    pub max_tags_per_segment: usize,
    pub max_prompt_paragraphs: usize,
    pub paragraph_preview_chars: usize,
    /// Max paragraph distance between the two members of a yes/no pair.
    pub checkbox_pair_window: usize,
    /// Distance from the expected position within which the proximity bonus applies.
    pub label_proximity_window: usize,
    pub segmentation: SegmentationThresholds,
    /// Lifetime of the request-scoped paragraph cache.
    pub cache_ttl_secs: u64,
    pub oracle: OracleConfig,
    /// Diagnostic dump base directory (overridden by `TAGBRIDGE_DUMP_DIR`).
    pub dump_dir: Option<PathBuf>,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            max_iterations: 3,
            pattern_score_floor: 0.35,
            coverage_floor: 0.30,
            max_tags_per_call: 40,
            max_tags_per_segment: 30,
            max_prompt_paragraphs: 80,
            paragraph_preview_chars: 80,
            checkbox_pair_window: 5,
            label_proximity_window: 15,
            segmentation: SegmentationThresholds::default(),
            cache_ttl_secs: 120,
            oracle: OracleConfig::default(),
            dump_dir: None,
        }
    }
}

impl MappingConfig {
    /// Load from a JSON file; absent fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.coverage_floor) {
            return Err(ConfigError::Invalid(format!(
                "coverage_floor must be within [0, 1], got {}",
                self.coverage_floor
            )));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid("max_iterations must be at least 1".into()));
        }
        if self.max_tags_per_call == 0 || self.max_prompt_paragraphs == 0 {
            return Err(ConfigError::Invalid("prompt caps must be positive".into()));
        }
        Ok(())
    }
}

/// Segmentation decision requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// How reference checkbox states reach the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckboxMode {
    /// Copy the reference pair values verbatim.
    #[default]
    Deterministic,
    /// Let the oracle decide from the target's content, then validate.
    ContentAware,
}

/// Per-item options supplied by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingOptions {
    pub segmentation: SegmentationMode,
    pub debug: bool,
    pub output_name: Option<String>,
    pub checkbox_mode: CheckboxMode,
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = MappingConfig::default();
        assert!((config.confidence_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.max_tags_per_call, 40);
        assert_eq!(config.max_tags_per_segment, 30);
        assert_eq!(config.max_prompt_paragraphs, 80);
        assert_eq!(config.paragraph_preview_chars, 80);
        assert_eq!(config.checkbox_pair_window, 5);
        assert_eq!(config.label_proximity_window, 15);
        assert_eq!(config.segmentation.min_chars, 50_000);
        assert_eq!(config.segmentation.min_tags, 10);
        assert_eq!(config.segmentation.min_prefixes, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"max_iterations": 5, "segmentation": {{"min_tags": 4}}, "oracle": {{"model": "mistral"}}}}"#
        )
        .unwrap();

        let config = MappingConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.segmentation.min_tags, 4);
        assert_eq!(config.segmentation.min_chars, 50_000);
        assert_eq!(config.oracle.model.as_deref(), Some("mistral"));
        assert_eq!(config.oracle.base_url, "http://localhost:11434");
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = MappingConfig::from_json_file(Path::new("/nonexistent/tagbridge.json"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"confidence_threshold": 1.5}}"#).unwrap();
        assert!(matches!(
            MappingConfig::from_json_file(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn options_serialize_snake_case() {
        let options = MappingOptions {
            segmentation: SegmentationMode::Always,
            checkbox_mode: CheckboxMode::ContentAware,
            ..Default::default()
        };
        let json = serde_json::to_string(&options).unwrap();
        assert!(json.contains("\"always\""));
        assert!(json.contains("\"content_aware\""));
    }
}
