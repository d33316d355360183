//! Configuration management
//!
//! TOML configuration with defaults for every field, so an empty or missing
//! file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use textscan_ocr::{EngineConfig, EngineMode, DEFAULT_MIN_WORD_CONFIDENCE};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub output: OutputSection,

    #[serde(default)]
    pub debug: DebugSection,
}

/// OCR engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Directory containing the *.traineddata files
    pub tessdata_dir: Option<PathBuf>,

    /// Recognition language, e.g. "eng" or "deu+eng"
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub mode: EngineMode,

    /// Tesseract executable (defaults to `tesseract` on the PATH)
    pub tesseract_binary: Option<String>,

    /// Words below this confidence are highlighted in the HTML text
    #[serde(default = "default_min_word_confidence")]
    pub min_word_confidence: i32,
}

/// Result output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    /// Directory for result files (defaults to the local data directory)
    pub dir: Option<PathBuf>,

    /// Log progress events while an operation runs
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugSection {
    /// Log recognition and preview timings
    #[serde(default)]
    pub timing: bool,
}

fn default_language() -> String { "eng".to_string() }
fn default_min_word_confidence() -> i32 { DEFAULT_MIN_WORD_CONFIDENCE }
fn default_true() -> bool { true }

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            tessdata_dir: None,
            language: default_language(),
            mode: EngineMode::default(),
            tesseract_binary: None,
            min_word_confidence: DEFAULT_MIN_WORD_CONFIDENCE,
        }
    }
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: None,
            show_progress: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {:?}", path.as_ref()))?;
        toml::from_str(&content).context("Failed to parse config TOML")
    }

    /// Load from `path` if given, otherwise from the default location if it
    /// exists, otherwise defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        let default_path = default_config_path();
        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Engine parameters for the OCR library
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            data_dir: self.engine.tessdata_dir.clone(),
            language: self.engine.language.clone(),
            mode: self.engine.mode,
            min_word_confidence: self.engine.min_word_confidence,
        }
    }

    /// Resolve output directory with fallback to default
    pub fn resolve_output_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.output.dir {
            dir.clone()
        } else {
            data_dir().join("results")
        }
    }
}

/// Local data directory for Textscan
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Textscan")
}

/// Default configuration file location
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("textscan")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.engine.language, "eng");
        assert_eq!(config.engine.min_word_confidence, 70);
        assert_eq!(config.engine.mode, EngineMode::Default);
        assert!(config.output.show_progress);
        assert!(!config.debug.timing);
    }

    #[test]
    fn test_parse_sections() {
        let config: Config = toml::from_str(
            r#"
            [engine]
            tessdata_dir = "/usr/share/tessdata"
            language = "deu+eng"
            mode = "tesseract_only"
            min_word_confidence = 60

            [output]
            dir = "/tmp/textscan"
            show_progress = false

            [debug]
            timing = true
            "#,
        )
        .unwrap();

        let engine = config.engine_config();
        assert_eq!(engine.data_dir, Some(PathBuf::from("/usr/share/tessdata")));
        assert_eq!(engine.language, "deu+eng");
        assert_eq!(engine.mode, EngineMode::TesseractOnly);
        assert_eq!(engine.min_word_confidence, 60);
        assert_eq!(config.resolve_output_dir(), PathBuf::from("/tmp/textscan"));
        assert!(!config.output.show_progress);
        assert!(config.debug.timing);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::from_file("/nonexistent/textscan.toml").is_err());
    }
}
