use crate::bridge::Monitor;
use crate::error::Result;
use crate::geometry::Region;
use crate::pix::Pix;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Words recognised below this confidence are highlighted in the plain text
pub const DEFAULT_MIN_WORD_CONFIDENCE: i32 = 70;

/// Recognition backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    TesseractOnly,
    LstmOnly,
    TesseractLstmCombined,
    #[default]
    Default,
}

impl EngineMode {
    /// Value of the engine's `--oem` option
    pub fn oem(&self) -> u8 {
        match self {
            EngineMode::TesseractOnly => 0,
            EngineMode::LstmOnly => 1,
            EngineMode::TesseractLstmCombined => 2,
            EngineMode::Default => 3,
        }
    }
}

/// How the engine splits the image into blocks before recognition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSegMode {
    /// Full automatic page segmentation
    Auto,
    /// Treat the image as a single uniform block of text
    SingleBlock,
}

impl PageSegMode {
    /// Value of the engine's `--psm` option
    pub fn psm(&self) -> u8 {
        match self {
            PageSegMode::Auto => 3,
            PageSegMode::SingleBlock => 6,
        }
    }
}

/// Engine initialisation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the language data files
    pub data_dir: Option<PathBuf>,
    /// Language identifier, e.g. "eng" or "deu+eng"
    pub language: String,
    pub mode: EngineMode,
    pub min_word_confidence: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            language: "eng".to_string(),
            mode: EngineMode::default(),
            min_word_confidence: DEFAULT_MIN_WORD_CONFIDENCE,
        }
    }
}

/// Text produced by one recognition pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recognition {
    /// hOCR markup
    pub hocr: String,
    /// Paragraph-structured HTML text with low-confidence words highlighted
    pub text: String,
}

/// OCR engine driven by the orchestrators.
///
/// `recognize` blocks until the pass completes, reporting progress through
/// the monitor and polling [`Monitor::is_cancelled`] between work units.
/// It returns `None` when the pass was cancelled or failed.
pub trait OcrEngine {
    fn init(&mut self, config: &EngineConfig) -> Result<()>;

    fn set_page_seg_mode(&mut self, mode: PageSegMode);

    fn set_image(&mut self, pix: &Pix);

    /// Restrict the next passes to `region` of the current image
    fn set_rectangle(&mut self, region: Region);

    fn recognize(&mut self, monitor: &Monitor<'_>) -> Option<Recognition>;

    /// Mean word confidence of the last pass, 0-100
    fn mean_text_conf(&self) -> i32;

    /// Release engine resources. Called once per operation.
    fn end(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_option_values() {
        assert_eq!(EngineMode::TesseractOnly.oem(), 0);
        assert_eq!(EngineMode::default().oem(), 3);
        assert_eq!(PageSegMode::Auto.psm(), 3);
        assert_eq!(PageSegMode::SingleBlock.psm(), 6);
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.language, "eng");
        assert_eq!(config.min_word_confidence, 70);
        assert!(config.data_dir.is_none());
    }
}
