//! Cancellable OCR operations for Textscan
//!
//! Runs book page OCR, OCR of selected layout blocks, and layout analysis
//! against an external OCR engine and image routines. Progress, previews and
//! results are relayed to an [`OcrListener`] for as long as the operation is
//! valid; a [`CancelHandle`] stops the operation from any thread.

mod bridge;
mod engine;
mod error;
mod geometry;
mod layout;
mod listener;
mod ocr;
mod pix;
mod state;
mod tesseract;

pub use bridge::{Bridge, Monitor};
pub use engine::{EngineConfig, EngineMode, OcrEngine, PageSegMode, Recognition, DEFAULT_MIN_WORD_CONFIDENCE};
pub use error::{OcrError, Result};
pub use geometry::{Region, WordBox};
pub use layout::{BasicLayout, BookPage, CombinedPage, ImageExtraction, LayoutAnalyzer};
pub use listener::{Block, LayoutElements, Message, OcrListener, ProgressValues};
pub use ocr::{Ocr, Outcome};
pub use pix::{Pix, PREVIEW_SCALE};
pub use state::{CancelHandle, OperationGuard, OperationState, Phase, RegionGuard};
pub use tesseract::{tesseract_version, TesseractEngine};

/// Tesseract-backed OCR with the basic layout routines
pub type TesseractOcr = Ocr<TesseractEngine, BasicLayout>;

/// Create an OCR runner using the `tesseract` binary on the PATH
pub fn create_tesseract_ocr(config: EngineConfig) -> TesseractOcr {
    Ocr::new(TesseractEngine::default(), BasicLayout::new(), config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tesseract_ocr() {
        let ocr = create_tesseract_ocr(EngineConfig::default());
        assert_eq!(ocr.engine().binary(), "tesseract");
        assert_eq!(ocr.state().phase(), Phase::Idle);
    }
}
