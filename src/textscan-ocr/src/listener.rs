//! Events delivered to the caller while an operation runs

use crate::geometry::{Region, WordBox};
use crate::pix::Pix;
use serde::{Deserialize, Serialize};

/// Stage announcements relayed through [`OcrListener::on_progress_text`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Message {
    ImageDetection,
    ImageDewarp,
    Ocr,
    AssemblePix,
    AnalyseLayout,
}

impl Message {
    /// Numeric code understood by existing callers
    pub fn code(&self) -> i32 {
        match self {
            Message::ImageDetection => 0,
            Message::ImageDewarp => 1,
            Message::Ocr => 2,
            Message::AssemblePix => 3,
            Message::AnalyseLayout => 4,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Message::ImageDetection),
            1 => Some(Message::ImageDewarp),
            2 => Some(Message::Ocr),
            3 => Some(Message::AssemblePix),
            4 => Some(Message::AnalyseLayout),
            _ => None,
        }
    }
}

/// Recognition progress with the current word in page coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressValues {
    pub progress: i32,
    /// Word box relative to the scanned region
    pub word: WordBox,
    pub region_left: i32,
    pub region_right: i32,
    pub region_top: i32,
    pub region_bottom: i32,
}

impl ProgressValues {
    pub fn new(progress: i32, word: WordBox, region: Region) -> Self {
        Self {
            progress,
            word,
            region_left: region.left(),
            region_right: region.right(),
            region_top: region.top(),
            region_bottom: region.bottom(),
        }
    }
}

/// A segmented piece of the page and where it came from
#[derive(Debug, Clone)]
pub struct Block {
    pub pix: Pix,
    pub region: Region,
}

impl Block {
    pub fn new(pix: Pix, region: Region) -> Self {
        Self { pix, region }
    }
}

/// Result of layout analysis: text and image blocks in reading order
#[derive(Debug, Clone, Default)]
pub struct LayoutElements {
    pub texts: Vec<Block>,
    pub images: Vec<Block>,
}

/// Receiver of progress and result events.
///
/// Every method has an empty default so listeners only implement what they
/// display. Events arrive on the thread running the operation.
pub trait OcrListener: Send + Sync {
    /// Full-size page the recognised text belongs to
    fn on_final_pix(&self, _pix: Pix) {}

    /// Down-scaled preview of the image currently being processed
    fn on_progress_image(&self, _pix: Pix) {}

    fn on_progress_values(&self, _values: ProgressValues) {}

    fn on_progress_text(&self, _message: Message) {}

    fn on_hocr_result(&self, _hocr: &str) {}

    fn on_utf8_result(&self, _text: &str) {}

    fn on_layout_elements(&self, _layout: LayoutElements) {}

    fn on_layout_pix(&self, _pix: Pix) {}
}
