//! Page preparation routines run before recognition

mod basic;

pub use basic::BasicLayout;

use crate::bridge::Bridge;
use crate::error::Result;
use crate::geometry::Region;
use crate::listener::LayoutElements;
use crate::pix::Pix;

/// Output of image-region detection
#[derive(Debug, Clone)]
pub struct ImageExtraction {
    /// Binary mask, ink where the page holds pictures rather than text
    pub mask: Pix,
    /// Grey version of the page used for binarization
    pub grey: Pix,
}

/// A book page prepared for single-pass recognition
#[derive(Debug, Clone)]
pub struct BookPage {
    /// Binary image handed to the engine
    pub text: Pix,
    /// Image shown to the user next to the recognised text
    pub final_pix: Pix,
}

/// Selected layout blocks assembled into one page
#[derive(Debug, Clone)]
pub struct CombinedPage {
    /// Colour page of all selected blocks
    pub final_pix: Pix,
    /// Binary page of the selected text blocks
    pub ocr_pix: Pix,
    /// Text columns in `ocr_pix` coordinates, in recognition order
    pub columns: Vec<Region>,
}

/// Image library routines the orchestrators depend on.
///
/// Implementations report stage messages and previews through the bridge;
/// the bridge drops them once the operation is cancelled.
pub trait LayoutAnalyzer {
    fn extract_images(&self, pix: &Pix) -> Result<ImageExtraction>;

    fn binarize(&self, grey: &Pix, mask: &Pix) -> Result<Pix>;

    fn segment_complex_layout(
        &self,
        original: &Pix,
        mask: &Pix,
        binary: &Pix,
        bridge: &Bridge<'_>,
    ) -> Result<LayoutElements>;

    fn book_page(&self, pix: &Pix, bridge: &Bridge<'_>) -> Result<BookPage>;

    fn combine_selected(
        &self,
        layout: &LayoutElements,
        selected_texts: &[usize],
        selected_images: &[usize],
        bridge: &Bridge<'_>,
    ) -> Result<CombinedPage>;
}
