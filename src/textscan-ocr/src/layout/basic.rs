//! Layout routines built on `image` and `imageproc`.
//!
//! No page segmentation: the whole page is one text block and the picture
//! mask is taken as given. Good enough for scans of plain text pages.

use super::{BookPage, CombinedPage, ImageExtraction, LayoutAnalyzer};
use crate::bridge::Bridge;
use crate::error::{OcrError, Result};
use crate::geometry::Region;
use crate::listener::{Block, LayoutElements, Message};
use crate::pix::Pix;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::contrast::otsu_level;
use tracing::{debug, warn};

const INK: u8 = 0;
const BACKGROUND: u8 = 255;

#[derive(Debug, Clone, Default)]
pub struct BasicLayout;

impl BasicLayout {
    pub fn new() -> Self {
        Self
    }
}

/// Otsu threshold of `grey`, with pixels under the mask's ink forced to background
fn threshold(grey: &GrayImage, mask: Option<&GrayImage>) -> GrayImage {
    let level = otsu_level(grey);
    debug!("binarizing {}x{} at level {}", grey.width(), grey.height(), level);
    GrayImage::from_fn(grey.width(), grey.height(), |x, y| {
        let masked = mask
            .filter(|m| x < m.width() && y < m.height())
            .map(|m| m.get_pixel(x, y).0[0] == INK)
            .unwrap_or(false);
        if masked || grey.get_pixel(x, y).0[0] > level {
            Luma([BACKGROUND])
        } else {
            Luma([INK])
        }
    })
}

/// Bounding box of the ink pixels of a binary image
fn ink_bounds(binary: &GrayImage) -> Option<Region> {
    let mut bounds: Option<Region> = None;
    for (x, y, pixel) in binary.enumerate_pixels() {
        if pixel.0[0] == INK {
            let dot = Region::new(x as i32, y as i32, 1, 1);
            bounds = Some(bounds.map_or(dot, |b| b.union(&dot)));
        }
    }
    bounds
}

fn pick<'a>(blocks: &'a [Block], indexes: &[usize], kind: &str) -> Vec<&'a Block> {
    indexes
        .iter()
        .filter_map(|&i| {
            let block = blocks.get(i);
            if block.is_none() {
                warn!("ignoring selected {} block {} of {}", kind, i, blocks.len());
            }
            block
        })
        .collect()
}

impl LayoutAnalyzer for BasicLayout {
    fn extract_images(&self, pix: &Pix) -> Result<ImageExtraction> {
        let grey = pix.to_luma8();
        let mask = GrayImage::from_pixel(grey.width(), grey.height(), Luma([BACKGROUND]));
        Ok(ImageExtraction {
            mask: Pix::binary(mask),
            grey: Pix::new(DynamicImage::ImageLuma8(grey)),
        })
    }

    fn binarize(&self, grey: &Pix, mask: &Pix) -> Result<Pix> {
        let mask = mask.to_luma8();
        Ok(Pix::binary(threshold(&grey.to_luma8(), Some(&mask))))
    }

    fn segment_complex_layout(
        &self,
        original: &Pix,
        mask: &Pix,
        binary: &Pix,
        bridge: &Bridge<'_>,
    ) -> Result<LayoutElements> {
        bridge.layout_preview(binary);

        let mut layout = LayoutElements::default();
        if let Some(region) = ink_bounds(&mask.to_luma8()) {
            if let Ok(picture) = original.crop(region) {
                layout.images.push(Block::new(picture, region));
            }
        }
        let page = Region::full(binary.width(), binary.height());
        layout.texts.push(Block::new(binary.clone(), page));

        debug!(
            "layout: {} text block(s), {} image block(s)",
            layout.texts.len(),
            layout.images.len()
        );
        Ok(layout)
    }

    fn book_page(&self, pix: &Pix, bridge: &Bridge<'_>) -> Result<BookPage> {
        bridge.message(Message::ImageDewarp);
        let binary = Pix::binary(threshold(&pix.to_luma8(), None));
        bridge.progress_image(&binary);
        Ok(BookPage {
            text: binary.clone(),
            final_pix: binary,
        })
    }

    fn combine_selected(
        &self,
        layout: &LayoutElements,
        selected_texts: &[usize],
        selected_images: &[usize],
        bridge: &Bridge<'_>,
    ) -> Result<CombinedPage> {
        bridge.message(Message::AssemblePix);

        let texts = pick(&layout.texts, selected_texts, "text");
        let images = pick(&layout.images, selected_images, "image");

        // blocks with unusable geometry are not drawn; their columns are
        // still listed so the caller can skip them in order
        let bounds = texts
            .iter()
            .chain(images.iter())
            .map(|block| block.region)
            .filter(Region::is_well_formed)
            .reduce(|a, b| a.union(&b))
            .ok_or_else(|| OcrError::ProcessingError("no usable layout blocks selected".to_string()))?;
        if !bounds.is_well_formed() {
            return Err(OcrError::InvalidRegion(bounds));
        }

        let (width, height) = (bounds.width as u32, bounds.height as u32);
        let mut colour = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
        let mut ocr = GrayImage::from_pixel(width, height, Luma([BACKGROUND]));
        let mut columns = Vec::with_capacity(texts.len());

        for block in images.iter().filter(|b| b.region.is_well_formed()) {
            let at = block.region.translate(-bounds.x, -bounds.y);
            image::imageops::overlay(&mut colour, &block.pix.image().to_rgb8(), at.x as i64, at.y as i64);
        }
        for block in &texts {
            let at = block.region.translate(-bounds.x, -bounds.y);
            columns.push(at);
            if !block.region.is_well_formed() {
                continue;
            }
            image::imageops::overlay(&mut colour, &block.pix.image().to_rgb8(), at.x as i64, at.y as i64);
            let binary = if block.pix.is_binary() {
                block.pix.to_luma8()
            } else {
                threshold(&block.pix.to_luma8(), None)
            };
            image::imageops::overlay(&mut ocr, &binary, at.x as i64, at.y as i64);
        }

        Ok(CombinedPage {
            final_pix: Pix::new(DynamicImage::ImageRgb8(colour)),
            ocr_pix: Pix::binary(ocr),
            columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::OperationState;

    fn page() -> Pix {
        // dark bar on light background
        let grey = GrayImage::from_fn(40, 20, |x, _| {
            if (10..30).contains(&x) {
                Luma([20])
            } else {
                Luma([230])
            }
        });
        Pix::new(DynamicImage::ImageLuma8(grey))
    }

    #[test]
    fn test_binarize_separates_ink() {
        let layout = BasicLayout::new();
        let extraction = layout.extract_images(&page()).unwrap();
        let binary = layout.binarize(&extraction.grey, &extraction.mask).unwrap();
        assert!(binary.is_binary());
        let pixels = binary.to_luma8();
        assert_eq!(pixels.get_pixel(15, 5).0[0], INK);
        assert_eq!(pixels.get_pixel(2, 5).0[0], BACKGROUND);
    }

    #[test]
    fn test_mask_excludes_pictures() {
        let layout = BasicLayout::new();
        let grey = page();
        let mut mask = GrayImage::from_pixel(40, 20, Luma([BACKGROUND]));
        mask.put_pixel(15, 5, Luma([INK]));
        let binary = layout.binarize(&grey, &Pix::binary(mask)).unwrap();
        assert_eq!(binary.to_luma8().get_pixel(15, 5).0[0], BACKGROUND);
        assert_eq!(binary.to_luma8().get_pixel(16, 5).0[0], INK);
    }

    #[test]
    fn test_segment_returns_whole_page_text_block() {
        let layout = BasicLayout::new();
        let state = OperationState::new();
        let bridge = Bridge::new(&state, false);
        let extraction = layout.extract_images(&page()).unwrap();
        let binary = layout.binarize(&extraction.grey, &extraction.mask).unwrap();

        let elements = layout
            .segment_complex_layout(&page(), &extraction.mask, &binary, &bridge)
            .unwrap();
        assert_eq!(elements.texts.len(), 1);
        assert_eq!(elements.texts[0].region, Region::new(0, 0, 40, 20));
        assert!(elements.images.is_empty());
    }

    #[test]
    fn test_combine_translates_columns() {
        let layout = BasicLayout::new();
        let state = OperationState::new();
        let bridge = Bridge::new(&state, false);
        let elements = LayoutElements {
            texts: vec![
                Block::new(Pix::binary(GrayImage::new(10, 10)), Region::new(100, 50, 10, 10)),
                Block::new(Pix::binary(GrayImage::new(10, 20)), Region::new(120, 50, 10, 20)),
            ],
            images: vec![Block::new(page(), Region::new(100, 80, 40, 20))],
        };

        let combined = layout
            .combine_selected(&elements, &[1, 0, 7], &[0], &bridge)
            .unwrap();
        assert_eq!(combined.final_pix.width(), 40);
        assert_eq!(combined.final_pix.height(), 50);
        assert!(combined.ocr_pix.is_binary());
        assert_eq!(
            combined.columns,
            vec![Region::new(20, 0, 10, 20), Region::new(0, 0, 10, 10)]
        );
    }

    #[test]
    fn test_combine_requires_a_selection() {
        let layout = BasicLayout::new();
        let state = OperationState::new();
        let bridge = Bridge::new(&state, false);
        let result = layout.combine_selected(&LayoutElements::default(), &[0], &[], &bridge);
        assert!(result.is_err());
    }

    #[test]
    fn test_combine_ignores_overflowing_blocks_for_bounds() {
        let layout = BasicLayout::new();
        let state = OperationState::new();
        let bridge = Bridge::new(&state, false);
        let far = Region::new(i32::MAX - 5, 0, 10, 10);
        let elements = LayoutElements {
            texts: vec![
                Block::new(Pix::binary(GrayImage::new(10, 10)), Region::new(0, 0, 10, 10)),
                Block::new(Pix::binary(GrayImage::new(10, 10)), far),
            ],
            images: vec![],
        };

        let combined = layout
            .combine_selected(&elements, &[0, 1], &[], &bridge)
            .unwrap();
        assert_eq!(combined.final_pix.width(), 10);
        assert_eq!(combined.columns, vec![Region::new(0, 0, 10, 10), far]);
        assert!(!combined.columns[1].fits_within(10, 10));
    }
}
