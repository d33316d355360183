//! Image buffers handed between the caller, the layout routines and the engine

use crate::error::{OcrError, Result};
use crate::geometry::Region;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Scale applied to non-binary images before they are relayed as previews
pub const PREVIEW_SCALE: f32 = 0.25;

/// Shared, immutable image buffer.
///
/// Cloning is cheap: clones share the pixel data, and the buffer is freed
/// when the last clone is dropped. A binary `Pix` stores its pixels as
/// 8-bit luma restricted to 0 (ink) and 255 (background) and reports a
/// depth of 1.
#[derive(Clone)]
pub struct Pix {
    image: Arc<DynamicImage>,
    binary: bool,
}

impl Pix {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image: Arc::new(image),
            binary: false,
        }
    }

    /// Wrap a thresholded grey image as a 1-bit image
    pub fn binary(image: GrayImage) -> Self {
        Self {
            image: Arc::new(DynamicImage::ImageLuma8(image)),
            binary: true,
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let image = image::open(path.as_ref())?;
        Ok(Self::new(image))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.image.save(path.as_ref())?;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Bits per pixel
    pub fn depth(&self) -> u32 {
        if self.binary {
            1
        } else {
            self.image.color().bits_per_pixel() as u32
        }
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn to_luma8(&self) -> GrayImage {
        self.image.to_luma8()
    }

    /// Whether both handles point at the same pixel buffer
    pub fn shares_buffer(&self, other: &Pix) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }

    /// Scale both dimensions by `ratio`, rounding to the nearest pixel
    pub fn scale(&self, ratio: f32) -> Pix {
        let width = scaled_dimension(self.width(), ratio);
        let height = scaled_dimension(self.height(), ratio);
        let scaled = self.image.resize_exact(width, height, FilterType::Triangle);
        Pix {
            image: Arc::new(scaled),
            binary: self.binary,
        }
    }

    /// 2x reduction of a binary image by subsampling the top-left pixel of
    /// every 2x2 block. Odd trailing rows and columns are dropped.
    pub fn reduce_binary_2(&self) -> Pix {
        let source = self.image.to_luma8();
        let width = (source.width() / 2).max(1);
        let height = (source.height() / 2).max(1);
        let reduced = GrayImage::from_fn(width, height, |x, y| {
            let sx = (2 * x).min(source.width().saturating_sub(1));
            let sy = (2 * y).min(source.height().saturating_sub(1));
            if source.width() == 0 || source.height() == 0 {
                Luma([255])
            } else {
                *source.get_pixel(sx, sy)
            }
        });
        Pix::binary(reduced)
    }

    /// Down-scaled copy used for progress previews
    pub fn preview(&self) -> Pix {
        if self.binary {
            self.reduce_binary_2()
        } else {
            self.scale(PREVIEW_SCALE)
        }
    }

    /// Copy of the pixels inside `region`
    pub fn crop(&self, region: Region) -> Result<Pix> {
        if !region.fits_within(self.width(), self.height()) {
            return Err(OcrError::InvalidRegion(region));
        }
        let cropped = self.image.crop_imm(
            region.x as u32,
            region.y as u32,
            region.width as u32,
            region.height as u32,
        );
        Ok(Pix {
            image: Arc::new(cropped),
            binary: self.binary,
        })
    }
}

impl fmt::Debug for Pix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pix")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("depth", &self.depth())
            .finish()
    }
}

fn scaled_dimension(size: u32, ratio: f32) -> u32 {
    ((size as f32 * ratio + 0.5) as u32).max(1)
}
