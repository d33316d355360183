use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("failed to initialize OCR engine: {0}")]
    EngineInitFailed(String),

    #[error("OCR engine not initialized")]
    EngineNotInitialized,

    #[error("OCR processing error: {0}")]
    ProcessingError(String),

    #[error("invalid region {0}")]
    InvalidRegion(crate::geometry::Region),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("image processing error: {0}")]
    ImageError(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, OcrError>;
