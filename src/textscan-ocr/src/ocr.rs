//! The three cancellable operations: book page OCR, OCR of selected layout
//! blocks, and layout analysis.

use crate::bridge::Bridge;
use crate::engine::{EngineConfig, OcrEngine, PageSegMode, Recognition};
use crate::error::Result;
use crate::geometry::Region;
use crate::layout::LayoutAnalyzer;
use crate::listener::{LayoutElements, Message, OcrListener};
use crate::pix::Pix;
use crate::state::{CancelHandle, OperationGuard, OperationState};
use serde::Serialize;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How an operation ended. Informational only: failures never surface as
/// errors, the listener simply receives no results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    /// Cancelled by the caller, or the engine produced no text
    Cancelled,
    /// The engine or the layout routines could not be set up
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed => write!(f, "completed"),
            Outcome::Cancelled => write!(f, "cancelled"),
            Outcome::Failed => write!(f, "failed"),
        }
    }
}

/// Initialised engine, ended when dropped
struct EngineSession<'a, E: OcrEngine> {
    engine: &'a mut E,
}

impl<'a, E: OcrEngine> EngineSession<'a, E> {
    fn start(engine: &'a mut E, config: &EngineConfig, mode: PageSegMode, pix: &Pix) -> Result<Self> {
        engine.init(config)?;
        engine.set_page_seg_mode(mode);
        engine.set_image(pix);
        Ok(Self { engine })
    }
}

impl<E: OcrEngine> Deref for EngineSession<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        self.engine
    }
}

impl<E: OcrEngine> DerefMut for EngineSession<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        self.engine
    }
}

impl<E: OcrEngine> Drop for EngineSession<'_, E> {
    fn drop(&mut self) {
        self.engine.end();
    }
}

/// Runs OCR and layout operations, one at a time, reporting to a listener.
///
/// Operations block the calling thread. Use [`Ocr::cancel_handle`] to
/// cancel from another thread.
pub struct Ocr<E, L> {
    engine: E,
    layout: L,
    config: EngineConfig,
    state: Arc<OperationState>,
    debug_timing: bool,
}

impl<E: OcrEngine, L: LayoutAnalyzer> Ocr<E, L> {
    pub fn new(engine: E, layout: L, config: EngineConfig) -> Self {
        Self {
            engine,
            layout,
            config,
            state: Arc::new(OperationState::new()),
            debug_timing: false,
        }
    }

    /// Log recognition and preview timings at debug level
    pub fn with_debug_timing(mut self, enabled: bool) -> Self {
        self.debug_timing = enabled;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(Arc::clone(&self.state))
    }

    /// Cancel the running operation; true for the first request
    pub fn cancel(&self) -> bool {
        self.state.request_cancel()
    }

    pub fn state(&self) -> &OperationState {
        &self.state
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// OCR of a whole book page in a single automatic-segmentation pass.
    ///
    /// Relays hOCR, plain text and then the final page image.
    pub fn ocr_book_page(&mut self, page: &Pix, listener: Arc<dyn OcrListener>) -> Outcome {
        let guard = OperationGuard::begin(&self.state, listener);
        let bridge = Bridge::new(guard.state(), self.debug_timing);
        info!("book page OCR on {}x{}", page.width(), page.height());

        self.run_book_page(&bridge, page).unwrap_or_else(|e| {
            warn!("book page OCR failed: {}", e);
            Outcome::Failed
        })
    }

    /// OCR of the selected text blocks of an analysed layout.
    ///
    /// The selected text and image blocks are assembled into one page which
    /// is relayed first; each text column is then recognised in order.
    /// Columns with unusable geometry are skipped, and the first failed
    /// column stops the run without delivering results.
    pub fn ocr_selected(
        &mut self,
        layout: &LayoutElements,
        selected_texts: &[usize],
        selected_images: &[usize],
        listener: Arc<dyn OcrListener>,
    ) -> Outcome {
        let guard = OperationGuard::begin(&self.state, listener);
        let bridge = Bridge::new(guard.state(), self.debug_timing);
        info!(
            "OCR of {} text and {} image block(s)",
            selected_texts.len(),
            selected_images.len()
        );

        self.run_selected(&bridge, layout, selected_texts, selected_images)
            .unwrap_or_else(|e| {
                warn!("OCR of selected blocks failed: {}", e);
                Outcome::Failed
            })
    }

    /// Detect pictures, binarize and segment `page` into text and image blocks
    pub fn analyse_layout(&mut self, page: &Pix, listener: Arc<dyn OcrListener>) -> Outcome {
        let guard = OperationGuard::begin(&self.state, listener);
        let bridge = Bridge::new(guard.state(), self.debug_timing);
        info!("layout analysis on {}x{}", page.width(), page.height());

        self.run_analysis(&bridge, page).unwrap_or_else(|e| {
            warn!("layout analysis failed: {}", e);
            Outcome::Failed
        })
    }

    fn run_book_page(&mut self, bridge: &Bridge<'_>, page: &Pix) -> Result<Outcome> {
        let prepared = self.layout.book_page(page, bridge)?;

        let outcome = {
            let region = Region::full(prepared.text.width(), prepared.text.height());
            let _scan = bridge.state().scan_region(region);
            bridge.message(Message::Ocr);

            let mut session =
                EngineSession::start(&mut self.engine, &self.config, PageSegMode::Auto, &prepared.text)?;
            match recognize(&mut *session, bridge, self.debug_timing) {
                Some(recognition) => {
                    bridge.results(&recognition.hocr, &recognition.text);
                    Outcome::Completed
                }
                None => Outcome::Cancelled,
            }
        };

        bridge.final_pix(&prepared.final_pix);
        Ok(settle(bridge, outcome))
    }

    fn run_selected(
        &mut self,
        bridge: &Bridge<'_>,
        layout: &LayoutElements,
        selected_texts: &[usize],
        selected_images: &[usize],
    ) -> Result<Outcome> {
        let page = self
            .layout
            .combine_selected(layout, selected_texts, selected_images, bridge)?;

        bridge.progress_image(&page.final_pix);
        bridge.final_pix(&page.final_pix);

        let mut session = EngineSession::start(
            &mut self.engine,
            &self.config,
            PageSegMode::SingleBlock,
            &page.ocr_pix,
        )?;
        bridge.message(Message::Ocr);

        let mut hocr = String::new();
        let mut text = String::new();
        for (i, column) in page.columns.iter().enumerate() {
            if !column.fits_within(page.ocr_pix.width(), page.ocr_pix.height()) {
                debug!("skipping column {} with geometry {}", i, column);
                continue;
            }

            let _scan = bridge.state().scan_region(*column);
            session.set_rectangle(*column);
            debug!("start OCR of column {} at {}", i, column);

            match recognize(&mut *session, bridge, self.debug_timing) {
                Some(recognition) => {
                    hocr.push_str(&recognition.hocr);
                    text.push_str(&recognition.text);
                }
                None => {
                    info!("OCR stopped at column {} of {}", i, page.columns.len());
                    return Ok(settle(bridge, Outcome::Cancelled));
                }
            }
        }
        drop(session);

        bridge.results(&hocr, &text);
        Ok(settle(bridge, Outcome::Completed))
    }

    fn run_analysis(&mut self, bridge: &Bridge<'_>, page: &Pix) -> Result<Outcome> {
        bridge.message(Message::ImageDetection);

        let extraction = self.layout.extract_images(page)?;
        bridge.progress_image(&extraction.grey);
        let binary = self.layout.binarize(&extraction.grey, &extraction.mask)?;
        drop(extraction.grey);

        let elements = self
            .layout
            .segment_complex_layout(page, &extraction.mask, &binary, bridge)?;
        bridge.layout_elements(elements);
        Ok(settle(bridge, Outcome::Completed))
    }
}

/// One recognition pass. `None` when the engine produced nothing or the
/// operation was invalidated while it ran.
fn recognize<E: OcrEngine>(engine: &mut E, bridge: &Bridge<'_>, debug_timing: bool) -> Option<Recognition> {
    let started = Instant::now();
    let monitor = bridge.monitor();
    let recognition = engine.recognize(&monitor);

    if debug_timing {
        debug!(
            "ocr: {} ms, confidence: {}",
            started.elapsed().as_millis(),
            engine.mean_text_conf()
        );
    }

    match recognition {
        Some(recognition) if bridge.is_valid() => Some(recognition),
        _ => {
            info!("ocr was cancelled");
            None
        }
    }
}

/// A completed run counts as cancelled if the caller cancelled meanwhile
fn settle(bridge: &Bridge<'_>, outcome: Outcome) -> Outcome {
    if outcome == Outcome::Completed && bridge.state().is_cancelled() {
        Outcome::Cancelled
    } else {
        outcome
    }
}
