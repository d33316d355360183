//! Relays from the engine and layout routines back to the listener.
//!
//! Every relay goes through [`OperationState::dispatch`], so nothing reaches
//! the caller once the operation has been cancelled or has ended.

use crate::geometry::WordBox;
use crate::listener::{LayoutElements, Message, ProgressValues};
use crate::pix::Pix;
use crate::state::OperationState;
use std::time::Instant;
use tracing::debug;

/// Progress and cancellation hooks handed to the OCR engine for one
/// recognition pass
pub struct Monitor<'a> {
    state: &'a OperationState,
}

impl<'a> Monitor<'a> {
    pub fn new(state: &'a OperationState) -> Self {
        Self { state }
    }

    /// Report recognition progress for the word at `word`, relative to the
    /// region being scanned.
    ///
    /// Reports that neither advance progress nor carry a word box are
    /// dropped. Returns whether the listener received the report.
    pub fn report(&self, progress: i32, word: WordBox) -> bool {
        let Some(region) = self.state.current_region() else {
            return false;
        };
        if progress <= self.state.last_progress() && word.is_zero() {
            return false;
        }

        let values = ProgressValues::new(progress, word, region);
        let delivered = self.state.dispatch(|listener| listener.on_progress_values(values));
        if delivered {
            self.state.raise_progress(progress);
        }
        delivered
    }

    /// Polled by the engine between work units. Reads the raw flag: a
    /// cancelled operation must stop even though its listener is gone.
    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }
}

/// Event relays used by the orchestrators and the layout routines
pub struct Bridge<'a> {
    state: &'a OperationState,
    debug_timing: bool,
}

impl<'a> Bridge<'a> {
    pub fn new(state: &'a OperationState, debug_timing: bool) -> Self {
        Self { state, debug_timing }
    }

    pub fn is_valid(&self) -> bool {
        self.state.is_valid()
    }

    pub fn state(&self) -> &'a OperationState {
        self.state
    }

    pub fn monitor(&self) -> Monitor<'a> {
        Monitor::new(self.state)
    }

    pub fn message(&self, message: Message) {
        self.state.dispatch(|listener| listener.on_progress_text(message));
    }

    /// Relay a down-scaled copy of `pix` as the current progress image
    pub fn progress_image(&self, pix: &Pix) {
        if !self.state.is_valid() {
            return;
        }

        let started = Instant::now();
        let preview = pix.preview();
        self.state.dispatch(|listener| listener.on_progress_image(preview));

        if self.debug_timing {
            debug!(
                "preview {}x{} -> scaled in {} ms",
                pix.width(),
                pix.height(),
                started.elapsed().as_millis()
            );
        }
    }

    /// Relay an intermediate segmentation image, then announce layout analysis
    pub fn layout_preview(&self, pix: &Pix) {
        let preview = pix.clone();
        self.state.dispatch(|listener| listener.on_layout_pix(preview));
        self.message(Message::AnalyseLayout);
    }

    pub fn final_pix(&self, pix: &Pix) {
        let pix = pix.clone();
        self.state.dispatch(|listener| listener.on_final_pix(pix));
    }

    /// Relay hOCR then plain text, each only while the state is valid
    pub fn results(&self, hocr: &str, text: &str) {
        self.state.dispatch(|listener| listener.on_hocr_result(hocr));
        self.state.dispatch(|listener| listener.on_utf8_result(text));
    }

    pub fn layout_elements(&self, layout: LayoutElements) {
        self.state.dispatch(|listener| listener.on_layout_elements(layout));
    }
}
