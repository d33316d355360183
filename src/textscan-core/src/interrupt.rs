//! Ctrl+C handling across the phases of a command
//!
//! Cancelling an operation only lasts until the next one begins, so a
//! command running several operations keeps its own sticky flag as well.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use textscan_ocr::{CancelHandle, Outcome};
use tracing::warn;

#[derive(Clone)]
pub struct Interrupt {
    interrupted: Arc<AtomicBool>,
    handle: CancelHandle,
}

impl Interrupt {
    pub fn new(handle: CancelHandle) -> Self {
        Self {
            interrupted: Arc::new(AtomicBool::new(false)),
            handle,
        }
    }

    /// Install as the process Ctrl+C handler. Call once per process.
    pub fn install(&self) -> anyhow::Result<()> {
        let interrupt = self.clone();
        ctrlc::set_handler(move || {
            if interrupt.trigger() {
                warn!("received interrupt, cancelling...");
            }
        })?;
        Ok(())
    }

    /// Mark the command interrupted and cancel the running operation.
    /// Returns true for the first interrupt.
    pub fn trigger(&self) -> bool {
        self.handle.cancel();
        !self.interrupted.swap(true, Ordering::SeqCst)
    }

    pub fn is_set(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// An operation that completed after the interrupt still counts as cancelled
    pub fn settle(&self, outcome: Outcome) -> Outcome {
        if outcome == Outcome::Completed && self.is_set() {
            Outcome::Cancelled
        } else {
            outcome
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textscan_ocr::{create_tesseract_ocr, EngineConfig, OcrListener};

    struct Silent;

    impl OcrListener for Silent {}

    #[test]
    fn test_interrupt_between_operations_is_kept() {
        let ocr = create_tesseract_ocr(EngineConfig::default());
        let interrupt = Interrupt::new(ocr.cancel_handle());

        // lands after one operation ended and before the next began
        assert!(interrupt.trigger());
        ocr.state().begin(Arc::new(Silent));
        assert!(!ocr.state().is_cancelled());
        ocr.state().end();

        assert!(interrupt.is_set());
        assert_eq!(interrupt.settle(Outcome::Completed), Outcome::Cancelled);
        assert_eq!(interrupt.settle(Outcome::Failed), Outcome::Failed);
    }

    #[test]
    fn test_repeated_interrupts() {
        let ocr = create_tesseract_ocr(EngineConfig::default());
        let interrupt = Interrupt::new(ocr.cancel_handle());
        assert!(!interrupt.is_set());
        assert_eq!(interrupt.settle(Outcome::Completed), Outcome::Completed);
        assert!(interrupt.trigger());
        assert!(!interrupt.trigger());
    }
}
