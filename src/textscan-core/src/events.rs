//! Forwards listener callbacks from the OCR worker thread to the async side

use std::sync::Arc;
use textscan_ocr::{LayoutElements, Message, OcrListener, Pix, ProgressValues};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

/// Listener callback as a value
#[derive(Debug, Clone)]
pub enum OcrEvent {
    FinalPix(Pix),
    ProgressImage(Pix),
    Progress(ProgressValues),
    Message(Message),
    Hocr(String),
    Text(String),
    Layout(LayoutElements),
    LayoutPix(Pix),
}

/// Listener sending every callback over an unbounded channel.
///
/// The channel closes once the operation releases the listener, which ends
/// [`collect_events`].
pub struct ChannelListener {
    tx: UnboundedSender<OcrEvent>,
}

impl ChannelListener {
    pub fn new() -> (Arc<Self>, UnboundedReceiver<OcrEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn send(&self, event: OcrEvent) {
        // receiver gone means the caller stopped listening
        if self.tx.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }
}

impl OcrListener for ChannelListener {
    fn on_final_pix(&self, pix: Pix) {
        self.send(OcrEvent::FinalPix(pix));
    }

    fn on_progress_image(&self, pix: Pix) {
        self.send(OcrEvent::ProgressImage(pix));
    }

    fn on_progress_values(&self, values: ProgressValues) {
        self.send(OcrEvent::Progress(values));
    }

    fn on_progress_text(&self, message: Message) {
        self.send(OcrEvent::Message(message));
    }

    fn on_hocr_result(&self, hocr: &str) {
        self.send(OcrEvent::Hocr(hocr.to_string()));
    }

    fn on_utf8_result(&self, text: &str) {
        self.send(OcrEvent::Text(text.to_string()));
    }

    fn on_layout_elements(&self, layout: LayoutElements) {
        self.send(OcrEvent::Layout(layout));
    }

    fn on_layout_pix(&self, pix: Pix) {
        self.send(OcrEvent::LayoutPix(pix));
    }
}

/// Everything an operation delivered
#[derive(Debug, Default)]
pub struct Collected {
    pub hocr: Option<String>,
    pub text: Option<String>,
    pub final_pix: Option<Pix>,
    pub layout: Option<LayoutElements>,
    pub progress_events: usize,
}

/// Drain events until the operation drops its listener
pub async fn collect_events(mut rx: UnboundedReceiver<OcrEvent>, show_progress: bool) -> Collected {
    let mut collected = Collected::default();

    while let Some(event) = rx.recv().await {
        match event {
            OcrEvent::Message(message) => {
                if show_progress {
                    info!("{}", describe(message));
                }
            }
            OcrEvent::Progress(values) => {
                collected.progress_events += 1;
                if show_progress {
                    info!(
                        "recognised {}% (word at {},{} in region {},{}-{},{})",
                        values.progress,
                        values.word.left,
                        values.word.top,
                        values.region_left,
                        values.region_top,
                        values.region_right,
                        values.region_bottom
                    );
                }
            }
            OcrEvent::ProgressImage(pix) | OcrEvent::LayoutPix(pix) => {
                debug!("preview {}x{} (depth {})", pix.width(), pix.height(), pix.depth());
            }
            OcrEvent::FinalPix(pix) => collected.final_pix = Some(pix),
            OcrEvent::Hocr(hocr) => collected.hocr = Some(hocr),
            OcrEvent::Text(text) => collected.text = Some(text),
            OcrEvent::Layout(layout) => collected.layout = Some(layout),
        }
    }

    collected
}

fn describe(message: Message) -> &'static str {
    match message {
        Message::ImageDetection => "detecting images",
        Message::ImageDewarp => "straightening page",
        Message::Ocr => "recognising text",
        Message::AssemblePix => "assembling selected blocks",
        Message::AnalyseLayout => "analysing layout",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textscan_ocr::{Region, WordBox};

    #[tokio::test]
    async fn test_collects_until_listener_dropped() {
        let (listener, rx) = ChannelListener::new();
        listener.on_progress_text(Message::Ocr);
        listener.on_progress_values(ProgressValues::new(
            10,
            WordBox::default(),
            Region::new(0, 0, 10, 10),
        ));
        listener.on_hocr_result("<div/>");
        listener.on_utf8_result("<p>hi</p>");
        drop(listener);

        let collected = collect_events(rx, false).await;
        assert_eq!(collected.hocr.as_deref(), Some("<div/>"));
        assert_eq!(collected.text.as_deref(), Some("<p>hi</p>"));
        assert_eq!(collected.progress_events, 1);
        assert!(collected.final_pix.is_none());
    }

    #[tokio::test]
    async fn test_layout_and_final_pix_are_kept() {
        let (listener, rx) = ChannelListener::new();
        listener.on_layout_elements(LayoutElements::default());
        listener.on_final_pix(Pix::new(image::DynamicImage::new_luma8(4, 4)));
        drop(listener);

        let collected = collect_events(rx, true).await;
        assert!(collected.layout.is_some());
        assert_eq!(collected.final_pix.map(|p| p.width()), Some(4));
    }

    #[test]
    fn test_send_after_receiver_dropped_is_ignored() {
        let (listener, rx) = ChannelListener::new();
        drop(rx);
        listener.on_utf8_result("late");
    }
}
