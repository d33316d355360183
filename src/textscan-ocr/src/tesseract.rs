//! Tesseract engine driven through its command line interface

use crate::bridge::Monitor;
use crate::engine::{EngineConfig, OcrEngine, PageSegMode, Recognition};
use crate::error::{OcrError, Result};
use crate::geometry::{Region, WordBox};
use crate::pix::Pix;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_BINARY: &str = "tesseract";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// TSV level of word rows
const TSV_WORD_LEVEL: i32 = 5;

static PASS_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One word row of Tesseract's TSV output
#[derive(Debug, Clone, PartialEq)]
struct TsvWord {
    block: i32,
    paragraph: i32,
    line: i32,
    left: i32,
    top: i32,
    width: i32,
    height: i32,
    confidence: f32,
    text: String,
}

/// Tesseract OCR engine.
///
/// Each pass writes the (cropped) image to a temporary file and runs the
/// binary with the `hocr` and `tsv` output configs. The child process is
/// killed as soon as the monitor reports cancellation.
pub struct TesseractEngine {
    binary: String,
    work_dir: PathBuf,
    poll_interval: Duration,
    config: Option<EngineConfig>,
    page_seg_mode: PageSegMode,
    image: Option<Pix>,
    rectangle: Option<Region>,
    mean_confidence: i32,
}

impl TesseractEngine {
    pub fn new(binary: Option<&str>) -> Self {
        Self {
            binary: binary.unwrap_or(DEFAULT_BINARY).to_string(),
            work_dir: std::env::temp_dir(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            config: None,
            page_seg_mode: PageSegMode::Auto,
            image: None,
            rectangle: None,
            mean_confidence: 0,
        }
    }

    /// Directory for the per-pass image and output files
    pub fn with_work_dir(mut self, work_dir: PathBuf) -> Self {
        self.work_dir = work_dir;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn run_pass(&mut self, monitor: &Monitor<'_>) -> Result<Option<Recognition>> {
        let config = self.config.clone().ok_or(OcrError::EngineNotInitialized)?;
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| OcrError::ProcessingError("no image set".to_string()))?;
        let pix = match self.rectangle {
            Some(region) => image.crop(region)?,
            None => image.clone(),
        };

        let id = PASS_COUNTER.fetch_add(1, Ordering::Relaxed);
        let base = self
            .work_dir
            .join(format!("textscan_{}_{}", std::process::id(), id));
        let files = PassFiles::new(&base);
        pix.save(&files.input)?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg(&files.input)
            .arg(&base)
            .arg("-l")
            .arg(&config.language)
            .arg("--psm")
            .arg(self.page_seg_mode.psm().to_string())
            .arg("--oem")
            .arg(config.mode.oem().to_string())
            .arg("hocr")
            .arg("tsv")
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(data_dir) = &config.data_dir {
            cmd.env("TESSDATA_PREFIX", data_dir);
        }

        debug!(
            "running {} -l {} --psm {} --oem {} on {}x{}",
            self.binary,
            config.language,
            self.page_seg_mode.psm(),
            config.mode.oem(),
            pix.width(),
            pix.height()
        );

        let mut child = cmd.spawn()?;
        let status = loop {
            if monitor.is_cancelled() {
                info!("recognition cancelled, stopping {}", self.binary);
                // the process may already have exited on its own
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
            match child.try_wait()? {
                Some(status) => break status,
                None => thread::sleep(self.poll_interval),
            }
        };

        if !status.success() {
            return Err(OcrError::ProcessingError(format!(
                "{} exited with {}",
                self.binary, status
            )));
        }

        let hocr = std::fs::read_to_string(&files.hocr)?;
        let tsv = std::fs::read_to_string(&files.tsv)?;
        let words = parse_tsv(&tsv);

        self.mean_confidence = mean_confidence(&words);
        report_words(monitor, &words);

        Ok(Some(Recognition {
            hocr,
            text: html_text(&words, config.min_word_confidence),
        }))
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

impl OcrEngine for TesseractEngine {
    fn init(&mut self, config: &EngineConfig) -> Result<()> {
        if let Some(data_dir) = &config.data_dir {
            if !data_dir.is_dir() {
                return Err(OcrError::EngineInitFailed(format!(
                    "tessdata directory {:?} not found",
                    data_dir
                )));
            }
        }
        let version = tesseract_version(&self.binary)?;
        info!("OCR lang = {} ({})", config.language, version);

        self.config = Some(config.clone());
        self.image = None;
        self.rectangle = None;
        self.mean_confidence = 0;
        Ok(())
    }

    fn set_page_seg_mode(&mut self, mode: PageSegMode) {
        self.page_seg_mode = mode;
    }

    fn set_image(&mut self, pix: &Pix) {
        self.image = Some(pix.clone());
        self.rectangle = None;
    }

    fn set_rectangle(&mut self, region: Region) {
        self.rectangle = Some(region);
    }

    fn recognize(&mut self, monitor: &Monitor<'_>) -> Option<Recognition> {
        let started = Instant::now();
        match self.run_pass(monitor) {
            Ok(result) => {
                debug!(
                    "recognition pass took {} ms, confidence {}",
                    started.elapsed().as_millis(),
                    self.mean_confidence
                );
                result
            }
            Err(e) => {
                warn!("recognition failed: {}", e);
                None
            }
        }
    }

    fn mean_text_conf(&self) -> i32 {
        self.mean_confidence
    }

    fn end(&mut self) {
        self.config = None;
        self.image = None;
        self.rectangle = None;
    }
}

/// Input and output files of one pass, removed on drop
struct PassFiles {
    input: PathBuf,
    hocr: PathBuf,
    tsv: PathBuf,
}

impl PassFiles {
    fn new(base: &Path) -> Self {
        Self {
            input: base.with_extension("png"),
            hocr: base.with_extension("hocr"),
            tsv: base.with_extension("tsv"),
        }
    }
}

impl Drop for PassFiles {
    fn drop(&mut self) {
        for path in [&self.input, &self.hocr, &self.tsv] {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Version string reported by the Tesseract binary
pub fn tesseract_version(binary: &str) -> Result<String> {
    let output = Command::new(binary)
        .arg("--version")
        .output()
        .map_err(|e| OcrError::EngineInitFailed(format!("cannot run {}: {}", binary, e)))?;

    // older releases print the version banner on stderr
    let banner = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).to_string()
    } else {
        String::from_utf8_lossy(&output.stdout).to_string()
    };

    banner
        .lines()
        .next()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .ok_or_else(|| OcrError::EngineInitFailed(format!("{} printed no version", binary)))
}

fn parse_tsv(tsv: &str) -> Vec<TsvWord> {
    tsv.lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 {
                return None;
            }
            let level: i32 = cols[0].parse().ok()?;
            let confidence: f32 = cols[10].parse().ok()?;
            let text = cols[11].trim();
            if level != TSV_WORD_LEVEL || text.is_empty() || confidence < 0.0 {
                return None;
            }
            Some(TsvWord {
                block: cols[2].parse().unwrap_or(0),
                paragraph: cols[3].parse().unwrap_or(0),
                line: cols[4].parse().unwrap_or(0),
                left: cols[6].parse().unwrap_or(0),
                top: cols[7].parse().unwrap_or(0),
                width: cols[8].parse().unwrap_or(0),
                height: cols[9].parse().unwrap_or(0),
                confidence,
                text: text.to_string(),
            })
        })
        .collect()
}

fn mean_confidence(words: &[TsvWord]) -> i32 {
    if words.is_empty() {
        return 0;
    }
    let total: f32 = words.iter().map(|w| w.confidence).sum();
    (total / words.len() as f32).round() as i32
}

/// Replay the recognised words as progress, one report per word
fn report_words(monitor: &Monitor<'_>, words: &[TsvWord]) {
    let count = words.len() as i32;
    for (i, word) in words.iter().enumerate() {
        if monitor.is_cancelled() {
            return;
        }
        let progress = (i as i32 + 1) * 100 / count;
        let word_box = WordBox::new(
            word.left,
            word.left.saturating_add(word.width),
            word.top,
            word.top.saturating_add(word.height),
        );
        monitor.report(progress, word_box);
    }
    monitor.report(100, WordBox::default());
}

/// Plain text as HTML: one `<p>` per paragraph, `<br>` between lines and
/// words under `min_confidence` wrapped in a highlighted `<font>` tag.
fn html_text(words: &[TsvWord], min_confidence: i32) -> String {
    let mut out = String::new();
    let mut paragraph = None;
    let mut line = None;

    for word in words {
        let key = (word.block, word.paragraph);
        if paragraph != Some(key) {
            if paragraph.is_some() {
                out.push_str("</p>");
            }
            out.push_str("<p>");
            paragraph = Some(key);
            line = Some(word.line);
        } else if line != Some(word.line) {
            out.push_str("<br>");
            line = Some(word.line);
        } else {
            out.push(' ');
        }

        let text = html_escape::encode_text(&word.text);
        let confidence = word.confidence as i32;
        if confidence < min_confidence {
            let _ = write!(
                out,
                "<font conf='{}' color='#DF0000'>{}</font>",
                confidence, text
            );
        } else {
            out.push_str(&text);
        }
    }

    if paragraph.is_some() {
        out.push_str("</p>");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t200\t100\t-1\t
5\t1\t1\t1\t1\t1\t10\t10\t40\t12\t96.5\tHello
5\t1\t1\t1\t1\t2\t55\t10\t45\t12\t91\tworld
5\t1\t1\t1\t2\t1\t10\t30\t20\t12\t42.1\tR&D
5\t1\t2\t1\t1\t1\t10\t60\t30\t12\t88\tnext
5\t1\t2\t1\t1\t2\t45\t60\t30\t12\t-1\t
";

    #[test]
    fn test_parse_tsv_keeps_word_rows() {
        let words = parse_tsv(TSV);
        assert_eq!(words.len(), 4);
        assert_eq!(words[0].text, "Hello");
        assert_eq!(words[2].line, 2);
        assert_eq!(words[3].block, 2);
    }

    #[test]
    fn test_html_text_structure() {
        let words = parse_tsv(TSV);
        let html = html_text(&words, 70);
        assert_eq!(
            html,
            "<p>Hello world<br><font conf='42' color='#DF0000'>R&amp;D</font></p><p>next</p>"
        );
    }

    #[test]
    fn test_html_text_empty() {
        assert_eq!(html_text(&[], 70), "");
    }

    #[test]
    fn test_mean_confidence() {
        let words = parse_tsv(TSV);
        // (96.5 + 91 + 42.1 + 88) / 4 = 79.4
        assert_eq!(mean_confidence(&words), 79);
        assert_eq!(mean_confidence(&[]), 0);
    }

    #[test]
    fn test_recognize_without_init_fails_softly() {
        use crate::state::OperationState;

        let state = OperationState::new();
        let monitor = Monitor::new(&state);
        let mut engine = TesseractEngine::default();
        assert!(engine.recognize(&monitor).is_none());
    }

    #[test]
    fn test_missing_binary_fails_init() {
        let mut engine = TesseractEngine::new(Some("textscan-no-such-binary"));
        let result = engine.init(&EngineConfig::default());
        assert!(matches!(result, Err(OcrError::EngineInitFailed(_))));
    }

    #[test]
    fn test_html_text_escapes_markup() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t95\t<b>
";
        assert_eq!(html_text(&parse_tsv(tsv), 70), "<p>&lt;b&gt;</p>");
    }

    #[test]
    fn test_report_words_with_huge_boxes() {
        use crate::state::OperationState;

        let state = OperationState::new();
        let _scan = state.scan_region(Region::new(0, 0, 10, 10));
        let words = vec![TsvWord {
            block: 1,
            paragraph: 1,
            line: 1,
            left: i32::MAX - 1,
            top: i32::MAX - 1,
            width: 100,
            height: 100,
            confidence: 90.0,
            text: "edge".to_string(),
        }];
        report_words(&Monitor::new(&state), &words);
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::state::OperationState;
        use image::{DynamicImage, GrayImage};
        use std::os::unix::fs::PermissionsExt;
        use std::sync::Arc;

        /// Stand-in for the tesseract binary: answers `--version`, runs `body` otherwise
        fn fake_tesseract(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("tesseract");
            let script = format!(
                "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo \"tesseract 5.3.0\"; exit 0; fi\n{}\n",
                body
            );
            std::fs::write(&path, script).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn ready_engine(binary: &Path, work_dir: &Path) -> TesseractEngine {
            let mut engine = TesseractEngine::new(binary.to_str())
                .with_work_dir(work_dir.to_path_buf())
                .with_poll_interval(Duration::from_millis(10));
            engine.init(&EngineConfig::default()).unwrap();
            engine.set_page_seg_mode(PageSegMode::Auto);
            engine.set_image(&Pix::new(DynamicImage::ImageLuma8(GrayImage::new(8, 8))));
            engine
        }

        fn is_empty(dir: &Path) -> bool {
            std::fs::read_dir(dir).unwrap().next().is_none()
        }

        #[test]
        fn test_cancel_kills_running_pass() {
            let bin_dir = tempfile::tempdir().unwrap();
            let work_dir = tempfile::tempdir().unwrap();
            let binary = fake_tesseract(bin_dir.path(), "exec sleep 30");
            let mut engine = ready_engine(&binary, work_dir.path());

            let state = Arc::new(OperationState::new());
            let canceller = {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(200));
                    state.request_cancel()
                })
            };

            let started = Instant::now();
            let result = engine.recognize(&Monitor::new(&state));
            assert!(canceller.join().unwrap());
            assert!(result.is_none());
            assert!(started.elapsed() < Duration::from_secs(10));
            assert!(is_empty(work_dir.path()));
        }

        #[test]
        fn test_failed_pass_yields_nothing() {
            let bin_dir = tempfile::tempdir().unwrap();
            let work_dir = tempfile::tempdir().unwrap();
            let binary = fake_tesseract(bin_dir.path(), "exit 3");
            let mut engine = ready_engine(&binary, work_dir.path());

            let state = OperationState::new();
            assert!(engine.recognize(&Monitor::new(&state)).is_none());
            assert!(is_empty(work_dir.path()));
        }
    }
}
