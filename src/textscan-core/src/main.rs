//! Textscan - OCR of scanned pages from the command line
//!
//! Runs book page OCR, layout analysis and OCR of selected layout blocks
//! through the Tesseract engine. Ctrl+C cancels the running operation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use textscan_core::colored_logger::{init_component_logger, Component};
use textscan_core::config::Config;
use textscan_core::events::{collect_events, ChannelListener, Collected};
use textscan_core::interrupt::Interrupt;
use textscan_ocr::{
    tesseract_version, BasicLayout, Block, LayoutElements, Outcome, Pix, Region,
    TesseractEngine, TesseractOcr,
};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "textscan")]
#[command(about = "OCR of scanned book pages and selected layout blocks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Straighten, binarize and recognise a whole book page
    Book {
        /// Page image
        image: PathBuf,

        /// Recognition language (overrides the config file)
        #[arg(short, long)]
        language: Option<String>,

        /// Directory for result files
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Detect pictures and segment the page into text and image blocks
    Layout {
        /// Page image
        image: PathBuf,

        /// Directory for block images and the layout summary
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Analyse the layout, then recognise the selected blocks
    Select {
        /// Page image
        image: PathBuf,

        /// Indices of the text blocks to recognise (all when omitted)
        #[arg(long, value_delimiter = ',')]
        texts: Option<Vec<usize>>,

        /// Indices of the image blocks to keep on the assembled page
        #[arg(long, value_delimiter = ',')]
        images: Vec<usize>,

        /// Recognition language (overrides the config file)
        #[arg(short, long)]
        language: Option<String>,

        /// Directory for result files
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check the Tesseract installation and language data
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let component = match cli.command {
        Commands::Book { .. } => Component::Book,
        Commands::Layout { .. } => Component::Layout,
        Commands::Select { .. } => Component::Select,
        Commands::Check => Component::Main,
    };
    init_component_logger(component, cli.verbose)?;

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Book { image, language, output } => {
            if let Some(language) = language {
                config.engine.language = language;
            }
            cmd_book(config, image, output)?;
        }
        Commands::Layout { image, output } => {
            cmd_layout(config, image, output)?;
        }
        Commands::Select { image, texts, images, language, output } => {
            if let Some(language) = language {
                config.engine.language = language;
            }
            cmd_select(config, image, texts, images, output)?;
        }
        Commands::Check => {
            cmd_check(&config)?;
        }
    }

    Ok(())
}

fn create_ocr(config: &Config) -> TesseractOcr {
    let engine = TesseractEngine::new(config.engine.tesseract_binary.as_deref());
    TesseractOcr::new(engine, BasicLayout::new(), config.engine_config())
        .with_debug_timing(config.debug.timing)
}

fn open_page(image: &Path) -> Result<Pix> {
    let page = Pix::open(image).with_context(|| format!("Failed to open image {:?}", image))?;
    info!("loaded {:?} ({}x{}, depth {})", image, page.width(), page.height(), page.depth());
    Ok(page)
}

fn prepare_output_dir(config: &Config, output: Option<PathBuf>) -> Result<PathBuf> {
    let dir = output.unwrap_or_else(|| config.resolve_output_dir());
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create output directory {:?}", dir))?;
    Ok(dir)
}

fn file_stem(image: &Path) -> String {
    image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string())
}

#[tokio::main]
async fn cmd_book(config: Config, image: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let output_dir = prepare_output_dir(&config, output)?;
    let page = open_page(&image)?;

    let mut ocr = create_ocr(&config);
    let interrupt = Interrupt::new(ocr.cancel_handle());
    interrupt.install()?;

    let (listener, rx) = ChannelListener::new();
    let task = tokio::task::spawn_blocking(move || ocr.ocr_book_page(&page, listener));

    let collected = collect_events(rx, config.output.show_progress).await;
    let outcome = interrupt.settle(task.await?);

    if outcome == Outcome::Completed {
        write_results(&output_dir, &file_stem(&image), &collected)?;
    }
    report_outcome(outcome);
    Ok(())
}

#[tokio::main]
async fn cmd_layout(config: Config, image: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let output_dir = prepare_output_dir(&config, output)?;
    let page = open_page(&image)?;

    let mut ocr = create_ocr(&config);
    let interrupt = Interrupt::new(ocr.cancel_handle());
    interrupt.install()?;

    let (listener, rx) = ChannelListener::new();
    let task = tokio::task::spawn_blocking(move || ocr.analyse_layout(&page, listener));

    let collected = collect_events(rx, config.output.show_progress).await;
    let outcome = interrupt.settle(task.await?);

    if let (Outcome::Completed, Some(layout)) = (outcome, &collected.layout) {
        write_layout(&output_dir, &file_stem(&image), layout, outcome)?;
        print_layout(layout);
    }
    report_outcome(outcome);
    Ok(())
}

#[tokio::main]
async fn cmd_select(
    config: Config,
    image: PathBuf,
    texts: Option<Vec<usize>>,
    images: Vec<usize>,
    output: Option<PathBuf>,
) -> Result<()> {
    let output_dir = prepare_output_dir(&config, output)?;
    let page = open_page(&image)?;
    let stem = file_stem(&image);
    let show_progress = config.output.show_progress;

    let mut ocr = create_ocr(&config);
    let interrupt = Interrupt::new(ocr.cancel_handle());
    interrupt.install()?;

    let (listener, rx) = ChannelListener::new();
    let task = tokio::task::spawn_blocking(move || {
        let outcome = ocr.analyse_layout(&page, listener);
        (ocr, outcome)
    });

    let analysis = collect_events(rx, show_progress).await;
    let (mut ocr, outcome) = task.await?;

    let layout = match (interrupt.settle(outcome), analysis.layout) {
        (Outcome::Completed, Some(layout)) => layout,
        (outcome, _) => {
            report_outcome(outcome);
            return Ok(());
        }
    };
    write_layout(&output_dir, &stem, &layout, outcome)?;

    // begin() resets the engine-side flag, so an interrupt that landed
    // between the phases has to stop the command here
    if interrupt.is_set() {
        report_outcome(Outcome::Cancelled);
        return Ok(());
    }

    let texts = texts.unwrap_or_else(|| (0..layout.texts.len()).collect());
    info!("recognising text blocks {:?} with image blocks {:?}", texts, images);

    let (listener, rx) = ChannelListener::new();
    let task = tokio::task::spawn_blocking(move || {
        ocr.ocr_selected(&layout, &texts, &images, listener)
    });

    let collected = collect_events(rx, show_progress).await;
    let outcome = interrupt.settle(task.await?);

    if outcome == Outcome::Completed {
        write_results(&output_dir, &stem, &collected)?;
    }
    report_outcome(outcome);
    Ok(())
}

fn cmd_check(config: &Config) -> Result<()> {
    println!("checking dependencies...\n");

    let binary = config.engine.tesseract_binary.as_deref().unwrap_or("tesseract");
    let version = tesseract_version(binary);
    match version {
        Ok(ref version) => println!("  tesseract: {} ({})", "OK".green(), version),
        Err(ref e) => println!("  tesseract: {} ({})", "NOT FOUND".red(), e),
    }

    let mut data_ok = true;
    if let Some(ref dir) = config.engine.tessdata_dir {
        let dir_ok = dir.is_dir();
        println!(
            "  tessdata:  {} ({:?})",
            if dir_ok { "OK".green().to_string() } else { "MISSING".red().to_string() },
            dir
        );
        data_ok &= dir_ok;

        for language in config.engine.language.split('+') {
            let file = dir.join(format!("{}.traineddata", language));
            let found = file.is_file();
            println!(
                "  {:9}  {}",
                language,
                if found { "OK".green().to_string() } else { "NOT FOUND".red().to_string() }
            );
            data_ok &= found;
        }
    } else {
        println!("  tessdata:  engine default (language {})", config.engine.language);
    }

    println!();

    if version.is_err() {
        println!("WARNING: Tesseract is required for text recognition.");
        println!("Please install Tesseract and ensure it's in your PATH.");
    } else if !data_ok {
        println!("WARNING: language data is incomplete, recognition will fail.");
    } else {
        println!("all checks passed!");
    }

    Ok(())
}

fn write_results(output_dir: &Path, stem: &str, collected: &Collected) -> Result<()> {
    if let Some(ref hocr) = collected.hocr {
        let path = output_dir.join(format!("{}.hocr", stem));
        std::fs::write(&path, hocr).with_context(|| format!("Failed to write {:?}", path))?;
        info!("hOCR written to {:?}", path);
    }

    if let Some(ref text) = collected.text {
        let path = output_dir.join(format!("{}.html", stem));
        std::fs::write(&path, text).with_context(|| format!("Failed to write {:?}", path))?;
        info!("text written to {:?}", path);
    }

    if let Some(ref pix) = collected.final_pix {
        let path = output_dir.join(format!("{}_final.png", stem));
        pix.save(&path)?;
        info!("final page written to {:?}", path);
    }

    Ok(())
}

fn write_layout(output_dir: &Path, stem: &str, layout: &LayoutElements, outcome: Outcome) -> Result<()> {
    for (kind, blocks) in [("text", &layout.texts), ("image", &layout.images)] {
        for (i, block) in blocks.iter().enumerate() {
            let path = output_dir.join(format!("{}_{}_{}.png", stem, kind, i));
            block.pix.save(&path)?;
        }
    }

    let regions = |blocks: &[Block]| blocks.iter().map(|b| b.region).collect::<Vec<Region>>();
    let summary = serde_json::json!({
        "texts": regions(&layout.texts),
        "images": regions(&layout.images),
        "outcome": outcome,
        "analysed_at": chrono::Local::now().to_rfc3339(),
    });
    let path = output_dir.join(format!("{}_layout.json", stem));
    std::fs::write(&path, serde_json::to_string_pretty(&summary)?)
        .with_context(|| format!("Failed to write {:?}", path))?;
    info!("layout written to {:?}", path);

    Ok(())
}

fn print_layout(layout: &LayoutElements) {
    println!("found {} text and {} image block(s):\n", layout.texts.len(), layout.images.len());
    for (i, block) in layout.texts.iter().enumerate() {
        println!("  text {}:  {}", i, block.region);
    }
    for (i, block) in layout.images.iter().enumerate() {
        println!("  image {}: {}", i, block.region);
    }
    println!();
}

fn report_outcome(outcome: Outcome) {
    match outcome {
        Outcome::Completed => info!("operation {}", outcome),
        Outcome::Cancelled => warn!("operation {}", outcome),
        Outcome::Failed => error!("operation {}, see log for details", outcome),
    }
}
