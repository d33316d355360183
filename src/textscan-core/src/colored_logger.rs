//! Colored log output for the textscan commands
//!
//! Every line carries the command that produced it. With `--verbose` the
//! emitting module is shown too, which tells engine output
//! (`textscan_ocr::tesseract`) apart from operation bookkeeping.

use owo_colors::{OwoColorize, Style};
use std::fmt;
use std::io;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

/// Command a log line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Main,
    Book,
    Layout,
    Select,
}

impl Component {
    pub fn label(&self) -> &'static str {
        match self {
            Component::Main => "textscan",
            Component::Book => "book",
            Component::Layout => "layout",
            Component::Select => "select",
        }
    }

    fn style(&self) -> Style {
        match self {
            Component::Main => Style::new().cyan().bold(),
            Component::Book => Style::new().green().bold(),
            Component::Layout => Style::new().yellow().bold(),
            Component::Select => Style::new().magenta().bold(),
        }
    }
}

fn level_style(level: Level) -> Style {
    match level {
        Level::ERROR => Style::new().red().bold(),
        Level::WARN => Style::new().yellow().bold(),
        Level::INFO => Style::new().green(),
        Level::DEBUG => Style::new().blue(),
        Level::TRACE => Style::new().dimmed(),
    }
}

/// Event formatter: `time command level [target] message`
pub struct ComponentFormatter {
    component: Component,
    show_target: bool,
}

impl ComponentFormatter {
    pub fn new(component: Component, show_target: bool) -> Self {
        Self { component, show_target }
    }
}

impl<S, N> FormatEvent<S, N> for ComponentFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let level = *metadata.level();

        let time = chrono::Local::now().format("%H:%M:%S%.3f").to_string();
        write!(writer, "{} ", time.dimmed())?;
        write!(writer, "{:>8} ", self.component.label().style(self.component.style()))?;
        write!(writer, "{:<5} ", level.as_str().style(level_style(level)))?;

        if self.show_target {
            write!(writer, "{} ", metadata.target().dimmed())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install the global subscriber for `component`, writing to stderr.
///
/// `RUST_LOG` directives are honoured; `verbose` raises the default level
/// to debug and adds module targets.
pub fn init_component_logger(component: Component, verbose: bool) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(ComponentFormatter::new(component, verbose))
                .with_writer(io::stderr),
        )
        .try_init()?;

    Ok(())
}
