//! Diagnostic output for the CLI. Everything goes to stderr; stdout carries
//! only command results.

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

/// Shape of each stderr log line.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// One human-readable line per event.
    Text,
    /// One JSON object per event, for piping into other tools.
    Json,
}

/// How much of the pipeline's own chatter to show.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    /// Invalid configuration and I/O failures.
    Error,
    /// Data loss: queue overruns, blocks overrunning their frame,
    /// frames that could not be placed.
    Warn,
    Info,
    /// Frame lifecycle: frames opened and closed, tile crossings and warps,
    /// masked frames, scheduler resets.
    Debug,
    /// Per-round detail: every egress word, masked blocks, skipped slots.
    /// Large runs produce a lot of it.
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Install the global subscriber. A second call is a no-op, which keeps
/// in-process command tests from fighting over it.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let filter = level.as_filter();
    // Round numbers and lanes are already fields on every pipeline event.
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(filter)
        .with_ansi(false)
        .with_target(filter >= LevelFilter::TRACE);

    let installed = match format {
        LogFormat::Text => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().flatten_event(true).try_init().is_ok(),
    };
    if installed {
        tracing::debug!(?format, level = %filter, "logging ready");
    }
}
