use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::exit::{CliError, CliResult, USAGE};

/// Crates whose events `--log-level` governs. Everything else stays at `warn`.
const LINK_TARGETS: [&str; 4] = [
    "robolink",
    "robolink_transport",
    "robolink_packet",
    "robolink_link",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    /// Includes one line per raw read off the transport.
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// `level` for the link crates, then the `target=level` directives in `extra`
/// (comma separated), which win over it.
pub fn build_filter(level: LogLevel, extra: Option<&str>) -> CliResult<EnvFilter> {
    let level = level.as_filter();
    let mut directives = vec![LevelFilter::WARN.to_string()];
    directives.extend(LINK_TARGETS.iter().map(|target| format!("{target}={level}")));
    if let Some(extra) = extra.map(str::trim).filter(|extra| !extra.is_empty()) {
        directives.push(extra.to_string());
    }

    EnvFilter::try_new(directives.join(","))
        .map_err(|err| CliError::new(USAGE, format!("invalid --log-filter: {err}")))
}

/// Install the stderr subscriber. Link loop threads log through it too, so their
/// thread names are included.
pub fn init_logging(format: LogFormat, level: LogLevel, extra: Option<&str>) -> CliResult<()> {
    let filter = build_filter(level, extra)?;
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_thread_names(true);

    // A subscriber that is already installed (tests) keeps its place.
    let _ = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(layer.with_target(false))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init(),
    };
    Ok(())
}
