//! Minimal stderr logger.
//!
//! Records print as `[elapsed LEVEL target] message`. The workspace's own
//! `geoprompt*` targets and third-party targets get separate levels, so `-v`
//! raises our detail without flooding the output with dependency logs.
//! Install once at startup with [`init_with_filter`].

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::prelude::*;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Target prefix shared by every crate of this workspace.
pub const OWN_TARGET: &str = "geoprompt";

/// Per-origin log levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogFilter {
    /// Level for `geoprompt*` targets.
    pub own: LevelFilter,
    /// Level for every other target.
    pub others: LevelFilter,
}

impl LogFilter {
    pub fn uniform(level: LevelFilter) -> Self {
        Self {
            own: level,
            others: level,
        }
    }

    /// `-v` raises our own crates one step at a time; dependencies stay at
    /// `Warn` until `-vvv`.
    pub fn from_verbosity(verbose: u8) -> Self {
        Self {
            own: level_from_verbosity(verbose),
            others: if verbose >= 3 {
                LevelFilter::Trace
            } else {
                LevelFilter::Warn
            },
        }
    }

    pub fn level_for(&self, target: &str) -> LevelFilter {
        if target.starts_with(OWN_TARGET) {
            self.own
        } else {
            self.others
        }
    }

    /// Most verbose level of the two.
    pub fn max(&self) -> LevelFilter {
        self.own.max(self.others)
    }

    /// The same filter in `RUST_LOG` syntax, e.g. `warn,geoprompt=debug`.
    pub fn directives(&self) -> String {
        format!(
            "{},{OWN_TARGET}={}",
            self.others.as_str().to_ascii_lowercase(),
            self.own.as_str().to_ascii_lowercase()
        )
    }
}

struct StderrLogger {
    filter: LogFilter,
    started: Instant,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.filter.level_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let target = record.target().split("::").next().unwrap_or_default();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:8.3}s {:>5} {}] {}",
            elapsed,
            record.level(),
            target,
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger.
///
/// Calling this more than once is a no-op after the first successful
/// initialization.
pub fn init_with_filter(filter: LogFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| StderrLogger {
            filter,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(filter.max());
    }
    Ok(())
}

/// [`init_with_filter`] with one level for every target.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    init_with_filter(LogFilter::uniform(level))
}

/// `0 -> Warn`, `1 -> Info`, `2 -> Debug`, `3+ -> Trace`.
pub fn level_from_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install a `tracing` subscriber writing to stderr. `RUST_LOG`, when set,
/// replaces `filter`.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool, filter: LogFilter) {
    let env =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter.directives()));
    let output: Box<dyn Layer<Registry> + Send + Sync> = if json {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(fmt::time::Uptime::default())
            .with_writer(std::io::stderr)
            .boxed()
    };
    let _ = tracing_subscriber::registry()
        .with(output)
        .with(env)
        .try_init();
}
