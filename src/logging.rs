//! Tracing subscriber setup for the `photo-ingest` binary.
//!
//! Logs go to stderr so they never interleave with the progress lines and
//! summary printed on stdout.
//!
//! # Priority (highest to lowest)
//!
//! 1. `PHOTO_INGEST_LOG` env var (directives, e.g. `photo_ingest::manifest=debug,warn`)
//! 2. `RUST_LOG` env var
//! 3. CLI flags (`-v` → debug, `-q` → error)
//! 4. Default level: `warn`

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Project-specific filter variable.
pub const LOG_ENV: &str = "PHOTO_INGEST_LOG";

/// Verbosity level derived from CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// `--quiet` / `-q`: only errors.
    Quiet,
    /// Default: warnings and above.
    Normal,
    /// `--verbose` / `-v`: debug output from this crate.
    Verbose,
}

impl Verbosity {
    /// Verbose wins if both flags are given.
    #[must_use]
    pub const fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    #[must_use]
    pub const fn default_level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose => Level::DEBUG,
        }
    }
}

/// Install the global subscriber. Call once, first thing in `main`.
///
/// # Panics
///
/// Panics if a global subscriber is already set.
pub fn init_subscriber(verbosity: Verbosity, no_color: bool) {
    let filter = build_env_filter(
        verbosity,
        std::env::var(LOG_ENV).ok().as_deref(),
        std::env::var("RUST_LOG").ok().as_deref(),
    );

    let stderr_is_tty = std::io::IsTerminal::is_terminal(&std::io::stderr());
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(!no_color && stderr_is_tty)
        .with_target(verbosity == Verbosity::Verbose)
        .with_level(true);

    if verbosity == Verbosity::Verbose {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.with_timer(fmt::time::uptime()))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.without_time().compact())
            .init();
    }
}

/// `PHOTO_INGEST_LOG` > `RUST_LOG` > CLI verbosity. Unparseable values fall through.
fn build_env_filter(
    verbosity: Verbosity,
    project_env: Option<&str>,
    rust_log: Option<&str>,
) -> EnvFilter {
    for directives in [project_env, rust_log].into_iter().flatten() {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return filter;
        }
    }

    let level = verbosity.default_level();
    let directive = if verbosity == Verbosity::Verbose {
        format!("info,{}={level}", env!("CARGO_CRATE_NAME"))
    } else {
        level.to_string()
    };
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}
