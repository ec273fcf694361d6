use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// All crates of the relaydelay workspace.
///
/// These receive the configured log level, while third-party crates stay at `INFO`.
const CRATE_NAMES: &[&str] = &[
    "relaydelay",
    "relaydelay_common",
    "relaydelay_config",
    "relaydelay_log",
    "relaydelay_metrics",
    "relaydelay_server",
    "relaydelay_store",
    "relaydelay_telemetry",
];

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO relaydelay::setup: launching collector period=60s
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2024-05-04T12:10:32.123456Z  INFO relaydelay::setup: launching collector period=60s
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2024-05-04T12:11:08.729716Z","level":"INFO","message":"launching collector","period":"60s","target":"relaydelay::setup"}
    /// ```
    Json,
}

/// The maximum level of log messages emitted by relaydelay crates.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Disables logging.
    Off,
    /// Only errors.
    Error,
    /// Warnings and errors.
    Warn,
    /// The default.
    Info,
    /// Messages relevant to debugging.
    Debug,
    /// Everything.
    Trace,
}

impl Level {
    /// Returns the corresponding `tracing` filter.
    pub fn level_filter(self) -> LevelFilter {
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

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.level_filter().fmt(f)
    }
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for relaydelay crates.
    pub level: Level,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on the TTY.
    pub format: LogFormat,

    /// When set to `true`, backtraces are forced on.
    ///
    /// Otherwise, backtraces can be enabled by setting the `RUST_BACKTRACE` variable to `full`.
    pub enable_backtraces: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: LogFormat::Auto,
            enable_backtraces: false,
        }
    }
}

/// Builds the filter directives used when `RUST_LOG` is not set.
fn default_directives(level: Level) -> String {
    // INFO for all third-party crates. The MongoDB driver logs every pooled connection event on
    // INFO, so it gets a higher level.
    let mut directives = String::from("info,mongodb=warn");

    for name in CRATE_NAMES {
        directives.push_str(&format!(",{name}={level}"));
    }

    directives
}

/// Initialize the logging system.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this more than once has no
/// effect.
///
/// # Example
///
/// ```
/// let log_config = relaydelay_log::LogConfig {
///     enable_backtraces: true,
///     ..Default::default()
/// };
///
/// relaydelay_log::init(&log_config);
/// ```
pub fn init(config: &LogConfig) {
    if config.enable_backtraces {
        // SAFETY: logging is initialized on the main thread before the runtime starts.
        unsafe { env::set_var("RUST_BACKTRACE", "full") };
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config.level)));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match (config.format, console::user_attended()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => {
            subscriber.compact().without_time().try_init()
        }
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => {
            subscriber.with_ansi(false).try_init()
        }
        (LogFormat::Json, _) => subscriber
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .try_init(),
    };

    // A subscriber has already been registered, for example by a test harness.
    result.ok();
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_default_directives() {
        let directives = default_directives(Level::Debug);
        assert!(directives.starts_with("info,mongodb=warn,relaydelay=debug,"));
        assert!(directives.ends_with(",relaydelay_telemetry=debug"));
    }

    #[test]
    fn test_log_config_from_json() {
        let config: LogConfig =
            serde_json::from_str(r#"{"level": "trace", "format": "json"}"#).unwrap();
        assert_eq!(config.level, Level::Trace);
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.enable_backtraces);
    }
}
