//! Tracing subscriber setup shared by the Detour binaries.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor an explicit filter is given.
pub const DEFAULT_FILTER: &str = "info,detour=debug,tower_http=debug";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },
    #[error("unknown log format '{0}'")]
    UnknownFormat(String),
    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable, multi-line output.
    #[default]
    Pretty,
    /// Compact single-line output.
    Compact,
    /// One JSON object per line.
    Json,
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(TelemetryError::UnknownFormat(other.to_string())),
        }
    }
}

/// Builds the filter: the explicit directive wins, then `RUST_LOG`, then
/// [`DEFAULT_FILTER`].
pub fn env_filter(directive: Option<&str>) -> Result<EnvFilter> {
    match directive {
        Some(filter) => EnvFilter::try_new(filter).map_err(|err| TelemetryError::InvalidFilter {
            filter: filter.to_string(),
            reason: err.to_string(),
        }),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Installs the global subscriber.
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init(directive: Option<&str>, format: LogFormat) -> Result<()> {
    let filter = env_filter(directive)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init(),
    };

    installed.map_err(|err| TelemetryError::Install(err.to_string()))
}
