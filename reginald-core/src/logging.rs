//! Structured logging setup (§2 ambient "Logging" row).
//!
//! A single [`init`] call wires `tracing` up for the whole process: an
//! `EnvFilter` driven by `RUST_LOG` (falling back to the configured level),
//! and a choice of the teacher's two renderings — pretty for a human at a
//! terminal, JSON for anything that pipes Reginald's output into another
//! tool. Every component, including the in-process bridge that rebuilds a
//! plugin's `log` RPC calls as host log records (see
//! [`crate::rpc::protocol::LogRecord::emit`]), goes through this one
//! subscriber.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::Result;

/// Rendering chosen for log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?}, want \"pretty\" or \"json\"")),
        }
    }
}

/// Install the global `tracing` subscriber. `level` is the default filter
/// directive (e.g. `"info"`) used when `RUST_LOG` is unset; `format` picks
/// pretty vs. JSON rendering. Call once, at process start.
pub fn init(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => {
            registry
                .with(fmt::layer().with_target(false).with_level(true))
                .try_init()
                .map_err(|e| crate::error::ReginaldError::Logging(e.to_string()))?;
        }
        LogFormat::Json => {
            registry
                .with(fmt::layer().json().with_target(true).with_current_span(false))
                .try_init()
                .map_err(|e| crate::error::ReginaldError::Logging(e.to_string()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_formats() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
    }

    #[test]
    fn rejects_unknown_format() {
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
