//! Typed wrappers for the five RPC exchanges in §4.4: `handshake`,
//! `runCommand`, `shutdown`, `exit`, and the inbound `log` request.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

/// Fixed values the host sends on every handshake; every plugin must echo
/// them back verbatim alongside its own name.
pub const PROTOCOL: &str = "jsonrpc";
pub const PROTOCOL_VERSION: &str = "2.0";

#[derive(Debug, Clone, Serialize)]
pub struct HandshakeRequest {
    pub protocol: &'static str,
    #[serde(rename = "protocolVersion")]
    pub protocol_version: &'static str,
}

impl Default for HandshakeRequest {
    fn default() -> Self {
        Self {
            protocol: PROTOCOL,
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HandshakeReply {
    pub protocol: String,
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunCommandRequest {
    pub cmd: String,
    pub config: Value,
    #[serde(rename = "pluginConfig")]
    pub plugin_config: Value,
}

/// The source location a plugin's `log` call originated from, if it chose
/// to report one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSource {
    pub function: String,
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogAttr {
    pub key: String,
    pub value: Value,
}

/// Inbound `log` request from a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub time: String,
    pub level: i64,
    pub message: String,
    #[serde(default)]
    pub source: Option<LogSource>,
    #[serde(default)]
    pub attrs: Vec<LogAttr>,
}

impl LogRecord {
    /// Rebuild this record in the host's own logger, enriched with the
    /// plugin's name and its `attrs`, grouped values unfolded recursively
    /// into dotted keys.
    pub fn emit(&self, plugin_name: &str) {
        let attrs = flatten_attrs(&self.attrs);
        let source = self
            .source
            .as_ref()
            .map(|s| format!(" ({}:{} in {})", s.file, s.line, s.function))
            .unwrap_or_default();

        match self.level {
            l if l >= 16 => error!(plugin = plugin_name, attrs = %attrs, "{}{source}", self.message),
            l if l >= 8 => warn!(plugin = plugin_name, attrs = %attrs, "{}{source}", self.message),
            l if l >= 0 => info!(plugin = plugin_name, attrs = %attrs, "{}{source}", self.message),
            l if l >= -4 => debug!(plugin = plugin_name, attrs = %attrs, "{}{source}", self.message),
            _ => trace!(plugin = plugin_name, attrs = %attrs, "{}{source}", self.message),
        }
    }
}

fn flatten_attrs(attrs: &[LogAttr]) -> String {
    let mut parts = Vec::new();
    for attr in attrs {
        flatten_value(&attr.key, &attr.value, &mut parts);
    }
    parts.join(", ")
}

fn flatten_value(prefix: &str, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten_value(&format!("{prefix}.{k}"), v, out);
            }
        }
        other => out.push(format!("{prefix}={other}")),
    }
}
