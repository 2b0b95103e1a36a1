//! Typed renderer for the global options stanza.
//!
//! Each known key has a fixed formatting rule (quoted string vs bare scalar)
//! and a fixed position, so output never depends on how settings were supplied.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::fragments::Fragment;
use crate::core::types::GLOBAL_OPTIONS_ORDER;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Runner,
    Text,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Runner => "runner",
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

/// Scalar value for forward-compatible settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

/// Global agent settings. `None` means "not set" and is never emitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    pub concurrent: Option<u32>,
    pub log_level: Option<LogLevel>,
    pub log_format: Option<LogFormat>,
    pub check_interval: Option<u32>,
    pub sentry_dsn: Option<String>,
    pub listen_address: Option<String>,
    /// Keys this renderer has no typed slot for; emitted after the known keys
    /// in ascending key order.
    #[serde(default)]
    pub extra: BTreeMap<String, ScalarValue>,
}

impl GlobalSettings {
    pub fn is_empty(&self) -> bool {
        self.lines().is_empty()
    }

    /// `(key, rendered value)` pairs in emission order.
    fn lines(&self) -> Vec<(String, String)> {
        let mut lines = Vec::new();
        if let Some(concurrent) = self.concurrent {
            lines.push(("concurrent".to_string(), concurrent.to_string()));
        }
        if let Some(level) = self.log_level {
            lines.push(("log_level".to_string(), quote(level.as_str())));
        }
        if let Some(format) = self.log_format {
            lines.push(("log_format".to_string(), quote(format.as_str())));
        }
        if let Some(interval) = self.check_interval {
            lines.push(("check_interval".to_string(), interval.to_string()));
        }
        if let Some(dsn) = &self.sentry_dsn {
            lines.push(("sentry_dsn".to_string(), quote(dsn)));
        }
        if let Some(address) = &self.listen_address {
            lines.push(("listen_address".to_string(), quote(address)));
        }
        for (key, value) in &self.extra {
            lines.push((key.clone(), render_scalar(value)));
        }
        lines
    }
}

/// Build the global options fragment, or `None` when nothing is set.
pub fn render(target: &str, settings: &GlobalSettings) -> Option<Fragment> {
    let lines = settings.lines();
    if lines.is_empty() {
        return None;
    }
    let mut content = String::new();
    for (key, value) in lines {
        content.push_str(&format!("{key} = {value}\n"));
    }
    Some(Fragment::new(
        target,
        format!("{target} - global options"),
        GLOBAL_OPTIONS_ORDER,
        content,
    ))
}

pub fn render_scalar(value: &ScalarValue) -> String {
    match value {
        ScalarValue::Bool(flag) => flag.to_string(),
        ScalarValue::Integer(number) => number.to_string(),
        // Debug keeps the fractional part (`1.0`), so the value stays a float.
        ScalarValue::Float(number) => format!("{number:?}"),
        ScalarValue::String(text) => quote(text),
    }
}

/// Quote as a TOML basic string.
pub fn quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for ch in raw.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{:04X}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
