//! Declaration checks that must pass before any side effect.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::error::ValidationError;
use crate::core::global_options::{GlobalSettings, ScalarValue};
use crate::core::types::{RUNNER_ORDER, RunnerSpec};

static RUNNER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("valid regex"));
static FLAG_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("valid regex"));
static SETTING_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid regex"));

/// Flags the command builder owns; a declaration may not set them.
const RESERVED_FLAGS: &[&str] = &["ensure", "name", "non-interactive"];

const KNOWN_SETTINGS: &[&str] = &[
    "concurrent",
    "log_level",
    "log_format",
    "check_interval",
    "sentry_dsn",
    "listen_address",
];

/// Check global settings and runner specs, collecting every violation.
pub fn validate_declaration(
    settings: &GlobalSettings,
    specs: &[RunnerSpec],
) -> Result<(), ValidationError> {
    let mut violations = Vec::new();
    check_settings(settings, &mut violations);
    check_runners(specs, &mut violations);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}

fn check_settings(settings: &GlobalSettings, violations: &mut Vec<String>) {
    if settings.concurrent == Some(0) {
        violations.push("concurrent must be > 0".to_string());
    }
    if let Some(dsn) = &settings.sentry_dsn
        && dsn.trim().is_empty()
    {
        violations.push("sentry_dsn must not be empty".to_string());
    }
    if let Some(address) = &settings.listen_address
        && !is_listen_address(address)
    {
        violations.push(format!(
            "listen_address '{address}' must be <host>:<port>"
        ));
    }
    for (key, value) in &settings.extra {
        if !SETTING_KEY.is_match(key) {
            violations.push(format!("setting key '{key}' is not a bare TOML key"));
        }
        if KNOWN_SETTINGS.contains(&key.as_str()) {
            violations.push(format!("setting '{key}' must use its typed field"));
        }
        if let ScalarValue::Float(number) = value
            && !number.is_finite()
        {
            violations.push(format!("setting '{key}' must be a finite number"));
        }
    }
}

fn check_runners(specs: &[RunnerSpec], violations: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for spec in specs {
        if !seen.insert(spec.name.as_str()) {
            violations.push(format!("duplicate runner name '{}'", spec.name));
        }
        if !RUNNER_NAME.is_match(&spec.name) {
            violations.push(format!("runner name '{}' is invalid", spec.name));
        }
        if let Some(order) = spec.order
            && order < RUNNER_ORDER
        {
            violations.push(format!(
                "runner '{}': order {order} must be >= {RUNNER_ORDER}",
                spec.name
            ));
        }
        for (key, value) in &spec.registration_args {
            if RESERVED_FLAGS.contains(&key.as_str()) {
                violations.push(format!(
                    "runner '{}': registration arg '{key}' is reserved",
                    spec.name
                ));
            } else if !FLAG_KEY.is_match(key) {
                violations.push(format!(
                    "runner '{}': registration arg '{key}' is not a valid flag name",
                    spec.name
                ));
            }
            if value.contains(['\n', '\0']) {
                violations.push(format!(
                    "runner '{}': registration arg '{key}' contains a newline or NUL",
                    spec.name
                ));
            }
        }
    }
}

fn is_listen_address(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((_, port)) => port.parse::<u16>().is_ok(),
        None => false,
    }
}
