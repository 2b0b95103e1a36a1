//! Argument grammar of the registration binary.
//!
//! Presence is the binary's default, so no `--ensure=` flag is ever produced.

use std::collections::BTreeMap;

use crate::core::types::ReconcileAction;

/// `register --non-interactive --name=<name> --<key>=<value>...`, keys ascending.
pub fn register_args(name: &str, args: &BTreeMap<String, String>) -> Vec<String> {
    let mut argv = vec![
        "register".to_string(),
        "--non-interactive".to_string(),
        format!("--name={name}"),
    ];
    argv.extend(args.iter().map(|(key, value)| format!("--{key}={value}")));
    argv
}

/// `unregister --name=<name>`.
pub fn unregister_args(name: &str) -> Vec<String> {
    vec!["unregister".to_string(), format!("--name={name}")]
}

/// Arguments for an action, or `None` for `NoOp`.
pub fn action_args(action: &ReconcileAction) -> Option<Vec<String>> {
    match action {
        ReconcileAction::Register { name, args } => Some(register_args(name, args)),
        ReconcileAction::Unregister { name } => Some(unregister_args(name)),
        ReconcileAction::NoOp { .. } => None,
    }
}
