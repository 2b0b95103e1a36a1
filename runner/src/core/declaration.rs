//! The declared fleet: global settings plus named runners.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::assembler::MANAGED_HEADER;
use crate::core::error::AssemblyError;
use crate::core::fragments::{Fragment, FragmentStore};
use crate::core::global_options::{self, GlobalSettings};
use crate::core::types::{Ensure, HEADER_ORDER, RUNNER_ORDER, RunnerSpec};

/// Per-runner entry as written in a declaration (the name is the map key).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerEntry {
    pub ensure: Ensure,
    pub registration_args: BTreeMap<String, String>,
    pub order: Option<i64>,
}

/// Full declaration processed by one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Declaration {
    /// Register the upstream package repository before installing.
    pub manage_repo: bool,
    pub manage_package: bool,
    pub manage_service: bool,
    pub global: GlobalSettings,
    /// Registration args shared by every runner; a runner's own args win.
    pub runner_defaults: BTreeMap<String, String>,
    pub runners: BTreeMap<String, RunnerEntry>,
}

impl Default for Declaration {
    fn default() -> Self {
        Self {
            manage_repo: false,
            manage_package: true,
            manage_service: true,
            global: GlobalSettings::default(),
            runner_defaults: BTreeMap::new(),
            runners: BTreeMap::new(),
        }
    }
}

impl Declaration {
    /// Runner specs with `runner_defaults` merged in, ascending by name.
    pub fn runner_specs(&self) -> Vec<RunnerSpec> {
        self.runners
            .iter()
            .map(|(name, entry)| {
                let mut args = self.runner_defaults.clone();
                args.extend(
                    entry
                        .registration_args
                        .iter()
                        .map(|(key, value)| (key.clone(), value.clone())),
                );
                RunnerSpec {
                    name: name.clone(),
                    ensure: entry.ensure,
                    registration_args: args,
                    order: entry.order,
                }
            })
            .collect()
    }
}

/// Name of the fragment a runner contributes to `target`.
pub fn runner_fragment_name(target: &str, runner: &str) -> String {
    format!("{target} - runner {runner}")
}

/// Collect the header, global options and per-runner fragments for `target`.
///
/// Absent runners contribute nothing. A repeated runner name is an assembly
/// defect, not a silent overwrite.
pub fn build_fragments(
    target: &str,
    settings: &GlobalSettings,
    specs: &[RunnerSpec],
) -> Result<FragmentStore, AssemblyError> {
    let mut store = FragmentStore::new();
    store.insert(Fragment::new(
        target,
        format!("{target} - header"),
        HEADER_ORDER,
        MANAGED_HEADER,
    ))?;
    if let Some(fragment) = global_options::render(target, settings) {
        store.insert(fragment)?;
    }
    for spec in specs.iter().filter(|spec| spec.ensure == Ensure::Present) {
        store.insert(Fragment::new(
            target,
            runner_fragment_name(target, &spec.name),
            spec.order.unwrap_or(RUNNER_ORDER),
            format!("# runner {}", spec.name),
        ))?;
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::assembler::{FileMetadata, render};

    const TARGET: &str = "/etc/gitlab-runner/config.toml";

    fn runner(name: &str) -> RunnerSpec {
        RunnerSpec::new(name, Ensure::Present)
    }

    #[test]
    fn defaults_merge_under_runner_args() {
        let mut declaration = Declaration::default();
        declaration
            .runner_defaults
            .insert("url".to_string(), "https://git.example.com/ci".to_string());
        declaration
            .runner_defaults
            .insert("executor".to_string(), "docker".to_string());
        let mut entry = RunnerEntry::default();
        entry
            .registration_args
            .insert("executor".to_string(), "shell".to_string());
        declaration.runners.insert("test_runner".to_string(), entry);

        let specs = declaration.runner_specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "test_runner");
        assert_eq!(specs[0].ensure, Ensure::Present);
        assert_eq!(specs[0].registration_args["executor"], "shell");
        assert_eq!(
            specs[0].registration_args["url"],
            "https://git.example.com/ci"
        );
    }

    #[test]
    fn header_then_globals_then_runners() {
        let settings = GlobalSettings {
            concurrent: Some(10),
            ..GlobalSettings::default()
        };
        let store =
            build_fragments(TARGET, &settings, &[runner("zeta"), runner("alpha")]).expect("build");
        let contents = render(&store, TARGET, &FileMetadata::default()).contents();
        assert_eq!(
            contents,
            "# MANAGED BY RUNNER-FLEET\nconcurrent = 10\n# runner alpha\n# runner zeta\n"
        );
    }

    #[test]
    fn no_settings_means_no_global_stanza() {
        let store =
            build_fragments(TARGET, &GlobalSettings::default(), &[runner("a")]).expect("build");
        let contents = render(&store, TARGET, &FileMetadata::default()).contents();
        assert_eq!(contents, "# MANAGED BY RUNNER-FLEET\n# runner a\n");
    }

    #[test]
    fn explicit_order_overrides_name_order() {
        let mut first = runner("zeta");
        first.order = Some(2);
        let mut second = runner("alpha");
        second.order = Some(3);
        let store =
            build_fragments(TARGET, &GlobalSettings::default(), &[second, first]).expect("build");
        let contents = render(&store, TARGET, &FileMetadata::default()).contents();
        assert_eq!(
            contents,
            "# MANAGED BY RUNNER-FLEET\n# runner zeta\n# runner alpha\n"
        );
    }

    #[test]
    fn absent_runner_has_no_fragment() {
        let store = build_fragments(
            TARGET,
            &GlobalSettings::default(),
            &[RunnerSpec::new("gone", Ensure::Absent)],
        )
        .expect("build");
        assert_eq!(store.list(TARGET).len(), 1);
    }

    #[test]
    fn duplicate_runner_is_assembly_error() {
        let err = build_fragments(
            TARGET,
            &GlobalSettings::default(),
            &[runner("dup"), runner("dup")],
        )
        .expect_err("duplicate");
        assert!(matches!(err, AssemblyError::DuplicateFragment { .. }));
    }
}
