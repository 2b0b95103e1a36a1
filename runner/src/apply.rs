//! Orchestration for one reconciliation pass (`runner-fleet apply`).
//!
//! Order: validate → assemble → repo → package → config file → runner actions
//! → service → reload. Validation and assembly finish before any side effect.
//! A reload is owed whenever the managed file was rewritten or a runner action
//! succeeded; the debt lives in the state store until the restart succeeds.

use anyhow::{Context, Result};
use tracing::{error, info, instrument, warn};

use crate::core::assembler::{AssembledFile, render};
use crate::core::declaration::{Declaration, build_fragments};
use crate::core::error::ActionFailure;
use crate::core::reconcile::plan;
use crate::core::types::{ReconcileAction, RunnerSpec, RunnerStatus};
use crate::core::validate::validate_declaration;
use crate::io::config::ManagerConfig;
use crate::io::gateway::{Gateway, HostFacts};
use crate::io::managed_file::{FileSync, sync_file};
use crate::io::state_store::{JsonStateStore, StateFile, StateStore, load_state};

/// Validated declaration plus its assembled file, ready to apply.
#[derive(Debug, Clone)]
pub struct PreparedPass {
    pub specs: Vec<RunnerSpec>,
    pub file: AssembledFile,
}

/// What happened to one runner during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub action: ReconcileAction,
    pub result: Result<(), ActionFailure>,
}

/// Summary of a completed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub file: FileSync,
    pub actions: Vec<ActionOutcome>,
    pub reloaded: bool,
}

impl ApplyReport {
    pub fn failures(&self) -> Vec<&ActionFailure> {
        self.actions
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().err())
            .collect()
    }

    pub fn succeeded(&self) -> bool {
        self.failures().is_empty()
    }

    /// Register/unregister actions that exited successfully.
    pub fn applied(&self) -> usize {
        self.actions
            .iter()
            .filter(|outcome| !outcome.action.is_noop() && outcome.result.is_ok())
            .count()
    }
}

/// Validate the declaration and assemble the managed file. No side effects.
pub fn prepare(config: &ManagerConfig, declaration: &Declaration) -> Result<PreparedPass> {
    let specs = declaration.runner_specs();
    validate_declaration(&declaration.global, &specs)?;
    let target = config.target();
    let store = build_fragments(&target, &declaration.global, &specs)?;
    let file = render(&store, &target, &config.file_metadata()?);
    Ok(PreparedPass { specs, file })
}

/// Actions the next pass would take, given the stored state.
pub fn plan_pass(config: &ManagerConfig, declaration: &Declaration) -> Result<Vec<ReconcileAction>> {
    let prepared = prepare(config, declaration)?;
    let state = load_state(&config.state_path)?;
    Ok(plan(&prepared.specs, &state))
}

/// Run a full pass against `gateway`, keeping state in `config.state_path`.
pub fn run_apply<G: Gateway>(
    config: &ManagerConfig,
    declaration: &Declaration,
    host: &HostFacts,
    gateway: &G,
) -> Result<ApplyReport> {
    let store = JsonStateStore::new(&config.state_path);
    run_apply_with_store(config, declaration, host, gateway, &store)
}

/// Run a full pass against `gateway` and `store`.
///
/// Runner failures are collected in the report rather than returned; every
/// other failure aborts the pass with an error. A needed reload is recorded
/// in the state before it is attempted and cleared only once it succeeds, so
/// an aborted pass leaves it for the next one.
#[instrument(skip_all, fields(runners = declaration.runners.len()))]
pub fn run_apply_with_store<G: Gateway, S: StateStore + ?Sized>(
    config: &ManagerConfig,
    declaration: &Declaration,
    host: &HostFacts,
    gateway: &G,
    store: &S,
) -> Result<ApplyReport> {
    let prepared = prepare(config, declaration)?;

    if declaration.manage_repo {
        gateway.ensure_repo(host).context("ensure package repository")?;
    }
    if declaration.manage_package {
        gateway.install_package()?;
    }

    let mut state = store.load()?;
    let file = sync_file(&prepared.file, &config.sync_options())
        .with_context(|| format!("sync {}", prepared.file.path))?;
    let mut saved = true;
    if file == FileSync::Written && config.service.running {
        state.reload_pending = true;
        saved = save_or_defer(store, &state);
    }

    let actions = plan(&prepared.specs, &state);
    let mut outcomes = Vec::with_capacity(actions.len());
    for action in actions {
        let result = execute(gateway, &action);
        let status = match &result {
            Ok(()) => action.resulting_status(),
            Err(failure) => {
                error!(runner = %failure.runner, reason = %failure.reason, "runner action failed");
                Some(RunnerStatus::Unknown)
            }
        };
        if let Some(status) = status {
            state.record(action.name(), status);
            if result.is_ok() && config.service.running {
                state.reload_pending = true;
            }
            saved = save_or_defer(store, &state);
        }
        outcomes.push(ActionOutcome { action, result });
    }
    // Each save carries the whole state, so only the last one has to land.
    if !saved {
        store.save(&state).context("persist runner state")?;
    }

    if declaration.manage_service {
        gateway.ensure_service(config.service.running, config.service.enabled)?;
    }

    let mut report = ApplyReport {
        file,
        actions: outcomes,
        reloaded: false,
    };
    if config.service.running && state.reload_pending {
        gateway.reload_service()?;
        state.reload_pending = false;
        store.save(&state).context("clear pending reload")?;
        report.reloaded = true;
    }

    if report.succeeded() {
        info!(
            file = ?report.file,
            applied = report.applied(),
            reloaded = report.reloaded,
            "pass complete"
        );
    } else {
        warn!(failed = report.failures().len(), "pass finished with failures");
    }
    Ok(report)
}

/// Save `state`, logging instead of failing. Returns whether it landed.
fn save_or_defer<S: StateStore + ?Sized>(store: &S, state: &StateFile) -> bool {
    match store.save(state) {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "state write failed, retrying before the pass ends");
            false
        }
    }
}

fn execute<G: Gateway>(gateway: &G, action: &ReconcileAction) -> Result<(), ActionFailure> {
    let (verb, result) = match action {
        ReconcileAction::Register { name, args } => ("register", gateway.register(name, args)),
        ReconcileAction::Unregister { name } => ("unregister", gateway.unregister(name)),
        ReconcileAction::NoOp { .. } => return Ok(()),
    };
    result.map_err(|err| ActionFailure {
        runner: action.name().to_string(),
        action: verb,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::declaration::RunnerEntry;
    use crate::core::types::Ensure;
    use crate::test_support::{FlakyStateStore, GatewayCall, RecordingGateway, test_config};

    fn declaration(runners: &[(&str, Ensure)]) -> Declaration {
        let mut declaration = Declaration {
            manage_package: false,
            manage_service: false,
            ..Declaration::default()
        };
        for (name, ensure) in runners {
            declaration.runners.insert(
                (*name).to_string(),
                RunnerEntry {
                    ensure: *ensure,
                    ..RunnerEntry::default()
                },
            );
        }
        declaration
    }

    #[test]
    fn second_pass_is_noop() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = test_config(temp.path());
        let gateway = RecordingGateway::default();
        let host = crate::test_support::host();
        let declaration = declaration(&[("test_runner", Ensure::Present)]);

        let first = run_apply(&config, &declaration, &host, &gateway).expect("first");
        assert_eq!(first.file, FileSync::Written);
        assert_eq!(first.applied(), 1);
        assert!(first.reloaded);

        let second = run_apply(&config, &declaration, &host, &gateway).expect("second");
        assert_eq!(second.file, FileSync::Unchanged);
        assert_eq!(second.applied(), 0);
        assert!(!second.reloaded);

        let registers = gateway
            .calls()
            .into_iter()
            .filter(|call| matches!(call, GatewayCall::Register { .. }))
            .count();
        assert_eq!(registers, 1);
    }

    #[test]
    fn failed_action_is_retried_next_pass() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = test_config(temp.path());
        let gateway = RecordingGateway::failing(&["flaky"]);
        let host = crate::test_support::host();
        let declaration = declaration(&[("flaky", Ensure::Present), ("steady", Ensure::Present)]);

        let first = run_apply(&config, &declaration, &host, &gateway).expect("first");
        assert!(!first.succeeded());
        assert_eq!(first.failures()[0].runner, "flaky");
        assert_eq!(first.applied(), 1);

        let state = load_state(&config.state_path).expect("state");
        assert_eq!(state.runners["flaky"], RunnerStatus::Unknown);
        assert_eq!(state.runners["steady"], RunnerStatus::Registered);

        gateway.clear_failures();
        let second = run_apply(&config, &declaration, &host, &gateway).expect("second");
        assert!(second.succeeded());
        assert_eq!(second.applied(), 1);
        assert!(matches!(
            &second.actions[0].action,
            ReconcileAction::Register { name, .. } if name == "flaky"
        ));
    }

    #[test]
    fn validation_failure_has_no_side_effects() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = test_config(temp.path());
        let gateway = RecordingGateway::default();
        let mut declaration = declaration(&[("bad name", Ensure::Present)]);
        declaration.manage_package = true;

        let err = run_apply(&config, &declaration, &crate::test_support::host(), &gateway)
            .expect_err("invalid");
        assert!(format!("{err:#}").contains("runner name 'bad name' is invalid"));
        assert!(gateway.calls().is_empty());
        assert!(!config.config_path.exists());
    }

    #[test]
    fn managed_collaborators_run_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = test_config(temp.path());
        let gateway = RecordingGateway::default();
        let mut declaration = declaration(&[("r", Ensure::Present)]);
        declaration.manage_repo = true;
        declaration.manage_package = true;
        declaration.manage_service = true;

        run_apply(&config, &declaration, &crate::test_support::host(), &gateway).expect("apply");
        assert_eq!(
            gateway.calls(),
            vec![
                GatewayCall::EnsureRepo,
                GatewayCall::InstallPackage,
                GatewayCall::Register {
                    name: "r".to_string(),
                    args: Vec::new(),
                },
                GatewayCall::EnsureService {
                    running: true,
                    enabled: true,
                },
                GatewayCall::Reload,
            ]
        );
    }

    #[test]
    fn plan_pass_reads_stored_state() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = test_config(temp.path());
        let declaration = declaration(&[("a", Ensure::Absent), ("b", Ensure::Present)]);

        let actions = plan_pass(&config, &declaration).expect("plan");
        assert!(actions[0].is_noop());
        assert!(matches!(&actions[1], ReconcileAction::Register { name, .. } if name == "b"));
    }

    #[test]
    fn state_write_failure_after_register_is_retried_in_pass() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = test_config(temp.path());
        config.service.running = false;
        let gateway = RecordingGateway::default();
        let host = crate::test_support::host();
        let declaration = declaration(&[("test_runner", Ensure::Present)]);
        let store = FlakyStateStore::new(&config.state_path, 1);

        let first = run_apply_with_store(&config, &declaration, &host, &gateway, &store)
            .expect("first");
        assert_eq!(first.applied(), 1);
        assert_eq!(store.saves(), 2);
        assert_eq!(
            load_state(&config.state_path).expect("state").runners["test_runner"],
            RunnerStatus::Registered
        );

        let second = run_apply(&config, &declaration, &host, &gateway).expect("second");
        assert_eq!(second.applied(), 0);
        assert_eq!(gateway.calls().len(), 1);
    }

    #[test]
    fn persistent_state_write_failure_aborts_pass() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = test_config(temp.path());
        config.service.running = false;
        let gateway = RecordingGateway::default();
        let declaration = declaration(&[("test_runner", Ensure::Present)]);
        let store = FlakyStateStore::new(&config.state_path, usize::MAX);

        let err = run_apply_with_store(
            &config,
            &declaration,
            &crate::test_support::host(),
            &gateway,
            &store,
        )
        .expect_err("state never lands");
        assert!(format!("{err:#}").contains("persist runner state"));
    }

    #[test]
    fn pending_reload_is_recorded_before_restart() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = test_config(temp.path());
        let gateway = RecordingGateway::default();
        gateway.fail_reloads(1);
        let declaration = declaration(&[]);

        run_apply(&config, &declaration, &crate::test_support::host(), &gateway)
            .expect_err("reload fails");
        assert!(load_state(&config.state_path).expect("state").reload_pending);

        let second =
            run_apply(&config, &declaration, &crate::test_support::host(), &gateway).expect("second");
        assert_eq!(second.file, FileSync::Unchanged);
        assert!(second.reloaded);
        assert!(!load_state(&config.state_path).expect("state").reload_pending);
    }
}
