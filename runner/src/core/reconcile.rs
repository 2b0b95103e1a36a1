//! Runner lifecycle reconciliation.
//!
//! `plan` is a pure function of the declared specs and the observed state; it
//! never touches the registration binary. Execution lives in `crate::apply`.

use std::collections::BTreeMap;

use crate::core::types::{Ensure, ReconcileAction, RunnerSpec, RunnerStatus};

/// Capability for looking up the last observed registration status.
pub trait RunnerState {
    /// Status for `name`; names without a record are `Unregistered`.
    fn status(&self, name: &str) -> RunnerStatus;
}

impl RunnerState for BTreeMap<String, RunnerStatus> {
    fn status(&self, name: &str) -> RunnerStatus {
        self.get(name).copied().unwrap_or(RunnerStatus::Unregistered)
    }
}

/// Decide the action for one runner.
pub fn decide(spec: &RunnerSpec, status: RunnerStatus) -> ReconcileAction {
    let name = spec.name.clone();
    match (spec.ensure, status) {
        (Ensure::Present, RunnerStatus::Unregistered | RunnerStatus::Unknown) => {
            ReconcileAction::Register {
                name,
                args: spec.registration_args.clone(),
            }
        }
        (Ensure::Present, RunnerStatus::Registered) => ReconcileAction::NoOp { name },
        (Ensure::Absent, RunnerStatus::Registered | RunnerStatus::Unknown) => {
            ReconcileAction::Unregister { name }
        }
        (Ensure::Absent, RunnerStatus::Unregistered) => ReconcileAction::NoOp { name },
    }
}

/// Actions for every declared runner, in ascending name order.
pub fn plan<S: RunnerState + ?Sized>(specs: &[RunnerSpec], state: &S) -> Vec<ReconcileAction> {
    let mut sorted: Vec<&RunnerSpec> = specs.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    sorted
        .into_iter()
        .map(|spec| decide(spec, state.status(&spec.name)))
        .collect()
}
