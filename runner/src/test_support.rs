//! Test-only fakes for driving passes without spawning processes.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Result, anyhow};

use crate::core::error::ExitFailure;
use crate::core::types::OsFamily;
use crate::io::config::ManagerConfig;
use crate::io::gateway::{Gateway, HostFacts};
use crate::io::state_store::{JsonStateStore, StateFile, StateStore};

/// One call observed by [`RecordingGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Register {
        name: String,
        args: Vec<(String, String)>,
    },
    Unregister {
        name: String,
    },
    InstallPackage,
    EnsureService {
        running: bool,
        enabled: bool,
    },
    EnsureRepo,
    Reload,
}

/// Gateway that records calls; runners named in `failing` exit non-zero.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    calls: RefCell<Vec<GatewayCall>>,
    failing: RefCell<BTreeSet<String>>,
    reload_failures: Cell<usize>,
}

impl RecordingGateway {
    pub fn failing(names: &[&str]) -> Self {
        let gateway = Self::default();
        gateway
            .failing
            .borrow_mut()
            .extend(names.iter().map(|name| (*name).to_string()));
        gateway
    }

    /// Make the next `count` reloads fail (after being recorded).
    pub fn fail_reloads(&self, count: usize) {
        self.reload_failures.set(count);
    }

    pub fn clear_failures(&self) {
        self.failing.borrow_mut().clear();
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.borrow().clone()
    }

    fn outcome(&self, name: &str) -> Result<(), ExitFailure> {
        if self.failing.borrow().contains(name) {
            return Err(ExitFailure::Status {
                code: Some(1),
                stderr: format!("scripted failure for {name}"),
            });
        }
        Ok(())
    }
}

impl Gateway for RecordingGateway {
    fn register(&self, name: &str, args: &BTreeMap<String, String>) -> Result<(), ExitFailure> {
        self.calls.borrow_mut().push(GatewayCall::Register {
            name: name.to_string(),
            args: args
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        });
        self.outcome(name)
    }

    fn unregister(&self, name: &str) -> Result<(), ExitFailure> {
        self.calls.borrow_mut().push(GatewayCall::Unregister {
            name: name.to_string(),
        });
        self.outcome(name)
    }

    fn install_package(&self) -> Result<()> {
        self.calls.borrow_mut().push(GatewayCall::InstallPackage);
        Ok(())
    }

    fn ensure_service(&self, running: bool, enabled: bool) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(GatewayCall::EnsureService { running, enabled });
        Ok(())
    }

    fn ensure_repo(&self, _host: &HostFacts) -> Result<()> {
        self.calls.borrow_mut().push(GatewayCall::EnsureRepo);
        Ok(())
    }

    fn reload_service(&self) -> Result<()> {
        self.calls.borrow_mut().push(GatewayCall::Reload);
        let left = self.reload_failures.get();
        if left > 0 {
            self.reload_failures.set(left - 1);
            return Err(anyhow!("scripted reload failure"));
        }
        Ok(())
    }
}

/// JSON state store whose next `failures` saves fail without touching disk.
#[derive(Debug)]
pub struct FlakyStateStore {
    inner: JsonStateStore,
    failures: Cell<usize>,
    saves: Cell<usize>,
}

impl FlakyStateStore {
    pub fn new(path: &Path, failures: usize) -> Self {
        Self {
            inner: JsonStateStore::new(path),
            failures: Cell::new(failures),
            saves: Cell::new(0),
        }
    }

    /// Saves attempted so far, failed ones included.
    pub fn saves(&self) -> usize {
        self.saves.get()
    }
}

impl StateStore for FlakyStateStore {
    fn load(&self) -> Result<StateFile> {
        self.inner.load()
    }

    fn save(&self, state: &StateFile) -> Result<()> {
        self.saves.set(self.saves.get() + 1);
        let left = self.failures.get();
        if left > 0 {
            self.failures.set(left - 1);
            return Err(anyhow!("scripted state write failure"));
        }
        self.inner.save(state)
    }
}

/// Manager config rooted in `dir`, with ownership management disabled.
pub fn test_config(dir: &Path) -> ManagerConfig {
    let mut config = ManagerConfig {
        config_path: dir.join("etc").join("config.toml"),
        state_path: dir.join("state").join("state.json"),
        ..ManagerConfig::default()
    };
    config.file.manage_ownership = false;
    config.file.mode = "0644".to_string();
    config
}

pub fn host() -> HostFacts {
    HostFacts {
        os_family: OsFamily::Debian,
        distro: "Ubuntu".to_string(),
        release: "jammy".to_string(),
    }
}
