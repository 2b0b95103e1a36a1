//! Manager configuration, read from `/etc/runner-fleet/manager.toml` by default.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::assembler::FileMetadata;
use crate::io::managed_file::{RUNNER_SECTION, SyncOptions};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/runner-fleet/manager.toml";

/// Manager configuration (TOML).
///
/// Describes where the agent lives on this host and how to talk to it.
/// Missing fields default to a stock `gitlab-runner` install.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ManagerConfig {
    /// Registration binary invoked for `register` / `unregister`.
    pub binary: PathBuf,

    /// Managed agent configuration file.
    pub config_path: PathBuf,

    /// Last observed registration status per runner (JSON).
    pub state_path: PathBuf,

    /// Wall-clock limit for every external command, in seconds.
    pub command_timeout_secs: u64,

    /// Keep at most this many bytes of stdout/stderr per command.
    pub output_limit_bytes: usize,

    pub file: FileConfig,
    pub package: PackageConfig,
    pub service: ServiceConfig,
    pub repo: RepoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileConfig {
    pub owner: String,
    pub group: String,
    /// Octal permission string, e.g. `"0444"`.
    pub mode: String,
    /// Run `chown` after writing. Disable when not running as root.
    pub manage_ownership: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PackageConfig {
    pub name: String,
    /// Overrides the OS-family default (`apt-get install -y` / `yum install -y`).
    pub install_command: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    /// Service supervisor CLI (`systemctl <verb> <name>`).
    pub manager: String,
    pub running: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepoConfig {
    pub apt_dir: PathBuf,
    pub yum_dir: PathBuf,
    /// Command that imports the APT signing key; `{key_id}` and
    /// `{key_server}` are substituted.
    pub apt_key_command: Vec<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            owner: "root".to_string(),
            group: "root".to_string(),
            mode: "0444".to_string(),
            manage_ownership: true,
        }
    }
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            name: "gitlab-runner".to_string(),
            install_command: None,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "gitlab-runner".to_string(),
            manager: "systemctl".to_string(),
            running: true,
            enabled: true,
        }
    }
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            apt_dir: PathBuf::from("/etc/apt/sources.list.d"),
            yum_dir: PathBuf::from("/etc/yum.repos.d"),
            apt_key_command: vec![
                "apt-key".to_string(),
                "adv".to_string(),
                "--keyserver".to_string(),
                "{key_server}".to_string(),
                "--recv-keys".to_string(),
                "{key_id}".to_string(),
            ],
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("/usr/bin/gitlab-runner"),
            config_path: PathBuf::from("/etc/gitlab-runner/config.toml"),
            state_path: PathBuf::from("/var/lib/runner-fleet/state.json"),
            command_timeout_secs: 5 * 60,
            output_limit_bytes: 100_000,
            file: FileConfig::default(),
            package: PackageConfig::default(),
            service: ServiceConfig::default(),
            repo: RepoConfig::default(),
        }
    }
}

impl ManagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.binary.as_os_str().is_empty() {
            return Err(anyhow!("binary must not be empty"));
        }
        if !self.config_path.is_absolute() {
            return Err(anyhow!("config_path must be absolute"));
        }
        parse_mode(&self.file.mode)?;
        if let Some(command) = &self.package.install_command
            && (command.is_empty() || command[0].trim().is_empty())
        {
            return Err(anyhow!("package.install_command must be a non-empty array"));
        }
        if self.service.manager.trim().is_empty() {
            return Err(anyhow!("service.manager must not be empty"));
        }
        Ok(())
    }

    /// Fixed metadata of the managed file.
    pub fn file_metadata(&self) -> Result<FileMetadata> {
        Ok(FileMetadata {
            owner: self.file.owner.clone(),
            group: self.file.group.clone(),
            mode: parse_mode(&self.file.mode)?,
        })
    }

    /// Write options for the managed file. The registration binary's
    /// `[[runners]]` stanzas are carried over on every rewrite.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            manage_ownership: self.file.manage_ownership,
            preserve_from: Some(RUNNER_SECTION.to_string()),
            timeout: Duration::from_secs(self.command_timeout_secs),
            output_limit_bytes: self.output_limit_bytes,
        }
    }

    /// Managed file path as the fragment target id.
    pub fn target(&self) -> String {
        self.config_path.display().to_string()
    }
}

fn parse_mode(raw: &str) -> Result<u32> {
    let mode = u32::from_str_radix(raw, 8).map_err(|_| anyhow!("file.mode '{raw}' is not octal"))?;
    if mode > 0o7777 {
        return Err(anyhow!("file.mode '{raw}' is out of range"));
    }
    Ok(mode)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ManagerConfig::default()`.
pub fn load_config(path: &Path) -> Result<ManagerConfig> {
    if !path.exists() {
        let cfg = ManagerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ManagerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
