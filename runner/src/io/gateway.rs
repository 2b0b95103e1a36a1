//! External command gateway.
//!
//! The [`Gateway`] trait is the only way a pass reaches the registration binary,
//! the package manager, and the service supervisor. Tests use a recording fake
//! that never spawns processes.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::command_line::{register_args, unregister_args};
use crate::core::error::ExitFailure;
use crate::core::repo::{self, RepoDefinition};
use crate::core::types::OsFamily;
use crate::io::config::ManagerConfig;
use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Host facts needed by the package and repository collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFacts {
    pub os_family: OsFamily,
    /// Distribution id, e.g. `Ubuntu`.
    pub distro: String,
    /// Release codename, e.g. `jammy`.
    pub release: String,
}

pub trait Gateway {
    fn register(&self, name: &str, args: &BTreeMap<String, String>) -> Result<(), ExitFailure>;
    fn unregister(&self, name: &str) -> Result<(), ExitFailure>;
    fn install_package(&self) -> Result<()>;
    fn ensure_service(&self, running: bool, enabled: bool) -> Result<()>;
    fn ensure_repo(&self, host: &HostFacts) -> Result<()>;
    /// Restart the service so it picks up a new configuration.
    fn reload_service(&self) -> Result<()>;
}

/// Gateway that shells out to the real tools on this host.
pub struct CommandGateway {
    config: ManagerConfig,
    host: HostFacts,
}

impl CommandGateway {
    pub fn new(config: ManagerConfig, host: HostFacts) -> Self {
        Self { config, host }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.command_timeout_secs)
    }

    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        run_command_with_timeout(program, args, self.timeout(), self.config.output_limit_bytes)
    }

    /// Run the registration binary, mapping any non-success to `ExitFailure`.
    fn run_binary(&self, args: &[String]) -> Result<(), ExitFailure> {
        let program = self.config.binary.display().to_string();
        let output = self
            .run(&program, args)
            .map_err(|err| ExitFailure::Spawn(format!("{err:#}")))?;
        if output.timed_out {
            return Err(ExitFailure::TimedOut {
                secs: self.config.command_timeout_secs,
            });
        }
        if !output.status.success() {
            return Err(ExitFailure::Status {
                code: output.status.code(),
                stderr: output.stderr_tail(),
            });
        }
        Ok(())
    }

    /// Run a host tool where any failure aborts the pass.
    fn run_checked(&self, argv: &[String]) -> Result<()> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("empty command"))?;
        let output = self.run(program, args)?;
        if output.timed_out {
            return Err(anyhow!(
                "{} timed out after {}s",
                argv.join(" "),
                self.config.command_timeout_secs
            ));
        }
        if !output.status.success() {
            warn!(command = %argv.join(" "), exit_code = ?output.status.code(), "command failed");
            return Err(anyhow!(
                "{} failed with status {:?}: {}",
                argv.join(" "),
                output.status.code(),
                output.stderr_tail()
            ));
        }
        Ok(())
    }

    fn service_command(&self, verb: &str) -> Vec<String> {
        vec![
            self.config.service.manager.clone(),
            verb.to_string(),
            self.config.service.name.clone(),
        ]
    }

    fn install_command(&self) -> Result<Vec<String>> {
        if let Some(command) = &self.config.package.install_command {
            return Ok(command.clone());
        }
        let package = self.config.package.name.clone();
        match self.host.os_family {
            OsFamily::Debian => Ok(vec![
                "apt-get".to_string(),
                "install".to_string(),
                "-y".to_string(),
                package,
            ]),
            OsFamily::RedHat => Ok(vec![
                "yum".to_string(),
                "install".to_string(),
                "-y".to_string(),
                package,
            ]),
            OsFamily::Other => Err(anyhow!(
                "no default package manager for this OS family; set package.install_command"
            )),
        }
    }
}

impl Gateway for CommandGateway {
    #[instrument(skip(self, args))]
    fn register(&self, name: &str, args: &BTreeMap<String, String>) -> Result<(), ExitFailure> {
        info!("registering runner");
        self.run_binary(&register_args(name, args))
    }

    #[instrument(skip(self))]
    fn unregister(&self, name: &str) -> Result<(), ExitFailure> {
        info!("unregistering runner");
        self.run_binary(&unregister_args(name))
    }

    #[instrument(skip(self))]
    fn install_package(&self) -> Result<()> {
        let command = self.install_command()?;
        debug!(command = %command.join(" "), "installing package");
        self.run_checked(&command).context("install package")
    }

    #[instrument(skip(self))]
    fn ensure_service(&self, running: bool, enabled: bool) -> Result<()> {
        let enable_verb = if enabled { "enable" } else { "disable" };
        self.run_checked(&self.service_command(enable_verb))
            .context("set service enablement")?;
        let run_verb = if running { "start" } else { "stop" };
        self.run_checked(&self.service_command(run_verb))
            .context("set service run state")
    }

    #[instrument(skip(self, host), fields(os_family = ?host.os_family, distro = %host.distro))]
    fn ensure_repo(&self, host: &HostFacts) -> Result<()> {
        match repo::definition(host.os_family, &host.distro, &host.release) {
            RepoDefinition::Apt(source) => {
                if source.release.is_empty() {
                    return Err(anyhow!("debian repository needs a release codename"));
                }
                let command: Vec<String> = self
                    .config
                    .repo
                    .apt_key_command
                    .iter()
                    .map(|arg| {
                        arg.replace("{key_id}", &source.key_id)
                            .replace("{key_server}", &source.key_server)
                    })
                    .collect();
                self.run_checked(&command).context("import apt signing key")?;
                let path = self.config.repo.apt_dir.join(format!("{}.list", source.name));
                write_repo_file(&path, &source.render())
            }
            RepoDefinition::Yum(repos) => {
                for repo in repos {
                    let path = self.config.repo.yum_dir.join(format!("{}.repo", repo.name));
                    write_repo_file(&path, &repo.render())?;
                }
                Ok(())
            }
            RepoDefinition::None => {
                debug!("no repository for this OS family");
                Ok(())
            }
        }
    }

    #[instrument(skip(self))]
    fn reload_service(&self) -> Result<()> {
        info!(service = %self.config.service.name, "restarting service");
        self.run_checked(&self.service_command("restart"))
            .context("restart service")
    }
}

fn write_repo_file(path: &Path, contents: &str) -> Result<()> {
    if fs::read_to_string(path).is_ok_and(|existing| existing == contents) {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))?;
    info!(path = %path.display(), "repository file written");
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fake_binary(dir: &Path, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-runner");
        fs::write(&path, format!("#!/bin/sh\n{script}\n")).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        path
    }

    fn gateway(dir: &Path, binary: PathBuf) -> CommandGateway {
        let config = ManagerConfig {
            binary,
            command_timeout_secs: 10,
            repo: crate::io::config::RepoConfig {
                apt_dir: dir.join("apt"),
                yum_dir: dir.join("yum"),
                apt_key_command: vec!["true".to_string()],
            },
            ..ManagerConfig::default()
        };
        CommandGateway::new(
            config,
            HostFacts {
                os_family: OsFamily::RedHat,
                distro: "CentOS".to_string(),
                release: String::new(),
            },
        )
    }

    #[test]
    fn register_passes_grammar_to_binary() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = temp.path().join("args.log");
        let binary = fake_binary(temp.path(), &format!("echo \"$@\" > {}", log.display()));
        let gw = gateway(temp.path(), binary);

        let mut args = BTreeMap::new();
        args.insert("executor".to_string(), "shell".to_string());
        gw.register("test_runner", &args).expect("register");

        let seen = fs::read_to_string(&log).expect("read log");
        assert_eq!(
            seen.trim(),
            "register --non-interactive --name=test_runner --executor=shell"
        );
        assert!(!seen.contains("--ensure="));
    }

    #[test]
    fn nonzero_exit_is_exit_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let binary = fake_binary(temp.path(), "echo 'no such runner' >&2; exit 1");
        let gw = gateway(temp.path(), binary);

        let err = gw.unregister("ghost").expect_err("should fail");
        assert_eq!(
            err,
            ExitFailure::Status {
                code: Some(1),
                stderr: "no such runner".to_string(),
            }
        );
    }

    #[test]
    fn missing_binary_is_spawn_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let gw = gateway(temp.path(), temp.path().join("absent"));
        assert!(matches!(
            gw.unregister("r"),
            Err(ExitFailure::Spawn(_))
        ));
    }

    #[test]
    fn redhat_repo_writes_two_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let gw = gateway(temp.path(), PathBuf::from("/bin/true"));
        gw.ensure_repo(&gw.host.clone()).expect("repo");

        let binary = fs::read_to_string(temp.path().join("yum/runner_gitlab-runner.repo"))
            .expect("binary repo");
        let source = fs::read_to_string(temp.path().join("yum/runner_gitlab-runner-source.repo"))
            .expect("source repo");
        assert!(binary.contains("baseurl=https://packages.gitlab.com/runner/gitlab-runner/el/$releasever/$basearch"));
        assert!(source.contains("SRPMS"));
    }

    #[test]
    fn debian_repo_requires_release() {
        let temp = tempfile::tempdir().expect("tempdir");
        let gw = gateway(temp.path(), PathBuf::from("/bin/true"));
        let host = HostFacts {
            os_family: OsFamily::Debian,
            distro: "Debian".to_string(),
            release: String::new(),
        };
        assert!(gw.ensure_repo(&host).is_err());

        let host = HostFacts {
            release: "bookworm".to_string(),
            ..host
        };
        gw.ensure_repo(&host).expect("repo");
        let list = fs::read_to_string(temp.path().join("apt/apt_gitlabci.list")).expect("list");
        assert!(list.contains("gitlab-runner/debian/ bookworm main"));
    }
}
