//! CLI tests for `runner-fleet render` and `runner-fleet plan`.
//!
//! Spawns the binary against a temp manager config and checks the assembled
//! file byte for byte.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use runner_fleet::exit_codes;

fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("manager.toml");
    fs::write(
        &path,
        format!(
            "config_path = \"{}\"\nstate_path = \"{}\"\n[file]\nmanage_ownership = false\n",
            dir.join("config.toml").display(),
            dir.join("state.json").display()
        ),
    )
    .expect("write manager config");
    path
}

fn run(dir: &Path, args: &[&str], declaration: &str) -> Output {
    let config = write_config(dir);
    let declaration_path = dir.join("fleet.toml");
    fs::write(&declaration_path, declaration).expect("write declaration");
    Command::new(env!("CARGO_BIN_EXE_runner-fleet"))
        .arg("--config")
        .arg(&config)
        .args(args)
        .arg(&declaration_path)
        .output()
        .expect("spawn runner-fleet")
}

fn render(declaration: &str) -> String {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run(temp.path(), &["render"], declaration);
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("utf8")
}

#[test]
fn concurrent_only_renders_single_global_line() {
    let out = render("[global]\nconcurrent = 10\n");
    assert_eq!(out, "# MANAGED BY RUNNER-FLEET\nconcurrent = 10\n");
}

#[test]
fn log_format_is_quoted() {
    let out = render("[global]\nlog_format = \"json\"\n");
    assert_eq!(out, "# MANAGED BY RUNNER-FLEET\nlog_format = \"json\"\n");
}

#[test]
fn empty_declaration_renders_header_only() {
    assert_eq!(render(""), "# MANAGED BY RUNNER-FLEET\n");
}

#[test]
fn runners_render_in_name_order_after_globals() {
    let out = render(
        "[global]\ncheck_interval = 6\n[runners.zulu]\n[runners.alpha]\n[runners.gone]\nensure = \"absent\"\n",
    );
    assert_eq!(
        out,
        "# MANAGED BY RUNNER-FLEET\ncheck_interval = 6\n# runner alpha\n# runner zulu\n"
    );
}

#[test]
fn render_is_byte_stable() {
    let declaration = "[global]\nsentry_dsn = \"https://123abc@localhost/1\"\nlisten_address = \"localhost:9252\"\n[runners.b]\n[runners.a]\n";
    assert_eq!(render(declaration), render(declaration));
}

#[test]
fn invalid_declaration_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run(
        temp.path(),
        &["render"],
        "[runners.r.registration_args]\nensure = \"present\"\n",
    );
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("reserved"));
}

#[test]
fn plan_prints_register_command_without_ensure_flag() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run(
        temp.path(),
        &["plan"],
        "[runner_defaults]\nurl = \"https://git.example.com/ci\"\n[runners.test_runner]\n",
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert_eq!(
        stdout,
        "register test_runner: /usr/bin/gitlab-runner register --non-interactive --name=test_runner --url=https://git.example.com/ci\n"
    );
    assert!(!stdout.contains("--ensure="));
}
