//! `runner-fleet`: keep a host's CI runners in line with a declaration.
//!
//! `render` and `plan` are read-only; `apply` runs a full reconciliation pass.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use runner_fleet::apply::{plan_pass, prepare, run_apply};
use runner_fleet::core::command_line::action_args;
use runner_fleet::core::types::OsFamily;
use runner_fleet::exit_codes;
use runner_fleet::io::config::{DEFAULT_CONFIG_PATH, ManagerConfig, load_config};
use runner_fleet::io::declaration::load_declaration;
use runner_fleet::io::gateway::{CommandGateway, HostFacts};
use runner_fleet::logging;

#[derive(Parser)]
#[command(
    name = "runner-fleet",
    version,
    about = "Declarative manager for CI runner registrations"
)]
struct Cli {
    /// Manager config (TOML). Missing file means built-in defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log at info level when `RUST_LOG` is unset.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the assembled agent configuration file.
    Render {
        /// Declaration file (TOML).
        declaration: PathBuf,
    },
    /// Print the register/unregister actions the next pass would take.
    Plan {
        /// Declaration file (TOML).
        declaration: PathBuf,
    },
    /// Run a full reconciliation pass.
    Apply {
        /// Declaration file (TOML).
        declaration: PathBuf,
        /// Host OS family: debian, redhat, or anything else.
        #[arg(long, default_value = "other")]
        os_family: String,
        /// Distribution id, e.g. Ubuntu.
        #[arg(long, default_value = "")]
        distro: String,
        /// Release codename, e.g. jammy.
        #[arg(long, default_value = "")]
        release: String,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config = load_config(&cli.config)?;
    match cli.command {
        Command::Render { declaration } => cmd_render(&config, &declaration),
        Command::Plan { declaration } => cmd_plan(&config, &declaration),
        Command::Apply {
            declaration,
            os_family,
            distro,
            release,
        } => {
            let host = HostFacts {
                os_family: OsFamily::parse(&os_family),
                distro,
                release,
            };
            cmd_apply(config, &declaration, host)
        }
    }
}

fn cmd_render(config: &ManagerConfig, path: &Path) -> Result<i32> {
    let declaration = load_declaration(path)?;
    let prepared = prepare(config, &declaration)?;
    print!("{}", prepared.file.contents());
    Ok(exit_codes::OK)
}

fn cmd_plan(config: &ManagerConfig, path: &Path) -> Result<i32> {
    let declaration = load_declaration(path)?;
    for action in plan_pass(config, &declaration)? {
        match action_args(&action) {
            Some(args) => println!("{}: {} {}", action, config.binary.display(), args.join(" ")),
            None => println!("{action}"),
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_apply(config: ManagerConfig, path: &Path, host: HostFacts) -> Result<i32> {
    let declaration = load_declaration(path)?;
    let gateway = CommandGateway::new(config.clone(), host.clone());
    let report = run_apply(&config, &declaration, &host, &gateway)?;
    println!(
        "config: {:?}, actions applied: {}, reloaded: {}",
        report.file,
        report.applied(),
        report.reloaded
    );
    let failures = report.failures();
    if failures.is_empty() {
        return Ok(exit_codes::OK);
    }
    for failure in failures {
        eprintln!("{failure}");
    }
    Ok(exit_codes::ACTION_FAILED)
}
