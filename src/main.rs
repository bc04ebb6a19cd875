//! Statecraft CLI entry point.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use statecraft::inventory::Inventory;
use statecraft::playbook::{Playbook, PlaybookRunner, RunOptions};
use statecraft::registry::TaskRegistry;
use statecraft::scope::{Scope, Value};

#[derive(Parser)]
#[command(
    name = "statecraft",
    version,
    about = "Apply Ansible-compatible playbooks to hosts"
)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a playbook
    Run {
        /// Path to the playbook file
        playbook: PathBuf,

        /// Path to the inventory file (defaults to implicit localhost)
        #[arg(short, long)]
        inventory: Option<PathBuf>,

        /// Limit execution to a single host
        #[arg(short, long)]
        limit: Option<String>,

        /// Extra variables (KEY=VALUE or a JSON object), highest precedence
        #[arg(short, long = "extra-vars")]
        extra_vars: Vec<String>,

        /// Report what would change without applying anything
        #[arg(long)]
        check: bool,
    },

    /// Parse a playbook and report errors without executing it
    SyntaxCheck {
        /// Path to the playbook file
        playbook: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let registry = TaskRegistry::builtin();

    match cli.command {
        Command::Run {
            playbook,
            inventory,
            limit,
            extra_vars,
            check,
        } => {
            let playbook = Playbook::from_file(&playbook, &registry)
                .with_context(|| format!("loading playbook {}", playbook.display()))?;
            let inventory = match inventory {
                Some(path) => Inventory::from_file(&path)
                    .with_context(|| format!("loading inventory {}", path.display()))?,
                None => Inventory::localhost(),
            };

            let options = RunOptions {
                limit,
                extra_vars: parse_extra_vars(&extra_vars)?,
                check_mode: check,
            };
            let runner = PlaybookRunner::new(&registry, inventory).with_options(options);
            let recap = runner.run(&playbook)?;

            println!();
            println!("{}", "PLAY RECAP".bold());
            let mut any_failed = false;
            for (host, tally) in &recap {
                any_failed |= tally.failed > 0;
                println!(
                    "{:<24} {}  {}  {}  {}",
                    host.bold(),
                    format!("ok={}", tally.ok).green(),
                    format!("changed={}", tally.changed).yellow(),
                    format!("skipped={}", tally.skipped).cyan(),
                    if tally.failed > 0 {
                        format!("failed={}", tally.failed).red()
                    } else {
                        format!("failed={}", tally.failed).normal()
                    },
                );
            }
            if any_failed {
                std::process::exit(2);
            }
        }

        Command::SyntaxCheck { playbook } => {
            let parsed = Playbook::from_file(&playbook, &registry)
                .with_context(|| format!("loading playbook {}", playbook.display()))?;
            println!(
                "{}: {} play(s), {} task(s)",
                "ok".green(),
                parsed.plays.len(),
                parsed.task_count()
            );
        }
    }

    Ok(())
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Parse `-e` arguments: either `KEY=VALUE` pairs or a JSON object.
fn parse_extra_vars(args: &[String]) -> anyhow::Result<Scope> {
    let mut scope = Scope::new();
    for arg in args {
        if arg.trim_start().starts_with('{') {
            let parsed: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(arg).context("parsing JSON extra-vars")?;
            for (key, value) in parsed {
                scope.set(key, serde_yaml::to_value(value)?);
            }
        } else if let Some((key, value)) = arg.split_once('=') {
            scope.set(key.to_string(), Value::String(value.to_string()));
        } else {
            anyhow::bail!("extra-vars entry '{arg}' is neither KEY=VALUE nor JSON");
        }
    }
    Ok(scope)
}
