mod commands;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use hrgate_auth::{Action, PermissionQuery, Principal, Role, Scope, SimulationSubject};
use hrgate_core::{NodeId, PrincipalId};
use hrgate_infra::EngineConfig;

use crate::commands::LoadedPolicy;

#[derive(Parser)]
#[command(
    name = "hrgate",
    about = "Resolve, simulate and review hierarchical HR permissions"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a policy document (hierarchy shape, rule uniqueness, bindings).
    Check {
        policy: PathBuf,
    },

    /// Resolve a single permission query.
    Resolve {
        policy: PathBuf,

        #[command(flatten)]
        subject: SubjectArgs,

        #[arg(long)]
        module: String,

        #[arg(long)]
        action: Action,

        #[arg(long)]
        scope: Scope,

        /// Print a one-line explanation instead of JSON.
        #[arg(long)]
        explain: bool,
    },

    /// Resolve the full module × action × scope cross-product and report conflicts.
    Simulate {
        policy: PathBuf,

        #[command(flatten)]
        subject: SubjectArgs,
    },

    /// Compare two policy documents for one subject.
    Diff {
        before: PathBuf,
        after: PathBuf,

        #[command(flatten)]
        subject: SubjectArgs,
    },
}

/// Who to evaluate: a role template at a node, or a concrete principal.
#[derive(Args)]
struct SubjectArgs {
    /// Preview as this role template.
    #[arg(long, required_unless_present = "principal", conflicts_with = "principal")]
    role: Option<String>,

    /// Evaluate as this principal.
    #[arg(long)]
    principal: Option<PrincipalId>,

    /// Role templates held by `--principal` (repeatable).
    #[arg(long = "member-of", requires = "principal")]
    member_of: Vec<String>,

    /// Hierarchy position of the subject.
    #[arg(long)]
    node: NodeId,
}

impl SubjectArgs {
    fn subject(&self) -> Result<SimulationSubject> {
        match (&self.role, &self.principal) {
            (Some(role), None) => Ok(SimulationSubject::Role {
                role: Role::new(role.clone()),
                node_id: self.node.clone(),
            }),
            (None, Some(id)) => {
                let principal = self
                    .member_of
                    .iter()
                    .fold(Principal::new(id.clone(), self.node.clone()), |p, role| {
                        p.with_role(Role::new(role.clone()))
                    });
                Ok(SimulationSubject::Impersonated { principal })
            }
            _ => bail!("exactly one of --role or --principal is required"),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match EngineConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            return ExitCode::FAILURE;
        }
    };
    hrgate_observability::init_with(config.log_format);

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, config: &EngineConfig) -> Result<()> {
    match command {
        Command::Check { policy } => {
            let policy = LoadedPolicy::from_path(&policy, config)?;
            print_json(&commands::check(&policy))
        }
        Command::Resolve {
            policy,
            subject,
            module,
            action,
            scope,
            explain,
        } => {
            let policy = LoadedPolicy::from_path(&policy, config)?;
            let principal = subject.subject()?.principal();
            let result = commands::resolve_one(&policy, &principal, &PermissionQuery::new(module, action, scope));
            if explain {
                println!("{}", result.explain());
                Ok(())
            } else {
                print_json(&result)
            }
        }
        Command::Simulate { policy, subject } => {
            let policy = LoadedPolicy::from_path(&policy, config)?;
            let report = commands::simulate(&policy, &subject.subject()?, config.simulation_deadline)?;
            print_json(&report)
        }
        Command::Diff { before, after, subject } => {
            let before = LoadedPolicy::from_path(&before, config)?;
            let after = LoadedPolicy::from_path(&after, config)?;
            let changes = commands::diff(&before, &after, &subject.subject()?, config.simulation_deadline)?;
            print_json(&changes)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
