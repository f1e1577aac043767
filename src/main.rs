mod local;
mod status;

use anyhow::{Context as _, bail};
use clap::{ArgAction, Parser, Subcommand};
use log::{error, info, warn};
use org_sync::CancellationToken;
use org_sync::github::{Confirm, PushExecutor, PushOptions, Stages, pull_configuration};
use similar::TextDiff;
use std::path::{Path, PathBuf};
use team_config::{
    Config, Format, NormalizeOptions, is_not_found, load_state, merge, normalize, render,
    sanity_check, sort_config, store_state,
};

#[derive(Parser)]
#[command(
    name = "team-manager",
    about = "Keep the teams of a GitHub organization in sync with a local file"
)]
struct Cli {
    /// GitHub organization to manage
    #[arg(long, global = true, env = "GITHUB_ORG")]
    org: Option<String>,
    /// Local configuration file (`.toml` or YAML)
    #[arg(long, global = true, default_value = "team-assignments.yaml")]
    config: PathBuf,
    /// File replacing the members and mentors of some teams
    #[arg(long = "override", global = true)]
    override_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the configuration file from the organization, unless it exists
    Init,
    /// Update the configuration file with the state of the organization
    Pull,
    /// Apply the configuration file to the organization
    Push {
        /// Print the changes without applying them
        #[arg(long)]
        dry_run: bool,
        /// Apply the changes without asking for confirmation
        #[arg(long)]
        force: bool,
        #[command(flatten)]
        stages: StageArgs,
    },
    /// Show how the organization differs from the configuration file
    Diff {
        #[command(flatten)]
        stages: StageArgs,
    },
    /// Check and canonicalize the configuration file
    Lint,
    /// Report the reviewers available in every team
    Status,
    /// Add GitHub users to the organization members
    AddUser {
        #[arg(required = true)]
        users: Vec<String>,
        /// Teams the new users join
        #[arg(long, num_args = 1..)]
        teams: Vec<String>,
    },
    /// Add teams to the configuration
    AddTeam {
        #[arg(required = true)]
        teams: Vec<String>,
    },
    /// Replace the members of a team
    SetTeam {
        #[arg(long)]
        team: String,
        users: Vec<String>,
    },
    /// Exclude users from the review assignment of every team
    AddPto {
        #[arg(required = true)]
        users: Vec<String>,
    },
    /// Include users in the review assignment of their teams again
    RemovePto {
        #[arg(required = true)]
        users: Vec<String>,
    },
}

#[derive(clap::Args, Clone, Copy)]
struct StageArgs {
    /// Include repository permissions
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    repositories: bool,
    /// Include organization members
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    members: bool,
    /// Include teams, their members and review assignment
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    teams: bool,
}

impl From<StageArgs> for Stages {
    fn from(args: StageArgs) -> Self {
        Stages {
            repositories: args.repositories,
            members: args.members,
            teams: args.teams,
        }
    }
}

impl From<StageArgs> for NormalizeOptions {
    fn from(args: StageArgs) -> Self {
        NormalizeOptions {
            repositories: args.repositories,
            members: args.members,
            teams: args.teams,
        }
    }
}

struct DialoguerConfirm;

impl Confirm for DialoguerConfirm {
    fn confirm(&self, prompt: &str) -> anyhow::Result<bool> {
        Ok(dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?)
    }
}

fn main() {
    init_log();
    if let Err(err) = app() {
        error!("{}", err);
        for cause in err.chain() {
            error!("caused by: {}", cause);
        }
        std::process::exit(1);
    }
}

fn app() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cancel = CancellationToken::new();
    listen_for_interrupts(cancel.clone());

    match cli.command {
        Command::Init => match load_state(&cli.config, None) {
            Ok(_) => info!("{} already exists", cli.config.display()),
            Err(err) if is_not_found(&err) => {
                let org = required_org(cli.org.as_deref())?;
                let (read, _) = org_sync::connect(cancel)?;
                let mut cfg = pull_configuration(&read, org)?;
                store_state(&cli.config, &mut cfg)?;
                info!("created {}", cli.config.display());
            }
            Err(err) => return Err(err),
        },
        Command::Pull => {
            let local = match load_state(&cli.config, None) {
                Ok(cfg) => Some(cfg),
                Err(err) if is_not_found(&err) => None,
                Err(err) => return Err(err),
            };
            let org = match &local {
                Some(cfg) => {
                    check_organization(cfg, cli.org.as_deref())?;
                    cfg.organization.as_str()
                }
                None => required_org(cli.org.as_deref())?,
            };
            let (read, _) = org_sync::connect(cancel)?;
            let remote = pull_configuration(&read, org)?;
            let mut cfg = match &local {
                Some(local) => merge(local, remote),
                None => remote,
            };
            sanity_check(&cfg).context("the pulled configuration is inconsistent")?;
            store_state(&cli.config, &mut cfg)?;
        }
        Command::Push {
            dry_run,
            force,
            stages,
        } => {
            let mut cfg = load_state(&cli.config, cli.override_path.as_deref())?;
            sanity_check(&cfg).context("refusing to push an invalid configuration")?;
            check_organization(&cfg, cli.org.as_deref())?;
            let (read, write) = org_sync::connect(cancel)?;
            let options = PushOptions {
                dry_run,
                force,
                stages: stages.into(),
            };
            if dry_run {
                warn!("running in dry mode, no changes will be applied");
            }
            PushExecutor::new(&read, &write, &DialoguerConfirm, options).run(&mut cfg)?;
            if dry_run {
                return Ok(());
            }
            if cli.override_path.is_some() {
                warn!(
                    "not updating {} since its members were overridden",
                    cli.config.display()
                );
            } else {
                store_state(&cli.config, &mut cfg)?;
            }
        }
        Command::Diff { stages } => {
            let mut local = load_state(&cli.config, cli.override_path.as_deref())?;
            sanity_check(&local).context("refusing to compare an invalid configuration")?;
            check_organization(&local, cli.org.as_deref())?;
            let (read, _) = org_sync::connect(cancel)?;
            let mut remote = pull_configuration(&read, &local.organization)?;
            if print_diff(&mut local, &mut remote, stages.into())? {
                std::process::exit(1);
            }
        }
        Command::Lint => {
            let mut cfg = load_state(&cli.config, None)?;
            sanity_check(&cfg).context("the configuration is inconsistent")?;
            for (team, mentor) in local::stray_mentors(&cfg) {
                warn!("mentor {mentor} of team {team} is not one of its members");
            }
            store_state(&cli.config, &mut cfg)?;
        }
        Command::Status => {
            let cfg = load_state(&cli.config, cli.override_path.as_deref())?;
            sanity_check(&cfg).context("the configuration is inconsistent")?;
            let (read, _) = org_sync::connect(cancel)?;
            status::check_user_status(&cfg, &read)?;
        }
        Command::AddUser { users, teams } => {
            let mut cfg = load_state(&cli.config, None)?;
            let (read, _) = org_sync::connect(cancel)?;
            let added = local::add_users(&mut cfg, &read, &users)?;
            for team in &teams {
                local::add_team_members(&mut cfg, team, &added)?;
            }
            store_state(&cli.config, &mut cfg)?;
        }
        Command::AddTeam { teams } => {
            let mut cfg = load_state(&cli.config, None)?;
            let (read, _) = org_sync::connect(cancel)?;
            local::add_teams(&mut cfg, &read, &teams)?;
            store_state(&cli.config, &mut cfg)?;
        }
        Command::SetTeam { team, users } => edit(&cli.config, cli.override_path.as_deref(), |cfg| {
            local::set_team_members(cfg, &team, &users)
        })?,
        Command::AddPto { users } => edit(&cli.config, cli.override_path.as_deref(), |cfg| {
            local::add_pto(cfg, &users)
        })?,
        Command::RemovePto { users } => edit(&cli.config, cli.override_path.as_deref(), |cfg| {
            local::remove_pto(cfg, &users)
        })?,
    }
    Ok(())
}

/// Loads the configuration with its overrides, applies an offline edit and
/// stores the result back.
fn edit<E>(
    path: &Path,
    override_path: Option<&Path>,
    f: impl FnOnce(&mut Config) -> Result<(), E>,
) -> anyhow::Result<()>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let mut cfg = load_state(path, override_path)?;
    f(&mut cfg)?;
    store_state(path, &mut cfg)
}

fn required_org(org: Option<&str>) -> anyhow::Result<&str> {
    org.context("no configuration file found, pass --org to create one")
}

fn check_organization(cfg: &Config, org: Option<&str>) -> anyhow::Result<()> {
    match org {
        Some(org) if org != cfg.organization => bail!(
            "the configuration describes organization {:?}, not {:?}",
            cfg.organization,
            org
        ),
        _ => Ok(()),
    }
}

/// Prints how `remote` differs from `local`, returning whether they differ.
fn print_diff(
    local: &mut Config,
    remote: &mut Config,
    options: NormalizeOptions,
) -> anyhow::Result<bool> {
    sort_config(local);
    normalize(local, options);
    normalize(remote, options);
    let local = render(local, Format::Yaml)?;
    let remote = render(remote, Format::Yaml)?;
    if local == remote {
        info!("the organization matches the configuration");
        return Ok(false);
    }
    let diff = TextDiff::from_lines(&remote, &local);
    print!("{}", diff.unified_diff().header("remote", "local"));
    Ok(true)
}

fn listen_for_interrupts(cancel: CancellationToken) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!("unable to listen for interrupts: {err}");
                return;
            }
        };
        runtime.block_on(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if cancel.is_cancelled() {
                    std::process::exit(130);
                }
                warn!("interrupted, stopping after the current request (interrupt again to quit)");
                cancel.cancel();
            }
        });
    });
}

fn init_log() {
    let mut env = env_logger::Builder::new();
    for module in ["team_manager", "team_config", "org_sync"] {
        env.filter_module(module, log::LevelFilter::Info);
    }
    if let Ok(content) = std::env::var("RUST_LOG") {
        env.parse_filters(&content);
    }
    env.init();
}
