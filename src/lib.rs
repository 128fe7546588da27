pub mod capture;
mod cli;
pub mod dashboard;
pub mod db;
pub mod session;
pub mod settings;
mod utils;

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use serde::Serialize;

use capture::CaptureRegistry;
use cli::{Cli, Command};
use dashboard::{Access, Dashboard, StateLookup, Viewer};
use db::{Database, Role, DEFAULT_MANAGER_USERNAME};
use session::SessionHooks;
use settings::SettingsStore;

pub(crate) struct AppState {
    pub(crate) db: Database,
    pub(crate) sessions: SessionHooks,
    pub(crate) dashboard: Dashboard,
}

impl AppState {
    /// Open the store and build the capture registry. Must run inside a tokio runtime.
    fn build(settings: &SettingsStore, db_override: Option<std::path::PathBuf>) -> Result<Self> {
        let current = settings.current();
        let db_path = db_override.unwrap_or(current.database_path);
        let database = Database::new(db_path)?;

        let registry = CaptureRegistry::new(Arc::new(database.clone()), current.capture.to_config())?;

        Ok(Self {
            sessions: SessionHooks::new(registry, database.clone()),
            dashboard: Dashboard::new(database.clone()),
            db: database,
        })
    }

    fn manager() -> Viewer {
        Viewer::new(DEFAULT_MANAGER_USERNAME, Role::Manager)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn granted<T>(access: Access<T>) -> Result<T> {
    match access {
        Access::Granted(value) => Ok(value),
        Access::Unauthorized => Err(anyhow!("unauthorized")),
    }
}

async fn execute(state: AppState, settings: &SettingsStore, command: Command) -> Result<()> {
    match command {
        Command::Bootstrap => {
            if settings.write_if_missing()? {
                info!("Wrote default settings to {}", settings.path().display());
            }
            if state.db.ensure_default_manager().await? {
                println!("Created manager account: username={DEFAULT_MANAGER_USERNAME}");
            } else {
                println!("Manager account already exists.");
            }
        }
        Command::AddTeam { name } => {
            let team = state.db.create_team(&name).await?;
            print_json(&team)?;
        }
        Command::DeleteTeam { id } => {
            if !state.db.delete_team(id).await? {
                bail!("team {id} not found");
            }
        }
        Command::AddEmployee { username, name, team } => {
            let user = state.sessions.add_employee(&username, name, team).await?;
            print_json(&user)?;
        }
        Command::DeleteEmployee { username } => {
            if !state.sessions.delete_account(&username).await? {
                bail!("user {username} not found");
            }
        }
        Command::Teams => {
            let teams = granted(state.dashboard.teams(&AppState::manager()).await?)?;
            print_json(&teams)?;
        }
        Command::Users => {
            let users = granted(state.dashboard.users(&AppState::manager()).await?)?;
            print_json(&users)?;
        }
        Command::State { username } => {
            match granted(
                state
                    .dashboard
                    .latest_state(&AppState::manager(), &username)
                    .await?,
            )? {
                StateLookup::Ready(latest) => print_json(&latest)?,
                StateLookup::NoData => print_json(&serde_json::json!({ "status": "no-data" }))?,
                StateLookup::NotFound => bail!("user {username} not found"),
            }
        }
        Command::History { username } => {
            let points = granted(
                state
                    .dashboard
                    .history(&AppState::manager(), &username)
                    .await?,
            )?;
            print_json(&points)?;
        }
        Command::Run { employees } => run_capture(&state, &employees).await?,
    }
    Ok(())
}

async fn run_capture(state: &AppState, employees: &[String]) -> Result<()> {
    let mut logged_in = Vec::new();
    for username in employees {
        match state.sessions.login(username).await {
            Ok(user) if user.role == Role::Employee => logged_in.push(user),
            Ok(user) => warn!("{} is a manager; nothing to capture", user.username),
            Err(err) => warn!("Skipping {username}: {err:#}"),
        }
    }
    if logged_in.is_empty() {
        bail!("no employee could be logged in");
    }

    info!(
        "Sampling {} employee(s) every {:?}; press Ctrl-C to stop",
        logged_in.len(),
        state.sessions.registry().config().period
    );
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    let handles: Vec<_> = logged_in
        .iter()
        .filter_map(|user| state.sessions.logout(&user.username, user.role))
        .collect();
    for handle in handles {
        if let Err(err) = handle.await {
            warn!("Capture task ended abnormally: {err}");
        }
    }
    info!("Capture stopped for {} employee(s)", logged_in.len());
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let debug_mode = std::env::var("COGNI_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    utils::logging::init(debug_mode);

    log::info!("Cogni starting up...");

    let settings = SettingsStore::new(cli.config.clone())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        let state = AppState::build(&settings, cli.db)?;
        execute(state, &settings, cli.command).await
    })
}
