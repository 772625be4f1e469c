//! Portalkeeper CLI - keeps a captive portal session alive
//!
//! This binary provides the management surface for the login service:
//! - Add, remove, list and reorder portal credentials
//! - Start, stop and disconnect the login service
//! - Run the login cycle as a foreground daemon (for systemd integration)
//! - Measure download speed

mod daemon;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use portalkeeper_core::auth::{self, Credential, CredentialError};
use portalkeeper_core::portal::{self, config, PortalClient};
use portalkeeper_core::{
    Command, Event, EventBus, FileStore, Orchestrator, Service, StateStore, WorkerLock,
};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "portalkeeper")]
#[command(version)]
#[command(about = "Keeps a captive portal session logged in")]
#[command(long_about = "
Portalkeeper checks internet connectivity once a minute and, when the captive
portal has dropped the session, logs back in by trying each stored credential
in turn, starting from the one that worked last.

Quick start:
  1. Add credentials:  portalkeeper add <username> --password <password>
  2. Start service:    portalkeeper start
  3. Check status:     portalkeeper status

For systemd integration, see: portalkeeper daemon --help
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a credential to the end of the rotation
    Add {
        username: String,

        #[arg(short, long)]
        password: String,
    },

    /// Remove a credential
    #[command(alias = "rm")]
    Remove { username: String },

    /// List credentials in rotation order
    #[command(alias = "ls")]
    List,

    /// Move a credential to a new position (1-based) in the rotation
    Move { username: String, position: usize },

    /// Start the login service and keep it running in the foreground
    Start,

    /// Run the login cycle for a service that is already started
    Daemon,

    /// Stop the login service
    Stop,

    /// Log the active credential out of the portal and stop the service
    #[command(alias = "logout")]
    Disconnect,

    /// Show service status
    Status,

    /// Measure download speed
    Speed,

    /// Show configuration paths and settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("portalkeeper={},portalkeeper_core={}", log_level, log_level).into()
            }),
        )
        .with_target(false)
        .init();

    let store = Arc::new(FileStore::new()?);

    match cli.command {
        Commands::Add {
            ref username,
            ref password,
        } => cmd_add(&cli, &store, Credential::new(username, password)),
        Commands::Remove { ref username } => cmd_remove(&cli, &store, username),
        Commands::List => cmd_list(&cli, &store),
        Commands::Move {
            ref username,
            position,
        } => cmd_move(&cli, &store, username, position),
        Commands::Start => {
            let _worker = claim_worker(&store)?;
            let service = build_service(store)?;
            service.handle(Command::Start).await?;
            daemon::run_daemon(service).await
        }
        Commands::Daemon => {
            let _worker = claim_worker(&store)?;
            let service = build_service(store)?;
            if !service.resume_on_startup().await? {
                eprintln!("Service is not started. Run 'portalkeeper start' instead.");
                std::process::exit(1);
            }
            daemon::run_daemon(service).await
        }
        Commands::Stop => cmd_command(&cli, store, Command::Stop).await,
        Commands::Disconnect => cmd_command(&cli, store, Command::Disconnect).await,
        Commands::Status => cmd_status(&cli, &store),
        Commands::Speed => cmd_command(&cli, store, Command::CheckSpeed).await,
        Commands::Config => cmd_config(&cli, &store),
    }
}

/// Only one process may run the login cycle against a store at a time.
fn claim_worker(store: &FileStore) -> Result<WorkerLock> {
    match store.try_lock_worker()? {
        Some(lock) => {
            tracing::debug!("Holding worker lock {}", lock.path().display());
            Ok(lock)
        }
        None => {
            eprintln!("Service is already running in another process.");
            eprintln!("Use 'portalkeeper status' to check it or 'portalkeeper stop' to stop it.");
            std::process::exit(1);
        }
    }
}

fn build_service(store: Arc<FileStore>) -> Result<Service> {
    let config = portal::load_portal_config();
    let period = config.check_interval;
    let client = Arc::new(PortalClient::new(config)?);
    let orchestrator = Arc::new(Orchestrator::with_portal(store, client.clone(), EventBus::new()));
    Ok(Service::new(orchestrator, client, period))
}

/// Print the outcome of a credential edit. Rejections exit non-zero.
fn report_edit(cli: &Cli, result: Result<(), CredentialError>, done: &str) -> Result<()> {
    match result {
        Ok(()) => {
            match cli.format {
                OutputFormat::Text => println!("{}", done),
                OutputFormat::Json => println!("{}", serde_json::json!({ "status": "ok" })),
            }
            Ok(())
        }
        Err(CredentialError::Store(e)) => Err(e),
        Err(e) => {
            match cli.format {
                OutputFormat::Text => eprintln!("Error: {}", e),
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "status": "rejected", "error": e.to_string() }));
                }
            }
            std::process::exit(1);
        }
    }
}

fn cmd_add(cli: &Cli, store: &FileStore, credential: Credential) -> Result<()> {
    let done = format!("Added '{}'", credential.username);
    report_edit(cli, auth::add_credential(store, credential), &done)
}

fn cmd_remove(cli: &Cli, store: &FileStore, username: &str) -> Result<()> {
    let done = format!("Removed '{}'", username);
    report_edit(cli, auth::remove_credential(store, username), &done)
}

fn cmd_move(cli: &Cli, store: &FileStore, username: &str, position: usize) -> Result<()> {
    let done = format!("Moved '{}' to position {}", username, position.max(1));
    let result = auth::move_credential(store, username, position.saturating_sub(1));
    report_edit(cli, result, &done)
}

fn cmd_list(cli: &Cli, store: &FileStore) -> Result<()> {
    let credentials = store.get_credentials()?;
    let state = store.get_session_state()?;
    let active = state.last_good_index.filter(|_| state.running);

    match cli.format {
        OutputFormat::Text => {
            if credentials.is_empty() {
                println!("No credentials stored.");
                println!("Add one with: portalkeeper add <username> --password <password>");
                return Ok(());
            }
            for (i, credential) in credentials.iter().enumerate() {
                let marker = if active == Some(i) { "*" } else { " " };
                println!("{} {:>3}  {}", marker, i + 1, credential.username);
            }
        }
        OutputFormat::Json => {
            let entries: Vec<_> = credentials
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    serde_json::json!({
                        "position": i + 1,
                        "username": c.username,
                        "active": active == Some(i),
                    })
                })
                .collect();
            println!("{}", serde_json::json!({ "credentials": entries }));
        }
    }
    Ok(())
}

/// Run a one-shot command and print the events it produces.
async fn cmd_command(cli: &Cli, store: Arc<FileStore>, command: Command) -> Result<()> {
    let service = build_service(store)?;
    let mut events = service.orchestrator().events().subscribe();
    service.handle(command).await?;

    while let Ok(event) = events.try_recv() {
        match cli.format {
            OutputFormat::Text => match &event {
                Event::StatusUpdate { status, .. } => println!("{}", status),
                Event::SpeedUpdate { speed } => println!("Speed: {}", speed),
            },
            OutputFormat::Json => println!("{}", serde_json::to_string(&event)?),
        }
    }
    Ok(())
}

fn cmd_status(cli: &Cli, store: &FileStore) -> Result<()> {
    let state = store.get_session_state()?;
    let credentials = store.get_credentials()?;
    let active = state
        .last_good_index
        .and_then(|i| credentials.get(i))
        .map(|c| c.username.clone());

    match cli.format {
        OutputFormat::Text => {
            println!("Service:     {}", if state.running { "Running" } else { "Stopped" });
            println!("Status:      {}", state.status);
            println!("Connected:   {}", if state.running && state.is_connected() { "yes" } else { "no" });
            println!("Active ID:   {}", active.as_deref().unwrap_or("-"));
            println!("Credentials: {}", credentials.len());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "running": state.running,
                "status": state.status,
                "connected": state.running && state.is_connected(),
                "active_username": active,
                "credential_count": credentials.len(),
            }));
        }
    }
    Ok(())
}

fn cmd_config(cli: &Cli, store: &FileStore) -> Result<()> {
    let portal_config = portal::load_portal_config();
    let config_path = config::get_config_file_path_string();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:      {}", config_path);
            println!("Login URL:        {} (from {})", portal_config.login_url, portal_config.source);
            println!("Logout URL:       {}", portal_config.logout_url);
            println!("Probe URL:        {}", portal_config.probe_url);
            println!("Speed test URL:   {}", portal_config.speed_test_url);
            println!("Check interval:   {}s", portal_config.check_interval.as_secs());
            println!("Credential store: {}", store.storage_info());
            println!("Session state:    {}", store.session_path().display());
            println!();
            println!("Environment variables:");
            println!("  PORTALKEEPER_PORTAL_URL - Override portal base URL");
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", config::generate_example_config());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "config_file": config_path,
                "login_url": portal_config.login_url,
                "logout_url": portal_config.logout_url,
                "portal_source": format!("{}", portal_config.source),
                "probe_url": portal_config.probe_url,
                "speed_test_url": portal_config.speed_test_url,
                "check_interval_secs": portal_config.check_interval.as_secs(),
                "credential_storage": store.storage_info(),
                "session_file": store.session_path().display().to_string(),
            }));
        }
    }

    Ok(())
}
