//! UA Switch command-line entry point

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uaswitch_app::{App, ExportDocument, StatusMessage};
use uaswitch_core::{AppConfig, BackendKind};
use uaswitch_rules::{ResourceType, RuleHost};

#[derive(Parser)]
#[command(name = "uaswitch")]
#[command(version, about = "Switch the User-Agent header globally and per domain", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to config.json (default: <data dir>/uaswitch/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the settings document
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Settings backend (memory, json, sqlite)
    #[arg(long, global = true)]
    backend: Option<BackendKind>,
}

#[derive(Subcommand)]
enum Command {
    /// Answer control messages, one JSON object per line on stdin
    Serve,

    /// Show the active User-Agent and installed rules
    Status,

    /// Write all settings to a file or directory, or to stdout
    Export { path: Option<PathBuf> },

    /// Replace all settings with an exported file
    Import { path: PathBuf },

    /// Reset every setting to its default
    Reset,

    /// Show which User-Agent a request would be sent with
    Check {
        url: String,

        /// Resource type of the request
        #[arg(long = "type", default_value = "main_frame")]
        resource_type: ResourceType,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    init_logging(&config.log_level)?;

    info!("Starting UA Switch ({} backend)", config.backend);
    let app = App::open(config).context("Failed to open settings")?;
    app.start().context("Failed to apply rules at startup")?;

    match cli.command {
        Command::Serve => serve(&app),
        Command::Status => status(&app),
        Command::Export { path } => export(&app, path),
        Command::Import { path } => {
            let document = ExportDocument::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            report(app.manager.import(document))
        }
        Command::Reset => report(app.manager.reset_all()),
        Command::Check { url, resource_type } => {
            match app.host.effective_user_agent(&url, resource_type)? {
                Some(user_agent) => println!("{}", user_agent),
                None => println!("(browser default)"),
            }
            Ok(())
        }
    }
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    // Library crates log through `log`
    tracing_log::LogTracer::init()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn serve(app: &App) -> anyhow::Result<()> {
    info!("Listening for messages on stdin");
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        // Writes from other processes sharing the backend
        if let Err(e) = app.store.refresh() {
            error!("Failed to refresh settings: {}", e);
        }

        let response = app.background.handle_json(&line);
        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;

        if let Err(e) = app.background.pump_changes() {
            error!("Failed to reload rules: {}", e);
        }
    }

    info!("Input closed, shutting down");
    Ok(())
}

fn status(app: &App) -> anyhow::Result<()> {
    let snapshot = app.store.get_all()?;
    let enabled = snapshot.enabled() == Some(true);

    println!("Enabled:    {}", if enabled { "yes" } else { "no" });
    println!(
        "Active:     {}",
        snapshot.active_ua().as_deref().unwrap_or("(none)")
    );
    println!("User-Agent: {}", app.background.current_user_agent()?);

    let rules = app.host.rules()?;
    println!("Rules:      {}", rules.len());
    for rule in rules {
        println!(
            "  #{:<3} priority {:<3} {} -> {}",
            rule.id,
            rule.priority,
            rule.condition.url_filter,
            rule.user_agent().unwrap_or("-")
        );
    }
    Ok(())
}

fn export(app: &App, path: Option<PathBuf>) -> anyhow::Result<()> {
    let document = app.manager.export()?;
    match path {
        Some(path) => {
            let path = if path.is_dir() {
                path.join(ExportDocument::default_file_name())
            } else {
                path
            };
            document
                .write(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Settings exported to {}", path.display());
        }
        None => println!("{}", document.to_json_pretty()?),
    }
    Ok(())
}

fn report(result: uaswitch_core::UaResult<StatusMessage>) -> anyhow::Result<()> {
    let status = result?;
    if status.is_error() {
        bail!("{}", status);
    }
    println!("{}", status);
    Ok(())
}
