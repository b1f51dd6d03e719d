use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use surface_sync_canvas::{CanvasSession, DisplaySet, KindRegistry};
use surface_sync_core::config::{Config, LoggingConfig};
use surface_sync_transport::{HttpSurfaceSource, SurfaceSource};

#[derive(Parser)]
#[command(
    name = "surface-sync",
    about = "Keep a local view of a remote canvas surface set in sync",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Canvas server base URL (overrides config)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the canvas and print the display set on every change
    Watch,

    /// Pull the current surface list once
    Snapshot,

    /// Send an interaction callback for a surface
    Callback {
        /// Surface id
        surface: String,
        /// Action name (e.g. approve, deny)
        action: String,
        /// JSON object with extra data
        #[arg(long)]
        data: Option<String>,
    },

    /// List known surface kinds
    Kinds,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let mut config = Config::load(&config_path)?;
    if let Some(url) = cli.url {
        config.server.base_url = url;
    }

    init_logging(config.logging.as_ref(), cli.verbose);
    for warning in config.validate() {
        tracing::warn!("{warning}");
    }

    match cli.command {
        Commands::Watch => watch(config).await?,
        Commands::Snapshot => {
            let source = HttpSurfaceSource::new(config.server.clone(), &config.transport)?;
            let surfaces = source.fetch_snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&surfaces)?);
        }
        Commands::Callback {
            surface,
            action,
            data,
        } => {
            let data = match data {
                Some(raw) => match serde_json::from_str::<serde_json::Value>(&raw)? {
                    serde_json::Value::Object(map) => map,
                    _ => anyhow::bail!("--data must be a JSON object"),
                },
                None => serde_json::Map::new(),
            };
            let source = HttpSurfaceSource::new(config.server.clone(), &config.transport)?;
            if !source.callback_client().send(&surface, &action, data).await {
                anyhow::bail!("callback for '{surface}' was not accepted");
            }
            println!("Callback sent: {surface} {action}");
        }
        Commands::Kinds => {
            for kind in KindRegistry::builtin().list() {
                let tag = if kind.self_updating { " (self-updating)" } else { "" };
                println!("{}{}\n    {}", kind.name, tag, kind.description);
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },
    }

    Ok(())
}

fn init_logging(logging: Option<&LoggingConfig>, verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        logging
            .and_then(|l| l.level.clone())
            .unwrap_or_else(|| "info".into())
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = tracing_subscriber::EnvFilter::new(level);
        for directive in logging.map(|l| l.filters.as_slice()).unwrap_or_default() {
            match directive.parse::<tracing_subscriber::filter::Directive>() {
                Ok(d) => filter = filter.add_directive(d),
                Err(e) => eprintln!("Ignoring log filter '{directive}': {e}"),
            }
        }
        filter
    });

    let writer = match logging.map(|l| l.output.as_str()) {
        Some("stdout") => BoxMakeWriter::new(std::io::stdout),
        _ => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    match logging.map(|l| l.format.as_str()) {
        Some("json") => builder.json().init(),
        _ => builder.init(),
    }
}

async fn watch(config: Config) -> anyhow::Result<()> {
    let registry = KindRegistry::builtin();
    let mut session = CanvasSession::connect(config)?;
    let mut display = session.subscribe();
    session.start();

    let (Some(mut state), Some(mut connected)) = (session.watch_state(), session.watch_connected())
    else {
        anyhow::bail!("canvas session failed to start");
    };

    print_display(&registry, &display.borrow_and_update().clone());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = display.changed() => {
                if changed.is_err() {
                    break;
                }
                let set = display.borrow_and_update().clone();
                print_display(&registry, &set);
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                tracing::info!(state = %current, "Connection state changed");
            }
            changed = connected.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *connected.borrow_and_update();
                tracing::info!(connected = current, "Connectivity changed");
            }
        }
    }

    session.stop().await;
    Ok(())
}

fn print_display(registry: &KindRegistry, set: &Arc<DisplaySet>) {
    if set.is_empty() {
        println!("-- canvas empty, waiting for surfaces --");
        return;
    }
    println!("-- {} surface(s) --", set.len());
    for entry in set.iter() {
        println!("{}", registry.render_line(entry));
    }
}
