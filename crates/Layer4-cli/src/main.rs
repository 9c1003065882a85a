//! plughost CLI - Main entry point

mod plugins;

use clap::{Parser, Subcommand};
use plugins::HostOptions;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// plughost - load, inspect and exercise chat plugins
#[derive(Parser, Debug)]
#[command(name = "plughost")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Directory holding plugins.json (defaults to the user config dir)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Do not load the bundled plugins
    #[arg(long, global = true)]
    no_bundled: bool,

    /// Session snapshot (JSON) exposed to plugins
    #[arg(long, global = true)]
    session: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check plugin folders without touching saved state
    Validate {
        /// Plugin folders (manifest.json + main.rhai)
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
    /// Print the settings form of a plugin
    Schema {
        dir: PathBuf,
    },
    /// List bundled and given plugins
    List {
        dirs: Vec<PathBuf>,
    },
    /// Run a hook and print the contributions
    Hook {
        /// Hook name, e.g. render.user-message-footer
        name: String,

        /// Context data as JSON
        #[arg(short, long)]
        context: Option<String>,

        dirs: Vec<PathBuf>,
    },
    /// List tools, or run one
    Tool {
        name: Option<String>,

        /// Tool arguments as JSON
        #[arg(short, long)]
        args: Option<String>,

        /// Plugin folders to load
        #[arg(long = "plugin")]
        dirs: Vec<PathBuf>,
    },
    /// Enable a plugin
    Enable {
        id: String,
        dirs: Vec<PathBuf>,
    },
    /// Disable a plugin
    Disable {
        id: String,
        dirs: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let options = HostOptions {
        state_dir: args.state_dir,
        no_bundled: args.no_bundled,
        session: args.session,
    };

    match args.command {
        Command::Validate { dirs } => plugins::validate(&dirs).await,
        Command::Schema { dir } => plugins::schema(&dir),
        Command::List { dirs } => plugins::list(&options, &dirs).await,
        Command::Hook { name, context, dirs } => {
            plugins::hook(&options, &dirs, &name, context.as_deref()).await
        }
        Command::Tool { name, args, dirs } => {
            plugins::tool(&options, &dirs, name.as_deref(), args.as_deref()).await
        }
        Command::Enable { id, dirs } => plugins::set_enabled(&options, &dirs, &id, true).await,
        Command::Disable { id, dirs } => plugins::set_enabled(&options, &dirs, &id, false).await,
    }
}
