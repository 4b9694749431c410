mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, lock::LockSubcommand, pending::PendingSubcommand,
    processed::ProcessedSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "reel",
    about = "Resumable batch runner for content-production pipelines",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .reel/ or .git/)
    #[arg(long, global = true, env = "REEL_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold directories, config and an empty pending list
    Init,

    /// Process the pending list, one item at a time
    Run {
        /// Skip items already marked processed and mark each success
        #[arg(long)]
        track_processed: bool,

        /// Run the publish steps after a fully successful batch
        #[arg(long)]
        publish: bool,

        /// Unit of work to run instead of the configured one
        #[arg(last = true)]
        command: Vec<String>,
    },

    /// Queue drop-directory batches when no other batch is in flight
    Gate,

    /// Inspect or edit the pending list
    Pending {
        #[command(subcommand)]
        subcommand: PendingSubcommand,
    },

    /// Inspect or edit the processed state
    Processed {
        #[command(subcommand)]
        subcommand: ProcessedSubcommand,
    },

    /// Show the generation history
    History {
        /// Only show failed entries
        #[arg(long)]
        failed: bool,
    },

    /// Inspect or remove the lock marker
    Lock {
        #[command(subcommand)]
        subcommand: LockSubcommand,
    },

    /// Show where the artifacts for an identifier live
    Artifacts { identifier: String },

    /// Run publish steps and archive uploaded videos
    Publish,

    /// Show or validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } | Commands::Gate | Commands::Publish => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Run {
            track_processed,
            publish,
            command,
        } => cmd::run::run(
            &root,
            cmd::run::RunOptions {
                track_processed,
                publish,
                command,
            },
            cli.json,
        ),
        Commands::Gate => cmd::gate::run(&root, cli.json),
        Commands::Pending { subcommand } => cmd::pending::run(&root, subcommand, cli.json),
        Commands::Processed { subcommand } => cmd::processed::run(&root, subcommand, cli.json),
        Commands::History { failed } => cmd::history::run(&root, failed, cli.json),
        Commands::Lock { subcommand } => cmd::lock::run(&root, subcommand, cli.json),
        Commands::Artifacts { identifier } => cmd::artifacts::run(&root, &identifier, cli.json),
        Commands::Publish => cmd::publish::run(&root, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        if let Some(exit) = e.downcast_ref::<cmd::RunExit>() {
            if !exit.is_quiet() {
                eprintln!("error: {exit}");
            }
            std::process::exit(exit.exit_code());
        }
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
