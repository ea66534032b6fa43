mod commands;

use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "prewire")]
#[command(about = "Compile container, router and dispatch tables ahead of time", long_about = None)]
struct Cli {
    /// Project root (default: current directory)
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Configuration file (default: <root>/prewire.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse the sources, compile and write the artifacts
    Compile {
        /// Artifact directory, overrides the configuration
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// Source directories relative to the root (default: src)
        #[arg(long = "src")]
        sources: Vec<PathBuf>,

        /// Fail when the compilation reports any diagnostic
        #[arg(long)]
        deny_warnings: bool,
    },
    /// List the compiled routes
    Routes,
    /// List the compiled services
    Services,
    /// Show which target a request would be dispatched to
    Match {
        /// HTTP method (e.g., GET, POST)
        method: String,
        /// Request path (e.g., /users/42)
        path: String,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("prewire={0},prewire_cli={0}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = commands::Options {
        root: cli.root,
        config: cli.config,
    };
    let result = match cli.command {
        Commands::Compile {
            out,
            sources,
            deny_warnings,
        } => commands::compile::run(&options, out, sources, deny_warnings),
        Commands::Routes => commands::routes::run(&options).map(|_| true),
        Commands::Services => commands::services::run(&options).map(|_| true),
        Commands::Match { method, path } => commands::match_route::run(&options, &method, &path),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), err);
            std::process::exit(1);
        }
    }
}
