mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "A flat-file Markdown content engine", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    New {
        name: String,
    },
    Serve {
        #[arg(long, short)]
        input: Option<PathBuf>,

        #[arg(long, default_value = "3000")]
        port: u16,

        #[arg(long)]
        base_url: Option<String>,

        #[arg(long)]
        open: bool,

        #[arg(long)]
        watch: bool,
    },
    Routes {
        #[arg(long, short)]
        input: Option<PathBuf>,
    },
    Resolve {
        path: String,

        #[arg(long, short)]
        input: Option<PathBuf>,
    },
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    Clear {
        #[arg(long, short)]
        input: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "folio=debug,tower_http=debug" } else { "folio=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::New { name } => commands::new_site(&name),
        Commands::Serve {
            input,
            port,
            base_url,
            open,
            watch,
        } => commands::serve_site(input.as_deref(), port, base_url.as_deref(), open, watch).await,
        Commands::Routes { input } => commands::print_routes(input.as_deref()),
        Commands::Resolve { path, input } => commands::resolve_path(input.as_deref(), &path),
        Commands::Cache {
            command: CacheCommands::Clear { input },
        } => commands::clear_cache(input.as_deref()),
    };

    if let Err(error) = result {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}
