mod backends;
mod cli;
mod config;
mod registry;
mod server;

mod utils {
    pub(crate) mod errors;
}

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use cli::{list::list_cmd, serve::serve_cmd, ColorMode};
use config::{BackendConfig, BackendSource};
use registry::{ollama_connector, Registry};
use tracing_subscriber::EnvFilter;
use utils::errors::configure_color;

#[derive(
    Parser, Default, Clone, Copy, ValueEnum, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum RequestedColorMode {
    #[default]
    Auto,
    On,
    Off,
}

#[derive(Parser)]
#[command(name = "crossroute")]
#[command(
    about = "Routes Ollama API requests to whichever backend serves the requested model",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Read the configuration from this file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Add a backend given as host, host:port or URL; may be repeated
    #[arg(short, long = "backend", global = true)]
    backends: Vec<String>,
    #[arg(long, global = true, default_value_t = RequestedColorMode::default())]
    color: RequestedColorMode,
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Route requests to the configured backends (the default)
    Serve(ServeArgs),
    /// Run discovery once and list what was found
    List(ListArgs),
}

#[derive(Parser, Default)]
pub(crate) struct ServeArgs {
    /// Address to listen on, overriding the configuration
    #[arg(short, long)]
    listen: Option<String>,
}

/// Possible listings
#[derive(Subcommand, Clone, Copy)]
pub(crate) enum ListObject {
    /// Models and the backends serving them
    Models,
    /// Backends and their discovery status
    Backends,
}

/// Output formats
#[derive(
    Parser, ValueEnum, Default, Clone, Copy, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum ListingFormat {
    /// Format the output as a table
    #[default]
    Table,
    /// Format the output as JSON
    Json,
    /// Format the output as a table without a header
    HeaderlessTable,
}

#[derive(Parser)]
pub(crate) struct ListArgs {
    /// Output the listing with the specified format
    #[arg(short, long, default_value_t = ListingFormat::default())]
    format: ListingFormat,
    /// List the specified object
    #[command(subcommand)]
    object: ListObject,
}

fn init_logging(verbose: bool, color: ColorMode) {
    let level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("crossroute={level},tower_http={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(color == ColorMode::On)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let color = ColorMode::resolve_auto(cli.color);
    configure_color(color);
    init_logging(cli.verbose, color);

    let path = config::config_path(cli.config.clone());

    let config = match config::read_config(path.as_deref()) {
        Ok(config) => config,
        Err(err) => die!("{}", err),
    };

    let pinned = cli.backends.iter().map(BackendConfig::from_host).collect();
    let source = BackendSource::new(path, pinned, config.discovery.timeout());

    match source.load().await {
        Ok(specs) if specs.is_empty() => die!("{}", config::Error::NoBackends),
        Ok(specs) => tracing::debug!(backends = specs.len(), "loaded the backend set"),
        Err(err) => die!("{}", err),
    }

    let registry = Arc::new(Registry::new(
        source,
        ollama_connector(config.forwarding.timeout()),
    ));

    match &cli.command {
        Some(Commands::Serve(args)) => serve_cmd(&config, registry, args).await,
        Some(Commands::List(args)) => list_cmd(&registry, args).await,
        None => serve_cmd(&config, registry, &ServeArgs::default()).await,
    }
}
