use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod backend;
mod commands;
mod config;

use commands::*;
use config::Config;

#[derive(Parser)]
#[command(name = "pbc")]
#[command(author, version, about = "Playback analytics query cache", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk through caching, invalidation and concurrent misses
    Demo {
        #[command(flatten)]
        run: RunArgs,

        /// Number of identical requests to fire at once
        #[arg(long, default_value = "8")]
        concurrent: usize,
    },

    /// Run one query against the demo dataset
    Query {
        /// Query to run
        #[arg(value_enum)]
        kind: QueryKind,

        /// Query parameters (name=value), e.g. users=alice days=30
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Run the same query this many times
        #[arg(short, long, default_value = "2")]
        repeat: usize,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Write a default configuration file
    InitConfig {
        /// Where to write the file
        #[arg(default_value = "pbc.json")]
        path: PathBuf,
    },
}

/// Overrides applied on top of the configuration file
#[derive(Args)]
struct RunArgs {
    /// Cache TTL in seconds
    #[arg(long)]
    ttl_secs: Option<u64>,

    /// Run without a cache
    #[arg(long)]
    no_cache: bool,

    /// Collapse concurrent misses for the same key
    #[arg(long)]
    single_flight: bool,

    /// Pretend the spatial extension failed to load
    #[arg(long)]
    no_spatial: bool,

    /// Number of generated playback records
    #[arg(long, default_value = "500")]
    records: usize,

    /// Simulated backend latency in milliseconds
    #[arg(long, default_value = "25")]
    latency_ms: u64,
}

impl RunArgs {
    fn apply(&self, mut config: Config) -> Config {
        if let Some(ttl) = self.ttl_secs {
            config.ttl_secs = ttl;
        }
        if self.no_cache {
            config.enabled = false;
        }
        if self.single_flight {
            config.single_flight = true;
        }
        if self.no_spatial {
            config.spatial_enabled = false;
        }
        config
    }

    fn app(&self, config: Config) -> App {
        App::new(
            &self.apply(config),
            self.records,
            Duration::from_millis(self.latency_ms),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose)?;

    // Load configuration
    let config = if let Some(config_path) = cli.config {
        Config::from_file(&config_path)?
    } else {
        Config::default()
    };

    print_banner();

    match cli.command {
        Some(Commands::Demo { run, concurrent }) => {
            let app = run.app(config);
            run_demo(&app, concurrent).await?;
            app.shutdown().await;
        }
        Some(Commands::Query {
            kind,
            params,
            repeat,
            run,
        }) => {
            let params = parse_params(&params)?;
            let app = run.app(config);
            execute_query(&app, kind, &params, repeat).await?;
            print_cache_stats(&app);
            app.shutdown().await;
        }
        Some(Commands::InitConfig { path }) => {
            init_config(&path)?;
        }
        None => {
            let app = App::new(&config, 500, Duration::from_millis(25));
            run_demo(&app, 8).await?;
            app.shutdown().await;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        "pbc=debug,playback_cache=debug,playback_executor=debug"
    } else {
        "pbc=info,playback_cache=info,playback_executor=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn print_banner() {
    println!("{}", "pbc: playback analytics query cache".bright_cyan().bold());
    println!(
        "{}",
        "Cached location queries over a generated playback dataset\n".bright_black()
    );
}
