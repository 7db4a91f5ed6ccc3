//! tierroute - complexity-based routing of LLM queries
//!
//! Runs the routing service and offers a few offline helpers for checking
//! configuration and estimating savings.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tierroute::config::{Config, KeySource, LogFormat, LoggingConfig};
use tierroute::cost::compare;

#[derive(Parser)]
#[command(name = "tierroute")]
#[command(about = "Route LLM queries between a cheap and an expensive model tier")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration file
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },

    /// Show configured tiers and their prices
    Tiers {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },

    /// Estimate savings of a small/large token split versus all-large
    Compare {
        /// Tokens served by the small tier
        #[arg(long)]
        small_tokens: u64,

        /// Tokens served by the large tier
        #[arg(long)]
        large_tokens: u64,

        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "tierroute={level},tower_http={level}",
            level = logging.level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            let (mut cfg, key_sources) = Config::from_file_with_env(&config)?;
            init_tracing(&cfg.logging);

            tracing::info!(config = %config, "Loaded configuration");
            for (label, source) in &key_sources {
                if matches!(source, KeySource::None) {
                    tracing::warn!(model = %label, "No API key configured");
                } else {
                    tracing::debug!(model = %label, source = %source, "API key resolved");
                }
            }

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                cfg.server.listen = addr;
            }

            tierroute::api::run_server(cfg).await
        }

        Commands::Check { config } => {
            let (cfg, key_sources) = Config::from_file_with_env(&config)?;
            println!("Configuration OK: {}", config);
            println!("  small:  {}", cfg.models.small.name);
            println!("  large:  {}", cfg.models.large.name);
            println!("  router: {}", cfg.models.router().name);
            println!("  fallback: {}", cfg.routing.fallback);
            for (label, source) in &key_sources {
                println!("  {} api key: {}", label, source);
            }
            Ok(())
        }

        Commands::Tiers { config } => {
            let (cfg, _) = Config::from_file_with_env(&config)?;
            println!("{:<8} {:<32} {:>14}", "TIER", "MODEL", "USD / 1K TOK");
            let rows = [
                ("small", &cfg.models.small),
                ("large", &cfg.models.large),
                ("router", cfg.models.router()),
            ];
            for (tier, model) in rows {
                println!("{:<8} {:<32} {:>14.6}", tier, model.name, model.price_per_1k);
            }
            Ok(())
        }

        Commands::Compare {
            small_tokens,
            large_tokens,
            config,
        } => {
            let (cfg, _) = Config::from_file_with_env(&config)?;
            let result = compare(
                small_tokens,
                large_tokens,
                cfg.models.small.price_per_1k,
                cfg.models.large.price_per_1k,
            );
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}
