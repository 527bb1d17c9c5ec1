//! Edge Racer - CLI Entry Point

use anyhow::Context;
use clap::{Parser, Subcommand};
use edge_racer::{Config, Resolver, SelectRequest, VERSION};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "edge-racer")]
#[command(author = "Tsang")]
#[command(version = VERSION)]
#[command(about = "Race candidate endpoints and pick the fastest reachable one")]
struct Args {
    /// Path to configuration file
    #[arg(short = 'c', short_alias = 'f', long = "config", default_value = "config.yaml")]
    config: PathBuf,

    /// Override the configured log level
    #[arg(short = 'l', long = "log-level")]
    log_level: Option<String>,

    /// Print results as JSON
    #[arg(long = "json")]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Race all endpoints and print the winner
    Select {
        /// Extra domains, appended to the configured ones
        #[arg(short = 'd', long = "domain")]
        domains: Vec<String>,

        /// Cancel slower probes as soon as one succeeds
        #[arg(long = "cancel-losers")]
        cancel_losers: bool,
    },

    /// Probe every domain directly and print latencies
    TestAll,

    /// Download the configured subscription
    Fetch {
        /// URL to fetch instead of `download.url`
        url: Option<String>,

        /// Single direct attempt instead of a race
        #[arg(long = "no-race")]
        no_race: bool,

        /// Write the body here instead of stdout
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },

    /// Validate the configuration and exit
    Check,
}

fn main() -> anyhow::Result<()> {
    // Install aws-lc-rs as the default crypto provider for rustls
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get().max(2))
        .enable_all()
        .thread_name("edge-racer-worker")
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match Config::load_async(&args.config).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration {}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("edge_racer={}", config.log_level).parse()?),
        )
        .init();

    info!("Edge Racer v{}", VERSION);
    info!("Loaded configuration from: {}", args.config.display());

    match args.command {
        Command::Check => {
            info!(
                "Configuration OK: {} domains, {} proxies",
                config.domains.len(),
                config.proxies.len()
            );
        }

        Command::Select {
            domains,
            cancel_losers,
        } => {
            config.domains.extend(domains);
            config.cancel_losers |= cancel_losers;

            let resolver = Resolver::new(&config)?;
            let request = SelectRequest::from_config(&config);

            match resolver.select_endpoint(&request).await? {
                Some(selection) if args.json => {
                    println!("{}", serde_json::to_string_pretty(&selection)?);
                }
                Some(selection) => {
                    let via = selection
                        .proxy
                        .as_ref()
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "direct".to_string());
                    println!("{}\t{}\t{}ms", selection.address, via, selection.elapsed_ms);
                }
                None => {
                    error!("No reachable endpoint");
                    std::process::exit(2);
                }
            }
        }

        Command::TestAll => {
            let resolver = Resolver::new(&config)?;
            let outcomes = resolver.test_all(&config.domains, &config.test_path).await;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&outcomes)?);
            } else {
                for outcome in &outcomes {
                    match &outcome.error {
                        None => println!("{}\t{}ms", outcome.endpoint.target, outcome.elapsed_ms()),
                        Some(e) => println!("{}\tfailed\t{}", outcome.endpoint.target, e),
                    }
                }
            }
        }

        Command::Fetch {
            url,
            no_race,
            output,
        } => {
            let url = url
                .or_else(|| config.download.url.clone())
                .context("no URL given and download.url is not set")?;
            let race = config.download.race && !no_race;

            let resolver = Resolver::new(&config)?;
            let download = resolver.download(&url, race).await?;

            info!(
                "Fetched {} bytes via {} in {}ms",
                download.body.len(),
                download.via,
                download.elapsed.as_millis()
            );
            if let Some(label) = &download.label {
                info!("Label: {}", label);
            }
            if let Some(usage) = download.subscription_info() {
                info!(
                    "Usage: upload={} download={} total={} expire={}",
                    usage.upload, usage.download, usage.total, usage.expire
                );
            }

            match output {
                Some(path) => {
                    tokio::fs::write(&path, &download.body)
                        .await
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!("Wrote {}", path.display());
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&download.body)?;
                }
            }
        }
    }

    Ok(())
}
