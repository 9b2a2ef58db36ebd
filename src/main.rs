use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};

use cronsync::{
    client::ApiClient,
    config::{Config, defaults::DEFAULT_CONFIG_FILE},
    job_scheduling::CronSync,
    observability::{init_meter_provider, init_tracing},
    shutdown::install_shutdown_handler,
    web::WebServer,
};

#[derive(Parser)]
#[command(name = "cronsync")]
#[command(version)]
#[command(about = "Distributed cron coordinator: many replicas, one execution per tick")]
#[command(long_about = None)]
struct Cli {
    /// Base URL of a running CronSync API (client commands)
    #[arg(long, global = true, env = "CRONSYNC_API", default_value = "http://localhost:5500")]
    api: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinator and its HTTP API
    Serve(ServeArgs),
    /// Schedule a new job
    Schedule {
        #[arg(short, long)]
        name: String,
        /// Cron pattern (5 fields, or 6/7 with seconds first)
        #[arg(short, long)]
        cron: String,
        /// Script to execute on each tick
        #[arg(short, long)]
        script: String,
    },
    /// List jobs scheduled on the instance
    List,
    /// Stop a job by id
    Stop {
        #[arg(short, long)]
        id: String,
    },
    /// Stop every job on the instance
    StopAll,
    /// Show the latest run of a job name
    Stats {
        #[arg(short, long)]
        name: String,
    },
    /// Write a default configuration file
    Init {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: String,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Redis URL (overrides config file)
    #[arg(short = 'r', long, value_name = "URL")]
    redis_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Schedule { name, cron, script } => {
            let created = ApiClient::new(&cli.api)?.schedule(&name, &cron, &script).await?;
            println!("{}", created.message);
            println!("Job ID: {}", created.job_id);
            Ok(())
        }
        Commands::List => {
            let listing = ApiClient::new(&cli.api)?.list().await?;
            if listing.jobs.is_empty() {
                println!("No jobs scheduled");
            }
            for job in listing.jobs {
                println!(
                    "{}  {}  '{}'  runs={}  last_run={}  running={}",
                    job.id,
                    job.name,
                    job.pattern,
                    job.run_count,
                    job.last_run
                        .map(|ts| ts.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string()),
                    job.is_running
                );
            }
            Ok(())
        }
        Commands::Stop { id } => {
            println!("{}", ApiClient::new(&cli.api)?.stop(&id).await?.message);
            Ok(())
        }
        Commands::StopAll => {
            println!("{}", ApiClient::new(&cli.api)?.stop_all().await?.message);
            Ok(())
        }
        Commands::Stats { name } => {
            let stats = ApiClient::new(&cli.api)?.stats(&name).await?.stats;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::Init { config } => {
            if Config::write_default(&config)? {
                println!("Created {config}");
            } else {
                println!("{config} already exists, leaving it untouched");
            }
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut config = Config::load_from_file(&args.config)?;
    if let Some(host) = args.host {
        config.web.host = host;
    }
    if let Some(port) = args.port {
        config.web.port = port;
    }
    if let Some(redis_url) = args.redis_url {
        config.redis.url = redis_url;
    }
    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }

    init_tracing(&config.logging.level, config.logging.format)?;
    let meter_provider = init_meter_provider();
    info!("Starting CronSync v{}", env!("CARGO_PKG_VERSION"));

    let cronsync = Arc::new(CronSync::connect(&config).await?);
    info!("Instance id: {}", cronsync.instance_id());

    let shutdown = install_shutdown_handler()?;
    let server = WebServer::new(cronsync.clone(), &config.web.host, config.web.port)?;
    let served = server.serve_with_cancellation(shutdown).await;
    if let Err(e) = &served {
        error!("Web server stopped with error: {}", e);
    }

    cronsync.disconnect().await;
    if let Err(e) = meter_provider.shutdown() {
        error!("Failed to flush metrics: {}", e);
    }
    info!("CronSync stopped");
    served
}
