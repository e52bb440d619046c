use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

use lib::pipeline::{self, IngestStatus, PipelineOptions};
use lib::relay::RelayPolicy;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley email-mediation relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config.json.
    Init {
        /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the gateway (inbound webhook, message listing, reply and compose).
    Gateway {
        /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 8787)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Classify one message and print the normalized fields as JSON. Nothing is stored.
    Classify {
        /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Sender, e.g. "Jane <jane@example.com>"
        #[arg(long, default_value = "")]
        from: String,

        #[arg(long, default_value = "")]
        subject: String,

        /// Message body; read from stdin when omitted.
        #[arg(long)]
        text: Option<String>,
    },

    /// Print stored messages as JSON, most recent first.
    List {
        /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Maximum number of messages (default from relay.listLimit)
        #[arg(long, short)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("parley {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Init { config }) => run_init(config),
        Some(Commands::Gateway { config, port }) => run_gateway(config, port).await,
        Some(Commands::Classify {
            config,
            from,
            subject,
            text,
        }) => run_classify(config, from, subject, text).await,
        Some(Commands::List { config, limit }) => run_list(config, limit).await,
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    lib::gateway::run_gateway(config).await
}

async fn run_classify(
    config_path: Option<PathBuf>,
    from: String,
    subject: String,
    text: Option<String>,
) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let text = match text {
        Some(t) => t,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };
    if text.trim().is_empty() {
        anyhow::bail!("nothing to classify: message text is empty");
    }

    let classifier = lib::llm::build_classifier(&config);
    let options = PipelineOptions::from_config(&config);
    let (fields, status) =
        pipeline::classify_message(classifier.as_ref(), &options, &from, &subject, &text).await;
    if let IngestStatus::Degraded { reason } = status {
        log::warn!("classifier unavailable ({}); showing fallback fields", reason);
    }
    println!("{}", serde_json::to_string_pretty(&fields)?);
    Ok(())
}

async fn run_list(config_path: Option<PathBuf>, limit: Option<usize>) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let store = lib::store::open_store(&config)?;
    let limit = RelayPolicy::from_config(&config).list_limit(limit);
    let messages = store.list_recent(limit).await?;
    println!("{}", serde_json::to_string_pretty(&messages)?);
    Ok(())
}
