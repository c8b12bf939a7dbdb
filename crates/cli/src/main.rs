use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "linegem")]
#[command(about = "LINE webhook relay answering chat messages with Gemini", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: LINEGEM_CONFIG_PATH or ~/.linegem/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the webhook relay (the default when no command is given).
    Serve {
        /// Config file path (default: LINEGEM_CONFIG_PATH or ~/.linegem/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Listener port (default: PORT env, then config, then 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Send one message to Gemini and print the answer (no LINE involved).
    Ask {
        /// Message to complete.
        text: String,

        /// Config file path (default: LINEGEM_CONFIG_PATH or ~/.linegem/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Do not send the system instruction.
        #[arg(long)]
        no_system_prompt: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("linegem {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("relay failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask {
            text,
            config,
            no_system_prompt,
        }) => {
            if let Err(e) = run_ask(config, text, no_system_prompt).await {
                log::error!("ask failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            if let Err(e) = run_serve(None, None).await {
                log::error!("relay failed: {:#}", e);
                std::process::exit(1);
            }
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(linegem::config::default_config_path);
    let dir = linegem::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = linegem::config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting relay on {}:{}",
        config.gateway.bind,
        config.gateway.port
    );
    linegem::gateway::run_gateway(config).await
}

async fn run_ask(
    config_path: Option<PathBuf>,
    text: String,
    no_system_prompt: bool,
) -> anyhow::Result<()> {
    let (config, _) = linegem::config::load_config(config_path)?;
    let client = linegem::gateway::build_gemini_client(&config)?;
    let system_prompt = if no_system_prompt {
        None
    } else {
        linegem::gateway::resolve_system_prompt(&config)
    };
    let answer = client.complete(system_prompt.as_deref(), &text).await?;
    println!("{}", answer.trim());
    Ok(())
}
