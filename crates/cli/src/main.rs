use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "simon")]
#[command(about = "WhatsApp completion relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory, a default config file, and the
    /// conversation store directory.
    Init {
        /// Config file path (default: SIMON_CONFIG_PATH or ~/.simon/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the relay server (webhook intake, verification handshake, manual send).
    Serve {
        /// Config file path (default: SIMON_CONFIG_PATH or ~/.simon/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Send a one-off text message through the WhatsApp channel.
    Send {
        /// Config file path (default: SIMON_CONFIG_PATH or ~/.simon/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Recipient phone number (wa_id)
        #[arg(long, value_name = "NUMBER")]
        to: String,

        /// Message text
        #[arg(value_name = "TEXT")]
        body: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("simon {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Send { config, to, body }) => {
            if let Err(e) = run_send(config, to, body).await {
                log::error!("send failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, _path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.server.port = p;
    }
    log::info!(
        "starting relay on {}:{}",
        config.server.bind,
        config.server.port
    );
    lib::server::run_server(config).await
}

async fn run_send(
    config_path: Option<std::path::PathBuf>,
    to: String,
    body: String,
) -> anyhow::Result<()> {
    let (config, _path) = lib::config::load_config(config_path)?;
    let Some(api_token) = lib::config::resolve_whatsapp_token(&config) else {
        anyhow::bail!("whatsapp api token not configured (set WHATSAPP_API_TOKEN or whatsapp.apiToken)");
    };
    let Some(number_id) = lib::config::resolve_number_id(&config) else {
        anyhow::bail!("whatsapp number id not configured (set WHATSAPP_NUMBER_ID or whatsapp.numberId)");
    };
    let channel =
        lib::channels::WhatsAppChannel::new(api_token, number_id, config.whatsapp.api_base.clone());
    let status = channel.send_message(&to, &body).await?;
    println!("sent (HTTP status {})", status);
    Ok(())
}
