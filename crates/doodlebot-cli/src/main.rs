use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use doodlebot_core::config::Config;

#[derive(Parser)]
#[command(
    name = "doodlebot",
    about = "Telegram bot that draws on a remote web canvas through a headless browser",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot: Telegram polling plus the liveness endpoint
    Serve {
        /// Liveness endpoint port (default: 3000)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show effective settings and config problems
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
}

fn init_tracing(config: &Config, verbose: bool) {
    let base = if verbose { "debug" } else { "info" };
    let logging = config.logging.clone().unwrap_or_default();
    let level = logging.level.as_deref().unwrap_or(base);

    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    for directive in &logging.filters {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if logging.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Serve { port } => {
            run_serve(config, port).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },
        Commands::Status => {
            println!("DoodleBot v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Liveness port: {}", config.server_port());
            let (warnings, errors) = config.validate();
            for w in &warnings {
                println!("warning: {w}");
            }
            for e in &errors {
                println!("error: {e}");
            }
            if warnings.is_empty() && errors.is_empty() {
                println!("Config OK");
            }
        }
    }

    Ok(())
}

#[cfg(not(feature = "browser"))]
async fn run_serve(config: Config, port_override: Option<u16>) -> anyhow::Result<()> {
    let _ = (config, port_override);
    anyhow::bail!("this binary was built without the `browser` feature; nothing to serve")
}

#[cfg(feature = "browser")]
async fn run_serve(config: Config, port_override: Option<u16>) -> anyhow::Result<()> {
    use doodlebot_browser::{ChromiumBackend, SessionManager};
    use doodlebot_channels::Channel;
    use doodlebot_channels::telegram::TelegramChannel;
    use doodlebot_core::session::CanvasHost;
    use doodlebot_gateway::{Dispatcher, start_server};

    let (warnings, errors) = config.validate();
    for w in &warnings {
        tracing::warn!("{w}");
    }
    if !errors.is_empty() {
        anyhow::bail!("invalid config: {}", errors.join("; "));
    }

    let telegram = config.telegram_config();
    let Some(token) = telegram.resolve_bot_token() else {
        anyhow::bail!(
            "no bot token: set telegram.bot_token in the config or the BOT_TOKEN environment variable"
        );
    };

    let browser_cfg = config.browser_config();
    let host: Arc<dyn CanvasHost> = Arc::new(SessionManager::new(
        ChromiumBackend::new(browser_cfg.clone()),
        browser_cfg,
        config.canvas_config(),
    ));
    let dispatcher = Dispatcher::new(host.clone());

    let channel = TelegramChannel::new(
        token,
        telegram.allowed_users.clone(),
        telegram.poll_timeout_secs,
    );
    let (mut inbound, poll_handle) = channel.start().await?;

    let bind = config.server_bind();
    let port = port_override.unwrap_or_else(|| config.server_port());
    let server_host = host.clone();
    tokio::spawn(async move {
        if let Err(e) = start_server(server_host, &bind, port).await {
            tracing::error!(error = %e, "liveness endpoint failed");
        }
    });

    tracing::info!("DoodleBot running; send the bot a canvas URL to begin");

    // One message at a time: commands are applied in arrival order.
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
            msg = inbound.recv() => {
                let Some(msg) = msg else {
                    tracing::warn!("inbound stream closed");
                    break;
                };
                let chat_id = msg.chat_id.clone();
                if let Err(e) = channel.set_typing(&chat_id).await {
                    tracing::debug!(error = %e, "typing indicator failed");
                }
                let reply = dispatcher.handle(&msg).await;
                if let Some(outbound) = reply.into_outbound() {
                    match channel.send(&chat_id, outbound).await {
                        Ok(result) if !result.success => {
                            tracing::error!(
                                chat_id,
                                error = result.error.as_deref().unwrap_or("unknown"),
                                "reply rejected"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(chat_id, error = %e, "reply failed"),
                    }
                }
            }
        }
    }

    poll_handle.shutdown();
    host.detach().await;
    Ok(())
}
