//! smsbridge: SMS <-> Discord bridge binary
//!
//! Usage:
//!   smsbridge            - Start the bridge (webhook server + Discord bot)
//!   smsbridge --help     - Show help
//!   smsbridge --version  - Show version

use std::sync::Arc;
use std::time::Duration;

use sb_api::AppState;
use sb_core::{
    chat_channel, AllowList, ChatReceiver, Config, ContextStore, DeliveryMode, InboundBridge,
    OutboundBridge, PullQueue, Resolver, SmsDelivery,
};
use sb_discord::DiscordBot;
use sb_sms::GatewayClient;
use tracing_subscriber::EnvFilter;

/// How often expired context records are pruned
const CONTEXT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Run mode
enum RunMode {
    /// Webhook server + Discord bot
    Server,
    Help,
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match parse_args() {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("smsbridge {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Server => {}
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting smsbridge...");
    tracing::info!(
        "{} allowed numbers, {} routes, {:?} delivery",
        config.bridge.allowed_numbers.len(),
        config.bridge.routes.len(),
        config.bridge.delivery_mode
    );

    run_server(config).await
}

/// Parse command line arguments
fn parse_args() -> RunMode {
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }

    RunMode::Server
}

/// Print help message
fn print_help() {
    println!("smsbridge - SMS <-> Discord bridge");
    println!();
    println!("Usage:");
    println!("  smsbridge            Start the bridge");
    println!("  smsbridge --help     Show this help message");
    println!("  smsbridge --version  Show version");
    println!();
    println!("Configuration is read from ./smsbridge.toml when present, then from");
    println!("the environment (a .env file is loaded first).");
    println!();
    println!("Environment Variables:");
    println!("  DISCORD_BOT_TOKEN     Discord bot token (required)");
    println!("  ALLOWED_NUMBERS       Comma-separated numbers allowed to send");
    println!("  NUMBER_MAP            JSON routing table, e.g. {{\"nova\": \"1234\"}}");
    println!("  KNOWN_DESTINATION_IDS Extra raw IDs accepted as routing tokens");
    println!("  TARGET_PHONE_NUMBER   Fallback number for chat -> SMS");
    println!("  ROUTE_DELIMITER       Token/body separator (default: whitespace)");
    println!("  DELIVERY_MODE         push or pull (default: push)");
    println!("  CONFIRM_DELIVERY      Wait for the Discord message id (default: false)");
    println!("  CONFIRM_TIMEOUT_SECS  Confirmation wait (default: 10)");
    println!("  CONTEXT_TTL_SECS      Conversation context lifetime (default: 86400)");
    println!("  CONTEXT_MAX_ENTRIES   Conversation context cap (default: 1024)");
    println!("  SMS_GATEWAY_URL       Gateway send endpoint (required in push mode)");
    println!("  SMS_GATEWAY_USERNAME  Gateway basic-auth user");
    println!("  SMS_GATEWAY_PASSWORD  Gateway basic-auth password");
    println!("  SMS_PHONE_ID          Gateway sending device id");
    println!("  SMS_MAX_ATTEMPTS      Delivery attempts (default: 3)");
    println!("  SMS_RETRY_DELAY_SECS  Pause between attempts (default: 5)");
    println!("  SMS_TIMEOUT_SECS      Per-attempt request timeout (default: 30)");
    println!("  SMS_RETRY_CLIENT_ERRORS  Retry gateway 4xx answers (default: true)");
    println!("  API_PORT              HTTP port (default: 5000)");
    println!("  REQUIRE_JSON          Reject non-JSON webhooks (default: false)");
}

/// Wire the components and run until Ctrl+C
async fn run_server(config: Config) -> anyhow::Result<()> {
    let allow_list = Arc::new(AllowList::new(&config.bridge.allowed_numbers));
    let resolver = Arc::new(Resolver::new(
        config.bridge.routes.clone(),
        &config.bridge.known_destination_ids,
    ));
    let context = ContextStore::new(&config.context);
    let (chat_handle, chat_rx) = chat_channel();

    if allow_list.is_empty() {
        tracing::warn!("Allow-list is empty; every inbound SMS will be rejected");
    }

    let (delivery, queue) = match config.bridge.delivery_mode {
        DeliveryMode::Push => {
            let client = GatewayClient::new(&config.gateway)
                .map_err(|e| anyhow::anyhow!("Failed to create SMS gateway client: {}", e))?;
            (SmsDelivery::Push(Arc::new(client)), None)
        }
        DeliveryMode::Pull => {
            let queue = PullQueue::new();
            (SmsDelivery::Pull(queue.clone()), Some(queue))
        }
    };

    let outbound = OutboundBridge::new(Arc::clone(&resolver), context.clone(), delivery)
        .with_fallback_number(config.bridge.target_number.clone());

    let inbound = InboundBridge::new(allow_list, resolver, context.clone(), chat_handle)
        .with_delimiter(config.bridge.delimiter)
        .with_confirmation(
            config
                .bridge
                .confirm_delivery
                .then(|| config.bridge.confirm_timeout()),
        );

    // Track running services for shutdown
    let mut service_handles = vec![context.start_cleanup_task(CONTEXT_CLEANUP_INTERVAL)];

    let bot = DiscordBot::new(config.discord_token.clone(), context, outbound)
        .map_err(|e| anyhow::anyhow!("Discord bot error: {}", e))?;
    service_handles.push(tokio::spawn(start_discord_bot(bot, chat_rx)));
    tracing::info!("Discord bot started");

    let api_port = config.api.port;
    let state = AppState {
        inbound,
        queue,
        require_json: config.api.require_json,
    };
    service_handles.push(tokio::spawn(async move {
        if let Err(e) = sb_api::start_server(api_port, state).await {
            tracing::error!("HTTP server error: {}", e);
        }
    }));
    tracing::info!("HTTP server started on port {}", api_port);

    tracing::info!("smsbridge initialized successfully");
    tracing::info!("Press Ctrl+C to exit");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    for handle in service_handles {
        handle.abort();
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Run the Discord bot until its connection ends
async fn start_discord_bot(bot: DiscordBot, chat_rx: ChatReceiver) {
    if let Err(e) = bot.start(chat_rx).await {
        tracing::error!("Discord bot error: {}", e);
    }
}
