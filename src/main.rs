use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tgbot::config::{self, Config};
use tgbot::error::{BotError, Result};
use tgbot::types::{GetUpdatesOptions, InlineKeyboardButton, SetWebhook};
use tgbot::webhook::{self, WebhookState};
use tgbot::{Bot, Context, EditOptions, MediaKind, SendOptions, UpdateCategory};

#[derive(Parser)]
#[command(name = "tgbot", version, about = "Telegram Bot API client and demo bot")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config file
    Init,
    /// Run the demo bot with long polling
    Poll {
        /// Long-poll timeout passed to getUpdates, in seconds
        #[arg(long, default_value = "20")]
        timeout: u32,
    },
    /// Run the demo bot behind the webhook server
    Serve,
    /// Register the webhook URL with Telegram
    SetWebhook {
        /// Public URL; defaults to webhook.url from the config
        url: Option<String>,
        /// Drop updates queued before the webhook was set
        #[arg(long)]
        drop_pending: bool,
    },
    /// Remove the webhook registration
    DeleteWebhook {
        #[arg(long)]
        drop_pending: bool,
    },
    /// Show the current webhook registration
    WebhookInfo,
    /// Send a one-off message
    Send {
        /// Numeric chat id or @channelusername
        chat_id: String,
        /// Message text (caption when sending a file)
        text: Option<String>,
        /// Photo to send: local path, URL or file id
        #[arg(long, conflicts_with = "document")]
        photo: Option<String>,
        /// Document to send: local path, URL or file id
        #[arg(long)]
        document: Option<String>,
    },
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_tracing(matches!(cli.command, Commands::Poll { .. } | Commands::Serve))?;

    match cli.command {
        Commands::Init => cmd_init(&cli.config)?,
        Commands::Poll { timeout } => cmd_poll(&cli.config, timeout).await?,
        Commands::Serve => cmd_serve(&cli.config).await?,
        Commands::SetWebhook { url, drop_pending } => {
            cmd_set_webhook(&cli.config, url, drop_pending).await?
        }
        Commands::DeleteWebhook { drop_pending } => {
            let bot = build_bot(&load_config(&cli.config)?)?;
            let ok = bot.delete_webhook(drop_pending).await?;
            println!("deleteWebhook: {ok}");
        }
        Commands::WebhookInfo => {
            let bot = build_bot(&load_config(&cli.config)?)?;
            let info = bot.get_webhook_info().await?;
            if info.url.is_empty() {
                println!("No webhook set (polling mode).");
            } else {
                println!("URL:     {}", info.url);
                println!("Pending: {}", info.pending_update_count);
                if let Some(msg) = info.last_error_message {
                    println!("Last error: {msg}");
                }
            }
        }
        Commands::Send {
            chat_id,
            text,
            photo,
            document,
        } => cmd_send(&cli.config, chat_id, text, photo, document).await?,
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn log_file_path() -> PathBuf {
    config::home_dir().join("tgbot.log")
}

fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    let config_path = path.clone().unwrap_or_else(Config::default_path);
    if !config_path.exists() {
        return Err(BotError::Config(format!(
            "Config not found at {}. Run `tgbot init` first.",
            config_path.display()
        )));
    }
    Config::load(&config_path)
}

fn build_bot(config: &Config) -> Result<Bot> {
    Bot::with_config(config.bot.clone())
}

fn init_tracing(with_file: bool) -> std::result::Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if with_file {
            "info".into()
        } else {
            "warn".into()
        }
    });

    let stderr_layer = tracing_subscriber::fmt::layer();

    if with_file {
        let _ = std::fs::create_dir_all(config::home_dir());
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_path())?;

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }

    Ok(())
}

/// Demo behaviour shared by `poll` and `serve`.
///
/// With `direct` set, text echoes are answered through the webhook
/// response instead of a separate sendMessage call.
fn register_demo_handlers(bot: &Bot, direct: bool) {
    bot.catch(|err: Arc<BotError>| async move {
        error!("Bot error: {err}");
    });

    bot.start(|ctx: Context| async move {
        let options = SendOptions::new()
            .buttons(vec![
                InlineKeyboardButton::callback("Ping", "ping"),
                InlineKeyboardButton::callback("Delete me", "delete"),
            ])
            .buttons_column(2);
        ctx.reply("Hi! Send me anything and I will echo it.", &options, MediaKind::Text)
            .await?;
        Ok(())
    });

    bot.on(UpdateCategory::Text, move |ctx: Context| async move {
        let text = ctx
            .message()
            .and_then(|m| m.text.clone())
            .unwrap_or_default();
        if direct {
            ctx.direct_reply(text);
        } else {
            ctx.reply_text(text).await?;
        }
        Ok(())
    });

    bot.on(UpdateCategory::Photo, |ctx: Context| async move {
        ctx.reply_text("Nice picture.").await?;
        Ok(())
    });

    bot.action("ping", |ctx: Context| async move {
        if let (Some(chat_id), Some(message)) = (ctx.chat_id(), ctx.update().origin_message()) {
            ctx.bot()
                .edit_message_text(chat_id, message.message_id, "Pong!", EditOptions::default())
                .await?;
        }
        Ok(())
    });

    bot.action("delete", |ctx: Context| async move {
        ctx.delete_message(None).await?;
        Ok(())
    });
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_init(path: &Option<PathBuf>) -> Result<()> {
    let config_path = path.clone().unwrap_or_else(Config::default_path);
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        return Ok(());
    }
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config_path, Config::default_toml())?;
    println!("Wrote {}", config_path.display());
    println!("Set TELEGRAM_BOT_TOKEN, then run `tgbot poll`.");
    Ok(())
}

async fn cmd_poll(path: &Option<PathBuf>, timeout: u32) -> Result<()> {
    let config = load_config(path)?;
    let bot = build_bot(&config)?;
    register_demo_handlers(&bot, false);

    // Long polling is rejected while a webhook is registered.
    bot.delete_webhook(false).await?;

    let handle = bot.start_polling(GetUpdatesOptions {
        timeout: Some(timeout),
        ..GetUpdatesOptions::default()
    });
    info!("tgbot polling, press Ctrl-C to stop");
    handle.join().await;
    Ok(())
}

async fn cmd_serve(path: &Option<PathBuf>) -> Result<()> {
    let config = load_config(path)?;
    let bot = build_bot(&config)?;
    register_demo_handlers(&bot, true);

    let state = Arc::new(WebhookState {
        bot,
        secret_token: config.webhook.secret().map(str::to_string),
    });
    let app = webhook::router(state, &config.webhook.path);

    let bind_addr = config.webhook.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| BotError::Config(format!("Failed to bind to {bind_addr}: {e}")))?;

    println!("tgbot v{} webhook server", env!("CARGO_PKG_VERSION"));
    println!("  Bind: {bind_addr}");
    println!("  Path: {}", config.webhook.path);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down webhook server");
        })
        .await?;
    Ok(())
}

async fn cmd_set_webhook(path: &Option<PathBuf>, url: Option<String>, drop_pending: bool) -> Result<()> {
    let config = load_config(path)?;
    let url = url
        .or_else(|| config.webhook.url.clone())
        .ok_or_else(|| BotError::Config("No webhook URL given or configured".to_string()))?;
    let bot = build_bot(&config)?;
    let ok = bot
        .set_webhook(SetWebhook {
            url: url.clone(),
            secret_token: config.webhook.secret().map(str::to_string),
            drop_pending_updates: drop_pending.then_some(true),
            ..SetWebhook::default()
        })
        .await?;
    println!("setWebhook {url}: {ok}");
    Ok(())
}

async fn cmd_send(
    path: &Option<PathBuf>,
    chat_id: String,
    text: Option<String>,
    photo: Option<String>,
    document: Option<String>,
) -> Result<()> {
    let config = load_config(path)?;
    let bot = build_bot(&config)?;

    let sent = match (photo, document) {
        (Some(photo), _) => {
            let options = text.map(|t| SendOptions::new().caption(t)).unwrap_or_default();
            bot.send_photo(chat_id, photo, &options).await?
        }
        (None, Some(document)) => {
            let options = text.map(|t| SendOptions::new().caption(t)).unwrap_or_default();
            bot.send_document(chat_id, document, &options).await?
        }
        (None, None) => {
            let text = text.ok_or_else(|| BotError::Config("Nothing to send".to_string()))?;
            bot.send_text(chat_id, text, &SendOptions::default()).await?
        }
    };

    if let Some(message) = sent {
        println!("Sent message {} to chat {}", message.message_id, message.chat.id);
    }
    Ok(())
}
