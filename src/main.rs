use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{error, info};

use tg_relaybot::channel::{ChannelClient, TelegramChannel};
use tg_relaybot::config;
use tg_relaybot::db;
use tg_relaybot::debounce::BatchDebouncer;
use tg_relaybot::handlers::{self, AppContext};
use tg_relaybot::relay::{RelayOptions, RelayWorker};
use tg_relaybot::staging::CaptionStaging;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;
    let zone = cfg.app.zone()?;

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.database_url());
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;
    db::seed_default_settings(&pool).await?;

    let bot = Bot::new(cfg.telegram.bot_token.clone());
    let channel: Arc<dyn ChannelClient> = Arc::new(TelegramChannel::new(bot.clone()));

    // Single consumer; never more than one cycle in flight.
    let worker = RelayWorker::new(
        pool.clone(),
        Arc::clone(&channel),
        RelayOptions {
            destination: cfg.telegram.target_chat_id,
            poll_interval: cfg.app.poll_interval(),
            error_cooldown: cfg.app.error_cooldown(),
            zone,
        },
    );
    tokio::spawn(worker.run());

    let ctx = AppContext {
        debouncer: BatchDebouncer::new(pool.clone(), Arc::clone(&channel), cfg.app.batch_quiet()),
        staging: Arc::new(CaptionStaging::new(cfg.app.caption_window())),
        admins: Arc::new(cfg.telegram.allowed_users.clone()),
        pool,
        channel,
        zone,
    };

    info!("starting telegram bot");
    teloxide::repl(bot, move |msg: Message| {
        let ctx = ctx.clone();
        async move {
            if let Err(err) = handlers::handle_update(&ctx, &msg).await {
                error!(?err, "failed to handle update");
            }
            respond(())
        }
    })
    .await;

    Ok(())
}
