use std::env;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use dotenvy::dotenv;
use log::{error, info, warn};
use serenity::async_trait;
use serenity::model::application::interaction::Interaction;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use tokio::sync::OnceCell;

use jubilee::chat::SerenityChat;
use jubilee::commands::{self, CommandContext};
use jubilee::core::{Config, SystemClock};
use jubilee::database::Database;
use jubilee::features::birthdays::{birthday_scan_loop, BirthdayScheduler, TemplatePools};

/// Tracks whether this is the first Ready event (vs reconnect)
static FIRST_READY: AtomicBool = AtomicBool::new(true);

struct Handler {
    config: Arc<Config>,
    database: Database,
    command_context: OnceCell<Arc<CommandContext>>,
}

impl Handler {
    fn new(config: Arc<Config>, database: Database) -> Self {
        Handler {
            config,
            database,
            command_context: OnceCell::new(),
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("{} is connected", ready.user.name);

        let command_context = self
            .command_context
            .get_or_init(|| async {
                let chat = Arc::new(SerenityChat::new(ctx.cache.clone(), ctx.http.clone()));
                let templates = TemplatePools {
                    with_age: self.config.birthdays.message_templates_with_age.clone(),
                    no_age: self.config.birthdays.message_templates_no_age.clone(),
                };
                let scheduler = BirthdayScheduler::new(
                    Arc::new(self.database.clone()),
                    chat,
                    Arc::new(SystemClock),
                    templates,
                );
                Arc::new(CommandContext::new(
                    self.database.clone(),
                    scheduler,
                    self.config.clone(),
                ))
            })
            .await
            .clone();

        if FIRST_READY.swap(false, Ordering::SeqCst) {
            if let Err(e) = commands::register_global_commands(&ctx.http).await {
                error!("Failed to register slash commands: {e:#}");
            }

            let period = Duration::from_secs(self.config.birthdays.scan_period_hours * 3600);
            tokio::spawn(birthday_scan_loop(command_context.scheduler.clone(), period));
            info!(
                "Birthday scan loop started (period {}h)",
                self.config.birthdays.scan_period_hours
            );
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::ApplicationCommand(command) = interaction {
            let Some(command_context) = self.command_context.get() else {
                warn!("Received a command before ready; ignoring");
                return;
            };
            if let Err(e) = commands::dispatch(command_context, &ctx, &command).await {
                error!("Command /{} failed: {e:#}", command.data.name);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let config_path = env::var("JUBILEE_CONFIG").unwrap_or_else(|_| "jubilee.yaml".to_string());
    let config = Arc::new(Config::load(Path::new(&config_path))?);

    if let Some(parent) = Path::new(&config.database_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let database = Database::open(&config.database_path)?;

    let token = env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?;
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_MEMBERS;

    let mut client = Client::builder(&token, intents)
        .event_handler(Handler::new(config, database))
        .await
        .context("Failed to create Discord client")?;

    info!("Starting jubilee");
    client.start().await.context("Client error")?;
    Ok(())
}
