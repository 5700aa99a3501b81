//! Chat-platform access behind a narrow trait.
//!
//! The scheduler and delivery tasks only need three things from Discord:
//! which guilds a user shares with the bot, what the user is called in a
//! guild, and the ability to post a message. Keeping that behind
//! [`ChatClient`] lets the whole birthday pipeline run against a mock in
//! tests.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serenity::cache::Cache;
use serenity::http::Http;
use serenity::model::id::{ChannelId, GuildId, UserId};

/// Mention markup for a user.
pub fn mention(user_id: u64) -> String {
    format!("<@{user_id}>")
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Guilds shared by the bot and the user.
    async fn mutual_guilds(&self, user_id: u64) -> Result<Vec<u64>>;

    /// The user's display name in a guild (nickname when set), or None if
    /// they are not a member.
    async fn member_display_name(&self, guild_id: u64, user_id: u64) -> Option<String>;

    async fn send(&self, channel_id: u64, content: &str) -> Result<()>;
}

/// Production client over serenity's cache and http.
pub struct SerenityChat {
    cache: Arc<Cache>,
    http: Arc<Http>,
}

impl SerenityChat {
    pub fn new(cache: Arc<Cache>, http: Arc<Http>) -> Self {
        SerenityChat { cache, http }
    }
}

#[async_trait]
impl ChatClient for SerenityChat {
    async fn mutual_guilds(&self, user_id: u64) -> Result<Vec<u64>> {
        let user_id = UserId(user_id);
        Ok(self
            .cache
            .guilds()
            .into_iter()
            .filter(|guild_id| self.cache.member(*guild_id, user_id).is_some())
            .map(|guild_id| guild_id.0)
            .collect())
    }

    async fn member_display_name(&self, guild_id: u64, user_id: u64) -> Option<String> {
        self.cache
            .member(GuildId(guild_id), UserId(user_id))
            .map(|member| member.display_name().to_string())
    }

    async fn send(&self, channel_id: u64, content: &str) -> Result<()> {
        ChannelId(channel_id)
            .say(&self.http, content)
            .await
            .with_context(|| format!("Failed to send message to channel {channel_id}"))?;
        Ok(())
    }
}
