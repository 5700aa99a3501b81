//! Birthday listing command handler
//!
//! Handles: birthdays

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::model::id::UserId;
use serenity::prelude::Context;

use crate::commands::context::CommandContext;
use crate::commands::handler::SlashCommandHandler;
use crate::commands::{respond_ephemeral, respond_public, subcommand};
use crate::database::{Birthday, Privacy};

/// Handler for the server-facing birthday listing
pub struct BirthdaysHandler;

#[async_trait]
impl SlashCommandHandler for BirthdaysHandler {
    fn command_names(&self) -> &'static [&'static str] {
        &["birthdays"]
    }

    async fn handle(
        &self,
        ctx: &Arc<CommandContext>,
        serenity_ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        match subcommand(command) {
            Some(("upcoming", _)) => self.handle_upcoming(ctx, serenity_ctx, command).await,
            _ => Ok(()),
        }
    }
}

/// How many calendar positions ahead of `today` a birthday sits, wrapping
/// through year-end. Used purely as a sort key.
fn calendar_offset(birthday: &Birthday, today: NaiveDate) -> u32 {
    const YEAR_SPAN: u32 = 13 * 32;
    let position = birthday.month * 32 + birthday.day;
    let today_position = today.month() * 32 + today.day();
    (position + YEAR_SPAN - today_position) % YEAR_SPAN
}

impl BirthdaysHandler {
    async fn handle_upcoming(
        &self,
        ctx: &Arc<CommandContext>,
        serenity_ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        let Some(guild_id) = command.guild_id else {
            return respond_ephemeral(serenity_ctx, command, "This command only works on a server.")
                .await;
        };

        let birthdays_config = &ctx.config.birthdays;
        let (mut past, mut upcoming) = ctx
            .scheduler
            .get_past_upcoming_birthdays(
                birthdays_config.past_birthdays_day_range,
                birthdays_config.upcoming_birthdays_day_range,
            )
            .await?;

        let today = Utc::now().date_naive();
        // Most recent first for past, soonest first for upcoming
        past.sort_by_key(|(_, birthday)| std::cmp::Reverse(calendar_offset(birthday, today)));
        upcoming.sort_by_key(|(_, birthday)| calendar_offset(birthday, today));

        let mut past_lines = Vec::new();
        for (user_id, birthday) in &past {
            if let Some(line) = self.format_line(ctx, serenity_ctx, guild_id.0, *user_id, birthday) {
                past_lines.push(line);
            }
        }
        let mut upcoming_lines = Vec::new();
        for (user_id, birthday) in &upcoming {
            if let Some(line) = self.format_line(ctx, serenity_ctx, guild_id.0, *user_id, birthday) {
                upcoming_lines.push(line);
            }
        }

        if past_lines.is_empty() && upcoming_lines.is_empty() {
            return respond_ephemeral(
                serenity_ctx,
                command,
                "Nobody on this server has a birthday coming up. Set yours with `/birthday set`!",
            )
            .await;
        }

        let mut content = String::new();
        if !past_lines.is_empty() {
            content.push_str("**Past birthdays**\n");
            content.push_str(&past_lines.join("\n"));
            content.push('\n');
        }
        if !upcoming_lines.is_empty() {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str("**Upcoming birthdays**\n");
            content.push_str(&upcoming_lines.join("\n"));
        }
        respond_public(serenity_ctx, command, &content).await
    }

    /// One listing line, or None when the user isn't a member of this guild.
    fn format_line(
        &self,
        ctx: &Arc<CommandContext>,
        serenity_ctx: &Context,
        guild_id: u64,
        user_id: u64,
        birthday: &Birthday,
    ) -> Option<String> {
        let member = serenity_ctx
            .cache
            .member(serenity::model::id::GuildId(guild_id), UserId(user_id))?;

        let name = match ctx.database.privacy_preferred_name(user_id) {
            Ok(Privacy::Public) => ctx
                .database
                .preferred_name(user_id)
                .ok()
                .flatten()
                .unwrap_or_else(|| member.display_name().to_string()),
            _ => member.display_name().to_string(),
        };

        let date = NaiveDate::from_ymd_opt(2000, birthday.month, birthday.day)?;
        Some(format!("🎂  `{}` - **{name}**", date.format("%b %d")))
    }
}
