//! Profile-editing command handlers
//!
//! Handles: birthday, timezone, pronouns, name, privacy, birthday-channel
//!
//! Any edit that can change when (or whether) a birthday notification fires
//! ends with a `notify_change` call into the scheduler, which cancels or
//! re-arms the user's delivery task right away.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use chrono_tz::Tz;
use log::warn;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::prelude::Context;

use crate::commands::context::CommandContext;
use crate::commands::handler::SlashCommandHandler;
use crate::commands::{
    get_channel_option, get_string_option, respond_ephemeral, subcommand,
};
use crate::database::{Birthday, Privacy};
use crate::features::pronouns;

/// Handler for the profile-editing commands
pub struct BiosHandler;

#[async_trait]
impl SlashCommandHandler for BiosHandler {
    fn command_names(&self) -> &'static [&'static str] {
        &[
            "birthday",
            "timezone",
            "pronouns",
            "name",
            "privacy",
            "birthday-channel",
        ]
    }

    async fn handle(
        &self,
        ctx: &Arc<CommandContext>,
        serenity_ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        match command.data.name.as_str() {
            "birthday" => self.handle_birthday(ctx, serenity_ctx, command).await,
            "timezone" => self.handle_timezone(ctx, serenity_ctx, command).await,
            "pronouns" => self.handle_pronouns(ctx, serenity_ctx, command).await,
            "name" => self.handle_name(ctx, serenity_ctx, command).await,
            "privacy" => self.handle_privacy(ctx, serenity_ctx, command).await,
            "birthday-channel" => {
                self.handle_birthday_channel(ctx, serenity_ctx, command).await
            }
            _ => Ok(()),
        }
    }
}

/// Parse user birthday input: "YYYY-MM-DD", or "MM-DD" to omit the year.
pub fn parse_birthday_input(raw: &str) -> Option<Birthday> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(Birthday::new(date.month(), date.day(), Some(date.year())));
    }
    let (month, day) = raw.split_once('-')?;
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    // Validate against a leap year so Feb 29 is accepted
    NaiveDate::from_ymd_opt(2000, month, day)?;
    Some(Birthday::new(month, day, None))
}

pub fn format_birthday(birthday: &Birthday) -> String {
    let date = NaiveDate::from_ymd_opt(birthday.year.unwrap_or(2000), birthday.month, birthday.day)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
    match birthday.year {
        Some(_) => date.format("%B %-d, %Y").to_string(),
        None => date.format("%B %-d").to_string(),
    }
}

impl BiosHandler {
    /// Tell the scheduler a user's scheduling-relevant data changed. A
    /// failure here only costs a notification cycle, so it is logged rather
    /// than surfaced to the user whose edit already succeeded.
    async fn notify_scheduler(&self, ctx: &Arc<CommandContext>, user_id: u64) {
        if let Err(e) = ctx.scheduler.notify_change(user_id).await {
            warn!("Failed to notify birthday scheduler about user {user_id}: {e:#}");
        }
    }

    async fn handle_birthday(
        &self,
        ctx: &Arc<CommandContext>,
        serenity_ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        let user_id = command.user.id.0;
        match subcommand(command) {
            Some(("set", options)) => {
                let raw = get_string_option(options, "date").unwrap_or_default();
                let Some(birthday) = parse_birthday_input(&raw) else {
                    return respond_ephemeral(
                        serenity_ctx,
                        command,
                        "I couldn't read that date. Use `YYYY-MM-DD`, or `MM-DD` to leave \
                         the year out.",
                    )
                    .await;
                };
                ctx.database.create_user(user_id)?;
                ctx.database.set_birthday(user_id, Some(birthday))?;
                self.notify_scheduler(ctx, user_id).await;
                respond_ephemeral(
                    serenity_ctx,
                    command,
                    &format!(
                        "Birthday set to {}. It's only visible to others once you run \
                         `/privacy birthday public`.",
                        format_birthday(&birthday)
                    ),
                )
                .await
            }
            Some(("show", _)) => {
                let content = match ctx.database.birthday(user_id)? {
                    Some(birthday) => format!("Your birthday is {}.", format_birthday(&birthday)),
                    None => "You haven't set a birthday.".to_string(),
                };
                respond_ephemeral(serenity_ctx, command, &content).await
            }
            Some(("delete", _)) => {
                ctx.database.set_birthday(user_id, None)?;
                self.notify_scheduler(ctx, user_id).await;
                respond_ephemeral(serenity_ctx, command, "Birthday deleted.").await
            }
            _ => Ok(()),
        }
    }

    async fn handle_timezone(
        &self,
        ctx: &Arc<CommandContext>,
        serenity_ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        let user_id = command.user.id.0;
        match subcommand(command) {
            Some(("set", options)) => {
                let raw = get_string_option(options, "zone").unwrap_or_default();
                let Ok(zone) = raw.trim().parse::<Tz>() else {
                    return respond_ephemeral(
                        serenity_ctx,
                        command,
                        "I don't know that timezone. Use an IANA name like \
                         `Europe/Amsterdam` or `America/New_York`.",
                    )
                    .await;
                };
                ctx.database.create_user(user_id)?;
                ctx.database.set_timezone(user_id, Some(zone))?;
                self.notify_scheduler(ctx, user_id).await;
                respond_ephemeral(
                    serenity_ctx,
                    command,
                    &format!("Timezone set to {}.", zone.name()),
                )
                .await
            }
            Some(("show", _)) => {
                let content = match ctx.database.timezone(user_id)? {
                    Some(zone) => format!("Your timezone is {}.", zone.name()),
                    None => "You haven't set a timezone.".to_string(),
                };
                respond_ephemeral(serenity_ctx, command, &content).await
            }
            Some(("delete", _)) => {
                ctx.database.set_timezone(user_id, None)?;
                self.notify_scheduler(ctx, user_id).await;
                respond_ephemeral(serenity_ctx, command, "Timezone deleted.").await
            }
            _ => Ok(()),
        }
    }

    async fn handle_pronouns(
        &self,
        ctx: &Arc<CommandContext>,
        serenity_ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        let user_id = command.user.id.0;
        match subcommand(command) {
            Some(("set", options)) => {
                let raw = get_string_option(options, "pronouns").unwrap_or_default();
                ctx.database.create_user(user_id)?;
                ctx.database.set_pronouns(user_id, Some(raw.as_str()))?;
                let parsed: Vec<String> = pronouns::parse(&raw)
                    .into_iter()
                    .map(|set| set.to_string())
                    .collect();
                let preview = if parsed.is_empty() {
                    "nothing I could parse, but I saved it as-is".to_string()
                } else {
                    parsed.join("; ")
                };
                respond_ephemeral(
                    serenity_ctx,
                    command,
                    &format!("Pronouns set. I read that as: {preview}."),
                )
                .await
            }
            Some(("show", _)) => {
                let content = match ctx.database.pronouns(user_id)? {
                    Some(raw) => format!("Your pronouns are {raw}."),
                    None => "You haven't set pronouns.".to_string(),
                };
                respond_ephemeral(serenity_ctx, command, &content).await
            }
            Some(("delete", _)) => {
                ctx.database.set_pronouns(user_id, None)?;
                respond_ephemeral(serenity_ctx, command, "Pronouns deleted.").await
            }
            _ => Ok(()),
        }
    }

    async fn handle_name(
        &self,
        ctx: &Arc<CommandContext>,
        serenity_ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        let user_id = command.user.id.0;
        match subcommand(command) {
            Some(("set", options)) => {
                let name = get_string_option(options, "name").unwrap_or_default();
                let name = name.trim();
                if name.is_empty() {
                    return respond_ephemeral(serenity_ctx, command, "Names can't be empty.")
                        .await;
                }
                ctx.database.create_user(user_id)?;
                ctx.database.set_preferred_name(user_id, Some(name))?;
                respond_ephemeral(
                    serenity_ctx,
                    command,
                    &format!("Preferred name set to {name}."),
                )
                .await
            }
            Some(("show", _)) => {
                let content = match ctx.database.preferred_name(user_id)? {
                    Some(name) => format!("Your preferred name is {name}."),
                    None => "You haven't set a preferred name.".to_string(),
                };
                respond_ephemeral(serenity_ctx, command, &content).await
            }
            Some(("delete", _)) => {
                ctx.database.set_preferred_name(user_id, None)?;
                respond_ephemeral(serenity_ctx, command, "Preferred name deleted.").await
            }
            _ => Ok(()),
        }
    }

    async fn handle_privacy(
        &self,
        ctx: &Arc<CommandContext>,
        serenity_ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        let user_id = command.user.id.0;
        let field = get_string_option(&command.data.options, "field").unwrap_or_default();
        let setting = get_string_option(&command.data.options, "setting").unwrap_or_default();
        let privacy = match setting.as_str() {
            "public" => Privacy::Public,
            _ => Privacy::Private,
        };

        ctx.database.create_user(user_id)?;
        match field.as_str() {
            "name" => ctx.database.set_privacy_preferred_name(user_id, privacy)?,
            "pronouns" => ctx.database.set_privacy_pronouns(user_id, privacy)?,
            "birthday" => ctx.database.set_privacy_birthday(user_id, privacy)?,
            "age" => ctx.database.set_privacy_age(user_id, privacy)?,
            "timezone" => ctx.database.set_privacy_timezone(user_id, privacy)?,
            other => {
                return respond_ephemeral(
                    serenity_ctx,
                    command,
                    &format!("Unknown field `{other}`."),
                )
                .await;
            }
        }

        // Birthday and timezone privacy feed the scheduler's decisions
        if matches!(field.as_str(), "birthday" | "timezone") {
            self.notify_scheduler(ctx, user_id).await;
        }

        respond_ephemeral(
            serenity_ctx,
            command,
            &format!("Your {field} is now {setting}."),
        )
        .await
    }

    async fn handle_birthday_channel(
        &self,
        ctx: &Arc<CommandContext>,
        serenity_ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        let Some(guild_id) = command.guild_id else {
            return respond_ephemeral(serenity_ctx, command, "This command only works on a server.")
                .await;
        };
        let can_manage = command
            .member
            .as_ref()
            .and_then(|member| member.permissions)
            .map(|permissions| permissions.manage_guild())
            .unwrap_or(false);
        if !can_manage {
            return respond_ephemeral(
                serenity_ctx,
                command,
                "You need the Manage Server permission to change the birthday channel.",
            )
            .await;
        }

        match subcommand(command) {
            Some(("set", options)) => {
                let Some(channel_id) = get_channel_option(options, "channel") else {
                    return respond_ephemeral(serenity_ctx, command, "Missing channel.").await;
                };
                ctx.database
                    .set_guild_birthday_channel(guild_id.0, Some(channel_id))?;
                respond_ephemeral(
                    serenity_ctx,
                    command,
                    &format!("Birthday announcements will go to <#{channel_id}>."),
                )
                .await
            }
            Some(("show", _)) => {
                let content = match ctx.database.guild_birthday_channel(guild_id.0)? {
                    Some(channel_id) => format!("Birthday announcements go to <#{channel_id}>."),
                    None => "No birthday channel is configured on this server.".to_string(),
                };
                respond_ephemeral(serenity_ctx, command, &content).await
            }
            Some(("delete", _)) => {
                ctx.database.set_guild_birthday_channel(guild_id.0, None)?;
                respond_ephemeral(
                    serenity_ctx,
                    command,
                    "Birthday announcements are now disabled on this server.",
                )
                .await
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_date() {
        assert_eq!(
            parse_birthday_input("2000-02-14"),
            Some(Birthday::new(2, 14, Some(2000)))
        );
    }

    #[test]
    fn test_parse_without_year() {
        assert_eq!(parse_birthday_input("02-14"), Some(Birthday::new(2, 14, None)));
        assert_eq!(parse_birthday_input("2-14"), Some(Birthday::new(2, 14, None)));
        // Feb 29 is a real birthday even without a year
        assert_eq!(parse_birthday_input("02-29"), Some(Birthday::new(2, 29, None)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_birthday_input("tomorrow"), None);
        assert_eq!(parse_birthday_input("13-01"), None);
        assert_eq!(parse_birthday_input("02-30"), None);
        assert_eq!(parse_birthday_input("2000-02-30"), None);
        assert_eq!(parse_birthday_input(""), None);
    }

    #[test]
    fn test_format_birthday() {
        assert_eq!(format_birthday(&Birthday::new(2, 14, Some(2000))), "February 14, 2000");
        assert_eq!(format_birthday(&Birthday::new(2, 14, None)), "February 14");
    }
}
