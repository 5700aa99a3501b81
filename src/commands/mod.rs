//! # Command System
//!
//! Slash command (/) handling for Discord interactions.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.2.0
//!
//! ## Changelog
//! - 1.1.0: Profile edits notify the birthday scheduler
//! - 1.0.0: Initial implementation with handler trait dispatch

pub mod bios;
pub mod birthdays;
pub mod context;
pub mod handler;
pub mod registry;

pub use context::CommandContext;
pub use handler::{dispatch, SlashCommandHandler};
pub use registry::register_global_commands;

use anyhow::Result;
use serenity::model::application::interaction::application_command::{
    ApplicationCommandInteraction, CommandDataOption,
};
use serenity::model::application::interaction::InteractionResponseType;
use serenity::prelude::Context;

/// Utility function to get a string option from a slash command
pub fn get_string_option(options: &[CommandDataOption], name: &str) -> Option<String> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_ref())
        .and_then(|val| val.as_str())
        .map(|s| s.to_string())
}

/// Utility function to get a channel option from a slash command
pub fn get_channel_option(options: &[CommandDataOption], name: &str) -> Option<u64> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_ref())
        .and_then(|val| val.as_str())
        .and_then(|s| s.parse().ok())
}

/// The subcommand a user invoked, with its nested options.
pub fn subcommand(command: &ApplicationCommandInteraction) -> Option<(&str, &[CommandDataOption])> {
    command
        .data
        .options
        .first()
        .map(|opt| (opt.name.as_str(), opt.options.as_slice()))
}

/// Reply with a message only the invoking user can see.
pub async fn respond_ephemeral(
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
    content: &str,
) -> Result<()> {
    command
        .create_interaction_response(&serenity_ctx.http, |response| {
            response
                .kind(InteractionResponseType::ChannelMessageWithSource)
                .interaction_response_data(|msg| msg.content(content).ephemeral(true))
        })
        .await?;
    Ok(())
}

/// Reply with a message everyone in the channel can see.
pub async fn respond_public(
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
    content: &str,
) -> Result<()> {
    command
        .create_interaction_response(&serenity_ctx.http, |response| {
            response
                .kind(InteractionResponseType::ChannelMessageWithSource)
                .interaction_response_data(|msg| msg.content(content))
        })
        .await?;
    Ok(())
}
