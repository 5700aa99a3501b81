//! Slash command handler trait and dispatch
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.2.0

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::prelude::Context;

use crate::commands::bios::BiosHandler;
use crate::commands::birthdays::BirthdaysHandler;
use crate::commands::context::CommandContext;

/// A handler owning one or more top-level slash commands
#[async_trait]
pub trait SlashCommandHandler: Send + Sync {
    fn command_names(&self) -> &'static [&'static str];

    async fn handle(
        &self,
        ctx: &Arc<CommandContext>,
        serenity_ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()>;
}

fn handlers() -> Vec<Box<dyn SlashCommandHandler>> {
    vec![Box::new(BiosHandler), Box::new(BirthdaysHandler)]
}

/// Route an application command to the handler that owns it.
pub async fn dispatch(
    ctx: &Arc<CommandContext>,
    serenity_ctx: &Context,
    command: &ApplicationCommandInteraction,
) -> Result<()> {
    let name = command.data.name.as_str();
    for handler in handlers() {
        if handler.command_names().contains(&name) {
            return handler.handle(ctx, serenity_ctx, command).await;
        }
    }
    debug!("No handler for command /{name}");
    Ok(())
}
