//! Slash command registration
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.2.0

use anyhow::{Context as _, Result};
use log::info;
use serenity::http::Http;
use serenity::model::application::command::{Command, CommandOptionType};

/// Register every command globally. Global registration can take up to an
/// hour to propagate on Discord's side.
pub async fn register_global_commands(http: &Http) -> Result<()> {
    Command::create_global_application_command(http, |command| {
        command
            .name("birthday")
            .description("Manage your birthday")
            .create_option(|option| {
                option
                    .name("set")
                    .description("Set your birthday")
                    .kind(CommandOptionType::SubCommand)
                    .create_sub_option(|sub| {
                        sub.name("date")
                            .description("YYYY-MM-DD, or MM-DD to leave the year out")
                            .kind(CommandOptionType::String)
                            .required(true)
                    })
            })
            .create_option(|option| {
                option
                    .name("show")
                    .description("Show your stored birthday")
                    .kind(CommandOptionType::SubCommand)
            })
            .create_option(|option| {
                option
                    .name("delete")
                    .description("Delete your stored birthday")
                    .kind(CommandOptionType::SubCommand)
            })
    })
    .await
    .context("Failed to register /birthday")?;

    Command::create_global_application_command(http, |command| {
        command
            .name("timezone")
            .description("Manage your timezone")
            .create_option(|option| {
                option
                    .name("set")
                    .description("Set your timezone")
                    .kind(CommandOptionType::SubCommand)
                    .create_sub_option(|sub| {
                        sub.name("zone")
                            .description("An IANA timezone name like Europe/Amsterdam")
                            .kind(CommandOptionType::String)
                            .required(true)
                    })
            })
            .create_option(|option| {
                option
                    .name("show")
                    .description("Show your stored timezone")
                    .kind(CommandOptionType::SubCommand)
            })
            .create_option(|option| {
                option
                    .name("delete")
                    .description("Delete your stored timezone")
                    .kind(CommandOptionType::SubCommand)
            })
    })
    .await
    .context("Failed to register /timezone")?;

    Command::create_global_application_command(http, |command| {
        command
            .name("pronouns")
            .description("Manage your pronouns")
            .create_option(|option| {
                option
                    .name("set")
                    .description("Set your pronouns")
                    .kind(CommandOptionType::SubCommand)
                    .create_sub_option(|sub| {
                        sub.name("pronouns")
                            .description("Like she/her, or several sets separated by spaces")
                            .kind(CommandOptionType::String)
                            .required(true)
                    })
            })
            .create_option(|option| {
                option
                    .name("show")
                    .description("Show your stored pronouns")
                    .kind(CommandOptionType::SubCommand)
            })
            .create_option(|option| {
                option
                    .name("delete")
                    .description("Delete your stored pronouns")
                    .kind(CommandOptionType::SubCommand)
            })
    })
    .await
    .context("Failed to register /pronouns")?;

    Command::create_global_application_command(http, |command| {
        command
            .name("name")
            .description("Manage your preferred name")
            .create_option(|option| {
                option
                    .name("set")
                    .description("Set your preferred name")
                    .kind(CommandOptionType::SubCommand)
                    .create_sub_option(|sub| {
                        sub.name("name")
                            .description("What the bot should call you")
                            .kind(CommandOptionType::String)
                            .required(true)
                    })
            })
            .create_option(|option| {
                option
                    .name("show")
                    .description("Show your stored preferred name")
                    .kind(CommandOptionType::SubCommand)
            })
            .create_option(|option| {
                option
                    .name("delete")
                    .description("Delete your stored preferred name")
                    .kind(CommandOptionType::SubCommand)
            })
    })
    .await
    .context("Failed to register /name")?;

    Command::create_global_application_command(http, |command| {
        command
            .name("privacy")
            .description("Control who can see a profile field")
            .create_option(|option| {
                option
                    .name("field")
                    .description("The profile field")
                    .kind(CommandOptionType::String)
                    .required(true)
                    .add_string_choice("name", "name")
                    .add_string_choice("pronouns", "pronouns")
                    .add_string_choice("birthday", "birthday")
                    .add_string_choice("age", "age")
                    .add_string_choice("timezone", "timezone")
            })
            .create_option(|option| {
                option
                    .name("setting")
                    .description("Public or private")
                    .kind(CommandOptionType::String)
                    .required(true)
                    .add_string_choice("public", "public")
                    .add_string_choice("private", "private")
            })
    })
    .await
    .context("Failed to register /privacy")?;

    Command::create_global_application_command(http, |command| {
        command
            .name("birthday-channel")
            .description("Manage this server's birthday announcement channel")
            .create_option(|option| {
                option
                    .name("set")
                    .description("Announce birthdays in a channel")
                    .kind(CommandOptionType::SubCommand)
                    .create_sub_option(|sub| {
                        sub.name("channel")
                            .description("The announcement channel")
                            .kind(CommandOptionType::Channel)
                            .required(true)
                    })
            })
            .create_option(|option| {
                option
                    .name("show")
                    .description("Show the configured announcement channel")
                    .kind(CommandOptionType::SubCommand)
            })
            .create_option(|option| {
                option
                    .name("delete")
                    .description("Stop announcing birthdays on this server")
                    .kind(CommandOptionType::SubCommand)
            })
    })
    .await
    .context("Failed to register /birthday-channel")?;

    Command::create_global_application_command(http, |command| {
        command
            .name("birthdays")
            .description("Birthdays on this server")
            .create_option(|option| {
                option
                    .name("upcoming")
                    .description("Recent and upcoming birthdays")
                    .kind(CommandOptionType::SubCommand)
            })
    })
    .await
    .context("Failed to register /birthdays")?;

    info!("Registered global slash commands");
    Ok(())
}
