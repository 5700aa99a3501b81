//! Shared context for command handlers
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.2.0

use std::sync::Arc;

use crate::core::Config;
use crate::database::Database;
use crate::features::birthdays::BirthdayScheduler;

/// Shared context for all command handlers
///
/// Contains the core services command handlers need:
/// - Database for user profiles and guild settings
/// - BirthdayScheduler so profile edits can re-arm or cancel notifications
/// - Config for the birthday listing windows
pub struct CommandContext {
    pub database: Database,
    pub scheduler: Arc<BirthdayScheduler>,
    pub config: Arc<Config>,
}

impl CommandContext {
    pub fn new(database: Database, scheduler: Arc<BirthdayScheduler>, config: Arc<Config>) -> Self {
        CommandContext {
            database,
            scheduler,
            config,
        }
    }
}
