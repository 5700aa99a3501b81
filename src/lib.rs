// Core layer - configuration and time source
pub mod core;

// Features layer - all feature modules
pub mod features;

// Infrastructure
pub mod chat;
pub mod database;

// Application layer
pub mod commands;

// Re-export core config for convenience
pub use crate::core::Config;

// Re-export feature items for convenience
pub use crate::features::{
    // Birthdays
    birthday_scan_loop, BirthdayScheduler, TemplatePools,
    // Pronouns
    PronounSet,
};
