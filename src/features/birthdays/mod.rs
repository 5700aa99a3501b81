//! # Feature: Birthday Notifications
//!
//! Wishes users a happy birthday at midnight in their own timezone, exactly
//! once per birthday (best effort across restarts). A periodic scan finds
//! birthdays due within the next 24 hours and arms one cancellable delivery
//! task per user; profile edits re-arm or cancel in-flight tasks
//! immediately through the scheduler's change notification entry point.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.3.0
//! - **Toggleable**: true
//!
//! ## Changelog
//! - 1.2.0: Injected clock, generation-tagged task map entries
//! - 1.1.0: Privacy-aware per-guild name fallback in delivery
//! - 1.0.0: Initial release with daily scan and per-user delivery tasks

pub mod delivery;
pub mod message;
pub mod range;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use range::{in_birthday_range, MonthDay};
pub use scheduler::{birthday_scan_loop, BirthdayScheduler, TemplatePools};
