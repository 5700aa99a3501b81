//! Bot configuration loaded from a YAML file with defaults for every field.
//!
//! Message templates are validated here, at load time. A template that
//! references an unknown placeholder aborts startup instead of producing a
//! broken message months later when somebody's birthday comes around.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::features::birthdays::message;

fn default_database_path() -> String {
    "data/jubilee.db".to_string()
}

fn default_scan_period_hours() -> u64 {
    24
}

fn default_past_birthdays_day_range() -> u32 {
    7
}

fn default_upcoming_birthdays_day_range() -> u32 {
    14
}

fn default_templates_no_age() -> Vec<String> {
    [
        "Hey!! It's {name}'s birthday! Happy birthday {ping}!",
        "{name}! It's your birthday!! Hope it's a great one {ping}!",
        "attention everyone... it's {name}'s birthday!! happy birthday {ping}! :D",
        "I am pleased to announce... IT'S {NAME}'S BIRTHDAY!! Happy birthday {ping}!!",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_templates_with_age() -> Vec<String> {
    [
        "Hey!! It's {name}'s birthday! {They} turned {age} today. Happy birthday {ping}!",
        "{name}! It's your {age_suffixed} birthday!! Hope it's a great one {ping}!",
        "attention everyone... it's {name}'s birthday!! {theyre} {age} now! happy birthday {ping}! :D",
        "I am pleased to announce... IT'S {NAME}'S BIRTHDAY!! {They} just turned {age}! Happy birthday {ping}!!",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: String,
    pub birthdays: BirthdaysConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: default_database_path(),
            birthdays: BirthdaysConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BirthdaysConfig {
    /// How often the scheduler re-scans for upcoming birthdays.
    pub scan_period_hours: u64,
    /// How many days backward `/birthdays upcoming` searches.
    pub past_birthdays_day_range: u32,
    /// How many days forward `/birthdays upcoming` searches.
    pub upcoming_birthdays_day_range: u32,
    pub message_templates_no_age: Vec<String>,
    pub message_templates_with_age: Vec<String>,
}

impl Default for BirthdaysConfig {
    fn default() -> Self {
        BirthdaysConfig {
            scan_period_hours: default_scan_period_hours(),
            past_birthdays_day_range: default_past_birthdays_day_range(),
            upcoming_birthdays_day_range: default_upcoming_birthdays_day_range(),
            message_templates_no_age: default_templates_no_age(),
            message_templates_with_age: default_templates_with_age(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, falling back to defaults when the file
    /// does not exist. Fails on malformed YAML or invalid templates.
    pub fn load(path: &Path) -> Result<Config> {
        let config: Config = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_yaml::from_str(&raw)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let birthdays = &self.birthdays;
        if birthdays.scan_period_hours == 0 {
            bail!("birthdays.scan_period_hours must be at least 1");
        }
        if birthdays.message_templates_no_age.is_empty() {
            bail!("birthdays.message_templates_no_age must not be empty");
        }
        if birthdays.message_templates_with_age.is_empty() {
            bail!("birthdays.message_templates_with_age must not be empty");
        }
        for template in &birthdays.message_templates_no_age {
            message::validate_template(template, false)
                .with_context(|| format!("Invalid no-age message template {template:?}"))?;
        }
        for template in &birthdays.message_templates_with_age {
            message::validate_template(template, true)
                .with_context(|| format!("Invalid with-age message template {template:?}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.birthdays.scan_period_hours, 24);
        assert_eq!(config.birthdays.past_birthdays_day_range, 7);
        assert_eq!(config.birthdays.upcoming_birthdays_day_range, 14);
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let mut config = Config::default();
        config
            .birthdays
            .message_templates_no_age
            .push("happy birthday {nmae}!".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_age_placeholder_rejected_in_no_age_pool() {
        let mut config = Config::default();
        config
            .birthdays
            .message_templates_no_age
            .push("{name} is {age} now!".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_template_pool_rejected() {
        let mut config = Config::default();
        config.birthdays.message_templates_with_age.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = Config::default();
        let raw = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&raw).unwrap();
        assert_eq!(
            parsed.birthdays.message_templates_with_age,
            config.birthdays.message_templates_with_age
        );
    }
}
