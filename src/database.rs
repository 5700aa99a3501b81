//! # User Data Store
//!
//! Sqlite-backed storage for user profiles (name, pronouns, birthday,
//! timezone, per-field privacy) and per-guild settings. Every profile field
//! defaults to private; the scheduler only ever sees PUBLIC birthdays.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.2.0: Last-notification bookkeeping with monotonic writes
//! - 1.1.0: Guild birthday channel settings
//! - 1.0.0: Initial release with user profile fields and privacy flags

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};
use chrono_tz::Tz;
use log::debug;
use sqlite::{Connection, State};

use crate::features::birthdays::range::{in_birthday_range, MonthDay};

/// Stored year meaning "the user didn't share a year".
const NO_YEAR: i32 = 1;

/// Per-field visibility. Everything defaults to private.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Privacy {
    #[default]
    Private,
    Public,
}

impl Privacy {
    fn from_i64(value: i64) -> Privacy {
        if value == 1 {
            Privacy::Public
        } else {
            Privacy::Private
        }
    }

    fn as_i64(self) -> i64 {
        match self {
            Privacy::Private => 0,
            Privacy::Public => 1,
        }
    }
}

/// A birthday: month and day, with the year optional.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Birthday {
    pub month: u32,
    pub day: u32,
    pub year: Option<i32>,
}

impl Birthday {
    pub fn new(month: u32, day: u32, year: Option<i32>) -> Self {
        Birthday { month, day, year }
    }

    pub fn month_day(&self) -> MonthDay {
        MonthDay::new(self.month, self.day)
    }

    /// The user's age on `date`, when a year was shared.
    pub fn age_on(&self, date: NaiveDate) -> Option<u32> {
        let year = self.year?;
        let mut age = date.year() - year;
        if (date.month(), date.day()) < (self.month, self.day) {
            age -= 1;
        }
        u32::try_from(age).ok()
    }

    fn to_storage(self) -> String {
        format!(
            "{:04}-{:02}-{:02}",
            self.year.unwrap_or(NO_YEAR),
            self.month,
            self.day
        )
    }

    fn from_storage(raw: &str) -> Option<Birthday> {
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
        let year = (date.year() != NO_YEAR).then(|| date.year());
        Some(Birthday::new(date.month(), date.day(), year))
    }
}

fn format_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// Read interface the birthday scheduler consumes. [`Database`] is the
/// production implementation; scheduler tests substitute an in-memory one.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_birthday(&self, user_id: u64) -> Result<Option<Birthday>>;
    async fn get_privacy_birthday(&self, user_id: u64) -> Result<Privacy>;
    async fn get_timezone(&self, user_id: u64) -> Result<Option<Tz>>;
    async fn get_privacy_timezone(&self, user_id: u64) -> Result<Privacy>;
    async fn get_preferred_name(&self, user_id: u64) -> Result<Option<String>>;
    async fn get_privacy_preferred_name(&self, user_id: u64) -> Result<Privacy>;
    async fn get_age(&self, user_id: u64) -> Result<Option<u32>>;
    async fn get_privacy_age(&self, user_id: u64) -> Result<Privacy>;
    async fn get_pronouns(&self, user_id: u64) -> Result<Option<String>>;
    async fn get_privacy_pronouns(&self, user_id: u64) -> Result<Privacy>;

    /// All PUBLIC birthdays falling within `[start, end]` month/day-wise,
    /// excluding users notified after `max_last_notification` when given.
    async fn get_birthdays_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        max_last_notification: Option<DateTime<Utc>>,
    ) -> Result<Vec<(u64, Birthday)>>;

    async fn get_guild_birthday_channel(&self, guild_id: u64) -> Result<Option<u64>>;
    async fn set_last_notification(&self, user_id: u64, at: DateTime<Utc>) -> Result<()>;
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &str) -> Result<Database> {
        let conn = sqlite::open(path)
            .with_context(|| format!("Failed to open database at {path}"))?;
        let database = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        database.init_schema()?;
        Ok(database)
    }

    fn init_schema(&self) -> Result<()> {
        self.lock().execute(
            "CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                preferred_name TEXT,
                pronouns TEXT,
                birthday TEXT,
                timezone TEXT,
                privacy_preferred_name INTEGER NOT NULL DEFAULT 0,
                privacy_pronouns INTEGER NOT NULL DEFAULT 0,
                privacy_birthday INTEGER NOT NULL DEFAULT 0,
                privacy_age INTEGER NOT NULL DEFAULT 0,
                privacy_timezone INTEGER NOT NULL DEFAULT 0,
                last_birthday_notification TEXT
            );
            CREATE TABLE IF NOT EXISTS guilds (
                guild_id INTEGER PRIMARY KEY,
                birthday_channel INTEGER
            );",
        )?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    pub fn create_user(&self, user_id: u64) -> Result<()> {
        let conn = self.lock();
        let mut statement =
            conn.prepare("INSERT OR IGNORE INTO users (user_id) VALUES (?)")?;
        statement.bind((1, user_id as i64))?;
        statement.next()?;
        Ok(())
    }

    // Field names are compile-time constants from the accessors below, never
    // user input.
    fn get_text_field(&self, field: &str, user_id: u64) -> Result<Option<String>> {
        let conn = self.lock();
        let mut statement =
            conn.prepare(format!("SELECT {field} FROM users WHERE user_id = ?"))?;
        statement.bind((1, user_id as i64))?;
        if let State::Row = statement.next()? {
            Ok(statement.read::<Option<String>, _>(0)?)
        } else {
            Ok(None)
        }
    }

    fn set_text_field(&self, field: &str, user_id: u64, value: Option<&str>) -> Result<()> {
        let conn = self.lock();
        let mut statement = conn.prepare(format!(
            "INSERT INTO users (user_id, {field}) VALUES (?, ?)
             ON CONFLICT(user_id) DO UPDATE SET {field} = excluded.{field}"
        ))?;
        statement.bind((1, user_id as i64))?;
        statement.bind((2, value))?;
        statement.next()?;
        Ok(())
    }

    fn get_privacy_field(&self, field: &str, user_id: u64) -> Result<Privacy> {
        let conn = self.lock();
        let mut statement = conn.prepare(format!(
            "SELECT privacy_{field} FROM users WHERE user_id = ?"
        ))?;
        statement.bind((1, user_id as i64))?;
        if let State::Row = statement.next()? {
            Ok(Privacy::from_i64(statement.read::<i64, _>(0)?))
        } else {
            Ok(Privacy::Private)
        }
    }

    fn set_privacy_field(&self, field: &str, user_id: u64, privacy: Privacy) -> Result<()> {
        let conn = self.lock();
        let mut statement = conn.prepare(format!(
            "INSERT INTO users (user_id, privacy_{field}) VALUES (?, ?)
             ON CONFLICT(user_id) DO UPDATE SET privacy_{field} = excluded.privacy_{field}"
        ))?;
        statement.bind((1, user_id as i64))?;
        statement.bind((2, privacy.as_i64()))?;
        statement.next()?;
        Ok(())
    }

    // region Preferred name

    pub fn preferred_name(&self, user_id: u64) -> Result<Option<String>> {
        self.get_text_field("preferred_name", user_id)
    }

    pub fn set_preferred_name(&self, user_id: u64, name: Option<&str>) -> Result<()> {
        self.set_text_field("preferred_name", user_id, name)
    }

    pub fn privacy_preferred_name(&self, user_id: u64) -> Result<Privacy> {
        self.get_privacy_field("preferred_name", user_id)
    }

    pub fn set_privacy_preferred_name(&self, user_id: u64, privacy: Privacy) -> Result<()> {
        self.set_privacy_field("preferred_name", user_id, privacy)
    }

    // endregion
    // region Pronouns

    pub fn pronouns(&self, user_id: u64) -> Result<Option<String>> {
        self.get_text_field("pronouns", user_id)
    }

    pub fn set_pronouns(&self, user_id: u64, pronouns: Option<&str>) -> Result<()> {
        self.set_text_field("pronouns", user_id, pronouns)
    }

    pub fn privacy_pronouns(&self, user_id: u64) -> Result<Privacy> {
        self.get_privacy_field("pronouns", user_id)
    }

    pub fn set_privacy_pronouns(&self, user_id: u64, privacy: Privacy) -> Result<()> {
        self.set_privacy_field("pronouns", user_id, privacy)
    }

    // endregion
    // region Birthday

    pub fn birthday(&self, user_id: u64) -> Result<Option<Birthday>> {
        Ok(self
            .get_text_field("birthday", user_id)?
            .as_deref()
            .and_then(Birthday::from_storage))
    }

    pub fn set_birthday(&self, user_id: u64, birthday: Option<Birthday>) -> Result<()> {
        let raw = birthday.map(Birthday::to_storage);
        self.set_text_field("birthday", user_id, raw.as_deref())
    }

    pub fn privacy_birthday(&self, user_id: u64) -> Result<Privacy> {
        self.get_privacy_field("birthday", user_id)
    }

    pub fn set_privacy_birthday(&self, user_id: u64, privacy: Privacy) -> Result<()> {
        self.set_privacy_field("birthday", user_id, privacy)
    }

    /// All PUBLIC birthdays within `[start, end]` month/day-wise. SQL
    /// pre-filters presence and privacy; the wrap-aware range test runs
    /// here because SQL can't express it.
    pub fn birthdays_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        max_last_notification: Option<DateTime<Utc>>,
    ) -> Result<Vec<(u64, Birthday)>> {
        debug!(
            "Getting all birthdays between {}-{} and {}-{}",
            start.month(),
            start.day(),
            end.month(),
            end.day()
        );
        let mut rows = Vec::new();
        {
            let conn = self.lock();
            let mut statement = conn.prepare(
                "SELECT user_id, birthday, last_birthday_notification FROM users
                 WHERE birthday IS NOT NULL AND privacy_birthday = 1",
            )?;
            while let State::Row = statement.next()? {
                let user_id = statement.read::<i64, _>(0)? as u64;
                let Some(birthday) = statement
                    .read::<Option<String>, _>(1)?
                    .as_deref()
                    .and_then(Birthday::from_storage)
                else {
                    continue;
                };
                if let (Some(bound), Some(last_raw)) =
                    (max_last_notification, statement.read::<Option<String>, _>(2)?)
                {
                    if parse_instant(&last_raw).is_some_and(|last| last > bound) {
                        continue;
                    }
                }
                rows.push((user_id, birthday));
            }
        }

        let range_start = MonthDay::from_date(&start);
        let range_end = MonthDay::from_date(&end);
        Ok(rows
            .into_iter()
            .filter(|(_, birthday)| in_birthday_range(range_start, range_end, birthday.month_day()))
            .collect())
    }

    // endregion
    // region Age

    pub fn age(&self, user_id: u64) -> Result<Option<u32>> {
        Ok(self
            .birthday(user_id)?
            .and_then(|birthday| birthday.age_on(Utc::now().date_naive())))
    }

    pub fn privacy_age(&self, user_id: u64) -> Result<Privacy> {
        self.get_privacy_field("age", user_id)
    }

    pub fn set_privacy_age(&self, user_id: u64, privacy: Privacy) -> Result<()> {
        self.set_privacy_field("age", user_id, privacy)
    }

    // endregion
    // region Timezone

    pub fn timezone(&self, user_id: u64) -> Result<Option<Tz>> {
        Ok(self
            .get_text_field("timezone", user_id)?
            .and_then(|name| name.parse::<Tz>().ok()))
    }

    pub fn set_timezone(&self, user_id: u64, timezone: Option<Tz>) -> Result<()> {
        self.set_text_field("timezone", user_id, timezone.map(|tz| tz.name()))
    }

    pub fn privacy_timezone(&self, user_id: u64) -> Result<Privacy> {
        self.get_privacy_field("timezone", user_id)
    }

    pub fn set_privacy_timezone(&self, user_id: u64, privacy: Privacy) -> Result<()> {
        self.set_privacy_field("timezone", user_id, privacy)
    }

    // endregion
    // region Notification bookkeeping

    pub fn last_notification(&self, user_id: u64) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .get_text_field("last_birthday_notification", user_id)?
            .as_deref()
            .and_then(parse_instant))
    }

    /// Record a notification attempt. Never moves the timestamp backwards,
    /// so racing writers can only advance it.
    pub fn record_notification(&self, user_id: u64, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock();
        let mut statement = conn.prepare(
            "INSERT INTO users (user_id, last_birthday_notification) VALUES (?, ?)
             ON CONFLICT(user_id) DO UPDATE
                SET last_birthday_notification = excluded.last_birthday_notification
                WHERE last_birthday_notification IS NULL
                   OR last_birthday_notification <= excluded.last_birthday_notification",
        )?;
        statement.bind((1, user_id as i64))?;
        statement.bind((2, format_instant(at).as_str()))?;
        statement.next()?;
        Ok(())
    }

    // endregion
    // region Guild settings

    pub fn guild_birthday_channel(&self, guild_id: u64) -> Result<Option<u64>> {
        let conn = self.lock();
        let mut statement =
            conn.prepare("SELECT birthday_channel FROM guilds WHERE guild_id = ?")?;
        statement.bind((1, guild_id as i64))?;
        if let State::Row = statement.next()? {
            Ok(statement
                .read::<Option<i64>, _>(0)?
                .map(|channel| channel as u64))
        } else {
            Ok(None)
        }
    }

    pub fn set_guild_birthday_channel(&self, guild_id: u64, channel: Option<u64>) -> Result<()> {
        let conn = self.lock();
        let mut statement = conn.prepare(
            "INSERT INTO guilds (guild_id, birthday_channel) VALUES (?, ?)
             ON CONFLICT(guild_id) DO UPDATE SET birthday_channel = excluded.birthday_channel",
        )?;
        statement.bind((1, guild_id as i64))?;
        statement.bind((2, channel.map(|c| c as i64)))?;
        statement.next()?;
        Ok(())
    }

    // endregion
}

#[async_trait]
impl UserStore for Database {
    async fn get_birthday(&self, user_id: u64) -> Result<Option<Birthday>> {
        self.birthday(user_id)
    }

    async fn get_privacy_birthday(&self, user_id: u64) -> Result<Privacy> {
        self.privacy_birthday(user_id)
    }

    async fn get_timezone(&self, user_id: u64) -> Result<Option<Tz>> {
        self.timezone(user_id)
    }

    async fn get_privacy_timezone(&self, user_id: u64) -> Result<Privacy> {
        self.privacy_timezone(user_id)
    }

    async fn get_preferred_name(&self, user_id: u64) -> Result<Option<String>> {
        self.preferred_name(user_id)
    }

    async fn get_privacy_preferred_name(&self, user_id: u64) -> Result<Privacy> {
        self.privacy_preferred_name(user_id)
    }

    async fn get_age(&self, user_id: u64) -> Result<Option<u32>> {
        self.age(user_id)
    }

    async fn get_privacy_age(&self, user_id: u64) -> Result<Privacy> {
        self.privacy_age(user_id)
    }

    async fn get_pronouns(&self, user_id: u64) -> Result<Option<String>> {
        self.pronouns(user_id)
    }

    async fn get_privacy_pronouns(&self, user_id: u64) -> Result<Privacy> {
        self.privacy_pronouns(user_id)
    }

    async fn get_birthdays_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        max_last_notification: Option<DateTime<Utc>>,
    ) -> Result<Vec<(u64, Birthday)>> {
        self.birthdays_in_range(start, end, max_last_notification)
    }

    async fn get_guild_birthday_channel(&self, guild_id: u64) -> Result<Option<u64>> {
        self.guild_birthday_channel(guild_id)
    }

    async fn set_last_notification(&self, user_id: u64, at: DateTime<Utc>) -> Result<()> {
        self.record_notification(user_id, at)
    }
}
