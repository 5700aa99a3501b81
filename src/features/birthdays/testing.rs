//! In-memory doubles for the scheduler's collaborators.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::chat::ChatClient;
use crate::core::ManualClock;
use crate::database::{Birthday, Privacy, UserStore};
use crate::features::birthdays::range::{in_birthday_range, MonthDay};
use crate::features::birthdays::scheduler::{BirthdayScheduler, TemplatePools};

pub(crate) fn utc(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, min, sec).unwrap()
}

#[derive(Clone, Default)]
struct MockUser {
    birthday: Option<Birthday>,
    timezone: Option<Tz>,
    preferred_name: Option<String>,
    pronouns: Option<String>,
    age: Option<u32>,
    privacy_birthday: Privacy,
    privacy_timezone: Privacy,
    privacy_preferred_name: Privacy,
    privacy_pronouns: Privacy,
    privacy_age: Privacy,
    last_notification: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub(crate) struct MockStore {
    users: Mutex<BTreeMap<u64, MockUser>>,
    guild_channels: Mutex<BTreeMap<u64, u64>>,
    failing_users: Mutex<HashSet<u64>>,
    unavailable: AtomicBool,
}

impl MockStore {
    fn with_user<R>(&self, user_id: u64, f: impl FnOnce(&mut MockUser) -> R) -> R {
        let mut users = self.users.lock().unwrap();
        f(users.entry(user_id).or_default())
    }

    fn read_user<R>(&self, user_id: u64, f: impl FnOnce(Option<&MockUser>) -> R) -> Result<R> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("user data store unavailable");
        }
        if self.failing_users.lock().unwrap().contains(&user_id) {
            bail!("lookup failed for user {user_id}");
        }
        let users = self.users.lock().unwrap();
        Ok(f(users.get(&user_id)))
    }

    pub(crate) fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub(crate) fn fail_user(&self, user_id: u64) {
        self.failing_users.lock().unwrap().insert(user_id);
    }

    pub(crate) fn set_birthday(&self, user_id: u64, birthday: Option<Birthday>) {
        self.with_user(user_id, |user| user.birthday = birthday);
    }

    pub(crate) fn set_privacy_birthday(&self, user_id: u64, privacy: Privacy) {
        self.with_user(user_id, |user| user.privacy_birthday = privacy);
    }

    pub(crate) fn set_timezone(&self, user_id: u64, timezone: Option<Tz>) {
        self.with_user(user_id, |user| user.timezone = timezone);
    }

    pub(crate) fn set_privacy_timezone(&self, user_id: u64, privacy: Privacy) {
        self.with_user(user_id, |user| user.privacy_timezone = privacy);
    }

    pub(crate) fn set_preferred_name(&self, user_id: u64, name: &str) {
        self.with_user(user_id, |user| user.preferred_name = Some(name.to_string()));
    }

    pub(crate) fn set_privacy_preferred_name(&self, user_id: u64, privacy: Privacy) {
        self.with_user(user_id, |user| user.privacy_preferred_name = privacy);
    }

    pub(crate) fn set_pronouns(&self, user_id: u64, pronouns: &str) {
        self.with_user(user_id, |user| user.pronouns = Some(pronouns.to_string()));
    }

    pub(crate) fn set_privacy_pronouns(&self, user_id: u64, privacy: Privacy) {
        self.with_user(user_id, |user| user.privacy_pronouns = privacy);
    }

    pub(crate) fn set_age(&self, user_id: u64, age: u32) {
        self.with_user(user_id, |user| user.age = Some(age));
    }

    pub(crate) fn set_privacy_age(&self, user_id: u64, privacy: Privacy) {
        self.with_user(user_id, |user| user.privacy_age = privacy);
    }

    pub(crate) fn record_notification(&self, user_id: u64, at: DateTime<Utc>) {
        self.with_user(user_id, |user| user.last_notification = Some(at));
    }

    pub(crate) fn last_notification(&self, user_id: u64) -> Option<DateTime<Utc>> {
        self.users
            .lock()
            .unwrap()
            .get(&user_id)
            .and_then(|user| user.last_notification)
    }

    pub(crate) fn set_guild_channel(&self, guild_id: u64, channel_id: u64) {
        self.guild_channels.lock().unwrap().insert(guild_id, channel_id);
    }
}

#[async_trait]
impl UserStore for MockStore {
    async fn get_birthday(&self, user_id: u64) -> Result<Option<Birthday>> {
        self.read_user(user_id, |user| user.and_then(|u| u.birthday))
    }

    async fn get_privacy_birthday(&self, user_id: u64) -> Result<Privacy> {
        self.read_user(user_id, |user| {
            user.map(|u| u.privacy_birthday).unwrap_or_default()
        })
    }

    async fn get_timezone(&self, user_id: u64) -> Result<Option<Tz>> {
        self.read_user(user_id, |user| user.and_then(|u| u.timezone))
    }

    async fn get_privacy_timezone(&self, user_id: u64) -> Result<Privacy> {
        self.read_user(user_id, |user| {
            user.map(|u| u.privacy_timezone).unwrap_or_default()
        })
    }

    async fn get_preferred_name(&self, user_id: u64) -> Result<Option<String>> {
        self.read_user(user_id, |user| user.and_then(|u| u.preferred_name.clone()))
    }

    async fn get_privacy_preferred_name(&self, user_id: u64) -> Result<Privacy> {
        self.read_user(user_id, |user| {
            user.map(|u| u.privacy_preferred_name).unwrap_or_default()
        })
    }

    async fn get_age(&self, user_id: u64) -> Result<Option<u32>> {
        self.read_user(user_id, |user| user.and_then(|u| u.age))
    }

    async fn get_privacy_age(&self, user_id: u64) -> Result<Privacy> {
        self.read_user(user_id, |user| {
            user.map(|u| u.privacy_age).unwrap_or_default()
        })
    }

    async fn get_pronouns(&self, user_id: u64) -> Result<Option<String>> {
        self.read_user(user_id, |user| user.and_then(|u| u.pronouns.clone()))
    }

    async fn get_privacy_pronouns(&self, user_id: u64) -> Result<Privacy> {
        self.read_user(user_id, |user| {
            user.map(|u| u.privacy_pronouns).unwrap_or_default()
        })
    }

    async fn get_birthdays_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        max_last_notification: Option<DateTime<Utc>>,
    ) -> Result<Vec<(u64, Birthday)>> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("user data store unavailable");
        }
        let range_start = MonthDay::from_date(&start);
        let range_end = MonthDay::from_date(&end);
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .filter(|(_, user)| user.privacy_birthday == Privacy::Public)
            .filter_map(|(user_id, user)| user.birthday.map(|b| (*user_id, b, user)))
            .filter(|(_, birthday, _)| in_birthday_range(range_start, range_end, birthday.month_day()))
            .filter(|(_, _, user)| match (max_last_notification, user.last_notification) {
                (Some(bound), Some(last)) => last <= bound,
                _ => true,
            })
            .map(|(user_id, birthday, _)| (user_id, birthday))
            .collect())
    }

    async fn get_guild_birthday_channel(&self, guild_id: u64) -> Result<Option<u64>> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("user data store unavailable");
        }
        Ok(self.guild_channels.lock().unwrap().get(&guild_id).copied())
    }

    async fn set_last_notification(&self, user_id: u64, at: DateTime<Utc>) -> Result<()> {
        self.record_notification(user_id, at);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MockChat {
    // guild -> member -> display name
    guilds: Mutex<BTreeMap<u64, BTreeMap<u64, String>>>,
    sent: Mutex<Vec<(u64, String)>>,
    failing_channels: Mutex<HashSet<u64>>,
}

impl MockChat {
    pub(crate) fn add_guild(&self, guild_id: u64) {
        self.guilds.lock().unwrap().entry(guild_id).or_default();
    }

    pub(crate) fn add_member(&self, guild_id: u64, user_id: u64, display_name: &str) {
        self.guilds
            .lock()
            .unwrap()
            .entry(guild_id)
            .or_default()
            .insert(user_id, display_name.to_string());
    }

    pub(crate) fn fail_channel(&self, channel_id: u64) {
        self.failing_channels.lock().unwrap().insert(channel_id);
    }

    pub(crate) fn sent(&self) -> Vec<(u64, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for MockChat {
    async fn mutual_guilds(&self, user_id: u64) -> Result<Vec<u64>> {
        Ok(self
            .guilds
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, members)| members.contains_key(&user_id))
            .map(|(guild_id, _)| *guild_id)
            .collect())
    }

    async fn member_display_name(&self, guild_id: u64, user_id: u64) -> Option<String> {
        self.guilds
            .lock()
            .unwrap()
            .get(&guild_id)
            .and_then(|members| members.get(&user_id).cloned())
    }

    async fn send(&self, channel_id: u64, content: &str) -> Result<()> {
        if self.failing_channels.lock().unwrap().contains(&channel_id) {
            bail!("channel {channel_id} unreachable");
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel_id, content.to_string()));
        Ok(())
    }
}

/// A scheduler wired to mock collaborators and a manual clock.
pub(crate) struct TestHarness {
    pub(crate) store: Arc<MockStore>,
    pub(crate) chat: Arc<MockChat>,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) scheduler: Arc<BirthdayScheduler>,
}

impl TestHarness {
    pub(crate) fn new(now: DateTime<Utc>) -> Self {
        let store = Arc::new(MockStore::default());
        let chat = Arc::new(MockChat::default());
        let clock = Arc::new(ManualClock::new(now));
        let templates = TemplatePools {
            no_age: vec!["no-age name={name} they={they} ping={ping}".to_string()],
            with_age: vec!["with-age name={name} age={age} ping={ping}".to_string()],
        };
        let scheduler =
            BirthdayScheduler::new(store.clone(), chat.clone(), clock.clone(), templates);
        TestHarness {
            store,
            chat,
            clock,
            scheduler,
        }
    }

    /// Add a user with a PUBLIC birthday (and PUBLIC timezone when given).
    pub(crate) fn add_user(&self, user_id: u64, birthday: Birthday, timezone: Option<Tz>) {
        self.store.set_birthday(user_id, Some(birthday));
        self.store.set_privacy_birthday(user_id, Privacy::Public);
        self.store.set_timezone(user_id, timezone);
        self.store.set_privacy_timezone(user_id, Privacy::Public);
    }

    pub(crate) fn add_guild_member(&self, guild_id: u64, user_id: u64, display_name: &str) {
        self.chat.add_member(guild_id, user_id, display_name);
    }

    pub(crate) fn set_birthday_channel(&self, guild_id: u64, channel_id: u64) {
        self.store.set_guild_channel(guild_id, channel_id);
    }

    pub(crate) fn set_privacy_birthday(&self, user_id: u64, privacy: Privacy) {
        self.store.set_privacy_birthday(user_id, privacy);
    }

    pub(crate) fn set_privacy_timezone(&self, user_id: u64, privacy: Privacy) {
        self.store.set_privacy_timezone(user_id, privacy);
    }

    pub(crate) fn set_timezone(&self, user_id: u64, timezone: Option<Tz>) {
        self.store.set_timezone(user_id, timezone);
    }

    pub(crate) fn remove_birthday(&self, user_id: u64) {
        self.store.set_birthday(user_id, None);
    }

    pub(crate) fn fail_user(&self, user_id: u64) {
        self.store.fail_user(user_id);
    }

    /// Wait for every in-flight delivery task to finish.
    pub(crate) async fn settle(&self) {
        for _ in 0..200 {
            if self.scheduler.scheduled_count() == 0 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("delivery tasks did not settle");
    }
}
