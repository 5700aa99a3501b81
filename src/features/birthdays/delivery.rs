//! The per-user delivery task.
//!
//! Sleeps until the user's local midnight, then re-reads the live profile
//! (privacy may have changed during the sleep) and posts one birthday
//! message to every guild the user shares with the bot that has a birthday
//! channel configured. Cancellation lands in the sleep, before anything
//! externally visible happens.

use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::Result;
use log::{debug, info, warn};
use rand::seq::IndexedRandom;
use uuid::Uuid;

use crate::chat::{mention, ChatClient};
use crate::core::Clock;
use crate::database::{Privacy, UserStore};
use crate::features::birthdays::message;
use crate::features::birthdays::scheduler::{BirthdayScheduler, TemplatePools};
use crate::features::pronouns::{self, PronounSet};

pub(crate) struct DeliveryTask {
    /// Weak so an abandoned scheduler tears down instead of being kept
    /// alive by its own tasks.
    pub(crate) scheduler: Weak<BirthdayScheduler>,
    pub(crate) store: Arc<dyn UserStore>,
    pub(crate) chat: Arc<dyn ChatClient>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) templates: Arc<TemplatePools>,
    pub(crate) user_id: u64,
    pub(crate) generation: Uuid,
}

impl DeliveryTask {
    pub(crate) async fn run(self, delay: Duration) {
        debug!(
            "Waiting {} seconds to send birthday message for user {}",
            delay.as_secs(),
            self.user_id
        );
        tokio::time::sleep(delay).await;

        if let Err(e) = self.send_messages().await {
            warn!("Birthday delivery for user {} failed: {e:#}", self.user_id);
        }

        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.finish(self.user_id, self.generation);
        }
    }

    async fn send_messages(&self) -> Result<()> {
        let user_id = self.user_id;
        info!("Sending birthday notifications for user {user_id}");

        // Fresh reads at fire time, not the snapshot from scheduling time
        let age = if self.store.get_privacy_age(user_id).await? == Privacy::Public {
            self.store.get_age(user_id).await?
        } else {
            None
        };
        let pronoun_set = self.read_pronouns().await?;
        let preferred_name =
            if self.store.get_privacy_preferred_name(user_id).await? == Privacy::Public {
                self.store.get_preferred_name(user_id).await?
            } else {
                None
            };

        // One template per firing, so every guild gets the same wording
        let template = self.pick_template(age.is_some()).to_string();

        let guilds = self.chat.mutual_guilds(user_id).await?;
        if guilds.is_empty() {
            info!("User {user_id} shares no guilds with the bot; nothing to send");
        }

        let mut attempted = false;
        for guild_id in guilds {
            match self
                .send_to_guild(guild_id, &template, preferred_name.as_deref(), &pronoun_set, age)
                .await
            {
                Ok(sent) => attempted |= sent,
                Err(e) => {
                    attempted = true;
                    debug!(
                        "Skipping birthday message for user {user_id} in guild {guild_id}: {e:#}"
                    );
                }
            }
        }

        if attempted {
            self.store
                .set_last_notification(user_id, self.clock.now())
                .await?;
        }
        Ok(())
    }

    /// Returns whether a send was attempted in this guild. A guild without
    /// a birthday channel, or that the user has left since scheduling, is
    /// skipped silently.
    async fn send_to_guild(
        &self,
        guild_id: u64,
        template: &str,
        preferred_name: Option<&str>,
        pronoun_set: &PronounSet,
        age: Option<u32>,
    ) -> Result<bool> {
        let Some(channel_id) = self.store.get_guild_birthday_channel(guild_id).await? else {
            return Ok(false);
        };
        let Some(display_name) = self.chat.member_display_name(guild_id, self.user_id).await
        else {
            debug!(
                "User {} is no longer a member of guild {guild_id}",
                self.user_id
            );
            return Ok(false);
        };

        // A private preferred name falls back to what this guild already
        // calls the user
        let name = preferred_name.unwrap_or(&display_name);
        let content = message::render(template, &mention(self.user_id), name, pronoun_set, age);
        self.chat.send(channel_id, &content).await?;
        Ok(true)
    }

    async fn read_pronouns(&self) -> Result<PronounSet> {
        if self.store.get_privacy_pronouns(self.user_id).await? == Privacy::Public {
            if let Some(raw) = self.store.get_pronouns(self.user_id).await? {
                if let Some(first) = pronouns::parse(&raw).into_iter().next() {
                    return Ok(first);
                }
            }
        }
        Ok(PronounSet::default())
    }

    fn pick_template(&self, with_age: bool) -> &str {
        let pool = if with_age && !self.templates.with_age.is_empty() {
            &self.templates.with_age
        } else {
            &self.templates.no_age
        };
        let mut rng = rand::rng();
        pool.choose(&mut rng)
            .map(String::as_str)
            .unwrap_or("Happy birthday {ping}!")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Birthday;
    use crate::features::birthdays::testing::{utc, TestHarness};
    use chrono::Duration as ChronoDuration;

    /// A harness whose clock sits just shy of the user's midnight, so armed
    /// tasks fire ~100ms of real time later.
    fn near_midnight_harness() -> TestHarness {
        let harness = TestHarness::new(utc(2020, 2, 13, 23, 59, 59));
        harness.clock.advance(ChronoDuration::milliseconds(900));
        harness
    }

    /// Arm a Feb 14 task and wait for it to complete.
    async fn fire_and_settle(harness: &TestHarness, user_id: u64) {
        let scheduled = harness
            .scheduler
            .schedule_birthday(user_id, Birthday::new(2, 14, None), harness.clock.now())
            .await
            .unwrap();
        assert!(scheduled);
        harness.settle().await;
    }

    #[tokio::test]
    async fn test_delivers_to_configured_channels() {
        let harness = near_midnight_harness();
        harness.add_user(1, Birthday::new(2, 14, None), None);
        harness.add_guild_member(100, 1, "greggy");
        harness.add_guild_member(200, 1, "gregster");
        harness.set_birthday_channel(100, 1000);
        // Guild 200 has no birthday channel

        fire_and_settle(&harness, 1).await;

        let sent = harness.chat.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 1000);
        assert!(sent[0].1.contains("<@1>"));
    }

    #[tokio::test]
    async fn test_task_removes_itself_after_delivery() {
        let harness = near_midnight_harness();
        harness.add_user(1, Birthday::new(2, 14, None), None);
        harness.add_guild_member(100, 1, "greggy");
        harness.set_birthday_channel(100, 1000);

        fire_and_settle(&harness, 1).await;
        assert_eq!(harness.scheduler.scheduled_count(), 0);
    }

    #[tokio::test]
    async fn test_records_last_notification() {
        let harness = near_midnight_harness();
        harness.add_user(1, Birthday::new(2, 14, None), None);
        harness.add_guild_member(100, 1, "greggy");
        harness.set_birthday_channel(100, 1000);

        fire_and_settle(&harness, 1).await;
        assert_eq!(
            harness.store.last_notification(1),
            Some(harness.clock.now())
        );
    }

    #[tokio::test]
    async fn test_no_notification_recorded_without_destinations() {
        let harness = near_midnight_harness();
        harness.add_user(1, Birthday::new(2, 14, None), None);

        fire_and_settle(&harness, 1).await;
        assert!(harness.chat.sent().is_empty());
        assert_eq!(harness.store.last_notification(1), None);
        assert_eq!(harness.scheduler.scheduled_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_suppresses_send() {
        let harness = TestHarness::new(utc(2020, 2, 13, 0, 0, 0));
        harness.add_user(1, Birthday::new(2, 14, None), None);
        harness.add_guild_member(100, 1, "greggy");
        harness.set_birthday_channel(100, 1000);

        // Fires a full day out; cancel long before that
        let scheduled = harness
            .scheduler
            .schedule_birthday(1, Birthday::new(2, 14, None), harness.clock.now())
            .await
            .unwrap();
        assert!(scheduled);

        harness.scheduler.cancel(1);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(harness.chat.sent().is_empty());
        assert_eq!(harness.store.last_notification(1), None);
        assert_eq!(harness.scheduler.scheduled_count(), 0);
    }

    #[tokio::test]
    async fn test_private_name_uses_guild_display_name() {
        let harness = near_midnight_harness();
        harness.add_user(1, Birthday::new(2, 14, None), None);
        harness.store.set_preferred_name(1, "Gregory");
        harness.store.set_privacy_preferred_name(1, Privacy::Private);
        harness.add_guild_member(100, 1, "greggy");
        harness.set_birthday_channel(100, 1000);

        fire_and_settle(&harness, 1).await;

        let sent = harness.chat.sent();
        assert!(sent[0].1.contains("greggy"));
        assert!(!sent[0].1.contains("Gregory"));
    }

    #[tokio::test]
    async fn test_public_name_used_in_every_guild() {
        let harness = near_midnight_harness();
        harness.add_user(1, Birthday::new(2, 14, None), None);
        harness.store.set_preferred_name(1, "Gregory");
        harness.store.set_privacy_preferred_name(1, Privacy::Public);
        harness.add_guild_member(100, 1, "greggy");
        harness.add_guild_member(200, 1, "gregster");
        harness.set_birthday_channel(100, 1000);
        harness.set_birthday_channel(200, 2000);

        fire_and_settle(&harness, 1).await;

        let sent = harness.chat.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(_, content)| content.contains("Gregory")));
    }

    #[tokio::test]
    async fn test_pronouns_conjugate_message() {
        let harness = near_midnight_harness();
        harness.add_user(1, Birthday::new(2, 14, None), None);
        harness.store.set_pronouns(1, "she/her");
        harness.store.set_privacy_pronouns(1, Privacy::Public);
        harness.add_guild_member(100, 1, "greggy");
        harness.set_birthday_channel(100, 1000);

        fire_and_settle(&harness, 1).await;

        let sent = harness.chat.sent();
        assert!(sent[0].1.contains("they=she"));
    }

    #[tokio::test]
    async fn test_private_pronouns_fall_back_to_they() {
        let harness = near_midnight_harness();
        harness.add_user(1, Birthday::new(2, 14, None), None);
        harness.store.set_pronouns(1, "she/her");
        harness.store.set_privacy_pronouns(1, Privacy::Private);
        harness.add_guild_member(100, 1, "greggy");
        harness.set_birthday_channel(100, 1000);

        fire_and_settle(&harness, 1).await;

        let sent = harness.chat.sent();
        assert!(sent[0].1.contains("they=they"));
    }

    #[tokio::test]
    async fn test_age_pool_requires_public_age() {
        let harness = near_midnight_harness();
        harness.add_user(1, Birthday::new(2, 14, None), None);
        harness.store.set_age(1, 20);
        harness.store.set_privacy_age(1, Privacy::Private);
        harness.add_guild_member(100, 1, "greggy");
        harness.set_birthday_channel(100, 1000);

        fire_and_settle(&harness, 1).await;

        let sent = harness.chat.sent();
        assert!(sent[0].1.contains("no-age"));
    }

    #[tokio::test]
    async fn test_age_pool_used_when_age_public() {
        let harness = near_midnight_harness();
        harness.add_user(1, Birthday::new(2, 14, None), None);
        harness.store.set_age(1, 20);
        harness.store.set_privacy_age(1, Privacy::Public);
        harness.add_guild_member(100, 1, "greggy");
        harness.set_birthday_channel(100, 1000);

        fire_and_settle(&harness, 1).await;

        let sent = harness.chat.sent();
        assert!(sent[0].1.contains("with-age"));
        assert!(sent[0].1.contains("age=20"));
    }

    #[tokio::test]
    async fn test_departed_member_skipped_without_failing_others() {
        let harness = near_midnight_harness();
        harness.add_user(1, Birthday::new(2, 14, None), None);
        harness.add_guild_member(100, 1, "greggy");
        harness.set_birthday_channel(100, 1000);
        // Guild 300 has a channel configured but the user is not a member
        harness.chat.add_guild(300);
        harness.set_birthday_channel(300, 3000);

        fire_and_settle(&harness, 1).await;

        let sent = harness.chat.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 1000);
    }

    #[tokio::test]
    async fn test_send_failure_does_not_fail_siblings() {
        let harness = near_midnight_harness();
        harness.add_user(1, Birthday::new(2, 14, None), None);
        harness.add_guild_member(100, 1, "greggy");
        harness.add_guild_member(200, 1, "gregster");
        harness.set_birthday_channel(100, 1000);
        harness.set_birthday_channel(200, 2000);
        harness.chat.fail_channel(1000);

        fire_and_settle(&harness, 1).await;

        let sent = harness.chat.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 2000);
        // A failed attempt still counts as attempted
        assert!(harness.store.last_notification(1).is_some());
    }
}
