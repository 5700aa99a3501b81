//! The birthday scheduler.
//!
//! Owns the map of in-flight delivery tasks (at most one per user) and the
//! periodic scan that arms them. The scan finds every PUBLIC birthday due
//! within the next rolling 24 hours, computes midnight in each user's own
//! timezone, and spawns a cancellable task that fires at that instant.
//! Profile edits land here through [`BirthdayScheduler::notify_change`],
//! which cancels or re-arms immediately instead of waiting for the next
//! scan.
//!
//! The task map is the only shared mutable state in this feature. All
//! check-then-act sequences on it go through a `DashMap` entry guard, which
//! serializes racing callers for the same user while leaving different
//! users independent. No await ever happens while a guard is held.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info, warn};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::chat::ChatClient;
use crate::core::Clock;
use crate::database::{Birthday, Privacy, UserStore};
use crate::features::birthdays::delivery::DeliveryTask;
use crate::features::birthdays::range::{in_birthday_range, MonthDay};

/// Message template pools the delivery tasks render from.
#[derive(Debug, Clone)]
pub struct TemplatePools {
    pub with_age: Vec<String>,
    pub no_age: Vec<String>,
}

/// One armed delivery task. The generation tag lets a finished task remove
/// its own entry without ever evicting a replacement scheduled while it ran.
pub(crate) struct ScheduledTask {
    pub(crate) generation: Uuid,
    pub(crate) fire_at: DateTime<Utc>,
    pub(crate) handle: JoinHandle<()>,
}

pub struct BirthdayScheduler {
    store: Arc<dyn UserStore>,
    chat: Arc<dyn ChatClient>,
    clock: Arc<dyn Clock>,
    templates: Arc<TemplatePools>,
    tasks: DashMap<u64, ScheduledTask>,
}

impl BirthdayScheduler {
    pub fn new(
        store: Arc<dyn UserStore>,
        chat: Arc<dyn ChatClient>,
        clock: Arc<dyn Clock>,
        templates: TemplatePools,
    ) -> Arc<Self> {
        Arc::new(BirthdayScheduler {
            store,
            chat,
            clock,
            templates: Arc::new(templates),
            tasks: DashMap::new(),
        })
    }

    /// Find every birthday due within the next 24 hours and try to arm a
    /// delivery task for each. Per-user failures are logged and skipped;
    /// a store failure aborts the whole cycle (the next periodic scan
    /// retries). Returns how many tasks were armed.
    pub async fn scan_and_schedule(self: &Arc<Self>) -> Result<usize> {
        let now = self.clock.now();
        let today = now.date_naive();
        let tomorrow = today + Days::new(1);

        // The last-notification bound keeps re-scans of the same day from
        // re-arming users who were already congratulated this cycle.
        let candidates = self
            .store
            .get_birthdays_range(today, tomorrow, Some(now - Duration::hours(24)))
            .await?;

        let range_start = MonthDay::from_date(&today);
        let range_end = MonthDay::from_date(&tomorrow);

        let mut scheduled = 0;
        for (user_id, birthday) in candidates {
            // The store pre-filters; re-check so wrap edge cases from a
            // coarser server-side query never slip through.
            if !in_birthday_range(range_start, range_end, birthday.month_day()) {
                continue;
            }
            match self.schedule_birthday(user_id, birthday, now).await {
                Ok(true) => scheduled += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to schedule birthday for user {user_id}: {e:#}"),
            }
        }
        Ok(scheduled)
    }

    /// Arm a delivery task that fires at the user's next local midnight, if
    /// that midnight is within the next 24 hours. Any existing task for the
    /// user is cancelled first, whether or not a new one gets armed.
    ///
    /// `now` is passed in rather than read here so a scan scheduling many
    /// birthdays in a loop evaluates them all against the same instant.
    pub async fn schedule_birthday(
        self: &Arc<Self>,
        user_id: u64,
        birthday: Birthday,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let zone = self.resolve_timezone(user_id).await?;

        let Some(fire_at) = local_midnight_utc(&birthday, zone, now) else {
            // Feb 29 in a non-leap year has no midnight to fire at
            debug!(
                "No local midnight for user {user_id} (birthday {}-{}, zone {zone})",
                birthday.month, birthday.day
            );
            self.cancel(user_id);
            return Ok(false);
        };

        let delta = fire_at - now;
        if delta <= Duration::zero() || delta > Duration::hours(24) {
            // Zero means already due: a task from an earlier scan may be
            // mid-delivery, and re-arming it here could double-fire.
            self.cancel(user_id);
            return Ok(false);
        }

        let generation = Uuid::new_v4();
        let task = DeliveryTask {
            scheduler: Arc::downgrade(self),
            store: self.store.clone(),
            chat: self.chat.clone(),
            clock: self.clock.clone(),
            templates: self.templates.clone(),
            user_id,
            generation,
        };
        let handle = tokio::spawn(task.run(delta.to_std()?));

        match self.tasks.entry(user_id) {
            Entry::Occupied(mut occupied) => {
                occupied.get().handle.abort();
                occupied.insert(ScheduledTask {
                    generation,
                    fire_at,
                    handle,
                });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(ScheduledTask {
                    generation,
                    fire_at,
                    handle,
                });
            }
        }

        info!(
            "Scheduled birthday notification for user {user_id} at {fire_at} \
             (in {} seconds)",
            delta.num_seconds()
        );
        Ok(true)
    }

    /// Entry point for the profile-editing commands: call after any change
    /// to a user's birthday, timezone, or either field's privacy.
    /// Idempotent and safe to call when no task exists.
    pub async fn notify_change(self: &Arc<Self>, user_id: u64) -> Result<()> {
        let privacy = self.store.get_privacy_birthday(user_id).await?;
        match self.store.get_birthday(user_id).await? {
            Some(birthday) if privacy == Privacy::Public => {
                self.schedule_birthday(user_id, birthday, self.clock.now())
                    .await?;
            }
            _ => {
                debug!("Dropping any birthday task for user {user_id} (birthday unset or private)");
                self.cancel(user_id);
            }
        }
        Ok(())
    }

    /// Abort and drop the user's delivery task, if any.
    pub fn cancel(&self, user_id: u64) {
        if let Some((_, task)) = self.tasks.remove(&user_id) {
            task.handle.abort();
        }
    }

    /// Called by a delivery task when it finishes. Only the generation that
    /// owns the entry may remove it.
    pub(crate) fn finish(&self, user_id: u64, generation: Uuid) {
        self.tasks
            .remove_if(&user_id, |_, task| task.generation == generation);
    }

    /// When the user has an armed task, the instant it will fire.
    pub fn scheduled_fire_time(&self, user_id: u64) -> Option<DateTime<Utc>> {
        self.tasks.get(&user_id).map(|task| task.fire_at)
    }

    pub fn scheduled_count(&self) -> usize {
        self.tasks.len()
    }

    /// Abort every in-flight task. Nothing fires after this returns.
    pub fn shutdown(&self) {
        for entry in self.tasks.iter() {
            entry.handle.abort();
        }
        self.tasks.clear();
    }

    /// Birthdays in the `past_days` behind today and the `upcoming_days`
    /// ahead of it, for the user-facing birthday listing.
    pub async fn get_past_upcoming_birthdays(
        &self,
        past_days: u32,
        upcoming_days: u32,
    ) -> Result<(Vec<(u64, Birthday)>, Vec<(u64, Birthday)>)> {
        let today = self.clock.now().date_naive();
        let past = self
            .store
            .get_birthdays_range(today - Days::new(u64::from(past_days)), today, None)
            .await?;
        let upcoming = self
            .store
            .get_birthdays_range(
                today + Days::new(1),
                today + Days::new(u64::from(upcoming_days)),
                None,
            )
            .await?;
        Ok((past, upcoming))
    }

    async fn resolve_timezone(&self, user_id: u64) -> Result<Tz> {
        if self.store.get_privacy_timezone(user_id).await? == Privacy::Public {
            if let Some(zone) = self.store.get_timezone(user_id).await? {
                return Ok(zone);
            }
        }
        Ok(Tz::UTC)
    }
}

/// Midnight of the user's birthday in `zone`, in the year it is "today"
/// there, converted to UTC. Zones that skip midnight on a DST transition
/// start the day at 01:00 instead. None when the date doesn't exist this
/// year (Feb 29).
fn local_midnight_utc(birthday: &Birthday, zone: Tz, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let local_today = now.with_timezone(&zone).date_naive();
    let date = NaiveDate::from_ymd_opt(local_today.year(), birthday.month, birthday.day)?;
    let midnight = zone
        .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
        .earliest()
        .or_else(|| {
            date.and_hms_opt(1, 0, 0)
                .and_then(|t| zone.from_local_datetime(&t).earliest())
        })?;
    Some(midnight.with_timezone(&Utc))
}

/// Recurring driver for the periodic scan. Spawn once at startup; the first
/// scan runs immediately, then every `period`.
pub async fn birthday_scan_loop(scheduler: Arc<BirthdayScheduler>, period: StdDuration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        match scheduler.scan_and_schedule().await {
            Ok(count) => info!("{count} birthdays scheduled for today"),
            Err(e) => warn!("Birthday scan failed, will retry next cycle: {e:#}"),
        }
    }
}
