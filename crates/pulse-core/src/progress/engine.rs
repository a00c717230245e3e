//! Progress-state engine
//!
//! Effects of one trigger always run in the same order: counter increments,
//! rank recompute, achievement evaluation, then the XP-reward cascade. Rank
//! and achievement checks therefore always see post-increment counters.

use std::sync::Arc;

use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use super::achievement::{default_achievements, Achievement, CounterKind, RankLadder, UserAchievement};
use super::store::ProgressStore;
use super::ProgressTrigger;
use crate::config::ProgressConfig;
use crate::errors::ProgressError;
use crate::types::{SystemTimeSource, TimeSource, UserId};

type Changed = SmallVec<[CounterKind; 4]>;

// ----------------------------------------------------------------------------
// Reports
// ----------------------------------------------------------------------------

/// Rank movement caused by a recompute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RankChange {
    pub from: Option<u32>,
    pub to: Option<u32>,
}

/// What one trigger (or one batch pass for one user) changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    pub user_id: Option<UserId>,
    pub rank_change: Option<RankChange>,
    /// Achievements newly unlocked, in unlock order
    pub unlocked: Vec<u64>,
    pub xp_granted: u64,
    /// Achievements whose unlock failed and were skipped
    pub failed: Vec<u64>,
}

impl ProgressReport {
    fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        self.rank_change.is_none() && self.unlocked.is_empty() && self.xp_granted == 0
    }
}

/// Outcome of a retroactive pass over every known user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub users: usize,
    pub unlocked: usize,
    pub xp_granted: u64,
    pub rank_changes: usize,
    pub xp_synced: usize,
}

// ----------------------------------------------------------------------------
// Engine
// ----------------------------------------------------------------------------

pub struct ProgressEngine {
    store: Arc<dyn ProgressStore>,
    catalog: Vec<Achievement>,
    ladder: RankLadder,
    config: ProgressConfig,
    time_source: Arc<dyn TimeSource>,
}

impl ProgressEngine {
    /// Engine with the default catalog and rank ladder
    pub fn new(store: Arc<dyn ProgressStore>, config: ProgressConfig) -> Self {
        Self {
            store,
            catalog: default_achievements(),
            ladder: RankLadder::default(),
            config,
            time_source: Arc::new(SystemTimeSource::new()),
        }
    }

    pub fn with_catalog(mut self, catalog: Vec<Achievement>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_ladder(mut self, ladder: RankLadder) -> Self {
        self.ladder = ladder;
        self
    }

    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn store(&self) -> &Arc<dyn ProgressStore> {
        &self.store
    }

    pub fn catalog(&self) -> &[Achievement] {
        &self.catalog
    }

    pub fn ladder(&self) -> &RankLadder {
        &self.ladder
    }

    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    /// Apply one activity trigger
    pub fn apply(&self, trigger: ProgressTrigger) -> Result<ProgressReport, ProgressError> {
        let user_id = trigger.user_id();
        let mut report = ProgressReport::for_user(user_id);

        let mut changed = Changed::new();
        for (counter, delta) in trigger.deltas(&self.config) {
            self.store.increment(user_id, counter, delta)?;
            if delta != 0 {
                changed.push(counter);
            }
        }
        debug!(user_id = %user_id, ?trigger, ?changed, "Applied progress counters");

        report.rank_change = self.recompute_rank(user_id)?;
        self.evaluate(user_id, changed, &mut report)?;
        Ok(report)
    }

    pub fn on_post_created(&self, user_id: UserId) -> Result<ProgressReport, ProgressError> {
        self.apply(ProgressTrigger::PostCreated { user_id })
    }

    pub fn on_post_deleted(&self, user_id: UserId) -> Result<ProgressReport, ProgressError> {
        self.apply(ProgressTrigger::PostDeleted { user_id })
    }

    pub fn on_thread_created(&self, user_id: UserId) -> Result<ProgressReport, ProgressError> {
        self.apply(ProgressTrigger::ThreadCreated { user_id })
    }

    pub fn on_comment_posted(&self, user_id: UserId) -> Result<ProgressReport, ProgressError> {
        self.apply(ProgressTrigger::CommentPosted { user_id })
    }

    pub fn on_review_published(&self, user_id: UserId) -> Result<ProgressReport, ProgressError> {
        self.apply(ProgressTrigger::ReviewPublished { user_id })
    }

    pub fn on_friend_added(&self, user_id: UserId) -> Result<ProgressReport, ProgressError> {
        self.apply(ProgressTrigger::FriendAdded { user_id })
    }

    /// Derive the rank from current reputation and store it if it moved
    pub fn recompute_rank(&self, user_id: UserId) -> Result<Option<RankChange>, ProgressError> {
        let progress = self.store.progress(user_id)?;
        let resolved = self.ladder.resolve(progress.reputation).map(|rank| rank.id);
        if resolved == progress.rank_id {
            return Ok(None);
        }

        self.store.set_rank(user_id, resolved)?;
        info!(
            user_id = %user_id,
            from = ?progress.rank_id,
            to = ?resolved,
            reputation = progress.reputation,
            "Rank changed"
        );
        Ok(Some(RankChange {
            from: progress.rank_id,
            to: resolved,
        }))
    }

    /// Evaluate achievements keyed on `changed`, then cascade through XP
    /// rewards until nothing new unlocks.
    fn evaluate(
        &self,
        user_id: UserId,
        mut pending: Changed,
        report: &mut ProgressReport,
    ) -> Result<(), ProgressError> {
        for _ in 0..self.config.max_cascade_rounds {
            if pending.is_empty() {
                return Ok(());
            }
            let progress = self.store.progress(user_id)?;
            let mut granted = 0u64;

            for achievement in self
                .catalog
                .iter()
                .filter(|achievement| pending.contains(&achievement.criteria_type))
                .filter(|achievement| achievement.is_satisfied_by(&progress))
            {
                match self.unlock(user_id, achievement) {
                    Ok(true) => {
                        report.unlocked.push(achievement.id);
                        granted = granted.saturating_add(achievement.xp_reward);
                    }
                    Ok(false) => {}
                    Err(error) => {
                        warn!(
                            user_id = %user_id,
                            achievement_id = achievement.id,
                            error = %error,
                            "Achievement unlock failed, continuing"
                        );
                        report.failed.push(achievement.id);
                    }
                }
            }

            pending.clear();
            if granted > 0 {
                report.xp_granted = report.xp_granted.saturating_add(granted);
                pending.push(CounterKind::Xp);
            }
        }

        if !pending.is_empty() {
            warn!(user_id = %user_id, "XP reward cascade hit its round limit");
        }
        Ok(())
    }

    /// Insert-if-absent, granting the reward only when the row was created.
    ///
    /// The row is committed before the reward. If the reward increment fails
    /// the achievement stays held without its XP until [`Self::sync_xp`]
    /// raises XP to the value implied by held rewards.
    fn unlock(&self, user_id: UserId, achievement: &Achievement) -> Result<bool, ProgressError> {
        let created = self.store.insert_achievement(UserAchievement {
            user_id,
            achievement_id: achievement.id,
            unlocked_at: self.time_source.now(),
        })?;
        if !created {
            return Ok(false);
        }

        if achievement.xp_reward > 0 {
            let reward = i64::try_from(achievement.xp_reward).unwrap_or(i64::MAX);
            if let Err(error) = self.store.increment(user_id, CounterKind::Xp, reward) {
                warn!(
                    user_id = %user_id,
                    achievement_id = achievement.id,
                    xp_reward = achievement.xp_reward,
                    error = %error,
                    "Achievement recorded but its XP reward was not granted; an XP sync restores it"
                );
                return Err(error);
            }
        }
        info!(
            user_id = %user_id,
            achievement = %achievement.name,
            xp_reward = achievement.xp_reward,
            "Achievement unlocked"
        );
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Retroactive passes
    // ------------------------------------------------------------------------

    /// Recompute rank and evaluate every achievement for one user
    pub fn recompute_user(&self, user_id: UserId) -> Result<ProgressReport, ProgressError> {
        let mut report = ProgressReport::for_user(user_id);
        report.rank_change = self.recompute_rank(user_id)?;
        self.evaluate(user_id, CounterKind::ALL.into_iter().collect(), &mut report)?;
        Ok(report)
    }

    /// Batch recompute over all users. A failure for one user is logged and
    /// the pass moves on.
    pub fn recompute_all(&self) -> Result<BatchReport, ProgressError> {
        let users = self.store.users()?;
        let mut batch = BatchReport {
            users: users.len(),
            ..BatchReport::default()
        };

        for user_id in users {
            match self.recompute_user(user_id) {
                Ok(report) => {
                    batch.unlocked += report.unlocked.len();
                    batch.xp_granted = batch.xp_granted.saturating_add(report.xp_granted);
                    batch.rank_changes += usize::from(report.rank_change.is_some());
                }
                Err(error) => warn!(user_id = %user_id, error = %error, "Recompute failed"),
            }
        }

        info!(
            users = batch.users,
            unlocked = batch.unlocked,
            xp_granted = batch.xp_granted,
            "Retroactive recompute finished"
        );
        Ok(batch)
    }

    /// XP implied by raw activity plus every reward already unlocked
    pub fn expected_xp(&self, user_id: UserId) -> Result<u64, ProgressError> {
        let progress = self.store.progress(user_id)?;
        let rewards: u64 = self
            .store
            .achievements(user_id)?
            .iter()
            .filter_map(|unlocked| {
                self.catalog
                    .iter()
                    .find(|achievement| achievement.id == unlocked.achievement_id)
            })
            .fold(0u64, |total, achievement| total.saturating_add(achievement.xp_reward));

        Ok(progress
            .posts
            .saturating_mul(self.config.post_xp_delta)
            .saturating_add(progress.threads.saturating_mul(self.config.thread_xp_delta))
            .saturating_add(progress.reviews.saturating_mul(self.config.review_xp_delta))
            .saturating_add(rewards))
    }

    /// Raise stored XP to the recomputed value; never lowers it.
    ///
    /// Returns the new XP when it was applied.
    pub fn sync_xp(&self, user_id: UserId) -> Result<Option<u64>, ProgressError> {
        let expected = self.expected_xp(user_id)?;
        if !self.store.set_xp_if_greater(user_id, expected)? {
            debug!(user_id = %user_id, expected, "Stored XP already at or above recomputed value");
            return Ok(None);
        }

        let mut report = ProgressReport::for_user(user_id);
        self.evaluate(user_id, SmallVec::from_elem(CounterKind::Xp, 1), &mut report)?;
        Ok(Some(expected.saturating_add(report.xp_granted)))
    }

    /// XP sync followed by a full recompute, for every user
    pub fn sync_all(&self) -> Result<BatchReport, ProgressError> {
        let mut synced = 0;
        for user_id in self.store.users()? {
            match self.sync_xp(user_id) {
                Ok(Some(_)) => synced += 1,
                Ok(None) => {}
                Err(error) => warn!(user_id = %user_id, error = %error, "XP sync failed"),
            }
        }
        let mut batch = self.recompute_all()?;
        batch.xp_synced = synced;
        Ok(batch)
    }
}
