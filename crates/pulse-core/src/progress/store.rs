//! Progress storage
//!
//! The engine talks to storage only through relative increments and
//! insert-if-absent, so concurrent writers for the same user never lose an
//! update to a read-modify-write race in application code.

use std::sync::{Mutex, MutexGuard};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::achievement::{CounterKind, UserAchievement};
use crate::errors::ProgressError;
use crate::types::UserId;

// ----------------------------------------------------------------------------
// User Progress
// ----------------------------------------------------------------------------

/// A user's aggregate and the activity counters behind it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProgress {
    pub xp: u64,
    pub reputation: u64,
    pub rank_id: Option<u32>,
    pub posts: u64,
    pub threads: u64,
    pub comments: u64,
    pub reviews: u64,
    pub friends: u64,
}

impl UserProgress {
    pub fn counter(&self, kind: CounterKind) -> u64 {
        match kind {
            CounterKind::Posts => self.posts,
            CounterKind::Threads => self.threads,
            CounterKind::Comments => self.comments,
            CounterKind::Reviews => self.reviews,
            CounterKind::Friends => self.friends,
            CounterKind::Reputation => self.reputation,
            CounterKind::Xp => self.xp,
        }
    }

    fn counter_mut(&mut self, kind: CounterKind) -> &mut u64 {
        match kind {
            CounterKind::Posts => &mut self.posts,
            CounterKind::Threads => &mut self.threads,
            CounterKind::Comments => &mut self.comments,
            CounterKind::Reviews => &mut self.reviews,
            CounterKind::Friends => &mut self.friends,
            CounterKind::Reputation => &mut self.reputation,
            CounterKind::Xp => &mut self.xp,
        }
    }
}

// ----------------------------------------------------------------------------
// Store Trait
// ----------------------------------------------------------------------------

/// Storage seam for the progress engine
pub trait ProgressStore: Send + Sync {
    /// Add `delta` to a counter, flooring at zero, and return the new value.
    /// Creates the user's aggregate on first touch.
    fn increment(
        &self,
        user_id: UserId,
        counter: CounterKind,
        delta: i64,
    ) -> Result<u64, ProgressError>;

    fn progress(&self, user_id: UserId) -> Result<UserProgress, ProgressError>;

    fn set_rank(&self, user_id: UserId, rank_id: Option<u32>) -> Result<(), ProgressError>;

    /// Insert the unlock row unless the pair already exists.
    /// Returns `true` only when this call created it.
    fn insert_achievement(&self, record: UserAchievement) -> Result<bool, ProgressError>;

    fn achievements(&self, user_id: UserId) -> Result<Vec<UserAchievement>, ProgressError>;

    /// Overwrite XP only if `xp` is greater than the stored value.
    /// Returns `true` when the value changed.
    fn set_xp_if_greater(&self, user_id: UserId, xp: u64) -> Result<bool, ProgressError>;

    fn users(&self) -> Result<Vec<UserId>, ProgressError>;
}

// ----------------------------------------------------------------------------
// In-Memory Store
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct UserRow {
    progress: UserProgress,
    achievements: Vec<UserAchievement>,
}

/// Mutex-guarded in-memory store
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    rows: Mutex<HashMap<UserId, UserRow>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed raw counters for a user, bypassing the engine
    pub fn import(&self, user_id: UserId, progress: UserProgress) -> Result<(), ProgressError> {
        let mut rows = self.lock()?;
        rows.entry(user_id).or_default().progress = progress;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<UserId, UserRow>>, ProgressError> {
        self.rows.lock().map_err(|_| ProgressError::Store {
            reason: "progress store lock poisoned".to_string(),
        })
    }
}

impl ProgressStore for MemoryProgressStore {
    fn increment(
        &self,
        user_id: UserId,
        counter: CounterKind,
        delta: i64,
    ) -> Result<u64, ProgressError> {
        let mut rows = self.lock()?;
        let value = rows
            .entry(user_id)
            .or_default()
            .progress
            .counter_mut(counter);
        *value = value.saturating_add_signed(delta);
        Ok(*value)
    }

    fn progress(&self, user_id: UserId) -> Result<UserProgress, ProgressError> {
        self.lock()?
            .get(&user_id)
            .map(|row| row.progress.clone())
            .ok_or(ProgressError::UnknownUser { user_id })
    }

    fn set_rank(&self, user_id: UserId, rank_id: Option<u32>) -> Result<(), ProgressError> {
        let mut rows = self.lock()?;
        let row = rows
            .get_mut(&user_id)
            .ok_or(ProgressError::UnknownUser { user_id })?;
        row.progress.rank_id = rank_id;
        Ok(())
    }

    fn insert_achievement(&self, record: UserAchievement) -> Result<bool, ProgressError> {
        let mut rows = self.lock()?;
        let row = rows.entry(record.user_id).or_default();
        if row
            .achievements
            .iter()
            .any(|existing| existing.achievement_id == record.achievement_id)
        {
            return Ok(false);
        }
        row.achievements.push(record);
        Ok(true)
    }

    fn achievements(&self, user_id: UserId) -> Result<Vec<UserAchievement>, ProgressError> {
        Ok(self
            .lock()?
            .get(&user_id)
            .map(|row| row.achievements.clone())
            .unwrap_or_default())
    }

    fn set_xp_if_greater(&self, user_id: UserId, xp: u64) -> Result<bool, ProgressError> {
        let mut rows = self.lock()?;
        let row = rows
            .get_mut(&user_id)
            .ok_or(ProgressError::UnknownUser { user_id })?;
        if xp > row.progress.xp {
            row.progress.xp = xp;
            return Ok(true);
        }
        Ok(false)
    }

    fn users(&self) -> Result<Vec<UserId>, ProgressError> {
        let mut users: Vec<UserId> = self.lock()?.keys().copied().collect();
        users.sort_unstable();
        Ok(users)
    }
}
