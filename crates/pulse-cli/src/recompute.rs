//! Retroactive progress recompute over an exported activity snapshot
//!
//! A snapshot is a JSON document listing every user's raw counters and the
//! achievement ids they already hold:
//!
//! ```json
//! { "users": [ { "user_id": 7, "posts": 12, "xp": 40, "achievements": [1] } ] }
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use pulse_core::{
    BatchReport, MemoryProgressStore, ProgressConfig, ProgressEngine, ProgressStore, Timestamp,
    UserAchievement, UserId, UserProgress,
};

use crate::error::Result;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snapshot {
    pub users: Vec<SnapshotUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotUser {
    pub user_id: UserId,
    #[serde(default)]
    pub achievements: Vec<u64>,
    #[serde(flatten)]
    pub progress: UserProgress,
}

/// Per-user state after the pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserState {
    pub user_id: UserId,
    #[serde(flatten)]
    pub progress: UserProgress,
    pub achievements: Vec<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecomputeOutcome {
    pub batch: BatchReport,
    pub users: Vec<UserState>,
}

impl Snapshot {
    pub fn from_json(document: &str) -> Result<Self> {
        Ok(serde_json::from_str(document)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let document = std::fs::read_to_string(path)?;
        Self::from_json(&document)
    }
}

/// Import the snapshot into a fresh store and run the batch pass.
///
/// With `sync_xp` the stored XP is first raised to what activity and held
/// rewards imply; otherwise only achievements and rank are evaluated.
pub fn recompute(
    snapshot: &Snapshot,
    config: &ProgressConfig,
    sync_xp: bool,
) -> Result<RecomputeOutcome> {
    let store = Arc::new(MemoryProgressStore::new());
    let imported_at = Timestamp::now();

    for user in &snapshot.users {
        store.import(user.user_id, user.progress.clone())?;
        for &achievement_id in &user.achievements {
            store.insert_achievement(UserAchievement {
                user_id: user.user_id,
                achievement_id,
                unlocked_at: imported_at,
            })?;
        }
    }
    debug!(users = snapshot.users.len(), "Snapshot imported");

    let engine = ProgressEngine::new(store.clone(), config.clone());
    let batch = if sync_xp {
        engine.sync_all()?
    } else {
        engine.recompute_all()?
    };

    let mut users = Vec::with_capacity(snapshot.users.len());
    for user_id in store.users()? {
        let mut achievements: Vec<u64> = store
            .achievements(user_id)?
            .into_iter()
            .map(|held| held.achievement_id)
            .collect();
        achievements.sort_unstable();
        users.push(UserState {
            user_id,
            progress: store.progress(user_id)?,
            achievements,
        });
    }
    users.sort_by_key(|state| state.user_id);

    info!(
        users = batch.users,
        unlocked = batch.unlocked,
        xp_synced = batch.xp_synced,
        "Recompute complete"
    );
    Ok(RecomputeOutcome { batch, users })
}
