//! Property-based tests for the progress-state engine
//!
//! The incremental per-transition path and the retroactive batch path are
//! independent code paths; these properties assert they converge on the same
//! unlocked set, XP and rank for the same underlying activity.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use proptest::prelude::*;
use pulse_core::{
    MemoryProgressStore, ProgressConfig, ProgressEngine, ProgressStore, ProgressTrigger,
    UserId, UserProgress,
};

/// Generate a non-destructive activity for one of a handful of users
fn arb_trigger() -> impl Strategy<Value = ProgressTrigger> {
    (1u64..=4, 0u8..5).prop_map(|(user, activity)| {
        let user_id = UserId::new(user);
        match activity {
            0 => ProgressTrigger::PostCreated { user_id },
            1 => ProgressTrigger::ThreadCreated { user_id },
            2 => ProgressTrigger::CommentPosted { user_id },
            3 => ProgressTrigger::ReviewPublished { user_id },
            _ => ProgressTrigger::FriendAdded { user_id },
        }
    })
}

/// Raw activity counts, as a legacy import would provide them
fn tally(triggers: &[ProgressTrigger], config: &ProgressConfig) -> BTreeMap<UserId, UserProgress> {
    let mut counts: BTreeMap<UserId, UserProgress> = BTreeMap::new();
    for trigger in triggers {
        let progress = counts.entry(trigger.user_id()).or_default();
        match trigger {
            ProgressTrigger::PostCreated { .. } => {
                progress.posts += 1;
                progress.reputation += config.post_reputation_delta;
            }
            ProgressTrigger::ThreadCreated { .. } => progress.threads += 1,
            ProgressTrigger::CommentPosted { .. } => progress.comments += 1,
            ProgressTrigger::ReviewPublished { .. } => progress.reviews += 1,
            ProgressTrigger::FriendAdded { .. } => progress.friends += 1,
            ProgressTrigger::PostDeleted { .. } => unreachable!("generator never deletes"),
        }
    }
    counts
}

fn unlocked(store: &dyn ProgressStore, user_id: UserId) -> BTreeSet<u64> {
    store
        .achievements(user_id)
        .expect("achievements should load")
        .into_iter()
        .map(|record| record.achievement_id)
        .collect()
}

proptest! {
    /// Property: incremental and batch recompute converge
    #[test]
    fn incremental_and_batch_converge(triggers in prop::collection::vec(arb_trigger(), 0..80)) {
        let config = ProgressConfig::default();

        let incremental_store = Arc::new(MemoryProgressStore::new());
        let incremental = ProgressEngine::new(incremental_store.clone(), config.clone());
        for trigger in &triggers {
            incremental.apply(*trigger).expect("trigger should apply");
        }

        let batch_store = Arc::new(MemoryProgressStore::new());
        for (user_id, progress) in tally(&triggers, &config) {
            batch_store.import(user_id, progress).expect("import should succeed");
        }
        let batch = ProgressEngine::new(batch_store.clone(), config.clone());
        batch.sync_all().expect("batch pass should succeed");

        let users = incremental_store.users().expect("users should load");
        prop_assert_eq!(&users, &batch_store.users().expect("users should load"));

        for user_id in users {
            let left = incremental_store.progress(user_id).expect("progress should load");
            let right = batch_store.progress(user_id).expect("progress should load");
            prop_assert_eq!(unlocked(incremental_store.as_ref(), user_id), unlocked(batch_store.as_ref(), user_id));
            prop_assert_eq!(left.xp, right.xp);
            prop_assert_eq!(left.reputation, right.reputation);
            prop_assert_eq!(left.rank_id, right.rank_id);
        }
    }

    /// Property: a batch pass over incrementally maintained state is a no-op
    #[test]
    fn batch_after_incremental_is_idempotent(triggers in prop::collection::vec(arb_trigger(), 0..60)) {
        let store = Arc::new(MemoryProgressStore::new());
        let engine = ProgressEngine::new(store.clone(), ProgressConfig::default());
        for trigger in &triggers {
            engine.apply(*trigger).expect("trigger should apply");
        }

        let before: Vec<_> = store
            .users()
            .expect("users should load")
            .into_iter()
            .map(|user_id| (store.progress(user_id).expect("progress"), unlocked(store.as_ref(), user_id)))
            .collect();

        let first = engine.sync_all().expect("batch pass should succeed");
        let second = engine.recompute_all().expect("batch pass should succeed");
        prop_assert_eq!(first.unlocked, 0);
        prop_assert_eq!(first.xp_granted, 0);
        prop_assert_eq!(first.xp_synced, 0);
        prop_assert_eq!(second.unlocked, 0);

        let after: Vec<_> = store
            .users()
            .expect("users should load")
            .into_iter()
            .map(|user_id| (store.progress(user_id).expect("progress"), unlocked(store.as_ref(), user_id)))
            .collect();
        prop_assert_eq!(before, after);
    }

    /// Property: rank never rises when reputation strictly falls
    #[test]
    fn rank_is_monotone_in_reputation(posts in 1usize..40, deletes in 1usize..40) {
        let store = Arc::new(MemoryProgressStore::new());
        let engine = ProgressEngine::new(store.clone(), ProgressConfig::default());
        let user_id = UserId::new(1);
        for _ in 0..posts {
            engine.on_post_created(user_id).expect("post should apply");
        }

        let ladder = engine.ladder().clone();
        let threshold = |rank_id: Option<u32>| {
            rank_id.and_then(|id| ladder.get(id)).map(|rank| rank.min_threshold)
        };

        for _ in 0..deletes {
            let before = store.progress(user_id).expect("progress");
            engine.on_post_deleted(user_id).expect("delete should apply");
            let after = store.progress(user_id).expect("progress");

            prop_assert!(after.reputation <= before.reputation);
            prop_assert!(threshold(after.rank_id) <= threshold(before.rank_id));
            prop_assert_eq!(
                after.rank_id,
                engine.ladder().resolve(after.reputation).map(|rank| rank.id)
            );
            prop_assert!(after.xp >= before.xp);
        }
    }
}
