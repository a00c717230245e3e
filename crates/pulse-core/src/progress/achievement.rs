//! Achievement catalog and rank ladder

use core::fmt;
use serde::{Deserialize, Serialize};

use super::store::UserProgress;
use crate::errors::ProgressError;
use crate::types::{Timestamp, UserId};

// ----------------------------------------------------------------------------
// Counters
// ----------------------------------------------------------------------------

/// Aggregate values that achievement criteria can be written against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    Posts,
    Threads,
    Comments,
    Reviews,
    Friends,
    Reputation,
    Xp,
}

impl CounterKind {
    pub const ALL: [CounterKind; 7] = [
        CounterKind::Posts,
        CounterKind::Threads,
        CounterKind::Comments,
        CounterKind::Reviews,
        CounterKind::Friends,
        CounterKind::Reputation,
        CounterKind::Xp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CounterKind::Posts => "posts",
            CounterKind::Threads => "threads",
            CounterKind::Comments => "comments",
            CounterKind::Reviews => "reviews",
            CounterKind::Friends => "friends",
            CounterKind::Reputation => "reputation",
            CounterKind::Xp => "xp",
        }
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Achievements
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: u64,
    pub name: String,
    pub criteria_type: CounterKind,
    pub criteria_value: u64,
    /// XP granted once, when the achievement is first unlocked
    pub xp_reward: u64,
}

impl Achievement {
    pub fn new(
        id: u64,
        name: impl Into<String>,
        criteria_type: CounterKind,
        criteria_value: u64,
        xp_reward: u64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            criteria_type,
            criteria_value,
            xp_reward,
        }
    }

    pub fn is_satisfied_by(&self, progress: &UserProgress) -> bool {
        progress.counter(self.criteria_type) >= self.criteria_value
    }
}

/// Existence of this row is what "unlocked" means
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAchievement {
    pub user_id: UserId,
    pub achievement_id: u64,
    pub unlocked_at: Timestamp,
}

/// The catalog shipped with the fabric
pub fn default_achievements() -> Vec<Achievement> {
    vec![
        Achievement::new(1, "First Steps", CounterKind::Posts, 1, 10),
        Achievement::new(2, "Active Voice", CounterKind::Posts, 10, 50),
        Achievement::new(3, "Conversation Starter", CounterKind::Threads, 1, 20),
        Achievement::new(4, "Critic", CounterKind::Reviews, 1, 25),
        Achievement::new(5, "Commentator", CounterKind::Comments, 10, 15),
        Achievement::new(6, "Well Connected", CounterKind::Friends, 5, 20),
        Achievement::new(7, "Respected", CounterKind::Reputation, 100, 100),
        Achievement::new(8, "Seasoned", CounterKind::Xp, 500, 50),
        Achievement::new(9, "Veteran", CounterKind::Xp, 1_000, 0),
    ]
}

// ----------------------------------------------------------------------------
// Rank Ladder
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rank {
    pub id: u32,
    pub name: String,
    pub min_threshold: u64,
}

impl Rank {
    pub fn new(id: u32, name: impl Into<String>, min_threshold: u64) -> Self {
        Self {
            id,
            name: name.into(),
            min_threshold,
        }
    }
}

/// Ranks ordered by threshold; a user's rank is derived, never set directly
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankLadder {
    ranks: Vec<Rank>,
}

impl RankLadder {
    /// Build a ladder, rejecting duplicate ids or thresholds
    pub fn new(mut ranks: Vec<Rank>) -> Result<Self, ProgressError> {
        ranks.sort_by_key(|rank| rank.min_threshold);
        for pair in ranks.windows(2) {
            if pair[0].min_threshold == pair[1].min_threshold {
                return Err(ProgressError::InvalidLadder {
                    reason: format!(
                        "ranks {} and {} share threshold {}",
                        pair[0].id, pair[1].id, pair[0].min_threshold
                    ),
                });
            }
        }
        let mut ids: Vec<u32> = ranks.iter().map(|rank| rank.id).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(ProgressError::InvalidLadder {
                reason: "duplicate rank id".to_string(),
            });
        }
        Ok(Self { ranks })
    }

    /// The rank with the highest threshold not above `value`
    pub fn resolve(&self, value: u64) -> Option<&Rank> {
        self.ranks
            .iter()
            .rev()
            .find(|rank| rank.min_threshold <= value)
    }

    pub fn get(&self, id: u32) -> Option<&Rank> {
        self.ranks.iter().find(|rank| rank.id == id)
    }

    pub fn ranks(&self) -> &[Rank] {
        &self.ranks
    }
}

impl Default for RankLadder {
    fn default() -> Self {
        Self {
            ranks: vec![
                Rank::new(1, "Newcomer", 0),
                Rank::new(2, "Regular", 50),
                Rank::new(3, "Contributor", 200),
                Rank::new(4, "Veteran", 500),
                Rank::new(5, "Legend", 1_000),
            ],
        }
    }
}

impl<'de> Deserialize<'de> for RankLadder {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            ranks: Vec<Rank>,
        }
        let raw = Raw::deserialize(deserializer)?;
        RankLadder::new(raw.ranks).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_picks_highest_reached_threshold() {
        let ladder = RankLadder::default();
        assert_eq!(ladder.resolve(0).map(|r| r.id), Some(1));
        assert_eq!(ladder.resolve(49).map(|r| r.id), Some(1));
        assert_eq!(ladder.resolve(50).map(|r| r.id), Some(2));
        assert_eq!(ladder.resolve(999).map(|r| r.id), Some(4));
        assert_eq!(ladder.resolve(u64::MAX).map(|r| r.id), Some(5));
    }

    #[test]
    fn test_ladder_without_zero_rank_leaves_low_users_unranked() {
        let ladder = RankLadder::new(vec![Rank::new(7, "Gold", 100), Rank::new(6, "Silver", 10)])
            .unwrap();
        assert!(ladder.resolve(9).is_none());
        assert_eq!(ladder.resolve(10).map(|r| r.name.as_str()), Some("Silver"));
        assert_eq!(ladder.ranks()[0].id, 6);
    }

    #[test]
    fn test_ladder_rejects_duplicates() {
        assert!(RankLadder::new(vec![Rank::new(1, "A", 5), Rank::new(2, "B", 5)]).is_err());
        assert!(RankLadder::new(vec![Rank::new(1, "A", 5), Rank::new(1, "B", 6)]).is_err());
    }

    #[test]
    fn test_default_catalog_ids_are_unique() {
        let catalog = default_achievements();
        let mut ids: Vec<u64> = catalog.iter().map(|a| a.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), catalog.len());
    }
}
