//! Append-only ledger of unlocked achievements.
//!
//! # Invariants
//! - At most one record per achievement id
//! - Records keep insertion order; nothing is ever removed or reordered

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::get_by_id;

/// A single unlock, as stored locally and returned by the profile backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockRecord {
    pub achievement_id: String,
    pub unlocked_date: DateTime<Utc>,
}

/// Per-user ledger of unlocked achievements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<UnlockRecord>", into = "Vec<UnlockRecord>")]
pub struct Ledger {
    records: Vec<UnlockRecord>,
}

impl From<Vec<UnlockRecord>> for Ledger {
    fn from(records: Vec<UnlockRecord>) -> Self {
        Self::from_records(records)
    }
}

impl From<Ledger> for Vec<UnlockRecord> {
    fn from(ledger: Ledger) -> Self {
        ledger.records
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from loaded records, keeping the first record for
    /// each id.
    pub fn from_records(records: Vec<UnlockRecord>) -> Self {
        let mut ledger = Self::new();
        for record in records {
            if ledger.is_unlocked(&record.achievement_id) {
                tracing::warn!(
                    "Dropping duplicate unlock record for {}",
                    record.achievement_id
                );
                continue;
            }
            ledger.records.push(record);
        }
        ledger
    }

    pub fn is_unlocked(&self, achievement_id: &str) -> bool {
        self.records
            .iter()
            .any(|record| record.achievement_id == achievement_id)
    }

    /// Append an unlock.
    ///
    /// Returns `true` if the achievement was newly unlocked, `false` if the
    /// ledger already held it (in which case nothing changes).
    pub fn record_unlock(&mut self, achievement_id: &str, unlocked_date: DateTime<Utc>) -> bool {
        if self.is_unlocked(achievement_id) {
            return false;
        }
        self.records.push(UnlockRecord {
            achievement_id: achievement_id.to_string(),
            unlocked_date,
        });
        true
    }

    pub fn records(&self) -> &[UnlockRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The last `n` unlocks, newest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &UnlockRecord> {
        self.records.iter().rev().take(n)
    }

    /// Sum of the catalog XP rewards of every unlocked rule.
    ///
    /// Ids unknown to the catalog contribute nothing.
    pub fn total_xp_reward(&self) -> u64 {
        self.records
            .iter()
            .filter_map(|record| get_by_id(&record.achievement_id))
            .map(|rule| rule.xp_reward)
            .sum()
    }
}
