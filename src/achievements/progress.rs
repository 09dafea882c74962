//! Pure progress evaluation of a rule against a statistics snapshot.
//!
//! # Properties
//! - Deterministic and side-effect free
//! - Monotonic: raising any statistic never lowers `current`
//! - `is_unlocked` compares the unclamped value against the target

use serde::Serialize;

use super::{AchievementRule, Condition};
use crate::profile::UserStats;

/// Progress of one rule for display and unlocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Current value, clamped to `total`.
    pub current: u64,
    pub total: u64,
    pub is_unlocked: bool,
}

impl Progress {
    /// Fraction of the target reached, in `[0.0, 1.0]`.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.current as f64 / self.total as f64
    }
}

/// Evaluate `rule` against `stats`.
pub fn evaluate(rule: &AchievementRule, stats: &UserStats) -> Progress {
    let total = rule.condition.target();
    let raw = raw_value(&rule.condition, stats);

    Progress {
        current: raw.min(total),
        total,
        is_unlocked: raw >= total,
    }
}

fn raw_value(condition: &Condition, stats: &UserStats) -> u64 {
    match condition {
        Condition::MissionsCompleted { .. } => stats.completed_missions,
        Condition::PlanetsUnlocked { .. } => stats.unlocked_planets.len() as u64,
        Condition::XpEarned { .. } => stats.xp,
        Condition::LevelReached { .. } => stats.level,
        Condition::PerfectMissions { .. } => stats.perfect_missions,
        Condition::FastCompletions { .. } => stats.fast_completions,
        Condition::QuestionsCorrect { category, .. } => match category {
            Some(category) => stats.questions_correct.get(category).copied().unwrap_or(0),
            None => stats.total_questions_correct(),
        },
        Condition::StreakDays { .. } => 0,
        Condition::AllMissionsComplete { .. } => {
            u64::from(stats.completed_missions >= stats.total_missions)
        }
    }
}
