//! Achievement rules, progress evaluation and the per-user unlock ledger.
//!
//! # Key Concepts
//! - Catalog: the static, ordered list of achievement rules
//! - Progress: pure evaluation of a rule against a statistics snapshot
//! - Ledger: append-only record of which rules a user has unlocked
//!
//! Rules are plain data. Nothing in this module performs IO; persistence of
//! the ledger is handled by [`crate::backend`].

mod catalog;
mod ledger;
mod progress;

pub use catalog::{by_category, catalog, get_by_id, CATEGORIES};
pub use ledger::{Ledger, UnlockRecord};
pub use progress::{evaluate, Progress};

use serde::{Deserialize, Serialize};

/// Rarity tier of an achievement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Legendary,
}

impl AchievementTier {
    /// Display label shown on badges.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Bronze => "Bronze",
            Self::Silver => "Prata",
            Self::Gold => "Ouro",
            Self::Platinum => "Platina",
            Self::Legendary => "Lendário",
        }
    }
}

impl std::fmt::Display for AchievementTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Platinum => "platinum",
            Self::Legendary => "legendary",
        };
        write!(f, "{}", s)
    }
}

/// Grouping used by the achievements screen filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementCategory {
    Explorer,
    Geometry,
    Speedster,
    Perfectionist,
    Legendary,
}

impl AchievementCategory {
    /// Display label for the category filter.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Explorer => "Explorador Espacial",
            Self::Geometry => "Mestre da Geometria",
            Self::Speedster => "Velocista Cósmico",
            Self::Perfectionist => "Perfeccionista",
            Self::Legendary => "Lendário",
        }
    }
}

/// Unlock condition of an achievement.
///
/// Each variant carries only the fields it needs; evaluation is a total
/// match over the variants (see [`evaluate`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    MissionsCompleted { value: u64 },
    PlanetsUnlocked { value: u64 },
    XpEarned { value: u64 },
    LevelReached { value: u64 },
    PerfectMissions { value: u64 },
    FastCompletions { value: u64 },
    /// Correct answers, either within one question category or summed over
    /// all of them when `category` is `None`.
    QuestionsCorrect {
        value: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
    },
    /// No statistic tracks streaks yet, so this never unlocks.
    StreakDays { value: u64 },
    /// Indicator condition: 1 once every available mission is complete.
    AllMissionsComplete { value: u64 },
}

impl Condition {
    /// Target value the statistic has to reach.
    pub fn target(&self) -> u64 {
        match self {
            Self::MissionsCompleted { value }
            | Self::PlanetsUnlocked { value }
            | Self::XpEarned { value }
            | Self::LevelReached { value }
            | Self::PerfectMissions { value }
            | Self::FastCompletions { value }
            | Self::QuestionsCorrect { value, .. }
            | Self::StreakDays { value }
            | Self::AllMissionsComplete { value } => *value,
        }
    }
}

/// A static achievement definition.
///
/// # Invariants
/// - `id` is unique within the catalog
/// - Never mutated after the catalog is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementRule {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: AchievementCategory,
    pub tier: AchievementTier,
    pub xp_reward: u64,
    pub condition: Condition,
    /// Teaser shown instead of the description while the rule is locked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_description: Option<String>,
}

impl AchievementRule {
    /// Text to show for this rule given whether it is unlocked.
    pub fn display_description(&self, unlocked: bool) -> &str {
        match (&self.secret_description, unlocked) {
            (Some(secret), false) => secret,
            _ => &self.description,
        }
    }
}
