//! User profile and play statistics.
//!
//! The wire form matches the JSON object the profile backend returns from
//! `/profile` and the guest profile kept in the local store:
//!
//! ```text
//! { id, name, email, isGuest, xp, level, achievements, completedMissions,
//!   totalMissions, hasStartedJourney, unlockedPlanets, avatar?,
//!   perfectMissions?, fastCompletions?, questionsCorrect? }
//! ```
//!
//! The unlock ledger travels separately (`/achievements`, `guestAchievements`)
//! and is attached to the profile by the session.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::achievements::Ledger;

/// XP needed per level.
pub const XP_PER_LEVEL: u64 = 1000;

/// Missions available to a fresh guest.
pub const DEFAULT_TOTAL_MISSIONS: u64 = 3;

/// Display name given to new guests.
pub const GUEST_NAME: &str = "Visitante";

/// Placeholder email for guests.
pub const GUEST_EMAIL: &str = "guest@example.com";

/// Level reached with `xp` experience points.
pub fn level_for_xp(xp: u64) -> u64 {
    xp / XP_PER_LEVEL + 1
}

/// Cumulative play statistics used to evaluate achievement rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserStats {
    pub completed_missions: u64,
    pub total_missions: u64,
    /// Distinct planet ids in unlock order.
    pub unlocked_planets: Vec<u32>,
    pub xp: u64,
    pub level: u64,
    pub perfect_missions: u64,
    pub fast_completions: u64,
    /// Correct answers per question category (e.g. `angles`, `triangles`).
    pub questions_correct: BTreeMap<String, u64>,
}

impl Default for UserStats {
    fn default() -> Self {
        Self {
            completed_missions: 0,
            total_missions: DEFAULT_TOTAL_MISSIONS,
            unlocked_planets: Vec::new(),
            xp: 0,
            level: 1,
            perfect_missions: 0,
            fast_completions: 0,
            questions_correct: BTreeMap::new(),
        }
    }
}

impl UserStats {
    /// Add a planet to the unlocked set.
    ///
    /// Returns `false` if it was already unlocked.
    pub fn unlock_planet(&mut self, planet_id: u32) -> bool {
        if self.unlocked_planets.contains(&planet_id) {
            return false;
        }
        self.unlocked_planets.push(planet_id);
        true
    }

    pub fn total_questions_correct(&self) -> u64 {
        self.questions_correct
            .values()
            .fold(0u64, |total, count| total.saturating_add(*count))
    }

    /// Apply a completed mission: XP, derived level, mission count and the
    /// optional per-mission outcome.
    pub fn record_mission(&mut self, mission_xp: u64, outcome: Option<&MissionStats>) {
        self.xp = self.xp.saturating_add(mission_xp);
        self.level = level_for_xp(self.xp);
        self.completed_missions = self.completed_missions.saturating_add(1);

        if let Some(outcome) = outcome {
            if outcome.is_perfect {
                self.perfect_missions = self.perfect_missions.saturating_add(1);
            }
            if outcome.is_fast {
                self.fast_completions = self.fast_completions.saturating_add(1);
            }
            for (category, count) in &outcome.questions_correct {
                let total = self.questions_correct.entry(category.clone()).or_insert(0);
                *total = total.saturating_add(*count);
            }
        }
    }

    /// XP still missing for the next level.
    pub fn xp_to_next_level(&self) -> u64 {
        XP_PER_LEVEL - self.xp % XP_PER_LEVEL
    }

    pub fn next_level(&self) -> u64 {
        self.level + 1
    }

    /// Completed missions as a fraction of available missions.
    pub fn mission_progress(&self) -> f64 {
        if self.total_missions == 0 {
            return 0.0;
        }
        self.completed_missions as f64 / self.total_missions as f64
    }
}

/// Outcome details reported alongside a mission completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MissionStats {
    pub is_perfect: bool,
    pub is_fast: bool,
    pub questions_correct: BTreeMap<String, u64>,
}

/// Which backend owns a profile.
///
/// A profile keeps its mode for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileMode {
    Authenticated,
    Guest,
}

impl ProfileMode {
    pub fn is_guest(&self) -> bool {
        matches!(self, ProfileMode::Guest)
    }
}

impl Serialize for ProfileMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(self.is_guest())
    }
}

impl<'de> Deserialize<'de> for ProfileMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let is_guest = bool::deserialize(deserializer)?;
        Ok(if is_guest {
            ProfileMode::Guest
        } else {
            ProfileMode::Authenticated
        })
    }
}

fn default_mode() -> ProfileMode {
    ProfileMode::Authenticated
}

/// A user's profile for the duration of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "isGuest", default = "default_mode")]
    pub mode: ProfileMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub has_started_journey: bool,
    /// Cached count of unlocked achievements; the ledger is authoritative.
    #[serde(default)]
    pub achievements: u64,
    #[serde(flatten)]
    pub stats: UserStats,
    #[serde(skip)]
    pub ledger: Ledger,
}

impl UserProfile {
    /// A fresh guest profile created at `created_at_millis` (unix epoch ms).
    pub fn new_guest(created_at_millis: i64, total_missions: u64) -> Self {
        Self {
            id: format!("guest-{}", created_at_millis),
            name: GUEST_NAME.to_string(),
            email: GUEST_EMAIL.to_string(),
            mode: ProfileMode::Guest,
            avatar: None,
            has_started_journey: false,
            achievements: 0,
            stats: UserStats {
                total_missions,
                ..UserStats::default()
            },
            ledger: Ledger::new(),
        }
    }

    pub fn is_guest(&self) -> bool {
        self.mode.is_guest()
    }

    /// Number of unlocked achievements, read from the ledger.
    pub fn achievement_count(&self) -> usize {
        self.ledger.len()
    }

    /// Replace the ledger and refresh the cached counter.
    pub fn set_ledger(&mut self, ledger: Ledger) {
        self.ledger = ledger;
        self.sync_achievement_counter();
    }

    pub fn sync_achievement_counter(&mut self) {
        self.achievements = self.ledger.len() as u64;
    }

    /// Merge statistics returned by the profile backend after a write.
    ///
    /// The backend is authoritative for the fields it returns; identity and
    /// the ledger are kept.
    pub fn merge_remote(&mut self, remote: RemoteUserPatch) {
        if let Some(xp) = remote.xp {
            self.stats.xp = xp;
        }
        if let Some(level) = remote.level {
            self.stats.level = level;
        }
        if let Some(completed) = remote.completed_missions {
            self.stats.completed_missions = completed;
        }
        if let Some(total) = remote.total_missions {
            self.stats.total_missions = total;
        }
        if let Some(planets) = remote.unlocked_planets {
            self.stats.unlocked_planets = planets;
        }
        if let Some(perfect) = remote.perfect_missions {
            self.stats.perfect_missions = perfect;
        }
        if let Some(fast) = remote.fast_completions {
            self.stats.fast_completions = fast;
        }
        if let Some(questions) = remote.questions_correct {
            self.stats.questions_correct = questions;
        }
        if let Some(started) = remote.has_started_journey {
            self.has_started_journey = started;
        }
    }
}

/// Partial user object returned by stat-updating endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteUserPatch {
    pub xp: Option<u64>,
    pub level: Option<u64>,
    pub completed_missions: Option<u64>,
    pub total_missions: Option<u64>,
    pub unlocked_planets: Option<Vec<u32>>,
    pub perfect_missions: Option<u64>,
    pub fast_completions: Option<u64>,
    pub questions_correct: Option<BTreeMap<String, u64>>,
    pub has_started_journey: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_xp() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(999), 1);
        assert_eq!(level_for_xp(1000), 2);
        assert_eq!(level_for_xp(9500), 10);
    }

    #[test]
    fn test_record_mission_accumulates_outcome() {
        let mut stats = UserStats::default();
        let mut outcome = MissionStats {
            is_perfect: true,
            is_fast: false,
            ..MissionStats::default()
        };
        outcome.questions_correct.insert("angles".to_string(), 4);

        stats.record_mission(600, Some(&outcome));
        stats.record_mission(600, Some(&outcome));

        assert_eq!(stats.xp, 1200);
        assert_eq!(stats.level, 2);
        assert_eq!(stats.completed_missions, 2);
        assert_eq!(stats.perfect_missions, 2);
        assert_eq!(stats.fast_completions, 0);
        assert_eq!(stats.questions_correct["angles"], 8);
    }

    #[test]
    fn test_record_mission_saturates_counters() {
        let mut stats = UserStats {
            perfect_missions: u64::MAX,
            fast_completions: u64::MAX,
            ..UserStats::default()
        };
        let mut outcome = MissionStats {
            is_perfect: true,
            is_fast: true,
            ..MissionStats::default()
        };
        outcome.questions_correct.insert("angles".to_string(), u64::MAX);

        stats.record_mission(0, Some(&outcome));
        stats.record_mission(0, Some(&outcome));

        assert_eq!(stats.perfect_missions, u64::MAX);
        assert_eq!(stats.fast_completions, u64::MAX);
        assert_eq!(stats.questions_correct["angles"], u64::MAX);
    }

    #[test]
    fn test_total_questions_correct_saturates() {
        let mut stats = UserStats::default();
        stats.questions_correct.insert("angles".to_string(), u64::MAX);
        stats.questions_correct.insert("triangles".to_string(), 1);
        assert_eq!(stats.total_questions_correct(), u64::MAX);
    }

    #[test]
    fn test_dashboard_figures() {
        let stats = UserStats {
            xp: 2350,
            level: 3,
            completed_missions: 1,
            total_missions: 4,
            ..UserStats::default()
        };
        assert_eq!(stats.xp_to_next_level(), 650);
        assert_eq!(stats.next_level(), 4);
        assert_eq!(stats.mission_progress(), 0.25);

        let empty = UserStats {
            total_missions: 0,
            ..UserStats::default()
        };
        assert_eq!(empty.mission_progress(), 0.0);
    }

    #[test]
    fn test_new_guest_defaults() {
        let guest = UserProfile::new_guest(1_700_000_000_000, DEFAULT_TOTAL_MISSIONS);
        assert_eq!(guest.id, "guest-1700000000000");
        assert_eq!(guest.name, "Visitante");
        assert!(guest.is_guest());
        assert_eq!(guest.stats.level, 1);
        assert_eq!(guest.stats.total_missions, 3);
        assert!(guest.stats.unlocked_planets.is_empty());
    }

    #[test]
    fn test_profile_wire_format() {
        let json = serde_json::json!({
            "id": "user-1",
            "name": "Ada",
            "email": "ada@example.com",
            "xp": 1500,
            "level": 2,
            "achievements": 1,
            "completedMissions": 2,
            "totalMissions": 3,
            "hasStartedJourney": true,
            "unlockedPlanets": [1, 2],
            "questionsCorrect": { "angles": 3 }
        });
        let profile: UserProfile = serde_json::from_value(json).unwrap();
        assert_eq!(profile.mode, ProfileMode::Authenticated);
        assert_eq!(profile.stats.completed_missions, 2);
        assert_eq!(profile.stats.perfect_missions, 0);
        assert_eq!(profile.stats.questions_correct["angles"], 3);

        let out = serde_json::to_value(&profile).unwrap();
        assert_eq!(out["isGuest"], false);
        assert_eq!(out["unlockedPlanets"], serde_json::json!([1, 2]));
        assert!(out.get("ledger").is_none());
    }

    #[test]
    fn test_merge_remote_keeps_identity() {
        let mut profile = UserProfile::new_guest(1, 3);
        profile.mode = ProfileMode::Authenticated;
        profile.merge_remote(RemoteUserPatch {
            perfect_missions: Some(4),
            xp: Some(4200),
            ..RemoteUserPatch::default()
        });
        assert_eq!(profile.id, "guest-1");
        assert_eq!(profile.stats.perfect_missions, 4);
        assert_eq!(profile.stats.xp, 4200);
        assert_eq!(profile.stats.fast_completions, 0);
    }
}
