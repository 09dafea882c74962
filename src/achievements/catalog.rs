//! The built-in achievement catalog.
//!
//! Order matters: the coordinator scans rules in catalog order, so when
//! several rules unlock at once their ids come back in catalog order.

use std::sync::LazyLock;

use super::{AchievementCategory, AchievementRule, AchievementTier, Condition};

/// Categories in the order the achievements screen lists them.
pub const CATEGORIES: [AchievementCategory; 5] = [
    AchievementCategory::Explorer,
    AchievementCategory::Geometry,
    AchievementCategory::Speedster,
    AchievementCategory::Perfectionist,
    AchievementCategory::Legendary,
];

static CATALOG: LazyLock<Vec<AchievementRule>> = LazyLock::new(build_catalog);

/// All achievement rules, in catalog order.
pub fn catalog() -> &'static [AchievementRule] {
    &CATALOG
}

/// Look up a rule by id.
pub fn get_by_id(id: &str) -> Option<&'static AchievementRule> {
    catalog().iter().find(|rule| rule.id == id)
}

fn rule(
    id: &str,
    title: &str,
    description: &str,
    category: AchievementCategory,
    tier: AchievementTier,
    xp_reward: u64,
    condition: Condition,
) -> AchievementRule {
    AchievementRule {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        category,
        tier,
        xp_reward,
        condition,
        secret_description: None,
    }
}

fn secret(mut rule: AchievementRule, teaser: &str) -> AchievementRule {
    rule.secret_description = Some(teaser.to_string());
    rule
}

fn build_catalog() -> Vec<AchievementRule> {
    use AchievementCategory as Cat;
    use AchievementTier as Tier;

    vec![
        // Explorer
        rule(
            "first-journey",
            "Primeira Jornada",
            "Complete sua primeira missão no Reino da Geometria",
            Cat::Explorer,
            Tier::Bronze,
            100,
            Condition::MissionsCompleted { value: 1 },
        ),
        rule(
            "planet-explorer",
            "Explorador Iniciante",
            "Desbloqueie o Planeta 2",
            Cat::Explorer,
            Tier::Bronze,
            150,
            Condition::PlanetsUnlocked { value: 2 },
        ),
        rule(
            "five-missions",
            "Guerreiro Espacial",
            "Complete 5 missões",
            Cat::Explorer,
            Tier::Silver,
            250,
            Condition::MissionsCompleted { value: 5 },
        ),
        rule(
            "planet-conqueror",
            "Conquistador de Planetas",
            "Desbloqueie todos os 4 planetas",
            Cat::Explorer,
            Tier::Platinum,
            500,
            Condition::PlanetsUnlocked { value: 4 },
        ),
        rule(
            "ten-missions",
            "Veterano Espacial",
            "Complete 10 missões",
            Cat::Explorer,
            Tier::Gold,
            400,
            Condition::MissionsCompleted { value: 10 },
        ),
        // Geometry
        rule(
            "angle-master",
            "Mestre dos Ângulos",
            "Acerte 10 questões sobre ângulos",
            Cat::Geometry,
            Tier::Silver,
            200,
            Condition::QuestionsCorrect {
                value: 10,
                category: Some("angles".to_string()),
            },
        ),
        rule(
            "triangle-expert",
            "Especialista em Triângulos",
            "Acerte 15 questões sobre triângulos",
            Cat::Geometry,
            Tier::Gold,
            400,
            Condition::QuestionsCorrect {
                value: 15,
                category: Some("triangles".to_string()),
            },
        ),
        rule(
            "geometry-prodigy",
            "Prodígio da Geometria",
            "Acerte 50 questões no total",
            Cat::Geometry,
            Tier::Platinum,
            600,
            Condition::QuestionsCorrect {
                value: 50,
                category: None,
            },
        ),
        // Speedster
        rule(
            "speed-of-light",
            "Velocidade da Luz",
            "Complete uma missão em menos de 5 minutos",
            Cat::Speedster,
            Tier::Silver,
            250,
            Condition::FastCompletions { value: 1 },
        ),
        rule(
            "speed-demon",
            "Demônio da Velocidade",
            "Complete 5 missões rapidamente (menos de 5 min cada)",
            Cat::Speedster,
            Tier::Gold,
            400,
            Condition::FastCompletions { value: 5 },
        ),
        // Perfectionist
        rule(
            "perfectionist",
            "Perfeccionista",
            "Complete uma missão com 100% de acerto",
            Cat::Perfectionist,
            Tier::Gold,
            300,
            Condition::PerfectMissions { value: 1 },
        ),
        rule(
            "flawless-five",
            "Cinco Perfeitos",
            "Complete 5 missões com 100% de acerto",
            Cat::Perfectionist,
            Tier::Platinum,
            600,
            Condition::PerfectMissions { value: 5 },
        ),
        // Legendary
        secret(
            rule(
                "all-missions",
                "Lenda de Euklidia",
                "Complete todas as missões disponíveis",
                Cat::Legendary,
                Tier::Legendary,
                1000,
                Condition::AllMissionsComplete { value: 1 },
            ),
            "Complete sua jornada épica e torne-se uma lenda!",
        ),
        secret(
            rule(
                "xp-master",
                "Mestre do XP",
                "Acumule 5000 pontos de XP",
                Cat::Legendary,
                Tier::Legendary,
                1500,
                Condition::XpEarned { value: 5000 },
            ),
            "Acumule pontos de experiência e torne-se um mestre",
        ),
        secret(
            rule(
                "level-10",
                "Elite Espacial",
                "Alcance o nível 10",
                Cat::Legendary,
                Tier::Legendary,
                2000,
                Condition::LevelReached { value: 10 },
            ),
            "Chegue ao topo da hierarquia espacial",
        ),
    ]
}

/// Rules belonging to one category, in catalog order.
pub fn by_category(category: AchievementCategory) -> impl Iterator<Item = &'static AchievementRule> {
    catalog().iter().filter(move |rule| rule.category == category)
}
