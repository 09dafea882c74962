//! kubrick-progress - Command line entry point
//!
//! Drives a progress session from the terminal: resumes the stored account
//! (or the local guest), applies one change and prints what it unlocked.

use clap::{Parser, Subcommand};
use kubrick_progress::achievements::get_by_id;
use kubrick_progress::util::parse_question_counts;
use kubrick_progress::{Config, MissionStats, Session};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "kubrick-progress")]
#[command(about = "Kubrick achievements and progress sync")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the profile and level progress
    Status,
    /// List every achievement with its progress
    Achievements,
    /// Unlock achievements whose conditions are already met
    Check,
    /// Record a finished mission
    CompleteMission {
        /// XP earned in the mission
        xp: u64,
        /// Every question answered correctly
        #[arg(long)]
        perfect: bool,
        /// Finished under the time limit
        #[arg(long)]
        fast: bool,
        /// Correct answers per category, e.g. `angles=3,triangles=2`
        #[arg(long, value_name = "COUNTS")]
        questions: Option<String>,
    },
    /// Unlock a planet
    UnlockPlanet { id: u32 },
    /// Change the display name
    Rename { name: String },
    /// Change the avatar
    Avatar { id: String },
    /// Sign in with email and password
    Login { email: String, password: String },
    /// Create an account and sign in
    Register {
        username: String,
        email: String,
        password: String,
    },
    /// Sign out (guests lose their local progress)
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kubrick_progress=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: online={}, data_dir={}",
        config.remote.is_some(),
        config.data_dir.display()
    );

    let mut session = Session::from_config(&config).await?;

    let signs_in = matches!(cli.command, Command::Login { .. } | Command::Register { .. });
    if signs_in && !session.online_available() {
        anyhow::bail!("Online accounts are not configured; set SUPABASE_URL and SUPABASE_ANON_KEY");
    }
    if !signs_in {
        let mode = session.resume_or_guest().await?;
        info!("Session resumed in {} mode", mode);
    }

    run(&mut session, cli.command).await
}

async fn run(session: &mut Session, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Status => print_status(session),
        Command::Achievements => print_achievements(session),
        Command::Check => print_unlocked(&session.check_achievements().await),
        Command::CompleteMission {
            xp,
            perfect,
            fast,
            questions,
        } => {
            let questions_correct = match questions {
                Some(raw) => parse_question_counts(&raw).map_err(anyhow::Error::msg)?,
                None => Default::default(),
            };
            let stats = (perfect || fast || !questions_correct.is_empty()).then(|| MissionStats {
                is_perfect: perfect,
                is_fast: fast,
                questions_correct,
            });
            let unlocked = session.complete_mission(xp, stats).await;
            print_unlocked(&unlocked);
            print_status(session);
        }
        Command::UnlockPlanet { id } => {
            let unlocked = session.unlock_planet(id).await;
            print_unlocked(&unlocked);
        }
        Command::Rename { name } => {
            session.update_user_name(&name).await;
            print_status(session);
        }
        Command::Avatar { id } => {
            session.update_user_avatar(&id).await;
            print_status(session);
        }
        Command::Logout => {
            session.logout().await;
            println!("Signed out.");
        }
        Command::Login { email, password } => {
            session.login(&email, &password).await?;
            print_status(session);
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            session.register(&username, &email, &password).await?;
            print_status(session);
        }
    }
    Ok(())
}

fn print_status(session: &Session) {
    let Some(profile) = session.profile() else {
        println!("Not signed in.");
        return;
    };
    let stats = &profile.stats;

    println!("{} <{}> [{}]", profile.name, profile.email, session.mode());
    println!(
        "Level {} - {} XP ({} XP to level {})",
        stats.level,
        stats.xp,
        stats.xp_to_next_level(),
        stats.next_level()
    );
    println!(
        "Missions: {}/{} ({:.0}%)",
        stats.completed_missions,
        stats.total_missions,
        stats.mission_progress() * 100.0
    );
    println!("Planets: {:?}", stats.unlocked_planets);
    println!(
        "Achievements: {} ({} XP in rewards)",
        profile.achievement_count(),
        profile.ledger.total_xp_reward()
    );
    for rule in profile
        .ledger
        .recent(3)
        .filter_map(|record| get_by_id(&record.achievement_id))
    {
        println!("Recent: {}", rule.title);
    }
}

fn print_achievements(session: &Session) {
    for status in session.achievement_statuses() {
        let unlocked = status.unlocked.is_some();
        println!(
            "[{}] {} ({}, {}) {}/{}",
            if unlocked { "x" } else { " " },
            status.rule.title,
            status.rule.category.label(),
            status.rule.tier.label(),
            status.progress.current,
            status.progress.total
        );
        println!("    {}", status.rule.display_description(unlocked));
    }
}

fn print_unlocked(ids: &[String]) {
    if ids.is_empty() {
        println!("No new achievements.");
        return;
    }
    for rule in ids.iter().filter_map(|id| get_by_id(id)) {
        println!("Achievement unlocked: {} (+{} XP)", rule.title, rule.xp_reward);
    }
}
