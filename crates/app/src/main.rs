//! Terminal runner for the quiz catalog.
//!
//! Wires the catalog, the progress store and a simulated payment gateway
//! together, then plays quizzes over stdin/stdout.

mod cli;
mod console;

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use quiz_core::Catalog;
use quiz_core::analysis::{AnalysisProvider, FixedReading, NoAnalysis, PhotoInput};
use quiz_core::model::{QuizId, Subject};
use services::{AppServices, Clock, QuizBadge, QuizReport, SimulatedGateway, SimulatedOutcome};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let catalog = Arc::new(load_catalog(cli.catalog.as_deref())?);
    let outcome = match &cli.command {
        Command::Unlock { decline: true, .. } => SimulatedOutcome::Decline,
        Command::Unlock { cancel: true, .. } => SimulatedOutcome::Cancel,
        _ => SimulatedOutcome::Approve,
    };
    let app = AppServices::new_sqlite(
        &cli.db,
        Clock::default(),
        catalog,
        Arc::new(SimulatedGateway::new(outcome)),
    )
    .await
    .with_context(|| format!("failed to open progress store at {}", cli.db))?;
    info!(db = %cli.db, "progress store ready");

    let delay = Duration::from_millis(cli.analysis_delay_ms);
    match cli.command {
        Command::List => list(&app),
        Command::Play {
            quiz,
            subject,
            photo,
            face,
        } => {
            let subject = subject.map_or(Subject::You, Subject::named);
            play(&app, &parse_id(&quiz)?, subject, photo, face.as_deref(), delay).await
        }
        Command::Battery { id } => battery(&app, &parse_id(&id)?).await,
        Command::Unlock { quiz, .. } => unlock(&app, &parse_id(&quiz)?).await,
        Command::Status => status(&app).await,
        Command::Sound => {
            let enabled = app.progress().toggle_sound().await?;
            println!("Sound {}", if enabled { "on" } else { "off" });
            Ok(())
        }
        Command::Reset { yes } => {
            if !yes {
                bail!("reset forgets unlocks, play counts and badges; pass --yes to confirm");
            }
            app.progress().reset_progress().await?;
            println!("Progress cleared.");
            Ok(())
        }
    }
}

fn load_catalog(path: Option<&Path>) -> Result<Catalog> {
    let Some(path) = path else {
        return Ok(Catalog::builtin()?);
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog {}", path.display()))?;
    let catalog = Catalog::from_json(&json)
        .with_context(|| format!("invalid catalog {}", path.display()))?;
    debug!(path = %path.display(), "loaded custom catalog");
    Ok(catalog)
}

fn parse_id(raw: &str) -> Result<QuizId> {
    QuizId::new(raw).with_context(|| format!("invalid id `{raw}`"))
}

fn list(app: &AppServices) -> Result<()> {
    let catalog = app.catalog();
    println!("Quizzes:");
    for quiz in catalog.standalone() {
        println!(
            "  {:<10} {} ({} questions, premium {})",
            quiz.id(),
            quiz.title(),
            quiz.step_count(),
            quiz.price()
        );
    }
    println!("Batteries:");
    for battery in catalog.batteries() {
        println!(
            "  {:<18} {} ({} parts)",
            battery.id(),
            battery.title(),
            battery.parts().len()
        );
    }
    Ok(())
}

async fn play(
    app: &AppServices,
    quiz_id: &QuizId,
    subject: Subject,
    photo: Option<PathBuf>,
    face: Option<&str>,
    delay: Duration,
) -> Result<()> {
    let svc = app.quiz();
    let mut input = io::stdin().lock();
    let mut session = svc.start(quiz_id, subject)?;
    while let Some(view) = svc.current_step(&session)? {
        let choice = console::ask(&view, &mut input)?;
        session = svc.answer(&session, view.step_index, choice)?;
    }

    let needs_photo = app
        .catalog()
        .quiz(quiz_id)
        .is_some_and(|quiz| quiz.age_profile().is_some());
    if !needs_photo {
        let report = svc.finish(&session).await?;
        return show(app, &report).await;
    }

    let provider: Box<dyn AnalysisProvider> = match face {
        Some(raw) => Box::new(FixedReading(console::parse_face(raw)?)),
        None => Box::new(NoAnalysis),
    };
    let photo = photo.map(|path| PhotoInput::new(path.display().to_string()));
    if !delay.is_zero() {
        println!("Analyzing...");
        tokio::time::sleep(delay).await;
    }
    let mut rng = rand::rng();
    let age = svc
        .finish_age(&session, provider.as_ref(), photo.as_ref(), &mut rng)
        .await?;
    console::print_age(&age.estimate);
    show(app, &age.report).await
}

async fn battery(app: &AppServices, battery_id: &QuizId) -> Result<()> {
    let svc = app.quiz();
    let mut input = io::stdin().lock();
    let mut progress = svc.start_battery(battery_id)?;
    let parts = app
        .catalog()
        .battery(battery_id)
        .map(|battery| battery.parts().to_vec())
        .unwrap_or_default();

    for part in &parts {
        let mut session = svc.start(part, Subject::You)?;
        while let Some(view) = svc.current_step(&session)? {
            let choice = ask_part(&view, &mut input)?;
            session = svc.answer(&session, view.step_index, choice)?;
        }
        progress = svc.record_battery_part(&progress, &session)?;
        debug!(part = %part, recorded = progress.recorded(), "battery part recorded");
    }

    let report = svc.finish_battery(&progress).await?;
    show(app, &report).await
}

fn ask_part(view: &quiz_core::StepView, input: &mut impl BufRead) -> Result<usize> {
    if view.position == 1 {
        println!();
        println!("--- {} ---", view.quiz_title);
    }
    console::ask(view, input)
}

async fn show(app: &AppServices, report: &QuizReport) -> Result<()> {
    console::print_report(report);
    if !report.new_achievements.is_empty() && app.progress().sound_enabled().await? {
        print!("\x07");
    }
    Ok(())
}

async fn unlock(app: &AppServices, quiz_id: &QuizId) -> Result<()> {
    let price = app
        .checkout()
        .price(quiz_id)
        .cloned()
        .with_context(|| format!("unknown quiz `{quiz_id}`"))?;
    if let Some(existing) = app.progress().unlock_record(quiz_id).await? {
        println!(
            "{quiz_id} is already unlocked (transaction {}).",
            existing.transaction_id
        );
        return Ok(());
    }
    println!("Purchasing the full analysis for {price}...");
    let record = app.checkout().purchase(quiz_id).await?;
    println!("Unlocked {quiz_id} (transaction {}).", record.transaction_id);
    Ok(())
}

async fn status(app: &AppServices) -> Result<()> {
    let progress = app.progress();
    let catalog = app.catalog();
    println!("Player: {}", progress.user_id().await?);
    println!(
        "Sound: {}",
        if progress.sound_enabled().await? { "on" } else { "off" }
    );

    let mut ids = Vec::new();
    println!("Quizzes:");
    for quiz in catalog.standalone() {
        let unlocked = progress.is_unlocked(quiz.id()).await?;
        let plays = progress.completions(quiz.id()).await?;
        let badges: String = progress
            .quiz_badges(quiz.id())
            .await?
            .into_iter()
            .map(QuizBadge::emoji)
            .collect();
        println!(
            "  {:<10} played {plays:>3}  {:<7} {badges}",
            quiz.id(),
            if unlocked { "premium" } else { "free" }
        );
        ids.push(quiz.id().clone());
    }
    if progress.has_full_access(&ids).await? {
        println!("Full access: every quiz unlocked");
    }

    let badges = progress.earned_achievements().await?;
    if badges.is_empty() {
        println!("No badges yet.");
    } else {
        println!("Badges:");
        for badge in &badges {
            println!(
                "  {} {} ({}, {})",
                badge.emoji,
                badge.title,
                badge.quiz_id,
                badge.earned_at.format("%Y-%m-%d")
            );
        }
    }
    Ok(())
}
