use std::sync::Arc;

use quiz_core::Catalog;
use quiz_core::analysis::{FaceReading, FixedReading, NoAnalysis, PhotoInput};
use quiz_core::model::{QuizId, Session, Subject};
use quiz_core::time::fixed_clock;
use rand::SeedableRng;
use rand::rngs::StdRng;
use services::{AppServices, QuizService, QuizServiceError, SimulatedGateway};

fn quiz(raw: &str) -> QuizId {
    QuizId::new(raw).unwrap()
}

async fn services() -> AppServices {
    AppServices::in_memory(
        fixed_clock(),
        Arc::new(Catalog::builtin().unwrap()),
        Arc::new(SimulatedGateway::approving()),
    )
    .await
    .unwrap()
}

fn play(svc: &QuizService, quiz_id: &str, pick: impl Fn(usize) -> usize) -> Session {
    let mut session = svc.start(&quiz(quiz_id), Subject::You).unwrap();
    while let Some(step) = svc.current_step(&session).unwrap() {
        session = svc.answer(&session, step.step_index, pick(step.step_index)).unwrap();
    }
    session
}

fn badge_ids(report: &services::QuizReport) -> Vec<String> {
    report
        .new_achievements
        .iter()
        .map(|a| a.id.as_str().to_owned())
        .collect()
}

#[tokio::test]
async fn finishing_awards_badges_once_and_counts_plays() {
    let app = services().await;
    let svc = app.quiz();

    let session = play(&svc, "character", |_| 0);
    let first = svc.finish(&session).await.unwrap();
    assert_eq!(first.result.classification.tag().as_str(), "hero");
    assert_eq!(first.completions, 1);
    assert_eq!(badge_ids(&first), vec!["pure_character", "born_leader"]);

    let second = svc.finish(&session).await.unwrap();
    assert_eq!(second.completions, 2);
    assert!(second.new_achievements.is_empty());
    assert_eq!(app.progress().earned_achievements().await.unwrap().len(), 2);
}

#[tokio::test]
async fn premium_lines_appear_only_after_unlock() {
    let app = services().await;
    let svc = app.quiz();
    let session = play(&svc, "toxic", |_| 2);

    let locked = svc.finish(&session).await.unwrap();
    assert_eq!(locked.result.outcome.as_ref().unwrap().tag.as_str(), "chaos_agent");
    assert!(!locked.result.is_premium());

    app.checkout().purchase(&quiz("toxic")).await.unwrap();
    let unlocked = svc.finish(&session).await.unwrap();
    assert!(unlocked.result.is_premium());
    assert!(!unlocked.result.premium.unwrap().lines.is_empty());
}

#[tokio::test]
async fn red_flag_premium_reports_compatibility() {
    let app = services().await;
    let svc = app.quiz();
    app.checkout().purchase(&quiz("redflags")).await.unwrap();

    // Three red flags (index 2), the rest green.
    let session = play(&svc, "redflags", |step| if step < 3 { 2 } else { 0 });
    let report = svc.finish(&session).await.unwrap();
    assert_eq!(report.result.premium.unwrap().compatibility, Some(55));

    let all_red = svc.finish(&play(&svc, "redflags", |_| 2)).await.unwrap();
    assert_eq!(all_red.result.premium.unwrap().compatibility, Some(20));

    app.checkout().purchase(&quiz("toxic")).await.unwrap();
    let toxic = svc.finish(&play(&svc, "toxic", |_| 0)).await.unwrap();
    assert_eq!(toxic.result.premium.unwrap().compatibility, None);
}

#[tokio::test]
async fn extremes_land_in_outer_bands() {
    let app = services().await;
    let svc = app.quiz();

    let calm = svc.finish(&play(&svc, "toxic", |_| 0)).await.unwrap();
    assert_eq!(calm.result.classification.tag().as_str(), "saint");

    let green = svc.finish(&play(&svc, "redflags", |_| 0)).await.unwrap();
    assert_eq!(green.result.classification.measure().value(), 100.0);
    assert!(badge_ids(&green).contains(&"perfect_case".to_owned()));
}

#[tokio::test]
async fn reset_clears_progress_but_not_a_live_session() {
    let app = services().await;
    let svc = app.quiz();
    let progress = app.progress();

    app.checkout().purchase(&quiz("character")).await.unwrap();
    svc.finish(&play(&svc, "character", |_| 0)).await.unwrap();
    let sound = progress.toggle_sound().await.unwrap();

    let live = svc.start(&quiz("character"), Subject::named("Ayesha")).unwrap();
    let live = svc.answer(&live, 0, 1).unwrap();

    assert!(progress.reset_progress().await.unwrap() > 0);
    assert!(!progress.is_unlocked(&quiz("character")).await.unwrap());
    assert_eq!(progress.completions(&quiz("character")).await.unwrap(), 0);
    assert!(progress.earned_achievements().await.unwrap().is_empty());
    assert_eq!(progress.sound_enabled().await.unwrap(), sound);

    let next = svc.answer(&live, 1, 1).unwrap();
    assert_eq!(next.current_step(), 2);
    assert_eq!(next.subject().display_name(), "Ayesha");
}

#[tokio::test]
async fn age_quiz_uses_face_reading_when_detected() {
    let app = services().await;
    let svc = app.quiz();
    let session = play(&svc, "age", |_| 0);

    assert!(matches!(
        svc.finish(&session).await,
        Err(QuizServiceError::NeedsAnalysis(_))
    ));

    let provider = FixedReading(FaceReading::new(300.0, 300.0).unwrap());
    let photo = PhotoInput::new("selfie.jpg");
    let mut rng = StdRng::seed_from_u64(7);
    let age = svc
        .finish_age(&session, &provider, Some(&photo), &mut rng)
        .await
        .unwrap();

    assert!(age.estimate.detected);
    assert!((18..=23).contains(&age.estimate.years));
    assert_eq!(age.estimate.band.as_str(), "young");
    assert_eq!(
        age.report.result.outcome.as_ref().unwrap().tag.as_str(),
        "young"
    );
    assert_eq!(badge_ids(&age.report), vec!["youthful", "glamorous"]);
}

#[tokio::test]
async fn age_quiz_falls_back_when_analysis_fails() {
    let app = services().await;
    let svc = app.quiz();
    let session = play(&svc, "age", |_| 5);
    let mut rng = StdRng::seed_from_u64(11);

    let age = svc
        .finish_age(&session, &NoAnalysis, Some(&PhotoInput::new("blurry.jpg")), &mut rng)
        .await
        .unwrap();
    assert!(!age.estimate.detected);
    assert!((20..=34).contains(&age.estimate.years));

    let no_photo = svc
        .finish_age(&session, &NoAnalysis, None, &mut rng)
        .await
        .unwrap();
    assert!(!no_photo.estimate.detected);
    assert_eq!(no_photo.report.completions, 2);
}

#[tokio::test]
async fn battery_uses_outcomes_and_unlock_of_its_source_quiz() {
    let app = services().await;
    let svc = app.quiz();
    let battery_id = quiz("future.life");

    let mut progress = svc.start_battery(&battery_id).unwrap();
    let parts: Vec<QuizId> = app.catalog().battery(&battery_id).unwrap().parts().to_vec();
    for part in &parts {
        let session = play(&svc, part.as_str(), |_| 0);
        progress = svc.record_battery_part(&progress, &session).unwrap();
    }
    assert!(progress.is_complete());

    let report = svc.finish_battery(&progress).await.unwrap();
    assert_eq!(report.result.quiz_id, battery_id);
    assert_eq!(report.result.outcome.as_ref().unwrap().tag.as_str(), "leader");
    assert!(!report.result.is_premium());
    assert_eq!(app.progress().completions(&battery_id).await.unwrap(), 1);

    app.checkout().purchase(&quiz("future")).await.unwrap();
    let unlocked = svc.finish_battery(&progress).await.unwrap();
    assert!(unlocked.result.is_premium());
}

#[tokio::test]
async fn unfinished_battery_cannot_be_classified() {
    let app = services().await;
    let svc = app.quiz();
    let progress = svc.start_battery(&quiz("internet.platforms")).unwrap();
    let session = play(&svc, "internet.whatsapp", |_| 3);
    let progress = svc.record_battery_part(&progress, &session).unwrap();

    assert!(matches!(
        svc.finish_battery(&progress).await,
        Err(QuizServiceError::Battery(_))
    ));
}
