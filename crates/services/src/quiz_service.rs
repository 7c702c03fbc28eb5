use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, warn};

use quiz_core::achievements::{self, AchievementContext};
use quiz_core::analysis::{AgeEstimate, AnalysisProvider, PhotoInput};
use quiz_core::battery::BatteryProgress;
use quiz_core::model::{ChoiceTag, Outcome, Price, QuizDefinition, QuizId, Session, Subject};
use quiz_core::{Catalog, Classification, FlowError, QuizFlow, StepView};

use crate::error::QuizServiceError;
use crate::progress_service::{EarnedAchievement, ProgressService};

//
// ─── RESULT SNAPSHOTS ──────────────────────────────────────────────────────────
//

/// The free part of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeView {
    pub tag: ChoiceTag,
    pub emoji: String,
    pub title: String,
    pub summary: String,
}

/// The paid part of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PremiumView {
    pub lines: Vec<String>,
    /// Percentage derived from the answers, for quizzes that define one.
    pub compatibility: Option<i64>,
}

/// Read-only result handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSnapshot {
    pub quiz_id: QuizId,
    pub title: String,
    pub classification: Classification,
    /// `None` for battery parts, which have no result content of their own.
    pub outcome: Option<OutcomeView>,
    /// Present only once the quiz is unlocked.
    pub premium: Option<PremiumView>,
    pub price: Price,
}

impl ResultSnapshot {
    #[must_use]
    pub fn is_premium(&self) -> bool {
        self.premium.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizReport {
    pub result: ResultSnapshot,
    pub new_achievements: Vec<EarnedAchievement>,
    pub completions: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeReport {
    pub estimate: AgeEstimate,
    pub report: QuizReport,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Runs quizzes through the flow controller and settles finished sessions
/// against persisted progress.
#[derive(Clone)]
pub struct QuizService {
    flow: QuizFlow,
    progress: Arc<ProgressService>,
}

impl QuizService {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, progress: Arc<ProgressService>) -> Self {
        Self {
            flow: QuizFlow::new(catalog),
            progress,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        self.flow.catalog()
    }

    /// # Errors
    ///
    /// Returns `QuizServiceError::Flow` for unknown quizzes.
    pub fn start(&self, quiz_id: &QuizId, subject: Subject) -> Result<Session, QuizServiceError> {
        let session = self.flow.start(quiz_id, subject)?;
        debug!(quiz = %quiz_id, steps = session.step_count(), "session started");
        Ok(session)
    }

    /// # Errors
    ///
    /// Returns `QuizServiceError::Flow` for out-of-order or out-of-range
    /// choices.
    pub fn answer(
        &self,
        session: &Session,
        step_index: usize,
        choice_index: usize,
    ) -> Result<Session, QuizServiceError> {
        Ok(self.flow.record_choice(session, step_index, choice_index)?)
    }

    /// # Errors
    ///
    /// Returns `QuizServiceError::Flow` if the session's quiz is unknown.
    pub fn current_step(&self, session: &Session) -> Result<Option<StepView>, QuizServiceError> {
        Ok(self.flow.snapshot(session)?)
    }

    /// Classifies a finished session, bumps its play counter and awards any
    /// badges it earned.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError` if the session is incomplete, belongs to a
    /// quiz that needs age analysis, or progress cannot be stored.
    pub async fn finish(&self, session: &Session) -> Result<QuizReport, QuizServiceError> {
        let definition = self.definition(session.quiz_id())?;
        if definition.age_profile().is_some() {
            return Err(QuizServiceError::NeedsAnalysis(definition.id().clone()));
        }
        let classification = self.flow.classify(session)?;
        let outcome_tag = classification.tag().clone();
        self.settle(definition, classification, &outcome_tag, None).await
    }

    /// Finishes the age quiz: runs `provider` on `photo`, falls back to a
    /// random age when analysis is unavailable, and bands the estimate.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::NotAgeQuiz` for quizzes without an age
    /// profile, plus the errors of [`QuizService::finish`]. Provider failures
    /// are not errors.
    pub async fn finish_age<R: Rng + ?Sized>(
        &self,
        session: &Session,
        provider: &dyn AnalysisProvider,
        photo: Option<&PhotoInput>,
        rng: &mut R,
    ) -> Result<AgeReport, QuizServiceError> {
        let definition = self.definition(session.quiz_id())?;
        let profile = definition
            .age_profile()
            .ok_or_else(|| QuizServiceError::NotAgeQuiz(definition.id().clone()))?;
        let classification = self.flow.classify(session)?;

        let reading = photo.and_then(|photo| match provider.analyze(photo) {
            Ok(reading) => Some(reading),
            Err(err) => {
                warn!(
                    photo = photo.label(),
                    error = %err,
                    "face analysis failed; using fallback age"
                );
                None
            }
        });
        let estimate = profile.estimate(session.score(), reading.as_ref(), rng);
        debug!(years = estimate.years, detected = estimate.detected, "age estimated");

        let band = estimate.band.clone();
        let report = self
            .settle(definition, classification, &band, Some(estimate.years))
            .await?;
        Ok(AgeReport { estimate, report })
    }

    // ─── Batteries ─────────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns `QuizServiceError::UnknownBattery` if no battery has this id.
    pub fn start_battery(&self, battery_id: &QuizId) -> Result<BatteryProgress, QuizServiceError> {
        let battery = self
            .catalog()
            .battery(battery_id)
            .ok_or_else(|| QuizServiceError::UnknownBattery(battery_id.clone()))?;
        Ok(BatteryProgress::new(battery))
    }

    /// # Errors
    ///
    /// Returns `QuizServiceError::Battery` if the session is not a finished
    /// part of this battery.
    pub fn record_battery_part(
        &self,
        progress: &BatteryProgress,
        session: &Session,
    ) -> Result<BatteryProgress, QuizServiceError> {
        let battery = self
            .catalog()
            .battery(progress.battery_id())
            .ok_or_else(|| QuizServiceError::UnknownBattery(progress.battery_id().clone()))?;
        Ok(progress.record_part(battery, session)?)
    }

    /// Classifies a finished battery. Premium content follows the unlock
    /// state of the quiz the battery takes its outcomes from.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError` if parts are missing or progress cannot be
    /// stored.
    pub async fn finish_battery(
        &self,
        progress: &BatteryProgress,
    ) -> Result<QuizReport, QuizServiceError> {
        let battery = self
            .catalog()
            .battery(progress.battery_id())
            .ok_or_else(|| QuizServiceError::UnknownBattery(progress.battery_id().clone()))?;
        let classification = progress.classify(battery)?;
        let source = self.definition(battery.outcomes_from())?;
        let outcome = source.outcome(classification.tag()).ok_or_else(|| {
            QuizServiceError::MissingOutcome {
                quiz: source.id().clone(),
                tag: classification.tag().clone(),
            }
        })?;

        let unlocked = self.progress.is_unlocked(source.id()).await?;
        let completions = self.progress.record_completion(battery.id()).await?;
        let tag = classification.tag().clone();
        Ok(QuizReport {
            result: ResultSnapshot {
                quiz_id: battery.id().clone(),
                title: battery.title().to_owned(),
                outcome: Some(outcome_view(&tag, outcome)),
                premium: unlocked.then(|| premium_view(outcome, None)),
                classification,
                price: source.price().clone(),
            },
            new_achievements: Vec::new(),
            completions,
        })
    }

    // ─── Helpers ───────────────────────────────────────────────────────────────

    fn definition(&self, quiz_id: &QuizId) -> Result<&QuizDefinition, QuizServiceError> {
        self.catalog()
            .quiz(quiz_id)
            .ok_or_else(|| FlowError::UnknownQuiz(quiz_id.clone()).into())
    }

    async fn settle(
        &self,
        definition: &QuizDefinition,
        classification: Classification,
        outcome_tag: &ChoiceTag,
        estimated_age: Option<i64>,
    ) -> Result<QuizReport, QuizServiceError> {
        let outcome = if definition.has_outcomes() {
            let outcome = definition.outcome(outcome_tag).ok_or_else(|| {
                QuizServiceError::MissingOutcome {
                    quiz: definition.id().clone(),
                    tag: outcome_tag.clone(),
                }
            })?;
            Some(outcome)
        } else {
            None
        };

        let earned = achievements::evaluate(
            definition.achievements(),
            &AchievementContext {
                classification: &classification,
                estimated_age,
            },
        );
        let new_achievements = self.progress.award(definition.id(), &earned).await?;
        let completions = self.progress.record_completion(definition.id()).await?;
        let unlocked = self.progress.is_unlocked(definition.id()).await?;
        let compatibility = definition
            .compatibility()
            .map(|rule| rule.score(classification.tally()));

        Ok(QuizReport {
            result: ResultSnapshot {
                quiz_id: definition.id().clone(),
                title: definition.title().to_owned(),
                outcome: outcome.map(|o| outcome_view(outcome_tag, o)),
                premium: outcome
                    .filter(|_| unlocked)
                    .map(|o| premium_view(o, compatibility)),
                classification,
                price: definition.price().clone(),
            },
            new_achievements,
            completions,
        })
    }
}

fn outcome_view(tag: &ChoiceTag, outcome: &Outcome) -> OutcomeView {
    OutcomeView {
        tag: tag.clone(),
        emoji: outcome.emoji().to_owned(),
        title: outcome.title().to_owned(),
        summary: outcome.summary().to_owned(),
    }
}

fn premium_view(outcome: &Outcome, compatibility: Option<i64>) -> PremiumView {
    PremiumView {
        lines: outcome.premium().to_vec(),
        compatibility,
    }
}
