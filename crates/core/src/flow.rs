//! The quiz flow controller.
//!
//! Every quiz runs through the same value-in, value-out state machine:
//! `start` yields a fresh `Session`, each `record_choice` returns its
//! successor, and `classify` aggregates a finished one. Misuse fails loudly
//! with a `FlowError`; nothing is clamped.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::classify::Classification;
use crate::model::{QuizDefinition, QuizId, RecordedChoice, Session, Subject};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FlowError {
    #[error("unknown quiz `{0}`")]
    UnknownQuiz(QuizId),

    #[error("choice recorded out of order: expected step {expected}, got {got}")]
    OutOfOrder { expected: usize, got: usize },

    #[error("quiz is already complete")]
    AlreadyComplete,

    #[error("choice {choice} is out of range for step {step} ({available} available)")]
    ChoiceOutOfRange {
        step: usize,
        choice: usize,
        available: usize,
    },

    #[error("quiz is incomplete ({answered} of {total} steps answered)")]
    Incomplete { answered: usize, total: usize },

    #[error("session for `{quiz}` has {session} steps but the definition has {definition}")]
    DefinitionMismatch {
        quiz: QuizId,
        session: usize,
        definition: usize,
    },
}

/// Read-only view of the step a session is waiting on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepView {
    pub quiz_id: QuizId,
    pub quiz_title: String,
    pub step_index: usize,
    /// 1-based position for display.
    pub position: usize,
    pub total: usize,
    pub category: Option<String>,
    pub prompt: String,
    pub choices: Vec<ChoiceView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceView {
    pub label: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QuizFlow {
    catalog: Arc<Catalog>,
}

impl QuizFlow {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Starts a fresh session for `quiz_id`.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::UnknownQuiz` if the catalog has no such quiz.
    pub fn start(&self, quiz_id: &QuizId, subject: Subject) -> Result<Session, FlowError> {
        let definition = self.definition(quiz_id)?;
        Ok(Session::new(
            definition.id().clone(),
            subject,
            definition.step_count(),
        ))
    }

    /// Records `choice_index` at `step_index` and returns the next session.
    ///
    /// # Errors
    ///
    /// Returns `FlowError` if the session is already complete, `step_index`
    /// is not the current step, or `choice_index` is out of range. `session`
    /// itself is never modified.
    pub fn record_choice(
        &self,
        session: &Session,
        step_index: usize,
        choice_index: usize,
    ) -> Result<Session, FlowError> {
        let definition = self.definition_for(session)?;
        if session.is_complete() {
            return Err(FlowError::AlreadyComplete);
        }
        let expected = session.current_step();
        if step_index != expected {
            return Err(FlowError::OutOfOrder {
                expected,
                got: step_index,
            });
        }
        let step = definition
            .step(step_index)
            .ok_or(FlowError::AlreadyComplete)?;
        let choice = step
            .choice(choice_index)
            .ok_or(FlowError::ChoiceOutOfRange {
                step: step_index,
                choice: choice_index,
                available: step.choices().len(),
            })?;

        Ok(session.with_choice(RecordedChoice::new(
            step_index,
            choice_index,
            choice.tag().clone(),
            choice.weight(),
        )))
    }

    #[must_use]
    pub fn is_complete(session: &Session) -> bool {
        session.is_complete()
    }

    /// Classifies a finished session.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Incomplete` if steps remain unanswered.
    pub fn classify(&self, session: &Session) -> Result<Classification, FlowError> {
        let definition = self.definition_for(session)?;
        let incomplete = || FlowError::Incomplete {
            answered: session.current_step(),
            total: session.step_count(),
        };
        if !session.is_complete() {
            return Err(incomplete());
        }
        definition.classify(session.recorded()).ok_or_else(incomplete)
    }

    /// View of the current step, or `None` once the session is complete.
    ///
    /// # Errors
    ///
    /// Returns `FlowError` if the session's quiz is not in the catalog.
    pub fn snapshot(&self, session: &Session) -> Result<Option<StepView>, FlowError> {
        let definition = self.definition_for(session)?;
        let index = session.current_step();
        let Some(step) = definition.step(index) else {
            return Ok(None);
        };

        Ok(Some(StepView {
            quiz_id: definition.id().clone(),
            quiz_title: definition.title().to_owned(),
            step_index: index,
            position: index + 1,
            total: definition.step_count(),
            category: step.category().map(str::to_owned),
            prompt: step.prompt_for(session.subject()),
            choices: step
                .choices()
                .iter()
                .map(|c| ChoiceView {
                    label: c.label().to_owned(),
                    detail: c.detail().map(str::to_owned),
                })
                .collect(),
        }))
    }

    fn definition(&self, quiz_id: &QuizId) -> Result<&QuizDefinition, FlowError> {
        self.catalog
            .quiz(quiz_id)
            .ok_or_else(|| FlowError::UnknownQuiz(quiz_id.clone()))
    }

    fn definition_for(&self, session: &Session) -> Result<&QuizDefinition, FlowError> {
        let definition = self.definition(session.quiz_id())?;
        if definition.step_count() != session.step_count() {
            return Err(FlowError::DefinitionMismatch {
                quiz: session.quiz_id().clone(),
                session: session.step_count(),
                definition: definition.step_count(),
            });
        }
        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow() -> QuizFlow {
        QuizFlow::new(Arc::new(Catalog::builtin().unwrap()))
    }

    fn id(raw: &str) -> QuizId {
        QuizId::new(raw).unwrap()
    }

    fn play(flow: &QuizFlow, quiz: &str, choices: &[usize]) -> Session {
        choices
            .iter()
            .enumerate()
            .fold(flow.start(&id(quiz), Subject::You).unwrap(), |s, (step, c)| {
                flow.record_choice(&s, step, *c).unwrap()
            })
    }

    #[test]
    fn unknown_quiz_fails_to_start() {
        assert_eq!(
            flow().start(&id("horoscope"), Subject::You),
            Err(FlowError::UnknownQuiz(id("horoscope")))
        );
    }

    #[test]
    fn completion_implies_all_steps_recorded() {
        let flow = flow();
        for quiz in flow.catalog().quizzes() {
            let mut session = flow.start(quiz.id(), Subject::You).unwrap();
            while !QuizFlow::is_complete(&session) {
                session = flow
                    .record_choice(&session, session.current_step(), 0)
                    .unwrap();
            }
            assert_eq!(session.current_step(), quiz.step_count());
            assert_eq!(session.recorded().len(), quiz.step_count());
        }
    }

    #[test]
    fn out_of_order_choice_leaves_session_unchanged() {
        let flow = flow();
        let session = play(&flow, "toxic", &[0, 1]);
        let before = session.clone();

        assert_eq!(
            flow.record_choice(&session, 1, 0),
            Err(FlowError::OutOfOrder { expected: 2, got: 1 })
        );
        assert_eq!(
            flow.record_choice(&session, 3, 0),
            Err(FlowError::OutOfOrder { expected: 2, got: 3 })
        );
        assert_eq!(session, before);
    }

    #[test]
    fn choice_index_out_of_range_is_rejected() {
        let flow = flow();
        let session = flow.start(&id("toxic"), Subject::You).unwrap();
        assert_eq!(
            flow.record_choice(&session, 0, 3),
            Err(FlowError::ChoiceOutOfRange {
                step: 0,
                choice: 3,
                available: 3
            })
        );
    }

    #[test]
    fn complete_session_rejects_more_choices() {
        let flow = flow();
        let session = play(&flow, "toxic", &[0, 0, 0, 0, 0]);
        assert_eq!(flow.record_choice(&session, 5, 0), Err(FlowError::AlreadyComplete));
    }

    #[test]
    fn classify_requires_completion() {
        let flow = flow();
        let session = play(&flow, "character", &[0, 1]);
        assert_eq!(
            flow.classify(&session),
            Err(FlowError::Incomplete { answered: 2, total: 5 })
        );
    }

    #[test]
    fn redflags_extremes_hit_outer_bands() {
        let flow = flow();
        let best = flow.classify(&play(&flow, "redflags", &[0; 8])).unwrap();
        assert_eq!(best.tag().as_str(), "low_risk");
        assert_eq!(best.measure().value(), 100.0);

        let worst = flow.classify(&play(&flow, "redflags", &[2; 8])).unwrap();
        assert_eq!(worst.tag().as_str(), "high_risk");
        assert_eq!(worst.measure().value(), 25.0);
        assert_eq!(worst.tally().count(&"red".parse().unwrap()), 8);
    }

    #[test]
    fn redflags_mixed_answers_band_by_percent() {
        let flow = flow();
        // 4 green, 2 yellow, 2 red: 400 + 100 - 100 = 400 -> 75%
        let result = flow
            .classify(&play(&flow, "redflags", &[0, 0, 0, 0, 1, 1, 2, 2]))
            .unwrap();
        assert_eq!(result.tag().as_str(), "low_risk");

        // 2 green, 4 yellow, 2 red: 200 + 200 - 100 = 300 -> 69%
        let result = flow
            .classify(&play(&flow, "redflags", &[0, 0, 1, 1, 1, 1, 2, 2]))
            .unwrap();
        assert_eq!(result.tag().as_str(), "moderate_risk");
    }

    #[test]
    fn toxic_extremes_hit_outer_bands() {
        let flow = flow();
        let calm = flow.classify(&play(&flow, "toxic", &[0; 5])).unwrap();
        assert_eq!(calm.tag().as_str(), "saint");
        let chaos = flow.classify(&play(&flow, "toxic", &[2; 5])).unwrap();
        assert_eq!(chaos.tag().as_str(), "chaos_agent");
    }

    #[test]
    fn character_plurality_with_tie() {
        let flow = flow();
        // hero, romantic, hero, romantic, comic
        let result = flow
            .classify(&play(&flow, "character", &[0, 1, 0, 1, 2]))
            .unwrap();
        assert_eq!(result.tag().as_str(), "hero");
    }

    #[test]
    fn identical_sequences_classify_identically() {
        let flow = flow();
        let a = play(&flow, "internet", &[0, 1, 2, 3, 0]);
        let b = play(&flow, "internet", &[0, 1, 2, 3, 0]);
        assert_eq!(flow.classify(&a), flow.classify(&b));
    }

    #[test]
    fn snapshot_renders_subject_and_position() {
        let flow = flow();
        let session = flow
            .start(&id("redflags"), Subject::named("Kabir"))
            .unwrap();
        let view = flow.snapshot(&session).unwrap().unwrap();

        assert_eq!(view.position, 1);
        assert_eq!(view.total, 8);
        assert_eq!(view.category.as_deref(), Some("Communication Analysis"));
        assert!(view.prompt.contains("Kabir"));
        assert_eq!(view.choices.len(), 3);

        let done = play(&flow, "age", &[5]);
        assert_eq!(flow.snapshot(&done).unwrap(), None);
    }
}
