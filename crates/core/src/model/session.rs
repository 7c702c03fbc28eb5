use serde::{Deserialize, Serialize};

use crate::model::ids::{ChoiceTag, QuizId};

const DEFAULT_SUBJECT_NAME: &str = "Subject X";

//
// ─── SUBJECT ───────────────────────────────────────────────────────────────────
//

/// Who the quiz is about. Relationship-style prompts address either the player
/// or a named person through the `{subject}` placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subject {
    #[default]
    You,
    Named(String),
}

impl Subject {
    /// Builds a named subject. Blank names fall back to `"Subject X"`.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            Self::Named(DEFAULT_SUBJECT_NAME.to_owned())
        } else {
            Self::Named(trimmed.to_owned())
        }
    }

    /// Text substituted for `{subject}` in prompts.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            Self::You => "you",
            Self::Named(name) => name,
        }
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One answered step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedChoice {
    step_index: usize,
    choice_index: usize,
    tag: ChoiceTag,
    weight: i64,
}

impl RecordedChoice {
    #[must_use]
    pub fn new(step_index: usize, choice_index: usize, tag: ChoiceTag, weight: i64) -> Self {
        Self {
            step_index,
            choice_index,
            tag,
            weight,
        }
    }

    #[must_use]
    pub fn step_index(&self) -> usize {
        self.step_index
    }

    #[must_use]
    pub fn choice_index(&self) -> usize {
        self.choice_index
    }

    #[must_use]
    pub fn tag(&self) -> &ChoiceTag {
        &self.tag
    }

    #[must_use]
    pub fn weight(&self) -> i64 {
        self.weight
    }
}

/// An in-progress run through one quiz.
///
/// Sessions are values: the flow controller never mutates one in place, it
/// returns the successor state. The current step index always equals the
/// number of recorded choices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    quiz_id: QuizId,
    subject: Subject,
    step_count: usize,
    recorded: Vec<RecordedChoice>,
    score: i64,
}

impl Session {
    pub(crate) fn new(quiz_id: QuizId, subject: Subject, step_count: usize) -> Self {
        Self {
            quiz_id,
            subject,
            step_count,
            recorded: Vec::with_capacity(step_count),
            score: 0,
        }
    }

    /// Returns the successor session with `choice` appended.
    pub(crate) fn with_choice(&self, choice: RecordedChoice) -> Self {
        let mut next = self.clone();
        next.score = next.score.saturating_add(choice.weight);
        next.recorded.push(choice);
        next
    }

    #[must_use]
    pub fn quiz_id(&self) -> &QuizId {
        &self.quiz_id
    }

    #[must_use]
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    #[must_use]
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// 0-based index of the next step to answer; equals `step_count` when done.
    #[must_use]
    pub fn current_step(&self) -> usize {
        self.recorded.len()
    }

    #[must_use]
    pub fn recorded(&self) -> &[RecordedChoice] {
        &self.recorded
    }

    /// Sum of the recorded weights.
    #[must_use]
    pub fn score(&self) -> i64 {
        self.score
    }

    /// Mean weight per recorded choice, `None` before the first answer.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_weight(&self) -> Option<f64> {
        if self.recorded.is_empty() {
            None
        } else {
            Some(self.score as f64 / self.recorded.len() as f64)
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.current_step() == self.step_count
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let answered = self.recorded.len();
        SessionProgress {
            total: self.step_count,
            answered,
            remaining: self.step_count.saturating_sub(answered),
            is_complete: self.is_complete(),
        }
    }
}

/// Lightweight progress counters for rendering a progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub remaining: usize,
    pub is_complete: bool,
}
