//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::FlowError;
use quiz_core::battery::BatteryError;
use quiz_core::model::{ChoiceTag, QuizId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

use crate::checkout::PaymentError;

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to encode stored value: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors emitted by `QuizService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizServiceError {
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error(transparent)]
    Battery(#[from] BatteryError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error("unknown battery `{0}`")]
    UnknownBattery(QuizId),
    #[error("quiz `{0}` has no age profile")]
    NotAgeQuiz(QuizId),
    #[error("quiz `{0}` needs an age analysis to finish")]
    NeedsAnalysis(QuizId),
    #[error("quiz `{quiz}` has no outcome for `{tag}`")]
    MissingOutcome { quiz: QuizId, tag: ChoiceTag },
}

/// Errors emitted by `CheckoutService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CheckoutError {
    #[error("unknown quiz `{0}`")]
    UnknownQuiz(QuizId),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
}
