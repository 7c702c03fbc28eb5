use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use rand::distr::Alphanumeric;
use thiserror::Error;
use tracing::{info, warn};

use quiz_core::Catalog;
use quiz_core::model::{Price, QuizId};

use crate::error::CheckoutError;
use crate::progress_service::{ProgressService, UnlockRecord};

const TRANSACTION_ID_LEN: usize = 14;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PaymentError {
    #[error("payment was cancelled")]
    Cancelled,
    #[error("payment was declined: {0}")]
    Declined(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRequest {
    pub quiz_id: QuizId,
    pub price: Price,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub transaction_id: String,
}

/// External payment collaborator.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges for `request`.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError` when the player cancels or the charge fails.
    async fn purchase(&self, request: &PurchaseRequest) -> Result<PaymentReceipt, PaymentError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SimulatedOutcome {
    #[default]
    Approve,
    Cancel,
    Decline,
}

/// Gateway that settles every request locally with a fixed outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedGateway {
    outcome: SimulatedOutcome,
}

impl SimulatedGateway {
    #[must_use]
    pub fn new(outcome: SimulatedOutcome) -> Self {
        Self { outcome }
    }

    #[must_use]
    pub fn approving() -> Self {
        Self::new(SimulatedOutcome::Approve)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn purchase(&self, request: &PurchaseRequest) -> Result<PaymentReceipt, PaymentError> {
        match self.outcome {
            SimulatedOutcome::Approve => Ok(PaymentReceipt {
                transaction_id: simulated_transaction_id(),
            }),
            SimulatedOutcome::Cancel => Err(PaymentError::Cancelled),
            SimulatedOutcome::Decline => Err(PaymentError::Declined(format!(
                "card declined for {}",
                request.price
            ))),
        }
    }
}

fn simulated_transaction_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(TRANSACTION_ID_LEN)
        .map(char::from)
        .collect();
    format!("pay_{suffix}")
}

/// Buys premium access: a successful payment unlocks the quiz, anything
/// else leaves progress untouched.
#[derive(Clone)]
pub struct CheckoutService {
    catalog: Arc<Catalog>,
    progress: Arc<ProgressService>,
    gateway: Arc<dyn PaymentGateway>,
}

impl CheckoutService {
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        progress: Arc<ProgressService>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            catalog,
            progress,
            gateway,
        }
    }

    /// Purchases the premium result for `quiz_id`. An already unlocked quiz
    /// returns its existing record without charging again.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::UnknownQuiz` for ids outside the catalog,
    /// `CheckoutError::Payment` when the gateway cancels or declines, and
    /// `CheckoutError::Progress` on storage failures.
    pub async fn purchase(&self, quiz_id: &QuizId) -> Result<UnlockRecord, CheckoutError> {
        let definition = self
            .catalog
            .quiz(quiz_id)
            .ok_or_else(|| CheckoutError::UnknownQuiz(quiz_id.clone()))?;
        if let Some(existing) = self.progress.unlock_record(quiz_id).await? {
            info!(quiz = %quiz_id, "premium already unlocked; skipping payment");
            return Ok(existing);
        }

        let request = PurchaseRequest {
            quiz_id: quiz_id.clone(),
            price: definition.price().clone(),
            user_id: self.progress.user_id().await?,
        };
        let receipt = match self.gateway.purchase(&request).await {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(quiz = %quiz_id, error = %err, "payment did not complete");
                return Err(err.into());
            }
        };
        Ok(self
            .progress
            .unlock(quiz_id, &receipt.transaction_id)
            .await?)
    }

    #[must_use]
    pub fn price(&self, quiz_id: &QuizId) -> Option<&Price> {
        self.catalog.quiz(quiz_id).map(|q| q.price())
    }
}
