use std::sync::Arc;

use tracing::info;

use quiz_core::Catalog;
use storage::repository::Storage;

use crate::Clock;
use crate::checkout::{CheckoutService, PaymentGateway};
use crate::error::AppServicesError;
use crate::progress_service::ProgressService;
use crate::quiz_service::QuizService;

/// Assembles app-facing services over one catalog and one store.
#[derive(Clone)]
pub struct AppServices {
    catalog: Arc<Catalog>,
    progress: Arc<ProgressService>,
    quiz: Arc<QuizService>,
    checkout: Arc<CheckoutService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails or the
    /// player id cannot be provisioned.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        catalog: Arc<Catalog>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::assemble(storage, clock, catalog, gateway).await
    }

    /// Build services over a throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the player id cannot be provisioned.
    pub async fn in_memory(
        clock: Clock,
        catalog: Arc<Catalog>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Result<Self, AppServicesError> {
        Self::assemble(Storage::in_memory(), clock, catalog, gateway).await
    }

    async fn assemble(
        storage: Storage,
        clock: Clock,
        catalog: Arc<Catalog>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Result<Self, AppServicesError> {
        let progress = Arc::new(ProgressService::new(clock, Arc::clone(&storage.kv)));
        let user_id = progress.user_id().await?;
        info!(user = %user_id, quizzes = catalog.quizzes().count(), "services ready");

        let quiz = Arc::new(QuizService::new(Arc::clone(&catalog), Arc::clone(&progress)));
        let checkout = Arc::new(CheckoutService::new(
            Arc::clone(&catalog),
            Arc::clone(&progress),
            gateway,
        ));

        Ok(Self {
            catalog,
            progress,
            quiz,
            checkout,
        })
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn quiz(&self) -> Arc<QuizService> {
        Arc::clone(&self.quiz)
    }

    #[must_use]
    pub fn checkout(&self) -> Arc<CheckoutService> {
        Arc::clone(&self.checkout)
    }
}
