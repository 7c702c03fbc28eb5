#![forbid(unsafe_code)]

pub mod app_services;
pub mod checkout;
pub mod error;
pub mod progress_service;
pub mod quiz_service;

pub use quiz_core::Clock;

pub use app_services::AppServices;
pub use checkout::{
    CheckoutService, PaymentError, PaymentGateway, PaymentReceipt, PurchaseRequest,
    SimulatedGateway, SimulatedOutcome,
};
pub use error::{AppServicesError, CheckoutError, ProgressError, QuizServiceError};
pub use progress_service::{EarnedAchievement, ProgressService, QuizBadge, UnlockRecord};
pub use quiz_service::{
    AgeReport, OutcomeView, PremiumView, QuizReport, QuizService, ResultSnapshot,
};
