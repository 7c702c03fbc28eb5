//! Domain core for the personality quiz widgets: definitions, sessions,
//! classification and the flow controller that ties them together.

#![forbid(unsafe_code)]

pub mod achievements;
pub mod analysis;
pub mod battery;
pub mod catalog;
pub mod classify;
pub mod flow;
pub mod model;
pub mod time;

pub use catalog::{Catalog, CatalogError};
pub use classify::{Classification, Measure};
pub use flow::{FlowError, QuizFlow, StepView};
pub use time::Clock;
