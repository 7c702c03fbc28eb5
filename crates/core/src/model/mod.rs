mod definition;
mod ids;
mod session;

pub use definition::{
    Choice, CompatibilityRule, DefinitionError, Outcome, Price, QuizDefinition,
    QuizDefinitionDraft, Step,
};
pub use ids::{AchievementId, ChoiceTag, ParseIdError, QuizId};
pub use session::{RecordedChoice, Session, SessionProgress, Subject};
