//! Quiz and battery definitions loaded from JSON.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use thiserror::Error;

use crate::battery::{BatteryDefinition, BatteryDraft, BatteryError};
use crate::model::{ChoiceTag, DefinitionError, QuizDefinition, QuizDefinitionDraft, QuizId};

const BUILTIN_CATALOG: &str = include_str!("../content/catalog.json");

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("quiz `{id}` is invalid: {source}")]
    Definition {
        id: QuizId,
        #[source]
        source: DefinitionError,
    },

    #[error(transparent)]
    Battery(#[from] BatteryError),

    #[error("id `{0}` is defined more than once")]
    DuplicateId(QuizId),

    #[error("battery `{battery}` references unknown part `{part}`")]
    UnknownPart { battery: QuizId, part: QuizId },

    #[error("battery `{battery}` takes outcomes from unknown quiz `{quiz}`")]
    UnknownOutcomes { battery: QuizId, quiz: QuizId },

    #[error("battery `{battery}` band `{tag}` has no outcome in `{quiz}`")]
    MissingOutcome {
        battery: QuizId,
        quiz: QuizId,
        tag: ChoiceTag,
    },
}

#[derive(Debug, Deserialize)]
struct CatalogDraft {
    quizzes: Vec<QuizDefinitionDraft>,
    #[serde(default)]
    batteries: Vec<BatteryDraft>,
}

/// Every quiz and battery the controller can run.
#[derive(Debug, Clone)]
pub struct Catalog {
    quizzes: Vec<QuizDefinition>,
    batteries: Vec<BatteryDefinition>,
    index: HashMap<QuizId, usize>,
}

impl Catalog {
    /// The catalog compiled into the crate.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the embedded content fails validation.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    /// Parses and validates a catalog document.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` for malformed JSON, invalid definitions,
    /// duplicate ids, or batteries referring to quizzes that do not exist.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let draft: CatalogDraft = serde_json::from_str(json)?;

        let mut quizzes = Vec::with_capacity(draft.quizzes.len());
        let mut index = HashMap::new();
        for quiz in draft.quizzes {
            let id = quiz.id.clone();
            let definition = quiz
                .validate()
                .map_err(|source| CatalogError::Definition {
                    id: id.clone(),
                    source,
                })?;
            if index.insert(id.clone(), quizzes.len()).is_some() {
                return Err(CatalogError::DuplicateId(id));
            }
            quizzes.push(definition);
        }

        let mut batteries: Vec<BatteryDefinition> = Vec::with_capacity(draft.batteries.len());
        let mut battery_ids = HashSet::new();
        for battery in draft.batteries {
            let battery = battery.validate()?;
            if index.contains_key(battery.id()) || !battery_ids.insert(battery.id().clone()) {
                return Err(CatalogError::DuplicateId(battery.id().clone()));
            }
            check_battery(&battery, &quizzes, &index)?;
            batteries.push(battery);
        }

        Ok(Self {
            quizzes,
            batteries,
            index,
        })
    }

    #[must_use]
    pub fn quiz(&self, id: &QuizId) -> Option<&QuizDefinition> {
        self.index.get(id).map(|&i| &self.quizzes[i])
    }

    /// All quizzes in catalog order, battery parts included.
    pub fn quizzes(&self) -> impl Iterator<Item = &QuizDefinition> {
        self.quizzes.iter()
    }

    /// Quizzes that are played on their own rather than as a battery part.
    pub fn standalone(&self) -> impl Iterator<Item = &QuizDefinition> {
        let parts: HashSet<&QuizId> = self
            .batteries
            .iter()
            .flat_map(|b| b.parts().iter())
            .collect();
        self.quizzes
            .iter()
            .filter(move |q| !parts.contains(q.id()))
    }

    #[must_use]
    pub fn battery(&self, id: &QuizId) -> Option<&BatteryDefinition> {
        self.batteries.iter().find(|b| b.id() == id)
    }

    pub fn batteries(&self) -> impl Iterator<Item = &BatteryDefinition> {
        self.batteries.iter()
    }
}

fn check_battery(
    battery: &BatteryDefinition,
    quizzes: &[QuizDefinition],
    index: &HashMap<QuizId, usize>,
) -> Result<(), CatalogError> {
    if let Some(part) = battery.parts().iter().find(|p| !index.contains_key(*p)) {
        return Err(CatalogError::UnknownPart {
            battery: battery.id().clone(),
            part: part.clone(),
        });
    }
    let source = index
        .get(battery.outcomes_from())
        .map(|&i| &quizzes[i])
        .ok_or_else(|| CatalogError::UnknownOutcomes {
            battery: battery.id().clone(),
            quiz: battery.outcomes_from().clone(),
        })?;
    if let Some(tag) = battery.bands().tags().find(|t| source.outcome(t).is_none()) {
        return Err(CatalogError::MissingOutcome {
            battery: battery.id().clone(),
            quiz: source.id().clone(),
            tag: tag.clone(),
        });
    }
    Ok(())
}
