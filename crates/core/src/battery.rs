//! Multi-part assessments: several short sub-quizzes whose mean weights are
//! averaged and banded into one result.

use std::collections::HashSet;

use serde::Deserialize;
use thiserror::Error;

use crate::classify::{BandTable, Classification, Measure, Tally};
use crate::model::{QuizId, Session};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BatteryError {
    #[error("battery `{battery}` must have at least one part")]
    NoParts { battery: QuizId },

    #[error("battery `{battery}` lists part `{part}` more than once")]
    DuplicatePart { battery: QuizId, part: QuizId },

    #[error("`{part}` is not a part of battery `{battery}`")]
    UnknownPart { battery: QuizId, part: QuizId },

    #[error("progress belongs to battery `{expected}`, not `{got}`")]
    WrongBattery { expected: QuizId, got: QuizId },

    #[error("part `{part}` is incomplete ({answered} of {total} answered)")]
    PartIncomplete {
        part: QuizId,
        answered: usize,
        total: usize,
    },

    #[error("battery is incomplete ({recorded} of {total} parts recorded)")]
    Incomplete { recorded: usize, total: usize },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatteryDraft {
    pub id: QuizId,
    pub title: String,
    pub parts: Vec<QuizId>,
    pub bands: BandTable,
    /// Quiz whose outcomes and unlock state the battery result uses.
    pub outcomes_from: QuizId,
}

impl BatteryDraft {
    /// # Errors
    ///
    /// Returns `BatteryError` if there are no parts or a part repeats.
    pub fn validate(self) -> Result<BatteryDefinition, BatteryError> {
        if self.parts.is_empty() {
            return Err(BatteryError::NoParts { battery: self.id });
        }
        let mut seen = HashSet::new();
        for part in &self.parts {
            if !seen.insert(part) {
                return Err(BatteryError::DuplicatePart {
                    battery: self.id.clone(),
                    part: part.clone(),
                });
            }
        }
        Ok(BatteryDefinition {
            id: self.id,
            title: self.title,
            parts: self.parts,
            bands: self.bands,
            outcomes_from: self.outcomes_from,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatteryDefinition {
    id: QuizId,
    title: String,
    parts: Vec<QuizId>,
    bands: BandTable,
    outcomes_from: QuizId,
}

impl BatteryDefinition {
    #[must_use]
    pub fn id(&self) -> &QuizId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn parts(&self) -> &[QuizId] {
        &self.parts
    }

    #[must_use]
    pub fn bands(&self) -> &BandTable {
        &self.bands
    }

    #[must_use]
    pub fn outcomes_from(&self) -> &QuizId {
        &self.outcomes_from
    }
}

/// Recorded part means for one battery run. Immutable like `Session`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryProgress {
    battery: QuizId,
    means: Vec<(QuizId, Option<f64>)>,
}

impl BatteryProgress {
    #[must_use]
    pub fn new(battery: &BatteryDefinition) -> Self {
        Self {
            battery: battery.id.clone(),
            means: battery.parts.iter().map(|p| (p.clone(), None)).collect(),
        }
    }

    #[must_use]
    pub fn battery_id(&self) -> &QuizId {
        &self.battery
    }

    /// Returns the successor progress with `session`'s mean weight stored for
    /// its part. Retaking a part replaces the earlier mean.
    ///
    /// # Errors
    ///
    /// Returns `BatteryError` if `battery` does not own this progress, the
    /// session's quiz is not one of its parts, or the session is unfinished.
    pub fn record_part(
        &self,
        battery: &BatteryDefinition,
        session: &Session,
    ) -> Result<Self, BatteryError> {
        if battery.id != self.battery {
            return Err(BatteryError::WrongBattery {
                expected: self.battery.clone(),
                got: battery.id.clone(),
            });
        }
        let part = session.quiz_id();
        let Some(slot) = self.means.iter().position(|(id, _)| id == part) else {
            return Err(BatteryError::UnknownPart {
                battery: self.battery.clone(),
                part: part.clone(),
            });
        };
        let progress = session.progress();
        let mean = match session.mean_weight() {
            Some(mean) if progress.is_complete => mean,
            _ => {
                return Err(BatteryError::PartIncomplete {
                    part: part.clone(),
                    answered: progress.answered,
                    total: progress.total,
                });
            }
        };

        let mut next = self.clone();
        next.means[slot].1 = Some(mean);
        Ok(next)
    }

    #[must_use]
    pub fn recorded(&self) -> usize {
        self.means.iter().filter(|(_, m)| m.is_some()).count()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.recorded() == self.means.len()
    }

    /// Part means in part order; `None` for parts not yet taken.
    #[must_use]
    pub fn means(&self) -> &[(QuizId, Option<f64>)] {
        &self.means
    }

    /// Averages the part means and bands the result. The tally counts the
    /// band each part landed in.
    ///
    /// # Errors
    ///
    /// Returns `BatteryError::Incomplete` until every part is recorded.
    #[allow(clippy::cast_precision_loss)]
    pub fn classify(&self, battery: &BatteryDefinition) -> Result<Classification, BatteryError> {
        if battery.id != self.battery {
            return Err(BatteryError::WrongBattery {
                expected: self.battery.clone(),
                got: battery.id.clone(),
            });
        }
        let means: Vec<f64> = self.means.iter().filter_map(|(_, m)| *m).collect();
        if means.len() != self.means.len() || means.is_empty() {
            return Err(BatteryError::Incomplete {
                recorded: means.len(),
                total: self.means.len(),
            });
        }

        let average = means.iter().sum::<f64>() / means.len() as f64;
        let mut tally = Tally::default();
        for mean in &means {
            tally.add(battery.bands.band_for(*mean).1.tag());
        }
        let (index, band) = battery.bands.band_for(average);
        Ok(Classification::new(
            band.tag().clone(),
            Measure::Band {
                index,
                value: average,
            },
            tally,
        ))
    }
}
