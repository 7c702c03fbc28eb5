//! Age estimation for the photo quiz.
//!
//! Face analysis is an injectable capability. Whatever the provider reports
//! only nudges a fixed arithmetic profile; a missing or failing provider falls
//! back to a random age inside the profile's fallback span.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::BandTable;
use crate::model::ChoiceTag;

const LARGE_FACE_AREA: f64 = 50_000.0;
const SMALL_FACE_AREA: f64 = 20_000.0;
const WIDE_FACE_RATIO: f64 = 0.8;

//
// ─── PROVIDER ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnalysisError {
    #[error("face analysis is unavailable")]
    Unavailable,

    #[error("no face detected in `{0}`")]
    NoFace(String),

    #[error("face reading has invalid dimensions")]
    InvalidReading,
}

/// The photo handed to a provider. Only its label travels through the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoInput {
    label: String,
}

impl PhotoInput {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Bounding box of a detected face, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceReading {
    width: f64,
    height: f64,
}

impl FaceReading {
    /// # Errors
    ///
    /// Returns `AnalysisError::InvalidReading` unless both sides are positive
    /// and finite.
    pub fn new(width: f64, height: f64) -> Result<Self, AnalysisError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if valid(width) && valid(height) {
            Ok(Self { width, height })
        } else {
            Err(AnalysisError::InvalidReading)
        }
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.height
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    #[must_use]
    pub fn aspect(&self) -> f64 {
        self.width / self.height
    }

    /// Years added to the base age for this face geometry.
    #[must_use]
    pub fn adjustment(&self) -> i64 {
        let area = self.area();
        let mut years = 0;
        if area > LARGE_FACE_AREA {
            years -= 3;
        } else if area < SMALL_FACE_AREA {
            years += 2;
        }
        if self.aspect() > WIDE_FACE_RATIO {
            years += 1;
        }
        years
    }
}

pub trait AnalysisProvider: Send + Sync {
    /// Looks for a face in `photo`.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError` when the provider cannot run or finds nothing.
    fn analyze(&self, photo: &PhotoInput) -> Result<FaceReading, AnalysisError>;
}

/// Provider used when no detector is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAnalysis;

impl AnalysisProvider for NoAnalysis {
    fn analyze(&self, _photo: &PhotoInput) -> Result<FaceReading, AnalysisError> {
        Err(AnalysisError::Unavailable)
    }
}

/// Reports the same reading for every photo.
#[derive(Debug, Clone, Copy)]
pub struct FixedReading(pub FaceReading);

impl AnalysisProvider for FixedReading {
    fn analyze(&self, _photo: &PhotoInput) -> Result<FaceReading, AnalysisError> {
        Ok(self.0)
    }
}

//
// ─── PROFILE ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AgeProfileError {
    #[error("age floor {floor} is above ceiling {ceiling}")]
    InvertedClamp { floor: i64, ceiling: i64 },

    #[error("{which} span is inverted ({min} > {max})")]
    InvertedSpan {
        which: &'static str,
        min: i64,
        max: i64,
    },
}

/// Inclusive span of years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeSpan {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeProfile {
    base_age: i64,
    floor: i64,
    ceiling: i64,
    jitter: AgeSpan,
    fallback: AgeSpan,
    bands: BandTable,
}

/// Result of one age estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeEstimate {
    pub years: i64,
    pub band_index: usize,
    pub band: ChoiceTag,
    /// `false` when the fallback span was used.
    pub detected: bool,
}

impl AgeProfile {
    /// # Errors
    ///
    /// Returns `AgeProfileError` if the clamp or either span is inverted.
    pub fn new(
        base_age: i64,
        floor: i64,
        ceiling: i64,
        jitter: AgeSpan,
        fallback: AgeSpan,
        bands: BandTable,
    ) -> Result<Self, AgeProfileError> {
        let profile = Self {
            base_age,
            floor,
            ceiling,
            jitter,
            fallback,
            bands,
        };
        profile.check()?;
        Ok(profile)
    }

    /// Verifies the spans that `estimate` samples from.
    ///
    /// # Errors
    ///
    /// Returns `AgeProfileError` if the clamp or either span is inverted.
    pub fn check(&self) -> Result<(), AgeProfileError> {
        if self.floor > self.ceiling {
            return Err(AgeProfileError::InvertedClamp {
                floor: self.floor,
                ceiling: self.ceiling,
            });
        }
        for (which, span) in [("jitter", self.jitter), ("fallback", self.fallback)] {
            if span.min > span.max {
                return Err(AgeProfileError::InvertedSpan {
                    which,
                    min: span.min,
                    max: span.max,
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn bands(&self) -> &BandTable {
        &self.bands
    }

    #[must_use]
    pub fn base_age(&self) -> i64 {
        self.base_age
    }

    /// Estimates an age.
    ///
    /// With a reading: base age, plus the face adjustment, the filter
    /// `modifier` and a jitter sample, clamped to `floor..=ceiling`. Without
    /// one: a uniform sample from the fallback span.
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate<R: Rng + ?Sized>(
        &self,
        modifier: i64,
        reading: Option<&FaceReading>,
        rng: &mut R,
    ) -> AgeEstimate {
        let (years, detected) = match reading {
            Some(face) => {
                let jitter = rng.random_range(self.jitter.min..=self.jitter.max);
                let raw = self.base_age + face.adjustment() + modifier + jitter;
                (raw.clamp(self.floor, self.ceiling), true)
            }
            None => (rng.random_range(self.fallback.min..=self.fallback.max), false),
        };
        let (band_index, band) = self.bands.band_for(years as f64);
        AgeEstimate {
            years,
            band_index,
            band: band.tag().clone(),
            detected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Band;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn profile() -> AgeProfile {
        let tag = |raw: &str| ChoiceTag::new(raw).unwrap();
        AgeProfile::new(
            25,
            18,
            45,
            AgeSpan { min: -3, max: 2 },
            AgeSpan { min: 20, max: 34 },
            BandTable::new(vec![
                Band::new(0.0, tag("young")),
                Band::new(25.0, tag("adult")),
                Band::new(35.0, tag("mature")),
            ])
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn face_adjustment_follows_geometry() {
        assert_eq!(FaceReading::new(300.0, 300.0).unwrap().adjustment(), -2);
        assert_eq!(FaceReading::new(100.0, 150.0).unwrap().adjustment(), 2);
        assert_eq!(FaceReading::new(150.0, 200.0).unwrap().adjustment(), 0);
    }

    #[test]
    fn invalid_reading_is_rejected() {
        assert_eq!(FaceReading::new(0.0, 10.0), Err(AnalysisError::InvalidReading));
        assert_eq!(FaceReading::new(f64::NAN, 10.0), Err(AnalysisError::InvalidReading));
    }

    #[test]
    fn detected_estimate_stays_within_jitter_window() {
        let profile = profile();
        let face = FaceReading::new(150.0, 200.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let estimate = profile.estimate(-2, Some(&face), &mut rng);
            assert!(estimate.detected);
            assert!((20..=25).contains(&estimate.years), "{}", estimate.years);
        }
    }

    #[test]
    fn estimate_is_clamped() {
        let profile = profile();
        let small_wide = FaceReading::new(140.0, 100.0).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let estimate = profile.estimate(40, Some(&small_wide), &mut rng);
        assert_eq!(estimate.years, 45);
        assert_eq!(estimate.band.as_str(), "mature");
    }

    #[test]
    fn fallback_samples_fallback_span() {
        let profile = profile();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let estimate = profile.estimate(3, None, &mut rng);
            assert!(!estimate.detected);
            assert!((20..=34).contains(&estimate.years));
        }
    }

    #[test]
    fn providers_report_as_configured() {
        let photo = PhotoInput::new("selfie.jpg");
        assert_eq!(NoAnalysis.analyze(&photo), Err(AnalysisError::Unavailable));

        let face = FaceReading::new(200.0, 240.0).unwrap();
        assert_eq!(FixedReading(face).analyze(&photo), Ok(face));
    }

    #[test]
    fn inverted_spans_are_rejected() {
        let mut profile = profile();
        profile.fallback = AgeSpan { min: 30, max: 20 };
        assert!(matches!(
            profile.check(),
            Err(AgeProfileError::InvertedSpan { which: "fallback", .. })
        ));
    }
}
