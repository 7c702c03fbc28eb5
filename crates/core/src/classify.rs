//! Aggregation of recorded choices into a classification.
//!
//! Two patterns cover every quiz: a threshold rule (score normalized onto a
//! scale, then mapped through ordered bands) and plurality (most frequent tag
//! wins, ties going to the tag that appeared first).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ChoiceTag, RecordedChoice};

//
// ─── SCALES ────────────────────────────────────────────────────────────────────
//

/// Inclusive score range used for percentage normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRange {
    pub min: i64,
    pub max: i64,
}

impl ScoreRange {
    #[must_use]
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.min >= self.max
    }
}

/// How an accumulated score turns into the value that is banded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    /// 0–100 against `range`, or against the quiz's derived score bounds.
    Percent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        range: Option<ScoreRange>,
    },
    /// Mean weight per recorded choice.
    Mean,
}

impl Scale {
    /// Computes the banded value for `score` over `answered` choices.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn measure(&self, score: i64, answered: usize, derived: ScoreRange) -> f64 {
        match self {
            Scale::Percent { range } => percent(score, range.unwrap_or(derived)),
            Scale::Mean => {
                if answered == 0 {
                    0.0
                } else {
                    score as f64 / answered as f64
                }
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(score: i64, range: ScoreRange) -> f64 {
    // i128 holds any difference of two i64 values.
    let span = (i128::from(range.max) - i128::from(range.min)).max(1) as f64;
    let raw = (i128::from(score) - i128::from(range.min)) as f64 / span * 100.0;
    raw.round().clamp(0.0, 100.0)
}

//
// ─── BANDS ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BandTableError {
    #[error("band table must contain at least one band")]
    Empty,

    #[error("band {index} has a non-finite floor")]
    NonFinite { index: usize },

    #[error("band floors must be strictly ascending (band {index})")]
    NotAscending { index: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    floor: f64,
    tag: ChoiceTag,
}

impl Band {
    #[must_use]
    pub fn new(floor: f64, tag: ChoiceTag) -> Self {
        Self { floor, tag }
    }

    #[must_use]
    pub fn floor(&self) -> f64 {
        self.floor
    }

    #[must_use]
    pub fn tag(&self) -> &ChoiceTag {
        &self.tag
    }
}

/// Which band claims a value that sits exactly on a floor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tie {
    /// The band that starts at the floor.
    #[default]
    Upper,
    /// The band below the floor.
    Lower,
}

/// Ordered breakpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Band>", into = "Vec<Band>")]
pub struct BandTable(Vec<Band>);

impl BandTable {
    /// # Errors
    ///
    /// Returns `BandTableError` if the table is empty, a floor is NaN or
    /// infinite, or the floors are not strictly ascending.
    pub fn new(bands: Vec<Band>) -> Result<Self, BandTableError> {
        if bands.is_empty() {
            return Err(BandTableError::Empty);
        }
        for (index, band) in bands.iter().enumerate() {
            if !band.floor.is_finite() {
                return Err(BandTableError::NonFinite { index });
            }
            if index > 0 && band.floor <= bands[index - 1].floor {
                return Err(BandTableError::NotAscending { index });
            }
        }
        Ok(Self(bands))
    }

    /// Index and band for `value`: the last band whose floor is `<= value`,
    /// or the bottom band when the value sits below every floor.
    #[must_use]
    pub fn band_for(&self, value: f64) -> (usize, &Band) {
        self.locate(value, Tie::Upper)
    }

    /// Like [`BandTable::band_for`], with values on a floor resolved by `tie`.
    #[must_use]
    pub fn locate(&self, value: f64, tie: Tie) -> (usize, &Band) {
        let index = self
            .0
            .iter()
            .rposition(|band| match tie {
                Tie::Upper => band.floor <= value,
                Tie::Lower => band.floor < value,
            })
            .unwrap_or(0);
        (index, &self.0[index])
    }

    #[must_use]
    pub fn bands(&self) -> &[Band] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &ChoiceTag> {
        self.0.iter().map(Band::tag)
    }
}

impl TryFrom<Vec<Band>> for BandTable {
    type Error = BandTableError;

    fn try_from(value: Vec<Band>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BandTable> for Vec<Band> {
    fn from(value: BandTable) -> Self {
        value.0
    }
}

//
// ─── CLASSIFIER ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    scale: Scale,
    bands: BandTable,
    #[serde(default)]
    tie: Tie,
}

impl ThresholdRule {
    #[must_use]
    pub fn new(scale: Scale, bands: BandTable) -> Self {
        Self {
            scale,
            bands,
            tie: Tie::default(),
        }
    }

    #[must_use]
    pub fn with_tie(mut self, tie: Tie) -> Self {
        self.tie = tie;
        self
    }

    #[must_use]
    pub fn tie(&self) -> Tie {
        self.tie
    }

    /// Band for an already measured `value`, honoring this rule's tie.
    #[must_use]
    pub fn band_for(&self, value: f64) -> (usize, &Band) {
        self.bands.locate(value, self.tie)
    }

    #[must_use]
    pub fn scale(&self) -> &Scale {
        &self.scale
    }

    #[must_use]
    pub fn bands(&self) -> &BandTable {
        &self.bands
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classifier {
    Threshold(ThresholdRule),
    Plurality,
}

impl Classifier {
    /// Classifies a sequence of recorded choices.
    ///
    /// `derived` is the quiz's own score range, used by percent scales that do
    /// not carry an explicit one. Returns `None` for an empty sequence.
    #[must_use]
    pub fn classify(
        &self,
        recorded: &[RecordedChoice],
        derived: ScoreRange,
    ) -> Option<Classification> {
        if recorded.is_empty() {
            return None;
        }
        let tally = Tally::from_tags(recorded.iter().map(RecordedChoice::tag));

        match self {
            Classifier::Threshold(rule) => {
                let score = recorded
                    .iter()
                    .fold(0_i64, |acc, choice| acc.saturating_add(choice.weight()));
                let value = rule.scale.measure(score, recorded.len(), derived);
                let (index, band) = rule.band_for(value);
                Some(Classification {
                    tag: band.tag.clone(),
                    measure: Measure::Band { index, value },
                    tally,
                })
            }
            Classifier::Plurality => {
                let (tag, count) = tally.dominant()?;
                let tag = tag.clone();
                Some(Classification {
                    tag,
                    measure: Measure::Plurality {
                        count,
                        total: tally.total(),
                    },
                    tally,
                })
            }
        }
    }
}

//
// ─── TALLY ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TallyEntry {
    pub tag: ChoiceTag,
    pub count: usize,
}

/// Tag frequencies in first-occurrence order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Tally {
    entries: Vec<TallyEntry>,
}

impl Tally {
    pub fn from_tags<'a>(tags: impl IntoIterator<Item = &'a ChoiceTag>) -> Self {
        let mut tally = Self::default();
        for tag in tags {
            tally.add(tag);
        }
        tally
    }

    pub fn add(&mut self, tag: &ChoiceTag) {
        match self.entries.iter_mut().find(|entry| &entry.tag == tag) {
            Some(entry) => entry.count += 1,
            None => self.entries.push(TallyEntry {
                tag: tag.clone(),
                count: 1,
            }),
        }
    }

    #[must_use]
    pub fn count(&self, tag: &ChoiceTag) -> usize {
        self.entries
            .iter()
            .find(|entry| &entry.tag == tag)
            .map_or(0, |entry| entry.count)
    }

    /// Number of distinct tags seen.
    #[must_use]
    pub fn distinct(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.iter().map(|entry| entry.count).sum()
    }

    #[must_use]
    pub fn entries(&self) -> &[TallyEntry] {
        &self.entries
    }

    /// The most frequent tag; on a tie, the one that occurred first.
    #[must_use]
    pub fn dominant(&self) -> Option<(&ChoiceTag, usize)> {
        let mut best: Option<&TallyEntry> = None;
        for entry in &self.entries {
            if best.is_none_or(|b| entry.count > b.count) {
                best = Some(entry);
            }
        }
        best.map(|entry| (&entry.tag, entry.count))
    }
}

//
// ─── RESULT ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    Band { index: usize, value: f64 },
    Plurality { count: usize, total: usize },
}

impl Measure {
    /// The banded value, or the winning count for plurality results.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn value(&self) -> f64 {
        match self {
            Measure::Band { value, .. } => *value,
            Measure::Plurality { count, .. } => *count as f64,
        }
    }
}

/// Outcome of classifying a completed session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    tag: ChoiceTag,
    measure: Measure,
    tally: Tally,
}

impl Classification {
    #[must_use]
    pub fn new(tag: ChoiceTag, measure: Measure, tally: Tally) -> Self {
        Self {
            tag,
            measure,
            tally,
        }
    }

    #[must_use]
    pub fn tag(&self) -> &ChoiceTag {
        &self.tag
    }

    #[must_use]
    pub fn measure(&self) -> &Measure {
        &self.measure
    }

    #[must_use]
    pub fn tally(&self) -> &Tally {
        &self.tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(raw: &str) -> ChoiceTag {
        ChoiceTag::new(raw).unwrap()
    }

    fn recorded(tags: &[(&str, i64)]) -> Vec<RecordedChoice> {
        tags.iter()
            .enumerate()
            .map(|(i, (t, w))| RecordedChoice::new(i, 0, tag(t), *w))
            .collect()
    }

    fn risk_bands() -> BandTable {
        BandTable::new(vec![
            Band::new(0.0, tag("high")),
            Band::new(50.0, tag("moderate")),
            Band::new(75.0, tag("low")),
        ])
        .unwrap()
    }

    #[test]
    fn plurality_picks_most_frequent() {
        let choices = recorded(&[("A", 1), ("B", 1), ("A", 1), ("C", 1), ("A", 1)]);
        let result = Classifier::Plurality
            .classify(&choices, ScoreRange::new(0, 5))
            .unwrap();

        assert_eq!(result.tag(), &tag("A"));
        assert_eq!(result.tally().count(&tag("A")), 3);
        assert_eq!(result.tally().count(&tag("B")), 1);
        assert_eq!(result.tally().count(&tag("C")), 1);
        assert_eq!(result.measure(), &Measure::Plurality { count: 3, total: 5 });
    }

    #[test]
    fn plurality_tie_goes_to_first_occurrence() {
        let choices = recorded(&[("A", 1), ("B", 1), ("A", 1), ("B", 1)]);
        let result = Classifier::Plurality
            .classify(&choices, ScoreRange::new(0, 4))
            .unwrap();
        assert_eq!(result.tag(), &tag("A"));

        let flipped = recorded(&[("B", 1), ("A", 1), ("A", 1), ("B", 1)]);
        let result = Classifier::Plurality
            .classify(&flipped, ScoreRange::new(0, 4))
            .unwrap();
        assert_eq!(result.tag(), &tag("B"));
    }

    #[test]
    fn empty_sequence_has_no_classification() {
        assert!(Classifier::Plurality.classify(&[], ScoreRange::new(0, 1)).is_none());
    }

    #[test]
    fn band_for_resolves_ties_upward() {
        let bands = risk_bands();
        assert_eq!(bands.band_for(75.0).1.tag(), &tag("low"));
        assert_eq!(bands.band_for(74.0).1.tag(), &tag("moderate"));
        assert_eq!(bands.band_for(50.0).0, 1);
        assert_eq!(bands.band_for(-10.0).0, 0);
    }

    #[test]
    fn lower_tie_keeps_floor_values_in_the_band_below() {
        let bands = risk_bands();
        assert_eq!(bands.locate(75.0, Tie::Lower).1.tag(), &tag("moderate"));
        assert_eq!(bands.locate(75.5, Tie::Lower).1.tag(), &tag("low"));
        assert_eq!(bands.locate(50.0, Tie::Lower).0, 0);
        assert_eq!(bands.locate(0.0, Tie::Lower).0, 0);

        let rule = Classifier::Threshold(
            ThresholdRule::new(
                Scale::Percent {
                    range: Some(ScoreRange::new(-800, 800)),
                },
                risk_bands(),
            )
            .with_tie(Tie::Lower),
        );
        let choices = recorded(&[("green", 100), ("green", 100), ("green", 100), ("green", 100)]);
        let result = rule.classify(&choices, ScoreRange::new(0, 0)).unwrap();
        assert_eq!(result.tag(), &tag("moderate"));
        assert_eq!(result.measure(), &Measure::Band { index: 1, value: 75.0 });
    }

    #[test]
    fn tie_defaults_to_upper_and_parses_from_json() {
        let rule: ThresholdRule = serde_json::from_str(
            r#"{"scale":"mean","bands":[{"floor":0,"tag":"a"}]}"#,
        )
        .unwrap();
        assert_eq!(rule.tie(), Tie::Upper);

        let rule: ThresholdRule = serde_json::from_str(
            r#"{"scale":"mean","bands":[{"floor":0,"tag":"a"}],"tie":"lower"}"#,
        )
        .unwrap();
        assert_eq!(rule.tie(), Tie::Lower);
    }

    #[test]
    fn band_table_rejects_unordered_floors() {
        let err = BandTable::new(vec![Band::new(10.0, tag("a")), Band::new(10.0, tag("b"))])
            .unwrap_err();
        assert_eq!(err, BandTableError::NotAscending { index: 1 });
        assert_eq!(BandTable::new(vec![]).unwrap_err(), BandTableError::Empty);
    }

    #[test]
    fn band_table_deserialization_validates() {
        let ok: BandTable =
            serde_json::from_str(r#"[{"floor":0,"tag":"a"},{"floor":2.5,"tag":"b"}]"#).unwrap();
        assert_eq!(ok.len(), 2);
        let unordered = r#"[{"floor":3,"tag":"a"},{"floor":1,"tag":"b"}]"#;
        assert!(serde_json::from_str::<BandTable>(unordered).is_err());
    }

    #[test]
    fn percent_threshold_rounds_and_clamps() {
        let rule = Classifier::Threshold(ThresholdRule::new(
            Scale::Percent {
                range: Some(ScoreRange::new(-800, 800)),
            },
            risk_bands(),
        ));
        // (400 + 800) / 1600 = 75%
        let choices = recorded(&[("green", 100), ("green", 100), ("green", 100), ("green", 100)]);
        let result = rule.classify(&choices, ScoreRange::new(0, 0)).unwrap();
        assert_eq!(result.tag(), &tag("low"));
        assert_eq!(result.measure(), &Measure::Band { index: 2, value: 75.0 });

        assert!((percent(2000, ScoreRange::new(0, 100)) - 100.0).abs() < f64::EPSILON);
        assert!(percent(-5, ScoreRange::new(0, 100)).abs() < f64::EPSILON);
    }

    #[test]
    fn percent_handles_full_i64_range() {
        let full = ScoreRange::new(i64::MIN, i64::MAX);
        assert!((percent(0, full) - 50.0).abs() < f64::EPSILON);
        assert!((percent(i64::MAX, full) - 100.0).abs() < f64::EPSILON);
        assert!(percent(i64::MIN, full).abs() < f64::EPSILON);
    }

    #[test]
    fn threshold_score_saturates_instead_of_wrapping() {
        let rule = Classifier::Threshold(ThresholdRule::new(
            Scale::Percent {
                range: Some(ScoreRange::new(0, 100)),
            },
            risk_bands(),
        ));
        let choices = recorded(&[("a", i64::MAX), ("b", i64::MAX)]);
        let result = rule.classify(&choices, ScoreRange::new(0, 0)).unwrap();
        assert_eq!(result.tag(), &tag("low"));
    }

    #[test]
    fn percent_uses_derived_range_when_absent() {
        let scale = Scale::Percent { range: None };
        assert!((scale.measure(5, 5, ScoreRange::new(5, 15))).abs() < f64::EPSILON);
        assert!((scale.measure(15, 5, ScoreRange::new(5, 15)) - 100.0).abs() < f64::EPSILON);
        assert!((scale.measure(10, 5, ScoreRange::new(5, 15)) - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn mean_scale_averages_weights() {
        let rule = Classifier::Threshold(ThresholdRule::new(
            Scale::Mean,
            BandTable::new(vec![
                Band::new(0.0, tag("specialist")),
                Band::new(2.5, tag("creative")),
                Band::new(3.5, tag("entrepreneur")),
                Band::new(4.5, tag("leader")),
            ])
            .unwrap(),
        ));
        // (4 + 4 + 3) / 3 = 3.67
        let choices = recorded(&[("good", 4), ("good", 4), ("fair", 3)]);
        let result = rule.classify(&choices, ScoreRange::new(6, 15)).unwrap();
        assert_eq!(result.tag(), &tag("entrepreneur"));

        let choices = recorded(&[("strong", 5), ("good", 4), ("strong", 5)]);
        let result = rule.classify(&choices, ScoreRange::new(6, 15)).unwrap();
        assert_eq!(result.tag(), &tag("leader"));
    }

    #[test]
    fn classify_is_pure() {
        let rule = Classifier::Threshold(ThresholdRule::new(
            Scale::Percent { range: None },
            risk_bands(),
        ));
        let choices = recorded(&[("x", 1), ("y", 3), ("x", 2)]);
        let derived = ScoreRange::new(3, 9);
        assert_eq!(rule.classify(&choices, derived), rule.classify(&choices.clone(), derived));
    }

    #[test]
    fn classifier_serde_shapes() {
        let plurality: Classifier = serde_json::from_str("\"plurality\"").unwrap();
        assert_eq!(plurality, Classifier::Plurality);

        let threshold: Classifier = serde_json::from_str(
            r#"{"threshold":{"scale":{"percent":{}},"bands":[{"floor":0,"tag":"low"}]}}"#,
        )
        .unwrap();
        assert!(matches!(
            threshold,
            Classifier::Threshold(ref rule) if rule.scale() == &Scale::Percent { range: None }
        ));
    }
}
