use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::achievements::AchievementRule;
use crate::analysis::{AgeProfile, AgeProfileError};
use crate::classify::{Classification, Classifier, Scale, ScoreRange, Tally, ThresholdRule};
use crate::model::ids::{AchievementId, ChoiceTag, QuizId};
use crate::model::session::{RecordedChoice, Subject};

const SUBJECT_PLACEHOLDER: &str = "{subject}";

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DefinitionError {
    #[error("quiz title cannot be empty")]
    EmptyTitle,

    #[error("quiz must have at least one step")]
    NoSteps,

    #[error("step {step} has no choices")]
    EmptyStep { step: usize },

    #[error("step {step} has a choice with an empty label")]
    EmptyLabel { step: usize },

    #[error("step weights overflow the score range at step {step}")]
    ScoreOverflow { step: usize },

    #[error("score range is empty (min {min}, max {max})")]
    InvalidRange { min: i64, max: i64 },

    #[error("no outcome defined for tag `{tag}`")]
    MissingOutcome { tag: ChoiceTag },

    #[error("lowest possible score lands in band `{tag}` instead of the bottom band")]
    MinimumNotInBottomBand { tag: ChoiceTag },

    #[error("highest possible score lands in band `{tag}` instead of the top band")]
    MaximumNotInTopBand { tag: ChoiceTag },

    #[error("achievement `{id}` is defined more than once")]
    DuplicateAchievement { id: AchievementId },

    #[error(transparent)]
    AgeProfile(#[from] AgeProfileError),
}

//
// ─── STEPS ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    tag: ChoiceTag,
    weight: i64,
}

impl Choice {
    #[must_use]
    pub fn new(label: impl Into<String>, tag: ChoiceTag, weight: i64) -> Self {
        Self {
            label: label.into(),
            detail: None,
            tag,
            weight,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    #[must_use]
    pub fn tag(&self) -> &ChoiceTag {
        &self.tag
    }

    #[must_use]
    pub fn weight(&self) -> i64 {
        self.weight
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    prompt: String,
    choices: Vec<Choice>,
}

impl Step {
    #[must_use]
    pub fn new(prompt: impl Into<String>, choices: Vec<Choice>) -> Self {
        Self {
            category: None,
            prompt: prompt.into(),
            choices,
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    /// The raw prompt, placeholders included.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The prompt with `{subject}` replaced for `subject`.
    #[must_use]
    pub fn prompt_for(&self, subject: &Subject) -> String {
        self.prompt
            .replace(SUBJECT_PLACEHOLDER, subject.display_name())
    }

    #[must_use]
    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    #[must_use]
    pub fn choice(&self, index: usize) -> Option<&Choice> {
        self.choices.get(index)
    }

    fn weight_bounds(&self) -> Option<(i64, i64)> {
        let min = self.choices.iter().map(Choice::weight).min()?;
        let max = self.choices.iter().map(Choice::weight).max()?;
        Some((min, max))
    }
}

//
// ─── RESULT CONTENT ────────────────────────────────────────────────────────────
//

/// Canned result content for one classification tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    emoji: String,
    title: String,
    summary: String,
    #[serde(default)]
    premium: Vec<String>,
}

impl Outcome {
    #[must_use]
    pub fn new(
        emoji: impl Into<String>,
        title: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            emoji: emoji.into(),
            title: title.into(),
            summary: summary.into(),
            premium: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_premium(mut self, lines: Vec<String>) -> Self {
        self.premium = lines;
        self
    }

    #[must_use]
    pub fn emoji(&self) -> &str {
        &self.emoji
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Lines shown only once the quiz is unlocked.
    #[must_use]
    pub fn premium(&self) -> &[String] {
        &self.premium
    }
}

/// Premium unlock price in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    amount: u32,
    currency: String,
}

impl Price {
    #[must_use]
    pub fn new(amount: u32, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    #[must_use]
    pub fn amount(&self) -> u32 {
        self.amount
    }

    #[must_use]
    pub fn currency(&self) -> &str {
        &self.currency
    }
}

impl Default for Price {
    fn default() -> Self {
        Self::new(9900, "INR")
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02} {}",
            self.amount / 100,
            self.amount % 100,
            self.currency
        )
    }
}

/// Premium compatibility score: `base` minus `penalty` per `tag` chosen,
/// never below `floor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityRule {
    tag: ChoiceTag,
    base: i64,
    penalty: i64,
    floor: i64,
}

impl CompatibilityRule {
    #[must_use]
    pub fn new(tag: ChoiceTag, base: i64, penalty: i64, floor: i64) -> Self {
        Self {
            tag,
            base,
            penalty,
            floor,
        }
    }

    #[must_use]
    pub fn tag(&self) -> &ChoiceTag {
        &self.tag
    }

    #[must_use]
    pub fn score(&self, tally: &Tally) -> i64 {
        let count = i64::try_from(tally.count(&self.tag)).unwrap_or(i64::MAX);
        self.base
            .saturating_sub(self.penalty.saturating_mul(count))
            .max(self.floor)
    }
}

//
// ─── DEFINITION ────────────────────────────────────────────────────────────────
//

/// Unvalidated quiz definition, as read from catalog JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuizDefinitionDraft {
    pub id: QuizId,
    pub title: String,
    pub steps: Vec<Step>,
    pub classifier: Classifier,
    #[serde(default)]
    pub outcomes: BTreeMap<ChoiceTag, Outcome>,
    #[serde(default)]
    pub achievements: Vec<AchievementRule>,
    #[serde(default)]
    pub price: Price,
    #[serde(default)]
    pub age_profile: Option<AgeProfile>,
    #[serde(default)]
    pub compatibility: Option<CompatibilityRule>,
}

impl QuizDefinitionDraft {
    /// Validates the draft into a `QuizDefinition`.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError` if the steps are empty or malformed, a
    /// threshold rule cannot place the extreme scores in the outer bands, or
    /// a classification tag has no outcome.
    pub fn validate(self) -> Result<QuizDefinition, DefinitionError> {
        if self.title.trim().is_empty() {
            return Err(DefinitionError::EmptyTitle);
        }
        if self.steps.is_empty() {
            return Err(DefinitionError::NoSteps);
        }
        for (step, s) in self.steps.iter().enumerate() {
            if s.choices.is_empty() {
                return Err(DefinitionError::EmptyStep { step });
            }
            if s.choices.iter().any(|c| c.label.trim().is_empty()) {
                return Err(DefinitionError::EmptyLabel { step });
            }
        }

        let bounds = score_bounds(&self.steps)?;
        if let Classifier::Threshold(rule) = &self.classifier {
            check_threshold(rule, bounds, self.steps.len())?;
        }
        if let Some(profile) = &self.age_profile {
            profile.check()?;
        }
        self.check_outcomes()?;

        let mut seen = HashSet::new();
        for rule in &self.achievements {
            if !seen.insert(rule.id()) {
                return Err(DefinitionError::DuplicateAchievement {
                    id: rule.id().clone(),
                });
            }
        }

        Ok(QuizDefinition {
            id: self.id,
            title: self.title,
            steps: self.steps,
            classifier: self.classifier,
            outcomes: self.outcomes,
            achievements: self.achievements,
            price: self.price,
            age_profile: self.age_profile,
            compatibility: self.compatibility,
            bounds,
        })
    }

    fn check_outcomes(&self) -> Result<(), DefinitionError> {
        // Sub-quizzes of a battery carry no result content of their own.
        if self.outcomes.is_empty() {
            return Ok(());
        }
        let required: Vec<&ChoiceTag> = match (&self.age_profile, &self.classifier) {
            (Some(profile), _) => profile.bands().tags().collect(),
            (None, Classifier::Threshold(rule)) => rule.bands().tags().collect(),
            (None, Classifier::Plurality) => self
                .steps
                .iter()
                .flat_map(|s| s.choices.iter().map(Choice::tag))
                .collect(),
        };
        match required.into_iter().find(|tag| !self.outcomes.contains_key(*tag)) {
            Some(tag) => Err(DefinitionError::MissingOutcome { tag: tag.clone() }),
            None => Ok(()),
        }
    }
}

fn score_bounds(steps: &[Step]) -> Result<ScoreRange, DefinitionError> {
    let mut bounds = ScoreRange::new(0, 0);
    for (step, s) in steps.iter().enumerate() {
        let Some((lo, hi)) = s.weight_bounds() else {
            continue;
        };
        bounds = bounds
            .min
            .checked_add(lo)
            .zip(bounds.max.checked_add(hi))
            .map(|(min, max)| ScoreRange::new(min, max))
            .ok_or(DefinitionError::ScoreOverflow { step })?;
    }
    Ok(bounds)
}

fn check_threshold(
    rule: &ThresholdRule,
    bounds: ScoreRange,
    steps: usize,
) -> Result<(), DefinitionError> {
    let degenerate = match rule.scale() {
        Scale::Percent { range: Some(range) } => Some(*range),
        Scale::Percent { range: None } => Some(bounds),
        Scale::Mean => None,
    };
    if let Some(range) = degenerate.filter(ScoreRange::is_degenerate) {
        return Err(DefinitionError::InvalidRange {
            min: range.min,
            max: range.max,
        });
    }

    let bands = rule.bands();
    let (low, low_band) = rule.band_for(rule.scale().measure(bounds.min, steps, bounds));
    if low != 0 {
        return Err(DefinitionError::MinimumNotInBottomBand {
            tag: low_band.tag().clone(),
        });
    }
    let (high, high_band) = rule.band_for(rule.scale().measure(bounds.max, steps, bounds));
    if high + 1 != bands.len() {
        return Err(DefinitionError::MaximumNotInTopBand {
            tag: high_band.tag().clone(),
        });
    }
    Ok(())
}

/// A validated quiz: steps, scoring and result content.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizDefinition {
    id: QuizId,
    title: String,
    steps: Vec<Step>,
    classifier: Classifier,
    outcomes: BTreeMap<ChoiceTag, Outcome>,
    achievements: Vec<AchievementRule>,
    price: Price,
    age_profile: Option<AgeProfile>,
    compatibility: Option<CompatibilityRule>,
    bounds: ScoreRange,
}

impl QuizDefinition {
    #[must_use]
    pub fn id(&self) -> &QuizId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    #[must_use]
    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    #[must_use]
    pub fn outcome(&self, tag: &ChoiceTag) -> Option<&Outcome> {
        self.outcomes.get(tag)
    }

    #[must_use]
    pub fn has_outcomes(&self) -> bool {
        !self.outcomes.is_empty()
    }

    #[must_use]
    pub fn achievements(&self) -> &[AchievementRule] {
        &self.achievements
    }

    #[must_use]
    pub fn price(&self) -> &Price {
        &self.price
    }

    #[must_use]
    pub fn age_profile(&self) -> Option<&AgeProfile> {
        self.age_profile.as_ref()
    }

    #[must_use]
    pub fn compatibility(&self) -> Option<&CompatibilityRule> {
        self.compatibility.as_ref()
    }

    /// Lowest and highest reachable total scores.
    #[must_use]
    pub fn score_bounds(&self) -> ScoreRange {
        self.bounds
    }

    /// Classifies `recorded` with this quiz's rule. `None` when empty.
    #[must_use]
    pub fn classify(&self, recorded: &[RecordedChoice]) -> Option<Classification> {
        self.classifier.classify(recorded, self.bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Band, BandTable, Tie};

    fn tag(raw: &str) -> ChoiceTag {
        ChoiceTag::new(raw).unwrap()
    }

    fn level_step(prompt: &str) -> Step {
        Step::new(
            prompt,
            vec![
                Choice::new("calm", tag("calm"), 1),
                Choice::new("simmering", tag("simmering"), 2),
                Choice::new("explosive", tag("explosive"), 3),
            ],
        )
    }

    fn bands(floors: &[(f64, &str)]) -> BandTable {
        BandTable::new(floors.iter().map(|(f, t)| Band::new(*f, tag(t))).collect()).unwrap()
    }

    fn outcomes(tags: &[&str]) -> BTreeMap<ChoiceTag, Outcome> {
        tags.iter()
            .map(|t| (tag(t), Outcome::new("*", *t, "summary")))
            .collect()
    }

    fn draft(classifier: Classifier, outcome_tags: &[&str]) -> QuizDefinitionDraft {
        QuizDefinitionDraft {
            id: QuizId::new("toxic").unwrap(),
            title: "How Toxic Are You?".into(),
            steps: vec![level_step("one"), level_step("two")],
            classifier,
            outcomes: outcomes(outcome_tags),
            achievements: Vec::new(),
            price: Price::default(),
            age_profile: None,
            compatibility: None,
        }
    }

    fn threshold(scale: Scale, floors: &[(f64, &str)]) -> Classifier {
        Classifier::Threshold(ThresholdRule::new(scale, bands(floors)))
    }

    #[test]
    fn valid_threshold_draft() {
        let def = draft(
            threshold(Scale::Percent { range: None }, &[(0.0, "low"), (50.0, "high")]),
            &["low", "high"],
        )
        .validate()
        .unwrap();

        assert_eq!(def.step_count(), 2);
        assert_eq!(def.score_bounds(), ScoreRange::new(2, 6));
        assert_eq!(def.price().to_string(), "99.00 INR");
    }

    #[test]
    fn empty_steps_rejected() {
        let mut d = draft(Classifier::Plurality, &[]);
        d.steps.clear();
        assert_eq!(d.validate(), Err(DefinitionError::NoSteps));

        let mut d = draft(Classifier::Plurality, &[]);
        d.steps.push(Step::new("empty", vec![]));
        assert_eq!(d.validate(), Err(DefinitionError::EmptyStep { step: 2 }));
    }

    #[test]
    fn missing_outcome_rejected() {
        let d = draft(Classifier::Plurality, &["calm", "simmering"]);
        assert_eq!(
            d.validate(),
            Err(DefinitionError::MissingOutcome { tag: tag("explosive") })
        );
    }

    #[test]
    fn unreachable_top_band_rejected() {
        // Mean of levels 1..=3 never reaches 4.
        let d = draft(
            threshold(Scale::Mean, &[(0.0, "low"), (2.0, "mid"), (4.0, "top")]),
            &[],
        );
        assert_eq!(
            d.validate(),
            Err(DefinitionError::MaximumNotInTopBand { tag: tag("mid") })
        );
    }

    #[test]
    fn minimum_above_bottom_band_rejected() {
        let d = draft(
            threshold(
                Scale::Percent {
                    range: Some(ScoreRange::new(-10, 6)),
                },
                &[(0.0, "low"), (50.0, "high"), (90.0, "top")],
            ),
            &[],
        );
        // min score 2 -> 75% -> "high"
        assert_eq!(
            d.validate(),
            Err(DefinitionError::MinimumNotInBottomBand { tag: tag("high") })
        );
    }

    #[test]
    fn inverted_explicit_range_rejected() {
        let d = draft(
            threshold(
                Scale::Percent {
                    range: Some(ScoreRange::new(5, 5)),
                },
                &[(0.0, "low")],
            ),
            &[],
        );
        assert_eq!(d.validate(), Err(DefinitionError::InvalidRange { min: 5, max: 5 }));
    }

    #[test]
    fn prompt_renders_subject() {
        let step = level_step("When {subject} get upset, {subject} usually:");
        assert_eq!(
            step.prompt_for(&Subject::named("Arjun")),
            "When Arjun get upset, Arjun usually:"
        );
        assert_eq!(step.prompt_for(&Subject::You), "When you get upset, you usually:");
    }

    #[test]
    fn extremes_check_follows_the_tie_setting() {
        let upper = threshold(Scale::Percent { range: None }, &[(0.0, "low"), (100.0, "high")]);
        assert!(draft(upper, &["low", "high"]).validate().is_ok());

        let lower = Classifier::Threshold(
            ThresholdRule::new(
                Scale::Percent { range: None },
                bands(&[(0.0, "low"), (100.0, "high")]),
            )
            .with_tie(Tie::Lower),
        );
        assert_eq!(
            draft(lower, &["low", "high"]).validate(),
            Err(DefinitionError::MaximumNotInTopBand { tag: tag("low") })
        );
    }

    #[test]
    fn compatibility_drops_per_flag_with_a_floor() {
        let rule = CompatibilityRule::new(tag("red"), 85, 10, 20);
        let tally = |reds: usize| {
            let red = tag("red");
            let green = tag("green");
            Tally::from_tags(std::iter::repeat_n(&red, reds).chain([&green]))
        };
        assert_eq!(rule.score(&tally(0)), 85);
        assert_eq!(rule.score(&tally(3)), 55);
        assert_eq!(rule.score(&tally(7)), 20);
        assert_eq!(rule.score(&tally(8)), 20);
    }

    #[test]
    fn overflowing_weights_rejected() {
        let mut d = draft(Classifier::Plurality, &[]);
        let huge = || Step::new("huge", vec![Choice::new("max", tag("calm"), i64::MAX)]);
        d.steps = vec![huge(), huge()];
        assert_eq!(d.validate(), Err(DefinitionError::ScoreOverflow { step: 1 }));
    }

    #[test]
    fn price_defaults_when_absent() {
        let d: QuizDefinitionDraft = serde_json::from_str(
            r#"{"id":"q","title":"Q","steps":[{"prompt":"p","choices":[{"label":"a","tag":"a","weight":1}]}],"classifier":"plurality"}"#,
        )
        .unwrap();
        assert_eq!(d.price, Price::new(9900, "INR"));
        assert!(d.validate().is_ok());
    }
}
