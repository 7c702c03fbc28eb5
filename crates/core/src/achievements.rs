use serde::{Deserialize, Serialize};

use crate::classify::Classification;
use crate::model::{AchievementId, ChoiceTag};

/// What has to be true of a finished quiz for a badge to be earned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    TagCountAtLeast { tag: ChoiceTag, count: usize },
    MeasureAtLeast(f64),
    /// Every recorded choice carried the same tag.
    Unanimous,
    DistinctTagsAtLeast(usize),
    OutcomeIs(ChoiceTag),
    ChoseTag(ChoiceTag),
    AgeBelow(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementRule {
    id: AchievementId,
    emoji: String,
    title: String,
    description: String,
    when: Condition,
}

impl AchievementRule {
    #[must_use]
    pub fn new(
        id: AchievementId,
        emoji: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        when: Condition,
    ) -> Self {
        Self {
            id,
            emoji: emoji.into(),
            title: title.into(),
            description: description.into(),
            when,
        }
    }

    #[must_use]
    pub fn id(&self) -> &AchievementId {
        &self.id
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
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn condition(&self) -> &Condition {
        &self.when
    }
}

/// Facts about a finished quiz that rules are checked against.
#[derive(Debug, Clone, Copy)]
pub struct AchievementContext<'a> {
    pub classification: &'a Classification,
    pub estimated_age: Option<i64>,
}

impl Condition {
    #[must_use]
    pub fn holds(&self, ctx: &AchievementContext<'_>) -> bool {
        let tally = ctx.classification.tally();
        match self {
            Condition::TagCountAtLeast { tag, count } => tally.count(tag) >= *count,
            Condition::MeasureAtLeast(threshold) => {
                ctx.classification.measure().value() >= *threshold
            }
            Condition::Unanimous => tally.distinct() == 1,
            Condition::DistinctTagsAtLeast(n) => tally.distinct() >= *n,
            Condition::OutcomeIs(tag) => ctx.classification.tag() == tag,
            Condition::ChoseTag(tag) => tally.count(tag) > 0,
            Condition::AgeBelow(years) => ctx.estimated_age.is_some_and(|age| age < *years),
        }
    }
}

/// Rules satisfied by `ctx`, in definition order.
#[must_use]
pub fn evaluate<'r>(
    rules: &'r [AchievementRule],
    ctx: &AchievementContext<'_>,
) -> Vec<&'r AchievementRule> {
    rules.iter().filter(|rule| rule.when.holds(ctx)).collect()
}
