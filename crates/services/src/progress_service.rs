use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use quiz_core::Clock;
use quiz_core::achievements::AchievementRule;
use quiz_core::model::{AchievementId, QuizId};
use storage::repository::KeyValueStore;

use crate::error::ProgressError;

const UNLOCK_PREFIX: &str = "unlock:";
const COMPLETIONS_PREFIX: &str = "completions:";
const ACHIEVEMENTS_KEY: &str = "achievements";
const SOUND_KEY: &str = "sound_enabled";
const USER_ID_KEY: &str = "user_id";

const STREAK_COMPLETIONS: u32 = 5;

const USER_ID_LEN: usize = 6;
const USER_ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Proof of a completed purchase for one quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRecord {
    pub transaction_id: String,
    pub unlocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarnedAchievement {
    pub id: AchievementId,
    pub quiz_id: QuizId,
    pub title: String,
    pub emoji: String,
    pub earned_at: DateTime<Utc>,
}

/// Per-quiz badge derived from play count and unlock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizBadge {
    /// Played at least once.
    Completion,
    /// Played five times or more.
    Streak,
    Premium,
}

impl QuizBadge {
    #[must_use]
    pub fn emoji(self) -> &'static str {
        match self {
            QuizBadge::Completion => "🎯",
            QuizBadge::Streak => "🔥",
            QuizBadge::Premium => "👑",
        }
    }
}

/// Persisted per-player state: unlocks, play counters, badges and flags.
///
/// Values are JSON documents under namespaced keys. A value that no longer
/// parses is logged and treated as absent.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    kv: Arc<dyn KeyValueStore>,
}

impl ProgressService {
    #[must_use]
    pub fn new(clock: Clock, kv: Arc<dyn KeyValueStore>) -> Self {
        Self { clock, kv }
    }

    // ─── Unlocks ───────────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns `ProgressError` on storage failures.
    pub async fn is_unlocked(&self, quiz: &QuizId) -> Result<bool, ProgressError> {
        Ok(self.unlock_record(quiz).await?.is_some())
    }

    /// # Errors
    ///
    /// Returns `ProgressError` on storage failures.
    pub async fn unlock_record(
        &self,
        quiz: &QuizId,
    ) -> Result<Option<UnlockRecord>, ProgressError> {
        self.read(&unlock_key(quiz)).await
    }

    /// Marks `quiz` as unlocked. An existing record is kept as is, so calling
    /// this twice stores one record.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` on storage failures.
    pub async fn unlock(
        &self,
        quiz: &QuizId,
        transaction_id: &str,
    ) -> Result<UnlockRecord, ProgressError> {
        if let Some(existing) = self.unlock_record(quiz).await? {
            debug!(quiz = %quiz, "quiz already unlocked");
            return Ok(existing);
        }
        let record = UnlockRecord {
            transaction_id: transaction_id.to_owned(),
            unlocked_at: self.clock.now(),
        };
        self.write(&unlock_key(quiz), &record).await?;
        info!(quiz = %quiz, transaction = %transaction_id, "quiz unlocked");
        Ok(record)
    }

    /// True when every quiz in `quizzes` is unlocked. An empty list grants
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` on storage failures.
    pub async fn has_full_access(&self, quizzes: &[QuizId]) -> Result<bool, ProgressError> {
        if quizzes.is_empty() {
            return Ok(false);
        }
        for quiz in quizzes {
            if !self.is_unlocked(quiz).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ─── Counters ──────────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns `ProgressError` on storage failures.
    pub async fn completions(&self, quiz: &QuizId) -> Result<u32, ProgressError> {
        Ok(self.read(&completions_key(quiz)).await?.unwrap_or(0))
    }

    /// Increments the play counter for `quiz` and returns the new count.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` on storage failures.
    pub async fn record_completion(&self, quiz: &QuizId) -> Result<u32, ProgressError> {
        let count = self.completions(quiz).await?.saturating_add(1);
        self.write(&completions_key(quiz), &count).await?;
        Ok(count)
    }

    /// Badges for `quiz` in display order: completion, streak, premium.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` on storage failures.
    pub async fn quiz_badges(&self, quiz: &QuizId) -> Result<Vec<QuizBadge>, ProgressError> {
        let completions = self.completions(quiz).await?;
        let mut badges = Vec::new();
        if completions > 0 {
            badges.push(QuizBadge::Completion);
        }
        if completions >= STREAK_COMPLETIONS {
            badges.push(QuizBadge::Streak);
        }
        if self.is_unlocked(quiz).await? {
            badges.push(QuizBadge::Premium);
        }
        Ok(badges)
    }

    // ─── Achievements ──────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns `ProgressError` on storage failures.
    pub async fn earned_achievements(&self) -> Result<Vec<EarnedAchievement>, ProgressError> {
        Ok(self.read(ACHIEVEMENTS_KEY).await?.unwrap_or_default())
    }

    /// Stores the badges in `rules` that were not earned before and returns
    /// only those.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` on storage failures.
    pub async fn award(
        &self,
        quiz: &QuizId,
        rules: &[&AchievementRule],
    ) -> Result<Vec<EarnedAchievement>, ProgressError> {
        let mut earned = self.earned_achievements().await?;
        let now = self.clock.now();
        let mut fresh = Vec::new();
        for rule in rules {
            let known = |e: &EarnedAchievement| &e.id == rule.id();
            if earned.iter().any(known) || fresh.iter().any(known) {
                continue;
            }
            fresh.push(EarnedAchievement {
                id: rule.id().clone(),
                quiz_id: quiz.clone(),
                title: rule.title().to_owned(),
                emoji: rule.emoji().to_owned(),
                earned_at: now,
            });
        }
        if fresh.is_empty() {
            return Ok(fresh);
        }
        earned.extend(fresh.iter().cloned());
        self.write(ACHIEVEMENTS_KEY, &earned).await?;
        for badge in &fresh {
            info!(quiz = %quiz, achievement = %badge.id, "achievement unlocked");
        }
        Ok(fresh)
    }

    // ─── Flags ─────────────────────────────────────────────────────────────────

    /// Sound is on unless explicitly turned off.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` on storage failures.
    pub async fn sound_enabled(&self) -> Result<bool, ProgressError> {
        Ok(self.read(SOUND_KEY).await?.unwrap_or(true))
    }

    /// Flips the sound flag and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` on storage failures.
    pub async fn toggle_sound(&self) -> Result<bool, ProgressError> {
        let enabled = !self.sound_enabled().await?;
        self.write(SOUND_KEY, &enabled).await?;
        Ok(enabled)
    }

    /// Opaque per-install id, generated and stored on first use.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` on storage failures.
    pub async fn user_id(&self) -> Result<String, ProgressError> {
        if let Some(id) = self.read::<String>(USER_ID_KEY).await? {
            if is_user_id(&id) {
                return Ok(id);
            }
            warn!(key = USER_ID_KEY, "stored user id is malformed; generating a new one");
        }
        let id = generate_user_id(&mut rand::rng());
        self.write(USER_ID_KEY, &id).await?;
        debug!(user_id = %id, "generated user id");
        Ok(id)
    }

    // ─── Reset ─────────────────────────────────────────────────────────────────

    /// Clears badges, play counters and unlocks. The sound flag and user id
    /// are kept. Returns the number of removed keys.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` on storage failures.
    pub async fn reset_progress(&self) -> Result<usize, ProgressError> {
        let mut keys = self.kv.keys_with_prefix(UNLOCK_PREFIX).await?;
        keys.extend(self.kv.keys_with_prefix(COMPLETIONS_PREFIX).await?);
        keys.push(ACHIEVEMENTS_KEY.to_owned());

        let mut removed = 0;
        for key in &keys {
            if self.kv.remove(key).await? {
                removed += 1;
            }
        }
        info!(removed, "progress reset");
        Ok(removed)
    }

    // ─── Helpers ───────────────────────────────────────────────────────────────

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ProgressError> {
        let Some(raw) = self.kv.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(key, error = %err, "ignoring malformed stored value");
                Ok(None)
            }
        }
    }

    async fn write<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), ProgressError> {
        let raw = serde_json::to_string(value)?;
        self.kv.set(key, &raw).await?;
        Ok(())
    }
}

fn unlock_key(quiz: &QuizId) -> String {
    format!("{UNLOCK_PREFIX}{quiz}")
}

fn completions_key(quiz: &QuizId) -> String {
    format!("{COMPLETIONS_PREFIX}{quiz}")
}

/// Six uppercase base-36 characters.
pub fn generate_user_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..USER_ID_LEN)
        .map(|_| char::from(USER_ID_ALPHABET[rng.random_range(0..USER_ID_ALPHABET.len())]))
        .collect()
}

fn is_user_id(raw: &str) -> bool {
    raw.len() == USER_ID_LEN && raw.bytes().all(|b| USER_ID_ALPHABET.contains(&b))
}
