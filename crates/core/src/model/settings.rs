use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("active set size must be > 0")]
    InvalidActiveSetSize,

    #[error("mastery streak must be > 0")]
    InvalidMasteryStreak,
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Tuning knobs for the adaptive practice loop.
///
/// - `active_set_size`: how many questions are seeded into a fresh active set
/// - `mastery_streak`: consecutive correct answers needed to master a question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSettings {
    active_set_size: u32,
    mastery_streak: u32,
}

impl ProgressSettings {
    pub const DEFAULT_ACTIVE_SET_SIZE: u32 = 20;
    pub const DEFAULT_MASTERY_STREAK: u32 = 3;

    /// Creates custom settings.
    ///
    /// # Errors
    ///
    /// Returns error if any parameter is zero.
    pub fn new(active_set_size: u32, mastery_streak: u32) -> Result<Self, SettingsError> {
        if active_set_size == 0 {
            return Err(SettingsError::InvalidActiveSetSize);
        }
        if mastery_streak == 0 {
            return Err(SettingsError::InvalidMasteryStreak);
        }
        Ok(Self {
            active_set_size,
            mastery_streak,
        })
    }

    #[must_use]
    pub fn active_set_size(&self) -> u32 {
        self.active_set_size
    }

    #[must_use]
    pub fn mastery_streak(&self) -> u32 {
        self.mastery_streak
    }

    /// Returns true once `streak` reaches the mastery threshold.
    #[must_use]
    pub fn is_mastery_streak(&self, streak: u32) -> bool {
        streak >= self.mastery_streak
    }
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            active_set_size: Self::DEFAULT_ACTIVE_SET_SIZE,
            mastery_streak: Self::DEFAULT_MASTERY_STREAK,
        }
    }
}
