use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, instrument, warn};

use practice_core::{
    model::{
        CourseScope, ProgressRecord, ProgressSettings, ProgressSummary, QuestionId, apply_answer,
    },
    selection,
    time::Clock,
};
use storage::repository::{ProgressStore, ProgressTransaction, StorageError};

use crate::error::ProgressError;

//
// ─── RESULTS ───────────────────────────────────────────────────────────────────
//

/// Result of seeding a student's active set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Initialized { active_set: Vec<QuestionId> },
    AlreadyInitialized,
}

/// Result of recording one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerResult {
    /// Streak changed; the active set did not.
    Updated,
    /// The question was just mastered and the active set rebalanced.
    ///
    /// `replacement` is `None` when the pool had no unused question left.
    Mastered {
        active_set: Vec<QuestionId>,
        replacement: Option<QuestionId>,
    },
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Drives the adaptive practice loop for one course at a time.
///
/// Every operation runs inside one store transaction; a failed call leaves no
/// partial state behind and nothing is retried internally.
pub struct ProgressEngine {
    store: Arc<dyn ProgressStore>,
    settings: ProgressSettings,
    clock: Clock,
    rng: Mutex<StdRng>,
}

impl ProgressEngine {
    /// Create an engine with default settings, real-time clock, and OS-seeded randomness.
    #[must_use]
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self {
            store,
            settings: ProgressSettings::default(),
            clock: Clock::default(),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ProgressSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    /// Seed the random source so selections are reproducible.
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(StdRng::seed_from_u64(seed))
    }

    #[must_use]
    pub fn settings(&self) -> &ProgressSettings {
        &self.settings
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        // The generator holds no invariant a panicking holder could break.
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed the active set with a random sample of the pool.
    ///
    /// Does nothing when the student already has records for the course.
    /// If a concurrent call wins the race, this call reports
    /// `AlreadyInitialized` instead of failing.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Conflict` if the transaction was invalidated and
    /// no competing initialization is visible, or `ProgressError::Storage` on
    /// store failures.
    #[instrument(skip_all, fields(scope = %scope, pool = pool.len()))]
    pub async fn initialize(
        &self,
        scope: &CourseScope,
        pool: &[QuestionId],
    ) -> Result<InitOutcome, ProgressError> {
        let mut tx = self.store.begin(scope).await?;
        if tx.count_records().await? > 0 {
            debug!("progress already initialized");
            return Ok(InitOutcome::AlreadyInitialized);
        }

        let size = usize::try_from(self.settings.active_set_size()).unwrap_or(usize::MAX);
        let active_set = {
            let mut rng = self.rng();
            selection::sample_initial(pool, size, &mut *rng)
        };
        let now = self.clock.now();
        let records: Vec<ProgressRecord> = active_set
            .iter()
            .map(|id| ProgressRecord::fresh(scope, id.clone(), now))
            .collect();

        match insert_and_commit(tx, &records).await {
            Ok(()) => {
                info!(active = active_set.len(), "initialized active set");
                Ok(InitOutcome::Initialized { active_set })
            }
            Err(StorageError::Conflict) => self.resolve_initialize_race(scope).await,
            Err(err) => Err(err.into()),
        }
    }

    async fn resolve_initialize_race(
        &self,
        scope: &CourseScope,
    ) -> Result<InitOutcome, ProgressError> {
        let existing = self.store.list_progress(scope).await?;
        if existing.is_empty() {
            warn!("initialize conflicted without a visible winner");
            return Err(ProgressError::Conflict(StorageError::Conflict));
        }
        info!("concurrent initialize won the race");
        Ok(InitOutcome::AlreadyInitialized)
    }

    /// Apply one answer and, on a fresh mastery, backfill the active set.
    ///
    /// - A question without a record is tracked from here on and joins the active set.
    /// - The backfill reads the active set after the mastering write, so the
    ///   mastered question is already excluded.
    /// - Replacements are drawn from `pool` minus every mastered or active id.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Conflict` if a concurrent write invalidated the
    /// transaction, or `ProgressError::Storage` on store failures. Either way
    /// nothing is persisted.
    #[instrument(skip_all, fields(scope = %scope, question = %question_id, correct = correct))]
    pub async fn record_answer(
        &self,
        scope: &CourseScope,
        question_id: &QuestionId,
        correct: bool,
        pool: &[QuestionId],
    ) -> Result<AnswerResult, ProgressError> {
        let now = self.clock.now();
        let mut tx = self.store.begin(scope).await?;

        let existing = tx.get_record(question_id).await?;
        let transition = apply_answer(
            existing.as_ref(),
            scope,
            question_id,
            correct.into(),
            &self.settings,
            now,
        );
        debug!(
            streak = transition.record.correct_streak,
            mastered = transition.record.is_mastered,
            tracked = existing.is_some(),
            "applying answer"
        );
        tx.upsert_record(&transition.record).await?;

        if !transition.newly_mastered {
            tx.commit().await?;
            return Ok(AnswerResult::Updated);
        }

        let mut active_set = tx.list_active_question_ids().await?;
        let used = tx.list_used_question_ids().await?;
        let replacement = {
            let mut rng = self.rng();
            selection::pick_backfill(pool, &used, &mut *rng)
        };

        match &replacement {
            Some(id) => {
                tx.bulk_insert(&[ProgressRecord::fresh(scope, id.clone(), now)])
                    .await?;
                active_set.push(id.clone());
            }
            None => warn!("question pool exhausted; active set shrinks"),
        }
        tx.commit().await?;

        info!(
            active = active_set.len(),
            replacement = replacement.as_ref().map(QuestionId::as_str),
            "question mastered"
        );
        Ok(AnswerResult::Mastered {
            active_set,
            replacement,
        })
    }

    /// Every tracked record for the student and course, ordered by question id.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the records cannot be read.
    pub async fn get_progress(
        &self,
        scope: &CourseScope,
    ) -> Result<Vec<ProgressRecord>, ProgressError> {
        Ok(self.store.list_progress(scope).await?)
    }

    /// Mastery counts measured against the distinct ids in `pool`; mastered
    /// questions that left the pool are not counted.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the records cannot be read.
    pub async fn summary(
        &self,
        scope: &CourseScope,
        pool: &[QuestionId],
    ) -> Result<ProgressSummary, ProgressError> {
        let records = self.store.list_progress(scope).await?;
        Ok(ProgressSummary::from_records(&records, pool))
    }

    /// Pick the next question to present, uniformly from the active set.
    ///
    /// Returns `None` when the active set is empty.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the records cannot be read.
    pub async fn next_question(
        &self,
        scope: &CourseScope,
    ) -> Result<Option<QuestionId>, ProgressError> {
        let active: Vec<QuestionId> = self
            .store
            .list_progress(scope)
            .await?
            .into_iter()
            .filter(|r| r.is_in_active_set)
            .map(|r| r.question_id)
            .collect();
        let mut rng = self.rng();
        Ok(selection::pick_next(&active, &mut *rng))
    }
}

async fn insert_and_commit(
    mut tx: Box<dyn ProgressTransaction>,
    records: &[ProgressRecord],
) -> Result<(), StorageError> {
    tx.bulk_insert(records).await?;
    tx.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use practice_core::model::{CourseId, StudentId};
    use practice_core::time::fixed_clock;
    use storage::repository::InMemoryRepository;

    fn scope() -> CourseScope {
        CourseScope::new(
            StudentId::parse("s1").unwrap(),
            CourseId::parse("c1").unwrap(),
        )
    }

    fn pool(n: u32) -> Vec<QuestionId> {
        (1..=n)
            .map(|i| QuestionId::parse(&format!("q{i}")).unwrap())
            .collect()
    }

    fn engine() -> ProgressEngine {
        ProgressEngine::new(Arc::new(InMemoryRepository::new()))
            .with_clock(fixed_clock())
            .with_seed(42)
    }

    #[tokio::test]
    async fn custom_settings_shrink_initial_set() {
        let engine = engine().with_settings(ProgressSettings::new(5, 2).unwrap());
        let outcome = engine.initialize(&scope(), &pool(10)).await.unwrap();
        match outcome {
            InitOutcome::Initialized { active_set } => assert_eq!(active_set.len(), 5),
            InitOutcome::AlreadyInitialized => panic!("expected fresh initialization"),
        }
    }

    #[tokio::test]
    async fn custom_mastery_streak_triggers_backfill() {
        let engine = engine().with_settings(ProgressSettings::new(1, 2).unwrap());
        let pool = pool(2);
        let InitOutcome::Initialized { active_set } =
            engine.initialize(&scope(), &pool).await.unwrap()
        else {
            panic!("expected fresh initialization");
        };
        let first = active_set[0].clone();

        let one = engine
            .record_answer(&scope(), &first, true, &pool)
            .await
            .unwrap();
        assert_eq!(one, AnswerResult::Updated);

        let two = engine
            .record_answer(&scope(), &first, true, &pool)
            .await
            .unwrap();
        let AnswerResult::Mastered {
            active_set,
            replacement,
        } = two
        else {
            panic!("expected mastery");
        };
        assert_eq!(active_set.len(), 1);
        assert_ne!(active_set[0], first);
        assert_eq!(replacement.as_ref(), Some(&active_set[0]));
    }

    #[tokio::test]
    async fn same_seed_gives_same_initial_set() {
        let a = engine().initialize(&scope(), &pool(40)).await.unwrap();
        let b = engine().initialize(&scope(), &pool(40)).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn next_question_is_active() {
        let engine = engine();
        assert_eq!(engine.next_question(&scope()).await.unwrap(), None);

        engine.initialize(&scope(), &pool(3)).await.unwrap();
        let next = engine.next_question(&scope()).await.unwrap().unwrap();
        assert!(pool(3).contains(&next));
    }
}
