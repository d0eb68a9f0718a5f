use async_trait::async_trait;
use practice_core::model::{CourseScope, ProgressRecord, QuestionId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// True when the failed unit of work can be retried as-is.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Conflict)
    }
}

/// Per-student, per-course progress persistence.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Open an atomic unit of work over one (student, course) record set.
    ///
    /// Dropping the returned handle without calling `commit` discards every
    /// write made through it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the transaction cannot be started.
    async fn begin(
        &self,
        scope: &CourseScope,
    ) -> Result<Box<dyn ProgressTransaction>, StorageError>;

    /// Read every record of a (student, course) pair, ordered by question id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the records cannot be read.
    async fn list_progress(&self, scope: &CourseScope)
    -> Result<Vec<ProgressRecord>, StorageError>;
}

/// Reads and writes applied inside one transaction, all scoped to the
/// (student, course) pair the transaction was opened for.
#[async_trait]
pub trait ProgressTransaction: Send {
    /// Number of records tracked for the scope.
    async fn count_records(&mut self) -> Result<u64, StorageError>;

    /// Record for one question, if it is tracked.
    async fn get_record(
        &mut self,
        question_id: &QuestionId,
    ) -> Result<Option<ProgressRecord>, StorageError>;

    /// Ids currently in the active set, ordered by question id.
    async fn list_active_question_ids(&mut self) -> Result<Vec<QuestionId>, StorageError>;

    /// Ids that are mastered or active.
    async fn list_used_question_ids(&mut self) -> Result<HashSet<QuestionId>, StorageError>;

    /// Insert the record, or overwrite the mutable fields of an existing one.
    async fn upsert_record(&mut self, record: &ProgressRecord) -> Result<(), StorageError>;

    /// Insert new records.
    ///
    /// Fails with `StorageError::Conflict` if any key is already tracked.
    async fn bulk_insert(&mut self, records: &[ProgressRecord]) -> Result<(), StorageError>;

    /// Make every write visible atomically.
    ///
    /// Fails with `StorageError::Conflict` if a concurrent commit invalidated
    /// what this transaction read.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;
}

fn ensure_scope(scope: &CourseScope, record: &ProgressRecord) -> Result<(), StorageError> {
    if record.belongs_to(scope) {
        Ok(())
    } else {
        Err(StorageError::Serialization(format!(
            "record for {}/{} written through {scope} transaction",
            record.student_id, record.course_id
        )))
    }
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Default)]
struct Partition {
    version: u64,
    records: BTreeMap<QuestionId, ProgressRecord>,
}

type Partitions = Arc<Mutex<HashMap<CourseScope, Partition>>>;

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Each (student, course) partition carries a version; a transaction works on
/// a snapshot and its commit is rejected if the version moved in between.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    partitions: Partitions,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            partitions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Snapshot transaction handed out by `InMemoryRepository`.
pub struct InMemoryTransaction {
    partitions: Partitions,
    scope: CourseScope,
    base_version: u64,
    working: BTreeMap<QuestionId, ProgressRecord>,
    dirty: bool,
}

#[async_trait]
impl ProgressStore for InMemoryRepository {
    async fn begin(
        &self,
        scope: &CourseScope,
    ) -> Result<Box<dyn ProgressTransaction>, StorageError> {
        let guard = self
            .partitions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let (base_version, working) = guard
            .get(scope)
            .map(|p| (p.version, p.records.clone()))
            .unwrap_or_default();
        Ok(Box::new(InMemoryTransaction {
            partitions: Arc::clone(&self.partitions),
            scope: scope.clone(),
            base_version,
            working,
            dirty: false,
        }))
    }

    async fn list_progress(
        &self,
        scope: &CourseScope,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let guard = self
            .partitions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .get(scope)
            .map(|p| p.records.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ProgressTransaction for InMemoryTransaction {
    async fn count_records(&mut self) -> Result<u64, StorageError> {
        u64::try_from(self.working.len())
            .map_err(|_| StorageError::Serialization("record count overflow".into()))
    }

    async fn get_record(
        &mut self,
        question_id: &QuestionId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        Ok(self.working.get(question_id).cloned())
    }

    async fn list_active_question_ids(&mut self) -> Result<Vec<QuestionId>, StorageError> {
        Ok(self
            .working
            .values()
            .filter(|r| r.is_in_active_set)
            .map(|r| r.question_id.clone())
            .collect())
    }

    async fn list_used_question_ids(&mut self) -> Result<HashSet<QuestionId>, StorageError> {
        Ok(self
            .working
            .values()
            .filter(|r| r.is_used())
            .map(|r| r.question_id.clone())
            .collect())
    }

    async fn upsert_record(&mut self, record: &ProgressRecord) -> Result<(), StorageError> {
        ensure_scope(&self.scope, record)?;
        self.working
            .insert(record.question_id.clone(), record.clone());
        self.dirty = true;
        Ok(())
    }

    async fn bulk_insert(&mut self, records: &[ProgressRecord]) -> Result<(), StorageError> {
        let mut staged = self.working.clone();
        for record in records {
            ensure_scope(&self.scope, record)?;
            if staged
                .insert(record.question_id.clone(), record.clone())
                .is_some()
            {
                return Err(StorageError::Conflict);
            }
        }
        self.working = staged;
        self.dirty = true;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let this = *self;
        let mut guard = this
            .partitions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let current = guard.get(&this.scope).map_or(0, |p| p.version);
        if current != this.base_version {
            return Err(StorageError::Conflict);
        }
        if this.dirty {
            let partition = guard.entry(this.scope).or_default();
            partition.version = current + 1;
            partition.records = this.working;
        }
        Ok(())
    }
}

/// Aggregates the progress store behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let progress: Arc<dyn ProgressStore> = Arc::new(InMemoryRepository::new());
        Self { progress }
    }
}
