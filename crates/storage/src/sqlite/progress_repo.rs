use std::collections::HashSet;

use practice_core::model::{CourseScope, ProgressRecord, QuestionId};
use sqlx::{Sqlite, Transaction};

use super::{
    SqliteRepository,
    mapping::{map_progress_row, map_question_id_row, map_sqlx_error, streak_to_i64},
};
use crate::repository::{ProgressStore, ProgressTransaction, StorageError};

const BEGIN_IMMEDIATE: &str = "BEGIN IMMEDIATE";

const INSERT_PROGRESS: &str = r"
    INSERT INTO adaptive_test_progress (
        student_id, course_id, question_id,
        correct_streak, is_mastered, is_in_active_set, updated_at
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
";

/// Open `SQLite` transaction scoped to one (student, course) pair.
///
/// Holds the database write lock from `begin` until commit or drop, so
/// concurrent writers are serialized. Rolled back by sqlx when dropped
/// without `commit`.
pub struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
    scope: CourseScope,
}

impl SqliteTransaction {
    fn check_scope(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        if record.belongs_to(&self.scope) {
            Ok(())
        } else {
            Err(StorageError::Serialization(format!(
                "record for {}/{} written through {} transaction",
                record.student_id, record.course_id, self.scope
            )))
        }
    }
}

#[async_trait::async_trait]
impl ProgressStore for SqliteRepository {
    async fn begin(
        &self,
        scope: &CourseScope,
    ) -> Result<Box<dyn ProgressTransaction>, StorageError> {
        // Take the write lock up front so writers queue on `busy_timeout`
        // instead of failing a read-to-write upgrade.
        let tx = self
            .pool
            .begin_with(BEGIN_IMMEDIATE)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Box::new(SqliteTransaction {
            tx,
            scope: scope.clone(),
        }))
    }

    async fn list_progress(
        &self,
        scope: &CourseScope,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                student_id, course_id, question_id,
                correct_streak, is_mastered, is_in_active_set, updated_at
            FROM adaptive_test_progress
            WHERE student_id = ?1 AND course_id = ?2
            ORDER BY question_id ASC
            ",
        )
        .bind(scope.student.as_str())
        .bind(scope.course.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_progress_row(&row)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl ProgressTransaction for SqliteTransaction {
    async fn count_records(&mut self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*)
            FROM adaptive_test_progress
            WHERE student_id = ?1 AND course_id = ?2
            ",
        )
        .bind(self.scope.student.as_str())
        .bind(self.scope.course.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        u64::try_from(count)
            .map_err(|_| StorageError::Serialization(format!("invalid record count: {count}")))
    }

    async fn get_record(
        &mut self,
        question_id: &QuestionId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                student_id, course_id, question_id,
                correct_streak, is_mastered, is_in_active_set, updated_at
            FROM adaptive_test_progress
            WHERE student_id = ?1 AND course_id = ?2 AND question_id = ?3
            ",
        )
        .bind(self.scope.student.as_str())
        .bind(self.scope.course.as_str())
        .bind(question_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn list_active_question_ids(&mut self) -> Result<Vec<QuestionId>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT question_id
            FROM adaptive_test_progress
            WHERE student_id = ?1 AND course_id = ?2 AND is_in_active_set = 1
            ORDER BY question_id ASC
            ",
        )
        .bind(self.scope.student.as_str())
        .bind(self.scope.course.as_str())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(map_question_id_row).collect()
    }

    async fn list_used_question_ids(&mut self) -> Result<HashSet<QuestionId>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT question_id
            FROM adaptive_test_progress
            WHERE student_id = ?1 AND course_id = ?2
              AND (is_mastered = 1 OR is_in_active_set = 1)
            ",
        )
        .bind(self.scope.student.as_str())
        .bind(self.scope.course.as_str())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(map_question_id_row).collect()
    }

    async fn upsert_record(&mut self, record: &ProgressRecord) -> Result<(), StorageError> {
        self.check_scope(record)?;

        sqlx::query(
            r"
            INSERT INTO adaptive_test_progress (
                student_id, course_id, question_id,
                correct_streak, is_mastered, is_in_active_set, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(student_id, course_id, question_id) DO UPDATE SET
                correct_streak = excluded.correct_streak,
                is_mastered = excluded.is_mastered,
                is_in_active_set = excluded.is_in_active_set,
                updated_at = excluded.updated_at
            ",
        )
        .bind(record.student_id.as_str())
        .bind(record.course_id.as_str())
        .bind(record.question_id.as_str())
        .bind(streak_to_i64(record.correct_streak))
        .bind(record.is_mastered)
        .bind(record.is_in_active_set)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn bulk_insert(&mut self, records: &[ProgressRecord]) -> Result<(), StorageError> {
        for record in records {
            self.check_scope(record)?;

            sqlx::query(INSERT_PROGRESS)
                .bind(record.student_id.as_str())
                .bind(record.course_id.as_str())
                .bind(record.question_id.as_str())
                .bind(streak_to_i64(record.correct_streak))
                .bind(record.is_mastered)
                .bind(record.is_in_active_set)
                .bind(record.updated_at)
                .execute(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }
}
