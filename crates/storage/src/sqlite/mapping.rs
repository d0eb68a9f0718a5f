use practice_core::model::{CourseId, ProgressRecord, QuestionId, StudentId};
use sqlx::Row;

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Primary result codes that mean another writer got there first.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Classifies a sqlx failure: lock contention, stale snapshots, and key
/// collisions become `Conflict`; everything else is a connection failure.
pub(crate) fn map_sqlx_error(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StorageError::Conflict;
        }
        // Extended codes (e.g. SQLITE_BUSY_SNAPSHOT = 517) carry the primary code in the low byte.
        let primary = db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| code & 0xff);
        if matches!(primary, Some(SQLITE_BUSY | SQLITE_LOCKED)) {
            return StorageError::Conflict;
        }
    }
    StorageError::Connection(e.to_string())
}

pub(crate) fn streak_to_i64(streak: u32) -> i64 {
    i64::from(streak)
}

pub(crate) fn map_question_id_row(row: &sqlx::sqlite::SqliteRow) -> Result<QuestionId, StorageError> {
    QuestionId::parse(&row.try_get::<String, _>("question_id").map_err(ser)?).map_err(ser)
}

pub(crate) fn map_progress_row(row: &sqlx::sqlite::SqliteRow) -> Result<ProgressRecord, StorageError> {
    let streak_i64: i64 = row.try_get("correct_streak").map_err(ser)?;
    let correct_streak = u32::try_from(streak_i64)
        .map_err(|_| StorageError::Serialization(format!("invalid correct_streak: {streak_i64}")))?;

    Ok(ProgressRecord {
        student_id: StudentId::parse(&row.try_get::<String, _>("student_id").map_err(ser)?)
            .map_err(ser)?,
        course_id: CourseId::parse(&row.try_get::<String, _>("course_id").map_err(ser)?)
            .map_err(ser)?,
        question_id: map_question_id_row(row)?,
        correct_streak,
        is_mastered: row.try_get("is_mastered").map_err(ser)?,
        is_in_active_set: row.try_get("is_in_active_set").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}
