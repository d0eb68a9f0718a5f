use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned migrations for the progress schema.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: adaptive practice progress.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS adaptive_test_progress (
                    student_id TEXT NOT NULL,
                    course_id TEXT NOT NULL,
                    question_id TEXT NOT NULL,
                    correct_streak INTEGER NOT NULL DEFAULT 0 CHECK (correct_streak >= 0),
                    is_mastered INTEGER NOT NULL DEFAULT 0 CHECK (is_mastered IN (0, 1)),
                    is_in_active_set INTEGER NOT NULL DEFAULT 1 CHECK (is_in_active_set IN (0, 1)),
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (student_id, course_id, question_id),
                    CHECK (NOT (is_mastered = 1 AND is_in_active_set = 1))
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_progress_scope_active
                    ON adaptive_test_progress (student_id, course_id, is_in_active_set);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
