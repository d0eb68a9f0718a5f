use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::ids::{CourseId, CourseScope, QuestionId, StudentId};
use crate::model::settings::ProgressSettings;

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// Practice state of one question for one student in one course.
///
/// `(student_id, course_id, question_id)` is the uniqueness key. A mastered
/// record is never in the active set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub student_id: StudentId,
    pub course_id: CourseId,
    pub question_id: QuestionId,
    pub correct_streak: u32,
    pub is_mastered: bool,
    pub is_in_active_set: bool,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// A newly introduced question: no streak, not mastered, in the active set.
    #[must_use]
    pub fn fresh(scope: &CourseScope, question_id: QuestionId, now: DateTime<Utc>) -> Self {
        Self {
            student_id: scope.student.clone(),
            course_id: scope.course.clone(),
            question_id,
            correct_streak: 0,
            is_mastered: false,
            is_in_active_set: true,
            updated_at: now,
        }
    }

    /// Returns true if this record counts toward the used ids (mastered or active).
    #[must_use]
    pub fn is_used(&self) -> bool {
        self.is_mastered || self.is_in_active_set
    }

    #[must_use]
    pub fn belongs_to(&self, scope: &CourseScope) -> bool {
        self.student_id == scope.student && self.course_id == scope.course
    }
}

//
// ─── ANSWER TRANSITION ─────────────────────────────────────────────────────────
//

/// Whether a submitted answer was correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Correct,
    Incorrect,
}

impl From<bool> for AnswerOutcome {
    fn from(correct: bool) -> Self {
        if correct { Self::Correct } else { Self::Incorrect }
    }
}

/// Next state of a record after one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerTransition {
    pub record: ProgressRecord,
    /// True only when this answer moved the question into mastery.
    pub newly_mastered: bool,
}

/// Applies one answer to the current record of `question_id`.
///
/// A missing record is treated as streak 0, not mastered, and joins the
/// active set.
///
/// | answer    | streak     | mastered                        | active set                          |
/// |-----------|------------|---------------------------------|-------------------------------------|
/// | correct   | `+1`       | `was \|\| streak >= threshold`  | `false` if mastered, else unchanged |
/// | incorrect | `0`        | unchanged                       | unchanged                           |
#[must_use]
pub fn apply_answer(
    existing: Option<&ProgressRecord>,
    scope: &CourseScope,
    question_id: &QuestionId,
    outcome: AnswerOutcome,
    settings: &ProgressSettings,
    now: DateTime<Utc>,
) -> AnswerTransition {
    let mut record = existing
        .cloned()
        .unwrap_or_else(|| ProgressRecord::fresh(scope, question_id.clone(), now));
    let was_mastered = record.is_mastered;

    match outcome {
        AnswerOutcome::Correct => {
            record.correct_streak = record.correct_streak.saturating_add(1);
            record.is_mastered = was_mastered || settings.is_mastery_streak(record.correct_streak);
            if record.is_mastered {
                record.is_in_active_set = false;
            }
        }
        AnswerOutcome::Incorrect => {
            record.correct_streak = 0;
        }
    }
    record.updated_at = now;

    AnswerTransition {
        newly_mastered: record.is_mastered && !was_mastered,
        record,
    }
}

//
// ─── SUMMARY ───────────────────────────────────────────────────────────────────
//

/// Aggregate view of a student's progress through a course pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub mastered_count: usize,
    pub active_count: usize,
    pub tracked_count: usize,
    pub total_questions: usize,
    pub percent_mastered: f64,
    pub is_complete: bool,
}

impl ProgressSummary {
    /// Summarizes `records` against the distinct ids of `pool`.
    ///
    /// Only mastered questions still in the pool count toward mastery, so a
    /// shrunken pool never reports more than 100%.
    #[must_use]
    pub fn from_records(records: &[ProgressRecord], pool: &[QuestionId]) -> Self {
        let pool: HashSet<&QuestionId> = pool.iter().collect();
        let total_questions = pool.len();
        let mastered_count = records
            .iter()
            .filter(|r| r.is_mastered && pool.contains(&r.question_id))
            .count();
        let active_count = records.iter().filter(|r| r.is_in_active_set).count();

        // Counts are bounded by realistic pool sizes.
        #[allow(clippy::cast_precision_loss)]
        let percent_mastered = if total_questions == 0 {
            0.0
        } else {
            (mastered_count as f64 / total_questions as f64) * 100.0
        };

        Self {
            mastered_count,
            active_count,
            tracked_count: records.len(),
            total_questions,
            percent_mastered,
            is_complete: total_questions > 0 && mastered_count >= total_questions,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn scope() -> CourseScope {
        CourseScope::new(
            StudentId::parse("s1").unwrap(),
            CourseId::parse("c1").unwrap(),
        )
    }

    fn q(id: &str) -> QuestionId {
        QuestionId::parse(id).unwrap()
    }

    fn answer(existing: Option<&ProgressRecord>, correct: bool) -> AnswerTransition {
        apply_answer(
            existing,
            &scope(),
            &q("q1"),
            correct.into(),
            &ProgressSettings::default(),
            fixed_now(),
        )
    }

    #[test]
    fn first_correct_answer_creates_active_record() {
        let t = answer(None, true);
        assert_eq!(t.record.correct_streak, 1);
        assert!(t.record.is_in_active_set);
        assert!(!t.record.is_mastered);
        assert!(!t.newly_mastered);
    }

    #[test]
    fn first_incorrect_answer_creates_active_record() {
        let t = answer(None, false);
        assert_eq!(t.record.correct_streak, 0);
        assert!(t.record.is_in_active_set);
        assert!(!t.record.is_mastered);
    }

    #[test]
    fn third_correct_answer_masters_and_leaves_active_set() {
        let one = answer(None, true);
        let two = answer(Some(&one.record), true);
        let three = answer(Some(&two.record), true);

        assert_eq!(three.record.correct_streak, 3);
        assert!(three.record.is_mastered);
        assert!(!three.record.is_in_active_set);
        assert!(three.newly_mastered);
    }

    #[test]
    fn incorrect_answer_resets_streak() {
        let one = answer(None, true);
        let two = answer(Some(&one.record), true);
        let miss = answer(Some(&two.record), false);
        assert_eq!(miss.record.correct_streak, 0);
        assert!(miss.record.is_in_active_set);

        let again = answer(Some(&miss.record), true);
        assert_eq!(again.record.correct_streak, 1);
        assert!(!again.record.is_mastered);
    }

    #[test]
    fn mastery_is_monotonic() {
        let mut record = ProgressRecord::fresh(&scope(), q("q1"), fixed_now());
        record.correct_streak = 3;
        record.is_mastered = true;
        record.is_in_active_set = false;

        let miss = answer(Some(&record), false);
        assert_eq!(miss.record.correct_streak, 0);
        assert!(miss.record.is_mastered);
        assert!(!miss.record.is_in_active_set);

        let hit = answer(Some(&miss.record), true);
        assert!(hit.record.is_mastered);
        assert!(!hit.newly_mastered);
    }

    #[test]
    fn custom_threshold_is_respected() {
        let settings = ProgressSettings::new(20, 1).unwrap();
        let t = apply_answer(
            None,
            &scope(),
            &q("q9"),
            AnswerOutcome::Correct,
            &settings,
            fixed_now(),
        );
        assert!(t.newly_mastered);
        assert!(!t.record.is_in_active_set);
    }

    #[test]
    fn summary_counts_and_completion() {
        let mut mastered = ProgressRecord::fresh(&scope(), q("q1"), fixed_now());
        mastered.is_mastered = true;
        mastered.is_in_active_set = false;
        let active = ProgressRecord::fresh(&scope(), q("q2"), fixed_now());

        let pool = [q("q1"), q("q2"), q("q3"), q("q4"), q("q4")];
        let summary = ProgressSummary::from_records(&[mastered.clone(), active], &pool);
        assert_eq!(summary.mastered_count, 1);
        assert_eq!(summary.active_count, 1);
        assert_eq!(summary.tracked_count, 2);
        assert!((summary.percent_mastered - 25.0).abs() < f64::EPSILON);
        assert!(!summary.is_complete);

        let done = ProgressSummary::from_records(&[mastered], &[q("q1")]);
        assert!(done.is_complete);
    }

    #[test]
    fn mastery_outside_the_pool_is_not_counted() {
        let mut gone = ProgressRecord::fresh(&scope(), q("q9"), fixed_now());
        gone.is_mastered = true;
        gone.is_in_active_set = false;
        let mut kept = ProgressRecord::fresh(&scope(), q("q1"), fixed_now());
        kept.is_mastered = true;
        kept.is_in_active_set = false;

        let summary = ProgressSummary::from_records(&[gone, kept], &[q("q1"), q("q2")]);
        assert_eq!(summary.mastered_count, 1);
        assert_eq!(summary.tracked_count, 2);
        assert!((summary.percent_mastered - 50.0).abs() < f64::EPSILON);
        assert!(!summary.is_complete);
    }

    #[test]
    fn empty_pool_summary_is_not_complete() {
        let summary = ProgressSummary::from_records(&[], &[]);
        assert!(!summary.is_complete);
        assert_eq!(summary.percent_mastered, 0.0);
    }
}
