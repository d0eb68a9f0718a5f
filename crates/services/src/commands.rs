//! Normalized command layer: decoded requests in, serializable results out.
//!
//! Transport adapters decode their payload into `ProgressCommand`, hand it to
//! `dispatch`, and encode the returned `CommandResponse` as-is.

use serde::{Deserialize, Serialize};
use tracing::warn;

use practice_core::model::{
    CourseId, CourseScope, ProgressRecord, ProgressSummary, QuestionId, StudentId,
};

use crate::error::{ErrorKind, InputError, ProgressError};
use crate::progress_engine::{AnswerResult, InitOutcome, ProgressEngine};

pub const INITIALIZED_MESSAGE: &str = "Initialized";
pub const ALREADY_INITIALIZED_MESSAGE: &str = "Already initialized";

//
// ─── REQUESTS ──────────────────────────────────────────────────────────────────
//

/// Identifier as sent by clients: either a string or a bare number.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_text(self) -> String {
        match self {
            RawId::Text(text) => text,
            RawId::Number(n) => n.to_string(),
        }
    }
}

/// One request, tagged by its `action` field.
///
/// Identifier fields are optional so a missing value is reported as an
/// input error naming the field rather than as a decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(
    tag = "action",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ProgressCommand {
    Init {
        student_id: Option<RawId>,
        course_id: Option<RawId>,
        #[serde(default)]
        all_question_ids: Vec<RawId>,
    },
    GetProgress {
        student_id: Option<RawId>,
        course_id: Option<RawId>,
    },
    Answer {
        student_id: Option<RawId>,
        course_id: Option<RawId>,
        question_id: Option<RawId>,
        is_correct: Option<bool>,
        #[serde(default)]
        all_question_ids: Vec<RawId>,
    },
    Summary {
        student_id: Option<RawId>,
        course_id: Option<RawId>,
        #[serde(default)]
        all_question_ids: Vec<RawId>,
    },
    Next {
        student_id: Option<RawId>,
        course_id: Option<RawId>,
    },
}

fn required(value: Option<RawId>, field: &'static str) -> Result<String, InputError> {
    value
        .map(RawId::into_text)
        .ok_or(InputError::MissingField(field))
}

fn parse_scope(
    student_id: Option<RawId>,
    course_id: Option<RawId>,
) -> Result<CourseScope, InputError> {
    let student = StudentId::parse(&required(student_id, "studentId")?)?;
    let course = CourseId::parse(&required(course_id, "courseId")?)?;
    Ok(CourseScope::new(student, course))
}

fn parse_pool(ids: Vec<RawId>) -> Result<Vec<QuestionId>, InputError> {
    ids.into_iter()
        .map(|id| QuestionId::parse(&id.into_text()).map_err(InputError::from))
        .collect()
}

//
// ─── RESPONSES ─────────────────────────────────────────────────────────────────
//

/// One tracked question as reported by `getProgress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub question_id: QuestionId,
    pub correct_streak: u32,
    pub is_mastered: bool,
    pub is_in_active_set: bool,
}

impl From<ProgressRecord> for ProgressEntry {
    fn from(record: ProgressRecord) -> Self {
        Self {
            question_id: record.question_id,
            correct_streak: record.correct_streak,
            is_mastered: record.is_mastered,
            is_in_active_set: record.is_in_active_set,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

/// Result of one command, serialized without an enclosing tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum CommandResponse {
    Initialized {
        message: &'static str,
        active_set: Vec<QuestionId>,
    },
    AlreadyInitialized {
        message: &'static str,
    },
    Progress {
        progress: Vec<ProgressEntry>,
    },
    Mastered {
        mastered: bool,
        active_set: Vec<QuestionId>,
    },
    Updated {
        updated: bool,
    },
    Summary(ProgressSummary),
    Next {
        question_id: Option<QuestionId>,
    },
    Error {
        error: ErrorBody,
    },
}

impl CommandResponse {
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, CommandResponse::Error { .. })
    }
}

impl From<InitOutcome> for CommandResponse {
    fn from(outcome: InitOutcome) -> Self {
        match outcome {
            InitOutcome::Initialized { active_set } => CommandResponse::Initialized {
                message: INITIALIZED_MESSAGE,
                active_set,
            },
            InitOutcome::AlreadyInitialized => CommandResponse::AlreadyInitialized {
                message: ALREADY_INITIALIZED_MESSAGE,
            },
        }
    }
}

impl From<AnswerResult> for CommandResponse {
    fn from(result: AnswerResult) -> Self {
        match result {
            AnswerResult::Updated => CommandResponse::Updated { updated: true },
            AnswerResult::Mastered { active_set, .. } => CommandResponse::Mastered {
                mastered: true,
                active_set,
            },
        }
    }
}

impl From<&ProgressError> for CommandResponse {
    fn from(err: &ProgressError) -> Self {
        CommandResponse::Error {
            error: ErrorBody {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }
}

//
// ─── DISPATCH ──────────────────────────────────────────────────────────────────
//

/// Run one command against the engine.
///
/// Input is fully validated before the store is touched.
///
/// # Errors
///
/// Returns `ProgressError::Input` for missing or blank identifiers and any
/// error the engine reports.
pub async fn try_dispatch(
    engine: &ProgressEngine,
    command: ProgressCommand,
) -> Result<CommandResponse, ProgressError> {
    match command {
        ProgressCommand::Init {
            student_id,
            course_id,
            all_question_ids,
        } => {
            let scope = parse_scope(student_id, course_id)?;
            let pool = parse_pool(all_question_ids)?;
            Ok(engine.initialize(&scope, &pool).await?.into())
        }
        ProgressCommand::GetProgress {
            student_id,
            course_id,
        } => {
            let scope = parse_scope(student_id, course_id)?;
            let progress = engine
                .get_progress(&scope)
                .await?
                .into_iter()
                .map(ProgressEntry::from)
                .collect();
            Ok(CommandResponse::Progress { progress })
        }
        ProgressCommand::Answer {
            student_id,
            course_id,
            question_id,
            is_correct,
            all_question_ids,
        } => {
            let scope = parse_scope(student_id, course_id)?;
            let question = QuestionId::parse(&required(question_id, "questionId")?)
                .map_err(InputError::from)?;
            let correct = is_correct.ok_or(InputError::MissingField("isCorrect"))?;
            let pool = parse_pool(all_question_ids)?;
            Ok(engine
                .record_answer(&scope, &question, correct, &pool)
                .await?
                .into())
        }
        ProgressCommand::Summary {
            student_id,
            course_id,
            all_question_ids,
        } => {
            let scope = parse_scope(student_id, course_id)?;
            let pool = parse_pool(all_question_ids)?;
            Ok(CommandResponse::Summary(
                engine.summary(&scope, &pool).await?,
            ))
        }
        ProgressCommand::Next {
            student_id,
            course_id,
        } => {
            let scope = parse_scope(student_id, course_id)?;
            Ok(CommandResponse::Next {
                question_id: engine.next_question(&scope).await?,
            })
        }
    }
}

/// Like `try_dispatch`, but folds errors into `CommandResponse::Error`.
pub async fn dispatch(engine: &ProgressEngine, command: ProgressCommand) -> CommandResponse {
    match try_dispatch(engine, command).await {
        Ok(response) => response,
        Err(err) => {
            warn!(kind = ?err.kind(), error = %err, "command failed");
            CommandResponse::from(&err)
        }
    }
}

/// Decode one JSON command and dispatch it.
pub async fn dispatch_json(engine: &ProgressEngine, payload: &str) -> CommandResponse {
    match serde_json::from_str::<ProgressCommand>(payload) {
        Ok(command) => dispatch(engine, command).await,
        Err(err) => {
            let err = ProgressError::from(InputError::MalformedPayload(err.to_string()));
            warn!(error = %err, "rejected command");
            CommandResponse::from(&err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_answer_command() {
        let cmd: ProgressCommand = serde_json::from_value(json!({
            "action": "answer",
            "studentId": "s1",
            "courseId": 7,
            "questionId": "q1",
            "isCorrect": true,
            "allQuestionIds": ["q1", 2]
        }))
        .unwrap();

        assert_eq!(
            cmd,
            ProgressCommand::Answer {
                student_id: Some(RawId::Text("s1".into())),
                course_id: Some(RawId::Number(7)),
                question_id: Some(RawId::Text("q1".into())),
                is_correct: Some(true),
                all_question_ids: vec![RawId::Text("q1".into()), RawId::Number(2)],
            }
        );
    }

    #[test]
    fn decodes_get_progress_without_pool() {
        let cmd: ProgressCommand = serde_json::from_value(json!({
            "action": "getProgress",
            "studentId": "s1",
            "courseId": "c1"
        }))
        .unwrap();
        assert!(matches!(cmd, ProgressCommand::GetProgress { .. }));
    }

    #[test]
    fn missing_pool_defaults_to_empty() {
        let cmd: ProgressCommand =
            serde_json::from_value(json!({ "action": "init", "studentId": "s1" })).unwrap();
        let ProgressCommand::Init {
            course_id,
            all_question_ids,
            ..
        } = cmd
        else {
            panic!("expected init");
        };
        assert_eq!(course_id, None);
        assert!(all_question_ids.is_empty());
    }

    #[test]
    fn unknown_action_is_rejected() {
        let err = serde_json::from_value::<ProgressCommand>(json!({ "action": "finish" }));
        assert!(err.is_err());
    }

    #[test]
    fn responses_serialize_to_wire_shapes() {
        let q1 = QuestionId::parse("q1").unwrap();

        let init = CommandResponse::from(InitOutcome::Initialized {
            active_set: vec![q1.clone()],
        });
        assert_eq!(
            serde_json::to_value(&init).unwrap(),
            json!({ "message": "Initialized", "activeSet": ["q1"] })
        );

        let again = CommandResponse::from(InitOutcome::AlreadyInitialized);
        assert_eq!(
            serde_json::to_value(&again).unwrap(),
            json!({ "message": "Already initialized" })
        );

        let mastered = CommandResponse::from(AnswerResult::Mastered {
            active_set: vec![q1.clone()],
            replacement: Some(q1),
        });
        assert_eq!(
            serde_json::to_value(&mastered).unwrap(),
            json!({ "mastered": true, "activeSet": ["q1"] })
        );

        let updated = CommandResponse::from(AnswerResult::Updated);
        assert_eq!(
            serde_json::to_value(&updated).unwrap(),
            json!({ "updated": true })
        );
    }

    #[test]
    fn error_response_carries_kind_and_message() {
        let err = ProgressError::from(InputError::MissingField("courseId"));
        let response = CommandResponse::from(&err);
        assert!(response.is_error());
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "error": { "kind": "input", "message": "courseId is required" } })
        );
    }

    #[test]
    fn progress_entry_uses_camel_case() {
        let entry = ProgressEntry {
            question_id: QuestionId::parse("q3").unwrap(),
            correct_streak: 2,
            is_mastered: false,
            is_in_active_set: true,
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "questionId": "q3",
                "correctStreak": 2,
                "isMastered": false,
                "isInActiveSet": true
            })
        );
    }
}
