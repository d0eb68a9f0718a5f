mod ids;
mod progress;
mod settings;

pub use ids::{CourseId, CourseScope, IdError, QuestionId, StudentId};
pub use progress::{
    AnswerOutcome, AnswerTransition, ProgressRecord, ProgressSummary, apply_answer,
};
pub use settings::{ProgressSettings, SettingsError};
