use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when an identifier is missing or blank.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },
}

/// Identifier of a student taking practice sessions.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    /// Parses a `StudentId`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Empty` if nothing is left after trimming.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        non_empty(raw, "studentId").map(Self)
    }

    /// Returns the underlying string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of a course whose question pool a student practices.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(String);

impl CourseId {
    /// Parses a `CourseId`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Empty` if nothing is left after trimming.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        non_empty(raw, "courseId").map(Self)
    }

    /// Returns the underlying string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of a single question in a course pool.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(String);

impl QuestionId {
    /// Parses a `QuestionId`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Empty` if nothing is left after trimming.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        non_empty(raw, "questionId").map(Self)
    }

    /// Returns the underlying string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn non_empty(raw: &str, kind: &'static str) -> Result<String, IdError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IdError::Empty { kind });
    }
    Ok(trimmed.to_owned())
}

/// The (student, course) pair every progress record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CourseScope {
    pub student: StudentId,
    pub course: CourseId,
}

impl CourseScope {
    #[must_use]
    pub fn new(student: StudentId, course: CourseId) -> Self {
        Self { student, course }
    }
}

impl fmt::Display for CourseScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.student, self.course)
    }
}

impl fmt::Debug for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StudentId({:?})", self.0)
    }
}

impl fmt::Debug for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CourseId({:?})", self.0)
    }
}

impl fmt::Debug for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QuestionId({:?})", self.0)
    }
}

// ─── Display Implementations ───────────────────────────────────────────────────

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── FromStr Implementations ───────────────────────────────────────────────────

impl FromStr for StudentId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl FromStr for CourseId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl FromStr for QuestionId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_id_display() {
        let id = QuestionId::parse("q42").unwrap();
        assert_eq!(id.to_string(), "q42");
    }

    #[test]
    fn parse_trims_whitespace() {
        let id: StudentId = "  alice ".parse().unwrap();
        assert_eq!(id.as_str(), "alice");
    }

    #[test]
    fn blank_ids_are_rejected() {
        let err = CourseId::parse("   ").unwrap_err();
        assert_eq!(err, IdError::Empty { kind: "courseId" });
        assert!(QuestionId::parse("").is_err());
    }

    #[test]
    fn debug_names_the_kind() {
        let id = QuestionId::parse("q1").unwrap();
        assert_eq!(format!("{id:?}"), "QuestionId(\"q1\")");
    }

    #[test]
    fn scope_display_joins_ids() {
        let scope = CourseScope::new(
            StudentId::parse("s1").unwrap(),
            CourseId::parse("c1").unwrap(),
        );
        assert_eq!(scope.to_string(), "s1/c1");
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = QuestionId::parse("q7").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"q7\"");
    }
}
