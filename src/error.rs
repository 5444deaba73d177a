//! Error taxonomy for content loading and segment validation.

use thiserror::Error;

/// Failure reported by a [`crate::content::ContentStore`] for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request for {url} failed: {message}")]
    Network { url: String, message: String },
}

/// Fatal to a load cycle: the host shows its "content unavailable" state.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("no reading for week {week}, grade {grade}: {reason}")]
    NotFound {
        week: u32,
        grade: String,
        reason: String,
    },

    #[error("reading manifest for week {week} is malformed: {source}")]
    InvalidManifest {
        week: u32,
        #[source]
        source: serde_json::Error,
    },
}

impl ContentError {
    pub(crate) fn not_found(week: u32, grade: &str, reason: impl ToString) -> Self {
        Self::NotFound {
            week,
            grade: grade.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Non-fatal: annotation is disabled and the vocabulary panel stays empty.
#[derive(Debug, Error)]
#[error("vocabulary for week {week}, grade {grade} unavailable: {reason}")]
pub struct VocabularyUnavailable {
    pub week: u32,
    pub grade: String,
    pub reason: String,
}

/// Non-fatal: the quiz panel shows its "no quiz" message instead.
#[derive(Debug, Error)]
#[error("quiz for week {week}, grade {grade} unavailable: {reason}")]
pub struct QuizUnavailable {
    pub week: u32,
    pub grade: String,
    pub reason: String,
}

/// Segment list that cannot drive highlighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MalformedSegments {
    #[error("reading has no segments")]
    Empty,

    #[error("segment {index} starts before the segment preceding it")]
    OutOfOrder { index: usize },
}
