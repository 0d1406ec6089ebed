use std::time::Duration;
use thiserror::Error;

use crate::model::RepoKey;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("repository not found: {0}")]
    NotFound(String),

    #[error("failed to retrieve history for {repo}: {message}")]
    Retrieval { repo: String, message: String },

    #[error("log output could not be read: {0}")]
    UnreadableLog(String),

    #[error("analysis task failed: {0}")]
    Task(String),
}

impl AnalysisError {
    pub fn status_code(&self) -> u16 {
        match self {
            AnalysisError::InvalidRequest(_) => 400,
            AnalysisError::NotFound(_) => 404,
            AnalysisError::Retrieval { .. }
            | AnalysisError::UnreadableLog(_)
            | AnalysisError::Task(_) => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AnalysisError::NotFound(_))
    }
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("failed to create scratch directory: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git clone failed ({status}): {stderr}")]
    Clone { status: String, stderr: String },

    #[error("git log failed ({status}): {stderr}")]
    Log { status: String, stderr: String },

    #[error("{stage} timed out after {}s", .after.as_secs())]
    Timeout { stage: &'static str, after: Duration },
}

// Substrings git prints (or that our own error text carries) when the remote
// does not exist. Auth failures and network timeouts are not told apart.
const NOT_FOUND_MARKERS: &[&str] = &[
    "exit status: 128",
    "Repository not found",
    "fatal: repository",
    "remote: Repository not found",
];

pub fn looks_like_not_found(message: &str) -> bool {
    NOT_FOUND_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Maps a retrieval failure onto the two caller-visible outcomes by
/// inspecting its text. This is the only place that does so.
pub fn classify_retrieval_failure(key: &RepoKey, message: &str) -> AnalysisError {
    if looks_like_not_found(message) {
        AnalysisError::NotFound(key.to_string())
    } else {
        AnalysisError::Retrieval {
            repo: key.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> RepoKey {
        RepoKey::new("acme", "missing")
    }

    #[test]
    fn remote_not_found_is_classified() {
        let err = RetrievalError::Clone {
            status: "exit status: 128".into(),
            stderr: "remote: Repository not found.\nfatal: repository 'https://github.com/acme/missing.git/' not found".into(),
        };

        let classified = classify_retrieval_failure(&key(), &err.to_string());
        assert!(classified.is_not_found());
        assert_eq!(classified.status_code(), 404);
    }

    #[test]
    fn timeouts_are_generic_failures() {
        let err = RetrievalError::Timeout {
            stage: "git clone",
            after: Duration::from_secs(600),
        };

        let classified = classify_retrieval_failure(&key(), &err.to_string());
        assert!(matches!(classified, AnalysisError::Retrieval { .. }));
        assert_eq!(classified.status_code(), 500);
        assert_eq!(
            classified.to_string(),
            "failed to retrieve history for acme/missing: git clone timed out after 600s"
        );
    }

    #[test]
    fn other_exit_codes_are_generic_failures() {
        let classified = classify_retrieval_failure(
            &key(),
            "git log failed (exit status: 1): error: unknown option",
        );
        assert!(!classified.is_not_found());
    }

    #[test]
    fn invalid_requests_map_to_bad_request() {
        assert_eq!(
            AnalysisError::InvalidRequest("owner is required".into()).status_code(),
            400
        );
    }
}
