use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AnalysisError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoKey {
    pub owner: String,
    pub repo: String,
}

impl RepoKey {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Case-folded `owner/repo`, the identity used by the cache and the batch dedup.
    pub fn normalized(&self) -> String {
        format!(
            "{}/{}",
            self.owner.to_lowercase(),
            self.repo.to_lowercase()
        )
    }

    pub fn remote_url(&self, base: &str) -> String {
        format!("{}/{}/{}.git", base.trim_end_matches('/'), self.owner, self.repo)
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepoKey {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, repo) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| AnalysisError::InvalidRequest(format!("expected owner/repo, got '{s}'")))?;

        AnalyzeRequest {
            owner: owner.to_string(),
            repo: repo.to_string(),
        }
        .validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(alias = "username", default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
}

impl AnalyzeRequest {
    pub fn validate(&self) -> Result<RepoKey, AnalysisError> {
        let owner = self.owner.trim();
        let repo = self.repo.trim();

        if owner.is_empty() {
            return Err(AnalysisError::InvalidRequest("owner is required".into()));
        }
        if repo.is_empty() {
            return Err(AnalysisError::InvalidRequest("repo is required".into()));
        }
        if owner.contains('/') || repo.contains('/') {
            return Err(AnalysisError::InvalidRequest(format!(
                "owner and repo must not contain '/': {owner}/{repo}"
            )));
        }

        Ok(RepoKey::new(owner, repo))
    }
}

/// One parsed commit. Field names are kept short on the wire because the
/// commit list dominates the size of cached responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    #[serde(rename = "h")]
    pub hash: String,
    #[serde(rename = "a")]
    pub author: String,
    #[serde(rename = "d")]
    pub timestamp: i64,
    #[serde(rename = "+", default, skip_serializing_if = "is_zero")]
    pub lines_added: u64,
    #[serde(rename = "-", default, skip_serializing_if = "is_zero")]
    pub lines_removed: u64,
    #[serde(rename = "m", default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(rename = "f", default, skip_serializing_if = "Option::is_none")]
    pub files_touched: Option<u64>,
}

impl CommitRecord {
    pub fn net_lines(&self) -> i64 {
        self.lines_added as i64 - self.lines_removed as i64
    }
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTouch {
    #[serde(rename = "file")]
    pub path: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMetadata {
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionList {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<PullRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub user: PullRequestAuthor,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub comments: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestLinks>,
    #[serde(default)]
    pub reactions: Reactions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestAuthor {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub html_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestLinks {
    #[serde(default)]
    pub merged_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reactions {
    #[serde(default)]
    pub total_count: u64,
    #[serde(rename = "+1", default)]
    pub plus_one: u64,
    #[serde(rename = "-1", default)]
    pub minus_one: u64,
    #[serde(default)]
    pub laugh: u64,
    #[serde(default)]
    pub hooray: u64,
    #[serde(default)]
    pub confused: u64,
    #[serde(default)]
    pub heart: u64,
    #[serde(default)]
    pub rocket: u64,
    #[serde(default)]
    pub eyes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoAnalysis {
    pub total_added: u64,
    pub total_removed: u64,
    pub total_contributors: usize,
    pub total_commits: usize,
    pub lines_histogram: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub most_touched_files: Vec<FileTouch>,
    #[serde(rename = "github", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RepoMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_requests: Option<DiscussionList>,
}

impl RepoAnalysis {
    pub fn net_lines(&self) -> i64 {
        self.total_added as i64 - self.total_removed as i64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    #[serde(flatten)]
    pub analysis: RepoAnalysis,
    #[serde(default)]
    pub commits: Vec<CommitRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_key_is_case_folded() {
        let key = RepoKey::new("Rust-Lang", "Rust");
        assert_eq!(key.normalized(), "rust-lang/rust");
        assert_eq!(key.to_string(), "Rust-Lang/Rust");
    }

    #[test]
    fn remote_url_trims_trailing_slash() {
        let key = RepoKey::new("acme", "widgets");
        assert_eq!(
            key.remote_url("https://github.com/"),
            "https://github.com/acme/widgets.git"
        );
    }

    #[test]
    fn request_accepts_username_alias() {
        let request: AnalyzeRequest =
            serde_json::from_str(r#"{"username":"acme","repo":"widgets"}"#).unwrap();
        assert_eq!(request.validate().unwrap(), RepoKey::new("acme", "widgets"));
    }

    #[test]
    fn request_requires_both_fields() {
        let missing_owner = AnalyzeRequest {
            owner: "  ".into(),
            repo: "widgets".into(),
        };
        assert!(matches!(
            missing_owner.validate(),
            Err(AnalysisError::InvalidRequest(msg)) if msg.contains("owner")
        ));

        let missing_repo: AnalyzeRequest = serde_json::from_str(r#"{"owner":"acme"}"#).unwrap();
        assert!(matches!(
            missing_repo.validate(),
            Err(AnalysisError::InvalidRequest(msg)) if msg.contains("repo")
        ));
    }

    #[test]
    fn parses_owner_repo_pairs() {
        let key: RepoKey = "acme/widgets".parse().unwrap();
        assert_eq!(key, RepoKey::new("acme", "widgets"));
        assert!("acme".parse::<RepoKey>().is_err());
        assert!("acme/".parse::<RepoKey>().is_err());
    }

    #[test]
    fn commit_record_uses_compact_keys() {
        let record = CommitRecord {
            hash: "abc1234".into(),
            author: "Ada".into(),
            timestamp: 1_700_000_000,
            lines_added: 5,
            lines_removed: 0,
            message: String::new(),
            files_touched: Some(2),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"h": "abc1234", "a": "Ada", "d": 1_700_000_000, "+": 5, "f": 2})
        );
    }

    #[test]
    fn response_flattens_analysis_fields() {
        let response = AnalysisResponse {
            analysis: RepoAnalysis {
                total_added: 10,
                total_removed: 4,
                total_contributors: 1,
                total_commits: 1,
                lines_histogram: vec![6],
                ..Default::default()
            },
            commits: Vec::new(),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["totalAdded"], 10);
        assert_eq!(json["linesHistogram"], serde_json::json!([6]));
        assert!(json.get("github").is_none());
        assert_eq!(json["commits"], serde_json::json!([]));
    }
}
