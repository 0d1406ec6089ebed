mod histogram;

pub use histogram::lines_histogram;

use indexmap::IndexSet;

use crate::model::{CommitRecord, FileTouch};
use crate::parse::FileTouches;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub total_added: u64,
    pub total_removed: u64,
    pub total_contributors: usize,
    pub total_commits: usize,
}

impl Totals {
    pub fn net_lines(&self) -> i64 {
        self.total_added as i64 - self.total_removed as i64
    }
}

pub fn summarize(commits: &[CommitRecord]) -> Totals {
    let mut totals = Totals {
        total_commits: commits.len(),
        ..Totals::default()
    };

    for commit in commits {
        totals.total_added += commit.lines_added;
        totals.total_removed += commit.lines_removed;
    }
    totals.total_contributors = contributors(commits).len();

    totals
}

/// Distinct author strings in first-occurrence order. Authors are compared
/// by exact name, so "Ada" and "ada" are two contributors.
pub fn contributors(commits: &[CommitRecord]) -> IndexSet<&str> {
    commits.iter().map(|c| c.author.as_str()).collect()
}

/// The `limit` most touched paths, highest count first. Equal counts keep
/// the order in which the paths were first seen.
pub fn top_touched(touches: &FileTouches, limit: usize) -> Vec<FileTouch> {
    let mut ranked: Vec<(&str, u64)> = touches.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    ranked
        .into_iter()
        .take(limit)
        .map(|(path, count)| FileTouch {
            path: path.to_string(),
            count,
        })
        .collect()
}
