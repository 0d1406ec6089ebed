pub mod batch;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod git;
pub mod github;
pub mod model;
pub mod parse;
pub mod pipeline;
pub mod stats;
pub mod store;

pub use error::{AnalysisError, RetrievalError};
pub use model::{AnalysisResponse, AnalyzeRequest, CommitRecord, RepoAnalysis, RepoKey};
pub use pipeline::{AnalysisOutcome, Analyzer, AnalyzerSettings, Collaborators};
