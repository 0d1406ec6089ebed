use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::model::AnalysisResponse;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub cached_at: DateTime<Utc>,
    pub data: AnalysisResponse,
}

impl CacheEntry {
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.cached_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        self.age(now) > ttl
    }
}
