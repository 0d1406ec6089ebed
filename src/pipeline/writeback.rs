use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::AnalysisCache;
use crate::model::{AnalysisResponse, RepoKey};
use crate::store::{RepoRecord, RepoStore};

#[derive(Debug)]
pub enum WriteJob {
    /// Cache the response, upsert the row, then count the view that
    /// produced it. The view is counted even if the upsert failed.
    Fresh {
        key: RepoKey,
        record: Box<RepoRecord>,
        response: Box<AnalysisResponse>,
    },
    RecordView { key: RepoKey },
}

impl WriteJob {
    fn key(&self) -> &RepoKey {
        match self {
            WriteJob::Fresh { key, .. } | WriteJob::RecordView { key } => key,
        }
    }
}

/// Background writes that happen after a response has gone out. Jobs go
/// through a bounded queue drained by a fixed set of workers; when the
/// queue is full the job is dropped with a warning.
pub struct WriteBehind {
    sender: mpsc::Sender<WriteJob>,
    workers: Vec<JoinHandle<()>>,
}

impl WriteBehind {
    pub fn spawn(
        workers: usize,
        capacity: usize,
        cache: AnalysisCache,
        store: Arc<dyn RepoStore>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                let cache = cache.clone();
                let store = Arc::clone(&store);

                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else { break };
                        run_job(id, job, &cache, store.as_ref()).await;
                    }
                    debug!(worker = id, "write-behind worker stopped");
                })
            })
            .collect();

        Self { sender, workers }
    }

    /// Returns false when the job was dropped.
    pub fn submit(&self, job: WriteJob) -> bool {
        let Err(e) = self.sender.try_send(job) else {
            return true;
        };
        let (reason, job) = match e {
            mpsc::error::TrySendError::Full(job) => ("queue full", job),
            mpsc::error::TrySendError::Closed(job) => ("queue closed", job),
        };
        warn!(repo = %job.key(), reason, "dropped background write");
        false
    }

    pub async fn drain(self) {
        drop(self.sender);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "write-behind worker panicked");
            }
        }
    }
}

async fn run_job(worker: usize, job: WriteJob, cache: &AnalysisCache, store: &dyn RepoStore) {
    match job {
        WriteJob::Fresh {
            key,
            record,
            response,
        } => {
            cache.put(&key, &response).await;
            match store.upsert(*record).await {
                Ok(()) => info!(worker, repo = %key, "saved repo to store"),
                Err(e) => warn!(worker, repo = %key, error = %format!("{e:#}"), "failed to save repo"),
            }
            record_view(worker, &key, store).await;
        }
        WriteJob::RecordView { key } => record_view(worker, &key, store).await,
    }
}

async fn record_view(worker: usize, key: &RepoKey, store: &dyn RepoStore) {
    match store.increment_view_count(key).await {
        Ok(true) => debug!(worker, repo = %key, "incremented views"),
        Ok(false) => debug!(worker, repo = %key, "no stored repo to count a view for"),
        Err(e) => warn!(worker, repo = %key, error = %format!("{e:#}"), "failed to increment views"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryObjectStore, cache_key};
    use crate::clock::ManualClock;
    use crate::model::RepoAnalysis;
    use crate::store::TopRepoFilter;
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tokio::sync::{Notify, Semaphore};

    /// Logs every call in order. Upserts can be made to fail or to block
    /// until the test hands out a permit.
    #[derive(Default)]
    struct RecordingStore {
        events: std::sync::Mutex<Vec<String>>,
        fail_upsert: bool,
        gate: Option<(Arc<Notify>, Arc<Semaphore>)>,
    }

    impl RecordingStore {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[async_trait]
    impl RepoStore for RecordingStore {
        async fn upsert(&self, record: RepoRecord) -> Result<()> {
            if let Some((started, permits)) = &self.gate {
                started.notify_one();
                permits.acquire().await?.forget();
            }
            self.push(format!("upsert {}", record.repo_name));
            if self.fail_upsert {
                bail!("disk full");
            }
            Ok(())
        }

        async fn increment_view_count(&self, key: &RepoKey) -> Result<bool> {
            self.push(format!("view {}", key.repo));
            Ok(!self.fail_upsert)
        }

        async fn fetch_top_by_lines(&self, _: &TopRepoFilter) -> Result<Vec<RepoRecord>> {
            Ok(Vec::new())
        }
    }

    fn cache(objects: &Arc<MemoryObjectStore>) -> AnalysisCache {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        AnalysisCache::new(objects.clone(), Arc::new(clock))
    }

    fn fresh(repo: &str) -> WriteJob {
        let key = RepoKey::new("acme", repo);
        let analysis = RepoAnalysis {
            total_added: 10,
            total_removed: 2,
            total_commits: 3,
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        WriteJob::Fresh {
            record: Box::new(RepoRecord::from_analysis(&key, &analysis, now)),
            response: Box::new(AnalysisResponse {
                analysis,
                commits: Vec::new(),
            }),
            key,
        }
    }

    #[tokio::test]
    async fn fresh_job_caches_then_upserts_then_counts_the_view() {
        let objects = Arc::new(MemoryObjectStore::new());
        let store = Arc::new(RecordingStore::default());
        let writes = WriteBehind::spawn(1, 4, cache(&objects), store.clone());

        assert!(writes.submit(fresh("widgets")));
        assert!(writes.submit(WriteJob::RecordView {
            key: RepoKey::new("acme", "widgets"),
        }));
        writes.drain().await;

        assert_eq!(
            store.events(),
            vec!["upsert widgets", "view widgets", "view widgets"]
        );
        assert!(objects.contains(&cache_key(&RepoKey::new("acme", "widgets"))).await);
    }

    #[tokio::test]
    async fn failed_upsert_is_absorbed_and_the_view_is_still_counted() {
        let objects = Arc::new(MemoryObjectStore::new());
        let store = Arc::new(RecordingStore {
            fail_upsert: true,
            ..Default::default()
        });
        let writes = WriteBehind::spawn(2, 4, cache(&objects), store.clone());

        assert!(writes.submit(fresh("widgets")));
        assert!(writes.submit(fresh("gadgets")));
        writes.drain().await;

        let mut events = store.events();
        events.sort();
        assert_eq!(
            events,
            vec!["upsert gadgets", "upsert widgets", "view gadgets", "view widgets"]
        );
        assert!(objects.contains(&cache_key(&RepoKey::new("acme", "widgets"))).await);
        assert!(objects.contains(&cache_key(&RepoKey::new("acme", "gadgets"))).await);
    }

    #[tokio::test]
    async fn full_queue_drops_whole_jobs() {
        let started = Arc::new(Notify::new());
        let permits = Arc::new(Semaphore::new(0));
        let objects = Arc::new(MemoryObjectStore::new());
        let store = Arc::new(RecordingStore {
            gate: Some((started.clone(), permits.clone())),
            ..Default::default()
        });
        let writes = WriteBehind::spawn(1, 1, cache(&objects), store.clone());

        assert!(writes.submit(fresh("first")));
        started.notified().await;

        assert!(writes.submit(fresh("second")));
        assert!(!writes.submit(fresh("third")));
        assert!(!writes.submit(WriteJob::RecordView {
            key: RepoKey::new("acme", "first"),
        }));

        permits.add_permits(2);
        writes.drain().await;

        assert_eq!(
            store.events(),
            vec!["upsert first", "view first", "upsert second", "view second"]
        );
        for (repo, cached) in [("first", true), ("second", true), ("third", false)] {
            let key = cache_key(&RepoKey::new("acme", repo));
            assert_eq!(objects.contains(&key).await, cached, "{repo}");
        }
    }
}
