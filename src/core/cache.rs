// src/core/cache.rs

//! Scan result cache.
//!
//! The one place in the core needing cross-request coordination: concurrent
//! scans of the same fingerprint must share one underlying computation
//! instead of racing to populate the cache. Each key owns a `OnceCell` slot;
//! the first caller runs the build, everyone else awaits the same cell.
//! Completed reports are served until the slot's TTL lapses.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::core::error::ScanError;
use crate::core::models::ScanReport;

struct CacheSlot {
    cell: Arc<OnceCell<Arc<ScanReport>>>,
    created_at: Instant,
}

pub struct ScanCache {
    ttl: Duration,
    slots: Mutex<HashMap<String, CacheSlot>>,
}

impl ScanCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, slots: Mutex::new(HashMap::new()) }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached report for `key`, or runs `build` to produce it.
    ///
    /// At most one build runs per key at a time; a failed build leaves the
    /// slot empty so a later request can try again. The TTL is measured from
    /// slot creation.
    pub async fn get_or_build<F, Fut>(&self, key: &str, build: F) -> Result<Arc<ScanReport>, ScanError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ScanReport, ScanError>>,
    {
        let cell = {
            let mut slots = self.slots.lock().await;
            if let Some(slot) = slots.get(key) {
                // Only a completed slot can expire; an in-flight build keeps
                // its cell so racing callers still share it.
                if slot.cell.initialized() && slot.created_at.elapsed() >= self.ttl {
                    debug!(key, "Cache entry expired, evicting.");
                    slots.remove(key);
                }
            }
            slots
                .entry(key.to_string())
                .or_insert_with(|| CacheSlot {
                    cell: Arc::new(OnceCell::new()),
                    created_at: Instant::now(),
                })
                .cell
                .clone()
        };

        let was_cached = cell.initialized();
        let report = cell.get_or_try_init(|| async { build().await.map(Arc::new) }).await?;
        if was_cached {
            debug!(key, scan_id = %report.scan_id, "Serving scan from cache.");
        }
        Ok(report.clone())
    }

    /// Non-building peek, used by callers that only want a prior verdict.
    pub async fn lookup(&self, key: &str) -> Option<Arc<ScanReport>> {
        let slots = self.slots.lock().await;
        let slot = slots.get(key)?;
        if slot.created_at.elapsed() >= self.ttl {
            return None;
        }
        slot.cell.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{
        BaseScore, CacheInfo, PipelineMode, ReputationSummary, RiskLevel, ScanReport, StageTimings,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dummy_report(scan_id: &str) -> ScanReport {
        ScanReport {
            scan_id: scan_id.to_string(),
            fingerprint: crate::core::pipeline::fingerprint::fingerprint("https://example.com")
                .expect("valid url"),
            mode: PipelineMode::Minimal,
            reachability: None,
            categories: Vec::new(),
            reputation: ReputationSummary::default(),
            base_score: BaseScore::default(),
            consensus: None,
            legitimacy: None,
            final_score: 0,
            risk_percentage: 0.0,
            risk_level: RiskLevel::Safe,
            started_at: chrono::Utc::now(),
            completed_at: chrono::Utc::now(),
            timings: StageTimings::default(),
            cache: CacheInfo::default(),
        }
    }

    #[tokio::test]
    async fn concurrent_first_scans_share_one_build() {
        let cache = Arc::new(ScanCache::new(Duration::from_secs(60)));
        let builds = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let builds = builds.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_build("fingerprint-a", || async move {
                        builds.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok(dummy_report("only-build"))
                    })
                    .await
                    .expect("build succeeds")
            }));
        }

        let mut scan_ids = Vec::new();
        for handle in handles {
            scan_ids.push(handle.await.expect("task joins").scan_id.clone());
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1, "exactly one underlying computation");
        assert!(scan_ids.iter().all(|id| id == "only-build"));
    }

    #[tokio::test]
    async fn identical_requests_within_ttl_reuse_the_report() {
        let cache = ScanCache::new(Duration::from_secs(60));
        let first = cache
            .get_or_build("key", || async { Ok(dummy_report("first")) })
            .await
            .expect("build succeeds");
        let second = cache
            .get_or_build("key", || async {
                panic!("collaborators must not be re-invoked inside the TTL")
            })
            .await
            .expect("served from cache");
        assert_eq!(first.scan_id, second.scan_id);
    }

    #[tokio::test]
    async fn expired_entries_rebuild() {
        let cache = ScanCache::new(Duration::from_millis(20));
        let first = cache
            .get_or_build("key", || async { Ok(dummy_report("first")) })
            .await
            .expect("build succeeds");
        tokio::time::sleep(Duration::from_millis(40)).await;
        let second = cache
            .get_or_build("key", || async { Ok(dummy_report("second")) })
            .await
            .expect("rebuild succeeds");
        assert_ne!(first.scan_id, second.scan_id);
    }

    #[tokio::test]
    async fn failed_builds_are_not_cached() {
        let cache = ScanCache::new(Duration::from_secs(60));
        let failed = cache
            .get_or_build("key", || async { Err(ScanError::Fatal("persist failed".to_string())) })
            .await;
        assert!(failed.is_err());

        let recovered = cache
            .get_or_build("key", || async { Ok(dummy_report("recovered")) })
            .await
            .expect("later build succeeds");
        assert_eq!(recovered.scan_id, "recovered");
        assert!(cache.lookup("key").await.is_some());
    }
}
