//! Time-bounded debug visualizations
//!
//! Each query id owns at most one set of debug artifacts in the host. Entries
//! expire after their TTL; [`VisualizationManager::sweep`] releases the
//! artifacts of every expired entry and must run before active entries are
//! reported.

use crate::environment::DebugArtifactHost;
use crate::types::ArtifactHandle;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Artifacts spawned for one query
#[derive(Debug, Clone)]
pub struct VisualizationEntry {
    pub artifacts: Vec<ArtifactHandle>,
    pub expiration_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Public view of an active entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveVisualization {
    pub query_id: String,
    pub artifact_count: usize,
    pub expiration_time: DateTime<Utc>,
}

pub struct VisualizationManager {
    entries: DashMap<String, VisualizationEntry>,
    host: Arc<dyn DebugArtifactHost>,
}

impl VisualizationManager {
    pub fn new(host: Arc<dyn DebugArtifactHost>) -> Self {
        Self {
            entries: DashMap::new(),
            host,
        }
    }

    /// Stores `artifacts` for `query_id` until `now + ttl`.
    ///
    /// A previous entry for the same id is swapped out under the shard lock
    /// and its artifacts released.
    pub fn activate(
        &self,
        query_id: &str,
        artifacts: Vec<ArtifactHandle>,
        ttl: chrono::Duration,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let expiration_time = now + ttl;
        let entry = VisualizationEntry {
            artifacts,
            expiration_time,
            created_at: now,
        };
        if let Some(previous) = self.entries.insert(query_id.to_string(), entry) {
            debug!("Replacing visualization for '{}'", query_id);
            self.release(previous);
        }
        expiration_time
    }

    /// Releases and removes every entry with `expiration_time < now`.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.expiration_time < now)
            .map(|entry| entry.key().clone())
            .collect();

        let mut swept = 0;
        for query_id in expired {
            // Re-checked under the shard lock in case the entry was re-activated
            if let Some((_, entry)) = self.entries.remove_if(&query_id, |_, e| e.expiration_time < now) {
                self.release(entry);
                swept += 1;
            }
        }
        if swept > 0 {
            info!("🧹 Swept {} expired visualization(s)", swept);
        }
        swept
    }

    /// Sweeps, then lists what is left, ordered by query id.
    pub fn active(&self, now: DateTime<Utc>) -> Vec<ActiveVisualization> {
        self.sweep(now);
        let mut active: Vec<ActiveVisualization> = self
            .entries
            .iter()
            .map(|entry| ActiveVisualization {
                query_id: entry.key().clone(),
                artifact_count: entry.artifacts.len(),
                expiration_time: entry.expiration_time,
            })
            .collect();
        active.sort_by(|a, b| a.query_id.cmp(&b.query_id));
        active
    }

    /// Releases one entry immediately; false when there was none.
    pub fn deactivate(&self, query_id: &str) -> bool {
        match self.entries.remove(query_id) {
            Some((_, entry)) => {
                self.release(entry);
                true
            }
            None => false,
        }
    }

    /// Releases every entry, expired or not.
    pub fn clear(&self) -> usize {
        let query_ids: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        query_ids.iter().filter(|id| self.deactivate(id)).count()
    }

    /// Entry count without sweeping.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn release(&self, entry: VisualizationEntry) {
        for handle in entry.artifacts {
            self.host.release(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::InMemoryHost;
    use crate::types::Vec3;
    use chrono::{Duration, TimeZone};

    fn setup() -> (Arc<InMemoryHost>, VisualizationManager) {
        let host = Arc::new(InMemoryHost::new());
        let manager = VisualizationManager::new(host.clone());
        (host, manager)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_sweep_is_strict() {
        let (host, manager) = setup();
        let markers = vec![host.spawn_marker(Vec3::ZERO, 1.0, "a")];
        let expiry = manager.activate("a", markers, Duration::seconds(10), t0());

        // Expiring exactly now is not yet stale
        assert_eq!(manager.sweep(expiry), 0);
        assert_eq!(manager.len(), 1);
        assert_eq!(host.live_marker_count(), 1);

        assert_eq!(manager.sweep(expiry + Duration::milliseconds(1)), 1);
        assert!(manager.is_empty());
        assert_eq!(host.live_marker_count(), 0);
    }

    #[test]
    fn test_reactivation_releases_previous_artifacts() {
        let (host, manager) = setup();
        let first = vec![host.spawn_marker(Vec3::ZERO, 1.0, "q"), host.spawn_marker(Vec3::ONE, 0.5, "q")];
        manager.activate("q", first, Duration::seconds(5), t0());
        let second = vec![host.spawn_marker(Vec3::ZERO, 1.0, "q")];
        manager.activate("q", second, Duration::seconds(5), t0());

        assert_eq!(manager.len(), 1);
        assert_eq!(host.live_marker_count(), 1);
    }

    #[test]
    fn test_active_excludes_stale_entries() {
        let (host, manager) = setup();
        manager.activate("short", vec![host.spawn_marker(Vec3::ZERO, 1.0, "s")], Duration::seconds(1), t0());
        manager.activate("long", vec![host.spawn_marker(Vec3::ZERO, 1.0, "l")], Duration::seconds(60), t0());

        let active = manager.active(t0() + Duration::seconds(30));
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].query_id, "long");
        assert_eq!(host.live_marker_count(), 1);

        assert!(manager.deactivate("long"));
        assert!(!manager.deactivate("long"));
        assert_eq!(host.live_marker_count(), 0);
    }

    #[test]
    fn test_clear_releases_unexpired_entries() {
        let (host, manager) = setup();
        manager.activate("a", vec![host.spawn_marker(Vec3::ZERO, 1.0, "a")], Duration::seconds(60), t0());
        manager.activate("b", vec![host.spawn_marker(Vec3::ONE, 1.0, "b")], Duration::seconds(60), t0());
        assert_eq!(manager.clear(), 2);
        assert!(manager.is_empty());
        assert_eq!(host.live_marker_count(), 0);
    }

    #[test]
    fn test_concurrent_reactivation_keeps_one_live_set() {
        let (host, manager) = setup();
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let (host, manager) = (&host, &manager);
                scope.spawn(move || {
                    for i in 0..500 {
                        let marker = host.spawn_marker(Vec3::new(worker as f64, i as f64, 0.0), 1.0, "q");
                        manager.activate("q", vec![marker], Duration::seconds(60), t0());
                    }
                });
            }
        });

        assert_eq!(manager.len(), 1);
        assert_eq!(host.live_marker_count(), 1);
        assert_eq!(manager.clear(), 1);
        assert_eq!(host.live_marker_count(), 0);
    }
}
