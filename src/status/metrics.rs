//! Evaluator counters, shared across the heartbeat path, the sweeper and
//! the REST surface.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct RuntimeStatusMetrics {
    master_evaluations_total: AtomicU64,
    master_evaluations_failed: AtomicU64,
    slave_evaluations_total: AtomicU64,
    slave_evaluations_failed: AtomicU64,
    slave_bundles_built: AtomicU64,
    last_cluster_size: AtomicU64,
}

impl RuntimeStatusMetrics {
    pub fn record_master_eval_success(&self) {
        self.master_evaluations_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_master_eval_failure(&self) {
        self.master_evaluations_total.fetch_add(1, Ordering::Relaxed);
        self.master_evaluations_failed
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slave_eval_success(&self) {
        self.slave_evaluations_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slave_eval_failure(&self) {
        self.slave_evaluations_total.fetch_add(1, Ordering::Relaxed);
        self.slave_evaluations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slave_bundle(&self, cluster_size: u64) {
        self.slave_bundles_built.fetch_add(1, Ordering::Relaxed);
        self.last_cluster_size.store(cluster_size, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RuntimeStatusMetricsSnapshot {
        RuntimeStatusMetricsSnapshot {
            master_evaluations_total: self.master_evaluations_total.load(Ordering::Relaxed),
            master_evaluations_failed: self.master_evaluations_failed.load(Ordering::Relaxed),
            slave_evaluations_total: self.slave_evaluations_total.load(Ordering::Relaxed),
            slave_evaluations_failed: self.slave_evaluations_failed.load(Ordering::Relaxed),
            slave_bundles_built: self.slave_bundles_built.load(Ordering::Relaxed),
            last_cluster_size: self.last_cluster_size.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeStatusMetricsSnapshot {
    pub master_evaluations_total: u64,
    pub master_evaluations_failed: u64,
    pub slave_evaluations_total: u64,
    pub slave_evaluations_failed: u64,
    pub slave_bundles_built: u64,
    pub last_cluster_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_into_the_snapshot() {
        let metrics = RuntimeStatusMetrics::default();
        metrics.record_master_eval_success();
        metrics.record_master_eval_failure();
        metrics.record_slave_eval_success();
        metrics.record_slave_eval_failure();
        metrics.record_slave_bundle(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.master_evaluations_total, 2);
        assert_eq!(snapshot.master_evaluations_failed, 1);
        assert_eq!(snapshot.slave_evaluations_total, 2);
        assert_eq!(snapshot.slave_evaluations_failed, 1);
        assert_eq!(snapshot.slave_bundles_built, 1);
        assert_eq!(snapshot.last_cluster_size, 3);
    }
}
