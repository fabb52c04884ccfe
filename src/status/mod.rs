//! Runtime-status machine. `engine` holds the pure evaluation functions;
//! `service` orchestrates recomputation, persistence and config publishes;
//! `metrics` counts what the evaluator did.

mod engine;
mod metrics;
mod service;

pub use engine::{
    evaluate_master_status, evaluate_slave_status, ClusterSnapshot, MasterClusterEntry,
    MasterEvaluation, MasterInput, SlaveEvaluation, SlaveInput,
};
pub use metrics::{RuntimeStatusMetrics, RuntimeStatusMetricsSnapshot};
pub use service::StatusService;
