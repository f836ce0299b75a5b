//! # Performance Optimizer
//!
//! Coordinates the cache, client pools, task manager and background queue
//! behind one request-scoped API and a periodic maintenance routine.

pub mod coordinator;
pub mod metrics;
pub mod middleware;

pub use coordinator::{
    ComponentHealth, HealthReport, MaintenanceReport, OptimizerBuilder, PerformanceOptimizer,
    QueueHealth,
};
pub use metrics::{
    EndpointReport, PerformanceReport, RequestMetrics, ThresholdBreach, ThresholdMetric,
};
pub use middleware::{cached, CachePolicy};
