//! Strata Observability
//!
//! Prometheus metrics for the WAL device channel, the inflight read
//! throttle and object storage block loads.
//!
//! # Usage
//!
//! ```no_run
//! use strata_observability::{metrics, exporter};
//!
//! // Register all metrics with the global registry
//! metrics::init();
//!
//! // Serve them on /metrics
//! let metrics_router = exporter::create_metrics_router();
//! ```

pub mod exporter;
pub mod metrics;

pub use metrics::{init as init_metrics, REGISTRY};

/// Initialize all observability components
pub fn init() {
    metrics::init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_does_not_panic() {
        init();
    }

    #[test]
    fn test_double_init_is_safe() {
        init();
        init_metrics();
        let _registry = &*REGISTRY;
    }
}
