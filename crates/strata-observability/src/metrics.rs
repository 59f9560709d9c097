use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // WAL Metrics
    // ============================================================================

    /// Bytes handed to the WAL device, including alignment padding
    pub static ref WAL_WRITE_BYTES_TOTAL: IntCounter = IntCounter::new(
        "strata_wal_write_bytes_total",
        "Total bytes written to the WAL device (aligned)"
    ).expect("metric can be created");

    /// Bytes read from the WAL device, including alignment padding
    pub static ref WAL_READ_BYTES_TOTAL: IntCounter = IntCounter::new(
        "strata_wal_read_bytes_total",
        "Total bytes read from the WAL device (aligned)"
    ).expect("metric can be created");

    /// WAL device errors by operation
    pub static ref WAL_IO_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("strata_wal_io_errors_total", "Total WAL device I/O errors"),
        &["operation"] // open, read, write
    ).expect("metric can be created");

    // ============================================================================
    // Inflight Read Metrics
    // ============================================================================

    /// Remaining inflight read budget
    pub static ref INFLIGHT_READ_AVAILABLE_BYTES: IntGauge = IntGauge::new(
        "strata_inflight_read_available_bytes",
        "Available inflight read budget in bytes"
    ).expect("metric can be created");

    /// Reads waiting for budget
    pub static ref INFLIGHT_READ_QUEUE_SIZE: IntGauge = IntGauge::new(
        "strata_inflight_read_queue_size",
        "Number of reads queued waiting for inflight budget"
    ).expect("metric can be created");

    /// Reads rejected for exceeding the whole budget
    pub static ref INFLIGHT_READ_REJECTED_TOTAL: IntCounter = IntCounter::new(
        "strata_inflight_read_rejected_total",
        "Total reads rejected because they exceed the inflight budget"
    ).expect("metric can be created");

    // ============================================================================
    // Block Load Metrics
    // ============================================================================

    /// Bytes fetched from object storage for data blocks
    pub static ref BLOCK_LOAD_BYTES_TOTAL: IntCounter = IntCounter::new(
        "strata_block_load_bytes_total",
        "Total data block bytes fetched from object storage"
    ).expect("metric can be created");

    /// Failed data block fetches
    pub static ref BLOCK_LOAD_ERRORS_TOTAL: IntCounter = IntCounter::new(
        "strata_block_load_errors_total",
        "Total failed data block fetches"
    ).expect("metric can be created");

    /// Time from admission request to block completion
    pub static ref BLOCK_LOAD_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new("strata_block_load_latency_seconds", "Data block load latency in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    ).expect("metric can be created");
}

/// Initialize metrics registry
/// Can be called multiple times safely (idempotent)
pub fn init() {
    INIT.call_once(|| {
        // WAL metrics
        REGISTRY
            .register(Box::new(WAL_WRITE_BYTES_TOTAL.clone()))
            .expect("wal_write_bytes_total can be registered");
        REGISTRY
            .register(Box::new(WAL_READ_BYTES_TOTAL.clone()))
            .expect("wal_read_bytes_total can be registered");
        REGISTRY
            .register(Box::new(WAL_IO_ERRORS_TOTAL.clone()))
            .expect("wal_io_errors_total can be registered");

        // Inflight read metrics
        REGISTRY
            .register(Box::new(INFLIGHT_READ_AVAILABLE_BYTES.clone()))
            .expect("inflight_read_available_bytes can be registered");
        REGISTRY
            .register(Box::new(INFLIGHT_READ_QUEUE_SIZE.clone()))
            .expect("inflight_read_queue_size can be registered");
        REGISTRY
            .register(Box::new(INFLIGHT_READ_REJECTED_TOTAL.clone()))
            .expect("inflight_read_rejected_total can be registered");

        // Block load metrics
        REGISTRY
            .register(Box::new(BLOCK_LOAD_BYTES_TOTAL.clone()))
            .expect("block_load_bytes_total can be registered");
        REGISTRY
            .register(Box::new(BLOCK_LOAD_ERRORS_TOTAL.clone()))
            .expect("block_load_errors_total can be registered");
        REGISTRY
            .register(Box::new(BLOCK_LOAD_LATENCY.clone()))
            .expect("block_load_latency can be registered");
    });
}
