// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for order processing
// ============================================================================
//
// Provides metrics for:
// - Lifecycle transitions (outcome per operation, latency)
// - Line-item batches written
// - Requested lines and additionals dropped during validation
// - Query layer calls
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Lifecycle Metrics
    pub order_transitions: IntCounterVec,
    pub order_transition_duration: HistogramVec,

    // Ledger Metrics
    pub batches_written: IntCounterVec,
    pub rows_written: IntCounterVec,
    pub rows_dropped: IntCounterVec,

    // Query Metrics
    pub queries: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Lifecycle Metrics
        let order_transitions = IntCounterVec::new(
            Opts::new("order_transitions_total", "Order lifecycle operations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(order_transitions.clone()))?;

        let order_transition_duration = HistogramVec::new(
            HistogramOpts::new("order_transition_duration_seconds", "Order lifecycle operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(order_transition_duration.clone()))?;

        // Ledger Metrics
        let batches_written = IntCounterVec::new(
            Opts::new("line_item_batches_written_total", "Revision batches appended"),
            &["operation"],
        )?;
        registry.register(Box::new(batches_written.clone()))?;

        let rows_written = IntCounterVec::new(
            Opts::new("line_item_rows_written_total", "Item and additional rows appended"),
            &["kind"],
        )?;
        registry.register(Box::new(rows_written.clone()))?;

        let rows_dropped = IntCounterVec::new(
            Opts::new("line_item_rows_dropped_total", "Requested rows dropped during validation"),
            &["kind"],
        )?;
        registry.register(Box::new(rows_dropped.clone()))?;

        // Query Metrics
        let queries = IntCounterVec::new(
            Opts::new("order_queries_total", "Order query layer calls"),
            &["query"],
        )?;
        registry.register(Box::new(queries.clone()))?;

        Ok(Self {
            registry,
            order_transitions,
            order_transition_duration,
            batches_written,
            rows_written,
            rows_dropped,
            queries,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Helper to record a lifecycle operation
    pub fn record_transition(&self, operation: &str, outcome: &str, duration_secs: f64) {
        self.order_transitions.with_label_values(&[operation, outcome]).inc();
        self.order_transition_duration
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    /// Helper to record an appended batch
    pub fn record_batch(&self, operation: &str, items: usize, additionals: usize) {
        self.batches_written.with_label_values(&[operation]).inc();
        self.rows_written.with_label_values(&["item"]).inc_by(items as u64);
        self.rows_written.with_label_values(&["additional"]).inc_by(additionals as u64);
    }

    /// Helper to record rows left out of a batch
    pub fn record_dropped(&self, lines: usize, additionals: usize) {
        if lines > 0 {
            self.rows_dropped.with_label_values(&["item"]).inc_by(lines as u64);
        }
        if additionals > 0 {
            self.rows_dropped.with_label_values(&["additional"]).inc_by(additionals as u64);
        }
    }

    pub fn record_query(&self, query: &str) {
        self.queries.with_label_values(&[query]).inc();
    }
}
