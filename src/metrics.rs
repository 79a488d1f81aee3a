//! Prometheus metrics for the edge handlers

use prometheus::{register_counter_vec, CounterVec, Encoder, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Counters for handler outcomes, table lookups and the definitions cache
#[derive(Clone)]
pub struct EdgeMetrics {
    /// Responses by handler stage and status ("forward" for rewritten requests)
    pub responses_total: Arc<CounterVec>,

    /// Table lookups by table and result (hit, miss, error)
    pub lookups_total: Arc<CounterVec>,

    /// Queries which succeeded only after failing over to another region
    pub failovers_total: Arc<CounterVec>,

    /// Definitions reads by result (hit, miss, empty)
    pub definitions_fetch_total: Arc<CounterVec>,

    registry: Option<Registry>,
}

impl EdgeMetrics {
    /// Create metrics registered in the default registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let responses_total = register_counter_vec!(
            "exodus_edge_responses_total",
            "Total number of handler results",
            &["stage", "status"] // stage: origin-request, origin-response
        )?;

        let lookups_total = register_counter_vec!(
            "exodus_edge_lookups_total",
            "Total number of table lookups",
            &["table", "result"] // result: hit, miss, error
        )?;

        let failovers_total = register_counter_vec!(
            "exodus_edge_failovers_total",
            "Total number of queries answered after region failover",
            &["table"]
        )?;

        let definitions_fetch_total = register_counter_vec!(
            "exodus_edge_definitions_fetch_total",
            "Total number of CDN definitions reads",
            &["result"] // result: hit, miss, empty
        )?;

        Ok(Self {
            responses_total: Arc::new(responses_total),
            lookups_total: Arc::new(lookups_total),
            failovers_total: Arc::new(failovers_total),
            definitions_fetch_total: Arc::new(definitions_fetch_total),
            registry: None,
        })
    }

    /// Create metrics with custom registry
    pub fn with_registry(registry: &Registry) -> Result<Self, prometheus::Error> {
        let responses_total = CounterVec::new(
            Opts::new(
                "exodus_edge_responses_total",
                "Total number of handler results",
            ),
            &["stage", "status"],
        )?;
        registry.register(Box::new(responses_total.clone()))?;

        let lookups_total = CounterVec::new(
            Opts::new("exodus_edge_lookups_total", "Total number of table lookups"),
            &["table", "result"],
        )?;
        registry.register(Box::new(lookups_total.clone()))?;

        let failovers_total = CounterVec::new(
            Opts::new(
                "exodus_edge_failovers_total",
                "Total number of queries answered after region failover",
            ),
            &["table"],
        )?;
        registry.register(Box::new(failovers_total.clone()))?;

        let definitions_fetch_total = CounterVec::new(
            Opts::new(
                "exodus_edge_definitions_fetch_total",
                "Total number of CDN definitions reads",
            ),
            &["result"],
        )?;
        registry.register(Box::new(definitions_fetch_total.clone()))?;

        Ok(Self {
            responses_total: Arc::new(responses_total),
            lookups_total: Arc::new(lookups_total),
            failovers_total: Arc::new(failovers_total),
            definitions_fetch_total: Arc::new(definitions_fetch_total),
            registry: Some(registry.clone()),
        })
    }

    /// Record a handler result
    pub fn record_response(&self, stage: &str, status: &str) {
        self.responses_total
            .with_label_values(&[stage, status])
            .inc();
    }

    /// Record a completed table lookup
    pub fn record_lookup(&self, table: &str, result: &str) {
        self.lookups_total.with_label_values(&[table, result]).inc();
    }

    /// Record a query rescued by region failover
    pub fn record_failover(&self, table: &str) {
        self.failovers_total.with_label_values(&[table]).inc();
    }

    /// Record a definitions read
    pub fn record_definitions(&self, result: &str) {
        self.definitions_fetch_total
            .with_label_values(&[result])
            .inc();
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let families = match &self.registry {
            Some(registry) => registry.gather(),
            None => prometheus::gather(),
        };

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
