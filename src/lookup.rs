//! Versioned item lookup with cross-region failover
//!
//! A [`LookupClient`] issues "most recent item as of now" queries against a
//! table, trying each configured region in order until one answers without
//! error. An empty answer is a valid answer and never triggers failover.

use crate::config::EdgeConfig;
use crate::error::LookupError;
use crate::metrics::EdgeMetrics;
use crate::models::Item;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Partition key value under which the CDN definitions are published
pub const DEFINITIONS_CONFIG_ID: &str = "exodus-config";

/// A query for the single most recent item of one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyQuery {
    pub table: String,
    /// Partition key attribute name
    pub key_name: String,
    /// Partition key value
    pub key_value: String,
    /// Upper bound (inclusive) on `from_date`
    pub as_of: String,
    pub consistent_read: bool,
}

impl KeyQuery {
    /// Content lookup of `uri` in `table`, as of now
    pub fn content(table: &str, uri: &str) -> Self {
        KeyQuery {
            table: table.to_string(),
            key_name: "web_uri".to_string(),
            key_value: uri.to_string(),
            as_of: now_timestamp(),
            consistent_read: true,
        }
    }

    /// Lookup of the current CDN definitions in `table`
    pub fn definitions(table: &str) -> Self {
        KeyQuery {
            table: table.to_string(),
            key_name: "config_id".to_string(),
            key_value: DEFINITIONS_CONFIG_ID.to_string(),
            as_of: now_timestamp(),
            consistent_read: false,
        }
    }

    /// `<key> = :u and from_date <= :d`
    pub fn key_condition(&self) -> String {
        format!("{} = :u and from_date <= :d", self.key_name)
    }
}

/// Current UTC time as stored in `from_date`, e.g. `2024-05-01T10:00:00.000+00:00`
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// A table client bound to one region
#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Return the most recent item matching `query`, if any
    async fn query_latest(&self, query: &KeyQuery) -> anyhow::Result<Option<Item>>;
}

/// Creates table clients per region
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self, region: &str) -> anyhow::Result<Arc<dyn TableBackend>>;
}

/// Table query helper performing failover between regions
pub struct LookupClient {
    config: Arc<EdgeConfig>,
    connector: Arc<dyn BackendConnector>,
    clients: RwLock<HashMap<String, Arc<dyn TableBackend>>>,
    metrics: Arc<EdgeMetrics>,
}

impl LookupClient {
    pub fn new(
        config: Arc<EdgeConfig>,
        connector: Arc<dyn BackendConnector>,
        metrics: Arc<EdgeMetrics>,
    ) -> Self {
        LookupClient {
            config,
            connector,
            clients: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    /// Get the client for `region`, connecting on first use.
    ///
    /// Concurrent first callers may each connect; the first client stored wins.
    async fn client(&self, region: &str) -> anyhow::Result<Arc<dyn TableBackend>> {
        if let Ok(clients) = self.clients.read() {
            if let Some(client) = clients.get(region) {
                return Ok(Arc::clone(client));
            }
        }

        let client = self.connector.connect(region).await?;

        if let Ok(mut clients) = self.clients.write() {
            let stored = clients
                .entry(region.to_string())
                .or_insert_with(|| Arc::clone(&client));
            return Ok(Arc::clone(stored));
        }
        Ok(client)
    }

    /// Number of regions with a cached client
    pub fn cached_regions(&self) -> usize {
        self.clients.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Run `query` against every configured region of its table, in order,
    /// until one succeeds.
    ///
    /// # Returns
    /// * `Ok(Some(item))` / `Ok(None)` from the first region without error
    /// * `Err(LookupError)` carrying every region's failure, if all failed
    pub async fn query(&self, query: &KeyQuery) -> Result<Option<Item>, LookupError> {
        let mut error = LookupError::new(&query.table);

        for region in self.config.regions_for(&query.table) {
            let attempt = match self.client(&region).await {
                Ok(client) => client.query_latest(query).await,
                Err(e) => Err(e),
            };

            match attempt {
                Ok(item) => {
                    if !error.failures.is_empty() {
                        warn!(
                            "Failover: query for table {} succeeded in region {} after prior errors",
                            query.table, region
                        );
                        self.metrics.record_failover(&query.table);
                    }
                    let result = if item.is_some() { "hit" } else { "miss" };
                    self.metrics.record_lookup(&query.table, result);
                    debug!(
                        "Query for {} = {} in table {} ({}): {}",
                        query.key_name, query.key_value, query.table, region, result
                    );
                    return Ok(item);
                }
                Err(e) => {
                    warn!(
                        "Error querying table {} in region {}: {:#}",
                        query.table, region, e
                    );
                    error.push(region, format!("{:#}", e));
                }
            }
        }

        self.metrics.record_lookup(&query.table, "error");
        Err(error)
    }
}
