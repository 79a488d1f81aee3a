//! Edge service: shared state and event dispatch for both trigger stages

use crate::config::EdgeConfig;
use crate::definitions::DefinitionsCache;
use crate::dynamodb::DynamoDbConnector;
use crate::error::{EdgeError, Result};
use crate::lookup::{BackendConnector, LookupClient};
use crate::metrics::EdgeMetrics;
use crate::models::{CloudFrontEvent, Outcome, Response};
use crate::origin_request::OriginRequestHandler;
use crate::origin_response::OriginResponseHandler;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

pub const ORIGIN_REQUEST_STAGE: &str = "origin-request";
pub const ORIGIN_RESPONSE_STAGE: &str = "origin-response";

/// Long-lived handler state shared by every invocation of a process:
/// the per-region table clients and the definitions cache.
pub struct EdgeService {
    config: Arc<EdgeConfig>,
    metrics: Arc<EdgeMetrics>,
    lookup: Arc<LookupClient>,
    origin_request: OriginRequestHandler,
    origin_response: OriginResponseHandler,
}

impl EdgeService {
    /// Create a service querying tables through `connector`
    pub fn new(
        config: EdgeConfig,
        connector: Arc<dyn BackendConnector>,
        metrics: EdgeMetrics,
    ) -> Self {
        let config = Arc::new(config);
        let metrics = Arc::new(metrics);

        let lookup = Arc::new(LookupClient::new(
            Arc::clone(&config),
            connector,
            Arc::clone(&metrics),
        ));
        let definitions = Arc::new(DefinitionsCache::new(
            Arc::clone(&lookup),
            config.config_table.name.clone(),
            config.cache_ttl(),
            Arc::clone(&metrics),
        ));

        EdgeService {
            origin_request: OriginRequestHandler::new(
                Arc::clone(&config),
                Arc::clone(&lookup),
                definitions,
            ),
            origin_response: OriginResponseHandler::new(Arc::clone(&config)),
            config,
            metrics,
            lookup,
        }
    }

    /// Create a service backed by DynamoDB, with metrics in the default registry
    pub fn from_config(config: EdgeConfig) -> Result<Self> {
        let connector = DynamoDbConnector::from_config(&config);
        let metrics = EdgeMetrics::new()
            .map_err(|e| EdgeError::Config(format!("cannot register metrics: {}", e)))?;

        info!(
            "Edge service for table {} (definitions in {}), lambda version {}",
            config.table.name, config.config_table.name, config.lambda_version
        );
        Ok(Self::new(config, Arc::new(connector), metrics))
    }

    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    pub fn metrics(&self) -> &EdgeMetrics {
        &self.metrics
    }

    pub fn lookup(&self) -> &LookupClient {
        &self.lookup
    }

    /// Handle an origin-request event
    pub async fn origin_request(&self, event: CloudFrontEvent) -> Result<Outcome> {
        let record = event.into_record()?;

        match self.origin_request.handle(record.request).await {
            Ok(outcome) => {
                self.metrics
                    .record_response(ORIGIN_REQUEST_STAGE, &outcome.status_label());
                Ok(outcome)
            }
            Err(e) => {
                error!("origin-request failed: {}", e);
                self.metrics.record_response(ORIGIN_REQUEST_STAGE, "error");
                Err(e)
            }
        }
    }

    /// Handle an origin-response event
    pub async fn origin_response(&self, event: CloudFrontEvent) -> Result<Response> {
        let record = event.into_record()?;
        let response = record.response.ok_or_else(|| {
            EdgeError::InvalidEvent("origin-response event has no response".to_string())
        })?;

        let response = self.origin_response.handle(&record.request, response);
        self.metrics.record_response(
            ORIGIN_RESPONSE_STAGE,
            response.status.as_deref().unwrap_or("none"),
        );
        Ok(response)
    }

    /// Route an event to the stage it belongs to: events carrying a
    /// response are origin-response events.
    pub async fn dispatch(&self, event: CloudFrontEvent) -> Result<Value> {
        let has_response = event
            .records
            .first()
            .map(|record| record.cf.response.is_some())
            .unwrap_or(false);

        if has_response {
            Ok(serde_json::to_value(self.origin_response(event).await?)?)
        } else {
            Ok(serde_json::to_value(self.origin_request(event).await?)?)
        }
    }
}
