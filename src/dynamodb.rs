//! DynamoDB table backend
//!
//! Implements [`TableBackend`] and [`BackendConnector`] over the AWS SDK,
//! with one client per region sharing the configured endpoint override and
//! timeouts.

use crate::config::EdgeConfig;
use crate::lookup::{BackendConnector, KeyQuery, TableBackend};
use crate::models::{AttrValue, Item};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::{Credentials, Region};
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use aws_smithy_types::timeout::TimeoutConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Builds DynamoDB clients bound to a region
#[derive(Debug, Clone, Default)]
pub struct DynamoDbConnector {
    endpoint_url: Option<String>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    credentials: Option<Credentials>,
}

impl DynamoDbConnector {
    /// Connector using the endpoint override and timeouts of `config`
    pub fn from_config(config: &EdgeConfig) -> Self {
        DynamoDbConnector {
            endpoint_url: config.endpoint_url.clone(),
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            credentials: None,
        }
    }

    /// Use fixed credentials instead of the default provider chain
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    fn timeout_config(&self) -> Option<TimeoutConfig> {
        if self.connect_timeout.is_none() && self.read_timeout.is_none() {
            return None;
        }

        let mut builder = TimeoutConfig::builder();
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = self.read_timeout {
            builder = builder.read_timeout(timeout);
        }
        Some(builder.build())
    }
}

#[async_trait]
impl BackendConnector for DynamoDbConnector {
    async fn connect(&self, region: &str) -> anyhow::Result<Arc<dyn TableBackend>> {
        debug!("Creating DynamoDB client for region {}", region);

        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
        if let Some(credentials) = &self.credentials {
            loader = loader.credentials_provider(credentials.clone());
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &self.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        if let Some(timeouts) = self.timeout_config() {
            builder = builder.timeout_config(timeouts);
        }

        Ok(Arc::new(DynamoDbBackend::from_client(
            Client::from_conf(builder.build()),
            region,
        )))
    }
}

/// A DynamoDB client for one region
#[derive(Clone)]
pub struct DynamoDbBackend {
    client: Client,
    region: String,
}

impl std::fmt::Debug for DynamoDbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbBackend")
            .field("region", &self.region)
            .finish()
    }
}

impl DynamoDbBackend {
    /// Create from a pre-built client
    pub fn from_client(client: Client, region: &str) -> Self {
        DynamoDbBackend {
            client,
            region: region.to_string(),
        }
    }
}

#[async_trait]
impl TableBackend for DynamoDbBackend {
    async fn query_latest(&self, query: &KeyQuery) -> anyhow::Result<Option<Item>> {
        let output = self
            .client
            .query()
            .table_name(&query.table)
            .key_condition_expression(query.key_condition())
            .expression_attribute_values(":u", AttributeValue::S(query.key_value.clone()))
            .expression_attribute_values(":d", AttributeValue::S(query.as_of.clone()))
            .limit(1)
            .scan_index_forward(false)
            .consistent_read(query.consistent_read)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))?;

        Ok(output.items().first().map(convert_item))
    }
}

/// Convert an SDK item to the crate's attribute model
pub fn convert_item(item: &HashMap<String, AttributeValue>) -> Item {
    item.iter()
        .map(|(name, value)| (name.clone(), convert_value(value)))
        .collect()
}

fn convert_value(value: &AttributeValue) -> AttrValue {
    match value {
        AttributeValue::S(s) => AttrValue::S(s.clone()),
        AttributeValue::N(n) => AttrValue::N(n.clone()),
        AttributeValue::B(blob) => AttrValue::B(blob.as_ref().to_vec()),
        AttributeValue::Bool(b) => AttrValue::Bool(*b),
        AttributeValue::Null(_) => AttrValue::Null,
        other => AttrValue::Other(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::primitives::Blob;

    #[test]
    fn test_convert_item() {
        let mut item = HashMap::new();
        item.insert("web_uri".to_string(), AttributeValue::S("/a/b".to_string()));
        item.insert("config".to_string(), AttributeValue::B(Blob::new(vec![1u8, 2, 3])));
        item.insert("count".to_string(), AttributeValue::N("3".to_string()));
        item.insert("tags".to_string(), AttributeValue::Ss(vec!["x".to_string()]));

        let converted = convert_item(&item);
        assert_eq!(converted["web_uri"], AttrValue::S("/a/b".to_string()));
        assert_eq!(converted["config"], AttrValue::B(vec![1, 2, 3]));
        assert_eq!(converted["count"], AttrValue::N("3".to_string()));
        assert!(matches!(converted["tags"], AttrValue::Other(_)));
    }

    #[test]
    fn test_timeout_config() {
        let connector = DynamoDbConnector::default();
        assert!(connector.timeout_config().is_none());

        let mut config = EdgeConfig::default();
        config.connect_timeout = Some(2.0);
        let connector = DynamoDbConnector::from_config(&config);
        let timeouts = connector.timeout_config().unwrap();
        assert_eq!(timeouts.connect_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(timeouts.read_timeout(), None);
    }
}
