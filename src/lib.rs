//! Exodus Edge
//!
//! Edge request handlers for the exodus CDN. Clients request content by
//! its published path; the CDN stores it under content-addressed object
//! keys. These handlers bridge the two at the CDN edge.
//!
//! # Overview
//!
//! Two trigger stages are handled:
//!
//! - **origin-request**: the request URI is resolved through the CDN alias
//!   rules, looked up in the content table (as of now, newest first), and
//!   either rewritten to point at the stored object or answered directly
//!   (404, 302 directory redirect, 400, synthesized listing, cookie issuance).
//! - **origin-response**: the storage response is finished with digest,
//!   cache-control and version headers, and storage-internal headers are
//!   stripped.
//!
//! # Features
//!
//! - **Layered alias resolution**: origin, RHUI and releasever aliases with
//!   exclusion patterns, resolved regardless of rule order
//! - **Versioned lookup**: the most recent item not newer than now wins,
//!   with tombstones for deliberately removed content
//! - **Autoindex**: directory requests are served from a stored index file
//! - **Region failover**: table queries fail over between configured regions
//! - **Definitions cache**: CDN definitions are cached for a short TTL
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use exodus_edge::{CloudFrontEvent, EdgeConfig, EdgeService, Request};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EdgeConfig::from_file("lambda_config.yaml")?;
//! let service = EdgeService::from_config(config)?;
//!
//! let event = CloudFrontEvent::origin_request(Request::new("/content/dist/rhel/repo/file.rpm"));
//! let outcome = service.origin_request(event).await?;
//! println!("{}", serde_json::to_string(&outcome)?);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`EdgeService`]: owns the shared state and dispatches events
//! - [`OriginRequestHandler`]: request resolution and lookup fallbacks
//! - [`OriginResponseHandler`]: response finishing
//! - [`AliasResolver`]: alias layers compiled from the definitions
//! - [`DefinitionsCache`]: TTL cache of the CDN definitions
//! - [`LookupClient`]: table queries with region failover over a
//!   [`TableBackend`] such as [`DynamoDbBackend`]
//! - [`EdgeMetrics`]: Prometheus counters
//!
//! # Configuration
//!
//! ```yaml
//! table:
//!   name: exodus-cdn
//!   available_regions: [us-east-1, us-east-2]
//! config_table:
//!   name: exodus-config
//! config_cache_ttl: 2        # minutes
//! headers:
//!   max_age: 600
//! lambda_version: "1.0.0"
//! ```
//!
//! See [`EdgeConfig`] for all options.

pub mod alias;
pub mod cache_control;
pub mod config;
pub mod cookie;
pub mod definitions;
pub mod dynamodb;
pub mod error;
pub mod logging;
pub mod lookup;
pub mod metrics;
pub mod models;
pub mod origin_request;
pub mod origin_response;
pub mod service;

pub use alias::{AliasResolver, CompiledRule};
pub use config::{EdgeConfig, HeadersConfig, LoggingConfig, TableConfig};
pub use definitions::{DefinitionsCache, LoadedDefinitions};
pub use dynamodb::{DynamoDbBackend, DynamoDbConnector};
pub use error::{EdgeError, LookupError, RegionFailure, Result};
pub use lookup::{BackendConnector, KeyQuery, LookupClient, TableBackend};
pub use metrics::EdgeMetrics;
pub use models::{
    AliasRule, AttrValue, CloudFrontEvent, ContentItem, Definitions, HeaderEntry, Headers, Item,
    ListingEntry, Outcome, Request, Response,
};
pub use origin_request::OriginRequestHandler;
pub use origin_response::OriginResponseHandler;
pub use service::EdgeService;
