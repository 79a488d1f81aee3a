//! CDN definitions cache
//!
//! The definitions (alias rules and listing data) are published as a single
//! versioned item in the config table. They are fetched on first use and
//! held for the configured TTL.

use crate::alias::AliasResolver;
use crate::error::{EdgeError, Result};
use crate::lookup::{KeyQuery, LookupClient};
use crate::metrics::EdgeMetrics;
use crate::models::{AttrValue, Definitions, Item};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::read::GzDecoder;
use std::io::Read;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Definitions along with their compiled alias layers
#[derive(Debug, Clone, Default)]
pub struct LoadedDefinitions {
    pub definitions: Definitions,
    pub aliases: AliasResolver,
}

impl LoadedDefinitions {
    pub fn new(definitions: Definitions) -> Result<Self> {
        let aliases = AliasResolver::new(&definitions)?;
        Ok(LoadedDefinitions {
            definitions,
            aliases,
        })
    }
}

struct CachedEntry {
    loaded_at: Instant,
    value: Arc<LoadedDefinitions>,
}

/// Single-entry TTL cache of the current definitions
pub struct DefinitionsCache {
    lookup: Arc<LookupClient>,
    table: String,
    ttl: Duration,
    entry: RwLock<Option<CachedEntry>>,
    metrics: Arc<EdgeMetrics>,
}

impl DefinitionsCache {
    pub fn new(
        lookup: Arc<LookupClient>,
        table: impl Into<String>,
        ttl: Duration,
        metrics: Arc<EdgeMetrics>,
    ) -> Self {
        DefinitionsCache {
            lookup,
            table: table.into(),
            ttl,
            entry: RwLock::new(None),
            metrics,
        }
    }

    /// Get the current definitions, fetching them if the cached copy is
    /// missing or older than the TTL.
    ///
    /// Racing callers may fetch concurrently; the last fetch is kept.
    pub async fn get(&self) -> Result<Arc<LoadedDefinitions>> {
        if let Ok(entry) = self.entry.read() {
            if let Some(cached) = entry.as_ref() {
                if cached.loaded_at.elapsed() < self.ttl {
                    self.metrics.record_definitions("hit");
                    return Ok(Arc::clone(&cached.value));
                }
            }
        }

        let value = Arc::new(self.fetch().await?);

        if let Ok(mut entry) = self.entry.write() {
            *entry = Some(CachedEntry {
                loaded_at: Instant::now(),
                value: Arc::clone(&value),
            });
        }
        Ok(value)
    }

    /// Drop the cached definitions
    pub fn invalidate(&self) {
        if let Ok(mut entry) = self.entry.write() {
            *entry = None;
        }
    }

    async fn fetch(&self) -> Result<LoadedDefinitions> {
        let item = self.lookup.query(&KeyQuery::definitions(&self.table)).await?;

        let definitions = match item {
            Some(item) => {
                self.metrics.record_definitions("miss");
                decode_definitions(&item)?
            }
            None => {
                info!("No definitions found in table {}, using empty definitions", self.table);
                self.metrics.record_definitions("empty");
                Definitions::default()
            }
        };

        debug!(
            "Loaded definitions: {} origin, {} rhui, {} releasever aliases, {} listings",
            definitions.origin_alias.len(),
            definitions.rhui_alias.len(),
            definitions.releasever_alias.len(),
            definitions.listing.len()
        );
        LoadedDefinitions::new(definitions)
    }
}

/// Decode the `config` attribute of a definitions item.
///
/// Binary payloads are gzip-compressed JSON, either raw or base64 encoded.
/// String payloads are plain JSON.
pub fn decode_definitions(item: &Item) -> Result<Definitions> {
    let json = match item.get("config") {
        Some(AttrValue::B(bytes)) => decompress(bytes)?,
        Some(AttrValue::S(text)) => text.clone(),
        Some(other) => {
            return Err(EdgeError::Definitions(format!(
                "unsupported config attribute: {:?}",
                other
            )))
        }
        None => {
            return Err(EdgeError::Definitions(
                "definitions item has no config attribute".to_string(),
            ))
        }
    };

    serde_json::from_str(&json)
        .map_err(|e| EdgeError::Definitions(format!("invalid definitions JSON: {}", e)))
}

fn decompress(bytes: &[u8]) -> Result<String> {
    let compressed = if bytes.starts_with(&GZIP_MAGIC) {
        bytes.to_vec()
    } else {
        STANDARD
            .decode(bytes)
            .map_err(|e| EdgeError::Definitions(format!("invalid base64 config: {}", e)))?
    };

    let mut json = String::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_string(&mut json)
        .map_err(|e| EdgeError::Definitions(format!("cannot decompress config: {}", e)))?;
    Ok(json)
}
