//! Origin-response stage: finish storage responses before they are cached

use crate::cache_control;
use crate::config::EdgeConfig;
use crate::models::{Request, Response, QUERY_HEADER};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use tracing::{debug, warn};

/// Request header asking for an RFC 3230 `Digest` response header
pub const WANT_DIGEST_HEADER: &str = "want-digest";

/// Request header asking for an RFC 9530 `Repr-Digest` response header
pub const WANT_REPR_DIGEST_HEADER: &str = "want-repr-digest";

/// Adds digest, cache and version headers to storage responses and strips
/// storage-internal ones
pub struct OriginResponseHandler {
    config: Arc<EdgeConfig>,
}

impl OriginResponseHandler {
    pub fn new(config: Arc<EdgeConfig>) -> Self {
        OriginResponseHandler { config }
    }

    /// Finish `response` to the (rewritten) `request`
    pub fn handle(&self, request: &Request, mut response: Response) -> Response {
        debug!("The request value for origin_response beginning is {:?}", request);
        debug!("The response value for origin_response beginning is {:?}", response);

        let wants_digest = request.headers.contains(WANT_DIGEST_HEADER);
        let wants_repr_digest = request.headers.contains(WANT_REPR_DIGEST_HEADER);
        if wants_digest || wants_repr_digest {
            if let Some(sum) = object_digest(&request.uri) {
                if wants_digest {
                    response.headers.set("Digest", format!("id-sha-256={}", sum));
                }
                if wants_repr_digest {
                    response.headers.set("Repr-Digest", format!("sha-256=:{}:", sum));
                }
            }
        }

        if request.headers.contains(QUERY_HEADER) {
            response.stamp_version(&self.config.lambda_version);
        }

        match request.original_uri() {
            Some(original_uri) => {
                cache_control::apply(
                    original_uri,
                    &mut response.headers,
                    self.config.headers.max_age,
                );
            }
            None => debug!("Could not read exodus-original-uri from request"),
        }

        let removed = response
            .headers
            .remove_prefixed(&self.config.headers.strip_prefixes);
        if !removed.is_empty() {
            debug!("Removed headers from response: {:?}", removed);
        }

        response
    }
}

/// Base64 SHA-256 of an object, recovered from its hex storage key.
///
/// Storage keys are the hex digest of the object, so `/<hex>` decodes
/// directly to the checksum.
pub fn object_digest(uri: &str) -> Option<String> {
    let sum_hex = uri.replacen('/', "", 1);
    match hex::decode(&sum_hex) {
        Ok(sum) => Some(STANDARD.encode(sum)),
        Err(e) => {
            warn!("Cannot compute digest for URI {}: {}", uri, e);
            None
        }
    }
}
