//! Origin-request stage: map a client request to a storage object
//!
//! The handler resolves the request URI through the CDN alias layers, then
//! looks the resolved URI up in the content table. A hit rewrites the
//! request to the object's storage key; everything else ends in a response
//! produced at the edge (404, 302, 400 or a synthesized listing).
//!
//! Lookup order for a resolved URI:
//! 1. the URI itself
//! 2. the URI's directory index, answered with a redirect if the URI lacks
//!    its trailing slash
//!
//! When that misses, the same two lookups are retried for the URI resolved
//! with alias exclusions ignored, then (with mirrored reads on) for the URI
//! resolved without releasever aliases.

use crate::alias::LISTING_SUFFIX;
use crate::cache_control;
use crate::config::EdgeConfig;
use crate::cookie;
use crate::definitions::{DefinitionsCache, LoadedDefinitions};
use crate::error::{EdgeError, Result};
use crate::lookup::{KeyQuery, LookupClient};
use crate::models::{
    ContentItem, Definitions, Outcome, Request, Response, ORIGINAL_URI_HEADER, QUERY_HEADER,
};
use http::StatusCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// URIs must be shorter than this many characters
pub const MAX_URI_LENGTH: usize = 2000;

/// Query strings must be shorter than this many characters
pub const MAX_QUERYSTRING_LENGTH: usize = 4000;

/// Content type served when an item does not record one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Resolves origin requests against the definitions and content table
pub struct OriginRequestHandler {
    config: Arc<EdgeConfig>,
    lookup: Arc<LookupClient>,
    definitions: Arc<DefinitionsCache>,
}

impl OriginRequestHandler {
    pub fn new(
        config: Arc<EdgeConfig>,
        lookup: Arc<LookupClient>,
        definitions: Arc<DefinitionsCache>,
    ) -> Self {
        OriginRequestHandler {
            config,
            lookup,
            definitions,
        }
    }

    /// Handle one origin request.
    ///
    /// Responses produced at the edge carry `X-Exodus-Version` when the
    /// client sent `x-exodus-query`.
    ///
    /// # Returns
    /// * `Ok(Outcome::Forward)` with the request rewritten to a storage key
    /// * `Ok(Outcome::Respond)` for edge-generated responses
    /// * `Err` if the table is unreachable in every region, or holds bad data
    pub async fn handle(&self, request: Request) -> Result<Outcome> {
        let wants_version = request.headers.contains(QUERY_HEADER);

        let mut outcome = match self.resolve(request).await {
            Ok(outcome) => outcome,
            Err(err) if err.is_client_error() => {
                warn!("Rejecting request: {}", err);
                Outcome::Respond(Response::bad_request())
            }
            Err(err) => return Err(err),
        };

        if wants_version {
            if let Outcome::Respond(response) = &mut outcome {
                response.stamp_version(&self.config.lambda_version);
            }
        }
        Ok(outcome)
    }

    async fn resolve(&self, mut request: Request) -> Result<Outcome> {
        validate_request(&request)?;

        debug!("Incoming request value for origin_request: {:?}", request);

        request.uri = percent_decode(&request.uri);
        let original_uri = request.uri.clone();

        if cookie::is_cookie_request(&original_uri) {
            return Ok(Outcome::Respond(cookie::handle_cookie_request(&request)));
        }

        let loaded = self.definitions.get().await?;

        let uri = loaded.aliases.resolve(&original_uri, false);
        if let Some(outcome) = self.try_uri(&request, &loaded, &uri).await? {
            return Ok(outcome);
        }
        let mut tried = vec![uri];

        // Content published before an exclusion was added lives under the
        // fully aliased path.
        let unexcluded = loaded.aliases.resolve(&original_uri, true);
        if !tried.contains(&unexcluded) {
            debug!("Retrying with alias exclusions ignored: {}", unexcluded);
            if let Some(outcome) = self.try_uri(&request, &loaded, &unexcluded).await? {
                return Ok(outcome);
            }
            tried.push(unexcluded);
        }

        if self.config.mirror_reads {
            let mirrored = loaded.aliases.resolve_mirrored(&original_uri);
            if !tried.contains(&mirrored) {
                debug!("Retrying mirrored URI: {}", mirrored);
                if let Some(outcome) = self.try_uri(&request, &loaded, &mirrored).await? {
                    return Ok(outcome);
                }
            }
        }

        info!("No item found for URI: {}", tried[0]);
        Ok(Outcome::Respond(Response::not_found()))
    }

    /// Serve `uri` as a listing, as itself, or as a directory index
    async fn try_uri(
        &self,
        request: &Request,
        loaded: &LoadedDefinitions,
        uri: &str,
    ) -> Result<Option<Outcome>> {
        if let Some(mut response) = handle_listing_request(uri, &loaded.definitions) {
            cache_control::apply(uri, &mut response.headers, self.config.headers.max_age);
            return Ok(Some(Outcome::Respond(response)));
        }

        // Clients may not request an index file directly
        let index_suffix = format!("/{}", self.config.index);
        if uri.ends_with(&index_suffix) {
            return Ok(None);
        }

        if let Some(outcome) = self.response_from_db(request, uri).await? {
            return Ok(Some(outcome));
        }

        let index_uri = format!("{}{}", uri.trim_end_matches('/'), index_suffix);
        match self.response_from_db(request, &index_uri).await? {
            Some(Outcome::Forward(_)) if !uri.ends_with('/') => {
                // Relative links in an index only resolve below the directory
                // when the URL ends in '/'.
                debug!("Sending '/' redirect for index at {}", uri);
                let response = Response::redirect(format!("{}/", request.uri));
                debug!("Generated redirect response: {:?}", response);
                Ok(Some(Outcome::Respond(response)))
            }
            other => Ok(other),
        }
    }

    /// Look up `uri` in the content table.
    ///
    /// # Returns
    /// * `Ok(None)` if there is no item
    /// * `Ok(Some(404))` for a tombstoned item
    /// * `Ok(Some(Forward))` with `request` rewritten to the item's object
    async fn response_from_db(&self, request: &Request, uri: &str) -> Result<Option<Outcome>> {
        let table = &self.config.table.name;
        info!("Querying '{}' table for '{}'...", table, uri);

        let item = match self.lookup.query(&KeyQuery::content(table, uri)).await? {
            Some(item) => item,
            None => return Ok(None),
        };

        info!("Item found for URI: {}", uri);

        let content = ContentItem::from_item(uri, &item).map_err(|e| {
            error!("Exception occurred while processing item: {:?}: {}", item, e);
            e
        })?;

        if content.is_absent() {
            info!("Item absent for URI: {}", uri);
            return Ok(Some(Outcome::Respond(Response::not_found())));
        }

        let mut forwarded = request.clone();
        forwarded.headers.set(ORIGINAL_URI_HEADER, request.uri.as_str());
        forwarded.uri = format!("/{}", content.object_key);
        forwarded.querystring = Some(content_type_query(
            content.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE),
        ));

        debug!("Updated request value for origin_request: {:?}", forwarded);
        Ok(Some(Outcome::Forward(forwarded)))
    }
}

/// Check the lengths of the client-provided parts of a request
pub fn validate_request(request: &Request) -> Result<()> {
    let uri_length = request.uri.chars().count();
    if uri_length == 0 || uri_length >= MAX_URI_LENGTH {
        error!("uri exceeds length limits: {}", request.uri);
        return Err(EdgeError::InvalidRequest(format!(
            "uri length {} outside 1..{}",
            uri_length, MAX_URI_LENGTH
        )));
    }

    if let Some(querystring) = &request.querystring {
        let query_length = querystring.chars().count();
        if query_length >= MAX_QUERYSTRING_LENGTH {
            error!("querystring exceeds length limits: {}", querystring);
            return Err(EdgeError::InvalidRequest(format!(
                "querystring length {} not below {}",
                query_length, MAX_QUERYSTRING_LENGTH
            )));
        }
    }

    Ok(())
}

/// Percent-decode a URI; invalid UTF-8 is replaced rather than rejected
pub fn percent_decode(uri: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(uri.as_bytes())).into_owned()
}

/// Query string asking storage to serve the object as `content_type`
pub fn content_type_query(content_type: &str) -> String {
    format!(
        "response-content-type={}",
        urlencoding::encode(content_type).replace("%20", "+")
    )
}

/// Synthesize the response for a `/listing` URI, if definitions cover it
pub fn handle_listing_request(uri: &str, definitions: &Definitions) -> Option<Response> {
    let target = uri.strip_suffix(LISTING_SUFFIX)?;

    info!("Handling listing request: {}", uri);

    if definitions.listing.is_empty() {
        info!("No listing data defined");
        return None;
    }

    let listing = match definitions.listing.get(target) {
        Some(listing) => listing,
        None => {
            info!("No listing found for URI: {}", uri);
            return None;
        }
    };

    let mut body = listing.values.join("\n");
    body.push('\n');

    let mut response = Response::with_status(StatusCode::OK);
    response.body = Some(body);
    response.headers.set("Content-Type", "text/plain");

    debug!("Generated listing request response: {:?}", response);
    Some(response)
}
