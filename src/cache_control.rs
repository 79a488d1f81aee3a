//! Cache-Control for frequently refreshed repository metadata
//!
//! Files which change in place (manifests, listings, repomd.xml, ostree
//! refs) get a bounded max-age; everything else is left to the defaults of
//! the CDN.

use crate::models::Headers;
use once_cell::sync::Lazy;
use regex::RegexSet;
use tracing::info;

/// Patterns matched at the start of the original request URI
const MAX_AGE_PATTERNS: [&str; 4] = [
    r"^.+/PULP_MANIFEST",
    r"^.+/listing",
    r"^.+/repodata/repomd\.xml",
    r"^.+/ostree/repo/refs/heads/.*/.*",
];

static MAX_AGE_WHITELIST: Lazy<RegexSet> =
    Lazy::new(|| RegexSet::new(MAX_AGE_PATTERNS).expect("max-age patterns are valid"));

/// Whether `uri` should carry a max-age
pub fn wants_max_age(uri: &str) -> bool {
    MAX_AGE_WHITELIST.is_match(uri)
}

/// Set `Cache-Control: max-age=<max_age>` on `headers` if `uri` is whitelisted.
///
/// # Returns
/// `true` if the header was set
pub fn apply(uri: &str, headers: &mut Headers, max_age: u64) -> bool {
    if !wants_max_age(uri) {
        return false;
    }

    headers.set("Cache-Control", format!("max-age={}", max_age));
    info!("Cache-Control header added for '{}'", uri);
    true
}
