//! Signed-cookie issuance
//!
//! Requests under `/_/cookie/` carry a set of pre-signed CloudFront cookies
//! in their query string. The edge answers them with a redirect to the
//! same path without the prefix, setting those cookies on the way.

use crate::models::{HeaderEntry, Request, Response};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, info};

/// URI prefix of cookie-issuance requests
pub const COOKIE_PREFIX: &str = "/_/cookie/";

/// Query parameter holding the encoded cookie list
pub const COOKIES_PARAM: &str = "CloudFront-Cookies";

pub fn is_cookie_request(uri: &str) -> bool {
    uri.starts_with(COOKIE_PREFIX)
}

/// Decode base64 using CloudFront's URL-safe substitutions
/// (`-` for `+`, `_` for `=`, `~` for `/`).
pub fn cf_b64decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let standard: String = data
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '=',
            '~' => '/',
            other => other,
        })
        .collect();
    STANDARD.decode(standard)
}

/// Split a query string into decoded key/value pairs.
///
/// Pairs with an empty value are dropped, as are pairs without `=`.
pub fn parse_query(querystring: &str) -> Vec<(String, String)> {
    querystring
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = decode_component(key);
            let value = decode_component(value);
            if value.is_empty() {
                None
            } else {
                Some((key, value))
            }
        })
        .collect()
}

/// First value of `name` in `querystring`
pub fn query_param(querystring: &str, name: &str) -> Option<String> {
    parse_query(querystring)
        .into_iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value)
}

fn decode_component(component: &str) -> String {
    let spaced = component.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}

fn load_cookies(request: &Request) -> Result<Vec<String>, String> {
    let querystring = request.querystring.as_deref().unwrap_or_default();
    let encoded = query_param(querystring, COOKIES_PARAM)
        .ok_or_else(|| format!("missing {} parameter", COOKIES_PARAM))?;
    let decoded = cf_b64decode(&encoded).map_err(|e| format!("bad base64: {}", e))?;
    serde_json::from_slice::<Vec<String>>(&decoded).map_err(|e| format!("bad cookie list: {}", e))
}

/// Answer a cookie-issuance request.
///
/// # Returns
/// * 302 to the URI without `/_/cookie`, setting every cookie given
/// * 400 if the cookie parameter is missing or cannot be decoded
pub fn handle_cookie_request(request: &Request) -> Response {
    let cookies = match load_cookies(request) {
        Ok(cookies) => cookies,
        Err(reason) => {
            debug!(
                "Unable to load cookies from redirect request: {} ({})",
                request.uri, reason
            );
            return Response::bad_request();
        }
    };

    info!("Handling cookie request: {}", request.uri);

    let location = request
        .uri
        .strip_prefix(COOKIE_PREFIX.trim_end_matches('/'))
        .unwrap_or(&request.uri);
    let mut response = Response::redirect(location);
    response.headers.set("Cache-Control", "no-store");
    response.headers.set_all(
        "Set-Cookie",
        cookies
            .into_iter()
            .map(|cookie| HeaderEntry::new("Set-Cookie", cookie))
            .collect(),
    );

    debug!("Generated cookie request response: {:?}", response);
    response
}
