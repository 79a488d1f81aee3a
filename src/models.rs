//! Core data models: CloudFront event records, CDN definitions and content items

use crate::error::{EdgeError, Result};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Header carrying the decoded URI a request had before it was rewritten
pub const ORIGINAL_URI_HEADER: &str = "exodus-original-uri";

/// Request header asking for diagnostic response headers
pub const QUERY_HEADER: &str = "x-exodus-query";

/// Response header carrying the handler version
pub const VERSION_HEADER: &str = "X-Exodus-Version";

/// Object key sentinel marking deliberately removed content
pub const ABSENT_OBJECT_KEY: &str = "absent";

/// A single header value, with its original-case name when known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        HeaderEntry {
            key: Some(key.into()),
            value: value.into(),
        }
    }
}

/// CloudFront header map: lower-cased name to the list of values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, Vec<HeaderEntry>>);

impl Headers {
    pub fn new() -> Self {
        Headers::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    /// All values recorded for a header
    pub fn get(&self, name: &str) -> Option<&[HeaderEntry]> {
        self.0.get(&name.to_ascii_lowercase()).map(Vec::as_slice)
    }

    /// The first value of a header
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|entries| entries.first())
            .map(|entry| entry.value.as_str())
    }

    /// Replace a header with a single value, keeping `name` as its display key
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(
            name.to_ascii_lowercase(),
            vec![HeaderEntry::new(name, value)],
        );
    }

    /// Replace a header with the given list of values
    pub fn set_all(&mut self, name: &str, entries: Vec<HeaderEntry>) {
        self.0.insert(name.to_ascii_lowercase(), entries);
    }

    /// Remove every header whose name starts with one of `prefixes`.
    ///
    /// Returns the names removed.
    pub fn remove_prefixed<S: AsRef<str>>(&mut self, prefixes: &[S]) -> Vec<String> {
        let doomed: Vec<String> = self
            .0
            .keys()
            .filter(|name| {
                prefixes
                    .iter()
                    .any(|p| name.starts_with(&p.as_ref().to_ascii_lowercase()))
            })
            .cloned()
            .collect();

        for name in &doomed {
            self.0.remove(name);
        }
        doomed
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// CloudFront request record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub uri: String,

    #[serde(default, skip_serializing_if = "Headers::is_empty")]
    pub headers: Headers,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub querystring: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(rename = "clientIp", default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,

    /// Fields this crate does not interpret, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Request {
    pub fn new(uri: impl Into<String>) -> Self {
        Request {
            uri: uri.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_querystring(mut self, querystring: impl Into<String>) -> Self {
        self.querystring = Some(querystring.into());
        self
    }

    /// The decoded URI this request had before being rewritten to a storage key
    pub fn original_uri(&self) -> Option<&str> {
        self.headers.first_value(ORIGINAL_URI_HEADER)
    }
}

/// CloudFront response record; either synthesized at the edge or the
/// storage response passing through the origin-response stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(
        rename = "statusDescription",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub status_description: Option<String>,

    #[serde(default, skip_serializing_if = "Headers::is_empty")]
    pub headers: Headers,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Response {
    /// A terminal response with the canonical description of `status`
    pub fn with_status(status: StatusCode) -> Self {
        Response {
            status: Some(status.as_u16().to_string()),
            status_description: status.canonical_reason().map(str::to_string),
            ..Default::default()
        }
    }

    pub fn bad_request() -> Self {
        Response::with_status(StatusCode::BAD_REQUEST)
    }

    pub fn not_found() -> Self {
        Response::with_status(StatusCode::NOT_FOUND)
    }

    /// 302 to `location`
    pub fn redirect(location: impl Into<String>) -> Self {
        let mut response = Response::with_status(StatusCode::FOUND);
        response.headers.set("Location", location);
        response
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status.as_deref().and_then(|s| s.parse().ok())
    }

    /// Set `X-Exodus-Version` to the deployed handler version
    pub fn stamp_version(&mut self, version: &str) {
        self.headers.set(VERSION_HEADER, version);
    }
}

/// The result of the origin-request stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    /// Forward the (rewritten) request to storage
    Forward(Request),
    /// Answer the client directly
    Respond(Response),
}

impl Outcome {
    /// Status code for metrics and logs; forwarded requests count as "forward"
    pub fn status_label(&self) -> String {
        match self {
            Outcome::Forward(_) => "forward".to_string(),
            Outcome::Respond(response) => response
                .status
                .clone()
                .unwrap_or_else(|| "none".to_string()),
        }
    }
}

/// `{ "Records": [ { "cf": { ... } } ] }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudFrontEvent {
    #[serde(rename = "Records")]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub cf: CfRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfRecord {
    pub request: Request,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Response>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

impl CloudFrontEvent {
    /// Build an origin-request event around `request`
    pub fn origin_request(request: Request) -> Self {
        CloudFrontEvent {
            records: vec![EventRecord {
                cf: CfRecord {
                    request,
                    response: None,
                    config: None,
                },
            }],
        }
    }

    /// Build an origin-response event around `request` and `response`
    pub fn origin_response(request: Request, response: Response) -> Self {
        CloudFrontEvent {
            records: vec![EventRecord {
                cf: CfRecord {
                    request,
                    response: Some(response),
                    config: None,
                },
            }],
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| EdgeError::InvalidEvent(format!("cannot parse event: {}", e)))
    }

    /// Take the first record; only `Records[0]` is ever read
    pub fn into_record(self) -> Result<CfRecord> {
        self.records
            .into_iter()
            .next()
            .map(|record| record.cf)
            .ok_or_else(|| EdgeError::InvalidEvent("event has no records".to_string()))
    }
}

/// A path-prefix rewrite rule from the CDN definitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRule {
    pub src: String,
    pub dest: String,

    /// Regex fragments; the rule is skipped for URIs matching any of them
    #[serde(default)]
    pub exclude_paths: Vec<String>,
}

impl AliasRule {
    pub fn new(src: impl Into<String>, dest: impl Into<String>) -> Self {
        AliasRule {
            src: src.into(),
            dest: dest.into(),
            exclude_paths: Vec::new(),
        }
    }

    pub fn excluding(mut self, paths: &[&str]) -> Self {
        self.exclude_paths = paths.iter().map(|p| p.to_string()).collect();
        self
    }
}

/// Values served for a synthesized `listing` file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var: Option<String>,

    #[serde(default)]
    pub values: Vec<String>,
}

/// CDN-wide definitions published to the config table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definitions {
    #[serde(default)]
    pub origin_alias: Vec<AliasRule>,

    #[serde(default)]
    pub rhui_alias: Vec<AliasRule>,

    #[serde(default)]
    pub releasever_alias: Vec<AliasRule>,

    #[serde(default)]
    pub listing: BTreeMap<String, ListingEntry>,
}

/// A scalar attribute of a table item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    S(String),
    N(String),
    B(Vec<u8>),
    Bool(bool),
    Null,
    /// Any other attribute type, kept only for diagnostics
    Other(String),
}

impl AttrValue {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttrValue::S(s) => Some(s),
            _ => None,
        }
    }
}

/// One item returned by a table query
pub type Item = HashMap<String, AttrValue>;

/// Most recent content record for a web URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub web_uri: String,
    pub from_date: Option<String>,
    pub object_key: String,
    pub content_type: Option<String>,
}

impl ContentItem {
    /// Interpret a raw table item.
    ///
    /// An item without a string `object_key` is malformed.
    pub fn from_item(uri: &str, item: &Item) -> Result<Self> {
        let object_key = item
            .get("object_key")
            .and_then(AttrValue::as_s)
            .ok_or_else(|| {
                EdgeError::malformed_item(uri, format!("missing object_key in {:?}", item))
            })?;

        Ok(ContentItem {
            web_uri: item
                .get("web_uri")
                .and_then(AttrValue::as_s)
                .unwrap_or(uri)
                .to_string(),
            from_date: item
                .get("from_date")
                .and_then(AttrValue::as_s)
                .map(str::to_string),
            object_key: object_key.to_string(),
            content_type: item
                .get("content_type")
                .and_then(AttrValue::as_s)
                .filter(|ct| !ct.is_empty())
                .map(str::to_string),
        })
    }

    /// Tombstone marking intentionally removed content
    pub fn is_absent(&self) -> bool {
        self.object_key == ABSENT_OBJECT_KEY
    }
}
