//! Bucket listing parameters and pagination

use base64::{engine::general_purpose::STANDARD, Engine};
use http::Uri;
use proxystack_proxy::context::query_value;
use serde::Deserialize;

/// Page size when `max-keys` is absent or unparsable
pub const DEFAULT_MAX_KEYS: usize = 1000;

/// Largest page S3 returns; larger `max-keys` values are cut to this so
/// the one-record lookahead always fits under the internal listing cap
pub const MAX_KEYS_CEILING: usize = 1000;

/// Listing API flavour selected by `list-type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListVersion {
    V1,
    V2,
}

/// Parsed bucket listing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub version: ListVersion,
    pub max_keys: usize,
    pub prefix: String,
    pub delimiter: String,
    /// Name the internal listing starts after
    pub marker: String,
    /// v2 only: `continuation-token` exactly as the client sent it
    pub continuation_token: String,
    /// v2 only
    pub start_after: String,
    pub fetch_owner: bool,
}

impl ListParams {
    pub fn from_uri(uri: &Uri) -> Self {
        let param = |name: &str| query_value(uri, name).unwrap_or_default();

        let max_keys = query_value(uri, "max-keys")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map_or(DEFAULT_MAX_KEYS, |max_keys| max_keys.min(MAX_KEYS_CEILING));
        let version = if param("list-type") == "2" {
            ListVersion::V2
        } else {
            ListVersion::V1
        };

        let mut params = Self {
            version,
            max_keys,
            prefix: param("prefix"),
            delimiter: param("delimiter"),
            marker: String::new(),
            continuation_token: String::new(),
            start_after: String::new(),
            fetch_owner: false,
        };

        match version {
            ListVersion::V1 => params.marker = param("marker"),
            ListVersion::V2 => {
                params.start_after = param("start-after");
                params.continuation_token = param("continuation-token");
                params.fetch_owner = parse_bool(&param("fetch-owner"));
                params.marker = if params.continuation_token.is_empty() {
                    params.start_after.clone()
                } else {
                    decode_continuation_token(&params.continuation_token)
                };
            }
        }
        params
    }

    /// Records to request internally: one past the page to detect truncation
    pub fn internal_limit(&self) -> usize {
        self.max_keys.saturating_add(1)
    }

    /// Query string for the internal container listing
    pub fn internal_query(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("format", "json");
        query.append_pair("limit", &self.internal_limit().to_string());
        for (name, value) in [
            ("marker", &self.marker),
            ("prefix", &self.prefix),
            ("delimiter", &self.delimiter),
        ] {
            if !value.is_empty() {
                query.append_pair(name, value);
            }
        }
        query.finish()
    }

    /// Owner elements are rendered for every v1 listing and for v2 only
    /// on request
    pub fn include_owner(&self) -> bool {
        self.version == ListVersion::V1 || self.fetch_owner
    }
}

/// Boolean query flag: `1`, `t`, `T`, `true`, `TRUE` and `True` are true,
/// anything else is false
fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "t" | "T" | "true" | "TRUE" | "True")
}

/// Opaque v2 cursor naming the last entry of the previous page
pub fn encode_continuation_token(name: &str) -> String {
    STANDARD.encode(name.as_bytes())
}

/// Inverse of [`encode_continuation_token`]; a corrupt token yields an
/// empty marker, restarting the listing
pub fn decode_continuation_token(token: &str) -> String {
    STANDARD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_default()
}

/// One record of an internal container listing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ListingRecord {
    Subdir {
        subdir: String,
    },
    Object {
        name: String,
        #[serde(default)]
        last_modified: String,
        #[serde(default)]
        hash: String,
        #[serde(default)]
        bytes: u64,
    },
}

impl ListingRecord {
    pub fn name(&self) -> &str {
        match self {
            Self::Subdir { subdir } => subdir,
            Self::Object { name, .. } => name,
        }
    }
}

/// One record of an internal account listing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainerRecord {
    pub name: String,
}

/// A listing page cut back to `max-keys`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub records: Vec<ListingRecord>,
    pub is_truncated: bool,
}

impl Page {
    /// Cut `records`, fetched with [`ListParams::internal_limit`], to at
    /// most `max_keys` entries
    pub fn paginate(mut records: Vec<ListingRecord>, max_keys: usize) -> Self {
        let is_truncated = records.len() > max_keys;
        records.truncate(max_keys);
        Self {
            records,
            is_truncated,
        }
    }

    /// Name of the last retained record, if any
    pub fn last_name(&self) -> Option<&str> {
        self.records.last().map(ListingRecord::name)
    }

    /// v1 `NextMarker`: only for a truncated page listed with a delimiter
    pub fn next_marker(&self, params: &ListParams) -> Option<String> {
        if !self.is_truncated || params.delimiter.is_empty() {
            return None;
        }
        self.last_name().map(str::to_string)
    }

    /// v2 `NextContinuationToken`: only for a truncated page
    pub fn next_continuation_token(&self) -> Option<String> {
        if !self.is_truncated {
            return None;
        }
        self.last_name().map(encode_continuation_token)
    }
}
