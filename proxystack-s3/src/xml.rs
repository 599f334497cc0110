//! S3 listing documents

use proxystack_core::{render_document, XmlError, S3_XMLNS};
use serde::Serialize;

use crate::listing::{ListParams, ListVersion, ListingRecord, Page};

/// The internal API keeps no container creation time
pub const PLACEHOLDER_CREATION_DATE: &str = "2009-02-03T16:45:09.000Z";

#[derive(Debug, Clone, Serialize)]
pub struct Owner {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "DisplayName")]
    pub display_name: String,
}

impl Owner {
    pub fn account(account: &str) -> Self {
        Self {
            id: account.to_string(),
            display_name: account.to_string(),
        }
    }
}

// === ListAllMyBucketsResult ===

#[derive(Debug, Serialize)]
pub struct BucketInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "CreationDate")]
    pub creation_date: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Buckets {
    #[serde(rename = "Bucket")]
    pub bucket: Vec<BucketInfo>,
}

#[derive(Debug, Serialize)]
pub struct ListAllMyBucketsResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "Owner")]
    pub owner: Owner,
    #[serde(rename = "Buckets")]
    pub buckets: Buckets,
}

impl ListAllMyBucketsResult {
    pub fn new<I>(account: &str, names: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            xmlns: S3_XMLNS,
            owner: Owner::account(account),
            buckets: Buckets {
                bucket: names
                    .into_iter()
                    .map(|name| BucketInfo {
                        name,
                        creation_date: PLACEHOLDER_CREATION_DATE,
                    })
                    .collect(),
            },
        }
    }

    pub fn to_xml(&self) -> Result<String, XmlError> {
        render_document("ListAllMyBucketsResult", self)
    }
}

// === ListBucketResult ===

#[derive(Debug, Serialize)]
pub struct ObjectInfo {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "LastModified")]
    pub last_modified: String,
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "StorageClass")]
    pub storage_class: &'static str,
    #[serde(rename = "Owner", skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
}

#[derive(Debug, Serialize)]
pub struct CommonPrefix {
    #[serde(rename = "Prefix")]
    pub prefix: String,
}

#[derive(Debug, Serialize)]
pub struct ListBucketResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Prefix")]
    pub prefix: String,
    #[serde(rename = "Marker")]
    pub marker: String,
    #[serde(rename = "NextMarker", skip_serializing_if = "Option::is_none")]
    pub next_marker: Option<String>,
    #[serde(rename = "MaxKeys")]
    pub max_keys: usize,
    #[serde(rename = "Delimiter", skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(rename = "IsTruncated")]
    pub is_truncated: bool,
    #[serde(rename = "ContinuationToken", skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
    #[serde(rename = "NextContinuationToken", skip_serializing_if = "Option::is_none")]
    pub next_continuation_token: Option<String>,
    #[serde(rename = "StartAfter", skip_serializing_if = "Option::is_none")]
    pub start_after: Option<String>,
    #[serde(rename = "KeyCount", skip_serializing_if = "Option::is_none")]
    pub key_count: Option<usize>,
    #[serde(rename = "Contents")]
    pub contents: Vec<ObjectInfo>,
    #[serde(rename = "CommonPrefixes")]
    pub common_prefixes: Vec<CommonPrefix>,
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl ListBucketResult {
    /// Transcode a paginated internal listing of `bucket`
    pub fn from_page(bucket: &str, account: &str, params: &ListParams, page: &Page) -> Self {
        let owner = params.include_owner().then(|| Owner::account(account));
        let mut contents = Vec::new();
        let mut common_prefixes = Vec::new();
        for record in &page.records {
            match record {
                ListingRecord::Object {
                    name,
                    last_modified,
                    hash,
                    bytes,
                } => contents.push(ObjectInfo {
                    key: name.clone(),
                    last_modified: format!("{last_modified}Z"),
                    etag: format!("\"{hash}\""),
                    size: *bytes,
                    storage_class: "STANDARD",
                    owner: owner.clone(),
                }),
                ListingRecord::Subdir { subdir } => common_prefixes.push(CommonPrefix {
                    prefix: subdir.clone(),
                }),
            }
        }

        let mut result = Self {
            xmlns: S3_XMLNS,
            name: bucket.to_string(),
            prefix: params.prefix.clone(),
            // The effective start: v1 `marker`, or the v2 token/start-after
            marker: params.marker.clone(),
            next_marker: None,
            max_keys: params.max_keys,
            delimiter: non_empty(&params.delimiter),
            is_truncated: page.is_truncated,
            continuation_token: None,
            next_continuation_token: None,
            start_after: None,
            key_count: None,
            contents,
            common_prefixes,
        };
        match params.version {
            ListVersion::V1 => result.next_marker = page.next_marker(params),
            ListVersion::V2 => {
                result.continuation_token = non_empty(&params.continuation_token);
                result.next_continuation_token = page.next_continuation_token();
                result.start_after = non_empty(&params.start_after);
                result.key_count = Some(page.records.len());
            }
        }
        result
    }

    pub fn to_xml(&self) -> Result<String, XmlError> {
        render_document("ListBucketResult", self)
    }
}
