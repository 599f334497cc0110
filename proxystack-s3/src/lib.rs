//! S3 API translation for ProxyStack
//!
//! Answers authenticated S3 requests by issuing internal API subrequests
//! through the same handler chain and transcoding the results.
//!
//! # Supported Operations
//!
//! ## Account
//! - ListBuckets (GET /)
//!
//! ## Buckets
//! - HeadBucket, CreateBucket, DeleteBucket
//! - ListObjects (v1) and ListObjectsV2 with prefix, delimiter and paging
//!
//! Object operations answer `NotImplemented`.

pub mod listing;
pub mod s3api;
pub mod xml;

#[cfg(test)]
mod tests;

pub use listing::{decode_continuation_token, encode_continuation_token, ListParams, ListVersion, Page};
pub use s3api::{layer, S3Api, S3ApiConfig, S3Path, TranslateError};
pub use xml::{ListAllMyBucketsResult, ListBucketResult};
