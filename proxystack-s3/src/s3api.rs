//! S3 protocol translator
//!
//! Intercepts S3-shaped requests that carry resolved S3 credentials,
//! rewrites them into internal API subrequests and transcodes the captured
//! results into S3 responses. Requests already using the versioned internal
//! path, and requests without credentials, pass straight through.

use async_trait::async_trait;
use axum::body::Body;
use http::header::{self, HeaderValue};
use http::request::Parts;
use http::{Method, Request, StatusCode};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use proxystack_core::{Counter, ErrorCode, InfoRegistry, MetricsRegistry, S3Error, XmlError};
use proxystack_proxy::response::{s3_error, s3_error_response, standard_response, xml_response};
use proxystack_proxy::{CaptureWriter, Handler, Layer, ProxyContext, ResponseWriter, SubrequestError};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::listing::{ContainerRecord, ListParams, ListingRecord, Page};
use crate::xml::{ListAllMyBucketsResult, ListBucketResult};

/// Source tag on every subrequest this middleware issues
pub const SOURCE: &str = "s3api";

/// Internal path prefix that is never translated
const INTERNAL_PREFIX: &str = "/v1/";

/// Bytes escaped in a container name
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Bytes escaped in an object name, which keeps its slashes
const OBJECT_PATH: &AsciiSet = &SEGMENT.remove(b'/');

/// `[s3api]` configuration section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct S3ApiConfig {
    pub enabled: bool,
}

/// Failures while translating one request, answered with a 500
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Subrequest failed: {0}")]
    Subrequest(#[from] SubrequestError),

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("Invalid internal listing: {0}")]
    Listing(#[from] serde_json::Error),
}

/// Build the translator layer.
///
/// When disabled the layer hands back `next` itself, so every request
/// reaches the next handler untouched. When enabled it announces `s3api`
/// in `info`.
pub fn layer(config: &S3ApiConfig, metrics: &MetricsRegistry, info: &mut InfoRegistry) -> Layer {
    if !config.enabled {
        return Box::new(|next| next);
    }
    info.register(SOURCE, serde_json::json!({}));
    let requests = metrics.counter("s3api_requests");
    Box::new(move |next| Arc::new(S3Api { next, requests }) as Arc<dyn Handler>)
}

/// Resource addressed by an S3 request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Path {
    pub container: String,
    pub object: String,
}

impl S3Path {
    /// Split `/<bucket>[/<key>]`, percent-decoding both parts
    pub fn parse(path: &str) -> Self {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let (container, object) = trimmed.split_once('/').unwrap_or((trimmed, ""));
        Self {
            container: decode(container),
            object: decode(object),
        }
    }

    /// Internal path of this resource inside `account`
    pub fn internal_path(&self, account: &str) -> String {
        let account = utf8_percent_encode(account, SEGMENT);
        if self.container.is_empty() {
            return format!("/v1/AUTH_{account}");
        }
        let container = utf8_percent_encode(&self.container, SEGMENT);
        if self.object.is_empty() {
            return format!("/v1/AUTH_{account}/{container}");
        }
        let object = utf8_percent_encode(&self.object, OBJECT_PATH);
        format!("/v1/AUTH_{account}/{container}/{object}")
    }
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// The translator middleware
pub struct S3Api {
    next: Arc<dyn Handler>,
    requests: Arc<dyn Counter>,
}

/// Per-request translation state
struct Translation<'a> {
    ctx: &'a ProxyContext,
    parts: &'a Parts,
    account: &'a str,
    target: S3Path,
    internal_path: String,
}

#[async_trait]
impl Handler for S3Api {
    async fn serve(&self, writer: &mut dyn ResponseWriter, request: Request<Body>) {
        let (parts, body) = request.into_parts();
        let ctx = ProxyContext::from_parts(&parts);
        let account = ctx
            .as_ref()
            .and_then(|ctx| ctx.s3_auth.as_ref())
            .map(|auth| auth.account.clone());
        let internal = parts
            .uri
            .path()
            .get(..INTERNAL_PREFIX.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(INTERNAL_PREFIX));

        let (Some(ctx), Some(account)) = (ctx, account) else {
            return self.next.serve(writer, Request::from_parts(parts, body)).await;
        };
        if internal || ctx.is_subrequest() {
            return self.next.serve(writer, Request::from_parts(parts, body)).await;
        }

        self.requests.inc(1);
        let target = S3Path::parse(parts.uri.path());
        let translation = Translation {
            internal_path: target.internal_path(&account),
            ctx: &ctx,
            parts: &parts,
            account: &account,
            target,
        };
        debug!(
            method = %parts.method,
            path = %parts.uri.path(),
            internal_path = %translation.internal_path,
            account = %account,
            "Translating S3 request"
        );

        let result = if !translation.target.object.is_empty() {
            translation.handle_object(writer).await
        } else if !translation.target.container.is_empty() {
            translation.handle_container(writer).await
        } else {
            translation.handle_account(writer).await
        };

        if let Err(err) = result {
            error!(
                error = %err,
                method = %parts.method,
                path = %parts.uri.path(),
                request_id = %ctx.request_id.id,
                "S3 translation failed"
            );
            standard_response(writer, StatusCode::INTERNAL_SERVER_ERROR).await;
        }
    }
}

impl Translation<'_> {
    /// Resource name echoed in error documents
    fn resource(&self) -> &str {
        self.parts.uri.path()
    }

    /// Dispatch `method` against `path_and_query` and capture the result
    async fn capture(&self, method: &str, path_and_query: &str) -> Result<CaptureWriter, TranslateError> {
        let mut request =
            self.ctx
                .new_subrequest(method, path_and_query, Body::empty(), self.parts, SOURCE)?;
        if method == "GET" {
            request
                .headers_mut()
                .insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        }
        let mut capture = CaptureWriter::new();
        self.ctx.serve_subrequest(&mut capture, request).await;
        Ok(capture)
    }

    /// Answer an internal failure status
    async fn status_response(&self, writer: &mut dyn ResponseWriter, status: StatusCode) {
        s3_error_response(writer, status, self.resource(), &self.ctx.request_id.id).await;
    }

    async fn not_implemented(&self, writer: &mut dyn ResponseWriter) {
        let err = S3Error::new(ErrorCode::NotImplemented)
            .with_resource(self.resource())
            .with_request_id(self.ctx.request_id.id.clone());
        s3_error(writer, &err).await;
    }

    // === Object tier ===

    async fn handle_object(&self, writer: &mut dyn ResponseWriter) -> Result<(), TranslateError> {
        self.not_implemented(writer).await;
        Ok(())
    }

    // === Container tier ===

    async fn handle_container(&self, writer: &mut dyn ResponseWriter) -> Result<(), TranslateError> {
        let method = self.parts.method.clone();
        let success = match method {
            Method::GET => return self.list_objects(writer).await,
            Method::HEAD | Method::PUT => StatusCode::OK,
            Method::DELETE => StatusCode::NO_CONTENT,
            _ => {
                self.not_implemented(writer).await;
                return Ok(());
            }
        };

        let capture = self.capture(method.as_str(), &self.internal_path).await?;
        if !capture.status().is_success() {
            self.status_response(writer, capture.status()).await;
            return Ok(());
        }

        let headers = writer.headers_mut();
        if method == Method::PUT {
            let location = format!("/{}", utf8_percent_encode(&self.target.container, SEGMENT));
            if let Ok(location) = HeaderValue::from_str(&location) {
                headers.insert(header::LOCATION, location);
            }
        }
        if success != StatusCode::NO_CONTENT {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(0u64));
        }
        writer.write_header(success);
        Ok(())
    }

    async fn list_objects(&self, writer: &mut dyn ResponseWriter) -> Result<(), TranslateError> {
        let params = ListParams::from_uri(&self.parts.uri);
        let path = format!("{}?{}", self.internal_path, params.internal_query());
        let capture = self.capture("GET", &path).await?;
        if !capture.status().is_success() {
            self.status_response(writer, capture.status()).await;
            return Ok(());
        }

        let records: Vec<ListingRecord> = parse_listing(capture.body())?;
        let fetched = records.len();
        let page = Page::paginate(records, params.max_keys);
        debug!(
            container = %self.target.container,
            max_keys = params.max_keys,
            fetched,
            truncated = page.is_truncated,
            "Listed container"
        );

        let document =
            ListBucketResult::from_page(&self.target.container, self.account, &params, &page)
                .to_xml()?;
        xml_response(writer, StatusCode::OK, &document).await;
        Ok(())
    }

    // === Account tier ===

    async fn handle_account(&self, writer: &mut dyn ResponseWriter) -> Result<(), TranslateError> {
        if self.parts.method != Method::GET {
            standard_response(writer, StatusCode::METHOD_NOT_ALLOWED).await;
            return Ok(());
        }

        let path = format!("{}?format=json", self.internal_path);
        let capture = self.capture("GET", &path).await?;
        if !capture.status().is_success() {
            self.status_response(writer, capture.status()).await;
            return Ok(());
        }

        let containers: Vec<ContainerRecord> = parse_listing(capture.body())?;
        let document =
            ListAllMyBucketsResult::new(self.account, containers.into_iter().map(|c| c.name))
                .to_xml()?;
        xml_response(writer, StatusCode::OK, &document).await;
        Ok(())
    }
}

/// An empty body (a `204` listing) is an empty listing
fn parse_listing<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<Vec<T>, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(body)
}
