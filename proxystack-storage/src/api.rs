//! HTTP surface of the internal object API

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use http::header::{self, HeaderValue};
use http::request::Parts;
use http::{Method, Request, StatusCode};
use percent_encoding::percent_decode_str;
use proxystack_proxy::context::query_value;
use proxystack_proxy::response::{standard_response, write_body};
use proxystack_proxy::{Handler, ProxyContext, ResponseWriter};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::traits::{ListQuery, ObjectStorage, StorageError, StoredObject};

/// The only API version served
pub const API_VERSION: &str = "v1";

const MAX_LISTING_LIMIT: usize = 10_000;
const MAX_OBJECT_SIZE: usize = 1 << 30;
const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const DEFAULT_OBJECT_CONTENT_TYPE: &str = "application/octet-stream";

/// Resource addressed by an internal path
#[derive(Debug, PartialEq, Eq)]
enum Target {
    Account(String),
    Container(String, String),
    Object(String, String, String),
}

/// Split `/v1/<account>[/<container>[/<object>]]`.
///
/// Container and object segments are percent-decoded; object names keep
/// their slashes.
fn parse_path(path: &str) -> Option<Target> {
    let mut segments = path.strip_prefix('/')?.splitn(4, '/');
    if segments.next()? != API_VERSION {
        return None;
    }
    let account = decode(segments.next()?)?;
    if account.is_empty() {
        return None;
    }
    let container = match segments.next() {
        Some(raw) if !raw.is_empty() => decode(raw)?,
        _ => return Some(Target::Account(account)),
    };
    match segments.next() {
        Some(raw) if !raw.is_empty() => Some(Target::Object(account, container, decode(raw)?)),
        _ => Some(Target::Container(account, container)),
    }
}

fn decode(raw: &str) -> Option<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

/// Terminal handler serving the internal API from an [`ObjectStorage`]
pub struct InternalApi {
    storage: Arc<dyn ObjectStorage>,
}

impl InternalApi {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    // === Account ===

    async fn handle_account(&self, writer: &mut dyn ResponseWriter, parts: &Parts, account: &str) {
        match parts.method {
            Method::GET => {
                let query = list_query(parts);
                let listing = match self.storage.list_containers(account, &query).await {
                    Ok(listing) => listing,
                    Err(err) => return storage_error(writer, &err).await,
                };
                if wants_json(parts) {
                    return json_response(writer, &listing).await;
                }
                let names: Vec<&str> = listing.iter().map(|c| c.name.as_str()).collect();
                text_listing(writer, &names).await;
            }
            Method::HEAD => {
                let stats = self.storage.account_stats(account).await;
                let headers = writer.headers_mut();
                headers.insert("x-account-container-count", HeaderValue::from(stats.container_count));
                headers.insert("x-account-object-count", HeaderValue::from(stats.object_count));
                headers.insert("x-account-bytes-used", HeaderValue::from(stats.bytes_used));
                writer.write_header(StatusCode::NO_CONTENT);
            }
            _ => method_not_allowed(writer, "GET, HEAD").await,
        }
    }

    // === Container ===

    async fn handle_container(
        &self,
        writer: &mut dyn ResponseWriter,
        parts: &Parts,
        account: &str,
        container: &str,
    ) {
        match parts.method {
            Method::GET => {
                let query = list_query(parts);
                let listing = match self.storage.list_objects(account, container, &query).await {
                    Ok(listing) => listing,
                    Err(err) => return storage_error(writer, &err).await,
                };
                if wants_json(parts) {
                    return json_response(writer, &listing).await;
                }
                let names: Vec<&str> = listing.iter().map(|entry| entry.name()).collect();
                text_listing(writer, &names).await;
            }
            Method::HEAD => match self.storage.container_stats(account, container).await {
                Ok(stats) => {
                    let headers = writer.headers_mut();
                    headers.insert("x-container-object-count", HeaderValue::from(stats.object_count));
                    headers.insert("x-container-bytes-used", HeaderValue::from(stats.bytes_used));
                    writer.write_header(StatusCode::NO_CONTENT);
                }
                Err(err) => storage_error(writer, &err).await,
            },
            Method::PUT => match self.storage.create_container(account, container).await {
                Ok(true) => standard_response(writer, StatusCode::CREATED).await,
                Ok(false) => standard_response(writer, StatusCode::ACCEPTED).await,
                Err(err) => storage_error(writer, &err).await,
            },
            Method::DELETE => match self.storage.delete_container(account, container).await {
                Ok(()) => writer.write_header(StatusCode::NO_CONTENT),
                Err(err) => storage_error(writer, &err).await,
            },
            _ => method_not_allowed(writer, "GET, HEAD, PUT, DELETE").await,
        }
    }

    // === Object ===

    async fn handle_object(
        &self,
        writer: &mut dyn ResponseWriter,
        parts: &Parts,
        body: Body,
        account: &str,
        container: &str,
        object: &str,
    ) {
        match parts.method {
            Method::GET | Method::HEAD => {
                match self.storage.get_object(account, container, object).await {
                    Ok(stored) => object_response(writer, &stored, parts.method == Method::GET).await,
                    Err(err) => storage_error(writer, &err).await,
                }
            }
            Method::PUT => {
                let data = match to_bytes(body, MAX_OBJECT_SIZE).await {
                    Ok(data) => data,
                    Err(err) => {
                        warn!(error = %err, object = %object, "Failed to read object body");
                        return standard_response(writer, StatusCode::PAYLOAD_TOO_LARGE).await;
                    }
                };
                let content_type = parts
                    .headers
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or(DEFAULT_OBJECT_CONTENT_TYPE);
                match self
                    .storage
                    .put_object(account, container, object, data, content_type)
                    .await
                {
                    Ok(stored) => {
                        if let Ok(etag) = HeaderValue::from_str(&stored.etag) {
                            writer.headers_mut().insert(header::ETAG, etag);
                        }
                        standard_response(writer, StatusCode::CREATED).await;
                    }
                    Err(err) => storage_error(writer, &err).await,
                }
            }
            Method::DELETE => match self.storage.delete_object(account, container, object).await {
                Ok(()) => writer.write_header(StatusCode::NO_CONTENT),
                Err(err) => storage_error(writer, &err).await,
            },
            _ => method_not_allowed(writer, "GET, HEAD, PUT, DELETE").await,
        }
    }
}

#[async_trait]
impl Handler for InternalApi {
    async fn serve(&self, writer: &mut dyn ResponseWriter, request: Request<Body>) {
        let (parts, body) = request.into_parts();

        let Some(target) = parse_path(parts.uri.path()) else {
            debug!(path = %parts.uri.path(), "Not an internal API path");
            return standard_response(writer, StatusCode::NOT_FOUND).await;
        };

        let ctx = ProxyContext::from_parts(&parts);
        if let Some(authorize) = ctx.as_ref().and_then(|ctx| ctx.authorize.as_ref()) {
            if !(**authorize)(&parts) {
                debug!(method = %parts.method, path = %parts.uri.path(), "Request not authorized");
                return standard_response(writer, StatusCode::FORBIDDEN).await;
            }
        }
        debug!(
            method = %parts.method,
            path = %parts.uri.path(),
            source = %ctx
                .as_ref()
                .and_then(|c| c.source.as_ref())
                .map_or_else(|| "-".to_string(), ToString::to_string),
            "Internal API request"
        );

        match &target {
            Target::Account(account) => self.handle_account(writer, &parts, account).await,
            Target::Container(account, container) => {
                self.handle_container(writer, &parts, account, container).await;
            }
            Target::Object(account, container, object) => {
                self.handle_object(writer, &parts, body, account, container, object)
                    .await;
            }
        }
    }
}

fn list_query(parts: &Parts) -> ListQuery {
    let uri = &parts.uri;
    let limit = query_value(uri, "limit")
        .and_then(|v| v.parse::<usize>().ok())
        .map_or(MAX_LISTING_LIMIT, |limit| limit.min(MAX_LISTING_LIMIT));
    ListQuery {
        limit,
        marker: query_value(uri, "marker"),
        end_marker: query_value(uri, "end_marker"),
        prefix: query_value(uri, "prefix"),
        delimiter: query_value(uri, "delimiter"),
    }
}

fn wants_json(parts: &Parts) -> bool {
    if let Some(format) = query_value(&parts.uri, "format") {
        return format.eq_ignore_ascii_case("json");
    }
    parts
        .headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"))
}

async fn json_response<T: Serialize + ?Sized>(writer: &mut dyn ResponseWriter, value: &T) {
    match serde_json::to_vec(value) {
        Ok(body) => write_body(writer, StatusCode::OK, JSON_CONTENT_TYPE, &body).await,
        Err(err) => {
            error!(error = %err, "Failed to serialize listing");
            standard_response(writer, StatusCode::INTERNAL_SERVER_ERROR).await;
        }
    }
}

/// Newline separated names, `204` when there are none
async fn text_listing(writer: &mut dyn ResponseWriter, names: &[&str]) {
    if names.is_empty() {
        writer.write_header(StatusCode::NO_CONTENT);
        return;
    }
    let mut body = names.join("\n");
    body.push('\n');
    write_body(writer, StatusCode::OK, TEXT_CONTENT_TYPE, body.as_bytes()).await;
}

async fn object_response(writer: &mut dyn ResponseWriter, stored: &StoredObject, with_body: bool) {
    let headers = writer.headers_mut();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(stored.data.len()));
    if let Ok(content_type) = HeaderValue::from_str(&stored.content_type) {
        headers.insert(header::CONTENT_TYPE, content_type);
    }
    if let Ok(etag) = HeaderValue::from_str(&stored.etag) {
        headers.insert(header::ETAG, etag);
    }
    let last_modified = stored
        .last_modified
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    if let Ok(last_modified) = HeaderValue::from_str(&last_modified) {
        headers.insert(header::LAST_MODIFIED, last_modified);
    }
    writer.write_header(StatusCode::OK);

    if with_body && !stored.data.is_empty() {
        if let Err(err) = writer.write(&stored.data).await {
            debug!(error = %err, "Object body write failed");
        }
    }
}

async fn storage_error(writer: &mut dyn ResponseWriter, err: &StorageError) {
    let status = err.status();
    if status.is_server_error() {
        error!(error = %err, "Storage operation failed");
    } else {
        debug!(error = %err, %status, "Storage operation rejected");
    }
    standard_response(writer, status).await;
}

async fn method_not_allowed(writer: &mut dyn ResponseWriter, allow: &'static str) {
    writer
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(allow));
    standard_response(writer, StatusCode::METHOD_NOT_ALLOWED).await;
}
