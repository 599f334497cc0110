//! Per-request proxy context and subrequest dispatch

use axum::body::Body;
use axum::response::Response;
use http::header::{self, HeaderName};
use http::request::Parts;
use http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri};
use proxystack_core::{MetricsRegistry, RequestId, S3Auth};
use std::fmt;
use std::sync::Arc;
use tokio::io::DuplexStream;
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::SubrequestError;
use crate::handler::{Handler, ResponseWriter};
use crate::pipe::{PipeResponseWriter, PIPE_CAPACITY};

/// Header carrying the transaction id between hops
pub const TRANS_ID_HEADER: &str = "x-trans-id";

/// Internal override that must never leak into a forwarded GET
pub const STORAGE_POLICY_HEADER: &str = "x-backend-storage-policy-index";

/// Ask the backend to consult every replica
pub const NEWEST_HEADER: &str = "x-newest";

/// Origin headers that describe the outer request's framing or policy and
/// are never copied into a subrequest
fn is_uncopied(name: &HeaderName) -> bool {
    *name == header::CONTENT_LENGTH
        || *name == header::TRANSFER_ENCODING
        || *name == header::HOST
        || *name == header::EXPECT
        || name.as_str() == STORAGE_POLICY_HEADER
}

/// Authorization capability consulted by the storage tier
pub type AuthorizeFn = Arc<dyn Fn(&Parts) -> bool + Send + Sync>;

/// Which subsystem issued a subrequest, and for which outer request
#[derive(Debug, Clone)]
pub struct SubrequestSource {
    pub tag: String,
    pub origin_method: Method,
    pub origin_path: String,
}

/// `<tag> <origin method> <origin path>`, as it appears in logs
impl fmt::Display for SubrequestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.tag, self.origin_method, self.origin_path)
    }
}

/// State every request carries through the handler chain.
///
/// Lives in the request extensions. Subrequests get a clone with
/// [`source`](ProxyContext::source) set, so identity, authorization and the
/// transaction id follow them down the chain.
#[derive(Clone)]
pub struct ProxyContext {
    chain: Arc<dyn Handler>,
    metrics: Arc<MetricsRegistry>,
    pub request_id: RequestId,
    pub s3_auth: Option<S3Auth>,
    pub authorize: Option<AuthorizeFn>,
    pub source: Option<SubrequestSource>,
}

impl fmt::Debug for ProxyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyContext")
            .field("request_id", &self.request_id)
            .field("s3_auth", &self.s3_auth)
            .field("authorize", &self.authorize.is_some())
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// A streamed subrequest whose status and headers are already known
#[derive(Debug)]
pub struct PipedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: DuplexStream,
}

impl PipedResponse {
    /// Turn into a response whose body keeps streaming from the pipe
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from_stream(ReaderStream::new(self.body)));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl ProxyContext {
    pub fn new(chain: Arc<dyn Handler>, metrics: Arc<MetricsRegistry>, request_id: RequestId) -> Self {
        Self {
            chain,
            metrics,
            request_id,
            s3_auth: None,
            authorize: None,
            source: None,
        }
    }

    /// Context attached to a request, if any
    pub fn from_parts(parts: &Parts) -> Option<Self> {
        parts.extensions.get::<Self>().cloned()
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// True when this context belongs to a subrequest
    pub fn is_subrequest(&self) -> bool {
        self.source.is_some()
    }

    /// Build an internal request against this context's chain.
    ///
    /// Fails without executing anything when the verb or path is malformed.
    /// Headers are copied from `origin` minus framing headers and the
    /// storage-policy override.
    pub fn new_subrequest(
        &self,
        method: &str,
        path: &str,
        body: Body,
        origin: &Parts,
        source: &str,
    ) -> Result<Request<Body>, SubrequestError> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| SubrequestError::InvalidMethod(method.to_string()))?;
        if !path.starts_with('/') {
            return Err(SubrequestError::InvalidPath {
                path: path.to_string(),
                reason: "subrequest paths must be absolute".to_string(),
            });
        }
        let uri: Uri = path.parse().map_err(|e: http::uri::InvalidUri| {
            SubrequestError::InvalidPath {
                path: path.to_string(),
                reason: e.to_string(),
            }
        })?;

        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(body)
            .map_err(|e| SubrequestError::Build(e.to_string()))?;

        let headers = request.headers_mut();
        for (name, value) in &origin.headers {
            if !is_uncopied(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        if let Ok(trans_id) = HeaderValue::from_str(&self.request_id.id) {
            headers.insert(TRANS_ID_HEADER, trans_id);
        }

        let mut child = self.clone();
        child.source = Some(SubrequestSource {
            tag: source.to_string(),
            origin_method: origin.method.clone(),
            origin_path: origin.uri.path().to_string(),
        });
        request.extensions_mut().insert(child);

        self.metrics
            .counter(&format!("{source}_subrequests"))
            .inc(1);
        debug!(
            source = %source,
            method = %request.method(),
            path = %request.uri().path(),
            trans_id = %self.request_id.id,
            "Dispatching subrequest"
        );

        Ok(request)
    }

    /// Run `request` through the chain, writing into `writer`.
    ///
    /// Returns once the chain has finished writing.
    pub async fn serve_subrequest(&self, writer: &mut dyn ResponseWriter, request: Request<Body>) {
        self.chain.serve(writer, request).await;
    }

    /// Run `request` through the chain on its own task and return as soon
    /// as the handler commits its status.
    ///
    /// The body keeps streaming through [`PipedResponse::body`]; the caller
    /// must start reading it promptly since the handler blocks once the
    /// pipe is full.
    pub async fn serve_piped(&self, request: Request<Body>) -> Result<PipedResponse, SubrequestError> {
        let (writer_end, reader_end) = tokio::io::duplex(PIPE_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let mut writer = PipeResponseWriter::new(writer_end, ready_tx);
        let chain = self.chain.clone();

        tokio::spawn(async move {
            chain.serve(&mut writer, request).await;
            writer.close().await;
        });

        let head = ready_rx.await.map_err(|_| SubrequestError::Aborted)?;
        Ok(PipedResponse {
            status: head.status,
            headers: head.headers,
            body: reader_end,
        })
    }

    /// Streamed GET of `path` on behalf of `origin`.
    ///
    /// Asks for the newest replica and drops the storage-policy override.
    /// `authorize` replaces the context's authorization for this fetch.
    pub async fn piped_get(
        &self,
        path: &str,
        origin: &Parts,
        source: &str,
        authorize: Option<AuthorizeFn>,
    ) -> Result<PipedResponse, SubrequestError> {
        let path = if query_value(&origin.uri, "multipart-manifest").as_deref() == Some("get") {
            let bare = path.split_once('?').map_or(path, |(bare, _)| bare);
            format!("{bare}?multipart-manifest=get&format=raw")
        } else {
            path.to_string()
        };

        let mut request = self.new_subrequest("GET", &path, Body::empty(), origin, source)?;
        request
            .headers_mut()
            .insert(NEWEST_HEADER, HeaderValue::from_static("true"));
        if let Some(authorize) = authorize {
            if let Some(ctx) = request.extensions_mut().get_mut::<Self>() {
                ctx.authorize = Some(authorize);
            }
        }

        self.serve_piped(request).await
    }
}

/// First value of query parameter `name`
pub fn query_value(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureWriter;
    use async_trait::async_trait;
    use proxystack_core::Counter;
    use tokio::io::AsyncReadExt;

    /// Echoes what it received so tests can inspect the subrequest
    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn serve(&self, writer: &mut dyn ResponseWriter, request: Request<Body>) {
            let (parts, _) = request.into_parts();
            if parts.uri.path() == "/fail" {
                writer.write_header(StatusCode::SERVICE_UNAVAILABLE);
                return;
            }
            if parts.uri.path() == "/large" {
                writer.write_header(StatusCode::OK);
                for _ in 0..64 {
                    if writer.write(&[b'z'; 1024]).await.is_err() {
                        return;
                    }
                }
                return;
            }
            if parts.uri.path() == "/outer" {
                let ctx = ProxyContext::from_parts(&parts).unwrap();
                let inner = ctx
                    .new_subrequest("GET", "/inner", Body::empty(), &parts, "test")
                    .unwrap();
                let mut capture = CaptureWriter::new();
                ctx.serve_subrequest(&mut capture, inner).await;
                writer.write_header(StatusCode::OK);
                let body = format!("wrapped:{}", String::from_utf8_lossy(capture.body()));
                writer.write(body.as_bytes()).await.unwrap();
                return;
            }

            let ctx = ProxyContext::from_parts(&parts);
            let source = ctx
                .as_ref()
                .and_then(|c| c.source.as_ref())
                .map_or_else(String::new, |s| s.tag.clone());
            let authorized = ctx
                .as_ref()
                .and_then(|c| c.authorize.as_ref())
                .map_or(true, |authorize| (**authorize)(&parts));

            for (name, value) in &parts.headers {
                writer.headers_mut().append(name.clone(), value.clone());
            }
            writer
                .headers_mut()
                .insert("x-source", HeaderValue::from_str(&source).unwrap());
            if !authorized {
                writer.write_header(StatusCode::FORBIDDEN);
                return;
            }
            writer.write_header(StatusCode::OK);
            let body = format!("{} {}", parts.method, parts.uri);
            writer.write(body.as_bytes()).await.unwrap();
        }
    }

    fn context() -> ProxyContext {
        ProxyContext::new(
            Arc::new(Echo),
            Arc::new(MetricsRegistry::new()),
            RequestId::with_id("tx-test"),
        )
    }

    fn origin(uri: &str) -> Parts {
        let (parts, ()) = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("x-auth-token", "secret")
            .header("content-length", "12")
            .header(STORAGE_POLICY_HEADER, "2")
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn test_new_subrequest_rejects_bad_method() {
        let ctx = context();
        let result = ctx.new_subrequest("BAD METHOD", "/v1/a", Body::empty(), &origin("/"), "test");
        assert!(matches!(result, Err(SubrequestError::InvalidMethod(_))));
    }

    #[test]
    fn test_new_subrequest_rejects_bad_path() {
        let ctx = context();
        let relative = ctx.new_subrequest("GET", "v1/a", Body::empty(), &origin("/"), "test");
        assert!(matches!(relative, Err(SubrequestError::InvalidPath { .. })));

        let spaced = ctx.new_subrequest("GET", "/v1/a b", Body::empty(), &origin("/"), "test");
        assert!(matches!(spaced, Err(SubrequestError::InvalidPath { .. })));
    }

    #[test]
    fn test_new_subrequest_header_hygiene() {
        let ctx = context();
        let request = ctx
            .new_subrequest("HEAD", "/v1/AUTH_a/c", Body::empty(), &origin("/c"), "s3api")
            .unwrap();

        assert_eq!(request.method(), Method::HEAD);
        assert_eq!(request.uri().path(), "/v1/AUTH_a/c");
        assert_eq!(request.headers().get("x-auth-token").unwrap(), "secret");
        assert!(request.headers().get(header::CONTENT_LENGTH).is_none());
        assert!(request.headers().get(STORAGE_POLICY_HEADER).is_none());
        assert_eq!(request.headers().get(TRANS_ID_HEADER).unwrap(), "tx-test");
    }

    #[test]
    fn test_new_subrequest_installs_child_context() {
        let mut ctx = context();
        ctx.s3_auth = Some(S3Auth {
            access_key: "AKID".to_string(),
            account: "acct".to_string(),
        });
        let request = ctx
            .new_subrequest("GET", "/v1/AUTH_acct", Body::empty(), &origin("/"), "s3api")
            .unwrap();

        let child = request.extensions().get::<ProxyContext>().unwrap();
        assert!(child.is_subrequest());
        assert!(!ctx.is_subrequest());
        let source = child.source.as_ref().unwrap();
        assert_eq!(source.tag, "s3api");
        assert_eq!(source.origin_path, "/");
        assert_eq!(source.origin_method, Method::GET);
        assert_eq!(source.to_string(), "s3api GET /");
        assert_eq!(child.s3_auth.as_ref().unwrap().account, "acct");
        assert_eq!(child.request_id.id, "tx-test");
        assert_eq!(ctx.metrics().value("s3api_subrequests"), 1);
    }

    #[tokio::test]
    async fn test_serve_subrequest_captures() {
        let ctx = context();
        let request = ctx
            .new_subrequest("DELETE", "/v1/AUTH_a/c?x=1", Body::empty(), &origin("/"), "s3api")
            .unwrap();

        let mut capture = CaptureWriter::new();
        ctx.serve_subrequest(&mut capture, request).await;

        assert_eq!(capture.status(), StatusCode::OK);
        assert_eq!(capture.body(), b"DELETE /v1/AUTH_a/c?x=1");
        assert_eq!(capture.headers().get("x-source").unwrap(), "s3api");
    }

    #[tokio::test]
    async fn test_nested_subrequests_reenter_chain() {
        let ctx = context();
        let (mut parts, ()) = Request::builder()
            .uri("/outer")
            .body(())
            .unwrap()
            .into_parts();
        parts.extensions.insert(ctx.clone());
        let request = Request::from_parts(parts, Body::empty());

        let mut capture = CaptureWriter::new();
        ctx.serve_subrequest(&mut capture, request).await;

        assert_eq!(capture.body(), b"wrapped:GET /inner");
        assert_eq!(ctx.metrics().value("test_subrequests"), 1);
    }

    #[tokio::test]
    async fn test_serve_piped_streams_large_body() {
        let ctx = context();
        let request = ctx
            .new_subrequest("GET", "/large", Body::empty(), &origin("/"), "test")
            .unwrap();

        let mut piped = ctx.serve_piped(request).await.unwrap();
        assert_eq!(piped.status, StatusCode::OK);

        let mut body = Vec::new();
        piped.body.read_to_end(&mut body).await.unwrap();
        assert_eq!(body.len(), 64 * 1024);
    }

    #[tokio::test]
    async fn test_serve_piped_error_status_has_empty_body() {
        let ctx = context();
        let request = ctx
            .new_subrequest("GET", "/fail", Body::empty(), &origin("/"), "test")
            .unwrap();

        let mut piped = ctx.serve_piped(request).await.unwrap();
        assert_eq!(piped.status, StatusCode::SERVICE_UNAVAILABLE);

        let mut body = Vec::new();
        piped.body.read_to_end(&mut body).await.unwrap();
        assert!(body.is_empty());
    }

    struct Panics;

    #[async_trait]
    impl Handler for Panics {
        async fn serve(&self, _writer: &mut dyn ResponseWriter, _request: Request<Body>) {
            panic!("handler blew up");
        }
    }

    #[tokio::test]
    async fn test_serve_piped_reports_aborted_handler() {
        let ctx = ProxyContext::new(
            Arc::new(Panics),
            Arc::new(MetricsRegistry::new()),
            RequestId::new(),
        );

        let result = ctx.serve_piped(Request::new(Body::empty())).await;
        assert!(matches!(result, Err(SubrequestError::Aborted)));
    }

    #[tokio::test]
    async fn test_piped_get_headers() {
        let ctx = context();
        let mut piped = ctx
            .piped_get("/v1/AUTH_a/c/o", &origin("/c/o"), "copy", None)
            .await
            .unwrap();

        assert_eq!(piped.status, StatusCode::OK);
        assert_eq!(piped.headers.get(NEWEST_HEADER).unwrap(), "true");
        assert!(piped.headers.get(STORAGE_POLICY_HEADER).is_none());
        assert_eq!(piped.headers.get("x-source").unwrap(), "copy");

        let mut body = String::new();
        piped.body.read_to_string(&mut body).await.unwrap();
        assert_eq!(body, "GET /v1/AUTH_a/c/o");
    }

    #[tokio::test]
    async fn test_piped_get_forwards_manifest_query() {
        let ctx = context();
        let mut piped = ctx
            .piped_get(
                "/v1/AUTH_a/c/o",
                &origin("/c/o?multipart-manifest=get"),
                "slo",
                None,
            )
            .await
            .unwrap();

        let mut body = String::new();
        piped.body.read_to_string(&mut body).await.unwrap();
        assert_eq!(body, "GET /v1/AUTH_a/c/o?multipart-manifest=get&format=raw");
    }

    #[tokio::test]
    async fn test_piped_get_overrides_authorize() {
        let ctx = context();
        let deny: AuthorizeFn = Arc::new(|_: &Parts| false);
        let piped = ctx
            .piped_get("/v1/AUTH_a/c/o", &origin("/c/o"), "copy", Some(deny))
            .await
            .unwrap();

        assert_eq!(piped.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_query_value() {
        let uri: Uri = "/c?max-keys=5&prefix=a%2Fb".parse().unwrap();
        assert_eq!(query_value(&uri, "max-keys").as_deref(), Some("5"));
        assert_eq!(query_value(&uri, "prefix").as_deref(), Some("a/b"));
        assert_eq!(query_value(&uri, "marker"), None);
    }

    #[test]
    fn test_counter_capability_is_shared() {
        let ctx = context();
        ctx.metrics().counter("x").inc(2);
        let clone = ctx.clone();
        assert_eq!(clone.metrics().value("x"), 2);
    }
}
