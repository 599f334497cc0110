//! Bridge between axum and the handler chain

use axum::body::Body;
use axum::response::Response;
use http::{HeaderValue, Request, StatusCode};
use proxystack_core::{MetricsRegistry, RequestId};
use std::sync::Arc;
use tracing::{debug, error};

use crate::context::{ProxyContext, TRANS_ID_HEADER};
use crate::handler::Handler;

/// Serves external requests through the composed handler chain.
///
/// Every request gets a fresh [`RequestId`] and [`ProxyContext`]; the
/// chain's output is streamed back to the client through a pipe so large
/// bodies are never buffered here.
#[derive(Clone)]
pub struct ProxyServer {
    chain: Arc<dyn Handler>,
    metrics: Arc<MetricsRegistry>,
}

impl ProxyServer {
    pub fn new(chain: Arc<dyn Handler>, metrics: Arc<MetricsRegistry>) -> Self {
        Self { chain, metrics }
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub async fn handle(&self, mut request: Request<Body>) -> Response<Body> {
        let request_id = RequestId::new();
        debug!(
            method = %request.method(),
            path = %request.uri().path(),
            request_id = %request_id.id,
            "Handling request"
        );

        let ctx = ProxyContext::new(self.chain.clone(), self.metrics.clone(), request_id.clone());
        request.extensions_mut().insert(ctx.clone());

        let mut response = match ctx.serve_piped(request).await {
            Ok(piped) => piped.into_response(),
            Err(err) => {
                error!(error = %err, request_id = %request_id.id, "Request handling failed");
                internal_error()
            }
        };

        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&request_id.id) {
            headers.insert("x-amz-request-id", value.clone());
            headers.insert(TRANS_ID_HEADER, value);
        }
        if let Ok(value) = HeaderValue::from_str(&request_id.extended_id) {
            headers.insert("x-amz-id-2", value);
        }
        response
    }
}

fn internal_error() -> Response<Body> {
    let mut response = Response::new(Body::from("Internal Server Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
