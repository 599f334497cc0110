//! Handler chain capability

use async_trait::async_trait;
use axum::body::Body;
use http::{HeaderMap, Request, StatusCode};
use std::io;
use std::sync::Arc;

/// Response sink a handler writes into.
///
/// Mirrors the usual server response writer: headers are mutable until the
/// status is committed with [`write_header`](ResponseWriter::write_header),
/// and a body write before any commit implicitly commits `200 OK`. Only the
/// first commit counts.
#[async_trait]
pub trait ResponseWriter: Send {
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    fn write_header(&mut self, status: StatusCode);

    async fn write(&mut self, data: &[u8]) -> io::Result<usize>;
}

/// A value that can process a request and write a response
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, writer: &mut dyn ResponseWriter, request: Request<Body>);
}

/// Middleware constructor: wraps the next handler in the chain
pub type Layer = Box<dyn FnOnce(Arc<dyn Handler>) -> Arc<dyn Handler> + Send>;

/// Build a chain ending in `terminal`. The first layer is outermost.
pub fn compose(terminal: Arc<dyn Handler>, layers: Vec<Layer>) -> Arc<dyn Handler> {
    layers
        .into_iter()
        .rev()
        .fold(terminal, |next, layer| layer(next))
}
