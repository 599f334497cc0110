//! Response writer that buffers everything in memory

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use std::io;
use tracing::debug;

use crate::handler::ResponseWriter;

/// Captures the status, headers and body written by a handler.
///
/// No size cap is enforced here; callers bound memory by choosing what they
/// dispatch. Read the snapshot only after the handler has returned.
#[derive(Debug, Default)]
pub struct CaptureWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl CaptureWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed status, `200 OK` if the handler never committed one
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn is_committed(&self) -> bool {
        self.status.is_some()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        let status = self.status();
        (status, self.headers, self.body.freeze())
    }
}

#[async_trait]
impl ResponseWriter for CaptureWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        match self.status {
            None => self.status = Some(status),
            Some(committed) => {
                debug!(%committed, ignored = %status, "superfluous write_header on capture");
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(data);
        Ok(data.len())
    }
}
