//! Response writer that streams the body through an in-process pipe

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use std::io;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::handler::ResponseWriter;

/// Bytes the pipe holds before the writer blocks on the reader
pub const PIPE_CAPACITY: usize = 16 * 1024;

/// Status and headers as they were when the handler committed
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// Writer end of a streamed response.
///
/// The first commit sends a [`ResponseHead`] snapshot on the ready channel
/// exactly once; the body then flows through the pipe to whoever holds the
/// read end. Closing (or dropping) the writer gives the reader end-of-stream.
#[derive(Debug)]
pub struct PipeResponseWriter {
    stream: Option<DuplexStream>,
    status: Option<StatusCode>,
    headers: HeaderMap,
    ready: Option<oneshot::Sender<ResponseHead>>,
}

impl PipeResponseWriter {
    pub fn new(stream: DuplexStream, ready: oneshot::Sender<ResponseHead>) -> Self {
        Self {
            stream: Some(stream),
            status: None,
            headers: HeaderMap::new(),
            ready: Some(ready),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Close the writer end.
    ///
    /// A handler that returned without committing gets an implicit `200 OK`
    /// so the waiting caller is always released.
    pub async fn close(&mut self) {
        if self.ready.is_some() {
            self.write_header(StatusCode::OK);
        }
        if let Some(mut stream) = self.stream.take() {
            if let Err(err) = stream.shutdown().await {
                if !is_closed_pipe(&err) {
                    error!(error = %err, "PipeResponseWriter close error");
                }
            }
        }
    }
}

#[async_trait]
impl ResponseWriter for PipeResponseWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        let Some(ready) = self.ready.take() else {
            debug!(ignored = %status, "superfluous write_header on pipe");
            return;
        };
        self.status = Some(status);
        let head = ResponseHead {
            status,
            headers: self.headers.clone(),
        };
        if ready.send(head).is_err() {
            debug!(%status, "pipe reader went away before the response was ready");
        }
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.ready.is_some() {
            self.write_header(StatusCode::OK);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write on closed pipe",
            ));
        };
        match stream.write_all(data).await {
            Ok(()) => Ok(data.len()),
            Err(err) => {
                if !is_closed_pipe(&err) {
                    error!(error = %err, "PipeResponseWriter write error");
                }
                Err(err)
            }
        }
    }
}

/// The reading side hung up: an expected outcome, not worth an error log
fn is_closed_pipe(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
    )
}
