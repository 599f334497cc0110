//! Request ID generation

use base64::{engine::general_purpose::STANDARD, Engine};
use uuid::Uuid;

/// Transaction id shared by an external request and all of its subrequests
#[derive(Debug, Clone)]
pub struct RequestId {
    /// Primary request ID (x-amz-request-id, X-Trans-Id)
    pub id: String,
    /// Extended request ID (x-amz-id-2), base64 encoded
    pub extended_id: String,
}

impl RequestId {
    /// Generate a new request ID pair
    pub fn new() -> Self {
        let id = format!("tx{}", Uuid::new_v4().simple());
        let extended_id = STANDARD.encode(Uuid::new_v4().as_bytes());
        Self { id, extended_id }
    }

    /// Reuse an id supplied by the client or an upstream hop
    pub fn with_id(id: impl Into<String>) -> Self {
        let id = id.into();
        let extended_id = STANDARD.encode(id.as_bytes());
        Self { id, extended_id }
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}
