//! S3 error codes and the `Error` document

use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::xml::{render_document, XmlError};

/// Named S3 error codes the proxy can render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    AccessDenied,
    AuthorizationHeaderMalformed,
    InvalidAccessKeyId,
    NotImplemented,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::AuthorizationHeaderMalformed => "AuthorizationHeaderMalformed",
            Self::InvalidAccessKeyId => "InvalidAccessKeyId",
            Self::NotImplemented => "NotImplemented",
        }
    }

    /// Default human readable message for the code
    pub fn message(&self) -> &'static str {
        match self {
            Self::AccessDenied => "Access Denied",
            Self::AuthorizationHeaderMalformed => "The authorization header is malformed.",
            Self::InvalidAccessKeyId => {
                "The AWS access key Id you provided does not exist in our records."
            }
            Self::NotImplemented => {
                "A header you provided implies functionality that is not implemented."
            }
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::AccessDenied | Self::InvalidAccessKeyId => StatusCode::FORBIDDEN,
            Self::AuthorizationHeaderMalformed => StatusCode::BAD_REQUEST,
            Self::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        }
    }

    /// Named code for an internal status, if one is mapped.
    ///
    /// Statuses without a mapping are answered with the generic status
    /// response instead of an `Error` document.
    pub fn from_status(status: StatusCode) -> Option<Self> {
        match status {
            StatusCode::FORBIDDEN => Some(Self::AccessDenied),
            _ => None,
        }
    }
}

/// S3-style error
#[derive(Debug, Error)]
#[error("{}: {message}", .code.as_str())]
pub struct S3Error {
    pub code: ErrorCode,
    pub message: String,
    pub resource: String,
    pub request_id: String,
}

#[derive(Serialize)]
struct ErrorDocument<'a> {
    #[serde(rename = "Code")]
    code: &'a str,
    #[serde(rename = "Message")]
    message: &'a str,
    #[serde(rename = "Resource")]
    resource: &'a str,
    #[serde(rename = "RequestId")]
    request_id: &'a str,
}

impl S3Error {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.message().to_string(),
            resource: String::new(),
            request_id: String::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Format as an S3 `Error` document
    pub fn to_xml(&self) -> Result<String, XmlError> {
        render_document(
            "Error",
            &ErrorDocument {
                code: self.code.as_str(),
                message: &self.message,
                resource: &self.resource,
                request_id: &self.request_id,
            },
        )
    }
}
