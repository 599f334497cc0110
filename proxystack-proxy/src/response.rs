//! Canned responses written through a [`ResponseWriter`]

use http::{header, HeaderValue, StatusCode};
use proxystack_core::{ErrorCode, S3Error};
use tracing::{debug, error};

use crate::handler::ResponseWriter;

pub const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// Commit `status` and write `body` with an explicit length
pub async fn write_body(
    writer: &mut dyn ResponseWriter,
    status: StatusCode,
    content_type: &'static str,
    body: &[u8],
) {
    let headers = writer.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    writer.write_header(status);
    if body.is_empty() {
        return;
    }
    if let Err(err) = writer.write(body).await {
        debug!(error = %err, "response body write failed");
    }
}

/// Generic response for a status: a small HTML page naming it
pub async fn standard_response(writer: &mut dyn ResponseWriter, status: StatusCode) {
    let reason = status.canonical_reason().unwrap_or("Unknown Status");
    let body = format!("<html><h1>{reason}</h1><p>{}</p></html>", status.as_u16());
    write_body(writer, status, "text/html; charset=UTF-8", body.as_bytes()).await;
}

/// Plain text error with a caller supplied message
pub async fn simple_error_response(
    writer: &mut dyn ResponseWriter,
    status: StatusCode,
    message: &str,
) {
    write_body(writer, status, "text/plain; charset=utf-8", message.as_bytes()).await;
}

/// Well formed XML document response
pub async fn xml_response(writer: &mut dyn ResponseWriter, status: StatusCode, document: &str) {
    write_body(writer, status, XML_CONTENT_TYPE, document.as_bytes()).await;
}

/// Render `err` as an S3 `Error` document with the code's status
pub async fn s3_error(writer: &mut dyn ResponseWriter, err: &S3Error) {
    match err.to_xml() {
        Ok(document) => xml_response(writer, err.code.http_status(), &document).await,
        Err(marshal) => {
            error!(error = %marshal, "failed to render S3 error document");
            simple_error_response(writer, StatusCode::INTERNAL_SERVER_ERROR, &marshal.to_string())
                .await;
        }
    }
}

/// Pass an internal status through to an S3 client.
///
/// Statuses with a named S3 code get an `Error` document; everything else
/// gets the generic [`standard_response`].
pub async fn s3_error_response(
    writer: &mut dyn ResponseWriter,
    status: StatusCode,
    resource: &str,
    request_id: &str,
) {
    match ErrorCode::from_status(status) {
        Some(code) => {
            let err = S3Error::new(code)
                .with_resource(resource)
                .with_request_id(request_id);
            s3_error(writer, &err).await;
        }
        None => standard_response(writer, status).await,
    }
}
