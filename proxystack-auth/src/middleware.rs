//! Middleware attaching resolved S3 credentials to the request context

use async_trait::async_trait;
use axum::body::Body;
use http::request::Parts;
use http::Request;
use proxystack_core::{CredentialStore, ErrorCode, S3Error};
use proxystack_proxy::response::s3_error;
use proxystack_proxy::{AuthorizeFn, Handler, Layer, ProxyContext, ResponseWriter};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::sigv4::access_key_from_request;

/// Resolves the request's access key against a [`CredentialStore`].
///
/// A known key installs [`S3Auth`](proxystack_core::S3Auth) on the context
/// together with an `authorize` capability that only admits paths inside the
/// resolved account. Requests without S3 credentials, and subrequests, pass
/// through untouched.
pub struct S3AuthHandler {
    next: Arc<dyn Handler>,
    credentials: Arc<CredentialStore>,
}

impl S3AuthHandler {
    pub fn new(next: Arc<dyn Handler>, credentials: Arc<CredentialStore>) -> Self {
        Self { next, credentials }
    }
}

/// Layer constructor for chain composition
pub fn layer(credentials: Arc<CredentialStore>) -> Layer {
    Box::new(move |next| Arc::new(S3AuthHandler::new(next, credentials)) as Arc<dyn Handler>)
}

/// Capability admitting only `/v1/AUTH_<account>` and paths below it
pub fn account_authorizer(account: &str) -> AuthorizeFn {
    let root = format!("/v1/AUTH_{account}");
    Arc::new(move |parts: &Parts| {
        let path = parts.uri.path();
        path == root || path.strip_prefix(root.as_str()).is_some_and(|rest| rest.starts_with('/'))
    })
}

#[async_trait]
impl Handler for S3AuthHandler {
    async fn serve(&self, writer: &mut dyn ResponseWriter, request: Request<Body>) {
        let (mut parts, body) = request.into_parts();
        let Some(mut ctx) = ProxyContext::from_parts(&parts) else {
            return self.next.serve(writer, Request::from_parts(parts, body)).await;
        };
        if ctx.is_subrequest() || ctx.s3_auth.is_some() {
            return self.next.serve(writer, Request::from_parts(parts, body)).await;
        }

        let access_key = match access_key_from_request(&parts) {
            Ok(Some(access_key)) => access_key,
            Ok(None) => return self.next.serve(writer, Request::from_parts(parts, body)).await,
            Err(err) => {
                debug!(error = %err, path = %parts.uri.path(), "Malformed S3 credentials");
                let err = S3Error::new(ErrorCode::AuthorizationHeaderMalformed)
                    .with_message(err.to_string())
                    .with_resource(parts.uri.path())
                    .with_request_id(ctx.request_id.id.clone());
                return s3_error(writer, &err).await;
            }
        };

        let Some(auth) = self.credentials.resolve(&access_key) else {
            warn!(access_key = %access_key, "Unknown S3 access key");
            let err = S3Error::new(ErrorCode::InvalidAccessKeyId)
                .with_resource(parts.uri.path())
                .with_request_id(ctx.request_id.id.clone());
            return s3_error(writer, &err).await;
        };

        debug!(access_key = %auth.access_key, account = %auth.account, "Resolved S3 credentials");
        ctx.authorize = Some(account_authorizer(&auth.account));
        ctx.s3_auth = Some(auth);
        parts.extensions.insert(ctx);
        self.next.serve(writer, Request::from_parts(parts, body)).await;
    }
}
