//! S3 credential resolution for ProxyStack
//!
//! Extracts the access key from SigV4 and SigV2 style `Authorization`
//! headers (or presigned query parameters) and maps it to an account.
//! Signatures are not verified.

pub mod middleware;
pub mod sigv4;

pub use middleware::{account_authorizer, layer, S3AuthHandler};
pub use sigv4::{access_key_from_request, AuthError, AuthorizationHeader};
