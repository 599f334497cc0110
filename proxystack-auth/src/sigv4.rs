//! AWS `Authorization` header parsing

use http::header::AUTHORIZATION;
use http::request::Parts;
use thiserror::Error;

const SIGV4_ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Errors extracting credentials from a request
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid authorization header format")]
    InvalidAuthFormat,

    #[error("Missing credential")]
    MissingCredential,

    #[error("Invalid credential format")]
    InvalidCredentialFormat,

    #[error("Missing signed headers")]
    MissingSignedHeaders,

    #[error("Missing signature")]
    MissingSignature,
}

/// Parsed SigV4 authorization header
#[derive(Debug)]
pub struct AuthorizationHeader {
    pub algorithm: String,
    pub access_key: String,
    pub date: String,
    pub region: String,
    pub service: String,
    pub signed_headers: Vec<String>,
    pub signature: String,
}

/// Parse an AWS SigV4 authorization header
///
/// Format: AWS4-HMAC-SHA256 Credential=AKID/DATE/REGION/SERVICE/aws4_request,
///         SignedHeaders=host;x-amz-date, Signature=HEX
pub fn parse_authorization_header(header: &str) -> Result<AuthorizationHeader, AuthError> {
    let (algorithm, components) = header
        .split_once(' ')
        .ok_or(AuthError::InvalidAuthFormat)?;

    let mut credential = None;
    let mut signed_headers = None;
    let mut signature = None;

    for component in components.split(',') {
        let Some((key, value)) = component.trim().split_once('=') else {
            continue;
        };
        match key {
            "Credential" => credential = Some(value),
            "SignedHeaders" => signed_headers = Some(value),
            "Signature" => signature = Some(value),
            _ => {}
        }
    }

    let credential = credential.ok_or(AuthError::MissingCredential)?;
    let scope = parse_credential_scope(credential)?;
    let signed_headers = signed_headers.ok_or(AuthError::MissingSignedHeaders)?;
    let signature = signature.ok_or(AuthError::MissingSignature)?;

    Ok(AuthorizationHeader {
        algorithm: algorithm.to_string(),
        access_key: scope[0].to_string(),
        date: scope[1].to_string(),
        region: scope[2].to_string(),
        service: scope[3].to_string(),
        signed_headers: signed_headers.split(';').map(String::from).collect(),
        signature: signature.to_string(),
    })
}

/// `AKID/DATE/REGION/SERVICE/aws4_request`
fn parse_credential_scope(credential: &str) -> Result<Vec<&str>, AuthError> {
    let scope: Vec<&str> = credential.split('/').collect();
    if scope.len() != 5 || scope[0].is_empty() {
        return Err(AuthError::InvalidCredentialFormat);
    }
    Ok(scope)
}

/// Parse a SigV2 header (`AWS AKID:SIGNATURE`) into its access key
pub fn parse_v2_header(header: &str) -> Result<String, AuthError> {
    let credentials = header
        .strip_prefix("AWS ")
        .ok_or(AuthError::InvalidAuthFormat)?;
    let (access_key, signature) = credentials
        .rsplit_once(':')
        .ok_or(AuthError::InvalidCredentialFormat)?;
    if access_key.is_empty() {
        return Err(AuthError::MissingCredential);
    }
    if signature.is_empty() {
        return Err(AuthError::MissingSignature);
    }
    Ok(access_key.to_string())
}

/// Access key the request claims to be signed with.
///
/// `Ok(None)` means the request carries no S3 credentials at all, either in
/// the `Authorization` header or as presigned query parameters.
pub fn access_key_from_request(parts: &Parts) -> Result<Option<String>, AuthError> {
    if let Some(value) = parts.headers.get(AUTHORIZATION) {
        let header = value.to_str().map_err(|_| AuthError::InvalidAuthFormat)?;
        if header.starts_with(SIGV4_ALGORITHM) {
            return parse_authorization_header(header).map(|parsed| Some(parsed.access_key));
        }
        if header.starts_with("AWS ") {
            return parse_v2_header(header).map(Some);
        }
        return Ok(None);
    }

    let Some(query) = parts.uri.query() else {
        return Ok(None);
    };
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "X-Amz-Credential" => {
                let scope = parse_credential_scope(&value)?;
                return Ok(Some(scope[0].to_string()));
            }
            "AWSAccessKeyId" if !value.is_empty() => return Ok(Some(value.into_owned())),
            _ => {}
        }
    }
    Ok(None)
}
