//! Translator tests against the in-memory internal API

use crate::listing::encode_continuation_token;
use crate::s3api::{layer, S3ApiConfig};
use axum::body::{Body, Bytes};
use http::request::Parts;
use http::{header, Method, Request, StatusCode};
use proxystack_core::{InfoRegistry, MetricsRegistry, RequestId, S3Auth};
use proxystack_proxy::{compose, CaptureWriter, Handler, ProxyContext};
use proxystack_storage::{InternalApi, MemoryStorage, ObjectStorage};
use std::sync::Arc;

const ACCOUNT: &str = "acct";
const INTERNAL_ACCOUNT: &str = "AUTH_acct";

struct Harness {
    storage: Arc<MemoryStorage>,
    metrics: Arc<MetricsRegistry>,
    chain: Arc<dyn Handler>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(&S3ApiConfig { enabled: true })
    }

    fn with_config(config: &S3ApiConfig) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let mut info = InfoRegistry::new();
        let chain = compose(
            Arc::new(InternalApi::new(storage.clone())),
            vec![layer(config, &metrics, &mut info)],
        );
        Self {
            storage,
            metrics,
            chain,
        }
    }

    async fn bucket(&self, name: &str) {
        self.storage.create_container(INTERNAL_ACCOUNT, name).await.unwrap();
    }

    async fn object(&self, bucket: &str, key: &str) {
        self.storage
            .put_object(INTERNAL_ACCOUNT, bucket, key, Bytes::from_static(b"data"), "text/plain")
            .await
            .unwrap();
    }

    fn context(&self, authenticated: bool) -> ProxyContext {
        let mut ctx = ProxyContext::new(
            self.chain.clone(),
            self.metrics.clone(),
            RequestId::with_id("tx-s3"),
        );
        if authenticated {
            ctx.s3_auth = Some(S3Auth {
                access_key: "AKID".to_string(),
                account: ACCOUNT.to_string(),
            });
        }
        ctx
    }

    async fn send_with(&self, method: Method, uri: &str, ctx: ProxyContext) -> Response {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(ctx);
        let mut capture = CaptureWriter::new();
        self.chain.serve(&mut capture, request).await;
        Response::from(capture)
    }

    async fn send(&self, method: Method, uri: &str) -> Response {
        self.send_with(method, uri, self.context(true)).await
    }
}

/// Snapshot of a captured response
struct Response {
    status: StatusCode,
    headers: http::HeaderMap,
    body: String,
}

impl From<CaptureWriter> for Response {
    fn from(capture: CaptureWriter) -> Self {
        let (status, headers, body) = capture.into_parts();
        Self {
            status,
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        }
    }
}

// =============================================================================
// ACCOUNT TIER
// =============================================================================

mod account_tests {
    use super::*;

    #[tokio::test]
    async fn test_list_buckets() {
        let h = Harness::new();
        h.bucket("photos").await;
        h.bucket("archive").await;

        let resp = h.send(Method::GET, "/").await;
        assert_eq!(resp.status, StatusCode::OK);
        assert!(resp.body.contains("<ListAllMyBucketsResult"));
        assert!(resp.body.contains("<ID>acct</ID>"));
        let archive = resp.body.find("<Name>archive</Name>").unwrap();
        let photos = resp.body.find("<Name>photos</Name>").unwrap();
        assert!(archive < photos);
    }

    #[tokio::test]
    async fn test_list_buckets_empty_account() {
        let h = Harness::new();
        let resp = h.send(Method::GET, "/").await;
        assert_eq!(resp.status, StatusCode::OK);
        assert!(!resp.body.contains("<Bucket>"));
    }

    #[tokio::test]
    async fn test_account_rejects_other_methods() {
        let h = Harness::new();
        let resp = h.send(Method::POST, "/").await;
        assert_eq!(resp.status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(!resp.body.contains("<Error>"));
    }
}

// =============================================================================
// CONTAINER TIER
// =============================================================================

mod container_tests {
    use super::*;

    #[tokio::test]
    async fn test_head_bucket() {
        let h = Harness::new();
        h.bucket("photos").await;

        let found = h.send(Method::HEAD, "/photos").await;
        assert_eq!(found.status, StatusCode::OK);

        let missing = h.send(Method::HEAD, "/missing").await;
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
        assert!(!missing.body.contains("<Error>"));
    }

    #[tokio::test]
    async fn test_create_bucket_sets_location() {
        let h = Harness::new();

        let resp = h.send(Method::PUT, "/photos").await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.headers.get(header::LOCATION).unwrap(), "/photos");
        assert!(h.storage.container_stats(INTERNAL_ACCOUNT, "photos").await.is_ok());

        let again = h.send(Method::PUT, "/photos").await;
        assert_eq!(again.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_delete_bucket() {
        let h = Harness::new();
        h.bucket("photos").await;

        let resp = h.send(Method::DELETE, "/photos").await;
        assert_eq!(resp.status, StatusCode::NO_CONTENT);

        let missing = h.send(Method::DELETE, "/photos").await;
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
        assert!(!missing.body.contains("<Error>"));
    }

    #[tokio::test]
    async fn test_delete_non_empty_bucket_passes_status_through() {
        let h = Harness::new();
        h.bucket("photos").await;
        h.object("photos", "a.jpg").await;

        let resp = h.send(Method::DELETE, "/photos").await;
        assert_eq!(resp.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unsupported_bucket_method() {
        let h = Harness::new();
        h.bucket("photos").await;

        let resp = h.send(Method::POST, "/photos").await;
        assert_eq!(resp.status, StatusCode::NOT_IMPLEMENTED);
        assert!(resp.body.contains("<Code>NotImplemented</Code>"));
    }

    #[tokio::test]
    async fn test_denied_maps_to_access_denied() {
        let h = Harness::new();
        h.bucket("photos").await;
        let mut ctx = h.context(true);
        ctx.authorize = Some(Arc::new(|_: &Parts| false));

        let resp = h.send_with(Method::GET, "/photos", ctx).await;
        assert_eq!(resp.status, StatusCode::FORBIDDEN);
        assert!(resp.body.contains("<Code>AccessDenied</Code>"));
        assert!(resp.body.contains("<Resource>/photos</Resource>"));
        assert!(resp.body.contains("<RequestId>tx-s3</RequestId>"));
    }

    #[tokio::test]
    async fn test_list_missing_bucket() {
        let h = Harness::new();
        let resp = h.send(Method::GET, "/missing").await;
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
    }
}

// =============================================================================
// OBJECT LISTING
// =============================================================================

mod listing_tests {
    use super::*;

    async fn populated(keys: &[&str]) -> Harness {
        let h = Harness::new();
        h.bucket("b").await;
        for key in keys {
            h.object("b", key).await;
        }
        h
    }

    #[tokio::test]
    async fn test_v1_listing_with_delimiter_pages() {
        let h = populated(&["a.txt", "dir/1", "dir/2", "z.txt"]).await;

        let first = h.send(Method::GET, "/b?max-keys=2&delimiter=%2F").await;
        assert_eq!(first.status, StatusCode::OK);
        assert!(first.body.contains("<Key>a.txt</Key>"));
        assert!(first.body.contains("<Prefix>dir/</Prefix>"));
        assert!(!first.body.contains("z.txt"));
        assert!(first.body.contains("<IsTruncated>true</IsTruncated>"));
        assert!(first.body.contains("<NextMarker>dir/</NextMarker>"));

        let second = h
            .send(Method::GET, "/b?max-keys=2&delimiter=%2F&marker=dir%2F")
            .await;
        assert!(second.body.contains("<Key>z.txt</Key>"));
        assert!(!second.body.contains("<Prefix>dir/</Prefix>"));
        assert!(second.body.contains("<IsTruncated>false</IsTruncated>"));
        assert!(!second.body.contains("NextMarker"));
    }

    #[tokio::test]
    async fn test_v1_listing_without_delimiter_has_no_next_marker() {
        let h = populated(&["a", "b", "c"]).await;
        let resp = h.send(Method::GET, "/b?max-keys=2").await;
        assert!(resp.body.contains("<IsTruncated>true</IsTruncated>"));
        assert!(!resp.body.contains("NextMarker"));
        assert!(resp.body.contains("<Owner>"));
    }

    #[tokio::test]
    async fn test_v1_prefix() {
        let h = populated(&["photos/a", "photos/b", "videos/c"]).await;
        let resp = h.send(Method::GET, "/b?prefix=photos%2F").await;
        assert_eq!(resp.body.matches("<Contents>").count(), 2);
        assert!(resp.body.contains("<Prefix>photos/</Prefix>"));
        assert!(!resp.body.contains("videos/c"));
    }

    #[tokio::test]
    async fn test_v2_continuation_walks_every_key_once() {
        let h = populated(&["a", "b", "c", "d", "e"]).await;

        let mut seen = Vec::new();
        let mut uri = "/b?list-type=2&max-keys=2".to_string();
        for _ in 0..5 {
            let resp = h.send(Method::GET, &uri).await;
            assert_eq!(resp.status, StatusCode::OK);
            for key in ["a", "b", "c", "d", "e"] {
                if resp.body.contains(&format!("<Key>{key}</Key>")) {
                    seen.push(key);
                }
            }
            let Some(start) = resp.body.find("<NextContinuationToken>") else {
                break;
            };
            let rest = &resp.body[start + "<NextContinuationToken>".len()..];
            let token = &rest[..rest.find('<').unwrap()];
            let encoded: String = form_urlencoded::byte_serialize(token.as_bytes()).collect();
            uri = format!("/b?list-type=2&max-keys=2&continuation-token={encoded}");
        }
        assert_eq!(seen, vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_v2_key_count_and_token() {
        let h = populated(&["a", "b", "c"]).await;
        let resp = h.send(Method::GET, "/b?list-type=2&max-keys=2").await;
        assert!(resp.body.contains("<KeyCount>2</KeyCount>"));
        let token = encode_continuation_token("b");
        assert!(resp
            .body
            .contains(&format!("<NextContinuationToken>{token}</NextContinuationToken>")));
        assert!(!resp.body.contains("<Owner>"));
    }

    #[tokio::test]
    async fn test_v2_start_after() {
        let h = populated(&["a", "b", "c"]).await;
        let resp = h.send(Method::GET, "/b?list-type=2&start-after=a").await;
        assert!(!resp.body.contains("<Key>a</Key>"));
        assert!(resp.body.contains("<Key>b</Key>"));
        assert!(resp.body.contains("<StartAfter>a</StartAfter>"));
    }

    #[tokio::test]
    async fn test_v2_corrupt_token_restarts_listing() {
        let h = populated(&["a", "b"]).await;
        let resp = h
            .send(Method::GET, "/b?list-type=2&continuation-token=%25%25")
            .await;
        assert_eq!(resp.status, StatusCode::OK);
        assert!(resp.body.contains("<Key>a</Key>"));
    }

    #[tokio::test]
    async fn test_zero_max_keys() {
        let h = populated(&["a"]).await;
        let resp = h.send(Method::GET, "/b?list-type=2&max-keys=0").await;
        assert!(resp.body.contains("<IsTruncated>true</IsTruncated>"));
        assert!(!resp.body.contains("<Contents>"));
        assert!(!resp.body.contains("NextContinuationToken"));
    }

    #[tokio::test]
    async fn test_listing_object_fields() {
        let h = populated(&["a"]).await;
        let resp = h.send(Method::GET, "/b").await;
        assert!(resp.body.contains("<Size>4</Size>"));
        assert!(resp.body.contains("<StorageClass>STANDARD</StorageClass>"));
        assert!(resp.body.contains("8d777f385d3dfec8815d20f7496026dc"));
    }

    #[tokio::test]
    async fn test_oversized_max_keys_still_detects_truncation() {
        let names: Vec<String> = (0..1002).map(|i| format!("k{i:05}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let h = populated(&refs).await;

        let resp = h.send(Method::GET, "/b?max-keys=10000").await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.body.matches("<Contents>").count(), 1000);
        assert!(resp.body.contains("<MaxKeys>1000</MaxKeys>"));
        assert!(resp.body.contains("<IsTruncated>true</IsTruncated>"));

        let v2 = h.send(Method::GET, "/b?list-type=2&max-keys=10000").await;
        assert!(v2.body.contains("<IsTruncated>true</IsTruncated>"));
        let token = encode_continuation_token("k00999");
        assert!(v2
            .body
            .contains(&format!("<NextContinuationToken>{token}</NextContinuationToken>")));
    }

    #[tokio::test]
    async fn test_v2_fetch_owner_numeric_flag() {
        let h = populated(&["a"]).await;
        let resp = h.send(Method::GET, "/b?list-type=2&fetch-owner=1").await;
        assert!(resp.body.contains("<Owner>"));
        assert!(resp.body.contains("<ID>acct</ID>"));
    }

    #[tokio::test]
    async fn test_v2_echoes_effective_marker() {
        let h = populated(&["a", "b", "c"]).await;
        let resp = h.send(Method::GET, "/b?list-type=2&start-after=a").await;
        assert!(resp.body.contains("<Marker>a</Marker>"));

        let token = encode_continuation_token("b");
        let encoded: String = form_urlencoded::byte_serialize(token.as_bytes()).collect();
        let resp = h
            .send(Method::GET, &format!("/b?list-type=2&continuation-token={encoded}"))
            .await;
        assert!(resp.body.contains("<Marker>b</Marker>"));
        assert!(resp.body.contains("<Key>c</Key>"));
    }
}

// =============================================================================
// ROUTING AND REGISTRATION
// =============================================================================

mod routing_tests {
    use super::*;

    #[tokio::test]
    async fn test_object_tier_not_implemented() {
        let h = Harness::new();
        h.bucket("b").await;
        h.object("b", "key").await;

        let resp = h.send(Method::GET, "/b/key").await;
        assert_eq!(resp.status, StatusCode::NOT_IMPLEMENTED);
        assert!(resp.body.contains("<Code>NotImplemented</Code>"));
        assert!(resp.body.contains("<Resource>/b/key</Resource>"));
    }

    #[tokio::test]
    async fn test_unauthenticated_passes_through() {
        let h = Harness::new();
        let resp = h.send_with(Method::GET, "/", h.context(false)).await;
        // The internal API does not serve S3 paths
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        assert_eq!(h.metrics.value("s3api_requests"), 0);
    }

    #[tokio::test]
    async fn test_internal_paths_pass_through() {
        let h = Harness::new();
        h.bucket("photos").await;

        let resp = h.send(Method::GET, "/v1/AUTH_acct?format=json").await;
        assert_eq!(resp.status, StatusCode::OK);
        assert!(resp.body.starts_with('['));
        assert_eq!(h.metrics.value("s3api_requests"), 0);

        let upper = h.send(Method::GET, "/V1/AUTH_acct").await;
        assert_eq!(upper.status, StatusCode::NOT_FOUND);
        assert_eq!(h.metrics.value("s3api_requests"), 0);
    }

    #[tokio::test]
    async fn test_counts_requests_and_subrequests() {
        let h = Harness::new();
        h.bucket("b").await;

        h.send(Method::GET, "/").await;
        h.send(Method::HEAD, "/b").await;
        h.send(Method::GET, "/b/key").await;

        assert_eq!(h.metrics.value("s3api_requests"), 3);
        assert_eq!(h.metrics.value("s3api_subrequests"), 2);
    }

    #[tokio::test]
    async fn test_disabled_translator_is_transparent() {
        let h = Harness::with_config(&S3ApiConfig::default());
        let resp = h.send(Method::GET, "/").await;
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        assert_eq!(h.metrics.value("s3api_requests"), 0);
    }

    #[test]
    fn test_registers_capability() {
        let metrics = MetricsRegistry::new();
        let mut info = InfoRegistry::new();
        let _ = layer(&S3ApiConfig { enabled: true }, &metrics, &mut info);
        assert!(info.to_json().get("s3api").is_some());
    }
}
