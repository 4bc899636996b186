//! E2E Proxy Flow Tests
//!
//! Happy path: requests go through the proxy, arrive upstream on the
//! virtual-hosted bucket endpoint with a valid signature, and the upstream
//! response comes back untouched.

use super::common::{
    expected_v1_authorization, verify_v4, ProxyTestEnv, TEST_HOST, TEST_HTTP_DATE,
    TEST_SECRET_KEY,
};
use oss_proxy::config::SignerKind;
use wiremock::matchers::{body_string, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test: nested key PUT with the shared-secret signer
#[tokio::test]
async fn test_put_nested_key_shared_secret() {
    let upstream = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/a/b/c.txt"))
        .and(body_string("hello"))
        .respond_with(ResponseTemplate::new(200).set_body_string("stored"))
        .expect(1)
        .mount(&upstream)
        .await;

    let env = ProxyTestEnv::start(&upstream, SignerKind::SharedSecret).await;

    let response = env
        .client
        .put(env.url("/mybucket/a/b/c.txt"))
        .body("hello")
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "stored");

    let received = upstream.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let request = &received[0];

    assert_eq!(request.headers.get("host").unwrap(), TEST_HOST);
    assert_eq!(
        request.headers.get("content-type").unwrap(),
        "application/octet-stream"
    );
    assert_eq!(request.headers.get("date").unwrap(), TEST_HTTP_DATE);
    assert_eq!(
        request.headers.get("authorization").unwrap().to_str().unwrap(),
        expected_v1_authorization(request, "/mybucket/a/b/c.txt")
    );
}

/// Test: nested key PUT with the derived-key signer
#[tokio::test]
async fn test_put_nested_key_derived_key() {
    let upstream = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/a/b/c.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("stored"))
        .expect(1)
        .mount(&upstream)
        .await;

    let env = ProxyTestEnv::start(&upstream, SignerKind::DerivedKey).await;

    let response = env
        .client
        .put(env.url("/mybucket/a/b/c.txt"))
        .body("hello")
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "stored");

    let received = upstream.received_requests().await.unwrap();
    let request = &received[0];

    let authorization = request.headers.get("authorization").unwrap().to_str().unwrap();
    assert!(authorization.starts_with(
        "AWS4-HMAC-SHA256 Credential=test-ak/20240102/oss-test/s3/aws4_request, SignedHeaders="
    ));
    assert!(authorization.contains("host;"));
    assert_eq!(
        request.headers.get("x-amz-content-sha256").unwrap(),
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
    assert_eq!(request.headers.get("x-amz-date").unwrap(), "20240102T030405Z");

    verify_v4(request, TEST_SECRET_KEY).unwrap();
}

/// Test: bucket listing keeps its query and still verifies
#[tokio::test]
async fn test_query_is_forwarded_and_signed() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("prefix", "photos/2024"))
        .and(query_param("max-keys", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<ListBucketResult/>"))
        .expect(1)
        .mount(&upstream)
        .await;

    let env = ProxyTestEnv::start(&upstream, SignerKind::DerivedKey).await;

    let response = env
        .client
        .get(env.url("/mybucket/?prefix=photos%2F2024&max-keys=10"))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "<ListBucketResult/>");

    let received = upstream.received_requests().await.unwrap();
    verify_v4(&received[0], TEST_SECRET_KEY).unwrap();
}

/// Test: caller credentials are replaced, never passed through
#[tokio::test]
async fn test_inbound_credentials_are_replaced() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/k"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;

    let env = ProxyTestEnv::start(&upstream, SignerKind::SharedSecret).await;

    env.client
        .get(env.url("/mybucket/k"))
        .header("Authorization", "Bearer attacker")
        .header("Date", "Mon, 01 Jan 2001 00:00:00 GMT")
        .send()
        .await
        .expect("Request failed");

    let received = upstream.received_requests().await.unwrap();
    let request = &received[0];

    let authorizations: Vec<_> = request.headers.get_all("authorization").iter().collect();
    assert_eq!(authorizations.len(), 1);
    assert!(authorizations[0].to_str().unwrap().starts_with("OSS test-ak:"));

    let dates: Vec<_> = request.headers.get_all("date").iter().collect();
    assert_eq!(dates.len(), 1);
    assert_eq!(dates[0], TEST_HTTP_DATE);
}

/// Test: caller metadata and content type are forwarded
#[tokio::test]
async fn test_caller_headers_are_forwarded() {
    let upstream = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/doc.json"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;

    let env = ProxyTestEnv::start(&upstream, SignerKind::SharedSecret).await;

    env.client
        .put(env.url("/mybucket/doc.json"))
        .header("Content-Type", "application/json")
        .header("x-oss-meta-owner", "alice")
        .body("{}")
        .send()
        .await
        .expect("Request failed");

    let received = upstream.received_requests().await.unwrap();
    let request = &received[0];
    assert_eq!(
        request.headers.get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(request.headers.get("x-oss-meta-owner").unwrap(), "alice");
    assert_eq!(
        request.headers.get("authorization").unwrap().to_str().unwrap(),
        expected_v1_authorization(request, "/mybucket/doc.json")
    );
}

/// Test: upstream status, headers and body are relayed unchanged
#[tokio::test]
async fn test_upstream_response_relayed() {
    let upstream = MockServer::start().await;
    let error_body = "<Error><Code>AccessDenied</Code></Error>";
    Mock::given(method("GET"))
        .and(path("/secret.txt"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-oss-request-id", "5C3D9175B6FC201293AD4890")
                .insert_header("content-type", "application/xml")
                .set_body_string(error_body),
        )
        .mount(&upstream)
        .await;

    let env = ProxyTestEnv::start(&upstream, SignerKind::DerivedKey).await;

    let response = env
        .client
        .get(env.url("/mybucket/secret.txt"))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 403);
    assert_eq!(
        response.headers().get("x-oss-request-id").unwrap(),
        "5C3D9175B6FC201293AD4890"
    );
    assert_eq!(response.text().await.unwrap(), error_body);
}

/// Test: redirects from upstream reach the caller instead of being followed
#[tokio::test]
async fn test_upstream_redirect_not_followed() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/moved"))
        .respond_with(
            ResponseTemplate::new(307).insert_header("location", "http://elsewhere.invalid/x"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let env = ProxyTestEnv::start(&upstream, SignerKind::DerivedKey).await;

    let client = reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    let response = client
        .get(env.url("/mybucket/moved"))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 307);
    assert_eq!(
        response.headers().get("location").unwrap(),
        "http://elsewhere.invalid/x"
    );
}

const ENCODED_KEY_PATH: &str = "/mybucket/dir%2Fname/file%20x.txt";

/// Test: percent-encoded key reaches upstream as sent, derived-key signer
#[tokio::test]
async fn test_encoded_key_derived_key() {
    let upstream = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&upstream)
        .await;

    let env = ProxyTestEnv::start(&upstream, SignerKind::DerivedKey).await;

    let response = env
        .client
        .put(env.url(ENCODED_KEY_PATH))
        .body("hello")
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 200);

    let received = upstream.received_requests().await.unwrap();
    let request = &received[0];
    assert_eq!(request.url.path(), "/dir%2Fname/file%20x.txt");
    verify_v4(request, TEST_SECRET_KEY).unwrap();
}

/// Test: percent-encoded key is signed by its decoded name, shared-secret signer
#[tokio::test]
async fn test_encoded_key_shared_secret() {
    let upstream = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&upstream)
        .await;

    let env = ProxyTestEnv::start(&upstream, SignerKind::SharedSecret).await;

    let response = env
        .client
        .put(env.url(ENCODED_KEY_PATH))
        .body("hello")
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 200);

    let received = upstream.received_requests().await.unwrap();
    let request = &received[0];
    assert_eq!(request.url.path(), "/dir%2Fname/file%20x.txt");
    assert_eq!(
        request.headers.get("authorization").unwrap().to_str().unwrap(),
        expected_v1_authorization(request, "/mybucket/dir/name/file x.txt")
    );
}
