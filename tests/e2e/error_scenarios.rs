//! E2E Error Scenario Tests
//!
//! ## Test Coverage
//!
//! - Malformed paths rejected before any upstream call
//! - Dot segments rejected before any upstream call
//! - Health check without a reachable upstream
//! - Unreachable upstream
//! - Oversized bodies

use super::common::ProxyTestEnv;
use oss_proxy::config::SignerKind;
use std::net::TcpListener;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Address with nothing listening on it
fn closed_addr() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Test: empty bucket is a 400 and nothing is sent upstream
#[tokio::test]
async fn test_missing_bucket_returns_400() {
    let upstream = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let env = ProxyTestEnv::start(&upstream, SignerKind::DerivedKey).await;

    for path in ["/", "/?acl"] {
        let response = env
            .client
            .get(env.url(path))
            .send()
            .await
            .expect("Request failed");

        assert_eq!(response.status(), 400, "path {}", path);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain"
        );
        assert_eq!(response.text().await.unwrap(), "missing bucket");
    }

    assert!(upstream.received_requests().await.unwrap().is_empty());
}

/// Send `request_line` over a raw connection and return the status line.
///
/// HTTP clients resolve `.` and `..` before sending, so the path has to be
/// written by hand to reach the proxy intact.
async fn raw_status_line(env: &ProxyTestEnv, request_line: &str) -> String {
    let mut stream = tokio::net::TcpStream::connect(env.proxy_addr)
        .await
        .expect("Connect failed");
    let request = format!(
        "{}\r\nHost: {}\r\nConnection: close\r\n\r\n",
        request_line, env.proxy_addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response);
    response.lines().next().unwrap_or("").to_string()
}

/// Test: dot segments are a 400 and nothing is sent upstream
#[tokio::test]
async fn test_dot_segments_return_400() {
    let upstream = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    for signer in [SignerKind::DerivedKey, SignerKind::SharedSecret] {
        let env = ProxyTestEnv::start(&upstream, signer).await;

        for path in [
            "/mybucket/a/../b.txt",
            "/mybucket/./b.txt",
            "/mybucket/a/%2e%2e/b.txt",
            "/mybucket/a/%2E/b.txt",
        ] {
            let status_line = raw_status_line(&env, &format!("GET {} HTTP/1.1", path)).await;
            assert!(
                status_line.starts_with("HTTP/1.1 400"),
                "path {} got {}",
                path,
                status_line
            );
        }
    }

    assert!(upstream.received_requests().await.unwrap().is_empty());
}

/// Test: health check needs no upstream
#[tokio::test]
async fn test_health_without_upstream() {
    let env = ProxyTestEnv::with_upstream_addr(closed_addr(), SignerKind::SharedSecret, None).await;

    let response = env
        .client
        .get(env.url("/health"))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
}

/// Test: connection failure upstream is a 502
#[tokio::test]
async fn test_unreachable_upstream_returns_502() {
    let env = ProxyTestEnv::with_upstream_addr(closed_addr(), SignerKind::DerivedKey, None).await;

    let response = env
        .client
        .put(env.url("/mybucket/k"))
        .body("hello")
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 502);
}

/// Test: body over the configured limit is a 413 and is not forwarded
#[tokio::test]
async fn test_oversized_body_returns_413() {
    let upstream = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let env = ProxyTestEnv::with_limit(&upstream, SignerKind::DerivedKey, 8).await;

    let response = env
        .client
        .put(env.url("/mybucket/big.bin"))
        .body(vec![0u8; 64])
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 413);
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

/// Test: body within the limit still goes through
#[tokio::test]
async fn test_body_within_limit_forwarded() {
    let upstream = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&upstream)
        .await;

    let env = ProxyTestEnv::with_limit(&upstream, SignerKind::DerivedKey, 8).await;

    let response = env
        .client
        .put(env.url("/mybucket/small.bin"))
        .body("hello")
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), 200);
}
