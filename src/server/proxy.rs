//! Proxy listener and request handler
//!
//! Built on `hyper` and `tokio` directly:
//! - HTTP/1.1, one task per connection
//! - `GET /health` answered locally
//! - Everything else routed as `/<bucket>/<object>`, signed and forwarded
//!
//! Request bodies are buffered in full before signing because the v4
//! payload digest must cover the exact bytes sent. A client disconnect
//! drops the handler future and with it the in-flight upstream call.
//!
//! # Example
//!
//! ```no_run
//! use oss_proxy::config::Config;
//! use oss_proxy::server::ProxyServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let server = ProxyServer::new(config).await?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use super::{ProxyError, ServerError};
use crate::config::{Config, ServerConfig};
use crate::metrics;
use crate::router::ProxyTarget;
use crate::signer::build_signer;
use crate::upstream::{Forwarder, UpstreamResponse};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

const HEALTH_PATH: &str = "/health";

/// Read-only state shared by every connection
pub struct ProxyState {
    forwarder: Forwarder,
    max_body_bytes: Option<usize>,
}

impl ProxyState {
    pub fn new(forwarder: Forwarder, max_body_bytes: Option<usize>) -> Self {
        Self {
            forwarder,
            max_body_bytes,
        }
    }
}

/// HTTP proxy server
pub struct ProxyServer {
    state: Arc<ProxyState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ProxyServer {
    /// Build the signer and forwarder from `config` and bind the listener
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        let signer = build_signer(&config.upstream)?;
        let forwarder = Forwarder::new(&config.upstream, signer)?;

        info!(
            signer = %config.upstream.signer,
            region = %config.upstream.region,
            internal = config.upstream.use_internal_endpoint,
            "Upstream configured"
        );

        Self::with_forwarder(&config.server, forwarder).await
    }

    /// Bind with a ready-made forwarder
    pub async fn with_forwarder(
        config: &ServerConfig,
        forwarder: Forwarder,
    ) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        // Port 0 resolves here
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Server bound to {}", local_addr);

        Ok(Self {
            state: Arc::new(ProxyState::new(forwarder, config.max_body_bytes)),
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until `shutdown` completes.
    ///
    /// Only the accept loop stops; connections already accepted finish on
    /// their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!("Starting proxy server on {}", self.local_addr);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handle_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }

        info!("Shutting down proxy server");
        Ok(())
    }
}

/// Handle one request
///
/// * `/health` - answered locally with `ok`
/// * `/<bucket>[/<object>]` - forwarded; upstream status, headers and body
///   are relayed as received
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<ProxyState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if path == HEALTH_PATH {
        return Ok(text_response(StatusCode::OK, "ok".to_string()));
    }

    let response = match proxy(req, &state).await {
        Ok(upstream) => relay(&method, upstream),
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                error!(
                    method = %method,
                    path = %path,
                    status = status.as_u16(),
                    error = %e,
                    "Proxy request failed"
                );
            } else {
                warn!(
                    method = %method,
                    path = %path,
                    status = status.as_u16(),
                    error = %e,
                    "Proxy request rejected"
                );
            }
            metrics::record_error(e.kind());
            text_response(status, e.to_string())
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16());
    Ok(response)
}

async fn proxy<B>(req: Request<B>, state: &ProxyState) -> Result<UpstreamResponse, ProxyError>
where
    B: Body,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    // Routing comes first so a bad path never costs a body read or a
    // network call.
    let target = ProxyTarget::parse(req.uri().path(), req.uri().query())?;

    let (parts, body) = req.into_parts();

    if let Some(limit) = state.max_body_bytes {
        let declared = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if matches!(declared, Some(len) if len > limit) {
            return Err(ProxyError::PayloadTooLarge(limit));
        }
    }

    let body = read_body(body, state.max_body_bytes).await?;
    let request_bytes = body.len();

    let upstream = state
        .forwarder
        .forward(parts.method, target, &parts.headers, body)
        .await?;

    metrics::record_transfer(request_bytes, upstream.body.len());
    Ok(upstream)
}

async fn read_body<B>(body: B, limit: Option<usize>) -> Result<Bytes, ProxyError>
where
    B: Body,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    match limit {
        Some(limit) => match Limited::new(body, limit).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.is::<LengthLimitError>() => Err(ProxyError::PayloadTooLarge(limit)),
            Err(e) => Err(ProxyError::BodyRead(e.to_string())),
        },
        None => match body.collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) => {
                let e: Box<dyn StdError + Send + Sync> = e.into();
                Err(ProxyError::BodyRead(e.to_string()))
            }
        },
    }
}

fn relay(method: &Method, upstream: UpstreamResponse) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = upstream.headers;

    // The buffered body carries its own length. HEAD keeps the upstream
    // value since there is no body to measure.
    if *method != Method::HEAD {
        response.headers_mut().remove(CONTENT_LENGTH);
    }

    response
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}
