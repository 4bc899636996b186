//! OSS Proxy Library
//!
//! Transparent HTTP reverse proxy for Aliyun OSS.
//!
//! Clients address objects as `/<bucket>/<object>` on the proxy; each request
//! is rewritten to the virtual-hosted endpoint
//! `<bucket>.<region>[-internal].<domain>/<object>`, signed with the
//! configured credentials and forwarded. The upstream response is relayed
//! unchanged.
//!
//! # Features
//!
//! - **Two signers**: `AWS4-HMAC-SHA256` (derived key) or `OSS ak:sig`
//!   (HMAC-SHA1 shared secret), selected by configuration
//! - **Internal endpoints**: route over the provider's internal network
//! - **Prometheus metrics** on a separate listener
//!
//! # Example
//!
//! ```no_run
//! use oss_proxy::{config::Config, server::ProxyServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     config.validate()?;
//!     let server = ProxyServer::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod metrics;
pub mod request;
pub mod router;
pub mod server;
pub mod signer;
pub mod upstream;

// Re-export commonly used types
pub use config::Config;
pub use server::ProxyServer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
