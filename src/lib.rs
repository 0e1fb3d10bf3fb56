//! # Inferred proxies
//!
//! This crate infers the trusted reverse proxies of a http request from its `X-Forwarded-For`
//! header, without listing the proxy addresses ahead of time. It is meant for containers and
//! clusters where the proxy topology is dynamic.
//!
//! ## Usage
//!
//! ```rust
//! use inferred_proxies::{client_ip, ConnectedPeer, ProxyTrustResolver, Settings};
//!
//! let settings = Settings::new();
//! let resolver = ProxyTrustResolver::new(ConnectedPeer);
//!
//! let mut request = http::Request::get("/").body(()).unwrap();
//! request.headers_mut().insert("x-forwarded-for", "192.0.2.100, 192.0.2.2".parse().unwrap());
//! let socket_addr = core::net::SocketAddr::from(([192, 0, 2, 1], 54321));
//! request.extensions_mut().insert(socket_addr);
//!
//! let settings = resolver.apply(&settings, &request);
//!
//! assert_eq!(settings.reverse_proxy(), Some(true));
//! assert_eq!(settings.reverse_proxy_addresses(), ["192.0.2.2", "192.0.2.1"]);
//! assert_eq!(
//!     client_ip(&settings, socket_addr.ip(), Some("192.0.2.100, 192.0.2.2")),
//!     core::net::IpAddr::from([192, 0, 2, 100])
//! );
//! ```
//!
//! ## Rules
//!
//!  * Inference only runs when reverse proxy is not explicitly disabled and no proxy address is
//!    configured: an explicit configuration always wins.
//!  * The request must carry a `X-Forwarded-For` header and the immediate peer must be known.
//!  * The immediate peer is trusted as a proxy, as well as every `X-Forwarded-For` value but the
//!    first one, which is the client.
//!
//! The immediate peer is trusted without any check, so this must only be used behind a reverse
//! proxy that always sets the `X-Forwarded-For` header.
//!
//! ## Features
//!
//!  * `http` (default): read requests from the [`http`](https://docs.rs/http) crate.
//!  * `tower` (default): [`middleware::InferProxiesLayer`] tower middleware.

mod client;
mod config;
pub mod error;
mod extract;
#[cfg(feature = "tower")]
pub mod middleware;
mod resolver;

pub use client::client_ip;
pub use config::Settings;
pub use error::Error;
pub use extract::InboundRequest;
#[cfg(feature = "http")]
pub use extract::{ConnectedPeer, PeerAddressSource, RequestInformation, ServerEnvironment};
#[cfg(feature = "http")]
pub use resolver::ProxyTrustResolver;
pub use resolver::{infer_proxy_chain, resolve, should_infer_trust, ProxyChain};
