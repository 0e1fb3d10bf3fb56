//! Tower middleware inferring trusted proxies before calling the inner service.
//!
//! Each request gets its own settings: the inner service finds the effective [`Settings`] as an
//! `Arc<Settings>` request extension, and the resolved [`ClientIp`] when the immediate peer is an
//! ip address. An `Arc<Settings>` extension set by an outer layer replaces the layer settings.

use crate::client::client_ip;
use crate::extract::{PeerAddressSource, RequestInformation};
use crate::resolver::{resolve, ProxyTrustResolver};
use crate::Settings;
use core::net::IpAddr;
use http::Request;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Client ip address of the request, resolved with the effective settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientIp(pub IpAddr);

/// Layer applying [`InferProxies`] to a service
#[derive(Debug, Clone)]
pub struct InferProxiesLayer<P> {
    settings: Arc<Settings>,
    resolver: ProxyTrustResolver<P>,
}

impl<P: PeerAddressSource> InferProxiesLayer<P> {
    /// Create a layer inferring proxies on top of `settings`, reading the peer from `source`
    pub fn new(settings: impl Into<Arc<Settings>>, source: P) -> Self {
        Self {
            settings: settings.into(),
            resolver: ProxyTrustResolver::new(source),
        }
    }
}

impl<S, P: Clone> Layer<S> for InferProxiesLayer<P> {
    type Service = InferProxies<S, P>;

    fn layer(&self, inner: S) -> Self::Service {
        InferProxies {
            inner,
            settings: self.settings.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

/// Middleware inferring trusted proxies, see the [module docs](self)
#[derive(Debug, Clone)]
pub struct InferProxies<S, P> {
    inner: S,
    settings: Arc<Settings>,
    resolver: ProxyTrustResolver<P>,
}

impl<S, P, B> Service<Request<B>> for InferProxies<S, P>
where
    S: Service<Request<B>>,
    P: PeerAddressSource,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        let current = request
            .extensions()
            .get::<Arc<Settings>>()
            .cloned()
            .unwrap_or_else(|| self.settings.clone());

        let (settings, client) = {
            let inbound = request.inbound(self.resolver.source());
            let settings = match resolve(&current, &inbound) {
                Some(inferred) => Arc::new(inferred),
                None => current,
            };
            let client = inbound
                .immediate_peer_address()
                .and_then(|peer| peer.parse::<IpAddr>().ok())
                .map(|peer| ClientIp(client_ip(&settings, peer, inbound.forwarded_for())));

            (settings, client)
        };

        request.extensions_mut().insert(settings);

        if let Some(client) = client {
            request.extensions_mut().insert(client);
        }

        self.inner.call(request)
    }
}
