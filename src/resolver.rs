use crate::extract::InboundRequest;
use crate::Settings;
use tracing::{debug, trace};

#[cfg(feature = "http")]
use crate::extract::{PeerAddressSource, RequestInformation};
#[cfg(feature = "http")]
use std::borrow::Cow;

/// Ordered list of addresses inferred as trusted reverse proxies
///
/// Upstream proxies found in the `X-Forwarded-For` header come first, in header order, and the
/// immediate peer of the connection is always the last element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyChain(Vec<String>);

impl ProxyChain {
    /// Proxy addresses, the immediate peer last
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Consume the chain into its addresses
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for ProxyChain {
    fn from(proxies: Vec<String>) -> Self {
        Self(proxies)
    }
}

/// Check if trusted proxies should be inferred for this request
///
/// Inference never overrides an explicit configuration: it is skipped when reverse proxy is
/// explicitly disabled or when addresses are already configured. It also requires evidence of a
/// proxy (the `X-Forwarded-For` header, even empty) and a known immediate peer.
pub fn should_infer_trust(settings: &Settings, request: &InboundRequest<'_>) -> bool {
    if settings.reverse_proxy() == Some(false) {
        trace!("reverse proxy is explicitly disabled, skip proxies inference");

        return false;
    }

    if !settings.reverse_proxy_addresses().is_empty() {
        trace!("reverse proxy addresses are configured, skip proxies inference");

        return false;
    }

    if request.forwarded_for().is_none() {
        trace!("no x-forwarded-for header, skip proxies inference");

        return false;
    }

    if request.immediate_peer_address().is_none() {
        trace!("immediate peer address is unknown, skip proxies inference");

        return false;
    }

    true
}

/// Infer the chain of trusted proxies from the request
///
/// The immediate peer is trusted as a proxy in its own right. When the `X-Forwarded-For` header
/// holds more than one value, the first one is the client and the others are upstream proxies.
/// Values are not trimmed nor validated, commas may or may not be followed by a space.
///
/// A missing part contributes nothing to the chain, use [`should_infer_trust`] first.
///
/// # Example
/// ```
/// use inferred_proxies::{infer_proxy_chain, InboundRequest};
///
/// let request = InboundRequest::new(Some("192.0.2.1"), Some("203.0.113.9, 198.51.100.7"));
///
/// assert_eq!(infer_proxy_chain(&request).as_slice(), ["198.51.100.7", "192.0.2.1"]);
/// ```
pub fn infer_proxy_chain(request: &InboundRequest<'_>) -> ProxyChain {
    let mut proxies = Vec::new();

    if let Some(forwarded_for) = request.forwarded_for() {
        // see https://tools.ietf.org/html/rfc7239#section-7.1
        let forwarded_for = forwarded_for.replace(", ", ",");
        let mut values = forwarded_for.split(',');

        // the first value is the client
        values.next();
        proxies.extend(values.map(str::to_string));
    }

    proxies.extend(request.immediate_peer_address().map(str::to_string));

    ProxyChain(proxies)
}

/// Compute the settings to use for this request
///
/// Returns `None` when inference does not apply and the current settings must be kept.
pub fn resolve(settings: &Settings, request: &InboundRequest<'_>) -> Option<Settings> {
    if !should_infer_trust(settings, request) {
        return None;
    }

    let chain = infer_proxy_chain(request);

    debug!(proxies = ?chain.as_slice(), "inferred trusted reverse proxies");

    Some(settings.with_inferred_proxies(chain))
}

/// Trusted proxies resolver bound to the peer address source of the host environment
///
/// # Example
/// ```
/// use inferred_proxies::{ConnectedPeer, ProxyTrustResolver, Settings};
///
/// let resolver = ProxyTrustResolver::new(ConnectedPeer);
/// let mut request = http::Request::get("/").body(()).unwrap();
/// request.headers_mut().insert("x-forwarded-for", "192.0.2.100".parse().unwrap());
/// request.extensions_mut().insert("192.0.2.1:4711".parse::<std::net::SocketAddr>().unwrap());
///
/// let settings = resolver.resolve(&Settings::new(), &request).unwrap();
///
/// assert_eq!(settings.reverse_proxy(), Some(true));
/// assert_eq!(settings.reverse_proxy_addresses(), ["192.0.2.1"]);
/// ```
#[cfg(feature = "http")]
#[derive(Debug, Clone, Default)]
pub struct ProxyTrustResolver<P> {
    source: P,
}

#[cfg(feature = "http")]
impl<P: PeerAddressSource> ProxyTrustResolver<P> {
    /// Create a resolver reading the immediate peer from `source`
    pub fn new(source: P) -> Self {
        Self { source }
    }

    /// Get the peer address source of this resolver
    pub fn source(&self) -> &P {
        &self.source
    }

    /// Project the request on the information needed for inference
    pub fn view<'r, R: RequestInformation>(&self, request: &'r R) -> InboundRequest<'r> {
        request.inbound(&self.source)
    }

    /// Check if trusted proxies should be inferred for this request, see [`should_infer_trust`]
    pub fn should_infer_trust<R: RequestInformation>(
        &self,
        settings: &Settings,
        request: &R,
    ) -> bool {
        should_infer_trust(settings, &self.view(request))
    }

    /// Compute the settings to use for this request, see [`resolve`]
    ///
    /// Returns `None` when the current settings must be kept.
    pub fn resolve<R: RequestInformation>(
        &self,
        settings: &Settings,
        request: &R,
    ) -> Option<Settings> {
        resolve(settings, &self.view(request))
    }

    /// Same as [`resolve`](Self::resolve) but fall back to the current settings
    pub fn apply<'s, R: RequestInformation>(
        &self,
        settings: &'s Settings,
        request: &R,
    ) -> Cow<'s, Settings> {
        match self.resolve(settings, request) {
            Some(inferred) => Cow::Owned(inferred),
            None => Cow::Borrowed(settings),
        }
    }
}
