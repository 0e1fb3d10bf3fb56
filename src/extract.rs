use std::borrow::Cow;

/// Read-only view of the request information needed to infer trusted proxies
///
/// Both parts are optional: the forwarded for header may be missing, and some execution contexts
/// are not able to report the immediate peer of the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundRequest<'a> {
    pub(crate) immediate_peer_address: Option<Cow<'a, str>>,
    pub(crate) forwarded_for: Option<Cow<'a, str>>,
}

impl<'a> InboundRequest<'a> {
    pub fn new(immediate_peer_address: Option<&'a str>, forwarded_for: Option<&'a str>) -> Self {
        Self {
            immediate_peer_address: immediate_peer_address.map(Cow::Borrowed),
            forwarded_for: forwarded_for.map(Cow::Borrowed),
        }
    }

    /// Transport level source address of the connection, as seen by this process
    pub fn immediate_peer_address(&self) -> Option<&str> {
        self.immediate_peer_address.as_deref()
    }

    /// Raw value of the `X-Forwarded-For` header
    pub fn forwarded_for(&self) -> Option<&str> {
        self.forwarded_for.as_deref()
    }
}

#[cfg(feature = "http")]
pub use self::http_request::{
    ConnectedPeer, PeerAddressSource, RequestInformation, ServerEnvironment,
};

#[cfg(feature = "http")]
mod http_request {
    use super::InboundRequest;
    use std::borrow::Cow;
    use std::collections::HashMap;
    use std::net::{IpAddr, SocketAddr};
    use std::sync::Arc;

    const X_FORWARDED_FOR: &str = "x-forwarded-for";
    const REMOTE_ADDR: &str = "REMOTE_ADDR";

    /// A trait to extract required information from a request in order to infer trusted proxies
    pub trait RequestInformation {
        fn headers(&self) -> &http::HeaderMap;

        fn extensions(&self) -> &http::Extensions;

        /// Get the `X-Forwarded-For` header value
        ///
        /// Returns `None` only when the header is absent, an empty header is still present.
        /// Multiple header lines are joined with a comma, which is equivalent per RFC 7230.
        fn x_forwarded_for(&self) -> Option<Cow<'_, str>> {
            let mut values = self
                .headers()
                .get_all(X_FORWARDED_FOR)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()));

            let first = values.next()?;

            Some(values.fold(first, |joined, value| {
                let mut joined = joined.into_owned();
                joined.push(',');
                joined.push_str(&value);
                Cow::Owned(joined)
            }))
        }

        /// Build the view used by the resolver, asking `source` for the immediate peer
        fn inbound<P: PeerAddressSource + ?Sized>(&self, source: &P) -> InboundRequest<'_> {
            InboundRequest {
                immediate_peer_address: source
                    .immediate_peer_address(self.extensions())
                    .map(Cow::Owned),
                forwarded_for: self.x_forwarded_for(),
            }
        }
    }

    impl<T> RequestInformation for http::Request<T> {
        fn headers(&self) -> &http::HeaderMap {
            self.headers()
        }

        fn extensions(&self) -> &http::Extensions {
            self.extensions()
        }
    }

    impl RequestInformation for http::request::Parts {
        fn headers(&self) -> &http::HeaderMap {
            &self.headers
        }

        fn extensions(&self) -> &http::Extensions {
            &self.extensions
        }
    }

    /// Capability reporting the immediate peer address of a request
    ///
    /// The implementation is chosen once by the host environment, depending on where it stores
    /// the connection information.
    pub trait PeerAddressSource {
        fn immediate_peer_address(&self, extensions: &http::Extensions) -> Option<String>;
    }

    impl<P: PeerAddressSource + ?Sized> PeerAddressSource for &P {
        fn immediate_peer_address(&self, extensions: &http::Extensions) -> Option<String> {
            (**self).immediate_peer_address(extensions)
        }
    }

    impl<P: PeerAddressSource + ?Sized> PeerAddressSource for Box<P> {
        fn immediate_peer_address(&self, extensions: &http::Extensions) -> Option<String> {
            (**self).immediate_peer_address(extensions)
        }
    }

    impl<P: PeerAddressSource + ?Sized> PeerAddressSource for Arc<P> {
        fn immediate_peer_address(&self, extensions: &http::Extensions) -> Option<String> {
            (**self).immediate_peer_address(extensions)
        }
    }

    /// Read the peer from the connection information stored in the request extensions
    ///
    /// Servers usually insert the remote `SocketAddr` of the accepted connection, an `IpAddr` is
    /// also accepted. The port is never part of the address.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ConnectedPeer;

    impl PeerAddressSource for ConnectedPeer {
        fn immediate_peer_address(&self, extensions: &http::Extensions) -> Option<String> {
            extensions
                .get::<SocketAddr>()
                .map(|addr| addr.ip())
                .or_else(|| extensions.get::<IpAddr>().copied())
                .map(|ip| ip.to_string())
        }
    }

    /// Read the peer from a CGI like map of server variables (`REMOTE_ADDR`)
    ///
    /// A `ServerEnvironment` stored in the request extensions holds the variables of that request
    /// and is read first. The variables of the source itself are captured once when it is built,
    /// so they only describe the peer when the process serves a single request.
    #[derive(Debug, Clone, Default)]
    pub struct ServerEnvironment {
        variables: HashMap<String, String>,
    }

    impl ServerEnvironment {
        /// Create an empty environment
        pub fn new() -> Self {
            Self::default()
        }

        /// Snapshot the variables of the current process
        ///
        /// Variables which are not valid unicode are skipped.
        pub fn from_process_env() -> Self {
            std::env::vars_os()
                .filter_map(|(key, value)| {
                    Some((key.into_string().ok()?, value.into_string().ok()?))
                })
                .collect()
        }

        /// Set a server variable
        pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
            self.variables.insert(key.into(), value.into());
        }

        /// Get a server variable
        pub fn get(&self, key: &str) -> Option<&str> {
            self.variables.get(key).map(String::as_str)
        }
    }

    impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ServerEnvironment {
        fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
            Self {
                variables: iter
                    .into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect(),
            }
        }
    }

    impl PeerAddressSource for ServerEnvironment {
        fn immediate_peer_address(&self, extensions: &http::Extensions) -> Option<String> {
            extensions
                .get::<ServerEnvironment>()
                .and_then(|request_environment| request_environment.get(REMOTE_ADDR))
                .or_else(|| self.get(REMOTE_ADDR))
                .map(str::to_string)
        }
    }
}
