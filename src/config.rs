use core::net::IpAddr;
use std::collections::BTreeMap;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::resolver::ProxyChain;

pub(crate) const REVERSE_PROXY: &str = "reverse_proxy";
pub(crate) const REVERSE_PROXY_ADDRESSES: &str = "reverse_proxy_addresses";

/// Settings governing reverse proxy trust
///
/// `reverse_proxy` is tri-state: explicitly enabled, explicitly disabled, or unset. Trust
/// inference only runs when it is not explicitly disabled and no address has been configured.
/// Any other key of the settings document is kept as is.
///
/// # Example
/// ```
/// use inferred_proxies::Settings;
///
/// let mut settings = Settings::new();
/// settings.add_reverse_proxy_address("10.0.0.0/8");
/// settings.enable_reverse_proxy();
///
/// assert_eq!(settings.reverse_proxy(), Some(true));
/// assert!(settings.is_ip_trusted(&"10.1.2.3".parse().unwrap()));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reverse_proxy: Option<bool>,
    #[serde(default)]
    reverse_proxy_addresses: Vec<String>,
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

impl Settings {
    /// Create empty settings: reverse proxy unset and no trusted address
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a json document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load settings from an already parsed json value
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Get the reverse proxy flag, `None` when it is not set
    pub fn reverse_proxy(&self) -> Option<bool> {
        self.reverse_proxy
    }

    /// Get the trusted reverse proxy addresses, in configuration order
    pub fn reverse_proxy_addresses(&self) -> &[String] {
        &self.reverse_proxy_addresses
    }

    /// Explicitly enable reverse proxy support
    pub fn enable_reverse_proxy(&mut self) {
        self.reverse_proxy = Some(true);
    }

    /// Explicitly disable reverse proxy support
    ///
    /// Trust inference never runs on disabled settings.
    pub fn disable_reverse_proxy(&mut self) {
        self.reverse_proxy = Some(false);
    }

    /// Add an address to the list of trusted reverse proxies
    ///
    /// The address is stored verbatim, it can be an IP address or a CIDR. Configuring any address
    /// opts out of trust inference.
    pub fn add_reverse_proxy_address(&mut self, address: &str) {
        self.reverse_proxy_addresses.push(address.to_string());
    }

    /// Get a free-form setting
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.other.get(key)
    }

    /// Set a free-form setting
    ///
    /// The reverse proxy keys are only written through their typed setters so that both are
    /// always updated together.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        if key == REVERSE_PROXY || key == REVERSE_PROXY_ADDRESSES {
            return Err(Error::ReservedKey(key.to_string()));
        }

        self.other.insert(key.to_string(), value.into());

        Ok(())
    }

    /// Return new settings trusting the given proxy chain
    ///
    /// Reverse proxy is forced on and the addresses are replaced by the chain, every other key is
    /// preserved.
    pub fn with_inferred_proxies(&self, chain: ProxyChain) -> Self {
        Self {
            reverse_proxy: Some(true),
            reverse_proxy_addresses: chain.into_vec(),
            other: self.other.clone(),
        }
    }

    /// Check if a remote address is trusted given the list of reverse proxy addresses
    ///
    /// Entries which are neither an IP address nor a CIDR never match.
    pub fn is_ip_trusted(&self, remote_addr: &IpAddr) -> bool {
        self.reverse_proxy_addresses
            .iter()
            .filter_map(|address| parse_network(address))
            .any(|network| network.contains(remote_addr))
    }
}

fn parse_network(address: &str) -> Option<IpNet> {
    match address.parse::<IpNet>() {
        Ok(network) => Some(network),
        Err(_) => address.parse::<IpAddr>().ok().map(IpNet::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_is_unset() {
        let settings = Settings::default();

        assert_eq!(settings.reverse_proxy(), None);
        assert!(settings.reverse_proxy_addresses().is_empty());
    }

    #[test]
    fn from_json() {
        let settings = Settings::from_json(
            r#"{"reverse_proxy": false, "reverse_proxy_addresses": ["192.0.2.255"], "hash_salt": "abc"}"#,
        )
        .unwrap();

        assert_eq!(settings.reverse_proxy(), Some(false));
        assert_eq!(settings.reverse_proxy_addresses(), ["192.0.2.255"]);
        assert_eq!(settings.get("hash_salt"), Some(&json!("abc")));
    }

    #[test]
    fn from_json_null_is_unset() {
        let settings = Settings::from_json(r#"{"reverse_proxy": null}"#).unwrap();

        assert_eq!(settings.reverse_proxy(), None);
    }

    #[test]
    fn from_json_invalid() {
        let error = Settings::from_json(r#"{"reverse_proxy": "yes"}"#).unwrap_err();

        assert!(matches!(error, Error::InvalidSettings(_)));
    }

    #[test]
    fn serialize_keeps_other_keys() {
        let mut settings = Settings::new();
        settings.set("file_public_path", "sites/default/files").unwrap();

        assert_eq!(
            serde_json::to_value(&settings).unwrap(),
            json!({"reverse_proxy_addresses": [], "file_public_path": "sites/default/files"})
        );
    }

    #[test]
    fn set_reserved_key() {
        let mut settings = Settings::new();

        assert!(matches!(
            settings.set("reverse_proxy", true),
            Err(Error::ReservedKey(key)) if key == "reverse_proxy"
        ));
        assert!(settings
            .set("reverse_proxy_addresses", json!(["192.0.2.1"]))
            .is_err());
        assert_eq!(settings, Settings::new());
    }

    #[test]
    fn with_inferred_proxies() {
        let mut settings = Settings::new();
        settings.set("trusted_host_patterns", json!(["^example\\.com$"])).unwrap();

        let inferred = settings.with_inferred_proxies(ProxyChain::from(vec![
            "192.0.2.2".to_string(),
            "192.0.2.1".to_string(),
        ]));

        assert_eq!(inferred.reverse_proxy(), Some(true));
        assert_eq!(inferred.reverse_proxy_addresses(), ["192.0.2.2", "192.0.2.1"]);
        assert_eq!(
            inferred.get("trusted_host_patterns"),
            Some(&json!(["^example\\.com$"]))
        );
        // source settings are left untouched
        assert_eq!(settings.reverse_proxy(), None);
    }

    #[test]
    fn is_ip_trusted() {
        let mut settings = Settings::new();
        settings.add_reverse_proxy_address("192.0.2.1");
        settings.add_reverse_proxy_address("10.0.0.0/8");
        settings.add_reverse_proxy_address("not an ip");
        settings.add_reverse_proxy_address("");

        assert!(settings.is_ip_trusted(&"192.0.2.1".parse().unwrap()));
        assert!(settings.is_ip_trusted(&"10.20.30.40".parse().unwrap()));
        assert!(!settings.is_ip_trusted(&"192.0.2.2".parse().unwrap()));
        assert!(!settings.is_ip_trusted(&"::1".parse().unwrap()));
    }
}
