use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ForwardError, Result};

/// Wire protocol spoken to an upstream, taken from the address scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamProtocol {
    #[default]
    Dns,
    Tls,
}

impl UpstreamProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamProtocol::Dns => "dns",
            UpstreamProtocol::Tls => "tls",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dns" => Some(UpstreamProtocol::Dns),
            "tls" => Some(UpstreamProtocol::Tls),
            _ => None,
        }
    }

    /// Port used when the configured address carries none
    pub fn default_port(&self) -> u16 {
        match self {
            UpstreamProtocol::Dns => 53,
            UpstreamProtocol::Tls => 853,
        }
    }
}

impl std::fmt::Display for UpstreamProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One upstream resolver
///
/// The address is fixed at construction. The only mutable part is the
/// consecutive-failure counter, which the attempt loop bumps and resets.
#[derive(Debug)]
pub struct Proxy {
    addr: String,
    protocol: UpstreamProtocol,
    fails: AtomicU32,
}

impl Proxy {
    /// Parse and normalize a configured upstream address.
    ///
    /// Bare hosts get the protocol's default port appended, so `1.1.1.1`
    /// becomes `1.1.1.1:53` and `tls://9.9.9.9` becomes `9.9.9.9:853`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ForwardError::InvalidAddress("empty address".into()));
        }

        let (protocol, rest) = match raw.split_once("://") {
            Some((scheme, rest)) => {
                let protocol = UpstreamProtocol::from_str(scheme).ok_or_else(|| {
                    ForwardError::InvalidAddress(format!(
                        "'{}': unsupported scheme '{}'",
                        raw, scheme
                    ))
                })?;
                (protocol, rest)
            }
            None => (UpstreamProtocol::Dns, raw),
        };

        let (host, port) = split_host_port(rest, protocol.default_port())
            .map_err(|e| ForwardError::InvalidAddress(format!("'{}': {}", raw, e)))?;

        Ok(Self {
            addr: format_host_port(&host, port),
            protocol,
            fails: AtomicU32::new(0),
        })
    }

    /// Normalized `host:port`
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn protocol(&self) -> UpstreamProtocol {
        self.protocol
    }

    /// Consecutive failed attempts since the last success
    pub fn fails(&self) -> u32 {
        self.fails.load(Ordering::Relaxed)
    }

    pub fn mark_failed(&self) -> u32 {
        self.fails.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }

    pub fn mark_healthy(&self) {
        self.fails.store(0, Ordering::Relaxed);
    }

    /// `max_fails == 0` disables the check.
    pub fn is_down(&self, max_fails: u32) -> bool {
        max_fails != 0 && self.fails() >= max_fails
    }
}

impl std::fmt::Display for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.protocol {
            UpstreamProtocol::Dns => write!(f, "{}", self.addr),
            other => write!(f, "{}://{}", other, self.addr),
        }
    }
}

fn split_host_port(addr: &str, default_port: u16) -> std::result::Result<(String, u16), String> {
    // Bare IPs, including unbracketed IPv6 which a URL cannot carry.
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return Ok((ip.to_string(), default_port));
    }

    // A scheme without a registered default port keeps `port()` honest.
    let url = Url::parse(&format!("dns://{}", addr)).map_err(|e| e.to_string())?;

    if !url.username().is_empty() || url.password().is_some() {
        return Err("credentials are not allowed".into());
    }
    if !url.path().is_empty() || url.query().is_some() || url.fragment().is_some() {
        return Err("path, query or fragment is not allowed".into());
    }

    let host = url.host_str().unwrap_or_default();
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return Err("missing host".into());
    }

    let port = url.port().unwrap_or(default_port);
    if port == 0 {
        return Err("port must be non-zero".into());
    }

    Ok((host.to_string(), port))
}

fn format_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_protocol_parsing_and_helpers() {
        assert_eq!(UpstreamProtocol::from_str("DNS"), Some(UpstreamProtocol::Dns));
        assert_eq!(UpstreamProtocol::from_str("tls"), Some(UpstreamProtocol::Tls));
        assert_eq!(UpstreamProtocol::from_str("https"), None);

        assert_eq!(UpstreamProtocol::Dns.default_port(), 53);
        assert_eq!(UpstreamProtocol::Tls.default_port(), 853);
        assert_eq!(UpstreamProtocol::Tls.to_string(), "tls");
    }

    #[test]
    fn test_parse_appends_default_port() {
        assert_eq!(Proxy::parse("1.1.1.1").unwrap().addr(), "1.1.1.1:53");
        assert_eq!(Proxy::parse(" 8.8.8.8 ").unwrap().addr(), "8.8.8.8:53");
        assert_eq!(Proxy::parse("dns.example").unwrap().addr(), "dns.example:53");
    }

    #[test]
    fn test_parse_keeps_explicit_port() {
        assert_eq!(Proxy::parse("1.1.1.1:5353").unwrap().addr(), "1.1.1.1:5353");
        assert_eq!(Proxy::parse("dns://9.9.9.9:53").unwrap().addr(), "9.9.9.9:53");
    }

    #[test]
    fn test_parse_ipv6() {
        assert_eq!(Proxy::parse("::1").unwrap().addr(), "[::1]:53");
        assert_eq!(Proxy::parse("[::1]:5353").unwrap().addr(), "[::1]:5353");
        assert_eq!(Proxy::parse("[2001:db8::1]").unwrap().addr(), "[2001:db8::1]:53");
    }

    #[test]
    fn test_parse_tls_scheme() {
        let proxy = Proxy::parse("tls://1.1.1.1").unwrap();
        assert_eq!(proxy.addr(), "1.1.1.1:853");
        assert_eq!(proxy.protocol(), UpstreamProtocol::Tls);
        assert_eq!(proxy.to_string(), "tls://1.1.1.1:853");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in [
            "",
            "   ",
            "https://1.1.1.1",
            "1.1.1.1:abc",
            "1.1.1.1:0",
            "1.1.1.1:70000",
            "1.1.1.1/path",
            "user:pass@1.1.1.1",
            "dns://",
        ] {
            let err = Proxy::parse(raw).unwrap_err();
            assert!(
                matches!(err, ForwardError::InvalidAddress(_)),
                "expected InvalidAddress for {:?}, got {:?}",
                raw,
                err
            );
        }
    }

    #[test]
    fn test_fail_counter() {
        let proxy = Proxy::parse("1.1.1.1").unwrap();
        assert_eq!(proxy.fails(), 0);
        assert!(!proxy.is_down(2));

        assert_eq!(proxy.mark_failed(), 1);
        assert!(!proxy.is_down(2));
        assert_eq!(proxy.mark_failed(), 2);
        assert!(proxy.is_down(2));
        assert!(!proxy.is_down(0));

        proxy.mark_healthy();
        assert_eq!(proxy.fails(), 0);
        assert!(!proxy.is_down(2));
    }
}
