//! Client CIDR/address allow-deny filtering, evaluated once per accepted
//! TCP connection before the handshake is read.

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterConfigError {
    #[error("invalid CIDR or address specifier `{0}`")]
    InvalidSpecifier(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientFilterConfig {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

/// Parsed, ready-to-evaluate client filter.
pub struct ClientFilter {
    allow: Vec<IpNetwork>,
    deny: Vec<IpNetwork>,
}

impl ClientFilter {
    pub fn from_config(config: &ClientFilterConfig) -> Result<Self, FilterConfigError> {
        Ok(Self {
            allow: parse_specifiers(&config.allow)?,
            deny: parse_specifiers(&config.deny)?,
        })
    }

    pub fn allow_all() -> Self {
        Self {
            allow: Vec::new(),
            deny: Vec::new(),
        }
    }

    /// If the allowlist is non-empty, the client must match some entry in
    /// it. Otherwise, if the denylist is non-empty, the client must match
    /// none of its entries. An empty allow and an empty deny always allow.
    pub fn allows(&self, addr: IpAddr) -> bool {
        let addr = canonicalize(addr);

        if !self.allow.is_empty() {
            return self.allow.iter().any(|net| net.contains(addr));
        }
        if !self.deny.is_empty() {
            return !self.deny.iter().any(|net| net.contains(addr));
        }
        true
    }
}

/// Canonicalizes IPv4-mapped IPv6 addresses to plain IPv4 before matching.
fn canonicalize(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(IpAddr::V6(v6)),
        other => other,
    }
}

fn parse_specifiers(specs: &[String]) -> Result<Vec<IpNetwork>, FilterConfigError> {
    specs
        .iter()
        .map(|s| {
            if s.contains('/') {
                s.parse::<IpNetwork>()
                    .map_err(|_| FilterConfigError::InvalidSpecifier(s.clone()))
            } else {
                s.parse::<IpAddr>()
                    .map(IpNetwork::from)
                    .map_err(|_| FilterConfigError::InvalidSpecifier(s.clone()))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(allow: &[&str], deny: &[&str]) -> ClientFilter {
        ClientFilter::from_config(&ClientFilterConfig {
            allow: allow.iter().map(|s| s.to_string()).collect(),
            deny: deny.iter().map(|s| s.to_string()).collect(),
        })
        .unwrap()
    }

    #[test]
    fn empty_lists_allow_everyone() {
        let f = filter(&[], &[]);
        assert!(f.allows("1.2.3.4".parse().unwrap()));
    }

    #[test]
    fn allowlist_takes_precedence_and_is_exclusive() {
        let f = filter(&["10.0.0.0/24"], &[]);
        assert!(f.allows("10.0.0.5".parse().unwrap()));
        assert!(!f.allows("10.0.1.5".parse().unwrap()));
    }

    #[test]
    fn denylist_only_applies_without_an_allowlist() {
        let f = filter(&[], &["10.0.0.0/24"]);
        assert!(!f.allows("10.0.0.5".parse().unwrap()));
        assert!(f.allows("10.0.1.5".parse().unwrap()));
    }

    #[test]
    fn ipv4_mapped_ipv6_is_canonicalized() {
        let f = filter(&["10.0.0.0/24"], &[]);
        let mapped: IpAddr = "::ffff:10.0.0.5".parse().unwrap();
        assert!(f.allows(mapped));
    }
}
