//! Composite keys linking meta-query announcements to instance browses.
//!
//! A meta-query answer `_http._tcp.local.` arrives as service name `_http`
//! with registration type `_tcp.local.`; the matching instance browse reports
//! registration type `_http._tcp.` in domain `local.`. Both sides must build
//! the same [`AggregateKey`].

use std::fmt;
use shared::protocol::{REG_TYPE_SEPARATOR, TCP_REG_TYPE_SUFFIX, UDP_REG_TYPE_SUFFIX};
use shared::types::ServiceEvent;
use crate::error::{DiscoveryError, Result};

/// Fields are protocol-qualified, so plain concatenation stays unambiguous
/// for well-formed input.
pub fn build_aggregate_key(domain: &str, registration_type: &str, service_name: &str) -> String {
    format!("{}{}{}", domain, registration_type, service_name)
}

pub fn build_subscription_key(protocol_suffix: &str, service_name: &str) -> String {
    format!("{}{}{}", protocol_suffix, REG_TYPE_SEPARATOR, service_name)
}

pub fn is_supported_protocol(protocol: &str) -> bool {
    protocol == TCP_REG_TYPE_SUFFIX || protocol == UDP_REG_TYPE_SUFFIX
}

/// Split a meta-query registration type into (protocol, service domain),
/// e.g. `_tcp.local.` -> (`_tcp`, `local.`).
pub fn split_top_level(registration_type: &str) -> Result<(&str, &str)> {
    match registration_type.split_once(REG_TYPE_SEPARATOR) {
        Some((protocol, domain)) if !protocol.is_empty() && !domain.is_empty() => {
            Ok((protocol, domain))
        }
        _ => Err(DiscoveryError::MalformedRegistrationType(
            registration_type.to_string(),
        )),
    }
}

/// Split an instance registration type into (service type, protocol),
/// e.g. `_http._tcp.` -> (`_http`, `_tcp`).
pub fn split_instance(registration_type: &str) -> Result<(&str, &str)> {
    let mut labels = registration_type
        .split(REG_TYPE_SEPARATOR)
        .filter(|label| !label.is_empty());

    match (labels.next(), labels.next()) {
        (Some(service_type), Some(protocol)) => Ok((service_type, protocol)),
        _ => Err(DiscoveryError::MalformedRegistrationType(
            registration_type.to_string(),
        )),
    }
}

/// Identifies one second-level browse target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    protocol: String,
    service_type: String,
}

impl SubscriptionKey {
    pub fn new(protocol: &str, service_type: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
            service_type: service_type.to_string(),
        }
    }

    /// Registration type to browse for instances, e.g. `_http._tcp`
    pub fn browse_type(&self) -> String {
        format!("{}{}{}", self.service_type, REG_TYPE_SEPARATOR, self.protocol)
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&build_subscription_key(&self.protocol, &self.service_type))
    }
}

/// Identifies one aggregate record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateKey(String);

impl AggregateKey {
    pub fn new(domain: &str, registration_type: &str, service_name: &str) -> Self {
        Self(build_aggregate_key(domain, registration_type, service_name))
    }

    /// Key of the record a meta-query announcement creates
    pub fn from_top_level(event: &ServiceEvent) -> Self {
        Self::new(&event.domain, &event.registration_type, &event.service_name)
    }

    /// Key of the record an instance event counts towards
    pub fn from_instance(event: &ServiceEvent) -> Result<Self> {
        let (service_type, protocol) = split_instance(&event.registration_type)?;
        let registration_type = format!("{}{}{}", protocol, REG_TYPE_SEPARATOR, event.domain);
        Ok(Self::new(&event.domain, &registration_type, service_type))
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_key_format() {
        let key = SubscriptionKey::new("_tcp", "_http");
        assert_eq!(key.to_string(), "_tcp._http");
        assert_eq!(key.browse_type(), "_http._tcp");
    }

    #[test]
    fn test_aggregate_key_symmetry() {
        let cases = [
            ("local.", "_http", "_tcp", "MyPrinter"),
            ("local.", "_ipp", "_tcp", "Office Laser"),
            ("example.com.", "_sip", "_udp", "desk-phone"),
        ];

        for (domain, service, protocol, instance) in cases {
            let top = ServiceEvent::found(domain, &format!("{}.{}", protocol, domain), service);
            let inst = ServiceEvent::found(domain, &format!("{}.{}.", service, protocol), instance);

            assert_eq!(
                AggregateKey::from_top_level(&top),
                AggregateKey::from_instance(&inst).unwrap(),
                "Keys should match for {}.{} in {}",
                service,
                protocol,
                domain
            );
        }
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(split_top_level("_tcp.local.").unwrap(), ("_tcp", "local."));
        assert!(split_top_level("_tcp").is_err());
        assert!(split_top_level(".local.").is_err());
    }

    #[test]
    fn test_split_instance() {
        assert_eq!(split_instance("_http._tcp.").unwrap(), ("_http", "_tcp"));
        assert_eq!(split_instance("_http._tcp").unwrap(), ("_http", "_tcp"));
        assert!(split_instance("_http.").is_err());
    }

    #[test]
    fn test_supported_protocols() {
        assert!(is_supported_protocol("_tcp"));
        assert!(is_supported_protocol("_udp"));
        assert!(!is_supported_protocol("_unknown"));
    }
}
