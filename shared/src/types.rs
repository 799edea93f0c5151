use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::protocol::REG_TYPE_SEPARATOR;

/// An announcement or withdrawal delivered by a DNS-SD browse.
///
/// For the meta-query the service name is the service label and the
/// registration type carries the protocol and domain, e.g. `_http` /
/// `_tcp.local.`. For an instance browse the service name is the instance
/// and the registration type is `_http._tcp.`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEvent {
    /// Domain the record was seen in, e.g. "local."
    pub domain: String,

    /// Protocol-qualified registration type
    pub registration_type: String,

    /// Service or instance name
    pub service_name: String,

    /// True when the record was withdrawn rather than announced
    pub is_lost: bool,
}

impl ServiceEvent {
    pub fn found(domain: &str, registration_type: &str, service_name: &str) -> Self {
        Self {
            domain: domain.to_string(),
            registration_type: registration_type.to_string(),
            service_name: service_name.to_string(),
            is_lost: false,
        }
    }

    pub fn lost(domain: &str, registration_type: &str, service_name: &str) -> Self {
        Self {
            is_lost: true,
            ..Self::found(domain, registration_type, service_name)
        }
    }
}

/// Live count of instances for one registration type in one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRecord {
    /// Registration type as announced by the meta-query, e.g. "_tcp.local."
    pub registration_type: String,

    pub domain: String,

    /// Service label, e.g. "_http"
    pub service_name: String,

    /// Number of instances currently announced
    pub live_count: i64,
}

impl AggregateRecord {
    /// Row label, e.g. "_http._tcp."
    pub fn label(&self) -> String {
        let protocol = self
            .registration_type
            .split(REG_TYPE_SEPARATOR)
            .next()
            .unwrap_or_default();
        format!("{}.{}.", self.service_name, protocol)
    }
}

/// One row of the published registration-type list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegTypeEntry {
    pub label: String,
    pub description: Option<String>,
    pub registration_type: String,
    pub domain: String,
    pub service_name: String,
    pub live_count: i64,
}

/// Ordered list of registration types with at least one live instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegTypeSnapshot {
    pub entries: Vec<RegTypeEntry>,

    /// Entry count of the snapshot this one replaced
    pub previous_item_count: usize,

    pub published_at: DateTime<Utc>,
}

impl Default for RegTypeSnapshot {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            previous_item_count: 0,
            published_at: Utc::now(),
        }
    }
}
