use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Errors raised while browsing and aggregating registration types
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    /// Registration type did not split into the expected labels
    #[error("Malformed registration type '{0}'")]
    MalformedRegistrationType(String),

    /// Protocol suffix is neither _tcp nor _udp
    #[error("Unknown service protocol '{protocol}' in '{registration_type}'")]
    UnsupportedProtocol {
        protocol: String,
        registration_type: String,
    },

    /// Instance event for a registration type that was never announced
    #[error("Service from unknown service type {0}")]
    OrphanedEvent(String),

    /// Browse could not be opened
    #[error("Failed to browse '{registration_type}' in '{domain}': {reason}")]
    BrowseFailed {
        registration_type: String,
        domain: String,
        reason: String,
    },

    /// Open browse terminated with an error
    #[error("Browse of '{registration_type}' in '{domain}' failed: {reason}")]
    StreamFailed {
        registration_type: String,
        domain: String,
        reason: String,
    },

    #[error("Discovery is already running")]
    AlreadyStarted,
}
