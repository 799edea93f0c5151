/// DNS-SD meta-query type that enumerates every registration type in a domain
pub const SERVICES_TYPE: &str = "_services._dns-sd._udp";

/// Domain browsed when none is configured
pub const DEFAULT_BROWSE_DOMAIN: &str = "local.";

/// Protocol suffixes accepted for registration types
pub const TCP_REG_TYPE_SUFFIX: &str = "_tcp";
pub const UDP_REG_TYPE_SUFFIX: &str = "_udp";

/// Label separator inside registration types and domains
pub const REG_TYPE_SEPARATOR: char = '.';

/// API path prefix
pub const API_PREFIX: &str = "/v1";
