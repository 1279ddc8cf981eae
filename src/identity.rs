use std::net::SocketAddr;

/// Identifies an encrypted DNS endpoint: the socket it is reached on, plus the provider
/// hostname used for certificate verification. An empty `provider_hostname` means the
/// endpoint was configured for opportunistic use and has no hostname to verify against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointIdentity {
    sockaddr: SocketAddr,
    provider_hostname: String,
}

impl EndpointIdentity {
    pub fn new(sockaddr: SocketAddr, provider_hostname: impl Into<String>) -> Self {
        Self {
            sockaddr,
            provider_hostname: provider_hostname.into(),
        }
    }

    pub fn sockaddr(&self) -> SocketAddr {
        self.sockaddr
    }

    pub fn provider_hostname(&self) -> &str {
        &self.provider_hostname
    }

    /// An identity configured with no provider hostname is used opportunistically: it is
    /// tried best-effort and never required to verify a certificate chain against a name.
    pub fn is_opportunistic(&self) -> bool {
        self.provider_hostname.is_empty()
    }
}

/// The DNS-over-TLS port this engine always probes. Numeric addresses carry no port of
/// their own, so it is fixed here rather than accepted from callers.
pub const DOT_PORT: u16 = 853;

/// Endpoint transport kind. Only `Dot` is implemented; the tag exists so a future `Doh`
/// variant can be added without restructuring the registry (see design notes on
/// `getStatus` under-reporting non-DoT kinds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Dot,
}

impl EndpointKind {
    pub fn is_dot(self) -> bool {
        matches!(self, EndpointKind::Dot)
    }
}
