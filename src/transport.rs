use std::time::Duration;

use async_trait::async_trait;

use crate::identity::EndpointIdentity;
use crate::record::TlsParameters;

/// The TLS probe transport. Given an endpoint and the socket mark to probe it through,
/// attempts a handshake plus a canary resolve and reports whether a valid answer came
/// back. The actual TLS and socket-mark plumbing is explicitly out of scope for this
/// crate; this trait is the seam. `identity` and `tls` are passed by value (both are
/// cheap, `Clone` value types) so the trait stays free of lifetime parameters, which
/// keeps it trivially mockable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn probe(&self, identity: EndpointIdentity, tls: TlsParameters, mark: u32) -> bool;
}

/// Supplies the network's moving-average Do53 (plaintext, port 53) response time, used
/// only to compute the opportunistic latency gate in Step A of the validation driver.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Do53LatencyOracle: Send + Sync {
    async fn average(&self, net_id: i32) -> Option<Duration>;
}
