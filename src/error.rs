use thiserror::Error;

use crate::identity::EndpointIdentity;

/// Returned by [`crate::engine::PrivateDnsEngine::set`] when any server address in the
/// request fails to parse. No partial update is applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidInput {
    #[error("server address `{0}` is not a numeric host:port")]
    UnparsableAddress(String),
}

/// Distinguishable rejection reasons for [`crate::engine::PrivateDnsEngine::request_validation`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RevalidationRejection {
    #[error("network {0} has no private DNS configuration")]
    UnknownNetwork(i32),
    #[error("network {0} is not in opportunistic mode")]
    NotOpportunistic(i32),
    #[error("endpoint {0:?} is not configured on network {1}")]
    EndpointNotConfigured(EndpointIdentity, i32),
    #[error("endpoint {0:?} on network {1} is not active")]
    EndpointInactive(EndpointIdentity, i32),
    #[error("endpoint {0:?} on network {1} is not currently validated")]
    NotCurrentlyValidated(EndpointIdentity, i32),
    #[error("mark mismatch for endpoint {0:?} on network {1}")]
    MarkMismatch(EndpointIdentity, i32),
}

/// `PreconditionFailed` wraps the specific [`RevalidationRejection`] reason, matching the
/// spec's split between the broad error kind and the distinguishable reason it carries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("revalidation precondition failed: {0}")]
pub struct PreconditionFailed(#[from] pub RevalidationRejection);

/// Internal lookup-miss signal. Never escapes the public API; callers observe a `Fail`
/// state transition instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NotFound;
