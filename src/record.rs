use crate::identity::{EndpointIdentity, EndpointKind};

/// Tagged state of a single endpoint's validation. Transitions are driven exclusively by
/// the validation driver's commit step (see `driver::commit`) while the registry lock is
/// held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationState {
    Unknown,
    InProcess,
    Success,
    SuccessButExpired,
    Fail,
}

impl ValidationState {
    pub fn name(self) -> &'static str {
        match self {
            ValidationState::Unknown => "unknown",
            ValidationState::InProcess => "in_process",
            ValidationState::Success => "success",
            ValidationState::SuccessButExpired => "success_but_expired",
            ValidationState::Fail => "fail",
        }
    }
}

/// Per-network privacy mode. `Off` means no transport map exists for the network at all
/// (registry invariant 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivateDnsMode {
    Off,
    Opportunistic,
    Strict,
}

/// Provider-specific TLS parameters. Opaque to the registry and driver; handed verbatim
/// to `ProbeTransport`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsParameters {
    pub provider_name: String,
    pub ca_certificate_pem: Option<String>,
}

/// Mutable per-endpoint state tracked by the registry. Drivers take an owned `Clone` of a
/// record at spawn time (a snapshot) rather than aliasing it; all canonical mutation goes
/// back through the registry lock + lookup path (see design notes on pointer graphs).
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointRecord {
    pub identity: EndpointIdentity,
    pub mark: u32,
    pub active: bool,
    pub validation_state: ValidationState,
    pub latency_threshold: Option<i64>,
    pub kind: EndpointKind,
    pub tls: TlsParameters,
}

impl EndpointRecord {
    pub fn new(identity: EndpointIdentity, mark: u32, tls: TlsParameters) -> Self {
        Self {
            identity,
            mark,
            active: true,
            validation_state: ValidationState::Unknown,
            latency_threshold: None,
            kind: EndpointKind::Dot,
            tls,
        }
    }

    /// §4.3: a record needs a fresh probe iff it is part of the desired configuration and
    /// has not already settled into a state that either has a live driver (`InProcess`) or
    /// requires no further work (`Success`).
    pub fn needs_validation(&self) -> bool {
        self.active
            && matches!(
                self.validation_state,
                ValidationState::Unknown | ValidationState::Fail | ValidationState::SuccessButExpired
            )
    }

    /// Invariant 5: an inactive record can never remain `Success`. Called whenever `active`
    /// is cleared by `set`.
    pub fn deactivate(&mut self) {
        self.active = false;
        if self.validation_state == ValidationState::Success {
            self.validation_state = ValidationState::SuccessButExpired;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn record(state: ValidationState, active: bool) -> EndpointRecord {
        let addr: SocketAddr = "1.1.1.1:853".parse().unwrap();
        let mut r = EndpointRecord::new(
            EndpointIdentity::new(addr, ""),
            1,
            TlsParameters::default(),
        );
        r.active = active;
        r.validation_state = state;
        r
    }

    #[test]
    fn needs_validation_true_for_unknown_fail_expired() {
        assert!(record(ValidationState::Unknown, true).needs_validation());
        assert!(record(ValidationState::Fail, true).needs_validation());
        assert!(record(ValidationState::SuccessButExpired, true).needs_validation());
    }

    #[test]
    fn needs_validation_false_for_in_process_or_success_or_inactive() {
        assert!(!record(ValidationState::InProcess, true).needs_validation());
        assert!(!record(ValidationState::Success, true).needs_validation());
        assert!(!record(ValidationState::Unknown, false).needs_validation());
    }

    #[test]
    fn deactivate_demotes_success_to_expired() {
        let mut r = record(ValidationState::Success, true);
        r.deactivate();
        assert!(!r.active);
        assert_eq!(r.validation_state, ValidationState::SuccessButExpired);
    }

    #[test]
    fn deactivate_leaves_other_states_untouched() {
        let mut r = record(ValidationState::InProcess, true);
        r.deactivate();
        assert_eq!(r.validation_state, ValidationState::InProcess);
    }
}
