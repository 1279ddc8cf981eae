use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use tokio::sync::Mutex;

use crate::error::{InvalidInput, NotFound, PreconditionFailed, RevalidationRejection};
use crate::identity::{EndpointIdentity, DOT_PORT};
use crate::record::{EndpointRecord, PrivateDnsMode, TlsParameters, ValidationState};

/// An endpoint record snapshot paired with the context a freshly spawned driver needs.
/// Drivers own a `Clone` of the record rather than a reference into the registry (see
/// design notes on pointer graphs).
#[derive(Debug, Clone)]
pub struct PendingValidation {
    pub net_id: i32,
    pub identity: EndpointIdentity,
    pub snapshot: EndpointRecord,
    pub is_revalidation: bool,
}

/// What a driver observed after a single probe attempt, handed to `Registry::commit`
/// (§4.4 Step D).
#[derive(Debug, Clone, Copy)]
pub struct ProbeOutcome {
    pub got_answer: bool,
    pub latency_too_high: bool,
    pub max_attempts_reached: bool,
    pub is_revalidation: bool,
}

/// Result of a commit: the state the registry settled on, whether the driver should loop
/// again, and the payload to report through the `EventReporter`.
#[derive(Debug, Clone, Copy)]
pub struct CommitOutcome {
    pub new_state: ValidationState,
    pub needs_reeval: bool,
    pub succeeded_quickly: bool,
}

struct RegistryState {
    modes: HashMap<i32, PrivateDnsMode>,
    transports: HashMap<i32, HashMap<EndpointIdentity, EndpointRecord>>,
}

/// Thread-safe map from network identifier to its endpoint set and mode. The single
/// source of truth for the engine (§4.1-§4.3); all of its invariants are documented on
/// [`RegistryState`]'s fields in the spec and enforced here rather than by callers.
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                modes: HashMap::new(),
                transports: HashMap::new(),
            }),
        }
    }

    /// §4.1. Parses every address first so a parse failure leaves the registry untouched.
    pub async fn set(
        &self,
        net_id: i32,
        mark: u32,
        servers: &[String],
        name: &str,
        ca_cert: Option<String>,
    ) -> Result<Vec<PendingValidation>, InvalidInput> {
        let parsed = parse_servers(servers)?;

        let mode = mode_for(name, parsed.len());

        let mut state = self.state.lock().await;

        if mode == PrivateDnsMode::Off {
            state.modes.remove(&net_id);
            state.transports.remove(&net_id);
            return Ok(Vec::new());
        }

        let tls = TlsParameters {
            provider_name: name.to_string(),
            ca_certificate_pem: ca_cert,
        };

        let desired: Vec<EndpointIdentity> = parsed
            .into_iter()
            .map(|addr| EndpointIdentity::new(addr, name))
            .collect();

        state.modes.insert(net_id, mode);
        let tracker = state.transports.entry(net_id).or_default();

        for identity in &desired {
            if !tracker.contains_key(identity) {
                tracker.insert(
                    identity.clone(),
                    EndpointRecord::new(identity.clone(), mark, tls.clone()),
                );
            }
        }

        for (identity, record) in tracker.iter_mut() {
            let is_desired = desired.contains(identity);
            if !is_desired && record.active {
                record.deactivate();
            } else {
                record.active = is_desired;
            }
        }

        let mut pending = Vec::new();
        for record in tracker.values_mut() {
            if record.needs_validation() {
                record.validation_state = ValidationState::InProcess;
                pending.push(PendingValidation {
                    net_id,
                    identity: record.identity.clone(),
                    snapshot: record.clone(),
                    is_revalidation: false,
                });
            }
        }

        Ok(pending)
    }

    /// §4.2.
    pub async fn clear(&self, net_id: i32) {
        let mut state = self.state.lock().await;
        state.modes.remove(&net_id);
        state.transports.remove(&net_id);
    }

    /// §4.2. A missing `netId` yields `(Off, {})`.
    pub async fn get_status(&self, net_id: i32) -> (PrivateDnsMode, Vec<(EndpointIdentity, ValidationState)>) {
        let state = self.state.lock().await;
        let mode = state.modes.get(&net_id).copied().unwrap_or(PrivateDnsMode::Off);
        let statuses = state
            .transports
            .get(&net_id)
            .map(|tracker| {
                tracker
                    .values()
                    .filter(|r| r.active && r.kind.is_dot())
                    .map(|r| (r.identity.clone(), r.validation_state))
                    .collect()
            })
            .unwrap_or_default();
        (mode, statuses)
    }

    /// §4.4.1. Each rejection reason is a distinct [`RevalidationRejection`] variant.
    pub async fn request_validation(
        &self,
        net_id: i32,
        identity: &EndpointIdentity,
        mark: u32,
    ) -> Result<PendingValidation, PreconditionFailed> {
        let mut state = self.state.lock().await;

        let mode = state
            .modes
            .get(&net_id)
            .copied()
            .ok_or(RevalidationRejection::UnknownNetwork(net_id))?;
        if mode != PrivateDnsMode::Opportunistic {
            return Err(RevalidationRejection::NotOpportunistic(net_id).into());
        }

        let tracker = state
            .transports
            .get_mut(&net_id)
            .ok_or(RevalidationRejection::UnknownNetwork(net_id))?;
        let record = tracker
            .get_mut(identity)
            .ok_or_else(|| RevalidationRejection::EndpointNotConfigured(identity.clone(), net_id))?;

        if !record.active {
            return Err(RevalidationRejection::EndpointInactive(identity.clone(), net_id).into());
        }
        if record.validation_state != ValidationState::Success {
            return Err(RevalidationRejection::NotCurrentlyValidated(identity.clone(), net_id).into());
        }
        if record.mark != mark {
            return Err(RevalidationRejection::MarkMismatch(identity.clone(), net_id).into());
        }

        record.validation_state = ValidationState::InProcess;
        Ok(PendingValidation {
            net_id,
            identity: identity.clone(),
            snapshot: record.clone(),
            is_revalidation: true,
        })
    }

    /// §4.4 Step D, holding the registry lock. Resolves the decision table against the
    /// current registry state and commits the resulting transition (or leaves the record
    /// absent/inactive alone beyond reporting `Fail`).
    pub(crate) async fn commit(
        &self,
        net_id: i32,
        identity: &EndpointIdentity,
        outcome: ProbeOutcome,
    ) -> CommitOutcome {
        let mut state = self.state.lock().await;

        let (mode, record) = match resolve_mut(&mut state, net_id, identity) {
            Ok(pair) => pair,
            Err(NotFound) => {
                return CommitOutcome {
                    new_state: ValidationState::Fail,
                    needs_reeval: false,
                    succeeded_quickly: false,
                }
            }
        };

        if !record.active {
            record.validation_state = ValidationState::Fail;
            return CommitOutcome {
                new_state: ValidationState::Fail,
                needs_reeval: false,
                succeeded_quickly: false,
            };
        }

        let decision = classify(mode, outcome);
        record.validation_state = decision.new_state;
        decision
    }

    /// §4.4 Step F: writes the driver's final latency threshold back to the record, for
    /// DoT endpoints, regardless of how the loop terminated.
    pub(crate) async fn finalize_latency_threshold(
        &self,
        net_id: i32,
        identity: &EndpointIdentity,
        latency_threshold: Option<i64>,
    ) {
        let mut state = self.state.lock().await;
        if let Some(tracker) = state.transports.get_mut(&net_id) {
            if let Some(record) = tracker.get_mut(identity) {
                if record.kind.is_dot() {
                    record.latency_threshold = latency_threshold;
                }
            }
        }
    }
}

/// Resolves a commit target by `(net_id, identity)`, collapsing "no mode", "no transport
/// map", and "no record" into the single internal [`NotFound`] signal `commit` treats
/// uniformly as a settle-to-`Fail`. Never surfaced past `commit`.
fn resolve_mut<'a>(
    state: &'a mut RegistryState,
    net_id: i32,
    identity: &EndpointIdentity,
) -> Result<(PrivateDnsMode, &'a mut EndpointRecord), NotFound> {
    let mode = state.modes.get(&net_id).copied().ok_or(NotFound)?;
    let tracker = state.transports.get_mut(&net_id).ok_or(NotFound)?;
    let record = tracker.get_mut(identity).ok_or(NotFound)?;
    Ok((mode, record))
}

/// §4.4 Step D decision table.
fn classify(mode: PrivateDnsMode, outcome: ProbeOutcome) -> CommitOutcome {
    if outcome.got_answer && !outcome.latency_too_high {
        return CommitOutcome {
            new_state: ValidationState::Success,
            needs_reeval: false,
            succeeded_quickly: true,
        };
    }
    if outcome.max_attempts_reached {
        return CommitOutcome {
            new_state: ValidationState::Fail,
            needs_reeval: false,
            succeeded_quickly: false,
        };
    }
    if outcome.got_answer && outcome.latency_too_high {
        return CommitOutcome {
            new_state: ValidationState::InProcess,
            needs_reeval: true,
            succeeded_quickly: false,
        };
    }
    // From here: !got_answer.
    if mode == PrivateDnsMode::Off {
        return CommitOutcome {
            new_state: ValidationState::Fail,
            needs_reeval: false,
            succeeded_quickly: false,
        };
    }
    if mode == PrivateDnsMode::Opportunistic && !outcome.is_revalidation {
        return CommitOutcome {
            new_state: ValidationState::Fail,
            needs_reeval: false,
            succeeded_quickly: false,
        };
    }
    CommitOutcome {
        new_state: ValidationState::InProcess,
        needs_reeval: true,
        succeeded_quickly: false,
    }
}

/// §4.1 mode-selection table.
fn mode_for(name: &str, server_count: usize) -> PrivateDnsMode {
    if !name.is_empty() {
        PrivateDnsMode::Strict
    } else if server_count >= 1 {
        PrivateDnsMode::Opportunistic
    } else {
        PrivateDnsMode::Off
    }
}

/// Parses each address as a numeric host; service is always [`DOT_PORT`]. Any failure
/// fails the whole call -- no partial update.
fn parse_servers(servers: &[String]) -> Result<Vec<SocketAddr>, InvalidInput> {
    servers
        .iter()
        .map(|s| {
            IpAddr::from_str(s)
                .map(|ip| SocketAddr::new(ip, DOT_PORT))
                .map_err(|_| InvalidInput::UnparsableAddress(s.clone()))
        })
        .collect()
}
