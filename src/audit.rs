use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;

use crate::clock::Clock;
use crate::identity::EndpointIdentity;
use crate::record::ValidationState;

/// One audit-log line: a state transition observed for a given endpoint on a given
/// network.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub timestamp: SystemTime,
    pub net_id: i32,
    pub identity: EndpointIdentity,
    pub state: ValidationState,
}

/// Bounded FIFO of [`AuditRecord`]s. Has its own internal synchronization (a plain
/// `Mutex`, never held across an `.await`) independent of the registry lock, since its
/// operations never suspend.
pub struct AuditLog {
    clock: Arc<dyn Clock>,
    capacity: usize,
    records: Mutex<VecDeque<AuditRecord>>,
}

impl AuditLog {
    pub fn new(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            clock,
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Appends a record stamped with the current wall-clock time. Drops the oldest entry
    /// on overflow.
    pub fn append(&self, net_id: i32, identity: EndpointIdentity, state: ValidationState) {
        let record = AuditRecord {
            timestamp: self.clock.now(),
            net_id,
            identity,
            state,
        };
        let mut records = self.records.lock().expect("audit log mutex poisoned");
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Returns an atomic snapshot of the current contents, oldest first.
    pub fn copy(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .expect("audit log mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Renders the snapshot as `dump`-formatted lines: `<iso-timestamp> - netId=<n>
    /// PrivateDns={<sockaddr>/<provider>} state=<state-name>`.
    pub fn dump(&self) -> Vec<String> {
        self.copy()
            .into_iter()
            .map(|r| {
                let timestamp = humantime::format_rfc3339(r.timestamp).to_string();
                format!(
                    "{} - netId={} PrivateDns={{{}/{}}} state={}",
                    timestamp,
                    r.net_id,
                    r.identity.sockaddr(),
                    r.identity.provider_hostname(),
                    r.state.name(),
                )
            })
            .collect()
    }
}
