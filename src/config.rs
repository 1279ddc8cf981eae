/// In-process stand-in for the flag store the original system reads from. Not a file
/// format or a loader (that stays out of scope) — just the typed knob surface every
/// module in this crate reads, with the same defaults the spec calls out.
pub trait FlagStore: Send + Sync {
    fn get_int(&self, name: &str, default: i64) -> i64;
}

pub const FLAG_AVOID_BAD_PRIVATE_DNS: &str = "avoid_bad_private_dns";
pub const FLAG_MIN_LATENCY_THRESHOLD_MS: &str = "min_private_dns_latency_threshold_ms";
pub const FLAG_MAX_LATENCY_THRESHOLD_MS: &str = "max_private_dns_latency_threshold_ms";

/// Opportunistic endpoints stop retrying after this many attempts when the latency gate
/// is enabled (§4.4 Step C).
pub const K_MAX_OPPORTUNISTIC_ATTEMPTS: u32 = 5;

/// Concrete, statically-valued [`FlagStore`] for hosts with no dynamic flag system.
/// Mirrors the teacher crate's separation between "config values" and "config loading":
/// this struct is the values half only.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub avoid_bad_private_dns: bool,
    pub min_private_dns_latency_threshold_ms: i64,
    pub max_private_dns_latency_threshold_ms: i64,
    /// Audit log capacity; not part of the original flag store but a natural extension of
    /// the same "engine-wide tunable" surface.
    pub audit_log_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            avoid_bad_private_dns: false,
            min_private_dns_latency_threshold_ms: 200,
            max_private_dns_latency_threshold_ms: 2000,
            audit_log_capacity: 100,
        }
    }
}

impl FlagStore for EngineConfig {
    fn get_int(&self, name: &str, default: i64) -> i64 {
        match name {
            FLAG_AVOID_BAD_PRIVATE_DNS => i64::from(self.avoid_bad_private_dns),
            FLAG_MIN_LATENCY_THRESHOLD_MS => self.min_private_dns_latency_threshold_ms,
            FLAG_MAX_LATENCY_THRESHOLD_MS => self.max_private_dns_latency_threshold_ms,
            _ => default,
        }
    }
}
