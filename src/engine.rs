use std::sync::Arc;

use crate::audit::AuditLog;
use crate::backoff::BackoffPolicy;
use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, FlagStore};
use crate::driver::{self, BackoffFactory, DriverContext};
use crate::error::{InvalidInput, PreconditionFailed};
use crate::events::{ClassicSubscriber, EventReporter, Observer, UnsolicitedSubscriber};
use crate::identity::EndpointIdentity;
use crate::record::{PrivateDnsMode, ValidationState};
use crate::registry::Registry;
use crate::transport::{Do53LatencyOracle, ProbeTransport};

/// Ties the registry, event reporter, audit log, and collaborators together and exposes
/// the public API described in §4.1-§4.7: `set`, `clear`, `getStatus`, `requestValidation`,
/// `setObserver`, `dump`.
///
/// Cheap to `Clone` (it is a handle over `Arc`s), so a host can hand copies to multiple
/// call sites without wrapping it in its own `Arc`.
#[derive(Clone)]
pub struct PrivateDnsEngine {
    registry: Arc<Registry>,
    reporter: Arc<EventReporter>,
    audit: Arc<AuditLog>,
    transport: Arc<dyn ProbeTransport>,
    do53_oracle: Arc<dyn Do53LatencyOracle>,
    flags: Arc<dyn FlagStore>,
    backoff_factory: BackoffFactory,
}

fn default_backoff_factory() -> BackoffFactory {
    Arc::new(|| BackoffPolicy::builder().build())
}

impl PrivateDnsEngine {
    /// Builds an engine from its collaborators. `flags` is typically an [`EngineConfig`],
    /// but a host with a dynamic flag system can supply its own [`FlagStore`].
    pub fn new(
        transport: Arc<dyn ProbeTransport>,
        do53_oracle: Arc<dyn Do53LatencyOracle>,
        flags: Arc<dyn FlagStore>,
    ) -> Self {
        Self::with_clock(transport, do53_oracle, flags, Arc::new(SystemClock))
    }

    /// Same as [`Self::new`] but with an injectable wall-clock source, for deterministic
    /// audit-log tests.
    pub fn with_clock(
        transport: Arc<dyn ProbeTransport>,
        do53_oracle: Arc<dyn Do53LatencyOracle>,
        flags: Arc<dyn FlagStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let audit_capacity = 100;
        Self {
            registry: Arc::new(Registry::new()),
            reporter: Arc::new(EventReporter::new()),
            audit: Arc::new(AuditLog::new(clock, audit_capacity)),
            transport,
            do53_oracle,
            flags,
            backoff_factory: default_backoff_factory(),
        }
    }

    /// Convenience constructor that derives audit log capacity from [`EngineConfig`].
    pub fn from_config(
        transport: Arc<dyn ProbeTransport>,
        do53_oracle: Arc<dyn Do53LatencyOracle>,
        config: EngineConfig,
    ) -> Self {
        let audit = Arc::new(AuditLog::new(Arc::new(SystemClock), config.audit_log_capacity));
        Self {
            registry: Arc::new(Registry::new()),
            reporter: Arc::new(EventReporter::new()),
            audit,
            transport,
            do53_oracle,
            flags: Arc::new(config),
            backoff_factory: default_backoff_factory(),
        }
    }

    /// Overrides the per-driver backoff policy. Tests use this to replace the
    /// production-scale defaults (first delay ~60s) with a fast, bounded sequence rather
    /// than waiting on real retry timing (see §8 "Test tooling note").
    pub fn with_backoff_factory(mut self, factory: BackoffFactory) -> Self {
        self.backoff_factory = factory;
        self
    }

    fn driver_context(&self) -> DriverContext {
        DriverContext {
            registry: self.registry.clone(),
            reporter: self.reporter.clone(),
            audit: self.audit.clone(),
            transport: self.transport.clone(),
            do53_oracle: self.do53_oracle.clone(),
            flags: self.flags.clone(),
            backoff_factory: self.backoff_factory.clone(),
        }
    }

    /// §4.1. Spawns a detached validation driver for every endpoint that needs one and
    /// returns as soon as they are scheduled; it does not wait for any probe to finish.
    pub async fn set(
        &self,
        net_id: i32,
        mark: u32,
        servers: &[String],
        name: &str,
        ca_cert: Option<String>,
    ) -> Result<(), InvalidInput> {
        let pending = self.registry.set(net_id, mark, servers, name, ca_cert).await?;
        for validation in pending {
            tracing::info!(net_id, identity = ?validation.identity, "spawning private dns validation driver");
            tokio::spawn(driver::run(self.driver_context(), validation));
        }
        Ok(())
    }

    /// §4.2.
    pub async fn clear(&self, net_id: i32) {
        self.registry.clear(net_id).await;
    }

    /// §4.2.
    pub async fn get_status(&self, net_id: i32) -> (PrivateDnsMode, Vec<(EndpointIdentity, ValidationState)>) {
        self.registry.get_status(net_id).await
    }

    /// §4.4.1.
    pub async fn request_validation(
        &self,
        net_id: i32,
        identity: &EndpointIdentity,
        mark: u32,
    ) -> Result<(), PreconditionFailed> {
        let pending = self.registry.request_validation(net_id, identity, mark).await?;
        tracing::info!(net_id, identity = ?pending.identity, "spawning private dns revalidation driver");
        tokio::spawn(driver::run(self.driver_context(), pending));
        Ok(())
    }

    /// §4.5. Sets or clears the single in-process observer.
    pub fn set_observer(&self, observer: Option<Arc<dyn Observer>>) {
        self.reporter.set_observer(observer);
    }

    pub fn add_classic_subscriber(&self, subscriber: Arc<dyn ClassicSubscriber>) {
        self.reporter.add_classic_subscriber(subscriber);
    }

    pub fn add_unsolicited_subscriber(&self, subscriber: Arc<dyn UnsolicitedSubscriber>) {
        self.reporter.add_unsolicited_subscriber(subscriber);
    }

    /// §4.7 / §6: renders the audit log as `dump`-formatted lines.
    pub fn dump(&self) -> Vec<String> {
        self.audit.dump()
    }
}
