use std::sync::Arc;
use std::time::Instant;

use crate::audit::AuditLog;
use crate::backoff::BackoffPolicy;
use crate::config::{
    FlagStore, FLAG_AVOID_BAD_PRIVATE_DNS, FLAG_MAX_LATENCY_THRESHOLD_MS,
    FLAG_MIN_LATENCY_THRESHOLD_MS, K_MAX_OPPORTUNISTIC_ATTEMPTS,
};
use crate::events::EventReporter;
use crate::registry::{PendingValidation, ProbeOutcome, Registry};
use crate::transport::{Do53LatencyOracle, ProbeTransport};

/// Builds a fresh [`BackoffPolicy`] for each driver run. Production code uses
/// [`BackoffPolicy::builder`]'s defaults; tests inject a fast policy instead of waiting on
/// production-scale delays (see `PrivateDnsEngine::with_backoff_factory`).
pub type BackoffFactory = Arc<dyn Fn() -> BackoffPolicy + Send + Sync>;

/// Collaborators a validation driver needs. Bundled so `PrivateDnsEngine` can hand every
/// spawned task a single cheaply-`Clone`able context instead of five separate `Arc`s.
#[derive(Clone)]
pub(crate) struct DriverContext {
    pub registry: Arc<Registry>,
    pub reporter: Arc<EventReporter>,
    pub audit: Arc<AuditLog>,
    pub transport: Arc<dyn ProbeTransport>,
    pub do53_oracle: Arc<dyn Do53LatencyOracle>,
    pub flags: Arc<dyn FlagStore>,
    pub backoff_factory: BackoffFactory,
}

/// Runs the full validation state machine for one endpoint (§4.4). Intended to be driven
/// by a detached `tokio::spawn`. Holds no registry lock while probing, sleeping, or
/// dispatching events (§5).
pub(crate) async fn run(ctx: DriverContext, pending: PendingValidation) {
    let PendingValidation {
        net_id,
        identity,
        snapshot,
        is_revalidation,
    } = pending;

    let gate_on = ctx.flags.get_int(FLAG_AVOID_BAD_PRIVATE_DNS, 0) != 0;
    let is_opportunistic = identity.is_opportunistic();

    let mut backoff = (ctx.backoff_factory)();
    let mut latency_threshold: Option<i64> = None;
    let mut attempt: u32 = 1;

    loop {
        // Step A.
        latency_threshold = if gate_on && is_opportunistic {
            Some(compute_latency_threshold(ctx.as_ref(), net_id).await)
        } else {
            None
        };

        // Step B.
        let start = Instant::now();
        let got_answer = ctx
            .transport
            .probe(identity.clone(), snapshot.tls.clone(), snapshot.mark)
            .await;
        let took_ms = start.elapsed().as_millis() as i64;

        // Step C.
        let latency_too_high = took_ms > latency_threshold.unwrap_or(i64::MAX);
        let max_attempts_reached =
            gate_on && is_opportunistic && attempt >= K_MAX_OPPORTUNISTIC_ATTEMPTS;

        // Step D.
        let outcome = ctx
            .registry
            .commit(
                net_id,
                &identity,
                ProbeOutcome {
                    got_answer,
                    latency_too_high,
                    max_attempts_reached,
                    is_revalidation,
                },
            )
            .await;

        tracing::debug!(
            net_id,
            identity = ?identity,
            attempt,
            got_answer,
            latency_too_high,
            new_state = outcome.new_state.name(),
            "private dns validation attempt committed"
        );

        ctx.reporter
            .notify_state_update(identity.sockaddr(), outcome.new_state, net_id);
        ctx.reporter
            .notify(&identity, net_id, outcome.succeeded_quickly);
        ctx.audit.append(net_id, identity.clone(), outcome.new_state);

        // Step E.
        if !outcome.needs_reeval {
            break;
        }
        if !backoff.has_next() {
            break;
        }
        let delay = backoff.next();
        tokio::time::sleep(delay).await;
        attempt += 1;
    }

    // Step F.
    ctx.registry
        .finalize_latency_threshold(net_id, &identity, latency_threshold)
        .await;
}

/// §4.4 Step A: `clamp(3 * do53_us / 1000, min_ms, max_ms)`, falling back to `min_ms` when
/// no Do53 sample is available.
async fn compute_latency_threshold(ctx: &DriverContext, net_id: i32) -> i64 {
    let min_ms = ctx.flags.get_int(FLAG_MIN_LATENCY_THRESHOLD_MS, 200);
    let max_ms = ctx.flags.get_int(FLAG_MAX_LATENCY_THRESHOLD_MS, 2000);

    let do53_us = ctx
        .do53_oracle
        .average(net_id)
        .await
        .map(|d| d.as_micros() as i64);

    let target = do53_us.map(|us| 3 * us / 1000).unwrap_or(min_ms);
    target.clamp(min_ms, max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FakeClock;
    use crate::config::EngineConfig;
    use crate::record::ValidationState;
    use crate::transport::{MockDo53LatencyOracle, MockProbeTransport};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    fn make_context(
        transport: MockProbeTransport,
        oracle: MockDo53LatencyOracle,
        flags: EngineConfig,
    ) -> DriverContext {
        DriverContext {
            registry: Arc::new(Registry::new()),
            reporter: Arc::new(EventReporter::new()),
            audit: Arc::new(AuditLog::new(Arc::new(FakeClock::new()), 100)),
            transport: Arc::new(transport),
            do53_oracle: Arc::new(oracle),
            flags: Arc::new(flags),
            backoff_factory: Arc::new(|| {
                BackoffPolicy::builder()
                    .with_initial_delay(std::time::Duration::from_millis(1))
                    .with_max_attempts(3)
                    .build()
            }),
        }
    }

    struct SuccessCounter(Arc<AtomicUsize>);
    impl crate::events::ClassicSubscriber for SuccessCounter {
        fn on_validation(
            &self,
            _identity: &crate::identity::EndpointIdentity,
            _net_id: i32,
            success: bool,
        ) {
            if success {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn s1_fast_success_settles_without_retry() {
        let mut transport = MockProbeTransport::new();
        transport.expect_probe().times(1).returning(|_, _, _| true);
        let oracle = MockDo53LatencyOracle::new();

        let ctx = make_context(transport, oracle, EngineConfig::default());
        let pending = ctx
            .registry
            .set(10, 1, &["1.1.1.1".to_string()], "", None)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        let successes = Arc::new(AtomicUsize::new(0));
        ctx.reporter
            .add_classic_subscriber(Arc::new(SuccessCounter(successes.clone())));

        run(ctx.clone(), pending.into_iter().next().unwrap()).await;

        let (_, statuses) = ctx.registry.get_status(10).await;
        assert_eq!(statuses[0].1, ValidationState::Success);
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert!(logs_contain("private dns validation attempt committed"));
    }

    #[tokio::test(start_paused = true)]
    async fn s3_permanent_failure_retries_then_fails() {
        let mut transport = MockProbeTransport::new();
        transport.expect_probe().returning(|_, _, _| false);
        let oracle = MockDo53LatencyOracle::new();

        let ctx = make_context(transport, oracle, EngineConfig::default());
        let pending = ctx
            .registry
            .set(11, 2, &["2.2.2.2".to_string()], "dns.example", None)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        run(ctx.clone(), pending.into_iter().next().unwrap()).await;

        let (_, statuses) = ctx.registry.get_status(11).await;
        assert_eq!(statuses[0].1, ValidationState::Fail);
    }

    #[tokio::test]
    async fn s4_record_disappears_mid_probe_commits_fail_without_crash() {
        let mut transport = MockProbeTransport::new();
        transport.expect_probe().times(1).returning(|_, _, _| true);
        let oracle = MockDo53LatencyOracle::new();

        let ctx = make_context(transport, oracle, EngineConfig::default());
        let pending = ctx
            .registry
            .set(12, 1, &["3.3.3.3".to_string()], "", None)
            .await
            .unwrap();
        let only = pending.into_iter().next().unwrap();

        ctx.registry.clear(12).await;

        let successes = Arc::new(AtomicUsize::new(0));
        ctx.reporter
            .add_classic_subscriber(Arc::new(SuccessCounter(successes.clone())));

        run(ctx.clone(), only).await;

        let (mode, statuses) = ctx.registry.get_status(12).await;
        assert_eq!(mode, crate::record::PrivateDnsMode::Off);
        assert!(statuses.is_empty());
        assert_eq!(successes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn opportunistic_gate_computes_threshold_from_do53_average() {
        use std::time::Duration;

        let mut transport = MockProbeTransport::new();
        transport.expect_probe().times(1).returning(|_, _, _| true);
        let mut oracle = MockDo53LatencyOracle::new();
        oracle
            .expect_average()
            .returning(|_| Some(Duration::from_millis(500)));

        let flags = EngineConfig {
            avoid_bad_private_dns: true,
            ..EngineConfig::default()
        };
        let ctx = make_context(transport, oracle, flags);
        let pending = ctx
            .registry
            .set(13, 1, &["4.4.4.4".to_string()], "", None)
            .await
            .unwrap();

        run(ctx.clone(), pending.into_iter().next().unwrap()).await;

        let (_, statuses) = ctx.registry.get_status(13).await;
        assert_eq!(statuses[0].1, ValidationState::Success);
    }
}
