use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::identity::EndpointIdentity;
use crate::record::ValidationState;

/// Single in-process observer, set via `setObserver`. Mirrors the Android-style
/// `on_validation_state_update` callback the spec names directly.
pub trait Observer: Send + Sync {
    fn on_validation_state_update(&self, ip_address: &str, state: ValidationState, net_id: i32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILURE")]
    Failure,
}

impl From<bool> for ValidationOutcome {
    fn from(success: bool) -> Self {
        if success {
            ValidationOutcome::Success
        } else {
            ValidationOutcome::Failure
        }
    }
}

/// Payload delivered to unsolicited subscribers (§6). Serializable so a host can forward
/// it to an external sink verbatim without this crate knowing what that sink is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationEvent {
    #[serde(rename = "netId")]
    pub net_id: i32,
    pub ip_address: String,
    pub hostname: String,
    pub validation: ValidationOutcome,
}

/// A classic subscriber receives the same `(identity, net_id, success)` triple the
/// registry committed.
pub trait ClassicSubscriber: Send + Sync {
    fn on_validation(&self, identity: &EndpointIdentity, net_id: i32, success: bool);
}

/// An unsolicited subscriber receives the serializable [`ValidationEvent`] payload.
pub trait UnsolicitedSubscriber: Send + Sync {
    fn on_validation_event(&self, event: &ValidationEvent);
}

/// Fans validation events out to zero or more subscribers and to a single `Observer`.
/// Delivery is synchronous and a failing subscriber (one that panics) does not stop
/// delivery to the others -- each callback is invoked behind `catch_unwind`.
///
/// Subscriber registration is independent of the registry lock (§5): adding a subscriber
/// never requires locking the registry.
pub struct EventReporter {
    observer: Mutex<Option<Arc<dyn Observer>>>,
    classic_subscribers: Mutex<Vec<Arc<dyn ClassicSubscriber>>>,
    unsolicited_subscribers: Mutex<Vec<Arc<dyn UnsolicitedSubscriber>>>,
}

impl Default for EventReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventReporter {
    pub fn new() -> Self {
        Self {
            observer: Mutex::new(None),
            classic_subscribers: Mutex::new(Vec::new()),
            unsolicited_subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn set_observer(&self, observer: Option<Arc<dyn Observer>>) {
        *self.observer.lock().expect("observer mutex poisoned") = observer;
    }

    pub fn add_classic_subscriber(&self, subscriber: Arc<dyn ClassicSubscriber>) {
        self.classic_subscribers
            .lock()
            .expect("subscriber mutex poisoned")
            .push(subscriber);
    }

    pub fn add_unsolicited_subscriber(&self, subscriber: Arc<dyn UnsolicitedSubscriber>) {
        self.unsolicited_subscribers
            .lock()
            .expect("subscriber mutex poisoned")
            .push(subscriber);
    }

    /// §4.5 `notify`: fans a validation outcome out to both subscriber lists. Delivery
    /// order (observer state update is reported separately, see `notify_state_update`)
    /// is: classic subscribers, then unsolicited subscribers, in registration order.
    pub fn notify(&self, identity: &EndpointIdentity, net_id: i32, success: bool) {
        for subscriber in self
            .classic_subscribers
            .lock()
            .expect("subscriber mutex poisoned")
            .iter()
        {
            let subscriber = subscriber.clone();
            let identity = identity.clone();
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                subscriber.on_validation(&identity, net_id, success);
            }));
        }

        let event = ValidationEvent {
            net_id,
            ip_address: identity.sockaddr().ip().to_string(),
            hostname: identity.provider_hostname().to_string(),
            validation: ValidationOutcome::from(success),
        };
        for subscriber in self
            .unsolicited_subscribers
            .lock()
            .expect("subscriber mutex poisoned")
            .iter()
        {
            let subscriber = subscriber.clone();
            let event = event.clone();
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                subscriber.on_validation_event(&event);
            }));
        }
    }

    /// §4.5 `notify_state_update`: delivers to the single `Observer`, if one is set.
    pub fn notify_state_update(&self, sockaddr: SocketAddr, state: ValidationState, net_id: i32) {
        if let Some(observer) = self.observer.lock().expect("observer mutex poisoned").clone() {
            let ip = sockaddr.ip().to_string();
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                observer.on_validation_state_update(&ip, state, net_id);
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver(AtomicUsize);
    impl Observer for CountingObserver {
        fn on_validation_state_update(&self, _ip: &str, _state: ValidationState, _net_id: i32) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickingSubscriber;
    impl ClassicSubscriber for PanickingSubscriber {
        fn on_validation(&self, _identity: &EndpointIdentity, _net_id: i32, _success: bool) {
            panic!("boom");
        }
    }

    struct CountingClassicSubscriber(AtomicUsize);
    impl ClassicSubscriber for CountingClassicSubscriber {
        fn on_validation(&self, _identity: &EndpointIdentity, _net_id: i32, _success: bool) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn identity() -> EndpointIdentity {
        let addr: std::net::SocketAddr = "1.1.1.1:853".parse().unwrap();
        EndpointIdentity::new(addr, "dns.example")
    }

    #[test]
    fn notify_state_update_reaches_observer() {
        let reporter = EventReporter::new();
        let observer = Arc::new(CountingObserver(AtomicUsize::new(0)));
        reporter.set_observer(Some(observer.clone()));
        reporter.notify_state_update("1.1.1.1:853".parse().unwrap(), ValidationState::Success, 1);
        assert_eq!(observer.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let reporter = EventReporter::new();
        reporter.add_classic_subscriber(Arc::new(PanickingSubscriber));
        let counter = Arc::new(CountingClassicSubscriber(AtomicUsize::new(0)));
        reporter.add_classic_subscriber(counter.clone());

        reporter.notify(&identity(), 1, true);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsolicited_payload_matches_spec_shape() {
        struct Capture(Mutex<Option<ValidationEvent>>);
        impl UnsolicitedSubscriber for Capture {
            fn on_validation_event(&self, event: &ValidationEvent) {
                *self.0.lock().unwrap() = Some(event.clone());
            }
        }

        let reporter = EventReporter::new();
        let capture = Arc::new(Capture(Mutex::new(None)));
        reporter.add_unsolicited_subscriber(capture.clone());
        reporter.notify(&identity(), 9, false);

        let captured = capture.0.lock().unwrap().clone().unwrap();
        assert_eq!(captured.net_id, 9);
        assert_eq!(captured.ip_address, "1.1.1.1");
        assert_eq!(captured.hostname, "dns.example");
        assert_eq!(captured.validation, ValidationOutcome::Failure);
    }

    /// The wire shape (`netId`, not `net_id`; `"SUCCESS"`/`"FAILURE"`, not the Rust variant
    /// names) is part of the external contract a host forwards verbatim, so it is pinned
    /// against the serializer rather than the in-memory struct fields.
    #[test]
    fn validation_event_serializes_to_documented_wire_shape() {
        let event = ValidationEvent {
            net_id: 9,
            ip_address: "1.1.1.1".to_string(),
            hostname: "dns.example".to_string(),
            validation: ValidationOutcome::Success,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "netId": 9,
                "ip_address": "1.1.1.1",
                "hostname": "dns.example",
                "validation": "SUCCESS",
            })
        );

        let round_tripped: ValidationEvent = serde_json::from_value(json).unwrap();
        assert_eq!(round_tripped, event);
    }
}
