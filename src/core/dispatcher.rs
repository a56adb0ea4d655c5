//! Event dispatcher: decides *when* to ask the policy for an actuation.
//!
//! A change of tag fires immediately. A persisting active tag re-fires only
//! once the cooldown has elapsed since the last actuation. Gated events are
//! audited and otherwise ignored.

use crate::actuator::ActuatorManager;
use crate::clock::SharedClock;
use crate::core::channel::EventChannel;
use crate::core::policy::ActivationPolicy;
use crate::core::types::{ClassificationEvent, StereotipyTag};
use crate::transparency::{AuditActuation, AuditRecord, SharedTransparencyLog};
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// What the dispatcher did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Calibration pending; audited only
    Gated,
    Actuated { actuator_id: String },
    /// The policy had nothing to fire
    NoCommand,
    TriggerFailed { actuator_id: String, reason: String },
    /// Same active tag, cooldown not yet elapsed
    CoolingDown,
    /// Same inactive tag
    Idle,
}

pub struct EventDispatcher<R: Rng = StdRng> {
    policy: ActivationPolicy<R>,
    actuators: Arc<dyn ActuatorManager>,
    cooldown: f64,
    clock: SharedClock,
    log: SharedTransparencyLog,
    last_tag: Option<i32>,
    last_actuation: Option<f64>,
}

impl<R: Rng> EventDispatcher<R> {
    pub fn new(
        policy: ActivationPolicy<R>,
        actuators: Arc<dyn ActuatorManager>,
        cooldown: Duration,
        clock: SharedClock,
        log: SharedTransparencyLog,
    ) -> Self {
        Self {
            policy,
            actuators,
            cooldown: cooldown.as_secs_f64(),
            clock,
            log,
            last_tag: None,
            last_actuation: None,
        }
    }

    pub fn policy(&self) -> &ActivationPolicy<R> {
        &self.policy
    }

    pub fn last_tag(&self) -> Option<StereotipyTag> {
        self.last_tag.map(StereotipyTag::from_code)
    }

    /// Process one event. Never fails; actuator errors end up in the outcome.
    pub fn handle_event(&mut self, event: &ClassificationEvent) -> DispatchOutcome {
        let tag = event.stereotipy_tag();

        if event.gated {
            tracing::debug!(id = %event.id, tag = %tag, "Event gated during calibration");
            self.log.record_gated_event();
            self.audit(event, vec![AuditActuation::gated()]);
            return DispatchOutcome::Gated;
        }

        let (outcome, performed) = if self.last_tag != Some(tag.code()) {
            self.last_tag = Some(tag.code());
            self.actuate(tag)
        } else if tag.is_active() {
            let now = self.clock.now();
            let ready = self
                .last_actuation
                .map_or(true, |last| now - last >= self.cooldown);
            if ready {
                self.actuate(tag)
            } else {
                (DispatchOutcome::CoolingDown, Vec::new())
            }
        } else {
            (DispatchOutcome::Idle, Vec::new())
        };

        self.audit(event, performed);
        outcome
    }

    fn actuate(&mut self, tag: StereotipyTag) -> (DispatchOutcome, Vec<AuditActuation>) {
        let available = self.actuators.actuator_ids();
        if available.as_slice() != self.policy.actuators() {
            self.policy.set_actuators(available);
        }

        let Some(command) = self.policy.handle(tag) else {
            return (DispatchOutcome::NoCommand, Vec::new());
        };

        // The attempt counts for cooldown even if the device refuses it.
        self.last_actuation = Some(self.clock.now());

        match self.actuators.trigger(&command.actuator_id, &command.params) {
            Ok(()) => {
                tracing::info!(tag = %tag, actuator = %command.actuator_id, "Actuation triggered");
                self.log.record_actuation();
                let performed = vec![AuditActuation::performed(&command.actuator_id, &command.params)];
                (
                    DispatchOutcome::Actuated {
                        actuator_id: command.actuator_id,
                    },
                    performed,
                )
            }
            Err(e) => {
                tracing::error!(tag = %tag, actuator = %command.actuator_id, error = %e, "Actuation failed");
                self.log.record_actuation_failure();
                (
                    DispatchOutcome::TriggerFailed {
                        actuator_id: command.actuator_id,
                        reason: e.to_string(),
                    },
                    Vec::new(),
                )
            }
        }
    }

    fn audit(&self, event: &ClassificationEvent, actuations: Vec<AuditActuation>) {
        self.log.record_audit(AuditRecord::new(
            event.created_at,
            event.stereotipy_tag().label(),
            actuations,
            event.source.clone(),
        ));
    }
}

impl<R: Rng + Send + 'static> EventDispatcher<R> {
    /// Consume `channel` on a dedicated thread until stopped.
    pub fn spawn(
        mut self,
        channel: EventChannel<ClassificationEvent>,
        poll_timeout: Duration,
    ) -> DispatcherHandle {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = thread::spawn(move || {
            tracing::info!("Event dispatcher started");
            while flag.load(Ordering::SeqCst) {
                if let Some(event) = channel.recv_timeout(poll_timeout) {
                    let outcome = self.handle_event(&event);
                    tracing::debug!(id = %event.id, outcome = ?outcome, "Event dispatched");
                }
            }
            tracing::info!("Event dispatcher stopped");
        });

        DispatcherHandle {
            running,
            thread_handle: Some(handle),
        }
    }
}

/// Running dispatcher thread.
pub struct DispatcherHandle {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl DispatcherHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal the thread and wait for it; returns within one poll interval.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::error!("Event dispatcher thread panicked");
            }
        }
    }
}

impl Drop for DispatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{ActuationParams, ActuatorError, AudioLibrary, DryRunActuators, Language};
    use crate::clock::ManualClock;
    use crate::core::types::{FeatureVector, FEATURE_COUNT};
    use crate::device::DeviceError;
    use crate::transparency::create_shared_log;
    use pretty_assertions::assert_eq;
    use rand::rngs::mock::StepRng;

    fn event(tag: i32, gated: bool) -> ClassificationEvent {
        ClassificationEvent::new(
            FeatureVector::new(vec![0.0; FEATURE_COUNT]),
            0.0,
            gated,
            "dual_wrist",
            tag,
        )
    }

    fn dispatcher(
        actuators: Arc<dyn ActuatorManager>,
        clock: Arc<ManualClock>,
    ) -> EventDispatcher<StepRng> {
        let audio = std::env::temp_dir().join(format!("stopme-dispatch-{}", uuid::Uuid::new_v4()));
        let policy = ActivationPolicy::new(
            actuators.actuator_ids(),
            5,
            Arc::new(AudioLibrary::resolve(audio)),
            Language::Eng,
            StepRng::new(0, 0),
        );
        EventDispatcher::new(
            policy,
            actuators,
            Duration::from_secs(5),
            clock,
            create_shared_log(),
        )
    }

    #[test]
    fn test_cooldown_limits_repeats() {
        let clock = Arc::new(ManualClock::new(0.0));
        let actuators = Arc::new(DryRunActuators::new(vec!["meta_a".to_string()]));
        let mut dispatcher = dispatcher(actuators.clone(), clock.clone());

        let mut outcomes = Vec::new();
        for t in 0..=5 {
            clock.set(t as f64);
            outcomes.push(dispatcher.handle_event(&event(2, false)));
        }

        let actuated = |o: &DispatchOutcome| matches!(o, DispatchOutcome::Actuated { .. });
        assert!(actuated(&outcomes[0]));
        assert!(outcomes[1..5].iter().all(|o| *o == DispatchOutcome::CoolingDown));
        assert!(actuated(&outcomes[5]));

        let history = actuators.history();
        assert_eq!(history.len(), 2);
        // second firing uses the next variation
        assert_ne!(history[0].params, history[1].params);
    }

    #[test]
    fn test_tag_change_fires_immediately() {
        let clock = Arc::new(ManualClock::new(0.0));
        let actuators = Arc::new(DryRunActuators::new(vec!["meta_a".to_string()]));
        let mut dispatcher = dispatcher(actuators.clone(), clock.clone());

        assert!(matches!(dispatcher.handle_event(&event(1, false)), DispatchOutcome::Actuated { .. }));
        clock.set(0.5);
        assert_eq!(dispatcher.handle_event(&event(0, false)), DispatchOutcome::NoCommand);
        assert_eq!(dispatcher.handle_event(&event(0, false)), DispatchOutcome::Idle);
        clock.set(1.0);
        assert!(matches!(dispatcher.handle_event(&event(2, false)), DispatchOutcome::Actuated { .. }));
        assert_eq!(dispatcher.last_tag(), Some(StereotipyTag::Dangerous));
        assert_eq!(actuators.history().len(), 2);
    }

    #[test]
    fn test_gated_events_leave_state_untouched() {
        let clock = Arc::new(ManualClock::new(0.0));
        let actuators = Arc::new(DryRunActuators::new(vec!["meta_a".to_string()]));
        let mut dispatcher = dispatcher(actuators.clone(), clock);

        assert_eq!(dispatcher.handle_event(&event(2, true)), DispatchOutcome::Gated);
        assert_eq!(dispatcher.last_tag(), None);
        assert!(actuators.history().is_empty());

        assert!(matches!(dispatcher.handle_event(&event(2, false)), DispatchOutcome::Actuated { .. }));
    }

    #[test]
    fn test_unknown_tag_is_a_no_action_tag() {
        let clock = Arc::new(ManualClock::new(0.0));
        let actuators = Arc::new(DryRunActuators::new(vec!["meta_a".to_string()]));
        let mut dispatcher = dispatcher(actuators.clone(), clock);

        assert_eq!(dispatcher.handle_event(&event(42, false)), DispatchOutcome::NoCommand);
        assert_eq!(dispatcher.handle_event(&event(42, false)), DispatchOutcome::Idle);
        assert!(actuators.history().is_empty());
    }

    struct FailingActuators;

    impl ActuatorManager for FailingActuators {
        fn actuator_ids(&self) -> Vec<String> {
            vec!["meta_a".to_string()]
        }

        fn trigger(&self, _: &str, _: &ActuationParams) -> Result<(), ActuatorError> {
            Err(DeviceError::ConnectionLost("out of range".to_string()).into())
        }
    }

    #[test]
    fn test_trigger_failure_still_starts_cooldown() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut dispatcher = dispatcher(Arc::new(FailingActuators), clock.clone());

        assert!(matches!(
            dispatcher.handle_event(&event(1, false)),
            DispatchOutcome::TriggerFailed { .. }
        ));
        clock.set(1.0);
        assert_eq!(dispatcher.handle_event(&event(1, false)), DispatchOutcome::CoolingDown);
        assert_eq!(dispatcher.log.stats().actuation_failures, 1);
    }

    #[test]
    fn test_spawned_dispatcher_consumes_channel() {
        let actuators = Arc::new(DryRunActuators::new(vec!["meta_a".to_string()]));
        let dispatcher = dispatcher(actuators.clone(), Arc::new(ManualClock::new(0.0)));
        let channel = EventChannel::new(3);

        let mut handle = dispatcher.spawn(channel.clone(), Duration::from_millis(20));
        channel.publish("imu", event(1, false));

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while actuators.history().is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        handle.stop();
        assert!(!handle.is_running());
        assert_eq!(actuators.history().len(), 1);
    }
}
