//! Wires the pipeline stages together.
//!
//! ```text
//! listeners ─▶ Synchronizer ─▶ WindowFramer ─▶ ClassificationGateway
//!                                                     │ publish
//!                                                     ▼
//!              ActuatorManager ◀─ EventDispatcher ◀─ EventChannel
//! ```
//!
//! Everything upstream of the channel runs on the listener threads that call
//! [`Synchronizer::update`]; the dispatcher has a thread of its own.

use crate::actuator::{ActuatorManager, AudioLibrary};
use crate::clock::{MonotonicClock, SharedClock};
use crate::config::Config;
use crate::core::{
    ActivationPolicy, ClassificationEvent, ClassificationGateway, Classifier, DispatcherHandle,
    EventChannel, EventDispatcher, FeatureExtractor, Synchronizer, WindowFramer,
};
use crate::transparency::SharedTransparencyLog;
use std::sync::Arc;
use std::time::Duration;

pub struct Pipeline {
    synchronizer: Arc<Synchronizer>,
    framer: Arc<WindowFramer>,
    gateway: Arc<ClassificationGateway>,
    channel: EventChannel<ClassificationEvent>,
    dispatcher: Option<EventDispatcher>,
    handle: Option<DispatcherHandle>,
    poll_timeout: Duration,
    log: SharedTransparencyLog,
    clock: SharedClock,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        extractor: Box<dyn FeatureExtractor>,
        classifier: Arc<dyn Classifier>,
        actuators: Arc<dyn ActuatorManager>,
        log: SharedTransparencyLog,
    ) -> Self {
        Self::with_clock(config, extractor, classifier, actuators, log, MonotonicClock::shared())
    }

    /// Build the pipeline on an explicit time source.
    pub fn with_clock(
        config: &Config,
        extractor: Box<dyn FeatureExtractor>,
        classifier: Arc<dyn Classifier>,
        actuators: Arc<dyn ActuatorManager>,
        log: SharedTransparencyLog,
        clock: SharedClock,
    ) -> Self {
        let channel = EventChannel::new(config.event_queue_size);

        let gateway = Arc::new(ClassificationGateway::new(
            classifier,
            channel.clone(),
            log.clone(),
        ));
        let framer = Arc::new(WindowFramer::new(
            &config.buffer,
            extractor,
            gateway.clone(),
            log.clone(),
        ));
        let synchronizer = Arc::new(Synchronizer::new(
            &config.devices,
            &config.sync,
            framer.clone(),
            clock.clone(),
            log.clone(),
        ));

        let audio = Arc::new(AudioLibrary::resolve(&config.audio.base_path));
        let policy = ActivationPolicy::from_entropy(
            actuators.actuator_ids(),
            config.policy.attempts,
            audio,
            config.language,
        );
        let dispatcher = EventDispatcher::new(
            policy,
            actuators,
            config.dispatcher.cooldown,
            clock.clone(),
            log.clone(),
        );

        Self {
            synchronizer,
            framer,
            gateway,
            channel,
            dispatcher: Some(dispatcher),
            handle: None,
            poll_timeout: config.dispatcher.poll_timeout,
            log,
            clock,
        }
    }

    /// Entry point for the wrist listeners.
    pub fn synchronizer(&self) -> Arc<Synchronizer> {
        self.synchronizer.clone()
    }

    /// Clock for stamping sample arrivals.
    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    pub fn framer(&self) -> Arc<WindowFramer> {
        self.framer.clone()
    }

    pub fn gateway(&self) -> Arc<ClassificationGateway> {
        self.gateway.clone()
    }

    pub fn channel(&self) -> &EventChannel<ClassificationEvent> {
        &self.channel
    }

    pub fn log(&self) -> &SharedTransparencyLog {
        &self.log
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(DispatcherHandle::is_running)
    }

    /// Start the dispatcher thread. Calling it again has no effect.
    pub fn start(&mut self) {
        if let Some(dispatcher) = self.dispatcher.take() {
            tracing::info!(
                queue = self.channel.capacity(),
                poll_ms = self.poll_timeout.as_millis() as u64,
                "Starting pipeline"
            );
            self.handle = Some(dispatcher.spawn(self.channel.clone(), self.poll_timeout));
        }
    }

    /// Stop the dispatcher and wait for it to exit.
    pub fn shutdown(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.stop();
            tracing::info!(
                evicted = self.channel.total_evictions(),
                "Pipeline stopped"
            );
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
