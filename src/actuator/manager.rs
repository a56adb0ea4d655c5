//! Actuator manager backed by one device session per actuator.

use crate::actuator::{check_kind, ActuationParams, ActuatorError, ActuatorKind, ActuatorManager};
use crate::config::RetryConfig;
use crate::device::{DeviceDriver, DeviceError, DeviceScanner, DeviceSession, ScanGuard, StatusUpdate};
use crossbeam_channel::Sender;
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;

/// Registry of running actuator sessions, keyed by actuator id.
pub struct SessionActuatorManager {
    sessions: RwLock<BTreeMap<String, DeviceSession>>,
    guard: ScanGuard,
    retry: RetryConfig,
    status: Sender<StatusUpdate>,
}

impl SessionActuatorManager {
    pub fn new(retry: RetryConfig, guard: ScanGuard, status: Sender<StatusUpdate>) -> Self {
        tracing::info!("Actuator manager initialized");
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            guard,
            retry,
            status,
        }
    }

    /// Start a session for a device and register it. Returns the actuator id.
    ///
    /// Registering an id twice replaces (and stops) the earlier session.
    pub fn register<D: DeviceDriver>(&self, kind: ActuatorKind, address: &str, driver: D) -> String {
        let actuator_id = kind.actuator_id(address);
        let session = DeviceSession::spawn(
            actuator_id.clone(),
            driver,
            self.retry.clone(),
            self.guard.clone(),
            self.status.clone(),
        );

        let previous = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(actuator_id.clone(), session);
        // Dropping the old handle joins its worker; keep that outside the lock.
        drop(previous);

        tracing::info!(actuator = %actuator_id, "Actuator registered");
        actuator_id
    }

    /// Scan for devices of one kind and register a session for each address.
    pub fn scan_and_register<D, F>(
        &self,
        kind: ActuatorKind,
        scanner: &dyn DeviceScanner,
        timeout: Duration,
        mut make_driver: F,
    ) -> Result<Vec<String>, DeviceError>
    where
        D: DeviceDriver,
        F: FnMut(&str) -> D,
    {
        let addresses = self.guard.scan(scanner, timeout)?;
        if addresses.is_empty() {
            tracing::warn!(kind = %kind, "No devices found");
        }

        Ok(addresses
            .iter()
            .map(|address| self.register(kind, address, make_driver(address)))
            .collect())
    }

    /// Stop and forget one actuator.
    pub fn remove(&self, actuator_id: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(actuator_id);
        match removed {
            Some(mut session) => {
                session.stop();
                tracing::info!(actuator = %actuator_id, "Actuator stopped");
                true
            }
            None => false,
        }
    }

    /// Stop every session and clear the registry.
    pub fn stop_all(&self) {
        tracing::info!("Stopping all actuator sessions...");
        let sessions = std::mem::take(&mut *self.sessions.write().unwrap_or_else(|e| e.into_inner()));
        for (actuator_id, mut session) in sessions {
            session.stop();
            tracing::info!(actuator = %actuator_id, "Actuator stopped");
        }
    }

    pub fn is_connected(&self, actuator_id: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(actuator_id)
            .map(DeviceSession::is_connected)
            .unwrap_or(false)
    }
}

impl ActuatorManager for SessionActuatorManager {
    fn actuator_ids(&self) -> Vec<String> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    fn trigger(&self, actuator_id: &str, params: &ActuationParams) -> Result<(), ActuatorError> {
        check_kind(actuator_id, params)?;

        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        let session = sessions
            .get(actuator_id)
            .ok_or_else(|| ActuatorError::UnknownActuator(actuator_id.to_string()))?;

        session.send(params.clone())?;
        tracing::debug!(actuator = %actuator_id, ?params, "Actuation queued");
        Ok(())
    }
}

impl Drop for SessionActuatorManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    struct AlwaysUp;

    impl DeviceDriver for AlwaysUp {
        fn connect(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }

        fn execute(&mut self, _params: &ActuationParams) -> Result<(), DeviceError> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    struct TwoStrips;

    impl DeviceScanner for TwoStrips {
        fn scan_addresses(&self, _timeout: Duration) -> Result<Vec<String>, DeviceError> {
            Ok(vec!["192.168.1.40".into(), "192.168.1.41".into()])
        }
    }

    fn manager() -> SessionActuatorManager {
        let (status_tx, _status_rx) = unbounded();
        SessionActuatorManager::new(RetryConfig::default(), ScanGuard::new(), status_tx)
    }

    #[test]
    fn test_scan_registers_every_address() {
        let manager = manager();
        let ids = manager
            .scan_and_register(ActuatorKind::Light, &TwoStrips, Duration::from_millis(1), |_| AlwaysUp)
            .unwrap();

        assert_eq!(ids, vec!["led_192.168.1.40", "led_192.168.1.41"]);
        assert_eq!(manager.actuator_ids(), ids);
        manager.stop_all();
        assert!(manager.actuator_ids().is_empty());
    }

    #[test]
    fn test_trigger_routes_and_validates() {
        let manager = manager();
        let id = manager.register(ActuatorKind::Haptic, "AA:BB", AlwaysUp);

        let haptic = ActuationParams::Haptic {
            duty: 40,
            duration: 500,
        };
        assert!(manager.trigger(&id, &haptic).is_ok());
        assert!(matches!(
            manager.trigger("meta_CC:DD", &haptic),
            Err(ActuatorError::UnknownActuator(_))
        ));
        assert!(matches!(
            manager.trigger(
                &id,
                &ActuationParams::Audio {
                    file: "x.mp3".into()
                }
            ),
            Err(ActuatorError::KindMismatch { .. })
        ));

        assert!(manager.remove(&id));
        assert!(!manager.remove(&id));
    }
}
