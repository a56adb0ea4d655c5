//! Actuator manager that only logs what it would do.
//!
//! This exists so the pipeline can run (and be demonstrated) without any
//! hardware attached.

use crate::actuator::{check_kind, ActuationCommand, ActuationParams, ActuatorError, ActuatorManager};
use std::sync::Mutex;

pub struct DryRunActuators {
    actuator_ids: Vec<String>,
    history: Mutex<Vec<ActuationCommand>>,
}

impl DryRunActuators {
    pub fn new(actuator_ids: Vec<String>) -> Self {
        Self {
            actuator_ids,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Commands accepted so far, oldest first.
    pub fn history(&self) -> Vec<ActuationCommand> {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ActuatorManager for DryRunActuators {
    fn actuator_ids(&self) -> Vec<String> {
        self.actuator_ids.clone()
    }

    fn trigger(&self, actuator_id: &str, params: &ActuationParams) -> Result<(), ActuatorError> {
        if !self.actuator_ids.iter().any(|id| id == actuator_id) {
            return Err(ActuatorError::UnknownActuator(actuator_id.to_string()));
        }
        check_kind(actuator_id, params)?;

        tracing::info!(actuator = %actuator_id, params = %serde_json::Value::Object(params.to_map()), "[dry-run] trigger");
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ActuationCommand {
                actuator_id: actuator_id.to_string(),
                params: params.clone(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_records_accepted_commands() {
        let actuators = DryRunActuators::new(vec!["meta_AA".to_string()]);
        let params = ActuationParams::Haptic {
            duty: 30,
            duration: 600,
        };

        actuators.trigger("meta_AA", &params).unwrap();
        assert!(actuators.trigger("meta_BB", &params).is_err());

        let history = actuators.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].actuator_id, "meta_AA");
    }
}
