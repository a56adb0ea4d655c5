//! Activation policy: which actuator to fire and with what parameters.
//!
//! An *episode* is a run of the same active tag. Within an episode the policy
//! sticks to one actuator for `attempts` activations, cycling through that
//! actuator's presets, then rotates to a different actuator. When an episode
//! ends the actuator it finished on is remembered and preferred the next
//! time the same tag shows up. The policy never decides when to fire.

use crate::actuator::audio::{AudioClip, AudioLibrary, Language};
use crate::actuator::{ActuationCommand, ActuationParams, ActuatorKind, Rgbw};
use crate::core::types::{Severity, StereotipyTag};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

static MILD_LIGHT: [ActuationParams; 3] = [
    ActuationParams::Light {
        color: Rgbw(0, 0, 255, 0),
        intensity: 40,
        speed: 20,
    },
    ActuationParams::Light {
        color: Rgbw(0, 255, 0, 0),
        intensity: 40,
        speed: 20,
    },
    ActuationParams::Light {
        color: Rgbw(0, 0, 0, 255),
        intensity: 30,
        speed: 20,
    },
];

static STRONG_LIGHT: [ActuationParams; 3] = [
    ActuationParams::Light {
        color: Rgbw(255, 0, 0, 0),
        intensity: 100,
        speed: 80,
    },
    ActuationParams::Light {
        color: Rgbw(255, 165, 0, 0),
        intensity: 100,
        speed: 80,
    },
    // red strobe
    ActuationParams::Pattern {
        pattern: 0x30,
        speed: 90,
        intensity: 100,
    },
];

static MILD_HAPTIC: [ActuationParams; 3] = [
    ActuationParams::Haptic {
        duty: 30,
        duration: 500,
    },
    ActuationParams::Haptic {
        duty: 40,
        duration: 700,
    },
    ActuationParams::Haptic {
        duty: 50,
        duration: 500,
    },
];

static STRONG_HAPTIC: [ActuationParams; 3] = [
    ActuationParams::Haptic {
        duty: 80,
        duration: 1000,
    },
    ActuationParams::Haptic {
        duty: 100,
        duration: 800,
    },
    ActuationParams::Haptic {
        duty: 90,
        duration: 1200,
    },
];

/// Snapshot of the policy's episode bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyState {
    /// Tag code of the current episode
    pub current_tag: Option<i32>,
    pub current_actuator: Option<String>,
    /// Activations on the current actuator
    pub attempts: u32,
    /// Index into the current actuator's preset table
    pub variation: usize,
    /// Actuator each tag's last episode ended on
    pub memory: BTreeMap<i32, String>,
}

impl PolicyState {
    fn reset_episode(&mut self) {
        self.current_tag = None;
        self.current_actuator = None;
        self.reset_counters();
    }

    fn reset_counters(&mut self) {
        self.attempts = 0;
        self.variation = 0;
    }
}

pub struct ActivationPolicy<R: Rng = StdRng> {
    actuators: Vec<String>,
    max_attempts: u32,
    audio: Arc<AudioLibrary>,
    language: Language,
    rng: R,
    state: PolicyState,
}

impl ActivationPolicy<StdRng> {
    /// Policy drawing from an OS-seeded generator.
    pub fn from_entropy(
        actuators: Vec<String>,
        max_attempts: u32,
        audio: Arc<AudioLibrary>,
        language: Language,
    ) -> Self {
        Self::new(actuators, max_attempts, audio, language, StdRng::from_entropy())
    }
}

impl<R: Rng> ActivationPolicy<R> {
    pub fn new(
        actuators: Vec<String>,
        max_attempts: u32,
        audio: Arc<AudioLibrary>,
        language: Language,
        rng: R,
    ) -> Self {
        Self {
            actuators,
            max_attempts: max_attempts.max(1),
            audio,
            language,
            rng,
            state: PolicyState::default(),
        }
    }

    pub fn state(&self) -> &PolicyState {
        &self.state
    }

    pub fn actuators(&self) -> &[String] {
        &self.actuators
    }

    /// Replace the set of available actuators.
    pub fn set_actuators(&mut self, actuators: Vec<String>) {
        tracing::info!(count = actuators.len(), "Policy actuator set updated");
        self.actuators = actuators;
    }

    /// Decide the next actuation for `tag`, if any.
    pub fn handle(&mut self, tag: StereotipyTag) -> Option<ActuationCommand> {
        let Some(severity) = tag.severity() else {
            self.end_episode();
            return None;
        };

        if self.actuators.is_empty() {
            tracing::warn!(tag = %tag, "No actuators available");
            return None;
        }

        let code = tag.code();
        let current_available = self
            .state
            .current_actuator
            .as_ref()
            .is_some_and(|id| self.actuators.contains(id));

        if self.state.current_tag != Some(code) || !current_available {
            let preferred = self
                .state
                .memory
                .get(&code)
                .filter(|id| self.actuators.contains(id))
                .cloned();
            let actuator = match preferred {
                Some(id) => id,
                None => self.pick(None)?,
            };
            tracing::debug!(tag = %tag, actuator = %actuator, "Starting episode");
            self.state.current_tag = Some(code);
            self.state.current_actuator = Some(actuator);
            self.state.reset_counters();
        }

        if self.state.attempts >= self.max_attempts {
            let current = self.state.current_actuator.clone();
            let next = self.pick(current.as_deref())?;
            tracing::debug!(from = ?current, to = %next, "Rotating actuator");
            self.state.current_actuator = Some(next);
            self.state.reset_counters();
        }

        let mut actuator = self.state.current_actuator.clone()?;
        let params = match self.params_for(&actuator, severity) {
            Some(params) => params,
            None => {
                let retry = self.pick(Some(actuator.as_str()))?;
                tracing::warn!(actuator = %actuator, retry = %retry, "Cannot drive actuator, retrying with another");
                self.state.reset_counters();
                let params = self.params_for(&retry, severity)?;
                actuator = retry;
                self.state.current_actuator = Some(actuator.clone());
                params
            }
        };

        self.state.attempts += 1;
        self.state.variation += 1;

        Some(ActuationCommand {
            actuator_id: actuator,
            params,
        })
    }

    /// Remember the actuator an active episode finished on, then reset.
    fn end_episode(&mut self) {
        if let (Some(tag), Some(actuator)) =
            (self.state.current_tag, self.state.current_actuator.take())
        {
            tracing::debug!(tag, actuator = %actuator, "Episode ended");
            self.state.memory.insert(tag, actuator);
        }
        self.state.reset_episode();
    }

    /// Pick an actuator at random, avoiding `exclude` when there is a choice.
    fn pick(&mut self, exclude: Option<&str>) -> Option<String> {
        let candidates: Vec<&String> = match exclude {
            Some(ex) if self.actuators.len() > 1 => {
                self.actuators.iter().filter(|id| id.as_str() != ex).collect()
            }
            _ => self.actuators.iter().collect(),
        };
        candidates.choose(&mut self.rng).map(|id| (*id).clone())
    }

    fn params_for(&self, actuator_id: &str, severity: Severity) -> Option<ActuationParams> {
        let table = match (ActuatorKind::from_id(actuator_id)?, severity) {
            (ActuatorKind::Light, Severity::Mild) => &MILD_LIGHT,
            (ActuatorKind::Light, Severity::Strong) => &STRONG_LIGHT,
            (ActuatorKind::Haptic, Severity::Mild) => &MILD_HAPTIC,
            (ActuatorKind::Haptic, Severity::Strong) => &STRONG_HAPTIC,
            (ActuatorKind::Audio, _) => {
                let clip = AudioClip::for_severity(severity, self.language);
                return match self.audio.path(clip) {
                    Ok(path) => Some(ActuationParams::Audio {
                        file: path.to_path_buf(),
                    }),
                    Err(e) => {
                        tracing::warn!(error = %e, "No playable audio clip");
                        None
                    }
                };
            }
        };
        Some(table[self.state.variation % table.len()].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::mock::StepRng;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn empty_audio() -> Arc<AudioLibrary> {
        let dir = std::env::temp_dir().join(format!("stopme-policy-{}", uuid::Uuid::new_v4()));
        Arc::new(AudioLibrary::resolve(dir))
    }

    fn policy(actuators: &[&str], attempts: u32) -> ActivationPolicy<StepRng> {
        ActivationPolicy::new(
            ids(actuators),
            attempts,
            empty_audio(),
            Language::Eng,
            StepRng::new(0, 0),
        )
    }

    fn chosen(policy: &mut ActivationPolicy<StepRng>, tag: StereotipyTag) -> Option<String> {
        policy.handle(tag).map(|c| c.actuator_id)
    }

    #[test]
    fn test_rotates_after_attempts() {
        let mut policy = policy(&["meta_a", "meta_b", "meta_c"], 3);

        let picks: Vec<String> = (0..6)
            .filter_map(|_| chosen(&mut policy, StereotipyTag::NonDangerous))
            .collect();
        assert_eq!(picks, ids(&["meta_a", "meta_a", "meta_a", "meta_b", "meta_b", "meta_b"]));
    }

    #[test]
    fn test_variations_cycle_within_actuator() {
        let mut policy = policy(&["meta_a"], 5);

        let params: Vec<ActuationParams> = (0..4)
            .filter_map(|_| policy.handle(StereotipyTag::Dangerous))
            .map(|c| c.params)
            .collect();
        assert_eq!(params[0], STRONG_HAPTIC[0]);
        assert_eq!(params[1], STRONG_HAPTIC[1]);
        assert_eq!(params[2], STRONG_HAPTIC[2]);
        assert_eq!(params[3], STRONG_HAPTIC[0]);
    }

    #[test]
    fn test_successful_actuator_is_remembered() {
        let mut policy = policy(&["meta_a", "led_b"], 3);

        // Episode rotates from meta_a to led_b before ending.
        for _ in 0..4 {
            policy.handle(StereotipyTag::NonDangerous);
        }
        assert_eq!(policy.state().current_actuator.as_deref(), Some("led_b"));

        assert!(policy.handle(StereotipyTag::NoClass).is_none());
        assert_eq!(policy.state().memory.get(&1).map(String::as_str), Some("led_b"));
        assert_eq!(policy.state().current_tag, None);

        // The random pick would be meta_a; memory wins.
        assert_eq!(chosen(&mut policy, StereotipyTag::NonDangerous).as_deref(), Some("led_b"));
    }

    #[test]
    fn test_memory_ignored_when_actuator_gone() {
        let mut policy = policy(&["meta_a", "led_b"], 3);
        for _ in 0..4 {
            policy.handle(StereotipyTag::Dangerous);
        }
        policy.handle(StereotipyTag::NonStereotipy);

        policy.set_actuators(ids(&["meta_a"]));
        assert_eq!(chosen(&mut policy, StereotipyTag::Dangerous).as_deref(), Some("meta_a"));
    }

    #[test]
    fn test_inactive_and_unknown_tags_return_none() {
        let mut policy = policy(&["meta_a"], 3);
        assert!(policy.handle(StereotipyTag::NoClass).is_none());
        assert!(policy.handle(StereotipyTag::Unknown(7)).is_none());
        assert!(policy.state().memory.is_empty());
    }

    #[test]
    fn test_tag_change_starts_new_episode() {
        let mut policy = policy(&["meta_a"], 3);
        policy.handle(StereotipyTag::NonDangerous);
        policy.handle(StereotipyTag::NonDangerous);

        let cmd = policy.handle(StereotipyTag::Dangerous).unwrap();
        assert_eq!(cmd.params, STRONG_HAPTIC[0]);
        assert_eq!(policy.state().attempts, 1);
        assert_eq!(policy.state().current_tag, Some(2));
    }

    #[test]
    fn test_unknown_kind_retries_with_another_actuator() {
        let mut policy = policy(&["fan_1", "meta_b"], 3);

        let cmd = policy.handle(StereotipyTag::Dangerous).unwrap();
        assert_eq!(cmd.actuator_id, "meta_b");
        assert_eq!(policy.state().current_actuator.as_deref(), Some("meta_b"));
    }

    #[test]
    fn test_unresolvable_actuators_give_none() {
        let mut policy = policy(&["fan_1", "fan_2"], 3);
        assert!(policy.handle(StereotipyTag::Dangerous).is_none());

        // Audio with no clips on disk is unresolvable too.
        let mut policy = self::policy(&["speaker_1"], 3);
        assert!(policy.handle(StereotipyTag::NonDangerous).is_none());
    }

    #[test]
    fn test_audio_clip_follows_language() {
        let dir = std::env::temp_dir().join(format!("stopme-policy-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(AudioClip::DangerousIta.file_name()), b"mp3").unwrap();

        let mut policy = ActivationPolicy::new(
            ids(&["speaker_1"]),
            3,
            Arc::new(AudioLibrary::resolve(&dir)),
            Language::Ita,
            StepRng::new(0, 0),
        );
        let cmd = policy.handle(StereotipyTag::Dangerous).unwrap();
        assert_eq!(
            cmd.params,
            ActuationParams::Audio {
                file: dir.join("dangerous_ita.mp3")
            }
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let run = || {
            let mut policy = ActivationPolicy::new(
                ids(&["meta_a", "meta_b", "led_c", "led_d"]),
                1,
                empty_audio(),
                Language::Eng,
                StdRng::seed_from_u64(42),
            );
            (0..10)
                .filter_map(|_| policy.handle(StereotipyTag::Dangerous))
                .map(|c| c.actuator_id)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
