//! Transparency log: pipeline counters and the audit trail.
//!
//! Every stage reports what it did (rows emitted, windows dropped, events
//! evicted, actuations fired) so an operator can see why feedback did or did
//! not happen. Dispatched, gated and evicted events are also recorded as
//! [`AuditRecord`]s on the `stopme::audit` tracing target.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Audit records kept in memory for inspection.
const RECENT_RECORDS: usize = 64;

/// One actuation listed in an audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditActuation {
    /// Actuator id, or `DROPPED` for evicted events
    pub target: String,
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl AuditActuation {
    /// Marker for an event evicted from a full channel.
    pub fn dropped() -> Self {
        let mut params = serde_json::Map::new();
        params.insert("reason".to_string(), "queue_full".into());
        Self {
            target: "DROPPED".to_string(),
            params,
        }
    }

    /// Marker for an event suppressed while calibration is pending.
    pub fn gated() -> Self {
        let mut params = serde_json::Map::new();
        params.insert("reason".to_string(), "calibration".into());
        Self {
            target: "GATED".to_string(),
            params,
        }
    }

    pub fn performed(actuator_id: &str, params: &crate::actuator::ActuationParams) -> Self {
        Self {
            target: actuator_id.to_string(),
            params: params.to_map(),
        }
    }
}

/// What happened to one classification event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub feature: String,
    pub event: String,
    pub actuations: Vec<AuditActuation>,
    pub source: String,
}

impl AuditRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        event: impl Into<String>,
        actuations: Vec<AuditActuation>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            feature: "imu".to_string(),
            event: event.into(),
            actuations,
            source: source.into(),
        }
    }

    /// Human-readable diary line.
    pub fn line(&self) -> String {
        let actions: Vec<String> = self
            .actuations
            .iter()
            .map(|a| {
                let params: Vec<String> = a.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
                format!("{}({})", a.target.to_uppercase(), params.join(", "))
            })
            .collect();

        format!(
            "[{}] - {} - {} - {}",
            self.timestamp.format("%d-%m-%Y %H:%M:%S"),
            self.feature.to_uppercase(),
            self.event,
            actions.join(", ")
        )
    }
}

/// Pipeline statistics for the current session.
#[derive(Debug)]
pub struct TransparencyLog {
    samples_received: AtomicU64,
    malformed_samples: AtomicU64,
    rows_emitted: AtomicU64,
    left_drops: AtomicU64,
    right_drops: AtomicU64,
    stale_evictions: AtomicU64,
    warmup_windows: AtomicU64,
    windows_processed: AtomicU64,
    extractor_failures: AtomicU64,
    events_published: AtomicU64,
    events_evicted: AtomicU64,
    classifier_failures: AtomicU64,
    malformed_features: AtomicU64,
    gated_events: AtomicU64,
    actuations: AtomicU64,
    actuation_failures: AtomicU64,
    recent: Mutex<VecDeque<AuditRecord>>,
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            samples_received: AtomicU64::new(0),
            malformed_samples: AtomicU64::new(0),
            rows_emitted: AtomicU64::new(0),
            left_drops: AtomicU64::new(0),
            right_drops: AtomicU64::new(0),
            stale_evictions: AtomicU64::new(0),
            warmup_windows: AtomicU64::new(0),
            windows_processed: AtomicU64::new(0),
            extractor_failures: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            events_evicted: AtomicU64::new(0),
            classifier_failures: AtomicU64::new(0),
            malformed_features: AtomicU64::new(0),
            gated_events: AtomicU64::new(0),
            actuations: AtomicU64::new(0),
            actuation_failures: AtomicU64::new(0),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_RECORDS)),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that persists to `path` and resumes the totals found there.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "Could not load previous transparency stats");
        }

        log
    }

    pub fn record_sample(&self) {
        self.samples_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed_sample(&self) {
        self.malformed_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_row_emitted(&self) {
        self.rows_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alignment_drop(&self, left: bool) {
        if left {
            self.left_drops.fetch_add(1, Ordering::Relaxed);
        } else {
            self.right_drops.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_stale_eviction(&self) {
        self.stale_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_warmup_window(&self) {
        self.warmup_windows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_window_processed(&self) {
        self.windows_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_extractor_failure(&self) {
        self.extractor_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_evicted(&self) {
        self.events_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classifier_failure(&self) {
        self.classifier_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A feature vector of the wrong shape reached the gateway.
    pub fn record_malformed_features(&self) {
        self.malformed_features.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gated_event(&self) {
        self.gated_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_actuation(&self) {
        self.actuations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_actuation_failure(&self) {
        self.actuation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Append to the audit trail.
    pub fn record_audit(&self, record: AuditRecord) {
        tracing::info!(target: "stopme::audit", "{}", record.line());

        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        if recent.len() == RECENT_RECORDS {
            recent.pop_front();
        }
        recent.push_back(record);
    }

    /// Most recent audit records, oldest first.
    pub fn recent_records(&self) -> Vec<AuditRecord> {
        self.recent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            samples_received: self.samples_received.load(Ordering::Relaxed),
            malformed_samples: self.malformed_samples.load(Ordering::Relaxed),
            rows_emitted: self.rows_emitted.load(Ordering::Relaxed),
            left_drops: self.left_drops.load(Ordering::Relaxed),
            right_drops: self.right_drops.load(Ordering::Relaxed),
            stale_evictions: self.stale_evictions.load(Ordering::Relaxed),
            warmup_windows: self.warmup_windows.load(Ordering::Relaxed),
            windows_processed: self.windows_processed.load(Ordering::Relaxed),
            extractor_failures: self.extractor_failures.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_evicted: self.events_evicted.load(Ordering::Relaxed),
            classifier_failures: self.classifier_failures.load(Ordering::Relaxed),
            malformed_features: self.malformed_features.load(Ordering::Relaxed),
            gated_events: self.gated_events.load(Ordering::Relaxed),
            actuations: self.actuations.load(Ordering::Relaxed),
            actuation_failures: self.actuation_failures.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Samples received: {} ({} malformed)\n\
             - Joint rows emitted: {}\n\
             - Alignment drops: left {}, right {} ({} stale)\n\
             - Windows processed: {} ({} warm-up, {} extractor failures, {} malformed)\n\
             - Events published: {} ({} evicted, {} gated, {} classifier failures)\n\
             - Actuations: {} ({} failed)\n\
             - Session duration: {} seconds",
            stats.samples_received,
            stats.malformed_samples,
            stats.rows_emitted,
            stats.left_drops,
            stats.right_drops,
            stats.stale_evictions,
            stats.windows_processed,
            stats.warmup_windows,
            stats.extractor_failures,
            stats.malformed_features,
            stats.events_published,
            stats.events_evicted,
            stats.gated_events,
            stats.classifier_failures,
            stats.actuations,
            stats.actuation_failures,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let persisted = PersistedStats {
                stats: self.stats(),
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;
                let s = persisted.stats;

                self.samples_received.store(s.samples_received, Ordering::Relaxed);
                self.malformed_samples.store(s.malformed_samples, Ordering::Relaxed);
                self.rows_emitted.store(s.rows_emitted, Ordering::Relaxed);
                self.left_drops.store(s.left_drops, Ordering::Relaxed);
                self.right_drops.store(s.right_drops, Ordering::Relaxed);
                self.stale_evictions.store(s.stale_evictions, Ordering::Relaxed);
                self.warmup_windows.store(s.warmup_windows, Ordering::Relaxed);
                self.windows_processed.store(s.windows_processed, Ordering::Relaxed);
                self.extractor_failures.store(s.extractor_failures, Ordering::Relaxed);
                self.events_published.store(s.events_published, Ordering::Relaxed);
                self.events_evicted.store(s.events_evicted, Ordering::Relaxed);
                self.classifier_failures.store(s.classifier_failures, Ordering::Relaxed);
                self.malformed_features.store(s.malformed_features, Ordering::Relaxed);
                self.gated_events.store(s.gated_events, Ordering::Relaxed);
                self.actuations.store(s.actuations, Ordering::Relaxed);
                self.actuation_failures.store(s.actuation_failures, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub samples_received: u64,
    pub malformed_samples: u64,
    pub rows_emitted: u64,
    pub left_drops: u64,
    pub right_drops: u64,
    pub stale_evictions: u64,
    pub warmup_windows: u64,
    pub windows_processed: u64,
    pub extractor_failures: u64,
    pub events_published: u64,
    pub events_evicted: u64,
    pub classifier_failures: u64,
    /// Added after the first stats format; older files load it as zero
    #[serde(default)]
    pub malformed_features: u64,
    pub gated_events: u64,
    pub actuations: u64,
    pub actuation_failures: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(flatten)]
    stats: TransparencyStats,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
