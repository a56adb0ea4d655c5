//! Transparency module for the STOPme agent.
//!
//! This module tracks what the pipeline did with the wearer's data and which
//! feedback it produced, for caregivers and for debugging.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, AuditActuation, AuditRecord,
    SharedTransparencyLog, TransparencyLog, TransparencyStats,
};
