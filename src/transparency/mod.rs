//! Transparency module.
//!
//! Tracks what the core fetched and derived, supporting user trust and
//! auditability without recording any personal data.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_from_config, create_shared_log_with_persistence,
    SharedTransparencyLog, TransparencyLog, TransparencyStats,
};
