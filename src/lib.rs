//! Proximity Core - matching core of a decentralized proximity-tracing SDK.
//!
//! This library turns locally recorded Bluetooth handshakes and remotely
//! published known-case key batches into contacts and exposure detection
//! sessions, without any server seeing raw proximity data.
//!
//! # Privacy Guarantees
//!
//! - **Download only**: Syncing fetches published keys; nothing local is uploaded
//! - **Local matching**: Key batches are matched on the device
//! - **No raw signal export**: Contacts carry window counts, never RSSI values
//! - **Transparency**: All fetches and detections are counted and auditable
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Proximity Core                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌──────────────┐   ┌─────────────┐        │
//! │  │   Planner   │──▶│ Synchronizer │──▶│   Matcher   │        │
//! │  │ (days due)  │   │ (one round)  │   │ (detection) │        │
//! │  └─────────────┘   └──────────────┘   └─────────────┘        │
//! │                           │                  │                │
//! │                           ▼                  ▼                │
//! │                    ┌─────────────┐   ┌─────────────┐         │
//! │                    │ Key Service │   │Transparency │         │
//! │                    │  (remote)   │   │    Log      │         │
//! │                    └─────────────┘   └─────────────┘         │
//! │                                                               │
//! │  ┌─────────────┐   ┌──────────────┐                          │
//! │  │ Handshakes  │──▶│   Contact    │──▶ Contacts              │
//! │  │   (local)   │   │   Factory    │                          │
//! │  └─────────────┘   └──────────────┘                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use proximity_core::core::{contacts, HandshakeModel};
//!
//! let handshakes: Vec<HandshakeModel> = Vec::new();
//! let found = contacts(&handshakes, 1);
//! assert!(found.is_empty());
//! ```

pub mod config;
pub mod core;
pub mod matcher;
pub mod service;
pub mod sync;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, NetworkingParameters, SyncDescriptor};
pub use self::core::{Contact, ContactFactory, DayDate, EphId, HandshakeModel};
pub use matcher::{BatchMatcher, DetectionTimingManager, ExposureDetector, MatchError, Matcher};
pub use service::{KeyBatch, NetworkError, RemoteKeyService};
pub use sync::{
    FileSyncStore, KnownCaseSynchronizer, MemorySyncStore, SyncError, SyncReport, SyncResult,
    SyncStore,
};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

#[cfg(feature = "http")]
pub use service::HttpKeyService;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to users.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║               PROXIMITY TRACING - PRIVACY DECLARATION            ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This device checks for exposure to published known cases.      ║
║                                                                  ║
║  ✓ WHAT THIS DEVICE DOWNLOADS:                                   ║
║    • Keys voluntarily published by confirmed cases               ║
║                                                                  ║
║  ✗ WHAT NEVER LEAVES THIS DEVICE:                                ║
║    • Identifiers you have observed nearby                        ║
║    • Signal strengths or contact durations                       ║
║    • Your location                                               ║
║                                                                  ║
║  Matching runs locally. Only if you choose to report a           ║
║  positive diagnosis are your own keys published.                 ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
