//! # Lampyris - Energy Beacon Logger
//!
//! A Rust daemon that listens for broadcast advertisements from a pulse-meter
//! beacon, decodes them into energy readings, stores them in SQLite and
//! enriches the history with regional carbon intensity data.
//!
//! ## Features
//!
//! - **Async-first**: Single cooperative loop on the Tokio runtime
//! - **Beacon Decoding**: Manufacturer payload parsing with meter calibration
//! - **SQLite Storage**: Minute-keyed readings with derived interval energy
//! - **Carbon Enrichment**: Regional intensity backfill over bounded windows
//! - **Upload**: Optional JSON export to a remote collector
//! - **Self-Healing**: Watchdog-driven process restart when the beacon goes quiet
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! The application follows a modular architecture with clear separation of concerns:
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `advert`: Advertisement payload decoding
//! - `store`: SQLite persistence for readings
//! - `carbon`: Carbon intensity client and gap reconciliation
//! - `scan`: Scan transport over a helper process
//! - `upload`: Remote collector client
//! - `supervisor`: Scheduling, boundary work and the liveness watchdog

pub mod advert;
pub mod carbon;
pub mod config;
pub mod error;
pub mod logging;
pub mod scan;
pub mod store;
pub mod supervisor;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use error::{LampyrisError, Result};
pub use supervisor::{MeterSupervisor, RunOutcome};
