//! # Rollcall
//!
//! Attendance for multi-activity events: QR check-in with short-lived
//! codes, capacity-gated enrollment, and verifiable participation
//! certificates delivered through a queue.
//!
//! ## Overview
//!
//! - **Check-in**: a presenter shows `CHECKIN:<event>:<activity>:<token>`;
//!   the token is an HMAC over the activity and the current 30 s window and
//!   is accepted for one extra window.
//! - **Ledger**: registration never exceeds an activity's capacity;
//!   confirming attendance twice changes nothing.
//! - **Certificates**: bound to a verification hash issued once per
//!   (event, participant) and embedded as a QR to the public lookup URL.
//! - **Delivery**: certificates are enqueued and sent by a separate worker;
//!   failures land in a dead-letter queue.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rollcall::{Rollcall, RollcallConfig};
//! use rollcall::store::SqliteStore;
//!
//! async fn example() -> rollcall::Result<()> {
//!     let mut config = RollcallConfig::from_toml_file("rollcall.toml")?;
//!     config.apply_env();
//!
//!     let store = SqliteStore::open(&config.database_path)?;
//!     let service = Rollcall::from_config(&config, store).await?;
//!
//!     // let code = service.presenter_code(activity_id).await?;
//!     // let check_in = service.check_in(&participant, &code.to_string(), None).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `rollcall::core` - Tokens, payloads, identifiers, model
//! - `rollcall::store` - Storage abstraction and SQLite
//! - `rollcall::certificate` - Certificate rendering
//! - `rollcall::delivery` - Queue, mailer and worker

pub mod config;
pub mod error;
pub mod logging;
mod notify;
pub mod observer;
pub mod report;
pub mod service;

// Re-export component crates
pub use rollcall_certificate as certificate;
pub use rollcall_core as core;
pub use rollcall_delivery as delivery;
pub use rollcall_store as store;

pub use config::RollcallConfig;
pub use error::{Result, RollcallError};
pub use logging::{init_logging, LogFormat};
pub use observer::LedgerObserver;
pub use report::{
    ActivityReport, BatchReport, CheckIn, EventReport, Registration, ReportLine, RosterEntry,
    Verification,
};
pub use service::Rollcall;
