//! # Rollcall Store
//!
//! Storage abstraction for Rollcall. Provides a trait-based interface for
//! events, activities, enrollments and the participant directory, with
//! SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`RegisterOutcome`] / [`ConfirmOutcome`] - Results of ledger transitions
//! - [`HashAssignment`] - Result of binding a verification hash
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rollcall_store::{RegisterOutcome, SqliteStore, Store};
//! use rollcall_core::{ActivityId, ParticipantId};
//!
//! async fn example() {
//!     let store = SqliteStore::open("rollcall.db").unwrap();
//!
//!     let outcome = store
//!         .register(ActivityId(1), &ParticipantId::new("12345678900"), "Ana", 0)
//!         .await
//!         .unwrap();
//!     if outcome == RegisterOutcome::CapacityExceeded {
//!         // activity is full
//!     }
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic capacity**: the seat check and the insert are one conditional
//!   statement inside an `IMMEDIATE` transaction
//! - **Idempotent transitions**: registering or confirming twice is a no-op
//! - **Durable hash**: one verification hash per (event, participant), never
//!   replaced once assigned

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{Attendance, ConfirmOutcome, HashAssignment, RegisterOutcome, Store, StoreExt};
