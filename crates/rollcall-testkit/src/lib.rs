//! # Rollcall Testkit
//!
//! Testing utilities for Rollcall.
//!
//! ## Overview
//!
//! - **Fixtures**: a pinned clock, a known secret, in-memory store, broker
//!   and document store, plus builders for events and activities
//! - **Generators**: Proptest strategies for instants, ids and coordinates
//! - **Golden vectors**: check-in tokens with known values
//! - **Mailers**: a mailer that records what it was asked to send
//!
//! ## Golden Vectors
//!
//! ```rust
//! use rollcall_testkit::vectors::{all_token_vectors, codec_for};
//!
//! for v in all_token_vectors() {
//!     let token = codec_for(&v).issue(v.activity, v.now_millis);
//!     assert_eq!(token.as_str(), v.expected_token, "{}", v.name);
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use rollcall_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! let token = fixture.codec.issue(rollcall_core::ActivityId(1), fixture.now());
//! ```

pub mod fixtures;
pub mod generators;
pub mod mailer;
pub mod vectors;

pub use fixtures::{TestFixture, TEST_SECRET};
pub use mailer::RecordingMailer;
