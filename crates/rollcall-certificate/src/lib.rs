//! # Rollcall Certificates
//!
//! Template-driven participation certificates bound to a durable
//! verification hash.
//!
//! ## Overview
//!
//! A certificate is issued for one participant of one event. Issuance first
//! binds a verification hash to the pair (or reuses the one it has), then
//! renders the event's template into an SVG document and stores it through a
//! [`DocumentStore`]. The embedded QR code points at the public verification
//! URL for the hash.
//!
//! ## Key Types
//!
//! - [`CertificateRenderer`] - Issues and stores certificates
//! - [`Tag`] / [`Bindings`] - Placeholder tags and their values
//! - [`Page`] - Absolute page geometry for a background
//! - [`DocumentStore`] - Where rendered documents are kept
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rollcall_certificate::{CertificateRenderer, MemoryDocumentStore};
//!
//! let renderer = CertificateRenderer::new(
//!     "https://events.example.org",
//!     Arc::new(MemoryDocumentStore::new()),
//! );
//! // let cert = renderer.issue(&store, &event, &participant).await?;
//! ```

pub mod documents;
pub mod error;
pub mod hash;
pub mod layout;
pub mod placeholder;
pub mod render;
pub mod svg;

pub use documents::{DocumentKey, DocumentStore, FsDocumentStore, MemoryDocumentStore};
pub use error::{RenderError, Result};
pub use hash::{derive_verification_hash, generate_verification_hash, SALT_LEN};
pub use layout::{font_face, Frame, Page, DEFAULT_PAGE_HEIGHT_PT, PAGE_WIDTH_PT};
pub use placeholder::{format_date, resolve, Bindings, Tag};
pub use render::{render_svg, verification_url, Certificate, CertificateRenderer};
pub use svg::{escape, SvgDocument};
