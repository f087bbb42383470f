//! Certificate issuance: hash binding, rendering and storage.

use std::sync::Arc;

use rollcall_core::{Block, CertificateTemplate, Event, ParticipantId, VerificationHash};
use rollcall_store::{Attendance, HashAssignment, Store, StoreExt};

use crate::documents::{DocumentKey, DocumentStore};
use crate::error::{RenderError, Result};
use crate::hash::generate_verification_hash;
use crate::layout::Page;
use crate::placeholder::{resolve, Bindings};
use crate::svg::SvgDocument;

/// Fresh candidates tried before giving up on a unique hash.
pub const HASH_ATTEMPTS: usize = 4;

/// A rendered and stored certificate.
#[derive(Debug, Clone)]
pub struct Certificate {
    pub key: DocumentKey,
    pub hash: VerificationHash,
    pub verification_url: String,
    /// Total workload hours printed on the certificate.
    pub hours: u32,
    pub svg: String,
}

/// Public verification URL for a hash.
pub fn verification_url(base_url: &str, hash: &VerificationHash) -> String {
    format!("{}/validar/{}", base_url.trim_end_matches('/'), hash)
}

/// Render a certificate document. Pure: no store access.
pub fn render_svg(
    event: &Event,
    bindings: &Bindings,
    verification_url: &str,
) -> Result<String> {
    let page = Page::for_background(event.background.as_ref());
    let mut doc = SvgDocument::new(page);

    if let Some(background) = &event.background {
        doc.background(background);
    }

    let standard;
    let template = match &event.template {
        Some(template) => template,
        None => {
            standard = CertificateTemplate::standard();
            &standard
        }
    };

    for element in &template.elements {
        match &element.block {
            Block::Text(text) => doc.text(text, &resolve(&text.text, bindings)),
            Block::Qr(qr) => doc.qr(page.qr_frame(qr), verification_url)?,
        }
    }

    Ok(doc.finish())
}

/// Issues certificates for attended participants.
pub struct CertificateRenderer {
    base_url: String,
    documents: Arc<dyn DocumentStore>,
}

impl CertificateRenderer {
    pub fn new(base_url: impl Into<String>, documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            base_url: base_url.into(),
            documents,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    /// Issue the certificate of `participant` for `event`.
    ///
    /// The verification hash is persisted before anything is rendered; a
    /// store failure aborts issuance. Re-issuing reuses the stored hash.
    pub async fn issue<S: Store + ?Sized>(
        &self,
        store: &S,
        event: &Event,
        participant: &ParticipantId,
    ) -> Result<Certificate> {
        let attendance = store
            .participant_attendance(event.id, participant)
            .await?
            .ok_or_else(|| RenderError::NoAttendance {
                event: event.id.to_string(),
                participant: participant.to_string(),
            })?;

        let hash = self.ensure_hash(store, event, &attendance).await?;
        self.render_and_store(event, &attendance, hash).await
    }

    /// Bind a hash to the pair, or return the one it already has.
    pub async fn ensure_hash<S: Store + ?Sized>(
        &self,
        store: &S,
        event: &Event,
        attendance: &Attendance,
    ) -> Result<VerificationHash> {
        if let Some(hash) = attendance.verification_hash() {
            return Ok(hash.clone());
        }

        let participant = &attendance.participant_id;
        for _ in 0..HASH_ATTEMPTS {
            let candidate = generate_verification_hash(event.id, participant);
            match store
                .assign_verification_hash(event.id, participant, &candidate)
                .await?
            {
                HashAssignment::Assigned(hash) => {
                    tracing::info!(event = %event.id, participant = %participant, hash = %hash, "verification hash issued");
                    return Ok(hash);
                }
                HashAssignment::Existing(hash) => return Ok(hash),
                HashAssignment::Collision => {
                    tracing::warn!(event = %event.id, "verification hash collision, retrying");
                }
                HashAssignment::NoAttendance => {
                    return Err(RenderError::NoAttendance {
                        event: event.id.to_string(),
                        participant: participant.to_string(),
                    })
                }
            }
        }
        Err(RenderError::HashExhausted(HASH_ATTEMPTS))
    }

    async fn render_and_store(
        &self,
        event: &Event,
        attendance: &Attendance,
        hash: VerificationHash,
    ) -> Result<Certificate> {
        let bindings = Bindings {
            name: attendance.anchor().participant_name.clone(),
            event: event.name.clone(),
            hours: attendance.hours,
            date: event.start_date.clone(),
            participant_id: attendance.participant_id.clone(),
            hash: hash.clone(),
        };
        let url = verification_url(&self.base_url, &hash);
        let svg = render_svg(event, &bindings, &url)?;

        let key = DocumentKey::certificate(event.id, &attendance.participant_id);
        self.documents.put(&key, svg.as_bytes()).await?;

        Ok(Certificate {
            key,
            hash,
            verification_url: url,
            hours: attendance.hours,
            svg,
        })
    }
}
