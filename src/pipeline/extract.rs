//! Extraction step: uploaded document bytes to a structured identity.
//!
//! The step only reads from the object store. Decoding is delegated to an
//! [`IdReader`]; the shipped reader is a deterministic simulation of the
//! document scanner.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ExtractionError, ObjectStoreError};
use crate::identity::{
    Country, ExtractedIdentity, ExtractionMethod, IdentityRecord, find_national_id,
    is_valid_national_id, normalize_national_id,
};
use crate::store::{ObjectLocation, ObjectStore};

/// Turns document bytes into an identity with a confidence score.
#[async_trait]
pub trait IdReader: Send + Sync {
    async fn read(
        &self,
        document: &[u8],
        country: Country,
    ) -> Result<ExtractedIdentity, ExtractionError>;
}

/// The extraction step as seen by the orchestrator.
#[async_trait]
pub trait ExtractionStep: Send + Sync {
    async fn extract(
        &self,
        location: &ObjectLocation,
        country: Country,
    ) -> Result<ExtractedIdentity, ExtractionError>;
}

// ── Simulated scanner ───────────────────────────────────────────────

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47];

/// Text layer of a scanned document as produced by the simulated scanner.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanDocument {
    first_name: Option<String>,
    last_name: Option<String>,
    date_of_birth: Option<String>,
    national_id: Option<String>,
    /// Free text of the whole document.
    text: Option<String>,
    /// Image quality in [0, 1]; caps the confidence.
    quality: Option<f32>,
}

/// Deterministic stand-in for a document OCR service.
///
/// Accepts a JSON scan document. Raw JPEG/PNG images carry no text layer
/// and read as an empty record with zero confidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedIdReader;

impl SimulatedIdReader {
    pub fn new() -> Self {
        Self
    }

    fn locate_id(country: Country, doc: &ScanDocument) -> (Option<String>, ExtractionMethod) {
        let field = doc
            .national_id
            .as_deref()
            .map(normalize_national_id)
            .filter(|s| !s.is_empty());

        if let Some(id) = &field {
            if is_valid_national_id(country, id) {
                return (field, ExtractionMethod::Exact);
            }
            if let Some(found) = find_national_id(country, id) {
                return (Some(found), ExtractionMethod::Recovered);
            }
        }
        if let Some(found) = doc
            .text
            .as_deref()
            .and_then(|text| find_national_id(country, text))
        {
            return (Some(found), ExtractionMethod::TextScan);
        }
        // Keep what was printed so verification can report the format.
        (field, ExtractionMethod::None)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl IdReader for SimulatedIdReader {
    async fn read(
        &self,
        document: &[u8],
        country: Country,
    ) -> Result<ExtractedIdentity, ExtractionError> {
        if document.is_empty() {
            return Err(ExtractionError::UnreadableContent {
                reason: "empty document".to_string(),
            });
        }
        if document.starts_with(JPEG_MAGIC) || document.starts_with(PNG_MAGIC) {
            debug!(country = %country, "Image without text layer");
            return Ok(ExtractedIdentity {
                record: IdentityRecord::empty(country),
                confidence: 0.0,
                method: ExtractionMethod::None,
            });
        }

        let doc: ScanDocument =
            serde_json::from_slice(document).map_err(|e| ExtractionError::UnreadableContent {
                reason: format!("not a recognised document: {e}"),
            })?;

        let (national_id, method) = Self::locate_id(country, &doc);
        let record = IdentityRecord {
            country,
            first_name: non_blank(doc.first_name),
            last_name: non_blank(doc.last_name),
            date_of_birth: non_blank(doc.date_of_birth),
            national_id,
        };

        let present = 4 - record.missing_fields().len();
        let completeness = present as f32 / 4.0;
        let quality = doc.quality.unwrap_or(1.0);
        let confidence = (method.base_confidence() * completeness)
            .min(quality)
            .clamp(0.0, 1.0);

        Ok(ExtractedIdentity {
            record,
            confidence,
            method,
        })
    }
}

// ── Step ────────────────────────────────────────────────────────────

/// Fetches the upload and hands it to the reader.
pub struct Extractor {
    objects: Arc<dyn ObjectStore>,
    reader: Arc<dyn IdReader>,
    call_timeout: Duration,
}

impl Extractor {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        reader: Arc<dyn IdReader>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            objects,
            reader,
            call_timeout,
        }
    }
}

#[async_trait]
impl ExtractionStep for Extractor {
    async fn extract(
        &self,
        location: &ObjectLocation,
        country: Country,
    ) -> Result<ExtractedIdentity, ExtractionError> {
        let bytes = match tokio::time::timeout(self.call_timeout, self.objects.get(location)).await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(ObjectStoreError::NotFound { location })) => {
                return Err(ExtractionError::NotFound { location });
            }
            Ok(Err(ObjectStoreError::InvalidLocation { location, .. })) => {
                return Err(ExtractionError::NotFound { location });
            }
            Ok(Err(e @ ObjectStoreError::Io(_))) => {
                warn!(location = %location, error = %e, "Object store read failed");
                return Err(ExtractionError::Unavailable {
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(location = %location, timeout = ?self.call_timeout, "Object store read timed out");
                return Err(ExtractionError::Unavailable {
                    reason: format!("object store read timed out after {:?}", self.call_timeout),
                });
            }
        };

        let extracted = tokio::time::timeout(self.call_timeout, self.reader.read(&bytes, country))
            .await
            .map_err(|_| ExtractionError::Unavailable {
                reason: format!("document reader timed out after {:?}", self.call_timeout),
            })??;

        debug!(
            location = %location,
            confidence = extracted.confidence,
            method = ?extracted.method,
            "Document extracted"
        );
        Ok(extracted)
    }
}
