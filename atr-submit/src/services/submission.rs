//! Submission service
//!
//! Orchestrates the two entry paths into the pipeline:
//! - raw message: normalize → publish
//! - form capture: validate → image upload → single-target envelope → publish
//!
//! Every outcome resolves to one [`SubmitResult`]; panics are caught here and
//! reported as [`SubmitError::Internal`].

use atr_common::config::RelayConfig;
use atr_common::model::round_coordinate;
use atr_common::time::Clock;
use atr_common::{normalize, Envelope, Observation, ValidationError};
use axum::body::Bytes;
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::image_ingest::{ImageIngestor, IngestError};
use super::publisher::{PublishError, Publisher};

/// Scalar form fields exactly as received
#[derive(Debug, Clone, Default)]
pub struct CaptureFields {
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub heading: Option<String>,
    pub pitch: Option<String>,
    pub roll: Option<String>,
    pub distance_m: Option<String>,
}

/// Binary image part of a form capture
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub bytes: Bytes,
    /// Declared media type, e.g. `image/jpeg`
    pub media_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct FormCapture {
    pub fields: CaptureFields,
    pub image: Option<CapturedImage>,
}

/// Inbound request
#[derive(Debug, Clone)]
pub enum SubmitRequest {
    /// Already batch-shaped payload; `None` when the body was empty
    RawMessage(Option<Value>),
    FormCapture(FormCapture),
}

impl SubmitRequest {
    fn path(&self) -> &'static str {
        match self {
            SubmitRequest::RawMessage(_) => "raw",
            SubmitRequest::FormCapture(_) => "form",
        }
    }
}

/// Acknowledged submission
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitSuccess {
    pub topic: String,
    /// Envelope `count` as published
    pub count: i64,
    pub targets_published: usize,
    /// Set on the form path only
    pub image_url: Option<String>,
    pub message: String,
}

/// Submission failure
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Image upload failed")]
    ImageUploadFailed(#[source] IngestError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Internal server error")]
    Internal(String),
}

impl SubmitError {
    /// Stable machine-readable kind
    pub fn code(&self) -> &'static str {
        match self {
            SubmitError::Validation(e) => e.code(),
            SubmitError::ImageUploadFailed(_) => "IMAGE_UPLOAD_FAILED",
            SubmitError::Publish(e) => e.code(),
            SubmitError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Human-readable detail suitable for direct display.
    ///
    /// Upload and internal failures stay generic; their causes are only logged.
    pub fn detail(&self) -> String {
        self.to_string()
    }
}

pub type SubmitResult = Result<SubmitSuccess, SubmitError>;

/// Runs submissions. Holds only immutable configuration and stateless collaborators,
/// so one instance serves any number of concurrent submissions.
pub struct SubmissionService {
    config: Arc<RelayConfig>,
    publisher: Publisher,
    ingestor: Arc<dyn ImageIngestor>,
    clock: Arc<dyn Clock>,
}

impl SubmissionService {
    pub fn new(
        config: Arc<RelayConfig>,
        publisher: Publisher,
        ingestor: Arc<dyn ImageIngestor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            publisher,
            ingestor,
            clock,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Handle one submission to a terminal result
    pub async fn submit(&self, request: SubmitRequest) -> SubmitResult {
        let path = request.path();

        let result = match AssertUnwindSafe(self.dispatch(request)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(path, reason = %reason, "Submission panicked");
                Err(SubmitError::Internal(reason))
            }
        };

        match &result {
            Ok(success) => info!(
                path,
                topic = %success.topic,
                count = success.count,
                targets = success.targets_published,
                "Submission published"
            ),
            Err(SubmitError::Validation(e)) => warn!(path, error = %e, "Submission rejected"),
            Err(SubmitError::ImageUploadFailed(e)) => error!(path, error = %e, "Image upload failed"),
            Err(e) => error!(path, error = %e, "Submission failed"),
        }

        result
    }

    async fn dispatch(&self, request: SubmitRequest) -> SubmitResult {
        match request {
            SubmitRequest::RawMessage(raw) => self.submit_raw(raw).await,
            SubmitRequest::FormCapture(capture) => self.submit_capture(capture).await,
        }
    }

    async fn submit_raw(&self, raw: Option<Value>) -> SubmitResult {
        let envelope = normalize(raw.as_ref(), self.clock.as_ref())?;
        let ack = self.publish(&envelope).await?;

        let targets_published = envelope.targets.len();
        Ok(SubmitSuccess {
            topic: ack.topic,
            count: envelope.count,
            targets_published,
            image_url: None,
            message: format!("Published {} target(s) to MQTT", targets_published),
        })
    }

    async fn submit_capture(&self, capture: FormCapture) -> SubmitResult {
        let fields = &capture.fields;
        let (lat, lon) = match (parse_number(&fields.lat), parse_number(&fields.lon)) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => return Err(ValidationError::MissingLocation.into()),
        };

        let image = capture.image.ok_or(ValidationError::MissingImage)?;
        self.check_image(&image)?;

        let image_url = String::from(
            self.ingestor
                .upload(image.bytes, &image.media_type)
                .await
                .map_err(SubmitError::ImageUploadFailed)?,
        );

        let now = self.clock.now_unix();
        let lat = round_coordinate(lat);
        let lon = round_coordinate(lon);
        let envelope = Envelope::single(Observation {
            lat,
            lon,
            src_lat: lat,
            src_lon: lon,
            heading: parse_number(&fields.heading).unwrap_or(0.0),
            pitch: parse_number(&fields.pitch).unwrap_or(0.0),
            roll: parse_number(&fields.roll).unwrap_or(0.0),
            distance_m: parse_number(&fields.distance_m).unwrap_or(0.0),
            ts: now,
            image: Some(image_url.clone()),
        });

        let ack = self.publish(&envelope).await?;

        Ok(SubmitSuccess {
            topic: ack.topic,
            count: envelope.count,
            targets_published: envelope.targets.len(),
            image_url: Some(image_url),
            message: "Target submitted successfully".to_string(),
        })
    }

    /// Media type allow-list and size cap, checked before any network call
    fn check_image(&self, image: &CapturedImage) -> Result<(), ValidationError> {
        if !self.config.is_allowed_image_type(&image.media_type) {
            return Err(ValidationError::InvalidImageType {
                media_type: image.media_type.clone(),
                allowed: self.config.allowed_image_types.join(", "),
            });
        }
        if image.bytes.len() > self.config.max_image_bytes {
            warn!(size = image.bytes.len(), limit = self.config.max_image_bytes, "Image over size cap");
            return Err(ValidationError::ImageTooLarge {
                limit: self.config.max_image_bytes,
            });
        }
        Ok(())
    }

    async fn publish(&self, envelope: &Envelope) -> Result<super::publisher::Ack, PublishError> {
        self.publisher
            .publish(
                &self.config.topic,
                envelope,
                self.config.qos,
                self.config.publish_timeout,
            )
            .await
    }
}

/// Finite number from a form field; `None` when missing or unparseable
fn parse_number(raw: &Option<String>) -> Option<f64> {
    raw.as_deref()
        .map(str::trim)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(&Some(" 19.5 ".to_string())), Some(19.5));
        assert_eq!(parse_number(&Some("-3".to_string())), Some(-3.0));
        assert_eq!(parse_number(&Some("abc".to_string())), None);
        assert_eq!(parse_number(&Some("NaN".to_string())), None);
        assert_eq!(parse_number(&Some("inf".to_string())), None);
        assert_eq!(parse_number(&Some(String::new())), None);
        assert_eq!(parse_number(&None), None);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SubmitError::from(ValidationError::MissingImage).code(),
            "MISSING_IMAGE"
        );
        assert_eq!(
            SubmitError::ImageUploadFailed(IngestError::NotConfigured).code(),
            "IMAGE_UPLOAD_FAILED"
        );
        assert_eq!(
            SubmitError::ImageUploadFailed(IngestError::NotConfigured).detail(),
            "Image upload failed"
        );
        assert_eq!(SubmitError::Internal("boom".into()).detail(), "Internal server error");
    }
}
