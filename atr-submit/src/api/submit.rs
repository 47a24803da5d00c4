//! Submission endpoints
//!
//! - POST /api/submit-raw-json: pre-built envelope-shaped JSON body
//! - POST /api/submit-target: multipart form capture with one `image` part

use atr_common::config::RelayConfig;
use atr_common::ValidationError;
use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::BytesRejection,
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::services::{CaptureFields, CapturedImage, FormCapture, SubmitRequest};
use crate::AppState;

/// Multipart framing and scalar fields on top of the image itself
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// POST /api/submit-raw-json response
#[derive(Debug, Serialize)]
pub struct RawSubmitResponse {
    pub success: bool,
    pub message: String,
    pub topic: String,
    pub count: i64,
    pub targets_published: usize,
}

/// POST /api/submit-target response
#[derive(Debug, Serialize)]
pub struct TargetSubmitResponse {
    pub success: bool,
    pub message: String,
    pub image_url: Option<String>,
    pub mqtt_topic: String,
    pub count: i64,
    pub targets_published: usize,
}

/// Build submission routes with per-route body limits
pub fn submit_routes(config: &RelayConfig) -> Router<AppState> {
    let form_limit = config.max_image_bytes.saturating_add(FORM_OVERHEAD_BYTES);

    Router::new()
        .route(
            "/api/submit-raw-json",
            post(submit_raw_json).layer(DefaultBodyLimit::max(config.raw_body_limit)),
        )
        .route(
            "/api/submit-target",
            post(submit_target).layer(DefaultBodyLimit::max(form_limit)),
        )
}

/// POST /api/submit-raw-json
///
/// An empty body is reported as a missing payload, not a parse error.
pub async fn submit_raw_json(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<RawSubmitResponse>> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(format!(
                "JSON body exceeds {} bytes",
                state.config.raw_body_limit
            ))
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    })?;

    let raw = parse_json_body(&body)?;
    let success = state.service.submit(SubmitRequest::RawMessage(raw)).await?;

    Ok(Json(RawSubmitResponse {
        success: true,
        message: success.message,
        topic: success.topic,
        count: success.count,
        targets_published: success.targets_published,
    }))
}

fn parse_json_body(body: &[u8]) -> ApiResult<Option<Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| ApiError::BadRequest(format!("Body is not valid JSON: {}", e)))
}

/// POST /api/submit-target
pub async fn submit_target(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<TargetSubmitResponse>> {
    let multipart = multipart.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let capture = read_capture(multipart, state.config.max_image_bytes).await?;

    let success = state.service.submit(SubmitRequest::FormCapture(capture)).await?;

    Ok(Json(TargetSubmitResponse {
        success: true,
        message: success.message,
        image_url: success.image_url,
        mqtt_topic: success.topic,
        count: success.count,
        targets_published: success.targets_published,
    }))
}

/// Collect form fields. The first occurrence of each field wins; unknown fields
/// are ignored. An empty file part counts as no image.
async fn read_capture(mut multipart: Multipart, image_limit: usize) -> ApiResult<FormCapture> {
    let mut capture = FormCapture::default();
    let read_error = |e: MultipartError| multipart_error(e, image_limit);

    while let Some(field) = multipart.next_field().await.map_err(read_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "image" {
            let media_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await.map_err(read_error)?;

            if capture.image.is_none() && !bytes.is_empty() {
                debug!(size = bytes.len(), media_type = %media_type, "Received image part");
                capture.image = Some(CapturedImage { bytes, media_type });
            }
            continue;
        }

        match field_slot(&mut capture.fields, &name) {
            Some(slot) => {
                let text = field.text().await.map_err(read_error)?;
                if slot.is_none() {
                    *slot = Some(text);
                }
            }
            None => debug!(field = %name, "Ignoring unknown form field"),
        }
    }

    Ok(capture)
}

fn field_slot<'a>(fields: &'a mut CaptureFields, name: &str) -> Option<&'a mut Option<String>> {
    match name {
        "lat" => Some(&mut fields.lat),
        "lon" => Some(&mut fields.lon),
        "heading" => Some(&mut fields.heading),
        "pitch" => Some(&mut fields.pitch),
        "roll" => Some(&mut fields.roll),
        "distance_m" => Some(&mut fields.distance_m),
        _ => None,
    }
}

/// A body over the form limit can only be an oversized image
fn multipart_error(error: MultipartError, image_limit: usize) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::Submit(ValidationError::ImageTooLarge { limit: image_limit }.into())
    } else {
        ApiError::BadRequest(format!("Invalid multipart body: {}", error.body_text()))
    }
}
