//! Submission pipeline services
//!
//! - `publisher`: single-attempt broker publish under a deadline
//! - `mqtt`: rumqttc-backed broker transport
//! - `image_ingest`: image hosting collaborator
//! - `submission`: orchestration of both entry paths

pub mod image_ingest;
pub mod mqtt;
pub mod publisher;
pub mod submission;

pub use image_ingest::{CloudinaryIngestor, DisabledIngestor, ImageIngestor, IngestError};
pub use mqtt::MqttConnector;
pub use publisher::{Ack, BrokerConnector, BrokerSession, PublishError, Publisher, TransportError};
pub use submission::{
    CaptureFields, CapturedImage, FormCapture, SubmissionService, SubmitError, SubmitRequest,
    SubmitResult, SubmitSuccess,
};
