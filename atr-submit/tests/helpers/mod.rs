//! Shared test doubles for atr-submit integration tests
//!
//! `FakeConnector` stands in for the MQTT broker and records every connection,
//! publish and close. `FakeIngestor` stands in for the image store.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use atr_common::config::{QualityOfService, RelayConfig};
use atr_common::time::ManualClock;
use axum::body::{Body, Bytes};
use axum::Router;
use serde_json::Value;
use url::Url;

use atr_submit::services::{
    BrokerConnector, BrokerSession, ImageIngestor, IngestError, Publisher, SubmissionService,
    TransportError,
};
use atr_submit::{build_router, AppState};

/// Fixed wall clock used by every harness
pub const NOW: f64 = 1_700_000_000.25;

pub const IMAGE_URL: &str = "https://images.example.com/atak_targets/abc123.jpg";

/// How the fake broker reacts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behaviour {
    /// Connect and acknowledge immediately
    Ack,
    /// Acknowledge after the given delay
    AckAfter(Duration),
    /// Connection refused
    RefuseConnect,
    /// Connect succeeds, publish is rejected
    FailPublish,
    /// Connect never completes
    HangConnect,
    /// Connect succeeds, acknowledgment never arrives
    NeverAck,
    /// Publish panics
    Panic,
}

/// A message the fake broker acknowledged
#[derive(Debug, Clone)]
pub struct Published {
    pub client_id: String,
    pub topic: String,
    pub qos: QualityOfService,
    pub payload: Value,
}

/// Everything the fake broker observed
#[derive(Debug, Default)]
pub struct BrokerStats {
    pub connects: AtomicUsize,
    pub sessions_opened: AtomicUsize,
    pub closes: AtomicUsize,
    pub forced_closes: AtomicUsize,
    pub client_ids: Mutex<Vec<String>>,
    pub published: Mutex<Vec<Published>>,
}

impl BrokerStats {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn forced_closes(&self) -> usize {
        self.forced_closes.load(Ordering::SeqCst)
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.client_ids.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }
}

pub struct FakeConnector {
    behaviour: Behaviour,
    stats: Arc<BrokerStats>,
}

impl FakeConnector {
    pub fn new(behaviour: Behaviour) -> (Arc<Self>, Arc<BrokerStats>) {
        let stats = Arc::new(BrokerStats::default());
        let connector = Arc::new(Self {
            behaviour,
            stats: stats.clone(),
        });
        (connector, stats)
    }
}

#[async_trait]
impl BrokerConnector for FakeConnector {
    async fn connect(&self, client_id: &str) -> Result<Box<dyn BrokerSession>, TransportError> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        self.stats.client_ids.lock().unwrap().push(client_id.to_string());

        match self.behaviour {
            Behaviour::RefuseConnect => {
                return Err(TransportError("connection refused".to_string()));
            }
            Behaviour::HangConnect => std::future::pending::<()>().await,
            _ => {}
        }

        self.stats.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            client_id: client_id.to_string(),
            behaviour: self.behaviour,
            stats: self.stats.clone(),
        }))
    }
}

struct FakeSession {
    client_id: String,
    behaviour: Behaviour,
    stats: Arc<BrokerStats>,
}

#[async_trait]
impl BrokerSession for FakeSession {
    async fn publish(
        &mut self,
        topic: &str,
        qos: QualityOfService,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        match self.behaviour {
            Behaviour::FailPublish => return Err(TransportError("not authorized".to_string())),
            Behaviour::NeverAck => std::future::pending::<()>().await,
            Behaviour::AckAfter(delay) => tokio::time::sleep(delay).await,
            Behaviour::Panic => panic!("broker exploded"),
            _ => {}
        }

        self.stats.published.lock().unwrap().push(Published {
            client_id: self.client_id.clone(),
            topic: topic.to_string(),
            qos,
            payload: serde_json::from_slice(&payload).expect("payload is JSON"),
        });
        Ok(())
    }

    async fn close(self: Box<Self>, forced: bool) {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        if forced {
            self.stats.forced_closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Image store double: returns a fixed URL or a fixed failure
pub struct FakeIngestor {
    fail: bool,
    calls: AtomicUsize,
    media_types: Mutex<Vec<String>>,
}

impl FakeIngestor {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            calls: AtomicUsize::new(0),
            media_types: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: AtomicUsize::new(0),
            media_types: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn media_types(&self) -> Vec<String> {
        self.media_types.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageIngestor for FakeIngestor {
    async fn upload(&self, _bytes: Bytes, media_type: &str) -> Result<Url, IngestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.media_types.lock().unwrap().push(media_type.to_string());
        if self.fail {
            return Err(IngestError::Api(401, "Invalid Signature".to_string()));
        }
        Ok(Url::parse(IMAGE_URL).unwrap())
    }
}

/// Defaults with a small image cap so oversize cases stay cheap
pub fn test_config() -> RelayConfig {
    RelayConfig {
        topic: "test/atak_targets".to_string(),
        max_image_bytes: 4 * 1024 * 1024,
        publish_timeout: Duration::from_secs(10),
        ..RelayConfig::default()
    }
}

/// Service wired to fakes, plus handles for inspecting them
pub struct Harness {
    pub service: Arc<SubmissionService>,
    pub broker: Arc<BrokerStats>,
    pub ingestor: Arc<FakeIngestor>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(behaviour: Behaviour) -> Self {
        Self::with(test_config(), behaviour, FakeIngestor::succeeding())
    }

    pub fn with(config: RelayConfig, behaviour: Behaviour, ingestor: Arc<FakeIngestor>) -> Self {
        let (connector, broker) = FakeConnector::new(behaviour);
        let publisher = Publisher::new(connector, config.client_id_prefix.clone());
        let clock = Arc::new(ManualClock::new(NOW));

        let service = Arc::new(SubmissionService::new(
            Arc::new(config),
            publisher,
            ingestor.clone(),
            clock.clone(),
        ));

        Self {
            service,
            broker,
            ingestor,
            clock,
        }
    }

    pub fn router(&self) -> Router {
        build_router(AppState::new(self.service.clone()))
    }

    /// True when neither the image store nor the broker was contacted
    pub fn untouched(&self) -> bool {
        self.ingestor.calls() == 0 && self.broker.connects() == 0
    }
}

/// JPEG-looking bytes of the requested size
pub fn jpeg_bytes(size: usize) -> Bytes {
    let mut bytes = vec![0u8; size];
    if size >= 3 {
        bytes[..3].copy_from_slice(&[0xFF, 0xD8, 0xFF]);
    }
    Bytes::from(bytes)
}

pub const BOUNDARY: &str = "atr-test-boundary";

/// Builder for multipart/form-data request bodies
#[derive(Default)]
pub struct MultipartBody {
    bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, media_type: &str, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {media_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(data);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Body {
        self.bytes
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Body::from(self.bytes)
    }
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// Read a response body as JSON
pub async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}
