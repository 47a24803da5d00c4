//! Broker publisher
//!
//! One publish attempt = connect → publish → broker ack → disconnect, all under a
//! single deadline. No retry.
//!
//! ```text
//! IDLE -> CONNECTING -> CONNECTED -> PUBLISHING -> ACKED
//! IDLE -> CONNECTING -> CONN_FAILED
//! CONNECTING/CONNECTED/PUBLISHING -> PUBLISH_FAILED | TIMED_OUT
//! ```
//!
//! The connect/publish/ack future races a timer (`tokio::time::timeout`); the first
//! to finish decides the outcome. The session handle lives outside the raced future,
//! so whichever side wins, an opened session is closed exactly once afterwards.

use async_trait::async_trait;
use atr_common::config::QualityOfService;
use atr_common::Envelope;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Transport-level failure reported by a connector or session
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Publish attempt failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PublishError {
    /// Transport could not connect, or the broker refused the connection
    #[error("Failed to connect to MQTT broker: {0}")]
    ConnectFailed(String),

    /// Connected, but the publish was not acknowledged
    #[error("Failed to publish to MQTT: {0}")]
    PublishFailed(String),

    /// Deadline expired before the broker acknowledged
    #[error("MQTT publish timed out after {} ms", .0.as_millis())]
    Timeout(Duration),
}

impl PublishError {
    pub fn code(&self) -> &'static str {
        match self {
            PublishError::ConnectFailed(_) => "CONNECT_FAILED",
            PublishError::PublishFailed(_) => "PUBLISH_FAILED",
            PublishError::Timeout(_) => "TIMEOUT",
        }
    }
}

/// Opens broker connections
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Open a clean-session connection as `client_id`.
    ///
    /// Returns once the broker has accepted the connection.
    async fn connect(&self, client_id: &str) -> Result<Box<dyn BrokerSession>, TransportError>;
}

/// One open broker connection
#[async_trait]
pub trait BrokerSession: Send {
    /// Publish `payload` and wait until the broker acknowledges it at `qos`
    async fn publish(
        &mut self,
        topic: &str,
        qos: QualityOfService,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Release the connection. `forced` skips the graceful disconnect handshake.
    async fn close(self: Box<Self>, forced: bool);
}

/// Successful, broker-acknowledged publish
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub topic: String,
    pub client_id: String,
    pub qos: QualityOfService,
    pub payload_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PublishState {
    Idle,
    Connecting,
    Connected,
    Publishing,
    Acked,
    ConnFailed,
    PublishFailed,
    TimedOut,
}

/// State and session of a single attempt
struct Attempt<'a> {
    client_id: &'a str,
    state: PublishState,
    session: Option<Box<dyn BrokerSession>>,
}

impl<'a> Attempt<'a> {
    fn new(client_id: &'a str) -> Self {
        Self {
            client_id,
            state: PublishState::Idle,
            session: None,
        }
    }

    fn transition(&mut self, next: PublishState) {
        debug!(client_id = %self.client_id, from = ?self.state, to = ?next, "Publish state");
        self.state = next;
    }

    /// Connect, publish, wait for ack. Raced against the deadline by the caller.
    async fn run(
        &mut self,
        connector: &dyn BrokerConnector,
        topic: &str,
        qos: QualityOfService,
        payload: Vec<u8>,
    ) -> Result<(), PublishError> {
        self.transition(PublishState::Connecting);
        let session = connector
            .connect(self.client_id)
            .await
            .map_err(|e| PublishError::ConnectFailed(e.0))?;

        self.transition(PublishState::Connected);
        self.transition(PublishState::Publishing);
        let session = self.session.insert(session);
        session
            .publish(topic, qos, payload)
            .await
            .map_err(|e| PublishError::PublishFailed(e.0))
    }

    /// Close the session if one was opened. Consumes the attempt, so at most once.
    async fn release(mut self) {
        if let Some(session) = self.session.take() {
            let forced = self.state == PublishState::TimedOut;
            debug!(client_id = %self.client_id, forced, "Releasing broker connection");
            session.close(forced).await;
        }
    }
}

/// Publishes envelopes with a fresh connection per attempt
#[derive(Clone)]
pub struct Publisher {
    connector: Arc<dyn BrokerConnector>,
    client_id_prefix: String,
}

impl Publisher {
    pub fn new(connector: Arc<dyn BrokerConnector>, client_id_prefix: impl Into<String>) -> Self {
        Self {
            connector,
            client_id_prefix: client_id_prefix.into(),
        }
    }

    /// Collision-resistant client identifier, unique per attempt
    fn new_client_id(&self) -> String {
        format!("{}_{}", self.client_id_prefix, Uuid::new_v4().simple())
    }

    /// Publish `envelope` to `topic` and wait for the broker acknowledgment.
    ///
    /// Success is reported only after the broker acknowledges at `qos`. The whole
    /// connect/publish/ack span is bounded by `deadline`.
    pub async fn publish(
        &self,
        topic: &str,
        envelope: &Envelope,
        qos: QualityOfService,
        deadline: Duration,
    ) -> Result<Ack, PublishError> {
        let payload = envelope
            .to_payload()
            .map_err(|e| PublishError::PublishFailed(format!("Envelope serialization failed: {}", e)))?;
        let payload_bytes = payload.len();

        let client_id = self.new_client_id();
        let mut attempt = Attempt::new(&client_id);

        let outcome = tokio::time::timeout(
            deadline,
            attempt.run(self.connector.as_ref(), topic, qos, payload),
        )
        .await;

        let result = match outcome {
            Ok(Ok(())) => {
                attempt.transition(PublishState::Acked);
                Ok(Ack {
                    topic: topic.to_string(),
                    client_id: client_id.clone(),
                    qos,
                    payload_bytes,
                })
            }
            Ok(Err(e)) => {
                attempt.transition(match e {
                    PublishError::ConnectFailed(_) => PublishState::ConnFailed,
                    _ => PublishState::PublishFailed,
                });
                Err(e)
            }
            Err(_elapsed) => {
                attempt.transition(PublishState::TimedOut);
                Err(PublishError::Timeout(deadline))
            }
        };

        attempt.release().await;

        match &result {
            Ok(ack) => info!(
                topic = %ack.topic,
                client_id = %ack.client_id,
                qos = %ack.qos,
                bytes = ack.payload_bytes,
                "Broker acknowledged publish"
            ),
            Err(e) => warn!(topic, client_id = %client_id, error = %e, "Publish attempt failed"),
        }

        result
    }
}
