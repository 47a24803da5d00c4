//! MQTT 3.1.1 broker transport (rumqttc)
//!
//! Each `connect` builds its own client + event loop. Dropping the event loop
//! closes the socket, so an abandoned connect (deadline expiry) leaks nothing.

use async_trait::async_trait;
use atr_common::config::{BrokerEndpoint, QualityOfService};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tracing::{debug, trace};

use super::publisher::{BrokerConnector, BrokerSession, TransportError};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
/// Bound on the graceful DISCONNECT handshake after a finished attempt
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);
/// Requests queued between client and event loop; one publish + one disconnect
const REQUEST_CAPACITY: usize = 4;
/// Largest packet MQTT 3.1.1 can frame (remaining length limit). Normalized envelopes
/// outgrow the HTTP body they came from, so the only cap left is the broker's own.
const MAX_PACKET_SIZE: usize = 268_435_455;

/// Connector for a fixed broker endpoint
#[derive(Debug, Clone)]
pub struct MqttConnector {
    endpoint: BrokerEndpoint,
}

impl MqttConnector {
    pub fn new(endpoint: BrokerEndpoint) -> Self {
        Self { endpoint }
    }

    fn options(&self, client_id: &str) -> MqttOptions {
        let mut options = MqttOptions::new(client_id, self.endpoint.host.clone(), self.endpoint.port);
        options
            .set_clean_session(true)
            .set_keep_alive(KEEP_ALIVE)
            .set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
        options
    }
}

#[async_trait]
impl BrokerConnector for MqttConnector {
    async fn connect(&self, client_id: &str) -> Result<Box<dyn BrokerSession>, TransportError> {
        debug!(endpoint = %self.endpoint, client_id, "Connecting to broker");
        let (client, mut eventloop) = AsyncClient::new(self.options(client_id), REQUEST_CAPACITY);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        break;
                    }
                    return Err(TransportError(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )));
                }
                Ok(event) => trace!(?event, "Event before CONNACK"),
                Err(e) => return Err(TransportError(e.to_string())),
            }
        }

        debug!(endpoint = %self.endpoint, client_id, "Broker accepted connection");
        Ok(Box::new(MqttSession { client, eventloop }))
    }
}

struct MqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
}

fn to_rumqttc(qos: QualityOfService) -> QoS {
    match qos {
        QualityOfService::AtLeastOnce => QoS::AtLeastOnce,
        QualityOfService::ExactlyOnce => QoS::ExactlyOnce,
    }
}

#[async_trait]
impl BrokerSession for MqttSession {
    async fn publish(
        &mut self,
        topic: &str,
        qos: QualityOfService,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.client
            .publish(topic, to_rumqttc(qos), false, payload)
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        // Single publish per session, so the first matching ack is ours
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::PubAck(_))) if qos == QualityOfService::AtLeastOnce => {
                    return Ok(())
                }
                Ok(Event::Incoming(Packet::PubComp(_))) if qos == QualityOfService::ExactlyOnce => {
                    return Ok(())
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    return Err(TransportError(
                        "broker closed the connection before acknowledging".to_string(),
                    ))
                }
                Ok(event) => trace!(?event, "Event while awaiting ack"),
                Err(e) => return Err(TransportError(e.to_string())),
            }
        }
    }

    async fn close(mut self: Box<Self>, forced: bool) {
        if forced || self.client.try_disconnect().is_err() {
            return;
        }

        let flush = async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(DISCONNECT_GRACE, flush).await.is_err() {
            debug!("Graceful disconnect did not complete; dropping connection");
        }
    }
}
