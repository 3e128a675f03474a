// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The payload sender: consumes [`Payload`] values from the writer and
//! reports every outcome on a one-way event channel, so send latency never
//! backpressures ingestion.

use crate::payload::Payload;
use crate::retry::RetryStrategy;
use ddcommon::worker::Worker;
use ddcommon::{Endpoint, HttpClient};
use async_trait::async_trait;
use hyper::Method;
use log::debug;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const USER_AGENT: &str = concat!("datadog-trace-agent/", env!("CARGO_PKG_VERSION"));

/// Why a send attempt failed.
#[derive(Debug)]
pub enum SendError {
    /// The request received an error HTTP code.
    Http(hyper::StatusCode),
    /// The request timed out, either on the socket or against the endpoint
    /// deadline.
    Timeout,
    /// Treats errors coming from networking.
    Network(hyper::Error),
    /// Treats errors coming from building the request.
    Build,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::Http(status) => write!(f, "Http error code {status} received"),
            SendError::Timeout => write!(f, "Request timed out"),
            SendError::Network(error) => write!(f, "Network error: {error}"),
            SendError::Build => write!(f, "Failed to build request due to invalid property"),
        }
    }
}

impl std::error::Error for SendError {}

/// Events emitted by the sender, one terminal event per payload plus one
/// retry event per failed non-terminal attempt.
#[derive(Debug)]
pub enum SenderEvent {
    /// The payload was flushed to the API.
    Success { send_time: Duration, bytes: usize },
    /// The payload was dropped after its last attempt failed.
    Failure {
        send_time: Duration,
        bytes: usize,
        error: SendError,
    },
    /// An attempt failed and the payload will be retried after the delay.
    Retry {
        retry_num: u32,
        delay: Duration,
        error: SendError,
    },
}

/// Sends payloads to the trace intake endpoint, retrying per the configured
/// [`RetryStrategy`]. Exits when the writer closes the payload channel.
pub struct AgentSender {
    endpoint: Endpoint,
    client: HttpClient,
    in_payloads: mpsc::UnboundedReceiver<Payload>,
    events: mpsc::UnboundedSender<SenderEvent>,
    retry_strategy: RetryStrategy,
}

impl AgentSender {
    pub fn new(
        endpoint: Endpoint,
        in_payloads: mpsc::UnboundedReceiver<Payload>,
        events: mpsc::UnboundedSender<SenderEvent>,
        retry_strategy: RetryStrategy,
    ) -> AgentSender {
        AgentSender {
            endpoint,
            client: hyper::Client::builder().build_http(),
            in_payloads,
            events,
            retry_strategy,
        }
    }

    async fn send_payload(&self, payload: Payload) {
        let start = Instant::now();
        let bytes = payload.bytes.len();

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(&payload).await {
                Ok(()) => {
                    let _ = self.events.send(SenderEvent::Success {
                        send_time: start.elapsed(),
                        bytes,
                    });
                    return;
                }
                Err(error) if attempt < self.retry_strategy.max_retries() => {
                    let delay = self.retry_strategy.delay_for(attempt);
                    let _ = self.events.send(SenderEvent::Retry {
                        retry_num: attempt,
                        delay,
                        error,
                    });
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    let _ = self.events.send(SenderEvent::Failure {
                        send_time: start.elapsed(),
                        bytes,
                        error,
                    });
                    return;
                }
            }
        }
    }

    async fn attempt(&self, payload: &Payload) -> Result<(), SendError> {
        let mut builder = self
            .endpoint
            .to_request_builder(USER_AGENT)
            .map_err(|_| SendError::Build)?
            .method(Method::POST);
        for (key, value) in &payload.headers {
            builder = builder.header(*key, value.clone());
        }
        let request = builder
            .body(hyper::Body::from(payload.bytes.clone()))
            .map_err(|_| SendError::Build)?;

        let timeout = Duration::from_millis(self.endpoint.timeout_ms);
        match tokio::time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_client_error() || status.is_server_error() {
                    Err(SendError::Http(status))
                } else {
                    Ok(())
                }
            }
            Ok(Err(e)) if e.is_timeout() => Err(SendError::Timeout),
            Ok(Err(e)) => Err(SendError::Network(e)),
            Err(_) => Err(SendError::Timeout),
        }
    }
}

#[async_trait]
impl Worker for AgentSender {
    async fn run(&mut self) {
        while let Some(payload) = self.in_payloads.recv().await {
            self.send_payload(payload).await;
        }
    }
}

/// Stands in for the sender when the API is disabled: payloads go to the
/// void, at debug level.
pub struct NullSender {
    in_payloads: mpsc::UnboundedReceiver<Payload>,
}

impl NullSender {
    pub fn new(in_payloads: mpsc::UnboundedReceiver<Payload>) -> NullSender {
        NullSender { in_payloads }
    }
}

#[async_trait]
impl Worker for NullSender {
    async fn run(&mut self) {
        while let Some(payload) = self.in_payloads.recv().await {
            debug!(
                "null sender is dropping a payload of {} bytes",
                payload.bytes.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryBackoffType;
    use bytes::Bytes;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use std::collections::HashMap;

    fn test_payload() -> Payload {
        Payload::new(
            Bytes::from_static(&[0, 1, 2, 3]),
            HashMap::from([("Content-Type", "application/x-protobuf".to_string())]),
        )
    }

    async fn run_sender_once(server: &MockServer, strategy: RetryStrategy) -> Vec<SenderEvent> {
        let (payload_tx, payload_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let endpoint = Endpoint {
            url: server.url("/api/v0.2/traces").parse().unwrap(),
            api_key: Some("test-key".into()),
            ..Default::default()
        };
        let mut sender = AgentSender::new(endpoint, payload_rx, event_tx, strategy);

        payload_tx.send(test_payload()).unwrap();
        drop(payload_tx);
        sender.run().await;
        // close the event channel so collection below terminates
        drop(sender);

        let mut events = Vec::new();
        while let Some(event) = event_rx.recv().await {
            events.push(event);
        }
        events
    }

    #[cfg_attr(miri, ignore)]
    #[tokio::test]
    async fn test_send_success() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v0.2/traces")
                    .header("Content-Type", "application/x-protobuf")
                    .header("DD-Api-Key", "test-key");
                then.status(200);
            })
            .await;

        let events = run_sender_once(&server, RetryStrategy::default()).await;

        mock.assert_hits_async(1).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SenderEvent::Success { bytes: 4, .. }));
    }

    #[cfg_attr(miri, ignore)]
    #[tokio::test]
    async fn test_send_retries_then_gives_up() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v0.2/traces");
                then.status(503);
            })
            .await;

        let strategy = RetryStrategy::new(3, 1, RetryBackoffType::Constant, None);
        let events = run_sender_once(&server, strategy).await;

        mock.assert_hits_async(3).await;
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            SenderEvent::Retry {
                retry_num: 1,
                error: SendError::Http(status),
                ..
            } if *status == hyper::StatusCode::SERVICE_UNAVAILABLE
        ));
        assert!(matches!(events[1], SenderEvent::Retry { retry_num: 2, .. }));
        assert!(matches!(
            events[2],
            SenderEvent::Failure {
                bytes: 4,
                error: SendError::Http(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_null_sender_drains() {
        let (payload_tx, payload_rx) = mpsc::unbounded_channel();
        let mut sender = NullSender::new(payload_rx);

        payload_tx.send(test_payload()).unwrap();
        drop(payload_tx);
        // returns once the channel is drained and closed
        sender.run().await;
    }
}
