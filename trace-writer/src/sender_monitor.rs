// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::info::TraceWriterStats;
use crate::sender::SenderEvent;
use async_trait::async_trait;
use ddcommon::worker::Worker;
use dogstatsd_client::StatsClient;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Folds sender events into the writer counters and logs, on its own task
/// so that slow logging cannot backpressure the sender. Exits when the
/// sender closes the event channel.
pub struct SenderEventConsumer {
    events: mpsc::UnboundedReceiver<SenderEvent>,
    stats: Arc<TraceWriterStats>,
    stats_client: Arc<dyn StatsClient>,
}

impl SenderEventConsumer {
    pub fn new(
        events: mpsc::UnboundedReceiver<SenderEvent>,
        stats: Arc<TraceWriterStats>,
        stats_client: Arc<dyn StatsClient>,
    ) -> SenderEventConsumer {
        SenderEventConsumer {
            events,
            stats,
            stats_client,
        }
    }
}

#[async_trait]
impl Worker for SenderEventConsumer {
    async fn run(&mut self) {
        while let Some(event) = self.events.recv().await {
            match event {
                SenderEvent::Success { send_time, bytes } => {
                    info!("flushed trace payload to the API, time:{send_time:?}, size:{bytes} bytes");
                    self.stats_client.gauge(
                        "datadog.trace_agent.trace_writer.flush_duration",
                        send_time.as_secs_f64(),
                        &[],
                        1.0,
                    );
                    self.stats.add_payloads(1);
                }
                SenderEvent::Failure {
                    send_time,
                    bytes,
                    error,
                } => {
                    error!(
                        "failed to flush trace payload, time:{send_time:?}, size:{bytes} bytes, error: {error}"
                    );
                    self.stats.add_errors(1);
                }
                SenderEvent::Retry {
                    retry_num,
                    delay,
                    error,
                } => {
                    warn!(
                        "retrying flush trace payload, retry_num:{retry_num}, delay:{delay:?}, error: {error}"
                    );
                    self.stats.add_retries(1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::SendError;
    use dogstatsd_client::Flusher;
    use std::time::Duration;

    #[tokio::test]
    async fn test_events_update_counters() {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(TraceWriterStats::default());
        let mut consumer =
            SenderEventConsumer::new(event_rx, stats.clone(), Arc::new(Flusher::default()));

        event_tx
            .send(SenderEvent::Success {
                send_time: Duration::from_millis(5),
                bytes: 128,
            })
            .unwrap();
        for retry_num in [1, 2] {
            event_tx
                .send(SenderEvent::Retry {
                    retry_num,
                    delay: Duration::from_millis(10),
                    error: SendError::Timeout,
                })
                .unwrap();
        }
        event_tx
            .send(SenderEvent::Failure {
                send_time: Duration::from_millis(20),
                bytes: 128,
                error: SendError::Build,
            })
            .unwrap();
        drop(event_tx);

        consumer.run().await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.payloads, 1);
        assert_eq!(snapshot.retries, 2);
        assert_eq!(snapshot.errors, 1);
    }
}
