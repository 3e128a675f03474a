// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::AgentConfig;
use crate::info::{Languages, TraceWriterInfo, TraceWriterInfoArc, TraceWriterStats};
use crate::payload::Payload;
use crate::payload_buffer::PayloadBuffer;
use crate::retry::RetryStrategy;
use crate::sender::{AgentSender, NullSender, SenderEvent};
use crate::sender_monitor::SenderEventConsumer;
use crate::trace::{to_api_trace, Trace};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use bytes::Bytes;
use datadog_trace_protobuf::pb;
use ddcommon::header::{
    APPLICATION_PROTOBUF_STR, CONTENT_ENCODING_IDENTITY_STR, DATADOG_TRACE_LANGUAGES_STR,
};
use ddcommon::worker::Worker;
use dogstatsd_client::{Flusher, StatsClient};
use log::{debug, error, info};
use prost::Message;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

/// Capacity of the bounded trace ingest channel; producers block when the
/// writer cannot keep up.
pub const TRACE_CHANNEL_BUFFER_SIZE: usize = 1000;

/// TraceWriterConfig contains the configuration to customize the behaviour
/// of a TraceWriter.
#[derive(Clone)]
pub struct TraceWriterConfig {
    /// Hard cap on spans per outbound payload.
    pub max_spans_per_payload: usize,
    /// Timed flush interval.
    pub flush_period: Duration,
    /// Telemetry publication interval.
    pub update_info_period: Duration,
    /// Telemetry sink.
    pub stats_client: Arc<dyn StatsClient>,
}

impl Default for TraceWriterConfig {
    fn default() -> TraceWriterConfig {
        TraceWriterConfig {
            max_spans_per_payload: 1000,
            flush_period: Duration::from_secs(5),
            update_info_period: Duration::from_secs(60),
            stats_client: Arc::new(Flusher::default()),
        }
    }
}

/// TraceWriter ingests sampled traces and flushes them to the API.
///
/// The writer loop is the sole owner of the payload buffer; it multiplexes
/// the ingest channel, the flush and telemetry tickers and the shutdown
/// token, and suspends nowhere else.
pub struct TraceWriter {
    host_name: String,
    env: String,
    conf: TraceWriterConfig,
    in_traces: mpsc::Receiver<Trace>,
    out_payloads: mpsc::UnboundedSender<Payload>,
    buffer: PayloadBuffer,
    stats: Arc<TraceWriterStats>,
    info: TraceWriterInfoArc,
    languages: Arc<Languages>,
    shutdown: CancellationToken,
}

impl TraceWriter {
    pub fn new(
        agent_conf: &AgentConfig,
        conf: TraceWriterConfig,
        in_traces: mpsc::Receiver<Trace>,
        out_payloads: mpsc::UnboundedSender<Payload>,
        shutdown: CancellationToken,
    ) -> TraceWriter {
        let buffer = PayloadBuffer::new(conf.max_spans_per_payload);
        TraceWriter {
            host_name: agent_conf.host_name.clone(),
            env: agent_conf.default_env.clone(),
            conf,
            in_traces,
            out_payloads,
            buffer,
            stats: Arc::new(TraceWriterStats::default()),
            info: Arc::new(ArcSwap::from_pointee(TraceWriterInfo::default())),
            languages: Arc::new(Languages::default()),
            shutdown,
        }
    }

    /// The live counters shared with the sender-event consumer.
    pub fn stats(&self) -> Arc<TraceWriterStats> {
        self.stats.clone()
    }

    /// The registry holding the last published counter snapshot.
    pub fn info(&self) -> TraceWriterInfoArc {
        self.info.clone()
    }

    /// The tracer language registry reported on payload headers.
    pub fn languages(&self) -> Arc<Languages> {
        self.languages.clone()
    }

    fn handle_trace(&mut self, mut trace: Trace) {
        if trace.is_empty() {
            debug!("Ignoring 0-length trace");
            return;
        }

        loop {
            // If we overflow max spans per payload, split the trace
            // (necessarily the one that went over the limit, otherwise we'd
            // have split earlier)
            let overflow =
                (self.buffer.span_count() + trace.len()) as i64 - self.conf.max_spans_per_payload as i64;

            let split_trace = if overflow > 0 {
                debug!(
                    "Detected span overflow, splitting trace: max_spans_per_payload={}, len={}, overflow={}",
                    self.conf.max_spans_per_payload,
                    trace.len(),
                    overflow
                );
                Some(trace.split_off(trace.len() - overflow as usize))
            } else {
                None
            };

            self.buffer.push(to_api_trace(trace));
            debug!(
                "Added new trace to buffer: spans_in_buffer={}, traces={}",
                self.buffer.span_count(),
                self.buffer.trace_count()
            );

            if self.buffer.is_full() {
                debug!("Flushing because we reached max spans per payload");
                self.flush();
            }

            // a single trace may split multiple times over successive payloads
            match split_trace {
                Some(rest) => trace = rest,
                None => break,
            }
        }
    }

    fn flush(&mut self) {
        let trace_count = self.buffer.trace_count();
        if trace_count == 0 {
            return;
        }

        self.stats.add_traces(trace_count as u64);
        self.stats.add_spans(self.buffer.span_count() as u64);

        let trace_payload = pb::TracePayload {
            host_name: self.host_name.clone(),
            env: self.env.clone(),
            traces: self.buffer.take(),
        };

        let serialized = trace_payload.encode_to_vec();
        self.stats.add_bytes(serialized.len() as u64);

        let headers = HashMap::from([
            ("Content-Type", APPLICATION_PROTOBUF_STR.to_string()),
            ("Content-Encoding", CONTENT_ENCODING_IDENTITY_STR.to_string()),
            (DATADOG_TRACE_LANGUAGES_STR, self.languages.header_value()),
        ]);

        if self
            .out_payloads
            .send(Payload::new(Bytes::from(serialized), headers))
            .is_err()
        {
            error!("trace sender is gone, dropping payload");
        }
    }

    fn spawn_update_info(&self) {
        let stats = self.stats.clone();
        let stats_client = self.conf.stats_client.clone();
        let info = self.info.clone();
        tokio::spawn(async move {
            update_trace_writer_info(&stats, stats_client.as_ref(), &info);
        });
    }
}

#[async_trait]
impl Worker for TraceWriter {
    async fn run(&mut self) {
        let mut flush_ticker = interval_at(
            Instant::now() + self.conf.flush_period,
            self.conf.flush_period,
        );
        let mut info_ticker = interval_at(
            Instant::now() + self.conf.update_info_period,
            self.conf.update_info_period,
        );

        debug!("starting trace writer");

        loop {
            tokio::select! {
                trace = self.in_traces.recv() => match trace {
                    Some(trace) => self.handle_trace(trace),
                    None => {
                        info!("trace channel closed, flushing all remaining traces");
                        self.flush();
                        return;
                    }
                },
                _ = flush_ticker.tick() => {
                    debug!("Flushing current traces");
                    self.flush();
                }
                _ = info_ticker.tick() => {
                    debug!("Updating info");
                    self.spawn_update_info();
                }
                _ = self.shutdown.cancelled() => {
                    info!("exiting trace writer, flushing all remaining traces");
                    self.flush();
                    return;
                }
            }
        }
    }
}

/// Atomically swap every counter with zero, publish the snapshot as counts
/// through the stats client, and store it in the info registry for a health
/// endpoint to expose.
pub fn update_trace_writer_info(
    stats: &TraceWriterStats,
    stats_client: &dyn StatsClient,
    info: &ArcSwap<TraceWriterInfo>,
) {
    let snapshot = stats.reset();

    stats_client.count(
        "datadog.trace_agent.trace_writer.payloads",
        snapshot.payloads as i64,
        &[],
        1.0,
    );
    stats_client.count(
        "datadog.trace_agent.trace_writer.traces",
        snapshot.traces as i64,
        &[],
        1.0,
    );
    stats_client.count(
        "datadog.trace_agent.trace_writer.spans",
        snapshot.spans as i64,
        &[],
        1.0,
    );
    stats_client.count(
        "datadog.trace_agent.trace_writer.bytes",
        snapshot.bytes as i64,
        &[],
        1.0,
    );
    stats_client.count(
        "datadog.trace_agent.trace_writer.retries",
        snapshot.retries as i64,
        &[],
        1.0,
    );
    stats_client.count(
        "datadog.trace_agent.trace_writer.errors",
        snapshot.errors as i64,
        &[],
        1.0,
    );

    info.store(Arc::new(snapshot));
}

/// Handles to a running writer pipeline.
pub struct TraceWriterHandle {
    /// Bounded ingest channel; send sampled traces here.
    pub trace_tx: mpsc::Sender<Trace>,
    /// Cancel to shut the writer down after one final flush.
    pub shutdown: CancellationToken,
    /// Last published counter snapshot.
    pub info: TraceWriterInfoArc,
    /// Tracer language registry.
    pub languages: Arc<Languages>,
    /// Task handle of the writer loop.
    pub writer_handle: JoinHandle<()>,
    /// Task handle of the sender.
    pub sender_handle: JoinHandle<()>,
    /// Task handle of the sender-event consumer.
    pub monitor_handle: JoinHandle<()>,
}

/// Start the writer pipeline: the writer loop, the sender matching the
/// agent configuration, and the sender-event consumer.
pub fn start_trace_writer(agent_conf: &AgentConfig, conf: TraceWriterConfig) -> TraceWriterHandle {
    let (trace_tx, trace_rx) = mpsc::channel(TRACE_CHANNEL_BUFFER_SIZE);
    let (payload_tx, payload_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<SenderEvent>();
    let shutdown = CancellationToken::new();

    let stats_client = conf.stats_client.clone();
    let mut writer = TraceWriter::new(agent_conf, conf, trace_rx, payload_tx, shutdown.clone());
    let stats = writer.stats();
    let info = writer.info();
    let languages = writer.languages();

    let sender_handle = if agent_conf.api_enabled {
        let mut sender = AgentSender::new(
            agent_conf.trace_endpoint.clone(),
            payload_rx,
            event_tx,
            RetryStrategy::default(),
        );
        tokio::spawn(async move { sender.run().await })
    } else {
        info!("API interface is disabled, payloads will be dropped");
        let mut sender = NullSender::new(payload_rx);
        tokio::spawn(async move { sender.run().await })
    };

    let mut monitor = SenderEventConsumer::new(event_rx, stats, stats_client);
    let monitor_handle = tokio::spawn(async move { monitor.run().await });

    let writer_handle = tokio::spawn(async move { writer.run().await });

    TraceWriterHandle {
        trace_tx,
        shutdown,
        info,
        languages,
        writer_handle,
        sender_handle,
        monitor_handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_agent_config() -> AgentConfig {
        AgentConfig {
            host_name: "test-host".to_string(),
            default_env: "test".to_string(),
            api_enabled: true,
            trace_endpoint: Default::default(),
            services_endpoint: Default::default(),
            ignore_resources: Vec::new(),
            replace_rules: Vec::new(),
        }
    }

    fn test_trace(trace_id: u64, spans: usize) -> Trace {
        (0..spans)
            .map(|i| pb::Span {
                trace_id,
                span_id: i as u64 + 1,
                service: "svc".to_string(),
                name: "op".to_string(),
                resource: "res".to_string(),
                start: 1_700_000_000_000_000_000 + i as i64,
                duration: 1_000,
                ..Default::default()
            })
            .collect()
    }

    struct TestWriter {
        writer: TraceWriter,
        payload_rx: mpsc::UnboundedReceiver<Payload>,
    }

    fn test_writer(max_spans_per_payload: usize) -> TestWriter {
        let (_trace_tx, trace_rx) = mpsc::channel(10);
        let (payload_tx, payload_rx) = mpsc::unbounded_channel();
        let conf = TraceWriterConfig {
            max_spans_per_payload,
            ..Default::default()
        };
        let writer = TraceWriter::new(
            &test_agent_config(),
            conf,
            trace_rx,
            payload_tx,
            CancellationToken::new(),
        );
        TestWriter { writer, payload_rx }
    }

    fn decode_payloads(payload_rx: &mut mpsc::UnboundedReceiver<Payload>) -> Vec<pb::TracePayload> {
        let mut decoded = Vec::new();
        while let Ok(payload) = payload_rx.try_recv() {
            decoded.push(pb::TracePayload::decode(payload.bytes.as_ref()).unwrap());
        }
        decoded
    }

    #[test]
    fn test_handle_trace_buffers_until_cap() {
        let mut t = test_writer(100);
        for _ in 0..3 {
            t.writer.handle_trace(test_trace(1, 10));
        }

        assert_eq!(t.writer.buffer.span_count(), 30);
        assert!(decode_payloads(&mut t.payload_rx).is_empty());

        t.writer.flush();
        let payloads = decode_payloads(&mut t.payload_rx);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].host_name, "test-host");
        assert_eq!(payloads[0].env, "test");
        assert_eq!(payloads[0].traces.len(), 3);
    }

    #[test]
    fn test_cap_triggers_flush_without_tick() {
        let mut t = test_writer(50);
        for i in 0..5 {
            t.writer.handle_trace(test_trace(i + 1, 10));
        }

        let payloads = decode_payloads(&mut t.payload_rx);
        assert_eq!(payloads.len(), 1);
        let spans: usize = payloads[0].traces.iter().map(|t| t.spans.len()).sum();
        assert_eq!(spans, 50);
        assert!(t.writer.buffer.is_empty());
    }

    #[test]
    fn test_oversized_trace_splits_at_cap() {
        let mut t = test_writer(10);
        t.writer.handle_trace(test_trace(1, 25));

        // two full payloads flushed at the cap, the remainder at explicit flush
        t.writer.flush();
        let payloads = decode_payloads(&mut t.payload_rx);
        assert_eq!(payloads.len(), 3);

        let sizes: Vec<usize> = payloads
            .iter()
            .map(|p| p.traces.iter().map(|t| t.spans.len()).sum())
            .collect();
        assert_eq!(sizes, vec![10, 10, 5]);

        // concatenating the payloads yields the original span order
        let span_ids: Vec<u64> = payloads
            .iter()
            .flat_map(|p| &p.traces)
            .flat_map(|t| &t.spans)
            .map(|s| s.span_id)
            .collect();
        assert_eq!(span_ids, (1..=25).collect::<Vec<u64>>());
    }

    #[test]
    fn test_span_conservation_across_payloads() {
        let mut t = test_writer(7);
        let mut sent = 0;
        for i in 0..10 {
            let len = 1 + (i * 3) % 11;
            t.writer.handle_trace(test_trace(i as u64 + 1, len));
            sent += len;
            assert!(t.writer.buffer.span_count() <= 7);
        }
        t.writer.flush();

        let payloads = decode_payloads(&mut t.payload_rx);
        let flushed: usize = payloads
            .iter()
            .flat_map(|p| &p.traces)
            .map(|t| t.spans.len())
            .sum();
        assert_eq!(flushed, sent);
    }

    #[test]
    fn test_empty_trace_is_skipped() {
        let mut t = test_writer(10);
        t.writer.handle_trace(Vec::new());
        assert!(t.writer.buffer.is_empty());
    }

    #[test]
    fn test_flush_on_empty_buffer_is_noop() {
        let mut t = test_writer(10);
        t.writer.flush();
        assert!(decode_payloads(&mut t.payload_rx).is_empty());
        assert_eq!(t.writer.stats.snapshot(), TraceWriterInfo::default());
    }

    #[test]
    fn test_flush_sets_headers() {
        let mut t = test_writer(10);
        t.writer.languages.add("python");
        t.writer.languages.add("go");
        t.writer.handle_trace(test_trace(1, 3));
        t.writer.flush();

        let payload = t.payload_rx.try_recv().unwrap();
        assert_eq!(payload.headers["Content-Type"], "application/x-protobuf");
        assert_eq!(payload.headers["Content-Encoding"], "identity");
        assert_eq!(payload.headers[DATADOG_TRACE_LANGUAGES_STR], "go|python");
    }

    #[test]
    fn test_update_info_publishes_and_resets() {
        let t = test_writer(10);
        t.writer.stats.add_payloads(1);
        t.writer.stats.add_retries(2);
        t.writer.stats.add_errors(1);

        update_trace_writer_info(
            &t.writer.stats,
            &Flusher::default(),
            &t.writer.info,
        );

        let published = t.writer.info.load();
        assert_eq!(published.payloads, 1);
        assert_eq!(published.retries, 2);
        assert_eq!(published.errors, 1);
        assert_eq!(t.writer.stats.snapshot(), TraceWriterInfo::default());
    }
}
