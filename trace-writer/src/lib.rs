// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The trace-writer pipeline of the agent: buffers sampled traces, splits
//! oversized ones, batches them into payloads of bounded span count, flushes
//! them to the backend through a retrying sender, and accounts for every
//! send outcome in self-telemetry counters.
//!
//! Four long-lived tasks cooperate:
//! - the writer main loop, sole owner of the payload buffer
//! - the sender, consuming payloads and emitting send events
//! - the sender-event consumer, folding events into counters and logs
//! - short-lived telemetry publishers spawned at every info tick

pub mod config;
pub mod info;
pub mod payload;
pub mod payload_buffer;
pub mod retry;
pub mod sender;
pub mod sender_monitor;
pub mod services;
pub mod trace;
pub mod trace_writer;

pub use config::AgentConfig;
pub use info::{Languages, TraceWriterInfo, TraceWriterInfoArc, TraceWriterStats};
pub use payload::Payload;
pub use payload_buffer::PayloadBuffer;
pub use retry::{RetryBackoffType, RetryStrategy};
pub use sender::{AgentSender, NullSender, SendError, SenderEvent};
pub use sender_monitor::SenderEventConsumer;
pub use services::{ServiceApp, ServiceWriter, ServicesMetadata};
pub use trace::Trace;
pub use trace_writer::{
    start_trace_writer, update_trace_writer_info, TraceWriter, TraceWriterConfig,
    TraceWriterHandle,
};
