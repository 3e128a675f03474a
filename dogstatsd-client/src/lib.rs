// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A dogstatsd client used for the agent's self-telemetry.
//!
//! [`StatsClient`] is the interface the rest of the agent depends on; the
//! default [`Flusher`] implementation ships metrics over UDP with cadence,
//! and stays disabled (dropping everything) until an endpoint is set.

use cadence::prelude::*;
use cadence::{Metric, MetricBuilder, QueuingMetricSink, StatsdClient, UdpMetricSink};
use ddcommon::tag::Tag;
use ddcommon::Endpoint;
use log::{debug, error};
use std::net::UdpSocket;

// Queue with a maximum capacity of 32K elements
const QUEUE_SIZE: usize = 32 * 1024;

/// The statsd surface the agent publishes self-telemetry through.
pub trait StatsClient: Send + Sync {
    /// Publish a count metric.
    fn count(&self, name: &str, value: i64, tags: &[Tag], rate: f64);

    /// Publish a gauge metric.
    fn gauge(&self, name: &str, value: f64, tags: &[Tag], rate: f64);
}

/// A dogstatsd client that flushes stats to a given endpoint.
/// The default value has no address and is thus disabled, use `new_flusher`
/// or `set_endpoint` to configure an endpoint.
#[derive(Default)]
pub struct Flusher {
    client: Option<StatsdClient>,
}

pub fn new_flusher(endpoint: &Endpoint) -> anyhow::Result<Flusher> {
    let mut flusher = Flusher::default();
    flusher.set_endpoint(endpoint)?;
    Ok(flusher)
}

impl Flusher {
    /// Set the destination for dogstatsd metrics. Returns an error if the
    /// provided endpoint is invalid.
    pub fn set_endpoint(&mut self, endpoint: &Endpoint) -> anyhow::Result<()> {
        debug!("Updating dogstatsd endpoint to {}", endpoint.url);
        self.client = Some(create_client(endpoint)?);
        Ok(())
    }

    fn send<'m, T>(&self, builder: MetricBuilder<'m, '_, T>, tags: &'m [Tag])
    where
        T: Metric + From<String>,
    {
        let mut builder = builder;
        for tag in tags {
            builder = builder.with_tag_value(tag.as_ref());
        }
        if let Err(err) = builder.try_send() {
            error!("Error while sending metric: {err}");
        }
    }
}

impl StatsClient for Flusher {
    fn count(&self, name: &str, value: i64, tags: &[Tag], rate: f64) {
        let Some(client) = &self.client else { return };
        if !sampled(rate) {
            return;
        }
        self.send(client.count_with_tags(name, value), tags);
    }

    fn gauge(&self, name: &str, value: f64, tags: &[Tag], rate: f64) {
        let Some(client) = &self.client else { return };
        if !sampled(rate) {
            return;
        }
        self.send(client.gauge_with_tags(name, value), tags);
    }
}

fn sampled(rate: f64) -> bool {
    rate >= 1.0 || rand::random::<f64>() < rate
}

fn create_client(endpoint: &Endpoint) -> anyhow::Result<StatsdClient> {
    let host = endpoint
        .url
        .authority()
        .ok_or_else(|| anyhow::anyhow!("dogstatsd endpoint has no host: {}", endpoint.url))?
        .to_string();

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_nonblocking(true)?;
    let sink = QueuingMetricSink::with_capacity(UdpMetricSink::from(host, socket)?, QUEUE_SIZE);

    Ok(StatsdClient::from_sink("", sink))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_flusher_drops_metrics() {
        let flusher = Flusher::default();
        // neither call may panic or block without an endpoint
        flusher.count("datadog.trace_agent.test", 1, &[], 1.0);
        flusher.gauge("datadog.trace_agent.test", 1.0, &[], 1.0);
    }

    #[test]
    fn test_flusher_with_endpoint() {
        let endpoint = Endpoint::from_url("udp://127.0.0.1:8125".parse().unwrap());
        let flusher = new_flusher(&endpoint).unwrap();

        let tags = [Tag::new("language", "rust").unwrap()];
        flusher.count("datadog.trace_agent.test", 1, &tags, 1.0);
        flusher.gauge("datadog.trace_agent.test", 0.5, &tags, 1.0);
    }

    #[test]
    fn test_endpoint_without_host() {
        let mut flusher = Flusher::default();
        assert!(flusher.set_endpoint(&Endpoint::default()).is_err());
    }

    #[test]
    fn test_sampling() {
        assert!(sampled(1.0));
        assert!(!sampled(0.0));
    }
}
