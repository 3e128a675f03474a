// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Services metadata received from tracers, flushed to the services
//! endpoint as JSON.

use async_trait::async_trait;
use ddcommon::header::APPLICATION_JSON_STR;
use ddcommon::worker::Worker;
use ddcommon::{Endpoint, HttpClient};
use hyper::Method;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;

const USER_AGENT: &str = concat!("datadog-trace-agent/", env!("CARGO_PKG_VERSION"));

/// Application metadata attached to one service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceApp {
    pub app: String,
    pub app_type: String,
}

/// The service metadata map as flushed to the backend:
/// `{ service: { "app": ..., "app_type": ... } }`.
pub type ServicesMetadata = HashMap<String, ServiceApp>;

/// Accumulates service metadata updates and flushes the merged map to the
/// services endpoint, skipping flushes while nothing changed.
pub struct ServiceWriter {
    in_services: mpsc::Receiver<ServicesMetadata>,
    endpoint: Endpoint,
    client: HttpClient,
    services: ServicesMetadata,
    version: u64,
    flushed_version: u64,
}

impl ServiceWriter {
    pub fn new(endpoint: Endpoint, in_services: mpsc::Receiver<ServicesMetadata>) -> ServiceWriter {
        ServiceWriter {
            in_services,
            endpoint,
            client: hyper::Client::builder().build_http(),
            services: ServicesMetadata::new(),
            version: 0,
            flushed_version: 0,
        }
    }

    fn update(&mut self, update: ServicesMetadata) {
        for (service, app) in update {
            if self.services.get(&service) != Some(&app) {
                self.services.insert(service, app);
                self.version += 1;
            }
        }
    }

    async fn flush_services(&mut self) {
        if self.flushed_version == self.version {
            return;
        }

        let body = match serde_json::to_vec(&self.services) {
            Ok(body) => body,
            Err(e) => {
                error!("could not serialize services metadata: {e}");
                return;
            }
        };

        let request = self
            .endpoint
            .to_request_builder(USER_AGENT)
            .and_then(|builder| {
                builder
                    .method(Method::POST)
                    .header("Content-Type", APPLICATION_JSON_STR)
                    .body(hyper::Body::from(body))
                    .map_err(anyhow::Error::from)
            });

        let request = match request {
            Ok(request) => request,
            Err(e) => {
                error!("could not build services request: {e}");
                return;
            }
        };

        match self.client.request(request).await {
            Ok(response) if response.status().is_success() => {
                info!("flushed {} services to the API", self.services.len());
                self.flushed_version = self.version;
            }
            Ok(response) => {
                error!("could not flush services: http status {}", response.status());
            }
            Err(e) => {
                error!("could not flush services: {e}");
            }
        }
    }
}

#[async_trait]
impl Worker for ServiceWriter {
    async fn run(&mut self) {
        while let Some(update) = self.in_services.recv().await {
            self.update(update);
            self.flush_services().await;
        }
    }
}
