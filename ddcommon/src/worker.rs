// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

/// Trait representing a generic worker.
///
/// The worker runs an async looping function reading from its event sources
/// until they are closed or the loop is cancelled.
///
/// This trait is dyn-compatible thanks to the `async_trait` macro, which
/// allows it to be used as `Box<dyn Worker>`.
#[async_trait]
pub trait Worker {
    /// Main worker function
    async fn run(&mut self);
}

// Blanket implementation for boxed trait objects
#[async_trait]
impl Worker for Box<dyn Worker + Send + Sync> {
    async fn run(&mut self) {
        (**self).run().await
    }
}
