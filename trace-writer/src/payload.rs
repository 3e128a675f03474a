// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use std::collections::HashMap;

/// One serialized batch of traces, ready to be POSTed by the sender along
/// with its HTTP headers.
#[derive(Clone, Debug)]
pub struct Payload {
    pub bytes: Bytes,
    pub headers: HashMap<&'static str, String>,
}

impl Payload {
    pub fn new(bytes: Bytes, headers: HashMap<&'static str, String>) -> Payload {
        Payload { bytes, headers }
    }
}
