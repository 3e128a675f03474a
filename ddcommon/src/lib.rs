// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Cow;

pub mod tag;
pub mod worker;

pub mod header {
    #![allow(clippy::declare_interior_mutable_const)]
    use hyper::{header::HeaderName, http::HeaderValue};

    // These strings are defined separately to be used in context where &str are used to represent
    // headers (e.g. Payload) while keeping a single source of truth.
    pub const APPLICATION_PROTOBUF_STR: &str = "application/x-protobuf";
    pub const APPLICATION_JSON_STR: &str = "application/json";
    pub const CONTENT_ENCODING_IDENTITY_STR: &str = "identity";
    pub const DATADOG_TRACE_LANGUAGES_STR: &str = "x-datadog-trace-languages";

    pub const DATADOG_API_KEY: HeaderName = HeaderName::from_static("dd-api-key");
    pub const DATADOG_TRACE_LANGUAGES: HeaderName =
        HeaderName::from_static(DATADOG_TRACE_LANGUAGES_STR);
    pub const APPLICATION_JSON: HeaderValue = HeaderValue::from_static(APPLICATION_JSON_STR);
    pub const APPLICATION_PROTOBUF: HeaderValue =
        HeaderValue::from_static(APPLICATION_PROTOBUF_STR);
}

pub type HttpClient = hyper::Client<hyper::client::HttpConnector, hyper::Body>;
pub type HttpResponse = hyper::Response<hyper::Body>;
pub type HttpRequestBuilder = hyper::http::request::Builder;

/// A backend endpoint: the URL payloads are sent to plus the credentials and
/// timeout applied to every request against it.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Endpoint {
    pub url: hyper::Uri,
    pub api_key: Option<Cow<'static, str>>,
    pub timeout_ms: u64,
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint {
            url: hyper::Uri::default(),
            api_key: None,
            timeout_ms: Self::DEFAULT_TIMEOUT,
        }
    }
}

impl Endpoint {
    /// Default value for the timeout field in milliseconds.
    pub const DEFAULT_TIMEOUT: u64 = 10_000;

    /// Return a request builder with the following headers:
    /// - User agent
    /// - Api key
    pub fn to_request_builder(&self, user_agent: &str) -> anyhow::Result<HttpRequestBuilder> {
        let mut builder = hyper::Request::builder()
            .uri(self.url.clone())
            .header(hyper::header::USER_AGENT, user_agent);

        if let Some(api_key) = &self.api_key {
            builder = builder.header(header::DATADOG_API_KEY, sanitize_header_value(api_key));
        }

        Ok(builder)
    }

    /// Build an endpoint from a URL, with no API key and the default timeout.
    pub fn from_url(url: hyper::Uri) -> Endpoint {
        Endpoint {
            url,
            ..Default::default()
        }
    }
}

// Header values may not contain control characters; an api key read from the
// environment can carry a trailing newline.
fn sanitize_header_value(value: &str) -> String {
    value.chars().filter(|c| !c.is_control()).collect()
}
