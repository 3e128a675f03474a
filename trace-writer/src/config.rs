// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use ddcommon::Endpoint;
use std::borrow::Cow;
use std::env;

const TRACE_INTAKE_ROUTE: &str = "/api/v0.2/traces";
const SERVICES_INTAKE_ROUTE: &str = "/api/v0.2/services";

/// Agent-level configuration consumed by the writer pipeline.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// hostname stamped on every outbound trace payload
    pub host_name: String,
    /// default `env` stamped on every outbound trace payload
    pub default_env: String,
    /// whether payloads are sent to the API at all
    pub api_enabled: bool,
    /// trace intake endpoint, carrying the API key
    pub trace_endpoint: Endpoint,
    /// services metadata intake endpoint, carrying the API key
    pub services_endpoint: Endpoint,
    /// resource blacklist rules for the resource filter
    pub ignore_resources: Vec<String>,
    /// search/replace rules for the resource filter
    pub replace_rules: Vec<(String, String)>,
}

impl AgentConfig {
    /// Build a configuration from the environment.
    ///
    /// `DD_API_KEY` is required unless `DD_APM_ENABLED` is set to `false`;
    /// `DD_SITE`, `DD_HOSTNAME` and `DD_ENV` have defaults.
    pub fn from_env() -> anyhow::Result<AgentConfig> {
        let api_enabled = env::var("DD_APM_ENABLED")
            .map(|v| v != "false")
            .unwrap_or(true);

        let api_key = match env::var("DD_API_KEY") {
            Ok(key) => key,
            Err(_) if !api_enabled => String::new(),
            Err(_) => anyhow::bail!("DD_API_KEY environment variable is not set"),
        };

        let dd_site = env::var("DD_SITE").unwrap_or_else(|_| "datadoghq.com".to_string());

        let host_name = env::var("DD_HOSTNAME")
            .or_else(|_| env::var("HOSTNAME"))
            .unwrap_or_else(|_| "unknown-hostname".to_string());

        let default_env = env::var("DD_ENV").unwrap_or_else(|_| "none".to_string());

        let ignore_resources = env::var("DD_IGNORE_RESOURCES")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(AgentConfig {
            host_name,
            default_env,
            api_enabled,
            trace_endpoint: intake_endpoint(&dd_site, TRACE_INTAKE_ROUTE, &api_key)?,
            services_endpoint: intake_endpoint(&dd_site, SERVICES_INTAKE_ROUTE, &api_key)?,
            ignore_resources,
            replace_rules: Vec::new(),
        })
    }
}

fn intake_endpoint(site: &str, route: &str, api_key: &str) -> anyhow::Result<Endpoint> {
    let url = format!("https://trace.agent.{site}{route}").parse::<hyper::Uri>()?;
    Ok(Endpoint {
        url,
        api_key: (!api_key.is_empty()).then(|| Cow::Owned(api_key.to_string())),
        ..Default::default()
    })
}
