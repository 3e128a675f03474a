// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::Filter;
use datadog_trace_protobuf::pb;
use log::error;
use regex::Regex;

const HTTP_URL_META_KEY: &str = "http.url";

/// A resource-based filter: spans whose resource matches any of the ignore
/// rules are dropped, and the search/replace rules are applied to the
/// `http.url` meta tag.
pub struct ResourceFilter {
    ignore: Vec<Regex>,
    search_replace: Vec<(Regex, String)>,
}

impl ResourceFilter {
    /// Compile a filter from the configured rule sets. Invalid expressions
    /// are logged and skipped so one bad rule cannot take the agent down.
    pub fn new(ignore_resources: &[String], replace_rules: &[(String, String)]) -> ResourceFilter {
        ResourceFilter {
            ignore: compile_rules(ignore_resources),
            search_replace: compile_search_replace(replace_rules),
        }
    }
}

impl Filter for ResourceFilter {
    /// Returns true if the span's resource doesn't match any of the filter's rules.
    fn keep(&self, span: &pb::Span) -> bool {
        !self.ignore.iter().any(|rule| rule.is_match(&span.resource))
    }

    fn apply_regex(&self, trace: &mut [pb::Span]) {
        if self.search_replace.is_empty() {
            return;
        }
        for span in trace {
            let Some(url) = span.meta.get(HTTP_URL_META_KEY) else {
                continue;
            };
            let mut url = url.clone();
            for (search, replace) in &self.search_replace {
                if search.is_match(&url) {
                    url = search.replace_all(&url, replace.as_str()).into_owned();
                }
            }
            span.meta.insert(HTTP_URL_META_KEY.to_string(), url);
        }
    }
}

fn compile_rules(entries: &[String]) -> Vec<Regex> {
    let mut rules = Vec::with_capacity(entries.len());
    for entry in entries {
        match Regex::new(entry) {
            Ok(rule) => rules.push(rule),
            Err(_) => error!("invalid resource filter: {entry:?}"),
        }
    }
    rules
}

fn compile_search_replace(entries: &[(String, String)]) -> Vec<(Regex, String)> {
    let mut rules = Vec::with_capacity(entries.len());
    for (search, replace) in entries {
        match Regex::new(search) {
            Ok(rule) => rules.push((rule, replace.clone())),
            Err(_) => error!("unable to compile search/replace regex: {search:?}"),
        }
    }
    rules
}
