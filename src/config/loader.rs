/*
 * Copyright 2026 Stubwire Team
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::config::types::{
    ActionSpec, Config, LoggingConfig, OperatorSpec, RequestSpec, ResponseSpec, RuleRecord,
    TelemetryConfig, ValueMatch,
};
use anyhow::Context;
use http::{HeaderName, Method};
use std::fs;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads a document from disk. `.json` files are parsed as JSON, anything
    /// else as YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let mut config = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_str(&content)?
        };

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        config.base_dir = Some(
            fs::canonicalize(dir)
                .with_context(|| format!("Failed to resolve config directory: {:?}", dir))?,
        );

        Ok(config)
    }

    pub fn from_str(content: &str) -> anyhow::Result<Config> {
        let document: serde_yaml::Value =
            serde_yaml::from_str(content).with_context(|| "Failed to parse YAML configuration")?;
        Self::from_document(document)
    }

    pub fn from_json_str(content: &str) -> anyhow::Result<Config> {
        let document: serde_yaml::Value =
            serde_json::from_str(content).with_context(|| "Failed to parse JSON configuration")?;
        Self::from_document(document)
    }

    /// A document is either a full configuration or a bare list of rules.
    fn from_document(document: serde_yaml::Value) -> anyhow::Result<Config> {
        let config = match document {
            serde_yaml::Value::Sequence(_) => Config {
                rules: serde_yaml::from_value(document)
                    .with_context(|| "Failed to parse rule list")?,
                ..Config::default()
            },
            serde_yaml::Value::Null => Config::default(),
            other => serde_yaml::from_value(other)
                .with_context(|| "Failed to parse configuration document")?,
        };

        Self::validate(&config)?;

        Ok(config)
    }

    fn validate(config: &Config) -> anyhow::Result<()> {
        if config.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }

        if config.server.workers == 0 {
            anyhow::bail!("Number of workers cannot be 0");
        }

        if config.server.max_request_size == 0 {
            anyhow::bail!("Max request size cannot be 0");
        }

        Self::validate_logging_config(&config.logging)?;

        if config.telemetry.sampling_rate < 0.0 || config.telemetry.sampling_rate > 1.0 {
            anyhow::bail!("Sampling rate must be between 0.0 and 1.0");
        }

        if config.telemetry.enabled {
            Self::validate_telemetry_config(&config.telemetry)?;
        }

        for name in config.response_headers.keys() {
            Self::validate_header_name(name)?;
        }

        for (index, record) in config.rules.iter().enumerate() {
            Self::validate_record(record).with_context(|| format!("Invalid rule #{}", index))?;
        }

        Ok(())
    }

    fn validate_logging_config(config: &LoggingConfig) -> anyhow::Result<()> {
        let level = config.level.to_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
            anyhow::bail!("Unknown log level '{}'", config.level);
        }

        let format = config.format.to_lowercase();
        if format != "plain" && format != "json" {
            anyhow::bail!(
                "Log format must be 'plain' or 'json', got '{}'",
                config.format
            );
        }

        Ok(())
    }

    fn validate_telemetry_config(config: &TelemetryConfig) -> anyhow::Result<()> {
        if config.endpoint.is_empty() {
            anyhow::bail!("Telemetry endpoint cannot be empty");
        }

        if let Ok(url) = reqwest::Url::parse(&config.endpoint) {
            let scheme = url.scheme();
            if scheme != "http" && scheme != "https" {
                anyhow::bail!("Telemetry endpoint must use http:// or https:// scheme");
            }

            if url.host().is_none() {
                anyhow::bail!("Telemetry endpoint must have a host");
            }
        } else {
            anyhow::bail!("Invalid telemetry endpoint URL format: {}", config.endpoint);
        }

        let protocol = config.protocol.to_lowercase();
        if protocol != "http" && protocol != "grpc" {
            anyhow::bail!(
                "Telemetry protocol must be 'http' or 'grpc', got '{}'",
                config.protocol
            );
        }

        if config.timeout_seconds == 0 {
            anyhow::bail!("Telemetry timeout must be greater than 0");
        }

        Ok(())
    }

    fn validate_record(record: &RuleRecord) -> anyhow::Result<()> {
        if record.is_group() {
            if record.request.is_some()
                || record.response.is_some()
                || record.redirect_to.is_some()
                || !record.on_complete.is_empty()
            {
                anyhow::bail!("A rule group cannot also declare request or response");
            }

            match (&record.include, &record.rules) {
                (Some(_), Some(_)) => anyhow::bail!("A rule group needs either include or rules, not both"),
                (None, None) => anyhow::bail!("A rule group needs include or rules"),
                (None, Some(rules)) => {
                    for (index, nested) in rules.iter().enumerate() {
                        Self::validate_record(nested)
                            .with_context(|| format!("Invalid nested rule #{}", index))?;
                    }
                }
                (Some(_), None) => {}
            }

            if let Some(context) = &record.context {
                if !context.starts_with('/') {
                    anyhow::bail!("Context '{}' must start with '/'", context);
                }
            }

            return Ok(());
        }

        if record.response.is_none() && record.redirect_to.is_none() {
            anyhow::bail!("A rule needs a response or redirect_to");
        }

        if let Some(request) = &record.request {
            Self::validate_request(request)?;
        }

        if let Some(response) = &record.response {
            Self::validate_response(response)?;
        }

        for action in &record.on_complete {
            Self::validate_action(action)?;
        }

        Ok(())
    }

    fn validate_request(request: &RequestSpec) -> anyhow::Result<()> {
        if let Some(method) = &request.method {
            Method::from_bytes(method.to_uppercase().as_bytes())
                .map_err(|_| anyhow::anyhow!("Invalid method '{}'", method))?;
        }

        if let Some(version) = &request.version {
            parse_version(version)?;
        }

        let body_sources = [
            request.text.is_some(),
            request.file.is_some(),
            request.path_resource.is_some(),
            request.json.is_some(),
            request.xml.is_some(),
            request.xml_struct.is_some(),
        ];
        if body_sources.iter().filter(|set| **set).count() > 1 {
            anyhow::bail!("A request can declare only one of text, file, path_resource, json, xml, xml_struct");
        }

        for name in request.headers.keys() {
            Self::validate_header_name(name)?;
        }

        let values = request
            .uri
            .iter()
            .chain(request.text.iter())
            .chain(request.client_address.iter())
            .chain(request.queries.values())
            .chain(request.headers.values())
            .chain(request.cookies.values())
            .chain(request.forms.values())
            .chain(request.json_paths.values());
        for value in values {
            if let ValueMatch::Operator(operator) = value {
                Self::validate_operator(operator)?;
            }
        }

        if let Some(any_of) = &request.any_of {
            for nested in any_of {
                Self::validate_request(nested)?;
            }
        }

        if let Some(not) = &request.not {
            Self::validate_request(not)?;
        }

        Ok(())
    }

    fn validate_operator(operator: &OperatorSpec) -> anyhow::Result<()> {
        let declared = [
            operator.pattern.is_some(),
            operator.starts_with.is_some(),
            operator.ends_with.is_some(),
            operator.contain.is_some(),
            operator.exist.is_some(),
            operator.path.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();

        if declared != 1 {
            anyhow::bail!(
                "Exactly one of match, starts_with, ends_with, contain, exist, path is required"
            );
        }

        if let Some(pattern) = &operator.pattern {
            regex::Regex::new(pattern)
                .with_context(|| format!("Invalid pattern '{}'", pattern))?;
        }

        Ok(())
    }

    fn validate_response(response: &ResponseSpec) -> anyhow::Result<()> {
        if let Some(status) = response.status {
            if !(100..=599).contains(&status) {
                anyhow::bail!("Invalid status code: {}", status);
            }
        }

        if let Some(version) = &response.version {
            parse_version(version)?;
        }

        if let Some(latency) = &response.latency {
            latency
                .parse_range()
                .with_context(|| format!("Invalid latency '{}'", latency.0))?;
        }

        for name in response.headers.keys() {
            Self::validate_header_name(name)?;
        }

        if let Some(content_type) = &response.content_type {
            content_type
                .parse::<mime::Mime>()
                .map_err(|_| anyhow::anyhow!("Invalid content type '{}'", content_type))?;
        }

        let content_sources = [
            response.text.is_some(),
            response.file.is_some(),
            response.path_resource.is_some(),
            response.json.is_some(),
            response.template.is_some(),
            response.fallback.is_some(),
            response.proxy.is_some(),
        ];
        if content_sources.iter().filter(|set| **set).count() > 1 {
            anyhow::bail!(
                "A response can declare only one of text, file, path_resource, json, template, fallback, proxy"
            );
        }

        if let Some(fallback) = &response.fallback {
            if fallback.is_empty() {
                anyhow::bail!("Fallback must list at least one source");
            }
        }

        if let Some(proxy) = &response.proxy {
            for name in proxy.headers.keys() {
                Self::validate_header_name(name)?;
            }
        }

        for (key, steps) in [("seq", &response.seq), ("cycle", &response.cycle)] {
            if let Some(steps) = steps {
                if steps.is_empty() {
                    anyhow::bail!("{} must contain at least one response", key);
                }
                for step in steps {
                    Self::validate_response(step)?;
                }
            }
        }

        if response.seq.is_some() && response.cycle.is_some() {
            anyhow::bail!("A response can declare seq or cycle, not both");
        }

        Ok(())
    }

    fn validate_action(action: &ActionSpec) -> anyhow::Result<()> {
        let target = match (&action.get, &action.post) {
            (Some(target), None) | (None, Some(target)) => target,
            _ => anyhow::bail!("A completion action needs exactly one of get or post"),
        };

        if target.url.is_empty() {
            anyhow::bail!("Completion action url cannot be empty");
        }

        if target.content.is_some() && target.json.is_some() {
            anyhow::bail!("A completion action can declare content or json, not both");
        }

        for name in target.headers.keys() {
            Self::validate_header_name(name)?;
        }

        Ok(())
    }

    fn validate_header_name(name: &str) -> anyhow::Result<()> {
        HeaderName::from_bytes(name.as_bytes())
            .map(|_| ())
            .map_err(|_| anyhow::anyhow!("Invalid header name '{}'", name))
    }
}

pub(crate) fn parse_version(version: &str) -> anyhow::Result<http::Version> {
    match version.to_uppercase().as_str() {
        "HTTP/0.9" => Ok(http::Version::HTTP_09),
        "HTTP/1.0" => Ok(http::Version::HTTP_10),
        "HTTP/1.1" => Ok(http::Version::HTTP_11),
        "HTTP/2" | "HTTP/2.0" => Ok(http::Version::HTTP_2),
        "HTTP/3" | "HTTP/3.0" => Ok(http::Version::HTTP_3),
        _ => anyhow::bail!("Unknown HTTP version '{}'", version),
    }
}
