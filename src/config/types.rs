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

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Directory relative file resources are resolved against.
    #[serde(default)]
    pub file_root: Option<PathBuf>,
    /// Headers added to every response.
    #[serde(default)]
    pub response_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub rules: Vec<RuleRecord>,
    /// Directory of the document this configuration was read from.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Http,
    Socket,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// `0` lets the command line or the operating system pick the port.
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
    #[serde(default)]
    pub quiet: bool,
    /// Appends request and response dumps to this file.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_max_request_size() -> usize {
    10 * 1024 * 1024 // 10MB
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `plain` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "plain".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_service_version")]
    pub service_version: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_service_name() -> String {
    "stubwire".to_string()
}

fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_protocol() -> String {
    "grpc".to_string()
}

fn default_sampling_rate() -> f64 {
    1.0
}

fn default_timeout_seconds() -> u64 {
    10
}

/// One entry of `rules`: either a rule (`request`/`response`) or a group
/// (`context` with `include` or nested `rules`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleRecord {
    #[serde(default)]
    pub request: Option<RequestSpec>,
    #[serde(default)]
    pub response: Option<ResponseSpec>,
    #[serde(default)]
    pub redirect_to: Option<String>,
    #[serde(default)]
    pub on_complete: Vec<ActionSpec>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub include: Option<PathBuf>,
    #[serde(default)]
    pub rules: Option<Vec<RuleRecord>>,
}

impl RuleRecord {
    pub fn is_group(&self) -> bool {
        self.context.is_some() || self.include.is_some() || self.rules.is_some()
    }
}

/// Expected value of a request attribute: a literal, or one operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueMatch {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Operator(OperatorSpec),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorSpec {
    #[serde(default, rename = "match")]
    pub pattern: Option<String>,
    #[serde(default)]
    pub starts_with: Option<String>,
    #[serde(default)]
    pub ends_with: Option<String>,
    #[serde(default)]
    pub contain: Option<String>,
    #[serde(default)]
    pub exist: Option<bool>,
    /// Path template with `:name` segments and `*` wildcards.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestSpec {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub uri: Option<ValueMatch>,
    #[serde(default)]
    pub queries: BTreeMap<String, ValueMatch>,
    #[serde(default)]
    pub headers: BTreeMap<String, ValueMatch>,
    #[serde(default)]
    pub cookies: BTreeMap<String, ValueMatch>,
    #[serde(default)]
    pub forms: BTreeMap<String, ValueMatch>,
    #[serde(default)]
    pub json_paths: BTreeMap<String, ValueMatch>,
    #[serde(default)]
    pub text: Option<ValueMatch>,
    /// Body equal to the content of this file.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Body equal to the content of this file on the resource search path.
    #[serde(default)]
    pub path_resource: Option<PathBuf>,
    /// Body structurally equal to this JSON value.
    #[serde(default)]
    pub json: Option<serde_json::Value>,
    #[serde(default)]
    pub xml: Option<String>,
    #[serde(default)]
    pub xml_struct: Option<String>,
    #[serde(default)]
    pub client_address: Option<ValueMatch>,
    /// Any of these request descriptions.
    #[serde(default)]
    pub any_of: Option<Vec<RequestSpec>>,
    /// Negated request description.
    #[serde(default)]
    pub not: Option<Box<RequestSpec>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseSpec {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub path_resource: Option<PathBuf>,
    #[serde(default)]
    pub json: Option<serde_json::Value>,
    #[serde(default)]
    pub template: Option<TemplateSpec>,
    /// First readable source wins.
    #[serde(default)]
    pub fallback: Option<Vec<ContentSpec>>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub latency: Option<Delay>,
    #[serde(default)]
    pub seq: Option<Vec<ResponseSpec>>,
    #[serde(default)]
    pub cycle: Option<Vec<ResponseSpec>>,
    #[serde(default)]
    pub proxy: Option<ProxySpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentSpec {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub path_resource: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateSpec {
    Inline(String),
    Source {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        file: Option<PathBuf>,
        #[serde(default)]
        path_resource: Option<PathBuf>,
        #[serde(default)]
        vars: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Failover {
    #[default]
    Convert,
    Propagate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxySpec {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub failover: Failover,
}

/// Completion action: exactly one of `get` or `post`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionSpec {
    #[serde(default)]
    pub get: Option<ActionTarget>,
    #[serde(default)]
    pub post: Option<ActionTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionTarget {
    pub url: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub json: Option<serde_json::Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Latency as `100ms`, `2s`, or a range `100ms-500ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delay(pub String);

impl Delay {
    pub fn parse_range(&self) -> anyhow::Result<(Duration, Duration)> {
        match self.0.split_once('-') {
            None => {
                let duration = parse_duration_str(&self.0)?;
                Ok((duration, duration))
            }
            Some((min, max)) => {
                let min = parse_duration_str(min)?;
                let max = parse_duration_str(max)?;
                if min > max {
                    anyhow::bail!("Min delay cannot be greater than max delay");
                }
                Ok((min, max))
            }
        }
    }
}

fn parse_duration_str(duration_str: &str) -> anyhow::Result<Duration> {
    let duration_str = duration_str.trim();
    if let Some(ms) = duration_str.strip_suffix("ms") {
        let ms = ms
            .trim()
            .parse::<u64>()
            .map_err(|e| anyhow::anyhow!("Invalid milliseconds: {}", e))?;
        Ok(Duration::from_millis(ms))
    } else if let Some(secs) = duration_str.strip_suffix('s') {
        let secs = secs
            .trim()
            .parse::<u64>()
            .map_err(|e| anyhow::anyhow!("Invalid seconds: {}", e))?;
        Ok(Duration::from_secs(secs))
    } else {
        anyhow::bail!("Invalid duration format: {}", duration_str);
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
            transport: Transport::default(),
            workers: default_workers(),
            max_request_size: default_max_request_size(),
            quiet: false,
            log_file: None,
            tls: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: default_service_name(),
            service_version: default_service_version(),
            endpoint: default_endpoint(),
            protocol: default_protocol(),
            sampling_rate: default_sampling_rate(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fixed_delay() {
        let delay = Delay("100ms".to_string());
        assert_eq!(
            delay.parse_range().unwrap(),
            (Duration::from_millis(100), Duration::from_millis(100))
        );

        let delay = Delay("2s".to_string());
        assert_eq!(delay.parse_range().unwrap().0, Duration::from_secs(2));
    }

    #[test]
    fn test_parse_range_delay() {
        let delay = Delay("100ms-500ms".to_string());
        let (min, max) = delay.parse_range().unwrap();
        assert_eq!(min, Duration::from_millis(100));
        assert_eq!(max, Duration::from_millis(500));
    }

    #[test]
    fn test_invalid_delay_format() {
        assert!(Delay("100".to_string()).parse_range().is_err());
        assert!(Delay("100ms-".to_string()).parse_range().is_err());
        assert!(Delay("2s-1s".to_string()).parse_range().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 0);
        assert_eq!(config.server.workers, 4);
        assert_eq!(config.server.transport, Transport::Http);
        assert!(!config.telemetry.enabled);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "plain");
    }

    #[test]
    fn test_value_match_forms() {
        let literal: ValueMatch = serde_yaml::from_str("/foo").unwrap();
        assert!(matches!(literal, ValueMatch::Text(ref text) if text == "/foo"));

        let number: ValueMatch = serde_yaml::from_str("42").unwrap();
        assert!(matches!(number, ValueMatch::Integer(42)));

        let operator: ValueMatch = serde_yaml::from_str("match: /f.*").unwrap();
        assert!(matches!(
            operator,
            ValueMatch::Operator(OperatorSpec { pattern: Some(_), .. })
        ));
    }

    #[test]
    fn test_template_spec_forms() {
        let inline: TemplateSpec = serde_yaml::from_str("\"Hi {{req.uri}}\"").unwrap();
        assert!(matches!(inline, TemplateSpec::Inline(_)));

        let sourced: TemplateSpec =
            serde_yaml::from_str("file: greet.hbs\nvars:\n  name: Ada\n").unwrap();
        match sourced {
            TemplateSpec::Source { file, vars, .. } => {
                assert_eq!(file, Some(PathBuf::from("greet.hbs")));
                assert_eq!(vars.get("name").map(String::as_str), Some("Ada"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
