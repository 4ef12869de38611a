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

//! Turns a validated [`Config`] into a runnable [`StubServer`].

use crate::action::client::{HttpClient, OutboundClient};
use crate::action::RequestAction;
use crate::config::loader::{parse_version, ConfigLoader};
use crate::config::types::{
    ActionSpec, Config, ContentSpec, Failover, OperatorSpec, RequestSpec, ResponseSpec,
    RuleRecord, TemplateSpec, Transport, ValueMatch,
};
use crate::monitor::FileMonitor;
use crate::rules::extractor::Extractor;
use crate::rules::handler::{Latency, ProxyFailure, ProxyHandler, ResponseHandler};
use crate::rules::matcher::{Matcher, Operator};
use crate::rules::overlay::Overlay;
use crate::rules::resource::Resource;
use crate::rules::{Rule, RuleSet};
use crate::server::{Binding, StubServer, TlsIdentity, TransportKind};
use anyhow::Context;
use http::{HeaderName, Method};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const MAX_INCLUDE_DEPTH: usize = 16;

impl Config {
    /// Builds the server with a default outbound HTTP client.
    pub fn build(&self) -> anyhow::Result<StubServer> {
        let client = HttpClient::new().context("Failed to create outbound HTTP client")?;
        self.build_with_client(Arc::new(client))
    }

    /// Builds the server; proxies and completion actions share `client`.
    pub fn build_with_client(&self, client: Arc<dyn OutboundClient>) -> anyhow::Result<StubServer> {
        let rules = self.build_rules(client)?;

        let mut server = StubServer::new(self.binding(), rules).quiet(self.server.quiet);
        if let Some(log_file) = &self.server.log_file {
            let path = self.resolve(log_file);
            let monitor = FileMonitor::open(&path)?;
            server = server.with_monitor(Arc::new(monitor));
        }

        Ok(server)
    }

    /// Rule set with file root and response header overlays applied.
    pub fn build_rules(&self, client: Arc<dyn OutboundClient>) -> anyhow::Result<RuleSet> {
        let builder = RuleBuilder { client, depth: 0 };
        let mut rules = builder.records(&self.rules, self.base_dir.as_deref())?;

        let root = match &self.file_root {
            Some(root) => Some(self.resolve(root)),
            None => self.base_dir.clone(),
        };
        if let Some(root) = root {
            rules = rules.apply(&Overlay::file_root(root));
        }

        for (name, value) in &self.response_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Invalid header name '{}'", name))?;
            rules = rules.apply(&Overlay::response_header(name, value.as_str()));
        }

        Ok(rules)
    }

    pub fn binding(&self) -> Binding {
        let transport = match self.server.transport {
            Transport::Http => TransportKind::Http,
            Transport::Socket => TransportKind::Socket,
        };

        Binding {
            host: self.server.host.clone(),
            port: self.server.port,
            tls: self.server.tls.as_ref().map(|tls| TlsIdentity {
                cert: self.resolve(&tls.cert),
                key: self.resolve(&tls.key),
            }),
            workers: self.server.workers,
            max_request_size: self.server.max_request_size,
            ..Binding::new(transport)
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

struct RuleBuilder {
    client: Arc<dyn OutboundClient>,
    depth: usize,
}

impl RuleBuilder {
    fn records(&self, records: &[RuleRecord], base_dir: Option<&Path>) -> anyhow::Result<RuleSet> {
        let mut rules = RuleSet::default();
        for (index, record) in records.iter().enumerate() {
            let built = if record.is_group() {
                self.group(record, base_dir)
            } else {
                self.rule(record).map(|rule| RuleSet::new(vec![rule]))
            }
            .with_context(|| format!("Failed to build rule #{}", index))?;
            rules = rules.concat(&built);
        }
        Ok(rules)
    }

    fn group(&self, record: &RuleRecord, base_dir: Option<&Path>) -> anyhow::Result<RuleSet> {
        let mut rules = match (&record.include, &record.rules) {
            (Some(include), _) => self.include(include, base_dir)?,
            (None, Some(nested)) => self.records(nested, base_dir)?,
            (None, None) => anyhow::bail!("A rule group needs include or rules"),
        };

        if let Some(context) = &record.context {
            rules = rules.apply(&Overlay::context(context.as_str()));
        }

        Ok(rules)
    }

    /// Loads another document's rules, resolving its files against its own
    /// directory.
    fn include(&self, include: &Path, base_dir: Option<&Path>) -> anyhow::Result<RuleSet> {
        if self.depth >= MAX_INCLUDE_DEPTH {
            anyhow::bail!("Includes nested deeper than {} levels", MAX_INCLUDE_DEPTH);
        }

        let path = match base_dir {
            Some(base) if include.is_relative() => base.join(include),
            _ => include.to_path_buf(),
        };
        debug!(path = ?path, "Including rules");

        let included = ConfigLoader::from_file(&path)
            .with_context(|| format!("Failed to include {:?}", path))?;
        let nested = RuleBuilder {
            client: self.client.clone(),
            depth: self.depth + 1,
        };
        let mut rules = nested.records(&included.rules, included.base_dir.as_deref())?;

        let root = match &included.file_root {
            Some(root) => Some(included.resolve(root)),
            None => included.base_dir.clone(),
        };
        if let Some(root) = root {
            rules = rules.apply(&Overlay::file_root(root));
        }

        Ok(rules)
    }

    fn rule(&self, record: &RuleRecord) -> anyhow::Result<Rule> {
        let matcher = match &record.request {
            Some(request) => request_matcher(request)?,
            None => Matcher::Any,
        };

        let mut handlers = Vec::new();
        if let Some(response) = &record.response {
            handlers.push(self.response(response)?);
        }
        if let Some(location) = &record.redirect_to {
            handlers.push(ResponseHandler::redirect(location.as_str()));
        }

        let mut rule = Rule::new(matcher, collapse(handlers));
        for action in &record.on_complete {
            rule = rule.with_action(self.action(action)?);
        }

        Ok(rule)
    }

    fn response(&self, response: &ResponseSpec) -> anyhow::Result<ResponseHandler> {
        let mut handlers = Vec::new();

        if let Some(status) = response.status {
            handlers.push(ResponseHandler::status(status)?);
        }

        if let Some(version) = &response.version {
            handlers.push(ResponseHandler::version(parse_version(version)?));
        }

        if let Some(proxy) = &response.proxy {
            let mut handler = ProxyHandler::new(proxy.url.as_str(), self.client.clone())
                .with_failover(match proxy.failover {
                    Failover::Convert => ProxyFailure::Convert,
                    Failover::Propagate => ProxyFailure::Propagate,
                });
            for (name, value) in &proxy.headers {
                handler = handler.with_header(header_name(name)?, value.as_str());
            }
            handlers.push(ResponseHandler::proxy(handler));
        }

        if let Some(resource) = content_resource(response) {
            let handler = match &response.content_type {
                Some(content_type) => {
                    let mime = content_type
                        .parse::<mime::Mime>()
                        .map_err(|_| anyhow::anyhow!("Invalid content type '{}'", content_type))?;
                    ResponseHandler::content_with_type(resource, mime)
                }
                None => ResponseHandler::content(resource),
            };
            handlers.push(handler);
        }

        for (name, value) in &response.headers {
            handlers.push(ResponseHandler::header(name, value.as_str())?);
        }

        if let Some(steps) = &response.seq {
            handlers.push(ResponseHandler::sequence(self.steps(steps)?)?);
        }

        if let Some(steps) = &response.cycle {
            handlers.push(ResponseHandler::cycle(self.steps(steps)?)?);
        }

        let handler = collapse(handlers);
        match &response.latency {
            Some(delay) => {
                let (min, max) = delay.parse_range()?;
                Ok(ResponseHandler::with_latency(Latency::range(min, max)?, handler))
            }
            None => Ok(handler),
        }
    }

    fn steps(&self, steps: &[ResponseSpec]) -> anyhow::Result<Vec<ResponseHandler>> {
        steps.iter().map(|step| self.response(step)).collect()
    }

    fn action(&self, action: &ActionSpec) -> anyhow::Result<RequestAction> {
        let (mut built, target) = match (&action.get, &action.post) {
            (Some(target), None) => (
                RequestAction::get(target.url.as_str(), self.client.clone()),
                target,
            ),
            (None, Some(target)) => {
                let body = match (&target.content, &target.json) {
                    (_, Some(json)) => Resource::json(json.clone()),
                    (Some(content), None) => Resource::text(content.as_str()),
                    (None, None) => Resource::text(""),
                };
                (
                    RequestAction::post(target.url.as_str(), body, self.client.clone()),
                    target,
                )
            }
            _ => anyhow::bail!("A completion action needs exactly one of get or post"),
        };

        for (name, value) in &target.headers {
            built = built.with_header(header_name(name)?, value.as_str());
        }

        Ok(built)
    }
}

fn collapse(mut handlers: Vec<ResponseHandler>) -> ResponseHandler {
    if handlers.len() == 1 {
        handlers.remove(0)
    } else {
        ResponseHandler::composite(handlers)
    }
}

fn header_name(name: &str) -> anyhow::Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .with_context(|| format!("Invalid header name '{}'", name))
}

fn content_resource(response: &ResponseSpec) -> Option<Resource> {
    if let Some(text) = &response.text {
        return Some(Resource::text(text.as_str()));
    }
    if let Some(json) = &response.json {
        return Some(json_resource(json));
    }
    if let Some(template) = &response.template {
        return Some(template_resource(template));
    }
    if let Some(fallback) = &response.fallback {
        return Some(Resource::fallback(
            fallback.iter().filter_map(source_resource).collect(),
        ));
    }
    source_resource(&ContentSpec {
        text: None,
        file: response.file.clone(),
        path_resource: response.path_resource.clone(),
    })
}

fn source_resource(source: &ContentSpec) -> Option<Resource> {
    if let Some(text) = &source.text {
        return Some(Resource::text(text.as_str()));
    }
    if let Some(file) = &source.file {
        return Some(Resource::file(file.clone()));
    }
    source.path_resource.as_ref().map(|path| Resource::search(path.clone()))
}

fn template_resource(template: &TemplateSpec) -> Resource {
    match template {
        TemplateSpec::Inline(text) => Resource::template(Resource::text(text.as_str())),
        TemplateSpec::Source {
            text,
            file,
            path_resource,
            vars,
        } => {
            let source = source_resource(&ContentSpec {
                text: text.clone(),
                file: file.clone(),
                path_resource: path_resource.clone(),
            })
            .unwrap_or_else(|| Resource::text(""));
            let vars: BTreeMap<String, Resource> = vars
                .iter()
                .map(|(name, value)| (name.clone(), Resource::text(value.as_str())))
                .collect();
            Resource::template_with(source, vars)
        }
    }
}

fn json_resource(json: &serde_json::Value) -> Resource {
    match json {
        serde_json::Value::String(text) => Resource::text(text.as_str()),
        other => Resource::json(other.clone()),
    }
}

fn request_matcher(request: &RequestSpec) -> anyhow::Result<Matcher> {
    let mut matchers = Vec::new();

    if let Some(method) = &request.method {
        let method = Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|_| anyhow::anyhow!("Invalid method '{}'", method))?;
        matchers.push(Matcher::method(method));
    }

    if let Some(version) = &request.version {
        let version = parse_version(version)?;
        matchers.push(Matcher::equal(Extractor::Version, format!("{:?}", version)));
    }

    if let Some(uri) = &request.uri {
        matchers.push(value_matcher(Extractor::Uri, uri));
    }

    for (name, value) in &request.queries {
        matchers.push(value_matcher(Extractor::query(name.as_str()), value));
    }

    for (name, value) in &request.headers {
        matchers.push(value_matcher(Extractor::header(header_name(name)?), value));
    }

    for (name, value) in &request.cookies {
        matchers.push(value_matcher(Extractor::cookie(name.as_str()), value));
    }

    for (name, value) in &request.forms {
        matchers.push(value_matcher(Extractor::form(name.as_str()), value));
    }

    for (path, value) in &request.json_paths {
        matchers.push(value_matcher(Extractor::json_path(path.as_str()), value));
    }

    if let Some(text) = &request.text {
        matchers.push(value_matcher(Extractor::Content, text));
    }

    if let Some(file) = &request.file {
        matchers.push(Matcher::equal(Extractor::Content, Resource::file(file.clone())));
    }

    if let Some(path) = &request.path_resource {
        matchers.push(Matcher::equal(Extractor::Content, Resource::search(path.clone())));
    }

    if let Some(json) = &request.json {
        matchers.push(Matcher::leaf(Extractor::Content, Operator::Json, json_resource(json)));
    }

    if let Some(xml) = &request.xml {
        matchers.push(Matcher::leaf(Extractor::Content, Operator::Xml, xml.as_str()));
    }

    if let Some(xml) = &request.xml_struct {
        matchers.push(Matcher::leaf(Extractor::Content, Operator::XmlStruct, xml.as_str()));
    }

    if let Some(address) = &request.client_address {
        matchers.push(value_matcher(Extractor::ClientAddress, address));
    }

    if let Some(any_of) = &request.any_of {
        let alternatives = any_of
            .iter()
            .map(request_matcher)
            .collect::<anyhow::Result<Vec<_>>>()?;
        matchers.push(Matcher::or(alternatives));
    }

    if let Some(not) = &request.not {
        matchers.push(Matcher::not(request_matcher(not)?));
    }

    Ok(match matchers.len() {
        0 => Matcher::Any,
        1 => matchers.remove(0),
        _ => Matcher::and(matchers),
    })
}

fn value_matcher(extractor: Extractor, value: &ValueMatch) -> Matcher {
    match value {
        ValueMatch::Text(text) => Matcher::equal(extractor, text.as_str()),
        ValueMatch::Integer(number) => Matcher::equal(extractor, number.to_string()),
        ValueMatch::Boolean(flag) => Matcher::equal(extractor, flag.to_string()),
        ValueMatch::Operator(operator) => operator_matcher(extractor, operator),
    }
}

fn operator_matcher(extractor: Extractor, operator: &OperatorSpec) -> Matcher {
    let OperatorSpec {
        pattern,
        starts_with,
        ends_with,
        contain,
        exist,
        path,
    } = operator;

    if let Some(pattern) = pattern {
        Matcher::leaf(extractor, Operator::Match, pattern.as_str())
    } else if let Some(prefix) = starts_with {
        Matcher::leaf(extractor, Operator::StartsWith, prefix.as_str())
    } else if let Some(suffix) = ends_with {
        Matcher::leaf(extractor, Operator::EndsWith, suffix.as_str())
    } else if let Some(part) = contain {
        Matcher::leaf(extractor, Operator::Contain, part.as_str())
    } else if let Some(template) = path {
        Matcher::leaf(extractor, Operator::Path, template.as_str())
    } else if let Some(false) = exist {
        Matcher::not(Matcher::exist(extractor))
    } else {
        Matcher::exist(extractor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::tests::RecordingClient;
    use crate::model::{HttpRequest, MessageContent, Request, SessionContext};
    use std::fs;
    use std::time::Instant;

    fn client() -> Arc<RecordingClient> {
        Arc::new(RecordingClient::default())
    }

    fn rules(yaml: &str) -> RuleSet {
        ConfigLoader::from_str(yaml)
            .unwrap()
            .build_rules(client())
            .unwrap()
    }

    async fn respond(rules: &RuleSet, request: HttpRequest) -> Option<String> {
        let mut context = SessionContext::new(Request::Http(request));
        if !rules.resolve(&mut context).await.unwrap() {
            return None;
        }
        let response = context.into_response();
        Some(format!(
            "{} {}",
            response.status().as_u16(),
            response.content().map(|c| c.text()).unwrap_or_default()
        ))
    }

    fn get(uri: &str) -> HttpRequest {
        HttpRequest::builder().uri(uri).build()
    }

    #[tokio::test]
    async fn test_text_rule() {
        let rules = rules(
            r#"
- request:
    uri: /foo
  response:
    text: bar
"#,
        );

        assert_eq!(respond(&rules, get("/foo")).await.as_deref(), Some("200 bar"));
        assert_eq!(respond(&rules, get("/other")).await, None);
    }

    #[tokio::test]
    async fn test_method_and_query_operators() {
        let rules = rules(
            r#"
- request:
    method: post
    uri: { starts_with: /orders }
    queries:
      page: 2
  response:
    status: 201
    text: created
"#,
        );

        let request = HttpRequest::builder()
            .method(Method::POST)
            .uri("/orders/7")
            .query_string("page=2")
            .build();
        assert_eq!(respond(&rules, request).await.as_deref(), Some("201 created"));

        let request = HttpRequest::builder().uri("/orders/7").query_string("page=2").build();
        assert_eq!(respond(&rules, request).await, None);
    }

    #[tokio::test]
    async fn test_exist_false_and_any_of() {
        let rules = rules(
            r#"
- request:
    headers:
      X-Token: { exist: false }
    any_of:
      - uri: /a
      - uri: /b
  response:
    text: anonymous
"#,
        );

        assert_eq!(respond(&rules, get("/b")).await.as_deref(), Some("200 anonymous"));

        let request = HttpRequest::builder()
            .uri("/a")
            .header("x-token", "secret")
            .build();
        assert_eq!(respond(&rules, request).await, None);
    }

    #[tokio::test]
    async fn test_json_body_rule() {
        let rules = rules(
            r#"
- request:
    json: { "a": 1, "b": 2 }
  response:
    json: { "ok": true }
"#,
        );

        let request = HttpRequest::builder()
            .method(Method::POST)
            .content(MessageContent::from(r#"{"b":2,"a":1}"#))
            .build();
        let mut context = SessionContext::new(Request::Http(request));
        assert!(rules.resolve(&mut context).await.unwrap());
        let response = context.into_response();
        assert_eq!(
            response.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body: serde_json::Value =
            serde_json::from_str(&response.content().unwrap().text()).unwrap();
        assert_eq!(body, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_sequence_from_config() {
        let rules = rules(
            r#"
- response:
    seq:
      - text: first
      - text: second
"#,
        );

        assert_eq!(respond(&rules, get("/")).await.as_deref(), Some("200 first"));
        assert_eq!(respond(&rules, get("/")).await.as_deref(), Some("200 second"));
        assert_eq!(respond(&rules, get("/")).await.as_deref(), Some("200 second"));
    }

    #[tokio::test]
    async fn test_redirect_to() {
        let rules = rules(
            r#"
- request:
    uri: /old
  redirect_to: /new
"#,
        );

        let mut context = SessionContext::new(Request::Http(get("/old")));
        assert!(rules.resolve(&mut context).await.unwrap());
        let response = context.into_response();
        assert_eq!(response.status(), http::StatusCode::FOUND);
        assert_eq!(response.headers().get(http::header::LOCATION).unwrap(), "/new");
    }

    #[tokio::test]
    async fn test_inline_group_context() {
        let rules = rules(
            r#"
- context: /api
  rules:
    - request:
        uri: /users
      response:
        text: users
"#,
        );

        assert_eq!(respond(&rules, get("/api/users")).await.as_deref(), Some("200 users"));
        assert_eq!(respond(&rules, get("/users")).await, None);
    }

    #[tokio::test]
    async fn test_response_headers_overlay() {
        let rules = rules(
            r#"
response_headers:
  X-Stub: stubwire
rules:
  - response:
      text: hi
"#,
        );

        let mut context = SessionContext::new(Request::Http(get("/")));
        rules.resolve(&mut context).await.unwrap();
        assert_eq!(
            context.into_response().headers().get("x-stub").unwrap(),
            "stubwire"
        );
    }

    #[tokio::test]
    async fn test_template_with_vars() {
        let rules = rules(
            r#"
- response:
    template:
      text: "{{greeting}} {{req.uri}}"
      vars:
        greeting: Hello
"#,
        );

        assert_eq!(
            respond(&rules, get("/world")).await.as_deref(),
            Some("200 Hello /world")
        );
    }

    #[tokio::test]
    async fn test_latency_from_config() {
        let rules = rules(
            r#"
- response:
    text: slow
    latency: 50ms
"#,
        );

        let start = Instant::now();
        assert_eq!(respond(&rules, get("/")).await.as_deref(), Some("200 slow"));
        assert!(start.elapsed().as_millis() >= 50);
    }

    #[tokio::test]
    async fn test_completion_action_uses_injected_client() {
        let recording = client();
        let config = ConfigLoader::from_str(
            r#"
- response:
    text: done
  on_complete:
    - post:
        url: "http://localhost:9/notify"
        content: finished
        headers:
          X-Source: stubwire
"#,
        )
        .unwrap();
        let rules = config.build_rules(recording.clone()).unwrap();

        respond(&rules, get("/")).await;

        let sent = recording.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, Method::POST);
        assert_eq!(sent[0].url, "http://localhost:9/notify");
        assert_eq!(sent[0].body.as_deref(), Some(&b"finished"[..]));
        assert_eq!(sent[0].headers.get("x-source").unwrap(), "stubwire");
    }

    #[tokio::test]
    async fn test_files_and_includes_resolve_against_document_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("payload.txt"), "from file").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("inner.txt"), "from nested").unwrap();
        fs::write(
            dir.path().join("nested").join("api.yaml"),
            "- request:\n    uri: /inner\n  response:\n    file: inner.txt\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("stub.yaml"),
            r#"
rules:
  - request:
      uri: /file
    response:
      file: payload.txt
  - context: /api
    include: nested/api.yaml
"#,
        )
        .unwrap();

        let config = ConfigLoader::from_file(dir.path().join("stub.yaml")).unwrap();
        let rules = config.build_rules(client()).unwrap();

        assert_eq!(
            respond(&rules, get("/file")).await.as_deref(),
            Some("200 from file")
        );
        assert_eq!(
            respond(&rules, get("/api/inner")).await.as_deref(),
            Some("200 from nested")
        );
    }

    #[tokio::test]
    async fn test_explicit_file_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("fixtures")).unwrap();
        fs::write(dir.path().join("fixtures").join("a.txt"), "fixture").unwrap();
        fs::write(
            dir.path().join("stub.yaml"),
            "file_root: fixtures\nrules:\n  - response:\n      file: a.txt\n",
        )
        .unwrap();

        let config = ConfigLoader::from_file(dir.path().join("stub.yaml")).unwrap();
        let rules = config.build_rules(client()).unwrap();
        assert_eq!(respond(&rules, get("/")).await.as_deref(), Some("200 fixture"));
    }

    #[test]
    fn test_binding_from_server_section() {
        let config = ConfigLoader::from_str(
            r#"
server:
  host: 127.0.0.1
  port: 12306
  transport: socket
  workers: 2
"#,
        )
        .unwrap();

        let binding = config.binding();
        assert_eq!(binding.address(), "127.0.0.1:12306");
        assert_eq!(binding.transport, TransportKind::Socket);
        assert_eq!(binding.workers, 2);
        assert!(binding.tls.is_none());
    }

    #[test]
    fn test_build_quiet_server_with_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("stub.log");
        let config = ConfigLoader::from_str(&format!(
            "server:\n  quiet: true\n  log_file: {}\nrules: []\n",
            log.display()
        ))
        .unwrap();

        let server = config.build_with_client(client()).unwrap();
        assert!(server.is_quiet());
        assert!(log.exists());
    }

    #[test]
    fn test_include_cycle_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("loop.yaml"),
            "- context: /again\n  include: loop.yaml\n",
        )
        .unwrap();

        let config = ConfigLoader::from_file(dir.path().join("loop.yaml")).unwrap();
        let err = config.build_rules(client()).unwrap_err();
        assert!(format!("{:#}", err).contains("nested deeper than"));
    }
}
