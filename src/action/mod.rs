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

//! Outbound HTTP: the client capability and completion actions fired after
//! a rule has produced its response.

pub mod client;

pub use client::{HttpClient, OutboundClient, OutboundRequest, OutboundResponse};

use crate::error::ActionError;
use crate::model::Request;
use crate::rules::overlay::{apply_headers, Overlay};
use crate::rules::resource::Resource;
use http::{HeaderName, HeaderValue, Method};
use std::fmt::Write;
use std::sync::Arc;
use tracing::{info, warn};

/// Upper bound on how much of an outbound body is written to the log.
const MAX_LOGGED_BODY: usize = 4096;

#[derive(Debug, Clone)]
pub struct RequestAction {
    method: Method,
    url: Resource,
    headers: Vec<(HeaderName, Resource)>,
    body: Option<Resource>,
    client: Arc<dyn OutboundClient>,
}

impl RequestAction {
    pub fn get(url: impl Into<Resource>, client: Arc<dyn OutboundClient>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            client,
        }
    }

    pub fn post(
        url: impl Into<Resource>,
        body: impl Into<Resource>,
        client: Arc<dyn OutboundClient>,
    ) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body.into()),
            client,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: impl Into<Resource>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Fires the action. Failures are logged and swallowed.
    pub async fn execute(&self, request: &Request) {
        let monitor = ActionMonitor;
        let outbound = match self.prepare(request).await {
            Ok(outbound) => outbound,
            Err(e) => {
                monitor.on_failure(&e);
                return;
            }
        };

        monitor.pre_action(&outbound);
        match self.client.send(outbound).await {
            Ok(response) => monitor.post_action(&response),
            Err(e) => monitor.on_failure(&e),
        }
    }

    async fn prepare(&self, request: &Request) -> Result<OutboundRequest, ActionError> {
        let url = self.url.read(Some(request)).await?.text().into_owned();
        let mut outbound = OutboundRequest::new(self.method.clone(), url);

        for (name, value) in &self.headers {
            let value = self.header_value(value, request).await?;
            outbound.headers.append(name.clone(), value);
        }

        if let Some(body) = &self.body {
            let content = body.read(Some(request)).await?;
            if !outbound.headers.contains_key(http::header::CONTENT_TYPE) {
                if let Ok(value) = HeaderValue::from_str(body.content_type().as_ref()) {
                    outbound.headers.insert(http::header::CONTENT_TYPE, value);
                }
            }
            outbound.body = Some(content.into_bytes());
        }

        Ok(outbound)
    }

    async fn header_value(
        &self,
        value: &Resource,
        request: &Request,
    ) -> Result<HeaderValue, ActionError> {
        let content = value.read(Some(request)).await?;
        HeaderValue::from_bytes(content.bytes())
            .map_err(|e| ActionError::Transport(format!("invalid header value: {}", e)))
    }

    pub fn apply(&self, overlay: &Overlay) -> Option<RequestAction> {
        let url = self.url.apply(overlay);
        let headers = apply_headers(&self.headers, overlay);
        let body = self.body.as_ref().and_then(|body| body.apply(overlay));
        if url.is_none() && headers.is_none() && body.is_none() {
            return None;
        }

        Some(Self {
            method: self.method.clone(),
            url: url.unwrap_or_else(|| self.url.clone()),
            headers: headers.unwrap_or_else(|| self.headers.clone()),
            body: body.or_else(|| self.body.clone()),
            client: Arc::clone(&self.client),
        })
    }
}

/// Logs outbound exchanges fired by completion actions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionMonitor;

impl ActionMonitor {
    pub fn pre_action(&self, request: &OutboundRequest) {
        info!(method = %request.method, url = %request.url, "Firing completion action");
        info!("{}", dump_outbound_request(request));
    }

    pub fn post_action(&self, response: &OutboundResponse) {
        info!(status = response.status.as_u16(), "Completion action answered");
        info!("{}", dump_outbound_response(response));
    }

    pub fn on_failure(&self, error: &ActionError) {
        warn!(error = %error, "Completion action failed");
    }
}

fn dump_outbound_request(request: &OutboundRequest) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", request.method, request.url);
    for (name, value) in &request.headers {
        let _ = writeln!(out, "{}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
    if let Some(body) = &request.body {
        out.push('\n');
        out.push_str(&logged_body(body));
    }
    out
}

fn dump_outbound_response(response: &OutboundResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}",
        response.status.as_u16(),
        response.status.canonical_reason().unwrap_or("")
    );
    for (name, value) in &response.headers {
        let _ = writeln!(out, "{}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
    if !response.body.is_empty() {
        out.push('\n');
        out.push_str(&logged_body(&response.body));
    }
    out
}

fn logged_body(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) if text.len() <= MAX_LOGGED_BODY => text.to_string(),
        Ok(_) => format!("<{} bytes>", body.len()),
        Err(_) => format!("<{} bytes of binary content>", body.len()),
    }
}
