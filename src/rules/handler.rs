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

//! Response handlers: composable mutations of the response held by a
//! [`SessionContext`].

use crate::action::{OutboundClient, OutboundRequest, OutboundResponse};
use crate::error::{BuildError, HandlerError};
use crate::model::{MessageContent, Request, Response, SessionContext};
use crate::rules::overlay::{apply_headers, Overlay};
use crate::rules::resource::Resource;
use futures::future::BoxFuture;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, LOCATION};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Version};
use mime::Mime;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Headers that describe a single hop and are never forwarded by the proxy.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Latency {
    Fixed(Duration),
    Range { min: Duration, max: Duration },
}

impl Latency {
    pub fn range(min: Duration, max: Duration) -> Result<Self, BuildError> {
        if min > max {
            return Err(BuildError::InvalidLatency {
                min_ms: min.as_millis(),
                max_ms: max.as_millis(),
            });
        }
        if min == max {
            return Ok(Latency::Fixed(min));
        }
        Ok(Latency::Range { min, max })
    }

    fn sample(&self) -> Duration {
        match self {
            Latency::Fixed(duration) => *duration,
            Latency::Range { min, max } => {
                let millis = rand::thread_rng().gen_range(min.as_millis()..=max.as_millis());
                Duration::from_millis(millis as u64)
            }
        }
    }
}

/// What a proxy does when the upstream cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProxyFailure {
    /// Answer `502 Bad Gateway`.
    #[default]
    Convert,
    /// Fail the exchange.
    Propagate,
}

#[derive(Debug, Clone)]
pub struct ProxyHandler {
    target: Resource,
    headers: Vec<(HeaderName, Resource)>,
    failover: ProxyFailure,
    client: Arc<dyn OutboundClient>,
}

impl ProxyHandler {
    pub fn new(target: impl Into<Resource>, client: Arc<dyn OutboundClient>) -> Self {
        Self {
            target: target.into(),
            headers: Vec::new(),
            failover: ProxyFailure::default(),
            client,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: impl Into<Resource>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn with_failover(mut self, failover: ProxyFailure) -> Self {
        self.failover = failover;
        self
    }

    async fn handle(&self, context: &mut SessionContext) -> Result<(), HandlerError> {
        let outbound = self.outbound_request(context.request()).await?;
        let url = outbound.url.clone();
        debug!(url = %url, "Proxying request");

        match self.client.send(outbound).await {
            Ok(upstream) => {
                copy_upstream(upstream, context.response_mut());
                Ok(())
            }
            Err(e) => match self.failover {
                ProxyFailure::Convert => {
                    warn!(url = %url, error = %e, "Proxy target failed, answering 502");
                    let response = context.response_mut();
                    response.set_status(StatusCode::BAD_GATEWAY);
                    response
                        .headers_mut()
                        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
                    response.set_content(MessageContent::from(format!("Bad Gateway: {}", e)));
                    Ok(())
                }
                ProxyFailure::Propagate => Err(e.into()),
            },
        }
    }

    async fn outbound_request(&self, request: &Request) -> Result<OutboundRequest, HandlerError> {
        let mut url = self.target.read(Some(request)).await?.text().into_owned();

        let mut outbound = match request {
            Request::Http(http) => {
                let query = http.query_string();
                if !query.is_empty() {
                    url.push(if url.contains('?') { '&' } else { '?' });
                    url.push_str(&query);
                }

                let mut outbound = OutboundRequest::new(http.method().clone(), url);
                outbound.headers = forwardable(http.headers());
                outbound
            }
            Request::Socket(_) => OutboundRequest::new(Method::POST, url),
        };

        for (name, value) in &self.headers {
            let content = value.read(Some(request)).await?;
            let value = HeaderValue::from_bytes(content.bytes()).map_err(|e| {
                HandlerError::InvalidHeader {
                    name: name.to_string(),
                    reason: e.to_string(),
                }
            })?;
            outbound.headers.insert(name.clone(), value);
        }

        outbound.body = request.content().map(|content| content.bytes().to_vec());
        Ok(outbound)
    }

    fn apply(&self, overlay: &Overlay) -> Option<ProxyHandler> {
        let target = self.target.apply(overlay);
        let headers = apply_headers(&self.headers, overlay);
        if target.is_none() && headers.is_none() {
            return None;
        }

        Some(Self {
            target: target.unwrap_or_else(|| self.target.clone()),
            headers: headers.unwrap_or_else(|| self.headers.clone()),
            failover: self.failover,
            client: Arc::clone(&self.client),
        })
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    *name == CONTENT_LENGTH || HOP_BY_HOP.contains(&name.as_str())
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|&(name, _)| *name != HOST && !is_hop_by_hop(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn copy_upstream(upstream: OutboundResponse, response: &mut Response) {
    response.set_status(upstream.status);
    for (name, value) in &upstream.headers {
        if !is_hop_by_hop(name) {
            response.headers_mut().append(name.clone(), value.clone());
        }
    }
    if !upstream.body.is_empty() {
        response.set_content(MessageContent::new(upstream.body));
    }
}

/// Ordered handlers behind a shared cursor.
#[derive(Debug, Clone)]
pub struct Steps {
    handlers: Arc<[ResponseHandler]>,
    cursor: Arc<AtomicUsize>,
}

impl Steps {
    fn new(handlers: Vec<ResponseHandler>, kind: &'static str) -> Result<Self, BuildError> {
        if handlers.is_empty() {
            return Err(BuildError::EmptyHandlers(kind));
        }
        Ok(Self {
            handlers: handlers.into(),
            cursor: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Index to serve now; the cursor stops at the last handler.
    fn saturating_index(&self) -> usize {
        let last = self.handlers.len() - 1;
        match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < last).then_some(current + 1)
            }) {
            Ok(previous) | Err(previous) => previous.min(last),
        }
    }

    /// Index to serve now; the cursor wraps around.
    fn wrapping_index(&self) -> usize {
        let len = self.handlers.len();
        match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some((current + 1) % len)
            }) {
            Ok(previous) | Err(previous) => previous,
        }
    }

    /// Rebuilt steps start over with a fresh cursor.
    fn apply(&self, overlay: &Overlay) -> Option<Steps> {
        apply_all(&self.handlers, overlay).map(|handlers| Self {
            handlers: handlers.into(),
            cursor: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[derive(Debug, Clone)]
pub enum ResponseHandler {
    Content {
        resource: Resource,
        content_type: Option<Mime>,
    },
    Status(StatusCode),
    Header {
        name: HeaderName,
        value: Resource,
    },
    Version(Version),
    Composite(Vec<ResponseHandler>),
    /// Each call moves to the next handler; the last one repeats forever.
    Sequence(Steps),
    /// Each call moves to the next handler, wrapping around.
    Cycle(Steps),
    Latency {
        latency: Latency,
        handler: Box<ResponseHandler>,
    },
    Proxy(ProxyHandler),
}

impl ResponseHandler {
    pub fn content(resource: impl Into<Resource>) -> Self {
        ResponseHandler::Content {
            resource: resource.into(),
            content_type: None,
        }
    }

    pub fn content_with_type(resource: impl Into<Resource>, content_type: Mime) -> Self {
        ResponseHandler::Content {
            resource: resource.into(),
            content_type: Some(content_type),
        }
    }

    pub fn status(code: u16) -> Result<Self, BuildError> {
        StatusCode::from_u16(code)
            .map(ResponseHandler::Status)
            .map_err(|_| BuildError::InvalidStatus(code))
    }

    pub fn header(name: &str, value: impl Into<Resource>) -> Result<Self, BuildError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| BuildError::InvalidHeaderName(name.to_string()))?;
        Ok(ResponseHandler::Header {
            name,
            value: value.into(),
        })
    }

    pub fn version(version: Version) -> Self {
        ResponseHandler::Version(version)
    }

    pub fn composite(handlers: Vec<ResponseHandler>) -> Self {
        ResponseHandler::Composite(handlers)
    }

    pub fn sequence(handlers: Vec<ResponseHandler>) -> Result<Self, BuildError> {
        Steps::new(handlers, "seq").map(ResponseHandler::Sequence)
    }

    pub fn cycle(handlers: Vec<ResponseHandler>) -> Result<Self, BuildError> {
        Steps::new(handlers, "cycle").map(ResponseHandler::Cycle)
    }

    pub fn with_latency(latency: Latency, handler: ResponseHandler) -> Self {
        ResponseHandler::Latency {
            latency,
            handler: Box::new(handler),
        }
    }

    pub fn proxy(proxy: ProxyHandler) -> Self {
        ResponseHandler::Proxy(proxy)
    }

    /// `302 Found` pointing at `location`.
    pub fn redirect(location: impl Into<Resource>) -> Self {
        ResponseHandler::Composite(vec![
            ResponseHandler::Status(StatusCode::FOUND),
            ResponseHandler::Header {
                name: LOCATION,
                value: location.into(),
            },
        ])
    }

    pub fn handle<'a>(
        &'a self,
        context: &'a mut SessionContext,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            match self {
                ResponseHandler::Content {
                    resource,
                    content_type,
                } => {
                    let (request, response) = context.split();
                    let content = resource.read(Some(request)).await?;
                    let content_type = content_type
                        .clone()
                        .unwrap_or_else(|| resource.content_type());
                    let value = HeaderValue::from_str(content_type.as_ref()).map_err(|e| {
                        HandlerError::InvalidHeader {
                            name: CONTENT_TYPE.to_string(),
                            reason: e.to_string(),
                        }
                    })?;
                    response.headers_mut().insert(CONTENT_TYPE, value);
                    response.set_content(content);
                    Ok(())
                }
                ResponseHandler::Status(status) => {
                    context.response_mut().set_status(*status);
                    Ok(())
                }
                ResponseHandler::Header { name, value } => {
                    let (request, response) = context.split();
                    let content = value.read(Some(request)).await?;
                    let value = HeaderValue::from_bytes(content.bytes()).map_err(|e| {
                        HandlerError::InvalidHeader {
                            name: name.to_string(),
                            reason: e.to_string(),
                        }
                    })?;
                    response.headers_mut().insert(name.clone(), value);
                    Ok(())
                }
                ResponseHandler::Version(version) => {
                    context.response_mut().set_version(*version);
                    Ok(())
                }
                ResponseHandler::Composite(handlers) => {
                    for handler in handlers {
                        handler.handle(context).await?;
                    }
                    Ok(())
                }
                ResponseHandler::Sequence(steps) => {
                    let index = steps.saturating_index();
                    steps.handlers[index].handle(context).await
                }
                ResponseHandler::Cycle(steps) => {
                    let index = steps.wrapping_index();
                    steps.handlers[index].handle(context).await
                }
                ResponseHandler::Latency { latency, handler } => {
                    let delay = latency.sample();
                    if !delay.is_zero() {
                        info!(delay_ms = delay.as_millis() as u64, "Adding delay to response");
                        tokio::time::sleep(delay).await;
                    }
                    handler.handle(context).await
                }
                ResponseHandler::Proxy(proxy) => proxy.handle(context).await,
            }
        })
    }

    /// Applies an overlay. `None` means nothing in this handler changed.
    pub fn apply(&self, overlay: &Overlay) -> Option<ResponseHandler> {
        match self {
            ResponseHandler::Content {
                resource,
                content_type,
            } => resource.apply(overlay).map(|resource| ResponseHandler::Content {
                resource,
                content_type: content_type.clone(),
            }),
            ResponseHandler::Header { name, value } => {
                value.apply(overlay).map(|value| ResponseHandler::Header {
                    name: name.clone(),
                    value,
                })
            }
            ResponseHandler::Status(_) | ResponseHandler::Version(_) => None,
            ResponseHandler::Composite(handlers) => {
                apply_all(handlers, overlay).map(ResponseHandler::Composite)
            }
            ResponseHandler::Sequence(steps) => steps.apply(overlay).map(ResponseHandler::Sequence),
            ResponseHandler::Cycle(steps) => steps.apply(overlay).map(ResponseHandler::Cycle),
            ResponseHandler::Latency { latency, handler } => {
                handler
                    .apply(overlay)
                    .map(|handler| ResponseHandler::Latency {
                        latency: *latency,
                        handler: Box::new(handler),
                    })
            }
            ResponseHandler::Proxy(proxy) => proxy.apply(overlay).map(ResponseHandler::Proxy),
        }
    }
}

fn apply_all(handlers: &[ResponseHandler], overlay: &Overlay) -> Option<Vec<ResponseHandler>> {
    let applied: Vec<Option<ResponseHandler>> =
        handlers.iter().map(|handler| handler.apply(overlay)).collect();
    if applied.iter().all(Option::is_none) {
        return None;
    }

    Some(
        applied
            .into_iter()
            .zip(handlers)
            .map(|(applied, original)| applied.unwrap_or_else(|| original.clone()))
            .collect(),
    )
}
