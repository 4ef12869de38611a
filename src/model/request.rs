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

use http::header::COOKIE;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Version};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Raw message payload plus the charset it was declared with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageContent {
    data: Vec<u8>,
    charset: Option<String>,
}

impl MessageContent {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            charset: None,
        }
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Body decoded as UTF-8; invalid sequences are replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for MessageContent {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        Self::new(value.into_bytes())
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    version: Version,
    method: Method,
    uri: String,
    queries: BTreeMap<String, Vec<String>>,
    raw_query: Option<String>,
    headers: HeaderMap,
    cookies: BTreeMap<String, String>,
    content: Option<MessageContent>,
    client_address: Option<String>,
}

impl HttpRequest {
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::default()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target path without the query string.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn queries(&self) -> &BTreeMap<String, Vec<String>> {
        &self.queries
    }

    pub fn query(&self, name: &str) -> Option<&[String]> {
        self.queries.get(name).map(Vec::as_slice)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    pub fn content(&self) -> Option<&MessageContent> {
        self.content.as_ref()
    }

    pub fn client_address(&self) -> Option<&str> {
        self.client_address.as_deref()
    }

    /// Query string without the leading `?`, exactly as received. Requests
    /// built from individual parameters get it encoded from those.
    pub fn query_string(&self) -> Cow<'_, str> {
        if let Some(raw) = &self.raw_query {
            return Cow::Borrowed(raw);
        }

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, values) in &self.queries {
            for value in values {
                serializer.append_pair(name, value);
            }
        }
        Cow::Owned(serializer.finish())
    }
}

#[derive(Debug)]
pub struct HttpRequestBuilder {
    version: Version,
    method: Method,
    uri: String,
    queries: BTreeMap<String, Vec<String>>,
    raw_query: Option<String>,
    headers: HeaderMap,
    content: Option<MessageContent>,
    client_address: Option<String>,
}

impl Default for HttpRequestBuilder {
    fn default() -> Self {
        Self {
            version: Version::HTTP_11,
            method: Method::GET,
            uri: "/".to_string(),
            queries: BTreeMap::new(),
            raw_query: Some(String::new()),
            headers: HeaderMap::new(),
            content: None,
            client_address: None,
        }
    }
}

impl HttpRequestBuilder {
    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the target. A `?query` suffix is split off and parsed into parameters.
    pub fn uri(mut self, uri: &str) -> Self {
        match uri.split_once('?') {
            Some((path, query)) => {
                self.uri = path.to_string();
                self = self.query_string(query);
            }
            None => self.uri = uri.to_string(),
        }
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_query(name.into(), value.into());
        self.raw_query = None;
        self
    }

    /// Parses `query` into parameters and keeps the raw text for forwarding.
    pub fn query_string(mut self, query: &str) -> Self {
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            self.push_query(name.into_owned(), value.into_owned());
        }
        if let Some(raw) = self.raw_query.as_mut() {
            if !raw.is_empty() && !query.is_empty() {
                raw.push('&');
            }
            raw.push_str(query);
        }
        self
    }

    fn push_query(&mut self, name: String, value: String) {
        self.queries.entry(name).or_default().push(value);
    }

    /// Appends a header. Invalid names or values are skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn content(mut self, content: impl Into<MessageContent>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn client_address(mut self, address: impl Into<String>) -> Self {
        self.client_address = Some(address.into());
        self
    }

    pub fn build(self) -> HttpRequest {
        let cookies = parse_cookies(&self.headers);
        let content = self.content.filter(|content| !content.is_empty());

        HttpRequest {
            version: self.version,
            method: self.method,
            uri: self.uri,
            queries: self.queries,
            raw_query: self.raw_query,
            headers: self.headers,
            cookies,
            content,
            client_address: self.client_address,
        }
    }
}

fn parse_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().trim_matches('"').to_string()))
        })
        .collect()
}

/// Raw payload received on a plain socket.
#[derive(Debug, Clone)]
pub struct SocketRequest {
    content: MessageContent,
    client_address: String,
}

impl SocketRequest {
    pub fn new(content: impl Into<MessageContent>, client_address: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            client_address: client_address.into(),
        }
    }

    pub fn content(&self) -> &MessageContent {
        &self.content
    }

    pub fn client_address(&self) -> &str {
        &self.client_address
    }
}

/// Inbound request as seen by matchers and handlers. Never mutated once built.
#[derive(Debug, Clone)]
pub enum Request {
    Http(HttpRequest),
    Socket(SocketRequest),
}

impl Request {
    pub fn as_http(&self) -> Option<&HttpRequest> {
        match self {
            Request::Http(request) => Some(request),
            Request::Socket(_) => None,
        }
    }

    pub fn content(&self) -> Option<&MessageContent> {
        match self {
            Request::Http(request) => request.content(),
            Request::Socket(request) => Some(request.content()),
        }
    }

    pub fn client_address(&self) -> Option<&str> {
        match self {
            Request::Http(request) => request.client_address(),
            Request::Socket(request) => Some(request.client_address()),
        }
    }
}

impl From<HttpRequest> for Request {
    fn from(request: HttpRequest) -> Self {
        Request::Http(request)
    }
}

impl From<SocketRequest> for Request {
    fn from(request: SocketRequest) -> Self {
        Request::Socket(request)
    }
}
