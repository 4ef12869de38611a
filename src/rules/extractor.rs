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

use crate::model::{HttpRequest, Request};
use http::HeaderName;
use std::collections::BTreeMap;

/// A single attribute pulled out of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extractor {
    Uri,
    Method,
    Version,
    Header(HeaderName),
    Query(String),
    Cookie(String),
    /// Whole body, or the raw payload of a socket request.
    Content,
    JsonPath(String),
    Form(String),
    ClientAddress,
}

/// What an extractor found. Multi-valued attributes (repeated query
/// parameters or headers) keep every value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Text(Vec<String>),
    Binary(Vec<u8>),
}

impl Extracted {
    fn single(value: impl Into<String>) -> Self {
        Extracted::Text(vec![value.into()])
    }

    /// Values as text; binary content is decoded lossily.
    pub fn texts(&self) -> Vec<String> {
        match self {
            Extracted::Text(values) => values.clone(),
            Extracted::Binary(bytes) => vec![String::from_utf8_lossy(bytes).into_owned()],
        }
    }
}

impl Extractor {
    pub fn header(name: HeaderName) -> Self {
        Extractor::Header(name)
    }

    pub fn query(name: impl Into<String>) -> Self {
        Extractor::Query(name.into())
    }

    pub fn cookie(name: impl Into<String>) -> Self {
        Extractor::Cookie(name.into())
    }

    pub fn json_path(path: impl Into<String>) -> Self {
        Extractor::JsonPath(path.into())
    }

    pub fn form(name: impl Into<String>) -> Self {
        Extractor::Form(name.into())
    }

    pub fn is_uri(&self) -> bool {
        matches!(self, Extractor::Uri)
    }

    pub fn extract(&self, request: &Request) -> Option<Extracted> {
        match self {
            Extractor::Content => request
                .content()
                .map(|content| Extracted::Binary(content.bytes().to_vec())),
            Extractor::ClientAddress => request.client_address().map(Extracted::single),
            Extractor::JsonPath(path) => {
                let content = request.content()?;
                let json: serde_json::Value = serde_json::from_slice(content.bytes()).ok()?;
                extract_json_path(&json, path)
            }
            _ => self.extract_http(request.as_http()?),
        }
    }

    fn extract_http(&self, request: &HttpRequest) -> Option<Extracted> {
        match self {
            Extractor::Uri => Some(Extracted::single(request.uri())),
            Extractor::Method => Some(Extracted::single(request.method().as_str())),
            Extractor::Version => Some(Extracted::single(format!("{:?}", request.version()))),
            Extractor::Header(name) => {
                let values: Vec<String> = request
                    .headers()
                    .get_all(name)
                    .iter()
                    .filter_map(|value| value.to_str().ok())
                    .map(str::to_string)
                    .collect();
                (!values.is_empty()).then_some(Extracted::Text(values))
            }
            Extractor::Query(name) => request
                .query(name)
                .map(|values| Extracted::Text(values.to_vec())),
            Extractor::Cookie(name) => request.cookies().get(name).map(Extracted::single),
            Extractor::Form(name) => parse_form(request).remove(name).map(Extracted::Text),
            Extractor::Content | Extractor::ClientAddress | Extractor::JsonPath(_) => None,
        }
    }
}

fn extract_json_path(json: &serde_json::Value, path: &str) -> Option<Extracted> {
    use jsonpath_rust::JsonPath;

    let path = match JsonPath::try_from(path) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Invalid JSON path expression");
            return None;
        }
    };

    let found = match path.find(json) {
        serde_json::Value::Null => return None,
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };

    let values: Vec<String> = found
        .into_iter()
        .map(|value| match value {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        })
        .collect();

    (!values.is_empty()).then_some(Extracted::Text(values))
}

/// Parses a `application/x-www-form-urlencoded` body into its fields.
pub(crate) fn parse_form(request: &HttpRequest) -> BTreeMap<String, Vec<String>> {
    let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if let Some(content) = request.content() {
        for (name, value) in url::form_urlencoded::parse(content.bytes()) {
            fields
                .entry(name.into_owned())
                .or_default()
                .push(value.into_owned());
        }
    }
    fields
}
