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

//! Transforms applied across a whole rule set.
//!
//! Every `apply` in the rule algebra takes an [`Overlay`] and returns
//! `Option<Self>`: `None` when nothing underneath changed, so callers keep
//! (and share) the original value.

use crate::rules::resource::Resource;
use http::HeaderName;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum Overlay {
    /// Mounts every URI expectation under a path prefix.
    Context(String),
    /// Resolves relative file resources under a directory.
    FileRoot(PathBuf),
    /// Adds a header to every response produced by the rule set.
    ResponseHeader { name: HeaderName, value: Resource },
}

impl Overlay {
    pub fn context(prefix: impl Into<String>) -> Self {
        Overlay::Context(prefix.into())
    }

    pub fn file_root(root: impl Into<PathBuf>) -> Self {
        Overlay::FileRoot(root.into())
    }

    pub fn response_header(name: HeaderName, value: impl Into<Resource>) -> Self {
        Overlay::ResponseHeader {
            name,
            value: value.into(),
        }
    }
}

/// Joins a context prefix and a URI with exactly one slash between them.
pub(crate) fn join_context(prefix: &str, uri: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if uri.is_empty() {
        return prefix.to_string();
    }
    if uri.starts_with('/') {
        format!("{}{}", prefix, uri)
    } else {
        format!("{}/{}", prefix, uri)
    }
}

/// Applies an overlay to every header value, rebuilding the list only if one changed.
pub(crate) fn apply_headers(
    headers: &[(HeaderName, Resource)],
    overlay: &Overlay,
) -> Option<Vec<(HeaderName, Resource)>> {
    let applied: Vec<Option<Resource>> =
        headers.iter().map(|(_, value)| value.apply(overlay)).collect();
    if applied.iter().all(Option::is_none) {
        return None;
    }

    Some(
        applied
            .into_iter()
            .zip(headers)
            .map(|(applied, (name, value))| (name.clone(), applied.unwrap_or_else(|| value.clone())))
            .collect(),
    )
}
