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

use crate::error::ResourceError;
use crate::model::{MessageContent, Request};
use crate::rules::overlay::Overlay;
use crate::rules::template;
use futures::future::BoxFuture;
use mime::Mime;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Environment variable listing extra directories searched by [`Resource::Search`].
pub const RESOURCE_PATH_ENV: &str = "STUBWIRE_RESOURCE_PATH";

type JsonFn = dyn Fn(Option<&Request>) -> serde_json::Value + Send + Sync;

/// Where a JSON resource gets its value from.
#[derive(Clone)]
pub enum JsonSource {
    Value(serde_json::Value),
    Function(Arc<JsonFn>),
}

impl fmt::Debug for JsonSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonSource::Value(value) => f.debug_tuple("Value").field(value).finish(),
            JsonSource::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Resource whose every read moves to the next value, wrapping around.
#[derive(Debug, Clone)]
pub struct CycleResource {
    values: Arc<[Resource]>,
    cursor: Arc<AtomicUsize>,
}

impl CycleResource {
    fn new(values: Vec<Resource>) -> Self {
        Self {
            values: values.into(),
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn advance(&self) -> Option<&Resource> {
        let len = self.values.len();
        if len == 0 {
            return None;
        }
        let index = match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some((current + 1) % len)
            }) {
            Ok(previous) | Err(previous) => previous,
        };
        self.values.get(index)
    }
}

/// Lazily evaluated content, optionally bound to the request being served.
///
/// Reads have no side effects except for [`Resource::Cycle`], whose cursor
/// advances on every read.
#[derive(Debug, Clone)]
pub enum Resource {
    Text(String),
    Bytes(Vec<u8>),
    File(PathBuf),
    /// Relative path looked up in `STUBWIRE_RESOURCE_PATH` then the working directory.
    Search(PathBuf),
    Template {
        source: Box<Resource>,
        vars: BTreeMap<String, Resource>,
    },
    Json(JsonSource),
    /// First member that reads successfully wins.
    Fallback(Vec<Resource>),
    Cycle(CycleResource),
}

impl Resource {
    pub fn text(text: impl Into<String>) -> Self {
        Resource::Text(text.into())
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Resource::Bytes(bytes.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Resource::File(path.into())
    }

    pub fn search(path: impl Into<PathBuf>) -> Self {
        Resource::Search(path.into())
    }

    pub fn template(source: Resource) -> Self {
        Self::template_with(source, BTreeMap::new())
    }

    pub fn template_with(source: Resource, vars: BTreeMap<String, Resource>) -> Self {
        Resource::Template {
            source: Box::new(source),
            vars,
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Resource::Json(JsonSource::Value(value))
    }

    pub fn json_fn<F>(function: F) -> Self
    where
        F: Fn(Option<&Request>) -> serde_json::Value + Send + Sync + 'static,
    {
        Resource::Json(JsonSource::Function(Arc::new(function)))
    }

    pub fn fallback(resources: Vec<Resource>) -> Self {
        Resource::Fallback(resources)
    }

    pub fn cycle(values: Vec<Resource>) -> Self {
        Resource::Cycle(CycleResource::new(values))
    }

    /// The literal text, when this resource is plain static text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Resource::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn read_for(&self, request: Option<&Request>) -> Result<MessageContent, ResourceError> {
        match self {
            Resource::Text(text) => Ok(MessageContent::from(text.as_str()).with_charset("utf-8")),
            Resource::Bytes(bytes) => Ok(MessageContent::new(bytes.clone())),
            Resource::File(path) => read_file(path),
            Resource::Search(path) => {
                let found = search_roots()
                    .into_iter()
                    .map(|root| root.join(path))
                    .find(|candidate| candidate.is_file())
                    .ok_or_else(|| ResourceError::NotFound(path.clone()))?;
                read_file(&found)
            }
            Resource::Template { source, vars } => {
                let template = source.read_for(request)?;
                let vars = vars
                    .iter()
                    .map(|(name, value)| {
                        let value = value.read_for(request)?;
                        Ok((name.clone(), value.text().into_owned()))
                    })
                    .collect::<Result<BTreeMap<_, _>, ResourceError>>()?;
                render(&template, request, &vars)
            }
            Resource::Json(JsonSource::Value(value)) => {
                Ok(MessageContent::from(serde_json::to_string(value)?).with_charset("utf-8"))
            }
            Resource::Json(JsonSource::Function(function)) => {
                let value = function(request);
                Ok(MessageContent::from(serde_json::to_string(&value)?).with_charset("utf-8"))
            }
            Resource::Fallback(resources) => {
                for resource in resources {
                    match resource.read_for(request) {
                        Ok(content) => return Ok(content),
                        Err(e) => tracing::debug!(error = %e, "Fallback resource skipped"),
                    }
                }
                Err(ResourceError::Exhausted)
            }
            Resource::Cycle(cycle) => cycle
                .advance()
                .ok_or(ResourceError::Exhausted)?
                .read_for(request),
        }
    }

    /// Same as [`Resource::read_for`], with file access on the tokio blocking pool.
    pub fn read<'a>(
        &'a self,
        request: Option<&'a Request>,
    ) -> BoxFuture<'a, Result<MessageContent, ResourceError>> {
        Box::pin(async move {
            match self {
                Resource::File(path) => read_file_async(path).await,
                Resource::Search(path) => {
                    let found = search_async(path).await?;
                    read_file_async(&found).await
                }
                Resource::Template { source, vars } => {
                    let template = source.read(request).await?;
                    let mut values = BTreeMap::new();
                    for (name, value) in vars {
                        let value = value.read(request).await?;
                        values.insert(name.clone(), value.text().into_owned());
                    }
                    render(&template, request, &values)
                }
                Resource::Fallback(resources) => {
                    for resource in resources {
                        match resource.read(request).await {
                            Ok(content) => return Ok(content),
                            Err(e) => tracing::debug!(error = %e, "Fallback resource skipped"),
                        }
                    }
                    Err(ResourceError::Exhausted)
                }
                Resource::Cycle(cycle) => {
                    cycle
                        .advance()
                        .ok_or(ResourceError::Exhausted)?
                        .read(request)
                        .await
                }
                Resource::Text(_) | Resource::Bytes(_) | Resource::Json(_) => {
                    self.read_for(request)
                }
            }
        })
    }

    /// Content type this resource is served with unless a handler overrides it.
    pub fn content_type(&self) -> Mime {
        match self {
            Resource::Text(_) => mime::TEXT_PLAIN_UTF_8,
            Resource::Bytes(_) => mime::APPLICATION_OCTET_STREAM,
            Resource::File(path) | Resource::Search(path) => guess_content_type(path),
            Resource::Template { source, .. } => match source.as_ref() {
                Resource::File(path) | Resource::Search(path) => guess_content_type(path),
                _ => mime::TEXT_PLAIN_UTF_8,
            },
            Resource::Json(_) => mime::APPLICATION_JSON,
            Resource::Fallback(resources) => resources
                .first()
                .map(Resource::content_type)
                .unwrap_or(mime::TEXT_PLAIN_UTF_8),
            Resource::Cycle(cycle) => cycle
                .values
                .first()
                .map(Resource::content_type)
                .unwrap_or(mime::TEXT_PLAIN_UTF_8),
        }
    }

    /// Applies an overlay. `None` means the resource is unaffected.
    pub fn apply(&self, overlay: &Overlay) -> Option<Resource> {
        match self {
            Resource::File(path) => match overlay {
                Overlay::FileRoot(root) if path.is_relative() => {
                    Some(Resource::File(root.join(path)))
                }
                _ => None,
            },
            Resource::Template { source, vars } => {
                let applied_source = source.apply(overlay);
                let applied_vars = apply_all(vars.values(), overlay);
                if applied_source.is_none() && applied_vars.is_none() {
                    return None;
                }

                let vars = match applied_vars {
                    Some(values) => vars.keys().cloned().zip(values).collect(),
                    None => vars.clone(),
                };
                Some(Resource::Template {
                    source: Box::new(applied_source.unwrap_or_else(|| source.as_ref().clone())),
                    vars,
                })
            }
            Resource::Fallback(resources) => {
                apply_all(resources.iter(), overlay).map(Resource::Fallback)
            }
            Resource::Cycle(cycle) => {
                apply_all(cycle.values.iter(), overlay).map(Resource::cycle)
            }
            Resource::Text(_)
            | Resource::Bytes(_)
            | Resource::Search(_)
            | Resource::Json(_) => None,
        }
    }
}

impl From<&str> for Resource {
    fn from(value: &str) -> Self {
        Resource::text(value)
    }
}

impl From<String> for Resource {
    fn from(value: String) -> Self {
        Resource::Text(value)
    }
}

/// Applies an overlay to every member, rebuilding the list only if one changed.
fn apply_all<'a>(
    resources: impl Iterator<Item = &'a Resource>,
    overlay: &Overlay,
) -> Option<Vec<Resource>> {
    let mut changed = false;
    let applied: Vec<Resource> = resources
        .map(|resource| match resource.apply(overlay) {
            Some(applied) => {
                changed = true;
                applied
            }
            None => resource.clone(),
        })
        .collect();

    changed.then_some(applied)
}

fn read_file(path: &Path) -> Result<MessageContent, ResourceError> {
    std::fs::read(path)
        .map(MessageContent::new)
        .map_err(|source| ResourceError::Io {
            path: path.to_path_buf(),
            source,
        })
}

async fn read_file_async(path: &Path) -> Result<MessageContent, ResourceError> {
    tokio::fs::read(path)
        .await
        .map(MessageContent::new)
        .map_err(|source| ResourceError::Io {
            path: path.to_path_buf(),
            source,
        })
}

async fn search_async(path: &Path) -> Result<PathBuf, ResourceError> {
    for root in search_roots() {
        let candidate = root.join(path);
        if let Ok(metadata) = tokio::fs::metadata(&candidate).await {
            if metadata.is_file() {
                return Ok(candidate);
            }
        }
    }
    Err(ResourceError::NotFound(path.to_path_buf()))
}

fn render(
    template: &MessageContent,
    request: Option<&Request>,
    vars: &BTreeMap<String, String>,
) -> Result<MessageContent, ResourceError> {
    let rendered = template::render(&template.text(), request, vars)?;
    Ok(MessageContent::from(rendered).with_charset("utf-8"))
}

fn search_roots() -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = std::env::var_os(RESOURCE_PATH_ENV)
        .map(|value| std::env::split_paths(&value).collect())
        .unwrap_or_default();
    roots.push(PathBuf::from("."));
    roots
}

fn guess_content_type(path: &Path) -> Mime {
    let guessed = mime_guess::from_path(path).first_or(mime::TEXT_PLAIN_UTF_8);
    if guessed.type_() == mime::TEXT && guessed.get_param(mime::CHARSET).is_none() {
        format!("{}; charset=utf-8", guessed)
            .parse()
            .unwrap_or(guessed)
    } else {
        guessed
    }
}
