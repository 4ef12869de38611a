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

use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn a resource into bytes for a given request.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("resource {0:?} not found on the resource search path")]
    NotFound(PathBuf),

    #[error("template rendering failed: {0}")]
    Template(String),

    #[error("failed to serialize JSON resource: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no resource in the fallback chain could be read")]
    Exhausted,
}

/// Failure of an outbound HTTP action.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("invalid outbound url {0}")]
    InvalidUrl(String),

    #[error("outbound request failed: {0}")]
    Transport(String),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// Failure raised while a response handler mutates the response.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("proxy request failed: {0}")]
    Proxy(#[from] ActionError),

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
}

/// Invalid handler or matcher construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("{0} requires at least one handler")]
    EmptyHandlers(&'static str),

    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),

    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    #[error("invalid method {0:?}")]
    InvalidMethod(String),

    #[error("invalid latency range: {min_ms}ms > {max_ms}ms")]
    InvalidLatency { min_ms: u128, max_ms: u128 },
}

/// Two servers could not be combined.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("cannot merge a {left} server with a {right} server")]
    IncompatibleTransport {
        left: &'static str,
        right: &'static str,
    },
}
