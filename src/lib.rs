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

//! Declarative stub server for HTTP, HTTPS and raw socket dependencies.
//!
//! A [`StubServer`](server::StubServer) binds an ordered
//! [`RuleSet`](rules::RuleSet) to a transport. Each incoming request is
//! matched against the rules in order; the first match writes the response.

pub mod action;
pub mod config;
pub mod error;
pub mod model;
pub mod monitor;
pub mod rules;
pub mod server;
pub mod telemetry;
pub mod utils;
