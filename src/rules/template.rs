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

//! Handlebars rendering for templated resources.
//!
//! Templates see the request under `req` (`req.method`, `req.uri`,
//! `req.headers.<lower-case name>`, `req.queries.<name>` as a list,
//! `req.cookies`, `req.form`, `req.json`, `req.content`, `req.client_address`)
//! and any user variables at the top level.

use crate::error::ResourceError;
use crate::model::{HttpRequest, Request};
use handlebars::{Handlebars, RenderErrorReason};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

static ENGINE: Lazy<Handlebars<'static>> = Lazy::new(|| {
    let mut handlebars = Handlebars::new();
    handlebars.register_helper("now", Box::new(now_helper));
    handlebars.register_helper("uuid", Box::new(uuid_helper));
    handlebars.register_helper("random", Box::new(random_helper));
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
});

#[derive(Debug, Serialize)]
struct TemplateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    headers: BTreeMap<String, String>,
    queries: BTreeMap<String, Vec<String>>,
    cookies: BTreeMap<String, String>,
    form: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    json: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_address: Option<String>,
}

#[derive(Debug, Serialize)]
struct TemplateContext<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    req: Option<TemplateRequest>,
    #[serde(flatten)]
    vars: &'a BTreeMap<String, String>,
}

impl TemplateRequest {
    fn from_request(request: &Request) -> Self {
        let content = request.content().map(|content| content.text().into_owned());
        let json = content
            .as_deref()
            .and_then(|text| serde_json::from_str(text).ok());

        let mut template = Self {
            method: None,
            uri: None,
            version: None,
            content,
            headers: BTreeMap::new(),
            queries: BTreeMap::new(),
            cookies: BTreeMap::new(),
            form: BTreeMap::new(),
            json,
            client_address: request.client_address().map(str::to_string),
        };

        if let Request::Http(http) = request {
            template.fill_http(http);
        }

        template
    }

    fn fill_http(&mut self, request: &HttpRequest) {
        self.method = Some(request.method().to_string());
        self.uri = Some(request.uri().to_string());
        self.version = Some(format!("{:?}", request.version()));
        self.headers = request
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or("").to_string(),
                )
            })
            .collect();
        self.queries = request.queries().clone();
        self.cookies = request.cookies().clone();
        self.form = crate::rules::extractor::parse_form(request)
            .into_iter()
            .map(|(name, mut values)| (name, values.swap_remove(0)))
            .collect();
    }
}

/// Renders `template` against the request, if any, and user variables.
pub fn render(
    template: &str,
    request: Option<&Request>,
    vars: &BTreeMap<String, String>,
) -> Result<String, ResourceError> {
    let context = TemplateContext {
        req: request.map(TemplateRequest::from_request),
        vars,
    };

    ENGINE
        .render_template(template, &context)
        .map_err(|e| ResourceError::Template(e.to_string()))
}

fn now_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let now = chrono::Utc::now();
    match h.param(0).and_then(|v| v.value().as_str()) {
        Some(format) => {
            let mut rendered = String::new();
            write!(rendered, "{}", now.format(format)).map_err(|_| {
                RenderErrorReason::Other(format!("invalid date format {:?}", format))
            })?;
            out.write(&rendered)?;
        }
        None => out.write(&now.to_rfc3339())?,
    }
    Ok(())
}

fn uuid_helper(
    _: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    out.write(&uuid::Uuid::new_v4().to_string())?;
    Ok(())
}

fn random_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    use rand::Rng;

    let min = h.param(0).and_then(|v| v.value().as_i64()).unwrap_or(0);
    let max = h.param(1).and_then(|v| v.value().as_i64()).unwrap_or(100);
    let (min, max) = if min <= max { (min, max) } else { (max, min) };

    let value = rand::thread_rng().gen_range(min..=max);
    out.write(&value.to_string())?;
    Ok(())
}
