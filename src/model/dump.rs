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

//! Human-readable text dumps of requests and responses for monitors.

use crate::model::{HttpRequest, MessageContent, Request, Response};
use http::HeaderMap;
use std::fmt::Write;

pub fn dump_request(request: &Request) -> String {
    match request {
        Request::Http(request) => dump_http_request(request),
        Request::Socket(request) => {
            format!(
                "Socket request from {}\n\n{}",
                request.client_address(),
                request.content().text()
            )
        }
    }
}

pub fn dump_http_request(request: &HttpRequest) -> String {
    let mut out = String::new();
    let query = request.query_string();
    let target = if query.is_empty() {
        request.uri().to_string()
    } else {
        format!("{}?{}", request.uri(), query)
    };

    let _ = writeln!(out, "{} {} {:?}", request.method(), target, request.version());
    write_headers(&mut out, request.headers());
    write_content(&mut out, request.content());
    out
}

/// Dumps a response. Socket exchanges only carry a payload, so pass
/// `socket = true` to skip the status line and headers.
pub fn dump_response(response: &Response, socket: bool) -> String {
    let mut out = String::new();
    if !socket {
        let status = response.status();
        let _ = writeln!(
            out,
            "{:?} {} {}",
            response.version(),
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        );
        write_headers(&mut out, response.headers());
    }
    write_content(&mut out, response.content());
    out
}

fn write_headers(out: &mut String, headers: &HeaderMap) {
    for (name, value) in headers {
        let _ = writeln!(out, "{}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
}

fn write_content(out: &mut String, content: Option<&MessageContent>) {
    if let Some(content) = content {
        out.push('\n');
        out.push_str(&content.text());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SocketRequest;
    use http::{Method, StatusCode};

    #[test]
    fn test_dump_http_request() {
        let request = HttpRequest::builder()
            .method(Method::POST)
            .uri("/users?id=1")
            .header("content-type", "application/json")
            .content("{}")
            .build();

        let dumped = dump_http_request(&request);
        assert!(dumped.starts_with("POST /users?id=1 HTTP/1.1\n"));
        assert!(dumped.contains("content-type: application/json\n"));
        assert!(dumped.ends_with("\n{}"));
    }

    #[test]
    fn test_dump_response() {
        let mut response = Response::new();
        response.set_status(StatusCode::NOT_FOUND);
        response.set_content("missing".into());

        let dumped = dump_response(&response, false);
        assert!(dumped.starts_with("HTTP/1.1 404 Not Found\n"));
        assert!(dumped.ends_with("missing"));

        assert_eq!(dump_response(&response, true), "\nmissing");
    }

    #[test]
    fn test_dump_socket_request() {
        let request = Request::Socket(SocketRequest::new("ping", "10.0.0.1"));
        assert_eq!(dump_request(&request), "Socket request from 10.0.0.1\n\nping");
    }
}
