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

use crate::model::{HttpRequest as StubRequest, MessageContent, Request, Response};
use crate::server::app::AppState;
use crate::server::Exchange;
use actix_web::http::header::{HeaderName as ActixHeaderName, HeaderValue as ActixHeaderValue};
use actix_web::http::{StatusCode as ActixStatusCode, Version as ActixVersion};
use actix_web::web;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Version};
use std::time::Instant;
use tracing::{info, Instrument, Span};

pub async fn request_handler(
    req: HttpRequest,
    body: web::Bytes,
    data: web::Data<AppState>,
) -> HttpResponse {
    let start_time = Instant::now();
    let span = Span::current();

    let request_id = uuid::Uuid::new_v4().to_string();
    span.record("request.id", &request_id);

    info!(
        method = %req.method(),
        path = %req.uri().path(),
        request_id = %request_id,
        "Processing request"
    );

    let request = match to_stub_request(&req, body) {
        Ok(request) => request,
        Err(reason) => return bad_request(&data, &request_id, &reason),
    };

    let exchange = data
        .dispatcher
        .dispatch(Request::Http(request))
        .instrument(span)
        .await;
    let latency = start_time.elapsed().as_millis() as u64;

    match exchange {
        Exchange::Handled(response) => {
            let response = to_actix_response(response);
            info!(
                request_id = %request_id,
                status = response.status().as_u16(),
                latency_ms = latency,
                "Request completed"
            );
            response
        }
        Exchange::Unmatched => {
            info!(request_id = %request_id, latency_ms = latency, "No rule matched");
            HttpResponse::NotFound().finish()
        }
        Exchange::Failed(e) => {
            tracing::error!(
                request_id = %request_id,
                error = %e,
                latency_ms = latency,
                "Request processing failed"
            );
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Internal server error",
                "request_id": request_id
            }))
        }
    }
}

fn bad_request(data: &AppState, request_id: &str, reason: &str) -> HttpResponse {
    tracing::warn!(request_id = %request_id, reason = %reason, "Rejecting malformed request");
    data.dispatcher.report_error(reason);
    HttpResponse::BadRequest().json(serde_json::json!({
        "error": reason,
        "request_id": request_id
    }))
}

/// Copies an actix request into the transport-independent model.
fn to_stub_request(req: &HttpRequest, body: web::Bytes) -> Result<StubRequest, String> {
    let method = Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|e| format!("Invalid method: {}", e))?;

    let mut headers = HeaderMap::new();
    for (name, value) in req.headers() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }

    let mut content = MessageContent::new(body.to_vec());
    if let Some(charset) = declared_charset(&headers) {
        content = content.with_charset(charset);
    }

    let client_address = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();

    Ok(StubRequest::builder()
        .version(to_http_version(req.version()))
        .method(method)
        .uri(req.path())
        .query_string(req.query_string())
        .headers(headers)
        .content(content)
        .client_address(client_address)
        .build())
}

fn declared_charset(headers: &HeaderMap) -> Option<String> {
    let content_type: mime::Mime = headers
        .get(http::header::CONTENT_TYPE)?
        .to_str()
        .ok()?
        .parse()
        .ok()?;
    content_type
        .get_param(mime::CHARSET)
        .map(|charset| charset.as_str().to_string())
}

fn to_http_version(version: ActixVersion) -> Version {
    match version {
        ActixVersion::HTTP_09 => Version::HTTP_09,
        ActixVersion::HTTP_10 => Version::HTTP_10,
        ActixVersion::HTTP_2 => Version::HTTP_2,
        ActixVersion::HTTP_3 => Version::HTTP_3,
        _ => Version::HTTP_11,
    }
}

fn to_actix_version(version: Version) -> ActixVersion {
    match version {
        Version::HTTP_09 => ActixVersion::HTTP_09,
        Version::HTTP_10 => ActixVersion::HTTP_10,
        Version::HTTP_2 => ActixVersion::HTTP_2,
        Version::HTTP_3 => ActixVersion::HTTP_3,
        _ => ActixVersion::HTTP_11,
    }
}

pub(crate) fn to_actix_response(mut response: Response) -> HttpResponse {
    let status = ActixStatusCode::from_u16(response.status().as_u16())
        .unwrap_or(ActixStatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = HttpResponse::build(status);

    for (name, value) in response.headers() {
        if let (Ok(name), Ok(value)) = (
            ActixHeaderName::from_bytes(name.as_str().as_bytes()),
            ActixHeaderValue::from_bytes(value.as_bytes()),
        ) {
            builder.append_header((name, value));
        }
    }

    let version = to_actix_version(response.version());
    let mut http_response = match response.take_content() {
        Some(content) => builder.body(content.into_bytes()),
        None => builder.finish(),
    };
    http_response.head_mut().version = version;
    http_response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::tests::RecordingMonitor;
    use crate::rules::RuleSet;
    use crate::server::Dispatcher;
    use actix_web::test;
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_to_stub_request_copies_attributes() {
        let req = test::TestRequest::post()
            .uri("/orders?id=7&id=8")
            .insert_header(("Content-Type", "text/plain; charset=iso-8859-1"))
            .insert_header(("Cookie", "session=abc"))
            .to_http_request();

        let request = to_stub_request(&req, web::Bytes::from_static(b"payload")).unwrap();
        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.uri(), "/orders");
        assert_eq!(
            request.query("id"),
            Some(&["7".to_string(), "8".to_string()][..])
        );
        assert_eq!(request.cookies().get("session").unwrap(), "abc");
        assert_eq!(request.content().unwrap().bytes(), b"payload");
        assert_eq!(request.content().unwrap().charset(), Some("iso-8859-1"));
    }

    #[actix_web::test]
    async fn test_binary_body_is_kept() {
        let req = test::TestRequest::post().uri("/bin").to_http_request();
        let request = to_stub_request(&req, web::Bytes::from(vec![0u8, 159, 146, 150])).unwrap();
        assert_eq!(request.content().unwrap().bytes(), &[0u8, 159, 146, 150]);
    }

    #[actix_web::test]
    async fn test_bad_request_is_reported_to_monitor() {
        let monitor = Arc::new(RecordingMonitor::default());
        let state = AppState {
            dispatcher: Dispatcher::new(RuleSet::default(), monitor.clone()),
        };

        let response = bad_request(&state, "req-1", "Invalid method: X");
        assert_eq!(response.status(), ActixStatusCode::BAD_REQUEST);
        assert_eq!(monitor.events(), vec!["error:Invalid method: X".to_string()]);
    }

    #[actix_web::test]
    async fn test_to_actix_response() {
        let mut response = Response::new();
        response.set_status(http::StatusCode::CREATED);
        response
            .headers_mut()
            .append("x-a", HeaderValue::from_static("1"));
        response
            .headers_mut()
            .append("x-a", HeaderValue::from_static("2"));
        response.set_content(MessageContent::from("made"));

        let converted = to_actix_response(response);
        assert_eq!(converted.status(), ActixStatusCode::CREATED);
        assert_eq!(converted.headers().get_all("x-a").count(), 2);
    }
}
