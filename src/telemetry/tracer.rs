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

use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use futures::future::LocalBoxFuture;
use std::future::ready;
use std::rc::Rc;
use std::task::{Context as TaskContext, Poll};
use tracing::field::Empty;
use tracing::Instrument;

#[cfg(feature = "otel")]
use crate::config::TelemetryConfig;

/// Adapts actix-web's `HeaderMap` so W3C `traceparent`/`tracestate` headers
/// can be extracted from incoming requests.
#[cfg(feature = "otel")]
struct ActixHeaderExtractor<'a>(&'a actix_web::http::header::HeaderMap);

#[cfg(feature = "otel")]
impl opentelemetry::propagation::Extractor for ActixHeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// Builds the OTLP span pipeline and registers it globally.
#[cfg(feature = "otel")]
pub fn init_tracer_provider(
    config: &TelemetryConfig,
) -> anyhow::Result<opentelemetry_sdk::trace::SdkTracerProvider> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use std::time::Duration;
    use tracing::{info, warn};

    let resource = opentelemetry_sdk::Resource::builder()
        .with_attributes(vec![
            KeyValue::new("service.name", config.service_name.clone()),
            KeyValue::new("service.version", config.service_version.clone()),
        ])
        .build();

    let timeout = Duration::from_secs(config.timeout_seconds);
    let protocol = config.protocol.to_lowercase();
    let exporter = match protocol.as_str() {
        "http" => {
            let endpoint = if config.endpoint.contains("/v1/traces") {
                config.endpoint.clone()
            } else {
                format!("{}/v1/traces", config.endpoint.trim_end_matches('/'))
            };
            info!("Configuring HTTP span exporter with endpoint: {}", endpoint);
            opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .with_endpoint(&endpoint)
                .with_timeout(timeout)
                .build()
        }
        other => {
            if other != "grpc" {
                warn!("Unknown protocol '{}', defaulting to gRPC", other);
            }
            info!(
                "Configuring gRPC span exporter with endpoint: {}",
                config.endpoint
            );
            opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(&config.endpoint)
                .with_timeout(timeout)
                .build()
        }
    }
    .map_err(|e| anyhow::anyhow!("OpenTelemetry span exporter build failed: {}", e))?;

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .with_sampler(opentelemetry_sdk::trace::Sampler::ParentBased(Box::new(
            opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(config.sampling_rate),
        )))
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());
    opentelemetry::global::set_text_map_propagator(
        opentelemetry_sdk::propagation::TraceContextPropagator::new(),
    );

    Ok(provider)
}

pub fn tracing_middleware() -> TracingMiddleware {
    TracingMiddleware
}

/// Opens a `stub.request` span around every HTTP exchange and logs the
/// status class when it completes.
pub struct TracingMiddleware;

impl<S, B> Transform<S, ServiceRequest> for TracingMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Transform = TracingMiddlewareService<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TracingMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct TracingMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for TracingMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        let span = tracing::info_span!(
            "stub.request",
            http.method = %req.method(),
            http.target = %req.path(),
            http.response.status_code = Empty,
            request.id = Empty,
        );

        #[cfg(feature = "otel")]
        {
            use opentelemetry::propagation::TextMapPropagator;
            use opentelemetry_sdk::propagation::TraceContextPropagator;
            use tracing_opentelemetry::OpenTelemetrySpanExt;

            let parent_cx = TraceContextPropagator::new().extract(&ActixHeaderExtractor(req.headers()));
            let _ = span.set_parent(parent_cx);
        }

        Box::pin(
            async move {
                let response = service.call(req).await?;
                let status = response.status().as_u16();
                tracing::Span::current().record("http.response.status_code", status);

                if (200..300).contains(&status) {
                    tracing::info!("Request successful");
                } else if (300..400).contains(&status) {
                    tracing::info!("Redirection");
                } else if (400..500).contains(&status) {
                    tracing::warn!("Client error");
                } else if status >= 500 {
                    tracing::error!("Server error");
                }

                Ok(response)
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;
    use actix_web::web;
    use actix_web::App;
    use actix_web::HttpResponse;

    #[actix_web::test]
    async fn test_tracing_middleware() {
        let app = test::init_service(App::new().wrap(tracing_middleware()).route(
            "/test",
            web::get().to(|| async { HttpResponse::Ok().finish() }),
        ))
        .await;

        let req = test::TestRequest::get().uri("/test").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }

    #[actix_web::test]
    async fn test_tracing_middleware_passes_every_status_class() {
        let app = test::init_service(
            App::new()
                .wrap(tracing_middleware())
                .route(
                    "/created",
                    web::post().to(|| async { HttpResponse::Created().finish() }),
                )
                .route(
                    "/moved",
                    web::get().to(|| async {
                        HttpResponse::Found()
                            .insert_header(("Location", "/created"))
                            .finish()
                    }),
                )
                .route(
                    "/missing",
                    web::get().to(|| async { HttpResponse::NotFound().finish() }),
                )
                .route(
                    "/error",
                    web::get().to(|| async { HttpResponse::InternalServerError().finish() }),
                ),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::post().uri("/created").to_request()).await;
        assert_eq!(resp.status(), 201);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/moved").to_request()).await;
        assert_eq!(resp.status(), 302);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/missing").to_request()).await;
        assert_eq!(resp.status(), 404);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/error").to_request()).await;
        assert_eq!(resp.status(), 500);
    }

    #[actix_web::test]
    async fn test_handler_runs_inside_request_span() {
        let app = test::init_service(App::new().wrap(tracing_middleware()).route(
            "/span",
            web::get().to(|| async {
                let name = tracing::Span::current()
                    .metadata()
                    .map(|metadata| metadata.name())
                    .unwrap_or("none");
                HttpResponse::Ok().body(name)
            }),
        ))
        .await;

        let req = test::TestRequest::get().uri("/span").to_request();
        let body = test::call_and_read_body(&app, req).await;
        // Without a subscriber spans are disabled and carry no metadata.
        assert!(body == "stub.request" || body == "none");
    }

    #[actix_web::test]
    async fn test_tracing_middleware_with_traceparent_header() {
        let app = test::init_service(App::new().wrap(tracing_middleware()).route(
            "/propagate",
            web::get().to(|| async { HttpResponse::Ok().finish() }),
        ))
        .await;

        let req = test::TestRequest::get()
            .uri("/propagate")
            .insert_header((
                "traceparent",
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            ))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }
}
