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

use crate::server::{tls, Binding, Dispatcher};
use crate::telemetry::tracer::tracing_middleware;
use actix_web::dev::Server;
use actix_web::web;
use actix_web::App;
use actix_web::HttpServer;
use anyhow::Context;
use std::net::SocketAddr;
use tracing::info;

#[derive(Debug, Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
}

/// A started HTTP(S) server and the addresses it listens on.
pub struct RunningHttp {
    pub server: Server,
    pub addrs: Vec<SocketAddr>,
}

pub fn run_http(binding: &Binding, dispatcher: Dispatcher) -> anyhow::Result<RunningHttp> {
    let addr = binding.address();
    let scheme = if binding.tls.is_some() { "https" } else { "http" };

    info!("Starting {} server on {}", scheme, addr);
    info!("Server workers: {}", binding.workers);
    info!("Max request size: {} bytes", binding.max_request_size);

    let max_request_size = binding.max_request_size;
    let server = HttpServer::new(move || {
        let app_state = web::Data::new(AppState {
            dispatcher: dispatcher.clone(),
        });

        App::new()
            .wrap(tracing_middleware())
            .app_data(app_state)
            .app_data(web::PayloadConfig::new(max_request_size))
            .default_service(web::to(crate::server::request_handler))
    })
    .workers(binding.workers.max(1));

    let server = match &binding.tls {
        Some(identity) => {
            let config = tls::load_server_config(identity)?;
            server
                .bind_rustls_0_23(&addr, config)
                .with_context(|| format!("Failed to bind {}", addr))?
        }
        None => server
            .bind(&addr)
            .with_context(|| format!("Failed to bind {}", addr))?,
    };

    let addrs = server.addrs();
    for bound in &addrs {
        info!("Listening on {}://{}", scheme, bound);
    }

    Ok(RunningHttp {
        server: server.run(),
        addrs,
    })
}
