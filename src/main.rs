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

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use stubwire::action::client::{HttpClient, OutboundClient};
use stubwire::config::ConfigLoader;
use stubwire::rules::RuleSet;
use stubwire::server::{run_http, socket, Dispatcher, StubServer, TlsIdentity, TransportKind};
use stubwire::telemetry::{init_telemetry, shutdown_telemetry};
use stubwire::utils::shutdown_signal;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "stubwire.yaml")]
    config: PathBuf,

    /// Overrides the port of the document.
    #[arg(short, long)]
    port: Option<u16>,

    #[arg(long)]
    host: Option<String>,

    /// Serves HTTPS with this PEM certificate chain.
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,

    /// Suppresses request and response dumps.
    #[arg(short, long, default_value = "false")]
    quiet: bool,

    #[arg(long, default_value = "false")]
    hot_reload: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ConfigLoader::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    init_telemetry(&config.logging, &config.telemetry)?;

    let client: Arc<dyn OutboundClient> =
        Arc::new(HttpClient::new().context("Failed to create outbound HTTP client")?);
    let document = config.build_with_client(client.clone())?;
    let server = command_line_server(&args, document)?;

    let dispatcher = server.dispatcher();
    let _watcher = if args.hot_reload {
        start_hot_reload(&args.config, dispatcher.clone(), client)?
    } else {
        None
    };

    info!("Stubwire is serving {} rules", server.rules().len());
    info!("Press Ctrl+C to shutdown");

    let result = serve(&server, dispatcher).await;
    shutdown_telemetry();
    result
}

/// Server declared on the command line. Its port and TLS identity take
/// precedence when merged with the document's server.
fn base_server(args: &Args, document: &StubServer) -> StubServer {
    let mut binding = document.binding().clone();
    binding.port = args.port.unwrap_or(0);
    binding.tls = None;
    if let Some(host) = &args.host {
        binding.host = host.clone();
    }
    if let (Some(cert), Some(key)) = (&args.cert, &args.key) {
        binding.tls = Some(TlsIdentity {
            cert: cert.clone(),
            key: key.clone(),
        });
    }

    StubServer::new(binding, RuleSet::default()).quiet(true)
}

/// The document's server merged under the command-line one.
fn command_line_server(args: &Args, document: StubServer) -> anyhow::Result<StubServer> {
    let server = base_server(args, &document).merge(document)?;
    let quiet = server.is_quiet() || args.quiet;
    Ok(server.quiet(quiet))
}

async fn serve(server: &StubServer, dispatcher: Dispatcher) -> anyhow::Result<()> {
    match server.binding().transport {
        TransportKind::Http => {
            let running = run_http(server.binding(), dispatcher)?;
            let handle = running.server.handle();
            tokio::select! {
                result = running.server => {
                    result.context("HTTP server failed")?;
                    info!("Server stopped");
                }
                _ = shutdown_signal() => {
                    info!("Shutdown signal received");
                    handle.stop(true).await;
                    info!("Server shutdown complete");
                }
            }
        }
        TransportKind::Socket => {
            let listener = socket::bind(server.binding()).await?;
            tokio::select! {
                result = socket::serve(listener, dispatcher) => {
                    result?;
                }
                _ = shutdown_signal() => {
                    info!("Shutdown signal received");
                }
            }
        }
    }

    Ok(())
}

#[cfg(feature = "hot-reload")]
fn start_hot_reload(
    config_path: &std::path::Path,
    dispatcher: Dispatcher,
    client: Arc<dyn OutboundClient>,
) -> anyhow::Result<Option<notify::RecommendedWatcher>> {
    use notify::{EventKind, RecursiveMode, Watcher};

    let watched = config_path.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        match event {
            Ok(event) if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
                info!("Configuration file modified, reloading...");
                let rules = ConfigLoader::from_file(&watched)
                    .and_then(|config| config.build_rules(client.clone()));
                match rules {
                    Ok(rules) => {
                        info!(rules = rules.len(), "Configuration reloaded successfully");
                        dispatcher.reload(rules);
                    }
                    Err(e) => {
                        tracing::error!("Failed to reload configuration: {:#}", e);
                    }
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Watch error: {}", e),
        }
    })?;

    watcher.watch(config_path, RecursiveMode::NonRecursive)?;
    info!("Watching {:?} for changes", config_path);
    Ok(Some(watcher))
}

#[cfg(not(feature = "hot-reload"))]
fn start_hot_reload(
    _config_path: &std::path::Path,
    _dispatcher: Dispatcher,
    _client: Arc<dyn OutboundClient>,
) -> anyhow::Result<Option<()>> {
    info!("Hot reload feature is not enabled");
    Ok(None)
}
