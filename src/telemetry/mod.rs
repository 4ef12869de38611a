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

pub mod tracer;

use crate::config::{LoggingConfig, TelemetryConfig};
use tracing::dispatcher::has_been_set;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

#[cfg(feature = "otel")]
static TRACER_PROVIDER: once_cell::sync::OnceCell<opentelemetry_sdk::trace::SdkTracerProvider> =
    once_cell::sync::OnceCell::new();

/// `RUST_LOG` wins over the configured level.
fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Installs the global `tracing` subscriber. Does nothing when one is
/// already set.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    if has_been_set() {
        return Ok(());
    }

    let subscriber = Registry::default().with(env_filter(config));
    if config.format.eq_ignore_ascii_case("json") {
        let _ = subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .try_init();
    } else {
        let _ = subscriber.with(tracing_subscriber::fmt::layer()).try_init();
    }

    Ok(())
}

/// Logging plus, with the `otel` feature and `telemetry.enabled`, OTLP span
/// export.
#[cfg(feature = "otel")]
pub fn init_telemetry(logging: &LoggingConfig, telemetry: &TelemetryConfig) -> anyhow::Result<()> {
    use opentelemetry::trace::TracerProvider as _;

    if !telemetry.enabled {
        init_logging(logging)?;
        tracing::info!("Telemetry is disabled");
        return Ok(());
    }

    if has_been_set() {
        tracing::info!("A tracing subscriber is already set, skipping initialization");
        return Ok(());
    }

    let provider = tracer::init_tracer_provider(telemetry)?;
    let tracer = provider.tracer("stubwire");
    let _ = TRACER_PROVIDER.set(provider);

    let subscriber = Registry::default()
        .with(env_filter(logging))
        .with(tracing_opentelemetry::layer().with_tracer(tracer));
    if logging.format.eq_ignore_ascii_case("json") {
        let _ = subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .try_init();
    } else {
        let _ = subscriber.with(tracing_subscriber::fmt::layer()).try_init();
    }

    tracing::info!(
        "Exporting spans for {} to {} over {}",
        telemetry.service_name, telemetry.endpoint, telemetry.protocol
    );
    Ok(())
}

#[cfg(not(feature = "otel"))]
pub fn init_telemetry(logging: &LoggingConfig, telemetry: &TelemetryConfig) -> anyhow::Result<()> {
    init_logging(logging)?;
    if telemetry.enabled {
        tracing::warn!("Telemetry requested but the otel feature is not enabled");
    }
    Ok(())
}

pub fn shutdown_telemetry() {
    #[cfg(feature = "otel")]
    {
        if let Some(provider) = TRACER_PROVIDER.get() {
            tracing::info!("Flushing telemetry");
            if let Err(e) = provider.shutdown() {
                tracing::warn!("Failed to shut down tracer provider: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        let config = LoggingConfig::default();
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&config).is_ok());
    }

    #[test]
    fn test_init_disabled_telemetry() {
        let telemetry = TelemetryConfig::default();
        assert!(!telemetry.enabled);
        assert!(init_telemetry(&LoggingConfig::default(), &telemetry).is_ok());
    }

    #[test]
    fn test_telemetry_config_defaults() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "stubwire");
        assert_eq!(config.endpoint, "http://localhost:4317");
        assert_eq!(config.protocol, "grpc");
        assert_eq!(config.sampling_rate, 1.0);
    }
}
