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

use crate::server::TlsIdentity;
use anyhow::Context;
use rustls::pki_types::CertificateDer;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

/// Builds a rustls server configuration from a PEM certificate chain and key.
pub fn load_server_config(identity: &TlsIdentity) -> anyhow::Result<rustls::ServerConfig> {
    let cert_file = File::open(&identity.cert)
        .with_context(|| format!("Failed to open certificate file {}", identity.cert.display()))?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<_, _>>()
        .context("Failed to parse certificate file")?;

    if certs.is_empty() {
        anyhow::bail!(
            "No certificates found in certificate file: {}",
            identity.cert.display()
        );
    }

    let key_file = File::open(&identity.key)
        .with_context(|| format!("Failed to open private key file {}", identity.key.display()))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .context("Failed to parse private key file")?
        .with_context(|| format!("No private key found in key file: {}", identity.key.display()))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .context("Failed to select TLS protocol versions")?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("Failed to build TLS configuration")?;

    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(config)
}
