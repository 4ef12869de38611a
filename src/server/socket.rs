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

//! Raw TCP transport. Every chunk read from a connection is one request;
//! the response body is written back as is. Unmatched or failed exchanges
//! close the connection.

use crate::model::SocketRequest;
use crate::server::{Binding, Dispatcher, Exchange};
use anyhow::Context;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

const READ_BUFFER_SIZE: usize = 8 * 1024;

pub async fn bind(binding: &Binding) -> anyhow::Result<TcpListener> {
    let addr = binding.address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on tcp://{}", listener.local_addr()?);
    Ok(listener)
}

/// Accepts connections until the listener fails. Each connection gets its own task.
pub async fn serve(listener: TcpListener, dispatcher: Dispatcher) -> anyhow::Result<()> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("Failed to accept socket connection")?;

        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, &dispatcher).await {
                warn!(peer = %peer, error = %e, "Socket connection failed");
                dispatcher.report_error(&e.to_string());
            }
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    dispatcher: &Dispatcher,
) -> std::io::Result<()> {
    debug!(peer = %peer, "Socket connection opened");
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read = stream.read(&mut buffer).await?;
        if read == 0 {
            debug!(peer = %peer, "Socket connection closed by peer");
            return Ok(());
        }

        let request = SocketRequest::new(buffer[..read].to_vec(), peer.to_string());
        match dispatcher.dispatch(request.into()).await {
            Exchange::Handled(mut response) => {
                if let Some(content) = response.take_content() {
                    stream.write_all(content.bytes()).await?;
                    stream.flush().await?;
                }
            }
            Exchange::Unmatched | Exchange::Failed(_) => {
                stream.shutdown().await?;
                return Ok(());
            }
        }
    }
}
