// /////////////////////////////////////////////////////////////////////////////
// IATI Ingestion Pipeline
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Minimal HTTP server exposing `GET /metrics` and `GET /health`, built
//! directly on `tokio::net::TcpListener` rather than pulling in a web
//! framework for two routes.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use iati_pipeline_domain::error::PipelineError;

use super::MetricsService;

pub struct MetricsEndpoint {
    metrics: Arc<MetricsService>,
    bind_addr: String,
}

impl MetricsEndpoint {
    pub fn new(metrics: Arc<MetricsService>, bind_addr: impl Into<String>) -> Self {
        Self { metrics, bind_addr: bind_addr.into() }
    }

    /// Runs until the process is killed; callers spawn this as a background
    /// task alongside the orchestrator loop.
    pub async fn start(&self) -> Result<(), PipelineError> {
        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .map_err(|e| PipelineError::InternalError(format!("failed to bind metrics endpoint on {}: {e}", self.bind_addr)))?;

        info!("metrics endpoint listening on http://{}/metrics", self.bind_addr);

        loop {
            match listener.accept().await {
                Ok((mut stream, _)) => {
                    let metrics = self.metrics.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_request(&mut stream, metrics).await {
                            error!("error handling metrics request: {e}");
                        }
                    });
                }
                Err(e) => error!("error accepting metrics connection: {e}"),
            }
        }
    }
}

async fn handle_request(
    stream: &mut tokio::net::TcpStream,
    metrics: Arc<MetricsService>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut buffer = [0u8; 1024];
    let n = stream.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..n]);
    debug!("metrics endpoint request: {}", request.lines().next().unwrap_or(""));

    if request.starts_with("GET /metrics") {
        match metrics.gather_text() {
            Ok(body) => {
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).await?;
            }
            Err(e) => {
                let body = format!("error generating metrics: {e}");
                let response = format!(
                    "HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).await?;
            }
        }
    } else if request.starts_with("GET /health") {
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nOK")
            .await?;
    } else {
        stream
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: 9\r\n\r\nNot Found")
            .await?;
    }

    stream.flush().await?;
    Ok(())
}
