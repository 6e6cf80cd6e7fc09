//! The pooled outbound HTTP client shared by every proxied request.
//!
//! - created once at startup, cloned cheaply into handlers
//! - a semaphore bounds in-flight upstream exchanges; the permit travels with the
//!   response and is released when its body stream is dropped
//! - `timeout` bounds the wait for response headers and only starts once the request
//!   body has been fully handed to the transport, so long uploads are not cut short

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, HttpBody};
use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use reqwest::redirect::Policy;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, oneshot};
use url::Url;

use crate::config::UpstreamConfig;
use crate::services::proxy::ProxyError;

/// An upstream response plus the permit it holds.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub response: reqwest::Response,
    pub permit: OwnedSemaphorePermit,
}

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, ProxyError> {
        // Redirects are relayed to the caller, never followed here.
        let http = reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| ProxyError::Client(e.to_string()))?;

        Ok(Self {
            http,
            permits: Arc::new(Semaphore::new(config.max_connections)),
            timeout: config.timeout,
        })
    }

    /// Plain client for calls that are not proxied exchanges (IdP, admin API).
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// One upstream exchange. No retries.
    pub async fn execute(
        &self,
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Body,
    ) -> Result<UpstreamResponse, ProxyError> {
        let permit = tokio::time::timeout(self.timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| {
                tracing::warn!(%url, "no upstream connection slot available");
                ProxyError::Timeout
            })?
            .map_err(|_| ProxyError::Unreachable("upstream client is shutting down".into()))?;

        let mut request = self.http.request(method, url.clone()).headers(headers);

        let (done_tx, done_rx) = oneshot::channel::<()>();
        if body.size_hint().exact() == Some(0) {
            let _ = done_tx.send(());
        } else {
            request = request.body(reqwest::Body::wrap_stream(pump(body, done_tx)));
        }

        let send = request.send();
        tokio::pin!(send);

        let headers_deadline = async {
            let _ = done_rx.await;
            tokio::time::sleep(self.timeout).await;
        };

        let response = tokio::select! {
            res = &mut send => res.map_err(ProxyError::from_reqwest)?,
            _ = headers_deadline => {
                tracing::warn!(%url, timeout = ?self.timeout, "upstream did not answer in time");
                return Err(ProxyError::Timeout);
            }
        };

        Ok(UpstreamResponse { response, permit })
    }
}

/// Moves inbound body chunks into a bounded channel, one chunk at a time, and reports
/// when the inbound body is exhausted. Dropping the receiver stops the pump.
fn pump(body: Body, done: oneshot::Sender<()>) -> mpsc::Receiver<Result<Bytes, axum::Error>> {
    let (mut tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut chunks = body.into_data_stream();
        while let Some(chunk) = chunks.next().await {
            let failed = chunk.is_err();
            if tx.send(chunk).await.is_err() || failed {
                return;
            }
        }
        let _ = done.send(());
    });
    rx
}
