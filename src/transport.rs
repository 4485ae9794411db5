use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use clap::crate_version;
use futures::{prelude::*, stream::BoxStream};
use reqwest::{StatusCode, Url};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::config::{ApiKey, FetchLimits};
use crate::error::{Error, FetchError};

/// Response body delivered chunk by chunk.
pub type Body = BoxStream<'static, Result<Bytes, FetchError>>;

/// The network side of the retrieval stages.
///
/// Implementations own connection management; the stages only bound how
/// many logical requests are in flight.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Fetches a whole (small) response body.
    async fn get(&self, url: &Url) -> Result<Bytes, FetchError>;

    /// Opens a response body as a stream.
    async fn open(&self, url: &Url) -> Result<Body, FetchError>;
}

/// [`Transport`] over HTTP(S).
///
/// Caps open connections with a semaphore held from sending the request until
/// the body is consumed or dropped, appends the API key to every request and
/// waits out up to `rate_limit_waits` `429 Too Many Requests` responses per
/// request.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    key: ApiKey,
    connections: Arc<Semaphore>,
    backoff: Duration,
    rate_limit_waits: u8,
}

impl HttpTransport {
    pub fn new(key: ApiKey, limits: &FetchLimits) -> Result<Self, Error> {
        limits.validate()?;

        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(limits.max_connections)
            .user_agent(format!("streetscape_rs_{}", crate_version!()));
        if limits.request_timeout > Duration::ZERO {
            builder = builder.timeout(limits.request_timeout);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed creating HTTP client: {}", e)))?;

        Ok(Self {
            client,
            key,
            connections: Arc::new(Semaphore::new(limits.max_connections)),
            backoff: limits.backoff,
            rate_limit_waits: limits.rate_limit_waits,
        })
    }

    fn authorize(&self, url: &Url) -> Url {
        let mut url = url.clone();
        url.query_pairs_mut().append_pair("key", self.key.as_str());
        url
    }

    async fn send(&self, url: &Url) -> Result<(reqwest::Response, OwnedSemaphorePermit), FetchError> {
        let url = self.authorize(url);
        let mut waited = 0;

        loop {
            let connection = Arc::clone(&self.connections)
                .acquire_owned()
                .await
                .map_err(|_| FetchError::Other("connection pool closed".to_owned()))?;

            let response = self.client.get(url.clone()).send().await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS && waited < self.rate_limit_waits {
                waited += 1;
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|val| val.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(self.backoff);

                drop(response);
                drop(connection);
                debug!(?retry_after, waited, "rate limited by provider");
                tokio::time::sleep(retry_after).await;
                continue;
            }

            if !response.status().is_success() {
                return Err(FetchError::Status(response.status()));
            }

            break Ok((response, connection));
        }
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<Bytes, FetchError> {
        let (response, _connection) = self.send(url).await?;
        Ok(response.bytes().await?)
    }

    async fn open(&self, url: &Url) -> Result<Body, FetchError> {
        let (response, connection) = self.send(url).await?;

        let body = response.bytes_stream().map(move |chunk| {
            let _held = &connection;
            chunk.map_err(FetchError::from)
        });

        Ok(body.boxed())
    }
}
