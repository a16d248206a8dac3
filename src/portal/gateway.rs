use crate::error::{AgentError, AgentResult};
use log::warn;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::{future::Future, time::Duration};

pub const DEFAULT_GATEWAY: &str = "https://ipfs.io";
/// Attempts per asset fetch.
pub const FETCH_ATTEMPTS: usize = 2;

/// Adds `https://` to scheme-less gateways and drops trailing slashes.
pub fn normalize_gateway_url(gateway: &str) -> String {
    let gateway = gateway.trim().trim_end_matches('/');
    if gateway.starts_with("https://") || gateway.starts_with("http://") {
        gateway.to_string()
    } else {
        format!("https://{gateway}")
    }
}

pub fn asset_url(gateway: &str, hash: &str) -> String {
    format!("{}/ipfs/{}", normalize_gateway_url(gateway), hash)
}

/// Runs `f` up to `attempts` times, returning the first success or the
/// last error.
pub async fn with_retry<T, E, F, Fut>(attempts: usize, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                warn!("attempt {attempt}/{attempts} failed: {err}");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Reads content-addressed assets through an HTTP gateway.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    inner: Client,
    gateway: String,
}

impl GatewayClient {
    pub fn new(gateway: &str) -> AgentResult<Self> {
        let inner = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| AgentError::Gateway(err.to_string()))?;
        Ok(Self {
            inner,
            gateway: normalize_gateway_url(gateway),
        })
    }

    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    pub async fn fetch_bytes(&self, hash: &str) -> AgentResult<Vec<u8>> {
        let url = asset_url(&self.gateway, hash);
        with_retry(FETCH_ATTEMPTS, || self.get(&url)).await
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, hash: &str) -> AgentResult<T> {
        let bytes = self.fetch_bytes(hash).await?;
        serde_json::from_slice(&bytes)
            .map_err(|err| AgentError::Gateway(format!("asset {hash} is not valid json: {err}")))
    }

    async fn get(&self, url: &str) -> AgentResult<Vec<u8>> {
        let response = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|err| AgentError::Gateway(format!("{url}: {err}")))?;
        if response.status() != StatusCode::OK {
            return Err(AgentError::Gateway(format!(
                "{url} answered {}",
                response.status()
            )));
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| AgentError::Gateway(format!("{url}: {err}")))?;
        Ok(body.to_vec())
    }
}

impl Default for GatewayClient {
    fn default() -> Self {
        Self {
            inner: Client::new(),
            gateway: DEFAULT_GATEWAY.to_string(),
        }
    }
}
