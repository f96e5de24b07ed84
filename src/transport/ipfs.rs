//! Content storage over the IPFS HTTP API.

use super::{EndpointPool, IpfsService};
use crate::config::IpfsEndpoint;
use crate::errors::{ClientError, Result};
use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Metadata documents are small; anything bigger is not ours
const MAX_CONTENT_SIZE: usize = 1024 * 1024;

const IPFS_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddResponse {
    hash: String,
}

pub struct HttpIpfs {
    pool: EndpointPool<IpfsEndpoint>,
    http_client: reqwest::Client,
}

impl HttpIpfs {
    pub fn new(endpoints: Vec<IpfsEndpoint>) -> Result<Self> {
        for endpoint in &endpoints {
            url::Url::parse(&endpoint.url).map_err(|e| {
                ClientError::Config(format!("invalid IPFS endpoint {}: {}", endpoint.url, e))
            })?;
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(IPFS_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            pool: EndpointPool::new(endpoints),
            http_client,
        })
    }

    fn post(&self, endpoint: &IpfsEndpoint, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", endpoint.url.trim_end_matches('/'), path);
        endpoint
            .headers
            .iter()
            .fold(self.http_client.post(url), |request, (name, value)| {
                request.header(name.as_str(), value.as_str())
            })
    }

    async fn send(request: reqwest::RequestBuilder) -> anyhow::Result<reqwest::Response> {
        let response = request.send().await.context("Failed to reach IPFS node")?;
        if !response.status().is_success() {
            anyhow::bail!("IPFS node returned HTTP {}", response.status());
        }
        Ok(response)
    }

    async fn add_to(&self, endpoint: &IpfsEndpoint, content: &str) -> anyhow::Result<String> {
        let form = reqwest::multipart::Form::new().text("file", content.to_string());
        let response = Self::send(self.post(endpoint, "add").multipart(form)).await?;
        let added: AddResponse = response.json().await.context("Failed to parse add response")?;
        Ok(added.hash)
    }

    async fn pin_on(&self, endpoint: &IpfsEndpoint, cid: &str) -> anyhow::Result<()> {
        Self::send(self.post(endpoint, "pin/add").query(&[("arg", cid)])).await?;
        Ok(())
    }

    async fn cat_from(&self, endpoint: &IpfsEndpoint, cid: &str) -> anyhow::Result<String> {
        let response = Self::send(self.post(endpoint, "cat").query(&[("arg", cid)])).await?;
        let bytes = response.bytes().await.context("Failed to read IPFS content")?;
        if bytes.len() > MAX_CONTENT_SIZE {
            anyhow::bail!(
                "Content too large: {} bytes (max: {} bytes)",
                bytes.len(),
                MAX_CONTENT_SIZE
            );
        }
        String::from_utf8(bytes.to_vec()).context("IPFS content is not UTF-8")
    }
}

#[async_trait]
impl IpfsService for HttpIpfs {
    async fn add(&self, content: &str) -> Result<String> {
        for (index, endpoint) in self.pool.attempts() {
            match self.add_to(endpoint, content).await {
                Ok(cid) => {
                    self.pool.settle(index);
                    info!("Added {} bytes to IPFS as {}", content.len(), cid);
                    return Ok(cid);
                }
                Err(e) => {
                    warn!("IPFS add failed on {}: {:#}", endpoint.url, e);
                    self.pool.rotate(index);
                }
            }
        }
        Err(ClientError::NoEndpoints("IPFS"))
    }

    async fn pin(&self, cid: &str) -> Result<()> {
        for (index, endpoint) in self.pool.attempts() {
            match self.pin_on(endpoint, cid).await {
                Ok(()) => {
                    self.pool.settle(index);
                    debug!("Pinned {} on {}", cid, endpoint.url);
                    return Ok(());
                }
                Err(e) => {
                    warn!("IPFS pin failed on {}: {:#}", endpoint.url, e);
                    self.pool.rotate(index);
                }
            }
        }
        Err(ClientError::NoEndpoints("IPFS"))
    }

    async fn fetch_string(&self, cid: &str) -> Result<String> {
        let mut last_error = None;
        for (index, endpoint) in self.pool.attempts() {
            match self.cat_from(endpoint, cid).await {
                Ok(content) => {
                    self.pool.settle(index);
                    return Ok(content);
                }
                Err(e) => {
                    warn!("IPFS fetch of {} failed on {}: {:#}", cid, endpoint.url, e);
                    self.pool.rotate(index);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(ClientError::IpfsFetch(format!("{:#}", e))),
            None => Err(ClientError::NoEndpoints("IPFS")),
        }
    }

    async fn ensure_online(&self) -> Result<()> {
        for (index, endpoint) in self.pool.attempts() {
            match Self::send(self.post(endpoint, "version")).await {
                Ok(_) => {
                    self.pool.settle(index);
                    return Ok(());
                }
                Err(e) => {
                    warn!("IPFS node {} is offline: {:#}", endpoint.url, e);
                    self.pool.rotate(index);
                }
            }
        }
        Err(ClientError::NoEndpoints("IPFS"))
    }
}
