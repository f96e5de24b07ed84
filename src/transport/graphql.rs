//! Indexer access over HTTP GraphQL with endpoint failover.

use super::{EndpointPool, GraphQLService};
use crate::errors::{ClientError, Result};
use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT_SECS: u64 = 30;

const PING_QUERY: &str = "query { _meta { block { number } } }";

#[derive(Debug, Deserialize)]
struct GraphQLResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQLError>,
}

#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
}

pub struct HttpGraphQL {
    pool: EndpointPool<url::Url>,
    http_client: reqwest::Client,
}

impl HttpGraphQL {
    pub fn new(endpoints: Vec<String>) -> Result<Self> {
        let endpoints = endpoints
            .iter()
            .map(|endpoint| {
                url::Url::parse(endpoint)
                    .map_err(|e| ClientError::Config(format!("invalid GraphQL endpoint {}: {}", endpoint, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            pool: EndpointPool::new(endpoints),
            http_client,
        })
    }

    async fn post(&self, endpoint: &url::Url, body: &Value) -> anyhow::Result<GraphQLResponse> {
        let response = self
            .http_client
            .post(endpoint.clone())
            .json(body)
            .send()
            .await
            .context("Failed to reach GraphQL endpoint")?;

        if !response.status().is_success() {
            anyhow::bail!("GraphQL endpoint returned HTTP {}", response.status());
        }

        response
            .json::<GraphQLResponse>()
            .await
            .context("Failed to parse GraphQL response")
    }
}

#[async_trait]
impl GraphQLService for HttpGraphQL {
    async fn request(&self, query: &str, variables: Value) -> Result<Value> {
        let body = json!({ "query": query, "variables": variables });

        for (index, endpoint) in self.pool.attempts() {
            debug!("GraphQL request to {}", endpoint);
            match self.post(endpoint, &body).await {
                Ok(response) => {
                    self.pool.settle(index);
                    // query errors are not the endpoint's fault
                    if !response.errors.is_empty() {
                        let messages: Vec<String> =
                            response.errors.into_iter().map(|e| e.message).collect();
                        return Err(ClientError::Transport(messages.join("; ")));
                    }
                    return response
                        .data
                        .ok_or_else(|| ClientError::Transport("GraphQL response without data".to_string()));
                }
                Err(e) => {
                    warn!("GraphQL endpoint {} failed: {:#}", endpoint, e);
                    self.pool.rotate(index);
                }
            }
        }

        Err(ClientError::NoEndpoints("GraphQL"))
    }

    async fn ensure_online(&self) -> Result<()> {
        let body = json!({ "query": PING_QUERY });
        for (index, endpoint) in self.pool.attempts() {
            match self.post(endpoint, &body).await {
                Ok(response) if response.errors.is_empty() => {
                    self.pool.settle(index);
                    return Ok(());
                }
                Ok(_) => warn!("GraphQL endpoint {} rejected the status query", endpoint),
                Err(e) => warn!("GraphQL endpoint {} is offline: {:#}", endpoint, e),
            }
            self.pool.rotate(index);
        }
        Err(ClientError::NoEndpoints("GraphQL"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_endpoint() {
        assert!(matches!(
            HttpGraphQL::new(vec!["not a url".to_string()]),
            Err(ClientError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_pool_has_no_endpoints() {
        let client = HttpGraphQL::new(vec![]).unwrap();
        assert!(matches!(
            client.request("{ daos { id } }", json!({})).await,
            Err(ClientError::NoEndpoints("GraphQL"))
        ));
        assert!(matches!(
            client.ensure_online().await,
            Err(ClientError::NoEndpoints("GraphQL"))
        ));
    }

    #[test]
    fn test_response_parsing() {
        let response: GraphQLResponse = serde_json::from_value(json!({
            "errors": [{ "message": "Type `Query` has no field `foo`", "locations": [] }]
        }))
        .unwrap();
        assert!(response.data.is_none());
        assert_eq!(response.errors[0].message, "Type `Query` has no field `foo`");
    }
}
