//! Pinecone vector store over the REST API.
//!
//! Control plane (`api.pinecone.io`):
//! - `GET /indexes`: list existing indexes
//! - `POST /indexes`: create a serverless index (cosine metric)
//! - `GET /indexes/{name}`: describe an index (host, readiness)
//!
//! Data plane (`https://{index host}`):
//! - `POST /vectors/upsert`: insert or overwrite vectors by id
//!
//! Every request carries the `Api-Key` and `X-Pinecone-API-Version` headers.
//! Non-success responses become errors carrying the status and body, so a
//! dimension mismatch reported by Pinecone propagates to the caller.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use super::VectorStore;
use crate::config::PineconeConfig;
use crate::models::VectorRecord;

/// Client for a Pinecone project.
pub struct PineconeStore {
    client: reqwest::Client,
    api_base: String,
    cloud: String,
    region: String,
    ready_poll_attempts: u32,
    poll_interval: Duration,
    /// Index name → data plane host, filled once the index reports ready.
    hosts: RwLock<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    name: String,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    status: Option<IndexStatus>,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

impl PineconeStore {
    /// Build a client for `api_key`, placing new indexes in `cloud`/`region`.
    pub fn new(api_key: &str, config: &PineconeConfig, cloud: &str, region: &str) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Pinecone API key");

        let mut headers = HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(api_key.trim()).context("invalid Pinecone API key")?,
        );
        headers.insert(
            "x-pinecone-api-version",
            HeaderValue::from_str(&config.api_version).context("invalid Pinecone API version")?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to build Pinecone HTTP client")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            cloud: cloud.to_string(),
            region: region.to_string(),
            ready_poll_attempts: config.ready_poll_attempts.max(1),
            poll_interval: Duration::from_secs(1),
            hosts: RwLock::new(HashMap::new()),
        })
    }

    /// Override the delay between readiness polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn list_index_names(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/indexes", self.api_base))
            .send()
            .await
            .context("failed to list Pinecone indexes")?;
        let list: IndexList = check(response, "list indexes").await?.json().await?;
        Ok(list.indexes.into_iter().map(|i| i.name).collect())
    }

    async fn create_index(&self, index: &str, dims: usize) -> Result<()> {
        let body = create_index_body(index, dims, &self.cloud, &self.region);
        let response = self
            .client
            .post(format!("{}/indexes", self.api_base))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to create Pinecone index '{}'", index))?;

        // Another run may have created it between our list and create calls.
        if response.status() == StatusCode::CONFLICT {
            tracing::debug!(index, "index already exists");
            return Ok(());
        }
        check(response, "create index").await?;
        Ok(())
    }

    async fn describe_index(&self, index: &str) -> Result<IndexDescription> {
        let response = self
            .client
            .get(format!("{}/indexes/{}", self.api_base, index))
            .send()
            .await
            .with_context(|| format!("failed to describe Pinecone index '{}'", index))?;
        Ok(check(response, "describe index").await?.json().await?)
    }

    /// Poll until the index reports ready, then cache and return its host.
    async fn wait_until_ready(&self, index: &str) -> Result<String> {
        for attempt in 0..self.ready_poll_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.poll_interval).await;
            }
            let desc = self.describe_index(index).await?;
            let ready = desc.status.as_ref().map(|s| s.ready).unwrap_or(false);
            match (ready, desc.host) {
                (true, Some(host)) if !host.is_empty() => {
                    self.hosts
                        .write()
                        .unwrap()
                        .insert(index.to_string(), host.clone());
                    return Ok(host);
                }
                _ => tracing::debug!(index, attempt, "waiting for index to become ready"),
            }
        }
        bail!(
            "Pinecone index '{}' not ready after {} attempts",
            index,
            self.ready_poll_attempts
        )
    }

    async fn host_for(&self, index: &str) -> Result<String> {
        let cached = self.hosts.read().unwrap().get(index).cloned();
        match cached {
            Some(host) => Ok(host),
            None => self.wait_until_ready(index).await,
        }
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    fn name(&self) -> &str {
        "pinecone"
    }

    async fn ensure_index(&self, index: &str, dims: usize) -> Result<()> {
        let existing = self.list_index_names().await?;
        if existing.iter().any(|name| name == index) {
            tracing::info!(index, "using existing Pinecone index");
        } else {
            tracing::info!(
                index,
                dims,
                cloud = %self.cloud,
                region = %self.region,
                "creating Pinecone index"
            );
            self.create_index(index, dims).await?;
        }
        self.wait_until_ready(index).await?;
        Ok(())
    }

    async fn upsert(
        &self,
        index: &str,
        namespace: Option<&str>,
        records: &[VectorRecord],
    ) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let host = self.host_for(index).await?;
        let body = UpsertRequest {
            vectors: records,
            namespace,
        };

        let response = self
            .client
            .post(format!("{}/vectors/upsert", data_plane_url(&host)))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to upsert into Pinecone index '{}'", index))?;
        check(response, "upsert").await?;
        Ok(())
    }
}

fn create_index_body(index: &str, dims: usize, cloud: &str, region: &str) -> serde_json::Value {
    serde_json::json!({
        "name": index,
        "dimension": dims,
        "metric": "cosine",
        "spec": {
            "serverless": {
                "cloud": cloud,
                "region": region,
            }
        }
    })
}

/// Index hosts come back without a scheme; default to HTTPS.
fn data_plane_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

async fn check(response: reqwest::Response, operation: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body_text = response.text().await.unwrap_or_default();
    bail!("Pinecone {} failed: {} {}", operation, status, body_text)
}
