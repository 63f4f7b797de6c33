//! Query embedding backends
//!
//! Hybrid retrieval needs two views of every query: a dense semantic vector
//! and a sparse term-weighted vector. [`TeiEmbedder`] obtains both from
//! text-embeddings-inference servers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EmbeddingsConfig;
use crate::error::UpstreamError;
use crate::http;

const SERVICE: &str = "embeddings";

/// Sparse (lexical) vector in index/value form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_dense(&self, text: &str) -> Result<Vec<f32>, UpstreamError>;

    async fn embed_sparse(&self, text: &str) -> Result<SparseVector, UpstreamError>;
}

// ============================================================================
// Text Embeddings Inference
// ============================================================================

/// Body of `/embed` and `/embed_sparse`. `model` names the expected model
/// for routers that host several; a single-model server ignores it.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    inputs: [&'a str; 1],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct SparseEntry {
    index: u32,
    value: f32,
}

/// Client for a pair of TEI servers (dense model, sparse model).
pub struct TeiEmbedder {
    client: reqwest::Client,
    timeout: Duration,
    dense_url: String,
    sparse_url: String,
    dense_model: String,
    sparse_model: String,
}

impl TeiEmbedder {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: http::build_client(SERVICE, config.timeout())?,
            timeout: config.timeout(),
            dense_url: format!("{}/embed", http::base_url(&config.dense_url)),
            sparse_url: format!("{}/embed_sparse", http::base_url(&config.sparse_url)),
            dense_model: config.dense_model.clone(),
            sparse_model: config.sparse_model.clone(),
        })
    }

    fn dense_request<'a>(&'a self, text: &'a str) -> EmbedRequest<'a> {
        EmbedRequest {
            inputs: [text],
            model: &self.dense_model,
        }
    }

    fn sparse_request<'a>(&'a self, text: &'a str) -> EmbedRequest<'a> {
        EmbedRequest {
            inputs: [text],
            model: &self.sparse_model,
        }
    }

    fn first<T>(mut batch: Vec<T>) -> Result<T, UpstreamError> {
        if batch.is_empty() {
            return Err(UpstreamError::malformed(SERVICE, "empty embedding batch"));
        }
        Ok(batch.swap_remove(0))
    }

    fn into_sparse(entries: Vec<SparseEntry>) -> SparseVector {
        let (indices, values) = entries.into_iter().map(|e| (e.index, e.value)).unzip();
        SparseVector { indices, values }
    }
}

#[async_trait]
impl Embedder for TeiEmbedder {
    async fn embed_dense(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        let request = self.client.post(&self.dense_url).json(&self.dense_request(text));
        let batch: Vec<Vec<f32>> = http::read_json(SERVICE, self.timeout, request).await?;
        Self::first(batch)
    }

    async fn embed_sparse(&self, text: &str) -> Result<SparseVector, UpstreamError> {
        let request = self.client.post(&self.sparse_url).json(&self.sparse_request(text));
        let batch: Vec<Vec<SparseEntry>> = http::read_json(SERVICE, self.timeout, request).await?;
        Self::first(batch).map(Self::into_sparse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_response_shape() {
        let raw = r#"[[{"index": 17, "value": 0.42}, {"index": 2031, "value": 1.3}]]"#;
        let batch: Vec<Vec<SparseEntry>> = serde_json::from_str(raw).expect("tei sparse");
        let sparse = TeiEmbedder::first(batch).map(TeiEmbedder::into_sparse).expect("one entry");
        assert_eq!(sparse.indices, vec![17, 2031]);
        assert!((sparse.values[1] - 1.3).abs() < 1e-6);
    }

    #[test]
    fn test_empty_batch_is_malformed() {
        let err = TeiEmbedder::first::<Vec<f32>>(Vec::new()).unwrap_err();
        assert!(matches!(err, UpstreamError::MalformedResponse { .. }));
    }

    #[test]
    fn test_endpoints() {
        let embedder = TeiEmbedder::new(&EmbeddingsConfig {
            dense_url: "http://tei-dense:80/".to_string(),
            ..EmbeddingsConfig::default()
        })
        .expect("embedder");
        assert_eq!(embedder.dense_url, "http://tei-dense:80/embed");
        assert!(embedder.sparse_url.ends_with("/embed_sparse"));
    }

    #[test]
    fn test_requests_name_configured_models() {
        let embedder = TeiEmbedder::new(&EmbeddingsConfig {
            dense_model: "BAAI/bge-base-en-v1.5".to_string(),
            ..EmbeddingsConfig::default()
        })
        .expect("embedder");

        let dense = serde_json::to_value(embedder.dense_request("NO-Hardhat safety regulations")).expect("dense");
        assert_eq!(dense["inputs"], serde_json::json!(["NO-Hardhat safety regulations"]));
        assert_eq!(dense["model"], "BAAI/bge-base-en-v1.5");

        let sparse = serde_json::to_value(embedder.sparse_request("hard hat")).expect("sparse");
        assert_eq!(sparse["model"], crate::config::defaults::SPARSE_MODEL);
    }
}
