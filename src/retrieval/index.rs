//! Regulation corpus index
//!
//! The corpus is populated by a separate ingestion job; this side only reads.
//! [`VectorIndex`] exposes dense and sparse search and derives the hybrid
//! (fused) search from them.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::VectorIndexConfig;
use crate::error::UpstreamError;
use crate::http;

use super::embeddings::SparseVector;
use super::fusion::{reciprocal_rank_fusion, FusedPassage};

const SERVICE: &str = "vector_index";

/// Stored payload of one corpus chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassagePayload {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
}

/// One hit from a single (dense or sparse) search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoredPassage {
    #[serde(deserialize_with = "point_id")]
    pub id: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub payload: PassagePayload,
}

/// Point ids are either unsigned integers or UUID strings.
fn point_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("unsupported point id {other}"))),
    }
}

/// Parameters of one hybrid query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridQuery {
    /// Maximum results after fusion
    pub limit: usize,
    /// Each candidate list fetches `limit * overfetch`
    pub overfetch: usize,
    pub rrf_k: f64,
    /// Minimum fused score (inclusive)
    pub score_threshold: f64,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn dense_search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPassage>, UpstreamError>;

    async fn sparse_search(&self, vector: &SparseVector, limit: usize) -> Result<Vec<ScoredPassage>, UpstreamError>;

    /// Over-fetch from both signals, fuse with RRF, threshold, then cap.
    async fn hybrid_search(
        &self,
        dense: &[f32],
        sparse: &SparseVector,
        query: HybridQuery,
    ) -> Result<Vec<FusedPassage>, UpstreamError> {
        let fetch = query.limit.saturating_mul(query.overfetch.max(1));
        let (dense_hits, sparse_hits) =
            futures::try_join!(self.dense_search(dense, fetch), self.sparse_search(sparse, fetch))?;

        let mut fused = reciprocal_rank_fusion(&[dense_hits, sparse_hits], query.rrf_k);
        fused.retain(|f| f.score >= query.score_threshold);
        fused.truncate(query.limit);
        Ok(fused)
    }

    fn index_name(&self) -> &str;
}

// ============================================================================
// Qdrant
// ============================================================================

#[derive(Debug, Deserialize)]
struct QueryResponse {
    result: QueryResult,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    points: Vec<ScoredPassage>,
}

/// Qdrant REST client using the universal query endpoint with named vectors.
pub struct QdrantIndex {
    client: reqwest::Client,
    timeout: Duration,
    query_url: String,
    api_key: Option<String>,
    dense_vector: String,
    sparse_vector: String,
    collection: String,
}

impl QdrantIndex {
    pub fn new(config: &VectorIndexConfig) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: http::build_client(SERVICE, config.timeout())?,
            timeout: config.timeout(),
            query_url: format!(
                "{}/collections/{}/points/query",
                http::base_url(&config.url),
                config.collection
            ),
            api_key: config.api_key.clone(),
            dense_vector: config.dense_vector_name.clone(),
            sparse_vector: config.sparse_vector_name.clone(),
            collection: config.collection.clone(),
        })
    }

    async fn query(&self, body: Value) -> Result<Vec<ScoredPassage>, UpstreamError> {
        let mut request = self.client.post(&self.query_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        let resp: QueryResponse = http::read_json(SERVICE, self.timeout, request).await?;
        debug!(collection = %self.collection, hits = resp.result.points.len(), "Qdrant query complete");
        Ok(resp.result.points)
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn dense_search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredPassage>, UpstreamError> {
        self.query(json!({
            "query": vector,
            "using": self.dense_vector,
            "limit": limit,
            "with_payload": true,
        }))
        .await
    }

    async fn sparse_search(&self, vector: &SparseVector, limit: usize) -> Result<Vec<ScoredPassage>, UpstreamError> {
        self.query(json!({
            "query": { "indices": vector.indices, "values": vector.values },
            "using": self.sparse_vector,
            "limit": limit,
            "with_payload": true,
        }))
        .await
    }

    fn index_name(&self) -> &str {
        &self.collection
    }
}
