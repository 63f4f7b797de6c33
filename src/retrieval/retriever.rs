//! Hybrid Regulation Retriever
//!
//! Turns a run's detections into a small, deduplicated list of regulation
//! passages:
//!
//! 1. Keep detections at or above the confidence floor (0.50). LOW-tier
//!    labels are kept only if they are violations.
//! 2. Each kept detection contributes its label's query with the tier budget
//!    (HIGH 5, MEDIUM 3, LOW 1). A query already planned in this run is
//!    reused, so repeated labels cost one search.
//! 3. Each distinct query runs a hybrid (dense + sparse, RRF-fused) search,
//!    thresholded at 0.60 and capped to its budget.
//! 4. Passages from all queries are deduplicated by text prefix, first
//!    occurrence wins.
//!
//! Any failed query fails the whole retrieval; the pipeline stage maps that
//! to an empty regulation list.

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::defaults::UNKNOWN_CITATION;
use crate::config::RetrievalConfig;
use crate::error::{bounded, UpstreamError};
use crate::types::{Detection, Regulation};

use super::dedup::RegulationSet;
use super::embeddings::Embedder;
use super::fusion::FusedPassage;
use super::index::{HybridQuery, VectorIndex};
use super::priority::{classify, is_violation, query_for, PriorityTier};

/// One distinct query the run will issue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedQuery {
    pub text: String,
    pub tier: PriorityTier,
    pub limit: usize,
    /// Label of the detection that first produced this query
    pub label: String,
}

/// Counters describing one retrieval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalStats {
    pub detections_considered: usize,
    pub below_confidence: usize,
    pub skipped_low_tier: usize,
    pub queries_issued: usize,
    /// Detections answered by an already-planned query
    pub cache_hits: usize,
    pub passages_returned: usize,
    pub duplicates_dropped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub regulations: Vec<Regulation>,
    pub stats: RetrievalStats,
}

/// Tier budget from configuration.
pub fn budget(tier: PriorityTier, config: &RetrievalConfig) -> usize {
    match tier {
        PriorityTier::High => config.high_limit,
        PriorityTier::Medium => config.medium_limit,
        PriorityTier::Low => config.low_limit,
    }
}

/// Build the distinct, ordered query list for a run.
pub fn plan_queries(detections: &[Detection], config: &RetrievalConfig) -> (Vec<PlannedQuery>, RetrievalStats) {
    let mut stats = RetrievalStats {
        detections_considered: detections.len(),
        ..RetrievalStats::default()
    };
    let mut planned: Vec<PlannedQuery> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for detection in detections {
        if !detection.meets(config.confidence_threshold) {
            stats.below_confidence += 1;
            continue;
        }
        let tier = classify(&detection.label);
        if tier == PriorityTier::Low && !is_violation(&detection.label) {
            stats.skipped_low_tier += 1;
            continue;
        }

        let text = query_for(&detection.label);
        if !seen.insert(text.clone()) {
            stats.cache_hits += 1;
            continue;
        }
        planned.push(PlannedQuery {
            text,
            tier,
            limit: budget(tier, config),
            label: detection.label.clone(),
        });
    }

    stats.queries_issued = planned.len();
    (planned, stats)
}

/// Dense + sparse retrieval over the regulation corpus.
pub struct HybridRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, config: RetrievalConfig) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve the deduplicated regulations for one run's detections.
    pub async fn retrieve(&self, detections: &[Detection]) -> Result<RetrievalOutcome, UpstreamError> {
        let start = Instant::now();
        let (planned, mut stats) = plan_queries(detections, &self.config);

        if planned.is_empty() {
            debug!(
                considered = stats.detections_considered,
                "No detections qualify for retrieval"
            );
            return Ok(RetrievalOutcome {
                regulations: Vec::new(),
                stats,
            });
        }

        let searches: Vec<_> = planned.iter().map(|query| self.search(query)).collect();
        let results: Vec<Vec<FusedPassage>> = stream::iter(searches)
            .buffered(self.config.max_concurrent_queries.max(1))
            .try_collect()
            .await?;

        let mut set = RegulationSet::new(self.config.dedup_prefix_chars);
        for passage in results.into_iter().flatten() {
            stats.passages_returned += 1;
            if !set.insert(self.to_regulation(passage)) {
                stats.duplicates_dropped += 1;
            }
        }

        info!(
            queries = stats.queries_issued,
            cache_hits = stats.cache_hits,
            passages = stats.passages_returned,
            regulations = set.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Regulation retrieval complete"
        );

        Ok(RetrievalOutcome {
            regulations: set.into_vec(),
            stats,
        })
    }

    async fn search(&self, query: &PlannedQuery) -> Result<Vec<FusedPassage>, UpstreamError> {
        let hybrid = HybridQuery {
            limit: query.limit,
            overfetch: self.config.overfetch_factor,
            rrf_k: self.config.rrf_k,
            score_threshold: self.config.score_threshold,
        };

        let hits = bounded("retrieval", self.config.query_timeout(), async {
            let (dense, sparse) = futures::try_join!(
                self.embedder.embed_dense(&query.text),
                self.embedder.embed_sparse(&query.text)
            )?;
            self.index.hybrid_search(&dense, &sparse, hybrid).await
        })
        .await?;

        debug!(
            label = %query.label,
            tier = %query.tier,
            limit = query.limit,
            hits = hits.len(),
            "Hybrid search"
        );
        Ok(hits)
    }

    fn to_regulation(&self, fused: FusedPassage) -> Regulation {
        let payload = fused.passage.payload;
        Regulation {
            citation: payload
                .source
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_CITATION.to_string()),
            text: payload.text,
            source: self.config.source_tag.clone(),
        }
    }
}
