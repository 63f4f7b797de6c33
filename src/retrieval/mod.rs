//! Regulation retrieval
//!
//! Maps detections to applicable safety regulations from a pre-built corpus.
//!
//! ## Components
//!
//! - [`priority`]: label tiers and curated safety queries
//! - [`embeddings`]: dense + sparse query embeddings
//! - [`index`]: corpus search (dense, sparse, hybrid)
//! - [`fusion`]: Reciprocal Rank Fusion
//! - [`dedup`]: prefix-hash regulation identity
//! - [`retriever`]: the per-run retrieval procedure

pub mod dedup;
pub mod embeddings;
pub mod fusion;
pub mod index;
pub mod priority;
pub mod retriever;

pub use dedup::{dedup_key, RegulationSet};
pub use embeddings::{Embedder, SparseVector, TeiEmbedder};
pub use fusion::{reciprocal_rank_fusion, FusedPassage};
pub use index::{HybridQuery, PassagePayload, QdrantIndex, ScoredPassage, VectorIndex};
pub use priority::{classify, is_machinery, is_violation, query_for, PriorityTier};
pub use retriever::{budget, plan_queries, HybridRetriever, PlannedQuery, RetrievalOutcome, RetrievalStats};
