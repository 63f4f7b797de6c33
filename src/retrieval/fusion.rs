//! Reciprocal Rank Fusion
//!
//! `score(d) = Σ 1 / (k + rank_i(d) + 1)` over every ranked list containing
//! `d`, with 0-based ranks. The raw sum is divided by the best attainable
//! score (`lists / (k + 1)`, a document ranked first everywhere), so fused
//! scores lie in (0, 1]. On that scale a document found by only one of two
//! lists tops out at 0.5.

use std::collections::HashMap;

use super::index::ScoredPassage;

/// A passage with its normalised fused score.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedPassage {
    pub passage: ScoredPassage,
    pub score: f64,
}

/// Fuse ranked lists by position only. Ties keep first-appearance order.
pub fn reciprocal_rank_fusion(lists: &[Vec<ScoredPassage>], k: f64) -> Vec<FusedPassage> {
    let non_empty = lists.iter().filter(|l| !l.is_empty()).count();
    if non_empty == 0 {
        return Vec::new();
    }
    let best = lists.len() as f64 / (k + 1.0);

    // id -> (position in `fused`, raw score)
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut fused: Vec<FusedPassage> = Vec::new();

    for list in lists {
        for (rank, passage) in list.iter().enumerate() {
            let contribution = 1.0 / (k + rank as f64 + 1.0);
            match slots.get(passage.id.as_str()) {
                Some(&slot) => fused[slot].score += contribution,
                None => {
                    slots.insert(passage.id.as_str(), fused.len());
                    fused.push(FusedPassage {
                        passage: passage.clone(),
                        score: contribution,
                    });
                }
            }
        }
    }

    for entry in &mut fused {
        entry.score /= best;
    }
    // stable sort keeps first appearance on ties
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::index::PassagePayload;

    fn p(id: &str) -> ScoredPassage {
        ScoredPassage {
            id: id.to_string(),
            score: 0.0,
            payload: PassagePayload {
                text: format!("passage {id}"),
                source: None,
                page: None,
            },
        }
    }

    #[test]
    fn test_top_in_both_lists_scores_one() {
        let fused = reciprocal_rank_fusion(&[vec![p("a"), p("b")], vec![p("a"), p("c")]], 60.0);
        assert_eq!(fused[0].passage.id, "a");
        assert!((fused[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_list_document_caps_at_half() {
        let fused = reciprocal_rank_fusion(&[vec![p("a")], vec![p("b")]], 60.0);
        assert_eq!(fused.len(), 2);
        assert!((fused[0].score - 0.5).abs() < 1e-9);
        // equal scores: dense-list document first
        assert_eq!(fused[0].passage.id, "a");
        assert_eq!(fused[1].passage.id, "b");
    }

    #[test]
    fn test_agreement_beats_single_top_rank() {
        let dense = vec![p("solo"), p("shared")];
        let sparse = vec![p("shared"), p("other")];
        let fused = reciprocal_rank_fusion(&[dense, sparse], 60.0);
        assert_eq!(fused[0].passage.id, "shared");
        assert!(fused[0].score > 0.60);
        assert!(fused.iter().find(|f| f.passage.id == "solo").map(|f| f.score) < Some(0.60));
    }

    #[test]
    fn test_empty_lists() {
        assert!(reciprocal_rank_fusion(&[], 60.0).is_empty());
        assert!(reciprocal_rank_fusion(&[Vec::new(), Vec::new()], 60.0).is_empty());
    }
}
