//! Run-scoped regulation deduplication
//!
//! A regulation's identity is the MD5 of the first N characters of its text
//! (N = 200 by default). Two passages sharing that prefix are the same
//! regulation, whichever query found them.

use std::collections::HashSet;

use crate::types::{prefix_chars, Regulation};

/// Hex digest of the first `prefix_chars` characters of `text`.
pub fn dedup_key(text: &str, prefix_len: usize) -> String {
    format!("{:x}", md5::compute(prefix_chars(text, prefix_len).as_bytes()))
}

/// Insertion-ordered, duplicate-free regulation collection.
#[derive(Debug, Clone)]
pub struct RegulationSet {
    prefix_len: usize,
    seen: HashSet<String>,
    items: Vec<Regulation>,
}

impl RegulationSet {
    pub fn new(prefix_len: usize) -> Self {
        Self {
            prefix_len,
            seen: HashSet::new(),
            items: Vec::new(),
        }
    }

    /// Add `regulation` unless an equal-keyed one is already present.
    /// Returns whether it was inserted.
    pub fn insert(&mut self, regulation: Regulation) -> bool {
        if self.seen.insert(dedup_key(&regulation.text, self.prefix_len)) {
            self.items.push(regulation);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<Regulation> {
        self.items
    }
}
