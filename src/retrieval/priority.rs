//! Priority Classifier
//!
//! Static partition of the detector vocabulary into retrieval tiers, plus the
//! curated safety query each label is searched with. Both tables are built
//! once and never mutated.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Retrieval priority bucket. Unknown labels are `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriorityTier {
    High,
    Medium,
    Low,
}

impl PriorityTier {
    pub fn as_str(self) -> &'static str {
        match self {
            PriorityTier::High => "HIGH",
            PriorityTier::Medium => "MEDIUM",
            PriorityTier::Low => "LOW",
        }
    }
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labels that denote missing PPE.
pub const VIOLATION_LABELS: &[&str] = &["NO-Hardhat", "NO-Mask", "NO-Safety Vest"];

/// Labels counted as heavy machinery by the scoring engine.
pub const MACHINERY_LABELS: &[&str] = &["Excavator", "Wheel Loader", "Machinery", "Dump Truck", "machinery"];

/// Label the detector uses for workers.
pub const PERSON_LABEL: &str = "Person";

const MEDIUM_LABELS: &[&str] = &["Excavator", "Wheel Loader", "Machinery", "Dump Truck", "Ladder"];

const LOW_LABELS: &[&str] = &[
    "Person",
    "Safety Cone",
    "SUV",
    "Van",
    "Sedan",
    "Bus",
    "Truck",
    "Semi",
    "Trailer",
    "Truck and Trailer",
    "Mini-Van",
    "Vehicle",
    "Fire Hydrant",
    "Hardhat",
    "Mask",
    "Safety Vest",
    "Gloves",
];

const SAFETY_QUERIES: &[(&str, &str)] = &[
    // missing PPE
    ("NO-Hardhat", "hard hat head protection requirement construction site"),
    ("NO-Mask", "respiratory protection mask requirement airborne contaminants"),
    ("NO-Safety Vest", "high visibility safety vest apparel requirement flagger"),
    // PPE present
    ("Hardhat", "hard hat head protection compliance standard"),
    ("Mask", "respiratory protection mask compliance"),
    ("Safety Vest", "high visibility safety apparel compliance"),
    ("Gloves", "hand protection gloves requirement construction"),
    ("Person", "worker safety requirement construction site general"),
    // heavy equipment
    ("Excavator", "excavator heavy equipment operator safety clearance zone"),
    ("Wheel Loader", "wheel loader heavy machinery operator safety requirement"),
    ("Machinery", "machinery equipment safety requirement construction"),
    ("Dump Truck", "dump truck vehicle safety construction site"),
    ("Truck", "truck vehicle safety construction site"),
    ("Truck and Trailer", "truck trailer vehicle safety construction site"),
    ("Trailer", "trailer vehicle safety requirement"),
    ("Semi", "semi truck heavy vehicle safety requirement"),
    // traffic
    ("SUV", "vehicle traffic control construction zone safety"),
    ("Van", "van vehicle traffic control construction zone"),
    ("Mini-Van", "vehicle traffic control construction zone safety"),
    ("Sedan", "vehicle traffic control construction zone safety"),
    ("Vehicle", "vehicle traffic control construction zone safety"),
    ("Bus", "bus vehicle traffic control construction zone"),
    // site hazards
    ("Safety Cone", "traffic cone safety barrier construction zone requirement"),
    ("Ladder", "ladder safety requirement portable climbing construction"),
    ("Fire Hydrant", "fire hydrant clearance requirement obstruction"),
];

fn tier_table() -> &'static HashMap<&'static str, PriorityTier> {
    static TABLE: OnceLock<HashMap<&'static str, PriorityTier>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = HashMap::new();
        table.extend(LOW_LABELS.iter().map(|l| (*l, PriorityTier::Low)));
        table.extend(MEDIUM_LABELS.iter().map(|l| (*l, PriorityTier::Medium)));
        table.extend(VIOLATION_LABELS.iter().map(|l| (*l, PriorityTier::High)));
        table
    })
}

fn query_table() -> &'static HashMap<&'static str, &'static str> {
    static TABLE: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| SAFETY_QUERIES.iter().copied().collect())
}

/// Tier for a label. Total: unrecognised labels are `Low`.
pub fn classify(label: &str) -> PriorityTier {
    tier_table().get(label).copied().unwrap_or(PriorityTier::Low)
}

/// Curated safety query for a label, or a generic one for unseen labels.
pub fn query_for(label: &str) -> String {
    match query_table().get(label) {
        Some(query) => (*query).to_string(),
        None => format!("{label} safety requirement construction site"),
    }
}

pub fn is_violation(label: &str) -> bool {
    VIOLATION_LABELS.contains(&label)
}

pub fn is_machinery(label: &str) -> bool {
    MACHINERY_LABELS.contains(&label)
}
