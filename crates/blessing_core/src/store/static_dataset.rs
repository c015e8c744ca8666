//! Build-time static dataset.
//!
//! # Responsibility
//! - Expose the identifiers known at build time with optional pre-seeded
//!   blessing content.
//! - Seed the local cache on first use.
//!
//! # Invariants
//! - Read-only at runtime.
//! - Bundled ids are well-formed and unique.

use crate::model::blessing::BlessingRecord;
use crate::store::dedupe_by_id;
use once_cell::sync::Lazy;

const BUNDLED_DATASET_JSON: &str = include_str!("../../data/static_blessings.json");

static BUNDLED_DATASET: Lazy<StaticDataset> = Lazy::new(|| {
    let records: Vec<BlessingRecord> =
        serde_json::from_str(BUNDLED_DATASET_JSON).expect("bundled static dataset is valid JSON");
    StaticDataset::from_records(records)
});

/// Immutable list of known records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticDataset {
    records: Vec<BlessingRecord>,
}

impl StaticDataset {
    /// Returns the dataset compiled into this binary.
    pub fn bundled() -> &'static StaticDataset {
        &BUNDLED_DATASET
    }

    /// Builds a dataset from explicit records. Later duplicates of an id are
    /// dropped so the first occurrence wins.
    pub fn from_records(records: Vec<BlessingRecord>) -> Self {
        Self {
            records: dedupe_by_id(records),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn find(&self, id: &str) -> Option<&BlessingRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn records(&self) -> &[BlessingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
