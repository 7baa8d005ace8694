//! Engine configuration, analogous to the teacher's `PackOptions`.
//!
//! Only `versions`/`active_version` are mandatory; everything else has a
//! default matching the frozen format constants.

use serde::{Deserialize, Serialize};

use crate::header::INITIAL_INDEX_CAPACITY;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOptions {
    pub versions: Vec<String>,
    pub active_version: String,
    pub initial_index_capacity: u32,
    pub compaction_density_threshold: f64,
    pub compaction_min_fragments: usize,
    pub compaction_min_bytes: u64,
    pub incremental_compaction_max_bytes: u32,
}

impl EngineOptions {
    pub fn new(versions: Vec<String>, active_version: impl Into<String>) -> Self {
        Self {
            versions,
            active_version: active_version.into(),
            ..Self::defaults()
        }
    }

    fn defaults() -> Self {
        Self {
            versions: Vec::new(),
            active_version: String::new(),
            initial_index_capacity: INITIAL_INDEX_CAPACITY,
            compaction_density_threshold: 0.6,
            compaction_min_fragments: 8,
            compaction_min_bytes: 65_536,
            incremental_compaction_max_bytes: 524_288,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fills_in_defaults() {
        let opts = EngineOptions::new(vec!["public".into()], "public");
        assert_eq!(opts.initial_index_capacity, INITIAL_INDEX_CAPACITY);
        assert_eq!(opts.compaction_min_fragments, 8);
        assert_eq!(opts.compaction_min_bytes, 65_536);
        assert_eq!(opts.incremental_compaction_max_bytes, 524_288);
    }
}
