//! # fragstore — crash-tolerant single-file fragment store
//!
//! Format guarantees (frozen at format_version 2):
//! - All numeric fields are big-endian; never negotiated.
//! - Layout is strictly `[Header(256B) | Index | DataRegion]`.
//! - The index is an in-place dense slot array; the id→slot map and the
//!   free-extent list are both reconstructible from it on open — neither
//!   is itself durable state.
//! - A fragment's payload packs every version's bytes as a
//!   structure-of-arrays: entry headers first, then concatenated data.
//! - The engine is single-threaded and does not lock internally; callers
//!   must serialize access.
//!
//! See [`FragmentStore`] for the core contract and [`recovery::scan`] for
//! an independent, trust-nothing diagnostic pass over an existing file.

pub mod compaction;
pub mod config;
pub mod engine;
pub mod error;
pub mod freelist;
pub mod header;
pub mod payload;
pub mod recovery;
pub mod slot;

pub use config::EngineOptions;
pub use engine::{parse_fragment_id, FragmentStore};
pub use error::FragmentError;
pub use recovery::{scan, ScanReport, ScannedSlot, SlotHealth};
