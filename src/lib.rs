#![cfg_attr(test, allow(clippy::unwrap_used))]
#![warn(clippy::panic)]
#![cfg_attr(test, allow(clippy::panic))]
#![allow(clippy::too_many_arguments)]

//! The universal compaction picker of the terndb LSM engine.
//!
//! Given an immutable snapshot of on-disk file metadata for one column
//! family ([`VersionView`]), the picker decides which files to merge next
//! and how: it summarizes the snapshot into sorted runs, consults its
//! strategies in a fixed order (size amplification, size ratio in both the
//! windowed and grouping forms, composite map/link/essence rewrites,
//! delete-triggered, trivial moves) and returns a registered
//! [`CompactionPlan`] carrying the inputs, output level, storage path,
//! compression choice and execution hints. It performs no I/O and executes
//! nothing; the scheduler that calls it under the column family lock owns
//! both.

/// Re-export the bytes crate.
///
/// This is useful for users of the crate who want to build keys and ranges
/// without having to depend on the bytes crate directly.
pub use bytes;

pub use config::CompactionSettings;
pub use error::Error;
pub use picker_state::PickerState;
pub use plan::{CompactionPlan, CompactionReason, LevelInputs};
pub use table_cache::{
    sst_read_amp, MapElementIter, MapLink, MapSstElement, TableCache, TableProperties,
    SST_READ_AMP_PROPERTY,
};
pub use types::{InternalKey, KeyRange, SeqNo};
pub use universal::{
    CompactRangeLevel, CompactRangeOutcome, CompactRangeRequest, PickerStats,
    UniversalCompactionPicker,
};
pub use version::{FileHandle, SstPurpose, VersionView};

pub mod config;

mod error;
mod grouping;
mod overlap;
mod paths;
mod picker_state;
mod plan;
mod sorted_run;
mod table_cache;
#[cfg(test)]
mod test_utils;
mod types;
mod universal;
mod version;
