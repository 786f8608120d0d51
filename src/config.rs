//! Configuration options consumed by the universal compaction picker.
//!
//! Options can be built in code, loaded from a TOML/JSON file, or merged from
//! environment variables:
//!
//! ```rust
//! use terndb_compaction::config::CompactionSettings;
//! let settings = CompactionSettings::default();
//! ```
//!
//! ```rust,no_run
//! use terndb_compaction::config::CompactionSettings;
//! let settings = CompactionSettings::from_file("compaction.toml").unwrap();
//! let settings = CompactionSettings::from_env("TERNDB_").unwrap();
//! ```

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Json, Toml};
use figment::{Figment, Metadata, Provider};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Stopping rule for the windowed ratio strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CompactionStopStyle {
    /// Pick while the next run is within the ratio of the *total* size
    /// accumulated so far.
    #[default]
    TotalSize,
    /// Pick while the next run is within the ratio of the *last* picked run,
    /// in both directions.
    SimilarSize,
}

/// Compression codec applied to compaction outputs. The picker only chooses
/// a codec; it never compresses anything itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionCodec {
    Snappy,
    Lz4,
    Zlib,
    Zstd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CompressionOptions {
    /// Codec-specific compression level. 0 means the codec default.
    pub level: i32,
}

/// One tier of storage. Compaction outputs are steered across paths so that
/// the projected geometric growth of the database still fits in the chosen
/// path and the paths before it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathConfig {
    pub path: PathBuf,
    /// Bytes this path is expected to hold.
    pub target_size: u64,
}

/// Options specific to the universal compaction strategies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniversalCompactionOptions {
    /// Percent slack when comparing a candidate run against the runs already
    /// picked by the windowed ratio strategy.
    pub size_ratio: u32,

    /// Minimum number of runs in a ratio-strategy window.
    pub min_merge_width: usize,

    /// Maximum number of runs in a ratio-strategy window.
    pub max_merge_width: usize,

    /// Size amplification threshold, in percent of the bottommost run, above
    /// which everything is compacted down to the bottommost level.
    pub max_size_amplification_percent: u64,

    /// If the runs older than a picked window make up at least this percent
    /// of the total, the window's output is left uncompressed. Negative
    /// disables the heuristic.
    pub compression_size_percent: i32,

    pub stop_style: CompactionStopStyle,

    /// Allow relabeling whole non-overlapping inputs to a lower level
    /// without rewriting them.
    pub allow_trivial_move: bool,
}

impl Default for UniversalCompactionOptions {
    fn default() -> Self {
        Self {
            size_ratio: 1,
            min_merge_width: 2,
            max_merge_width: usize::MAX,
            max_size_amplification_percent: 200,
            compression_size_percent: -1,
            stop_style: CompactionStopStyle::TotalSize,
            allow_trivial_move: false,
        }
    }
}

/// Every option the picker consumes, for one column family.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompactionSettings {
    /// Minimum number of sorted runs before compaction is considered.
    pub level0_file_num_compaction_trigger: usize,

    /// Switch to the lazy compaction style: map rewrites instead of full
    /// merges, with the grouping-based ratio strategy.
    pub enable_lazy_compaction: bool,

    /// Reserve the bottommost level for ingested files; compaction outputs
    /// stop one level above it.
    pub allow_ingest_behind: bool,

    /// Upper bound on sub-compaction partitions per plan. 0 means the
    /// scheduler default.
    pub max_subcompactions: usize,

    /// Budget for one sub-compaction partition when sweeping map elements.
    pub max_compaction_bytes: u64,

    /// Memtable size; the unit the grouping strategy normalizes run sizes by.
    pub write_buffer_size: u64,

    /// Target size of one output file.
    pub target_file_size_base: u64,

    /// Codec for compaction outputs; `None` disables compression outright.
    pub compression_codec: Option<CompressionCodec>,

    pub compression_opts: CompressionOptions,

    pub universal: UniversalCompactionOptions,

    /// Storage tiers, fastest first. Empty means a single unnamed path.
    pub paths: Vec<PathConfig>,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            level0_file_num_compaction_trigger: 4,
            enable_lazy_compaction: false,
            allow_ingest_behind: false,
            max_subcompactions: 1,
            max_compaction_bytes: 64 * 1024 * 1024 * 25,
            write_buffer_size: 64 * 1024 * 1024,
            target_file_size_base: 64 * 1024 * 1024,
            compression_codec: Some(CompressionCodec::Snappy),
            compression_opts: CompressionOptions::default(),
            universal: UniversalCompactionOptions::default(),
            paths: Vec::new(),
        }
    }
}

impl CompactionSettings {
    /// Loads settings from a TOML or JSON file, keeping defaults for any
    /// option the file does not mention.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let Some(ext) = path.extension() else {
            return Err(Error::UnknownConfigurationFormat(path.into()));
        };

        let mut builder = Figment::from(CompactionSettings::default());
        match ext.to_str().unwrap_or_default() {
            "json" => builder = builder.merge(Json::file(path)),
            "toml" => builder = builder.merge(Toml::file(path)),
            _ => return Err(Error::UnknownConfigurationFormat(path.into())),
        }
        builder
            .extract()
            .map_err(|e| Error::InvalidConfiguration(e.to_string()))
    }

    /// Loads settings from environment variables with the given prefix
    /// merged over the defaults.
    pub fn from_env(prefix: &str) -> Result<Self, Error> {
        Figment::from(CompactionSettings::default())
            .merge(Env::prefixed(prefix))
            .extract()
            .map_err(|e| Error::InvalidConfiguration(e.to_string()))
    }

    /// Target size for an output file at the given level. Universal
    /// compaction sizes output files uniformly across levels.
    pub fn target_file_size(&self, _level: usize) -> u64 {
        self.target_file_size_base
    }
}

impl Provider for CompactionSettings {
    fn metadata(&self) -> Metadata {
        Metadata::named("terndb compaction options")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        figment::providers::Serialized::defaults(CompactionSettings::default()).data()
    }
}
