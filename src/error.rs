use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the picker's collaborators (table cache, map element
/// iterators, configuration loading).
///
/// None of these ever escape `pick_compaction` or `compact_range`: a strategy
/// that hits one logs it and declines, and the picker falls through to the
/// next strategy or returns no plan.
#[non_exhaustive]
#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("corrupt metadata: file {file_number} missing from depend map or part of a dependency cycle")]
    CorruptMetadata { file_number: u64 },

    #[error("map element iterator failure: {0}")]
    IteratorFailure(String),

    #[error("unknown configuration format: {}", .0.display())]
    UnknownConfigurationFormat(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
