use std::fmt::{Display, Formatter};
use std::sync::Arc;

use ulid::Ulid;

use crate::config::{CompressionCodec, CompressionOptions};
use crate::types::{InternalKey, KeyRange};
use crate::version::{FileHandle, SstPurpose};

/// Why a plan was picked. Attached to every plan for observability and for
/// the scheduler's accounting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompactionReason {
    UniversalSizeAmplification,
    UniversalSizeRatio,
    UniversalSortedRunNum,
    FilesMarkedForCompaction,
    TrivialMoveLevel,
    CompositeAmplification,
    ManualCompaction,
}

/// The files one plan consumes from one level.
#[derive(Clone, Debug)]
pub struct LevelInputs {
    pub level: usize,
    pub files: Vec<Arc<FileHandle>>,
}

impl LevelInputs {
    pub(crate) fn new(level: usize) -> Self {
        Self {
            level,
            files: Vec::new(),
        }
    }
}

/// Everything a strategy decides about a compaction; turned into a
/// `CompactionPlan` once complete.
pub(crate) struct PlanParams {
    pub inputs: Vec<LevelInputs>,
    pub output_level: usize,
    pub target_file_size: u64,
    pub output_path_id: u32,
    pub compression: Option<CompressionCodec>,
    pub compression_opts: CompressionOptions,
    pub score: f64,
    pub reason: CompactionReason,
    pub purpose: SstPurpose,
    pub input_range: Vec<KeyRange>,
    pub partial_compaction: bool,
    pub manual_compaction: bool,
    pub max_subcompactions: usize,
}

impl PlanParams {
    pub(crate) fn new(reason: CompactionReason) -> Self {
        Self {
            inputs: Vec::new(),
            output_level: 0,
            target_file_size: 0,
            output_path_id: 0,
            compression: None,
            compression_opts: CompressionOptions::default(),
            score: 0.0,
            reason,
            purpose: SstPurpose::Essence,
            input_range: Vec::new(),
            partial_compaction: false,
            manual_compaction: false,
            max_subcompactions: 0,
        }
    }
}

/// A compaction decision: which files to merge, where the output goes and
/// how. Produced by the picker, registered while in flight, executed
/// elsewhere.
pub struct CompactionPlan {
    id: Ulid,
    inputs: Vec<LevelInputs>,
    output_level: usize,
    target_file_size: u64,
    output_path_id: u32,
    compression: Option<CompressionCodec>,
    compression_opts: CompressionOptions,
    score: f64,
    reason: CompactionReason,
    purpose: SstPurpose,
    input_range: Vec<KeyRange>,
    partial_compaction: bool,
    manual_compaction: bool,
    trivial_move: bool,
    max_subcompactions: usize,
}

impl CompactionPlan {
    pub(crate) fn new(params: PlanParams) -> Self {
        debug_assert!(params.inputs.iter().any(|li| !li.files.is_empty()));
        Self {
            id: Ulid::new(),
            inputs: params.inputs,
            output_level: params.output_level,
            target_file_size: params.target_file_size,
            output_path_id: params.output_path_id,
            compression: params.compression,
            compression_opts: params.compression_opts,
            score: params.score,
            reason: params.reason,
            purpose: params.purpose,
            input_range: params.input_range,
            partial_compaction: params.partial_compaction,
            manual_compaction: params.manual_compaction,
            trivial_move: false,
            max_subcompactions: params.max_subcompactions,
        }
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn inputs(&self) -> &[LevelInputs] {
        &self.inputs
    }

    /// The level of the newest inputs.
    pub fn start_level(&self) -> usize {
        self.inputs.first().map(|li| li.level).unwrap_or(0)
    }

    pub fn output_level(&self) -> usize {
        self.output_level
    }

    pub fn target_file_size(&self) -> u64 {
        self.target_file_size
    }

    pub fn output_path_id(&self) -> u32 {
        self.output_path_id
    }

    pub fn compression(&self) -> Option<CompressionCodec> {
        self.compression
    }

    pub fn compression_opts(&self) -> CompressionOptions {
        self.compression_opts
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn reason(&self) -> CompactionReason {
        self.reason
    }

    pub fn purpose(&self) -> SstPurpose {
        self.purpose
    }

    /// Sub-compaction partitions for partial plans; empty means the whole
    /// input range.
    pub fn input_range(&self) -> &[KeyRange] {
        &self.input_range
    }

    pub fn is_partial_compaction(&self) -> bool {
        self.partial_compaction
    }

    pub fn is_manual_compaction(&self) -> bool {
        self.manual_compaction
    }

    pub fn is_trivial_move(&self) -> bool {
        self.trivial_move
    }

    pub(crate) fn set_trivial_move(&mut self, trivial_move: bool) {
        self.trivial_move = trivial_move;
    }

    pub fn max_subcompactions(&self) -> usize {
        self.max_subcompactions
    }

    pub fn num_input_files(&self) -> usize {
        self.inputs.iter().map(|li| li.files.len()).sum()
    }

    /// Smallest and largest internal key across all inputs.
    pub fn key_range(&self) -> Option<(InternalKey, InternalKey)> {
        key_range_of_levels(&self.inputs)
    }

    pub(crate) fn all_input_files(&self) -> impl Iterator<Item = &Arc<FileHandle>> {
        self.inputs.iter().flat_map(|li| li.files.iter())
    }
}

impl Display for CompactionPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let displayed_inputs: Vec<String> = self
            .inputs
            .iter()
            .map(|li| {
                format!(
                    "L{}:{:?}",
                    li.level,
                    li.files
                        .iter()
                        .map(|file| file.file_number())
                        .collect::<Vec<_>>()
                )
            })
            .collect();
        write!(
            f,
            "{:?} -> L{} ({:?})",
            displayed_inputs, self.output_level, self.reason
        )
    }
}

/// Smallest and largest internal key across a set of level inputs.
pub(crate) fn key_range_of_levels(inputs: &[LevelInputs]) -> Option<(InternalKey, InternalKey)> {
    key_range_of_files(inputs.iter().flat_map(|li| li.files.iter()))
}

pub(crate) fn key_range_of_files<'a>(
    files: impl Iterator<Item = &'a Arc<FileHandle>>,
) -> Option<(InternalKey, InternalKey)> {
    let mut range: Option<(InternalKey, InternalKey)> = None;
    for f in files {
        range = Some(match range {
            None => (f.smallest().clone(), f.largest().clone()),
            Some((smallest, largest)) => (
                smallest.min(f.smallest().clone()),
                largest.max(f.largest().clone()),
            ),
        });
    }
    range
}
