use std::sync::Arc;

use crate::paths::path_for_compaction_output;
use crate::picker_state::are_files_in_compaction;
use crate::plan::{key_range_of_files, CompactionPlan, CompactionReason, LevelInputs, PlanParams};
use crate::universal::UniversalCompactionPicker;
use crate::version::{FileHandle, SstPurpose, VersionView};

impl UniversalCompactionPicker {
    /// Compacts files marked by the tombstone-density collector. On a
    /// single-level tree this mirrors size-amp: the first marked level 0
    /// file and everything older. On a multi-level tree one marked file is
    /// compacted with the overlapping files of the next non-empty level,
    /// leveled-style.
    pub(crate) fn pick_delete_triggered(
        &self,
        version: &VersionView,
        score: f64,
    ) -> Option<CompactionPlan> {
        let mut inputs: Vec<LevelInputs> = Vec::new();
        let output_level;

        if version.num_levels() == 1 {
            let mut compact = false;
            let mut files = Vec::new();
            for f in version.level_files(0) {
                if f.is_marked_for_compaction() {
                    compact = true;
                }
                if compact {
                    files.push(f.clone());
                }
            }
            if files.len() <= 1 {
                // a lone marked file at the tail reclaims nothing
                return None;
            }
            output_level = 0;
            inputs.push(LevelInputs { level: 0, files });
        } else {
            let (start_level, mut start_files) = self.pick_files_marked_for_compaction(version)?;

            let mut out = start_level + 1;
            while out < version.num_levels() && version.num_level_files(out) == 0 {
                out += 1;
            }
            if out == version.num_levels() {
                if start_level == 0 {
                    out = version.num_levels() - 1;
                } else {
                    // with all lower levels empty this would be a trivial
                    // move, which reclaims no space
                    return None;
                }
            }
            if self.settings.allow_ingest_behind && out == version.num_levels() - 1 {
                debug_assert!(out > 1);
                out -= 1;
            }
            output_level = out;

            if output_level != 0 {
                if start_level == 0 {
                    start_files = get_overlapping_l0_files(version, start_files)?;
                }
                let start_inputs = LevelInputs {
                    level: start_level,
                    files: start_files,
                };
                let output_inputs = setup_other_inputs(version, &start_inputs, output_level)?;
                inputs.push(start_inputs);
                if !output_inputs.files.is_empty() {
                    inputs.push(output_inputs);
                }
                if self
                    .state
                    .files_range_overlap_with_compaction(&inputs, output_level)
                {
                    return None;
                }
            } else {
                inputs.push(LevelInputs {
                    level: start_level,
                    files: start_files,
                });
            }
        }

        // size the output against what already lives in the output level
        let estimated_total_size: u64 = version
            .level_files(output_level)
            .iter()
            .map(|f| f.size())
            .sum();
        let path_id = path_for_compaction_output(&self.settings, estimated_total_size);

        let (purpose, max_subcompactions) =
            if self.settings.enable_lazy_compaction && output_level != 0 {
                (SstPurpose::Map, 1)
            } else {
                (SstPurpose::Essence, self.settings.max_subcompactions)
            };

        let mut params = PlanParams::new(CompactionReason::FilesMarkedForCompaction);
        params.inputs = inputs;
        params.output_level = output_level;
        params.target_file_size = self.settings.target_file_size(output_level);
        params.output_path_id = path_id;
        params.compression = self.compression_for_output(true);
        params.compression_opts = self.settings.compression_opts;
        params.score = score;
        params.purpose = purpose;
        params.manual_compaction = true;
        params.max_subcompactions = max_subcompactions;
        Some(CompactionPlan::new(params))
    }

    /// First marked file that is not already being compacted, with its level.
    fn pick_files_marked_for_compaction(
        &self,
        version: &VersionView,
    ) -> Option<(usize, Vec<Arc<FileHandle>>)> {
        for (level, file) in version.files_marked_for_compaction() {
            if file.is_being_compacted() {
                continue;
            }
            return Some((level, vec![file]));
        }
        None
    }
}

/// Expands a set of level 0 files to every level 0 file overlapping their
/// combined key range, iterating until the range stops growing. Declines if
/// the expanded set touches an in-flight compaction.
fn get_overlapping_l0_files(
    version: &VersionView,
    mut files: Vec<Arc<FileHandle>>,
) -> Option<Vec<Arc<FileHandle>>> {
    loop {
        let (smallest, largest) = key_range_of_files(files.iter())?;
        let expanded: Vec<Arc<FileHandle>> = version
            .level_files(0)
            .iter()
            .filter(|f| f.overlaps(&smallest, &largest))
            .cloned()
            .collect();
        if expanded.len() == files.len() {
            if are_files_in_compaction(&expanded) {
                return None;
            }
            return Some(expanded);
        }
        files = expanded;
    }
}

/// Files of `output_level` overlapping the start inputs. Declines if any of
/// them is already being compacted.
fn setup_other_inputs(
    version: &VersionView,
    start_inputs: &LevelInputs,
    output_level: usize,
) -> Option<LevelInputs> {
    let (smallest, largest) = key_range_of_files(start_inputs.files.iter())?;
    let files: Vec<Arc<FileHandle>> = version
        .level_files(output_level)
        .iter()
        .filter(|f| f.overlaps(&smallest, &largest))
        .cloned()
        .collect();
    if are_files_in_compaction(&files) {
        return None;
    }
    Some(LevelInputs {
        level: output_level,
        files,
    })
}
