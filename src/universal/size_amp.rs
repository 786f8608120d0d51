use log::debug;

use crate::plan::{CompactionPlan, CompactionReason, PlanParams};
use crate::sorted_run::SortedRun;
use crate::universal::{inputs_from_runs, UniversalCompactionPicker};
use crate::version::VersionView;

impl UniversalCompactionPicker {
    /// Compacts everything down to the bottommost level when the bytes above
    /// it exceed `max_size_amplification_percent` of the bottommost run.
    /// Overrides the ratio strategy's window bounds: all runs from the first
    /// one not being compacted through the bottom are taken.
    pub(crate) fn pick_size_amp(
        &self,
        version: &VersionView,
        score: f64,
        sorted_runs: &[SortedRun],
    ) -> Option<CompactionPlan> {
        let ratio = self.settings.universal.max_size_amplification_percent;

        if sorted_runs.last()?.being_compacted {
            return None;
        }

        let mut start_index = None;
        for (index, sr) in sorted_runs[..sorted_runs.len() - 1].iter().enumerate() {
            if !sr.being_compacted {
                start_index = Some(index);
                break;
            }
            debug!(
                "universal: skipping {} [{}], being compacted, cannot reduce size amp",
                sr, index
            );
        }
        let start_index = start_index?;
        debug!(
            "universal: first candidate {} [{}] to reduce size amp",
            sorted_runs[start_index], start_index
        );

        // every run above the bottommost must be free, size amp compacts
        // them all at once
        let mut candidate_size = 0u64;
        let mut candidate_count = 0usize;
        for sr in &sorted_runs[start_index..sorted_runs.len() - 1] {
            if sr.being_compacted {
                debug!(
                    "universal: candidate {} is already being compacted, no size amp reduction possible",
                    sr
                );
                return None;
            }
            candidate_size += sr.compensated_size;
            candidate_count += 1;
        }
        if candidate_count == 0 {
            return None;
        }

        let earliest_file_size = sorted_runs.last().expect("runs are non-empty").size;
        if candidate_size * 100 < ratio * earliest_file_size {
            debug!(
                "universal: size amp not needed, newer-files-total-size {} earliest-file-size {}",
                candidate_size, earliest_file_size
            );
            return None;
        }
        debug!(
            "universal: size amp needed, newer-files-total-size {} earliest-file-size {}",
            candidate_size, earliest_file_size
        );
        debug_assert!(start_index < sorted_runs.len() - 1);

        let estimated_total_size: u64 = sorted_runs[start_index..].iter().map(|sr| sr.size).sum();
        let path_id =
            crate::paths::path_for_compaction_output(&self.settings, estimated_total_size);

        let mut output_level = version.num_levels() - 1;
        if self.settings.allow_ingest_behind {
            debug_assert!(output_level > 1);
            output_level -= 1;
        }

        let mut params = PlanParams::new(CompactionReason::UniversalSizeAmplification);
        params.inputs = inputs_from_runs(version, sorted_runs, start_index, sorted_runs.len());
        params.output_level = output_level;
        params.target_file_size = self.settings.target_file_size(output_level);
        params.output_path_id = path_id;
        // the whole database is rewritten, so always compress
        params.compression = self.compression_for_output(true);
        params.compression_opts = self.settings.compression_opts;
        params.score = score;
        params.max_subcompactions = self.settings.max_subcompactions;
        Some(CompactionPlan::new(params))
    }
}
