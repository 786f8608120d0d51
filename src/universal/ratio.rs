use log::debug;

use crate::config::CompactionStopStyle;
use crate::grouping::gen_sorted_run_group;
use crate::paths::path_for_compaction_output;
use crate::plan::{CompactionPlan, CompactionReason, PlanParams};
use crate::sorted_run::SortedRun;
use crate::universal::{inputs_from_runs, UniversalCompactionPicker};
use crate::version::{SstPurpose, VersionView};

impl UniversalCompactionPicker {
    /// Windowed ratio strategy: starting from each run not being compacted,
    /// extends a window while the next run's size stays within `ratio`
    /// percent of the size accumulated so far (`TotalSize`) or of the last
    /// picked run in both directions (`SimilarSize`). The first window of at
    /// least `min_merge_width` runs wins.
    pub(crate) fn pick_reduce_sorted_runs_legacy(
        &self,
        version: &VersionView,
        score: f64,
        ratio: u64,
        max_number_of_files_to_compact: usize,
        sorted_runs: &[SortedRun],
    ) -> Option<CompactionPlan> {
        let opts = &self.settings.universal;
        let min_merge_width = opts.min_merge_width.max(2);
        let max_files_to_compact = opts.max_merge_width.min(max_number_of_files_to_compact);

        debug_assert!(!sorted_runs.is_empty());

        let mut start_index = 0;
        let mut candidate_count = 0usize;
        let mut done = false;

        let mut index = 0;
        while index < sorted_runs.len() {
            candidate_count = 0;

            // skip runs that are already being compacted
            let mut sr: Option<&SortedRun> = None;
            while index < sorted_runs.len() {
                let candidate = &sorted_runs[index];
                if !candidate.being_compacted {
                    sr = Some(candidate);
                    candidate_count = 1;
                    break;
                }
                debug!(
                    "universal: {} [{}] being compacted, skipping",
                    candidate, index
                );
                index += 1;
            }
            let mut candidate_size = sr.map(|sr| sr.compensated_size).unwrap_or(0);
            if let Some(sr) = sr {
                debug!("universal: possible candidate {} [{}]", sr, index);
            }

            // check whether the succeeding runs fit the window
            let mut succ_index = index + 1;
            while candidate_count < max_files_to_compact && succ_index < sorted_runs.len() {
                let succeeding_sr = &sorted_runs[succ_index];
                if succeeding_sr.being_compacted {
                    break;
                }
                // with TotalSize candidate_size is the total picked so far;
                // with SimilarSize it is the size of the last picked run
                let sz = candidate_size as f64 * (100.0 + ratio as f64) / 100.0;
                if sz < succeeding_sr.size as f64 {
                    break;
                }
                if opts.stop_style == CompactionStopStyle::SimilarSize {
                    // also stop if the last picked run dwarfs the next one;
                    // a run of similar small files is picked up by a later
                    // window, a lonely straggler by the read amp fallback
                    let sz = succeeding_sr.size as f64 * (100.0 + ratio as f64) / 100.0;
                    if sz < candidate_size as f64 {
                        break;
                    }
                    candidate_size = succeeding_sr.compensated_size;
                } else {
                    candidate_size += succeeding_sr.compensated_size;
                }
                candidate_count += 1;
                succ_index += 1;
            }

            if candidate_count >= min_merge_width {
                start_index = index;
                done = true;
                break;
            }
            for sr in &sorted_runs[index..(index + candidate_count).min(sorted_runs.len())] {
                debug!("universal: skipping {}", sr);
            }
            index += 1;
        }
        if !done || candidate_count <= 1 {
            return None;
        }
        let first_index_after = start_index + candidate_count;

        let enable_compression = !self.tail_disables_compression(sorted_runs, first_index_after);

        let estimated_total_size: u64 = sorted_runs[..first_index_after]
            .iter()
            .map(|sr| sr.size)
            .sum();
        let path_id = path_for_compaction_output(&self.settings, estimated_total_size);
        let output_level = self.output_level_for_window(version, sorted_runs, first_index_after);

        for (i, sr) in sorted_runs[start_index..first_index_after].iter().enumerate() {
            debug!("universal: picking {} [{}]", sr, start_index + i);
        }

        let reason = if max_number_of_files_to_compact == usize::MAX {
            CompactionReason::UniversalSizeRatio
        } else {
            CompactionReason::UniversalSortedRunNum
        };

        let mut params = PlanParams::new(reason);
        params.inputs = inputs_from_runs(version, sorted_runs, start_index, first_index_after);
        params.output_level = output_level;
        params.target_file_size = self.settings.target_file_size(output_level);
        params.output_path_id = path_id;
        params.compression = self.compression_for_output(enable_compression);
        params.compression_opts = self.settings.compression_opts;
        params.score = score;
        params.max_subcompactions = self.settings.max_subcompactions;
        Some(CompactionPlan::new(params))
    }

    /// Grouping ratio strategy, used under lazy compaction: normalizes run
    /// sizes by the write buffer size, partitions them into
    /// `reduce_sorted_run_target` geometric groups and rewrites the first
    /// multi-run group that is free, as a map.
    ///
    /// Every multi-run group's runs are tagged `wait_reduce` so the
    /// composite strategy does not grab them within this same picker call.
    pub(crate) fn pick_reduce_sorted_runs(
        &self,
        version: &VersionView,
        score: f64,
        sorted_runs: &mut [SortedRun],
        reduce_sorted_run_target: usize,
    ) -> Option<CompactionPlan> {
        let target = if reduce_sorted_run_target == 0 {
            sorted_runs.len()
        } else {
            reduce_sorted_run_target
        };
        let base_size = self.settings.write_buffer_size as f64;
        let sorted_run_ratio: Vec<f64> = sorted_runs
            .iter()
            .map(|sr| sr.size as f64 / base_size)
            .collect();
        let (groups, common_ratio) = gen_sorted_run_group(&sorted_run_ratio, target);
        debug!(
            "universal: reduce to {} sorted runs, common ratio = {}",
            target, common_ratio
        );

        let mut start_index = 0;
        let mut end_index = 0;
        for (group_i, g) in groups.iter().enumerate() {
            let mut being_compacted = false;
            if g.count > 1 {
                for sr in &mut sorted_runs[g.start..g.start + g.count] {
                    being_compacted |= sr.being_compacted;
                    sr.wait_reduce = true;
                }
            }
            if end_index != 0 {
                continue;
            }
            if g.count == 1 {
                debug!(
                    "universal: group {}, count = 1, size = {}, single sorted run, skip",
                    group_i + 1,
                    (g.ratio * base_size) as u64
                );
                continue;
            }
            if being_compacted {
                debug!(
                    "universal: group {}, count = {}, size = {}, being compacted, skip",
                    group_i + 1,
                    g.count,
                    (g.ratio * base_size) as u64
                );
                continue;
            }
            start_index = g.start;
            end_index = g.start + g.count;
        }
        if end_index == 0 {
            return None;
        }

        let enable_compression = !self.tail_disables_compression(sorted_runs, end_index);

        let estimated_total_size: u64 = sorted_runs[start_index..end_index]
            .iter()
            .map(|sr| sr.size)
            .sum();
        let path_id = path_for_compaction_output(&self.settings, estimated_total_size);
        let output_level = self.output_level_for_window(version, sorted_runs, end_index);

        for (i, sr) in sorted_runs[start_index..end_index].iter().enumerate() {
            debug!("universal: picking {} [{}]", sr, start_index + i);
        }

        let mut params = PlanParams::new(CompactionReason::UniversalSortedRunNum);
        params.inputs = inputs_from_runs(version, sorted_runs, start_index, end_index);
        params.output_level = output_level;
        params.target_file_size = self.settings.target_file_size(output_level);
        params.output_path_id = path_id;
        params.compression = self.compression_for_output(enable_compression);
        params.compression_opts = self.settings.compression_opts;
        params.score = score;
        params.purpose = SstPurpose::Map;
        params.max_subcompactions = 1;
        Some(CompactionPlan::new(params))
    }
}
