//! The universal compaction picker: strategies, the top-level selector and
//! manual range planning.

mod compact_range;
mod composite;
mod delete_triggered;
mod ratio;
mod size_amp;
mod trivial_move;

pub use compact_range::{CompactRangeLevel, CompactRangeOutcome, CompactRangeRequest};

use std::sync::Arc;

use log::debug;

use crate::config::{CompactionSettings, CompressionCodec};
use crate::overlap::is_input_files_non_overlapping;
use crate::picker_state::PickerState;
use crate::plan::{CompactionPlan, CompactionReason, LevelInputs};
use crate::sorted_run::{calculate_sorted_runs, SortedRun};
use crate::table_cache::{sst_read_amp, TableCache};
use crate::version::{SstPurpose, VersionView};

/// Running counters the picker keeps about its own decisions.
#[derive(Clone, Copy, Debug, Default)]
pub struct PickerStats {
    pub compactions_picked: u64,
    /// Number of start-level input files in the most recent plan.
    pub last_compaction_input_files: u64,
}

/// Picks universal compactions for one column family.
///
/// The picker is invoked by a scheduler that holds the column family's
/// mutex; every call runs to completion without suspending. It never
/// executes compactions: it returns registered plans and is told about
/// their completion through [`PickerState::deregister`].
pub struct UniversalCompactionPicker {
    settings: CompactionSettings,
    table_cache: Option<Arc<dyn TableCache>>,
    state: PickerState,
    stats: PickerStats,
}

impl UniversalCompactionPicker {
    pub fn new(settings: CompactionSettings, table_cache: Option<Arc<dyn TableCache>>) -> Self {
        Self {
            settings,
            table_cache,
            state: PickerState::new(),
            stats: PickerStats::default(),
        }
    }

    pub fn settings(&self) -> &CompactionSettings {
        &self.settings
    }

    pub fn state(&self) -> &PickerState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PickerState {
        &mut self.state
    }

    pub fn stats(&self) -> PickerStats {
        self.stats
    }

    /// Cheap gate consulted by the scheduler before calling
    /// [`Self::pick_compaction`]. All detail lives in the pick itself.
    pub fn needs_compaction(&self, version: &VersionView) -> bool {
        if version.compaction_score(0) >= 1.0 {
            return true;
        }
        if !version.files_marked_for_compaction().is_empty() {
            return true;
        }
        if version.has_space_amplification() {
            return true;
        }
        false
    }

    /// Consults the strategies in order and returns the first accepted plan,
    /// validated and registered. Returns `None` when there is nothing worth
    /// doing.
    pub fn pick_compaction(&mut self, version: &mut VersionView) -> Option<Arc<CompactionPlan>> {
        let trigger = self.settings.level0_file_num_compaction_trigger;
        let score = version.compaction_score(0);
        let mut sorted_runs = calculate_sorted_runs(version, &self.settings);

        if sorted_runs.is_empty()
            || (version.files_marked_for_compaction().is_empty()
                && !version.has_space_amplification()
                && sorted_runs.len() < trigger)
        {
            debug!("universal: nothing to do");
            return None;
        }
        debug!("universal: {} sorted runs", sorted_runs.len());

        let mut plan: Option<CompactionPlan> = None;
        if version.has_space_amplification() || sorted_runs.len() >= trigger {
            if self.settings.enable_lazy_compaction {
                let mut reduce_sorted_run_target = trigger + version.num_levels() - 1;
                if self.state.has_map_compaction() {
                    // a running map rewrite already owns the level layout
                    reduce_sorted_run_target = usize::MAX;
                } else if let Some(tm) = self.pick_trivial_move(version) {
                    plan = Some(tm);
                    reduce_sorted_run_target = usize::MAX;
                } else if let Some(cache) = self.table_cache.clone() {
                    if sorted_runs.len() > 1 && sorted_runs.len() <= reduce_sorted_run_target {
                        let mut level_read_amp_count = 0usize;
                        let mut rebuild_map = false;
                        for sr in &sorted_runs {
                            let f = if sr.level > 0 {
                                if !version.level_has_space_amplification(sr.level) {
                                    continue;
                                }
                                let level_files = version.level_files(sr.level);
                                if level_files.len() > 1 {
                                    // composite will rebuild this level's map
                                    rebuild_map = true;
                                    break;
                                }
                                level_files[0].clone()
                            } else {
                                let file = sr.file.clone().expect("level 0 run carries a file");
                                if file.purpose() != SstPurpose::Map {
                                    continue;
                                }
                                file
                            };
                            if let Ok(props) = cache.table_properties(&f) {
                                let read_amp = sst_read_amp(&props);
                                if read_amp > 1 {
                                    level_read_amp_count += read_amp;
                                }
                            }
                        }
                        if rebuild_map {
                            reduce_sorted_run_target = usize::MAX;
                        } else if level_read_amp_count < reduce_sorted_run_target {
                            reduce_sorted_run_target = trigger.max(sorted_runs.len() - 1);
                        }
                    }
                }
                if plan.is_none() && sorted_runs.len() > reduce_sorted_run_target {
                    if let Some(p) = self.pick_reduce_sorted_runs(
                        version,
                        score,
                        &mut sorted_runs,
                        reduce_sorted_run_target,
                    ) {
                        debug!("universal: compacting for lazy compaction");
                        plan = Some(p);
                    }
                }
            } else if let Some(p) = self.pick_size_amp(version, score, &sorted_runs) {
                debug!("universal: compacting for size amp");
                plan = Some(p);
            } else {
                let ratio = u64::from(self.settings.universal.size_ratio);
                if let Some(p) = self.pick_reduce_sorted_runs_legacy(
                    version,
                    score,
                    ratio,
                    usize::MAX,
                    &sorted_runs,
                ) {
                    debug!("universal: compacting for size ratio");
                    plan = Some(p);
                } else {
                    // Size amplification and size ratios are within limits;
                    // force the number of sorted runs back under the trigger.
                    debug_assert!(sorted_runs.len() >= trigger);
                    let num_sr_not_compacted =
                        sorted_runs.iter().filter(|sr| !sr.being_compacted).count();
                    if num_sr_not_compacted > trigger {
                        let num_files = num_sr_not_compacted - trigger + 1;
                        if let Some(p) = self.pick_reduce_sorted_runs_legacy(
                            version,
                            score,
                            u64::MAX,
                            num_files,
                            &sorted_runs,
                        ) {
                            debug!("universal: compacting for file num -- {}", num_files);
                            plan = Some(p);
                        }
                    }
                }
            }
        }
        if plan.is_none() && self.table_cache.is_some() {
            plan = self.pick_composite(version, &sorted_runs);
        }
        if plan.is_none() {
            if let Some(p) = self.pick_delete_triggered(version, score) {
                debug!("universal: delete triggered compaction");
                plan = Some(p);
            }
        }
        let mut plan = plan?;

        let mut allow_trivial_move = self.settings.universal.allow_trivial_move;
        if plan.reason() != CompactionReason::TrivialMoveLevel && allow_trivial_move {
            // a level holding map or link ssts cannot be relabeled
            for li in plan.inputs() {
                if version.level_has_space_amplification(li.level) {
                    allow_trivial_move = false;
                    break;
                }
            }
        }
        if allow_trivial_move {
            plan.set_trivial_move(is_input_files_non_overlapping(&plan));
            debug_assert!(
                plan.reason() != CompactionReason::TrivialMoveLevel || plan.is_trivial_move()
            );
        }

        #[cfg(debug_assertions)]
        validate_sequence_order(&plan);

        self.stats.compactions_picked += 1;
        self.stats.last_compaction_input_files = plan
            .inputs()
            .first()
            .map(|li| li.files.len() as u64)
            .unwrap_or(0);

        let plan = Arc::new(plan);
        self.state.register(plan.clone());
        version.compute_compaction_score(&self.settings);
        Some(plan)
    }

    pub(crate) fn compression_for_output(&self, enable_compression: bool) -> Option<CompressionCodec> {
        if enable_compression {
            self.settings.compression_codec
        } else {
            None
        }
    }

    /// Shared tail heuristic of the ratio strategies: leave the output
    /// uncompressed if the runs older than the picked window already hold at
    /// least `compression_size_percent` of the total.
    pub(crate) fn tail_disables_compression(
        &self,
        sorted_runs: &[SortedRun],
        first_index_after: usize,
    ) -> bool {
        let ratio_to_compress = self.settings.universal.compression_size_percent;
        if ratio_to_compress < 0 {
            return false;
        }
        let total_size: u64 = sorted_runs.iter().map(|sr| sr.compensated_size).sum();
        let mut older_file_size = 0u64;
        for sr in sorted_runs[first_index_after..].iter().rev() {
            older_file_size += sr.size;
            if older_file_size * 100 >= total_size * ratio_to_compress as u64 {
                return true;
            }
        }
        false
    }

    /// Output level for a window of runs ending just before `end_index`: the
    /// bottommost level if the window reaches the oldest run, otherwise the
    /// level just above the run after the window.
    pub(crate) fn output_level_for_window(
        &self,
        version: &VersionView,
        sorted_runs: &[SortedRun],
        end_index: usize,
    ) -> usize {
        let mut output_level = if end_index == sorted_runs.len() {
            version.num_levels() - 1
        } else if sorted_runs[end_index].level == 0 {
            0
        } else {
            sorted_runs[end_index].level - 1
        };
        // bottommost level is reserved for files ingested behind
        if self.settings.allow_ingest_behind && output_level == version.num_levels() - 1 {
            debug_assert!(output_level > 1);
            output_level -= 1;
        }
        output_level
    }
}

/// Collects the window `sorted_runs[start_index..end_index]` into per-level
/// inputs: level 0 runs contribute their single file, lower-level runs
/// contribute the whole level.
pub(crate) fn inputs_from_runs(
    version: &VersionView,
    sorted_runs: &[SortedRun],
    start_index: usize,
    end_index: usize,
) -> Vec<LevelInputs> {
    let mut l0 = LevelInputs::new(0);
    let mut rest: Vec<LevelInputs> = Vec::new();
    for run in &sorted_runs[start_index..end_index] {
        match (&run.file, run.level) {
            (Some(f), 0) => l0.files.push(f.clone()),
            (_, level) => rest.push(LevelInputs {
                level,
                files: version.level_files(level).to_vec(),
            }),
        }
    }
    let mut inputs = Vec::new();
    if !l0.files.is_empty() {
        inputs.push(l0);
    }
    inputs.extend(rest);
    inputs
}

/// Debug check that picked levels do not interleave in time: across the
/// plan's levels, the newest sequence number of an older level stays below
/// the oldest sequence number of the level above it. Bottommost files may
/// have had their seqnos forced to zero, which voids the comparison.
#[cfg(debug_assertions)]
fn validate_sequence_order(plan: &CompactionPlan) {
    let mut prev_smallest_seqno = 0u64;
    let mut is_first = true;
    let mut level_index = 0;
    if plan.start_level() == 0 {
        for f in &plan.inputs()[0].files {
            debug_assert!(f.smallest_seqno() <= f.largest_seqno());
            if is_first {
                is_first = false;
            }
            prev_smallest_seqno = f.smallest_seqno();
        }
        level_index = 1;
    }
    for li in &plan.inputs()[level_index..] {
        if li.files.is_empty() {
            continue;
        }
        let smallest_seqno = li.files.iter().map(|f| f.smallest_seqno()).min().unwrap();
        let largest_seqno = li.files.iter().map(|f| f.largest_seqno()).max().unwrap();
        if is_first {
            is_first = false;
        } else if prev_smallest_seqno > 0 {
            debug_assert!(prev_smallest_seqno > largest_seqno);
        }
        prev_smallest_seqno = smallest_seqno;
    }
}
