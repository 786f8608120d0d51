use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info};
use ulid::Ulid;

use crate::plan::{key_range_of_levels, CompactionPlan, LevelInputs};
use crate::version::{FileHandle, SstPurpose};

/// In-flight compaction registry for one column family.
///
/// Plans are registered when the picker accepts them and deregistered when
/// the scheduler reports completion. All mutation happens inside the picker
/// under the caller's exclusive lock; registration is what makes a plan's
/// files invisible to subsequent picks.
#[derive(Default)]
pub struct PickerState {
    compactions_in_progress: HashMap<Ulid, Arc<CompactionPlan>>,
    level0_compactions_in_progress: HashSet<Ulid>,
}

impl PickerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, plan: Arc<CompactionPlan>) {
        for file in plan.all_input_files() {
            debug_assert!(!file.is_being_compacted());
            file.set_being_compacted(true);
        }
        if plan.start_level() == 0 || plan.output_level() == 0 {
            self.level0_compactions_in_progress.insert(plan.id());
        }
        info!("registered compaction {}", plan);
        self.compactions_in_progress.insert(plan.id(), plan);
    }

    /// Completion callback from the scheduler. Releases the plan's files for
    /// future picks.
    pub fn deregister(&mut self, id: Ulid) -> Option<Arc<CompactionPlan>> {
        let plan = self.compactions_in_progress.remove(&id)?;
        self.level0_compactions_in_progress.remove(&id);
        for file in plan.all_input_files() {
            file.set_being_compacted(false);
        }
        debug!("deregistered compaction {}", plan);
        Some(plan)
    }

    pub fn in_progress(&self) -> impl Iterator<Item = &Arc<CompactionPlan>> {
        self.compactions_in_progress.values()
    }

    pub fn num_in_progress(&self) -> usize {
        self.compactions_in_progress.len()
    }

    pub(crate) fn has_level0_compaction(&self) -> bool {
        !self.level0_compactions_in_progress.is_empty()
    }

    pub(crate) fn has_map_compaction(&self) -> bool {
        self.compactions_in_progress
            .values()
            .any(|plan| plan.purpose() == SstPurpose::Map)
    }

    /// Whether any in-flight plan writes into `level`.
    pub(crate) fn is_output_level(&self, level: usize) -> bool {
        self.compactions_in_progress
            .values()
            .any(|plan| plan.output_level() == level)
    }

    /// Whether the candidate inputs' key range overlaps any in-flight plan
    /// writing to the same output level. Two plans producing overlapping
    /// ranges in one level would break the level's disjointness.
    pub(crate) fn files_range_overlap_with_compaction(
        &self,
        inputs: &[LevelInputs],
        output_level: usize,
    ) -> bool {
        let Some((smallest, largest)) = key_range_of_levels(inputs) else {
            return false;
        };
        for plan in self.compactions_in_progress.values() {
            if plan.output_level() != output_level {
                continue;
            }
            if let Some((plan_smallest, plan_largest)) = plan.key_range() {
                if smallest <= plan_largest && plan_smallest <= largest {
                    return true;
                }
            }
        }
        false
    }
}

/// Whether any of `files` is already claimed by an in-flight plan.
pub(crate) fn are_files_in_compaction(files: &[Arc<FileHandle>]) -> bool {
    files.iter().any(|f| f.is_being_compacted())
}
