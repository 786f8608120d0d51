use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::plan::CompactionPlan;
use crate::version::FileHandle;

/// One file front in the smallest-key heap, remembering where the file came
/// from so its level successor can be streamed in after it is popped.
struct InputFileFront {
    file: Arc<FileHandle>,
    level_idx: usize,
    index: usize,
}

impl PartialEq for InputFileFront {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for InputFileFront {}

impl PartialOrd for InputFileFront {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InputFileFront {
    fn cmp(&self, other: &Self) -> Ordering {
        self.file
            .smallest()
            .cmp(other.file.smallest())
            .then_with(|| self.level_idx.cmp(&other.level_idx))
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// Whether the plan's inputs can be combined without rewriting: true iff
/// walking every input file in ascending smallest-key order, each file
/// starts strictly after the previous one ends.
///
/// Level 0 inputs are heap-loaded up front since they may overlap each
/// other; for lower levels only the front file is loaded and each popped
/// file pushes its level successor.
pub(crate) fn is_input_files_non_overlapping(plan: &CompactionPlan) -> bool {
    let mut heap: BinaryHeap<Reverse<InputFileFront>> = BinaryHeap::new();
    for (level_idx, li) in plan.inputs().iter().enumerate() {
        if li.files.is_empty() {
            continue;
        }
        if li.level == 0 && plan.start_level() == 0 {
            for (index, file) in li.files.iter().enumerate() {
                heap.push(Reverse(InputFileFront {
                    file: file.clone(),
                    level_idx,
                    index,
                }));
            }
        } else {
            heap.push(Reverse(InputFileFront {
                file: li.files[0].clone(),
                level_idx,
                index: 0,
            }));
        }
    }
    if heap.len() <= 1 {
        return true;
    }

    let mut prev: Option<Arc<FileHandle>> = None;
    while let Some(Reverse(curr)) = heap.pop() {
        if let Some(prev_file) = &prev {
            if prev_file.largest() >= curr.file.smallest() {
                return false;
            }
            debug_assert!(curr.file.largest() > prev_file.largest());
        }
        prev = Some(curr.file.clone());

        let li = &plan.inputs()[curr.level_idx];
        if li.level != 0 && curr.index + 1 < li.files.len() {
            heap.push(Reverse(InputFileFront {
                file: li.files[curr.index + 1].clone(),
                level_idx: curr.level_idx,
                index: curr.index + 1,
            }));
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{CompactionReason, LevelInputs, PlanParams};
    use crate::test_utils::essence_file;

    fn plan_of(inputs: Vec<LevelInputs>) -> CompactionPlan {
        CompactionPlan::new(PlanParams {
            inputs,
            output_level: 6,
            ..PlanParams::new(CompactionReason::UniversalSizeRatio)
        })
    }

    #[test]
    fn test_disjoint_inputs_are_non_overlapping() {
        // given: l0 files disjoint in time and key space, plus a lower level
        let plan = plan_of(vec![
            LevelInputs {
                level: 0,
                files: vec![
                    Arc::new(essence_file(1, "g", "i", 10)),
                    Arc::new(essence_file(2, "d", "f", 10)),
                ],
            },
            LevelInputs {
                level: 5,
                files: vec![
                    Arc::new(essence_file(3, "a", "b", 10)),
                    Arc::new(essence_file(4, "c", "c", 10)),
                ],
            },
        ]);

        // then:
        assert!(is_input_files_non_overlapping(&plan));
    }

    #[test]
    fn test_overlapping_l0_files_are_detected() {
        // given: two l0 files sharing the key "e"
        let plan = plan_of(vec![LevelInputs {
            level: 0,
            files: vec![
                Arc::new(essence_file(1, "a", "e", 10)),
                Arc::new(essence_file(2, "e", "j", 10)),
            ],
        }]);

        // then:
        assert!(!is_input_files_non_overlapping(&plan));
    }

    #[test]
    fn test_cross_level_overlap_is_detected() {
        // given: the l0 file straddles the lower level's second file
        let plan = plan_of(vec![
            LevelInputs {
                level: 0,
                files: vec![Arc::new(essence_file(1, "c", "m", 10))],
            },
            LevelInputs {
                level: 5,
                files: vec![
                    Arc::new(essence_file(2, "a", "b", 10)),
                    Arc::new(essence_file(3, "d", "e", 10)),
                ],
            },
        ]);

        // then:
        assert!(!is_input_files_non_overlapping(&plan));
    }

    #[test]
    fn test_single_input_is_trivially_non_overlapping() {
        let plan = plan_of(vec![LevelInputs {
            level: 0,
            files: vec![Arc::new(essence_file(1, "a", "z", 10))],
        }]);
        assert!(is_input_files_non_overlapping(&plan));
    }
}
