use crate::picker_state::are_files_in_compaction;
use crate::plan::{CompactionPlan, CompactionReason, LevelInputs, PlanParams};
use crate::universal::UniversalCompactionPicker;
use crate::version::VersionView;

impl UniversalCompactionPicker {
    /// Relabels files downward without rewriting them: finds the lowest
    /// empty level that no in-flight plan writes to, then the next non-empty
    /// unconflicted level above it. A lower level moves wholesale; level 0
    /// contributes only its oldest file, which is the only one guaranteed
    /// not to overlap anything below.
    pub(crate) fn pick_trivial_move(&self, version: &VersionView) -> Option<CompactionPlan> {
        if !self.settings.universal.allow_trivial_move {
            return None;
        }
        if version.num_levels() < 2 {
            return None;
        }
        let mut output_level = version.num_levels() as isize - 1;
        // bottommost level is reserved for files ingested behind
        if self.settings.allow_ingest_behind {
            output_level -= 1;
        }
        let mut start_level;
        loop {
            // find an empty level nobody is writing to
            while output_level >= 1 {
                if version.level_files(output_level as usize).is_empty()
                    && !self.state.is_output_level(output_level as usize)
                {
                    break;
                }
                output_level -= 1;
            }
            if output_level < 1 {
                return None;
            }
            // then a non-empty level above it
            let mut found_start_level = false;
            start_level = output_level - 1;
            while start_level > 0 {
                if self.state.is_output_level(start_level as usize) {
                    break;
                }
                if !version.level_files(start_level as usize).is_empty() {
                    found_start_level = true;
                    break;
                }
                start_level -= 1;
            }
            if start_level == 0 {
                // move the oldest level 0 file
                break;
            }
            if found_start_level
                && !are_files_in_compaction(version.level_files(start_level as usize))
            {
                break;
            }
            output_level = start_level - 1;
        }

        let (files, path_id) = if start_level == 0 {
            let level0_files = version.level_files(0);
            let oldest = level0_files.last()?;
            if oldest.is_being_compacted() {
                return None;
            }
            (vec![oldest.clone()], oldest.path_id())
        } else {
            let files = version.level_files(start_level as usize).to_vec();
            let path_id = files[0].path_id();
            (files, path_id)
        };
        debug_assert!(!are_files_in_compaction(&files));

        let mut params = PlanParams::new(CompactionReason::TrivialMoveLevel);
        params.inputs = vec![LevelInputs {
            level: start_level as usize,
            files,
        }];
        params.output_level = output_level as usize;
        params.output_path_id = path_id;
        params.compression_opts = self.settings.compression_opts;
        Some(CompactionPlan::new(params))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::CompactionSettings;
    use crate::plan::CompactionReason;
    use crate::test_utils::{essence_file, version_of};
    use crate::universal::UniversalCompactionPicker;
    use std::collections::HashMap;

    fn settings() -> CompactionSettings {
        let mut settings = CompactionSettings::default();
        settings.universal.allow_trivial_move = true;
        settings.enable_lazy_compaction = true;
        settings.level0_file_num_compaction_trigger = 2;
        settings
    }

    #[test]
    fn test_oldest_l0_file_moves_to_the_lowest_free_level() {
        // given: one l0 file, levels 1..5 empty, level 6 occupied
        let settings = settings();
        let mut levels = vec![vec![essence_file(5, "a", "c", 100)]];
        levels.extend((1..6).map(|_| vec![]));
        levels.push(vec![essence_file(1, "x", "z", 100)]);
        let mut version = version_of(levels, HashMap::new(), &settings);
        let mut picker = UniversalCompactionPicker::new(settings, None);

        // when:
        let plan = picker
            .pick_compaction(&mut version)
            .expect("expected a trivial move");

        // then: the file lands on level 5, relabeled rather than rewritten
        assert_eq!(plan.reason(), CompactionReason::TrivialMoveLevel);
        assert_eq!(plan.inputs()[0].level, 0);
        assert_eq!(plan.output_level(), 5);
        assert!(plan.is_trivial_move());
    }

    #[test]
    fn test_whole_level_moves_when_below_it_is_empty() {
        // given: level 2 occupied, levels 3..6 empty
        let settings = settings();
        let picker_settings = settings.clone();
        let mut levels = vec![vec![]; 2];
        levels.push(vec![
            essence_file(3, "a", "c", 100),
            essence_file(4, "d", "f", 100),
        ]);
        levels.extend((3..7).map(|_| vec![]));
        let version = version_of(levels, HashMap::new(), &settings);
        let picker = UniversalCompactionPicker::new(picker_settings, None);

        // when:
        let plan = picker
            .pick_trivial_move(&version)
            .expect("expected a trivial move");

        // then: the whole level drops to the bottom
        assert_eq!(plan.inputs()[0].level, 2);
        assert_eq!(plan.inputs()[0].files.len(), 2);
        assert_eq!(plan.output_level(), 6);
    }

    #[test]
    fn test_declines_without_an_eligible_pair() {
        // given: every level occupied
        let settings = settings();
        let levels = vec![
            vec![essence_file(4, "a", "c", 100)],
            vec![essence_file(3, "a", "c", 100)],
            vec![essence_file(2, "a", "c", 100)],
            vec![essence_file(1, "a", "c", 100)],
        ];
        let version = version_of(levels, HashMap::new(), &settings);
        let picker = UniversalCompactionPicker::new(settings, None);

        // then:
        assert!(picker.pick_trivial_move(&version).is_none());
    }

    #[test]
    fn test_declines_when_disabled() {
        let mut settings = settings();
        settings.universal.allow_trivial_move = false;
        let mut levels = vec![vec![essence_file(5, "a", "c", 100)]];
        levels.extend((1..7).map(|_| vec![]));
        let version = version_of(levels, HashMap::new(), &settings);
        let picker = UniversalCompactionPicker::new(settings, None);

        assert!(picker.pick_trivial_move(&version).is_none());
    }

    #[test]
    fn test_skips_levels_claimed_by_inflight_output() {
        // given: level 2 occupied, an in-flight plan writing into level 6
        let settings = settings();
        let mut levels = vec![vec![]; 2];
        levels.push(vec![essence_file(3, "a", "c", 100)]);
        levels.extend((3..7).map(|_| vec![]));
        let version = version_of(levels, HashMap::new(), &settings);
        let mut picker = UniversalCompactionPicker::new(settings, None);

        let claim = crate::plan::CompactionPlan::new({
            let mut params =
                crate::plan::PlanParams::new(CompactionReason::ManualCompaction);
            params.inputs = vec![crate::plan::LevelInputs {
                level: 5,
                files: vec![std::sync::Arc::new(essence_file(9, "m", "n", 10))],
            }];
            params.output_level = 6;
            params
        });
        picker.state_mut().register(std::sync::Arc::new(claim));

        // when:
        let plan = picker
            .pick_trivial_move(&version)
            .expect("expected a trivial move");

        // then: level 6 is skipped and the move lands on level 5
        assert_eq!(plan.output_level(), 5);
        assert_eq!(plan.inputs()[0].level, 2);
    }
}
