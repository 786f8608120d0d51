use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, warn};

use crate::paths::path_for_compaction_output;
use crate::picker_state::are_files_in_compaction;
use crate::plan::{key_range_of_files, CompactionPlan, CompactionReason, LevelInputs, PlanParams};
use crate::table_cache::MapSstElement;
use crate::types::{InternalKey, KeyRange};
use crate::universal::UniversalCompactionPicker;
use crate::version::{FileHandle, SstPurpose, VersionView};

/// Which level a manual compaction reads from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompactRangeLevel {
    /// Compact every populated level down to the output level.
    AllLevels,
    Level(usize),
}

/// A user-requested compaction over a key range or whole levels.
#[derive(Clone, Debug)]
pub struct CompactRangeRequest {
    pub input_level: CompactRangeLevel,
    pub output_level: usize,
    pub output_path_id: u32,
    pub max_subcompactions: usize,
    pub begin: Option<InternalKey>,
    pub end: Option<InternalKey>,
    /// File numbers the user asked to rewrite; elements referencing them
    /// (directly or through one hop of links) are in scope.
    pub files_being_compact: HashSet<u64>,
}

/// Outcome of a manual compaction request. `manual_conflict` tells the
/// caller the request collided with in-flight work and should be retried
/// once that work completes.
#[derive(Default)]
pub struct CompactRangeOutcome {
    pub plan: Option<Arc<CompactionPlan>>,
    pub manual_conflict: bool,
}

impl CompactRangeOutcome {
    fn nothing() -> Self {
        Self::default()
    }

    fn conflict() -> Self {
        Self {
            plan: None,
            manual_conflict: true,
        }
    }

    fn of(plan: Arc<CompactionPlan>) -> Self {
        Self {
            plan: Some(plan),
            manual_conflict: false,
        }
    }
}

impl UniversalCompactionPicker {
    /// Plans a user-requested compaction, cooperating with in-flight work:
    /// any collision is reported through
    /// [`CompactRangeOutcome::manual_conflict`] rather than by waiting.
    pub fn compact_range(
        &mut self,
        version: &VersionView,
        request: &CompactRangeRequest,
    ) -> CompactRangeOutcome {
        let mut input_level = request.input_level;

        if self.settings.enable_lazy_compaction && input_level == CompactRangeLevel::AllLevels {
            // if only one level holds files the user cares about, narrow the
            // request down to that level
            let mut hit_count = 0;
            let mut hit_level = 0;
            for level in 0..version.num_levels() {
                if version
                    .level_files(level)
                    .iter()
                    .any(|f| self.hits_focused_file(version, f, &request.files_being_compact))
                {
                    hit_count += 1;
                    hit_level = level;
                }
            }
            if hit_count == 0 {
                return CompactRangeOutcome::nothing();
            }
            if hit_count == 1 {
                input_level = CompactRangeLevel::Level(hit_level);
            }
        }

        match input_level {
            CompactRangeLevel::AllLevels => self.compact_all_levels(version, request),
            CompactRangeLevel::Level(level) => {
                if self.settings.enable_lazy_compaction {
                    self.pick_range_compaction(version, level, request)
                } else {
                    self.pick_manual_level_compaction(version, level, request)
                }
            }
        }
    }

    fn hits_focused_file(
        &self,
        version: &VersionView,
        file: &Arc<FileHandle>,
        focused: &HashSet<u64>,
    ) -> bool {
        if focused.contains(&file.file_number()) {
            return true;
        }
        for dep in file.depend() {
            if focused.contains(dep) {
                return true;
            }
            match version.depend_files().get(dep) {
                None => {
                    warn!(
                        "{}",
                        crate::error::Error::CorruptMetadata { file_number: *dep }
                    );
                }
                Some(dep_file) => {
                    if dep_file.depend().iter().any(|d| focused.contains(d)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Universal all-levels manual compaction: everything from the first
    /// populated level merges down to the output level.
    fn compact_all_levels(
        &mut self,
        version: &VersionView,
        request: &CompactRangeRequest,
    ) -> CompactRangeOutcome {
        debug_assert!(version.num_levels() > 1);
        #[cfg(debug_assertions)]
        {
            let expected = if self.settings.allow_ingest_behind {
                version.num_levels() - 2
            } else {
                version.num_levels() - 1
            };
            debug_assert_eq!(request.output_level, expected);
        }
        // the caller widens an all-levels request to the full key range
        debug_assert!(request.begin.is_none() && request.end.is_none());

        let mut start_level = 0;
        while start_level < version.num_levels() && version.num_level_files(start_level) == 0 {
            start_level += 1;
        }
        if start_level == version.num_levels() {
            return CompactRangeOutcome::nothing();
        }
        if start_level == 0 && self.state.has_level0_compaction() {
            // only one level 0 compaction at a time
            return CompactRangeOutcome::conflict();
        }

        let mut inputs = Vec::new();
        for level in start_level..version.num_levels() {
            let files = version.level_files(level).to_vec();
            if are_files_in_compaction(&files) {
                return CompactRangeOutcome::conflict();
            }
            if !files.is_empty() {
                inputs.push(LevelInputs { level, files });
            }
        }

        // two non-exclusive manual compactions could otherwise produce
        // overlapping outputs in the same level
        if self
            .state
            .files_range_overlap_with_compaction(&inputs, request.output_level)
        {
            return CompactRangeOutcome::conflict();
        }

        let mut params = PlanParams::new(CompactionReason::ManualCompaction);
        params.inputs = inputs;
        params.output_level = request.output_level;
        params.target_file_size = self.settings.target_file_size(request.output_level);
        params.output_path_id = request.output_path_id;
        params.compression = self.compression_for_output(true);
        params.compression_opts = self.settings.compression_opts;
        params.manual_compaction = true;
        params.max_subcompactions = request.max_subcompactions;
        if self.settings.enable_lazy_compaction {
            params.max_subcompactions = 1;
            params.purpose = SstPurpose::Map;
        }
        let plan = Arc::new(CompactionPlan::new(params));
        self.state.register(plan.clone());
        CompactRangeOutcome::of(plan)
    }

    /// Non-lazy single-level manual compaction: the input level's files
    /// overlapping the requested range plus the overlapping output-level
    /// files.
    fn pick_manual_level_compaction(
        &mut self,
        version: &VersionView,
        level: usize,
        request: &CompactRangeRequest,
    ) -> CompactRangeOutcome {
        let in_request_range = |f: &&Arc<FileHandle>| {
            request
                .begin
                .as_ref()
                .map(|begin| f.largest() >= begin)
                .unwrap_or(true)
                && request
                    .end
                    .as_ref()
                    .map(|end| f.smallest() <= end)
                    .unwrap_or(true)
        };
        let files: Vec<Arc<FileHandle>> = version
            .level_files(level)
            .iter()
            .filter(in_request_range)
            .cloned()
            .collect();
        if files.is_empty() {
            return CompactRangeOutcome::nothing();
        }
        if are_files_in_compaction(&files) {
            return CompactRangeOutcome::conflict();
        }
        let mut inputs = vec![LevelInputs { level, files }];

        let output_level = request.output_level;
        debug_assert!(output_level >= level);
        if output_level != level {
            let Some((smallest, largest)) = key_range_of_files(inputs[0].files.iter()) else {
                return CompactRangeOutcome::nothing();
            };
            let output_files: Vec<Arc<FileHandle>> = version
                .level_files(output_level)
                .iter()
                .filter(|f| f.overlaps(&smallest, &largest))
                .cloned()
                .collect();
            if are_files_in_compaction(&output_files) {
                return CompactRangeOutcome::conflict();
            }
            if !output_files.is_empty() {
                inputs.push(LevelInputs {
                    level: output_level,
                    files: output_files,
                });
            }
        }
        if self
            .state
            .files_range_overlap_with_compaction(&inputs, output_level)
        {
            return CompactRangeOutcome::conflict();
        }

        let estimated_total_size: u64 = inputs
            .iter()
            .flat_map(|li| li.files.iter())
            .map(|f| f.size())
            .sum();
        let mut params = PlanParams::new(CompactionReason::ManualCompaction);
        params.inputs = inputs;
        params.output_level = output_level;
        params.target_file_size = self.settings.target_file_size(output_level);
        params.output_path_id =
            path_for_compaction_output(&self.settings, estimated_total_size);
        params.compression = self.compression_for_output(true);
        params.compression_opts = self.settings.compression_opts;
        params.manual_compaction = true;
        params.max_subcompactions = request.max_subcompactions;
        let plan = Arc::new(CompactionPlan::new(params));
        self.state.register(plan.clone());
        CompactRangeOutcome::of(plan)
    }

    /// Lazy single-level range compaction: sweeps the level's map elements
    /// and carves the ones referencing focused files into sub-compaction
    /// ranges bounded by `max_compaction_bytes`.
    fn pick_range_compaction(
        &mut self,
        version: &VersionView,
        level: usize,
        request: &CompactRangeRequest,
    ) -> CompactRangeOutcome {
        let level_files = version.level_files(level);
        if request.files_being_compact.is_empty() || level_files.is_empty() {
            return CompactRangeOutcome::nothing();
        }
        if are_files_in_compaction(level_files) {
            return CompactRangeOutcome::conflict();
        }
        let inputs = LevelInputs {
            level,
            files: level_files.to_vec(),
        };

        if level == 0 && level_files.len() > 1 {
            // overlapping level 0 files cannot be swept by range; rebuild
            // them into one map first
            let path_id = path_for_compaction_output(&self.settings, 1 << 20);
            let mut params = PlanParams::new(CompactionReason::ManualCompaction);
            params.inputs = vec![inputs];
            params.output_level = level;
            params.target_file_size = self.settings.target_file_size(level);
            params.output_path_id = path_id;
            params.compression = self.compression_for_output(true);
            params.compression_opts = self.settings.compression_opts;
            params.purpose = SstPurpose::Map;
            params.manual_compaction = true;
            params.max_subcompactions = request.max_subcompactions;
            let plan = Arc::new(CompactionPlan::new(params));
            self.state.register(plan.clone());
            return CompactRangeOutcome::of(plan);
        }

        let Some(cache) = self.table_cache.as_ref() else {
            debug!("universal: no table cache, cannot sweep map elements");
            return CompactRangeOutcome::nothing();
        };
        let mut iter = match cache.map_element_iter(level_files) {
            Ok(iter) => iter,
            Err(e) => {
                warn!("universal: failed to open level iterator: {}", e);
                return CompactRangeOutcome::nothing();
            }
        };
        if let Err(e) = iter.status() {
            warn!("universal: read level files error: {}", e);
            return CompactRangeOutcome::nothing();
        }

        let need_compact = |e: &MapSstElement| -> bool {
            if let Some(begin) = &request.begin {
                if e.largest_key < *begin {
                    return false;
                }
            }
            if let Some(end) = &request.end {
                if e.smallest_key > *end {
                    return false;
                }
            }
            for link in &e.links {
                if request.files_being_compact.contains(&link.file_number) {
                    return true;
                }
                match version.depend_files().get(&link.file_number) {
                    None => {
                        warn!(
                            "{}",
                            crate::error::Error::CorruptMetadata {
                                file_number: link.file_number
                            }
                        );
                    }
                    Some(f) => {
                        if f.depend()
                            .iter()
                            .any(|d| request.files_being_compact.contains(d))
                        {
                            return true;
                        }
                    }
                }
            }
            false
        };

        let max_compaction_bytes = self.settings.max_compaction_bytes;
        let max_subcompactions = self.settings.max_subcompactions.max(1);
        let mut input_range: Vec<KeyRange> = Vec::new();
        let mut range = KeyRange::default();
        let mut has_start = false;
        let mut subcompact_size = 0u64;
        let mut estimated_total_size = 0u64;

        iter.seek_to_first();
        while iter.valid() {
            let e = iter.element().clone();
            if has_start {
                if need_compact(&e) {
                    if subcompact_size < max_compaction_bytes {
                        subcompact_size += e.estimate_size();
                        range.limit = e.largest_key.user_key.clone();
                    } else {
                        range.limit = e.smallest_key.user_key.clone();
                        range.include_start = true;
                        range.include_limit = false;
                        estimated_total_size += subcompact_size;
                        input_range.push(range.clone());
                        if input_range.len() >= max_subcompactions {
                            has_start = false;
                            break;
                        }
                        subcompact_size += e.estimate_size();
                        range.start = e.smallest_key.user_key.clone();
                        range.limit = e.largest_key.user_key.clone();
                    }
                } else {
                    has_start = false;
                    range.limit = e.smallest_key.user_key.clone();
                    range.include_start = true;
                    range.include_limit = false;
                    estimated_total_size += subcompact_size;
                    input_range.push(range.clone());
                    if input_range.len() >= max_subcompactions {
                        break;
                    }
                    subcompact_size = 0;
                }
            } else if need_compact(&e) {
                subcompact_size += e.estimate_size();
                has_start = true;
                range.start = e.smallest_key.user_key.clone();
                range.limit = e.largest_key.user_key.clone();
            }
            iter.next();
        }
        if let Err(e) = iter.status() {
            warn!("universal: read level files error: {}", e);
            return CompactRangeOutcome::nothing();
        }
        drop(iter);
        if has_start {
            // the terminal range runs to the end of the level
            range.include_start = true;
            range.include_limit = true;
            let end_key = if level == 0 {
                inputs
                    .files
                    .iter()
                    .map(|f| f.largest().clone())
                    .max()
                    .expect("level files are non-empty")
            } else {
                inputs
                    .files
                    .last()
                    .expect("level files are non-empty")
                    .largest()
                    .clone()
            };
            debug_assert!(range.limit <= end_key.user_key);
            range.limit = end_key.user_key;
            estimated_total_size += subcompact_size;
            input_range.push(range.clone());
        }
        if input_range.is_empty() {
            return CompactRangeOutcome::nothing();
        }

        let path_id = path_for_compaction_output(&self.settings, estimated_total_size);
        let mut params = PlanParams::new(CompactionReason::ManualCompaction);
        params.inputs = vec![inputs];
        params.output_level = level;
        params.target_file_size = self.settings.target_file_size(level.max(1));
        params.output_path_id = path_id;
        params.compression = self.compression_for_output(true);
        params.compression_opts = self.settings.compression_opts;
        params.input_range = input_range;
        params.partial_compaction = true;
        params.manual_compaction = true;
        params.max_subcompactions = request.max_subcompactions;
        let plan = Arc::new(CompactionPlan::new(params));
        self.state.register(plan.clone());
        CompactRangeOutcome::of(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompactionSettings;
    use crate::test_utils::{
        essence_file, ikey, map_element, map_file, version_of, StaticTableCache,
    };
    use std::collections::HashMap;

    fn all_levels_request(num_levels: usize) -> CompactRangeRequest {
        CompactRangeRequest {
            input_level: CompactRangeLevel::AllLevels,
            output_level: num_levels - 1,
            output_path_id: 0,
            max_subcompactions: 4,
            begin: None,
            end: None,
            files_being_compact: HashSet::new(),
        }
    }

    #[test]
    fn test_all_levels_compacts_everything_to_the_bottom() {
        // given: files on l0 and level 4
        let settings = CompactionSettings::default();
        let mut levels = vec![vec![essence_file(3, "a", "f", 100)]];
        levels.extend((1..4).map(|_| vec![]));
        levels.push(vec![
            essence_file(1, "a", "c", 100),
            essence_file(2, "d", "j", 100),
        ]);
        levels.extend((5..7).map(|_| vec![]));
        let version = version_of(levels, HashMap::new(), &settings);
        let mut picker = UniversalCompactionPicker::new(settings, None);

        // when:
        let outcome = picker.compact_range(&version, &all_levels_request(7));

        // then:
        let plan = outcome.plan.expect("expected a manual plan");
        assert!(!outcome.manual_conflict);
        assert_eq!(plan.reason(), CompactionReason::ManualCompaction);
        assert_eq!(plan.output_level(), 6);
        assert_eq!(plan.inputs().len(), 2);
        assert_eq!(plan.inputs()[0].level, 0);
        assert_eq!(plan.inputs()[1].level, 4);
        assert!(plan.is_manual_compaction());
        assert_eq!(picker.state().num_in_progress(), 1);
    }

    #[test]
    fn test_all_levels_conflicts_with_running_l0_compaction() {
        // given: an l0 compaction already in flight
        let settings = CompactionSettings::default();
        let mut levels = vec![vec![
            essence_file(3, "a", "f", 100),
            essence_file(2, "g", "j", 100),
        ]];
        levels.extend((1..7).map(|_| vec![]));
        let version = version_of(levels, HashMap::new(), &settings);
        let mut picker = UniversalCompactionPicker::new(settings, None);

        let running = Arc::new(CompactionPlan::new({
            let mut params = PlanParams::new(CompactionReason::UniversalSizeRatio);
            params.inputs = vec![LevelInputs {
                level: 0,
                files: vec![version.level_files(0)[0].clone()],
            }];
            params.output_level = 6;
            params
        }));
        picker.state_mut().register(running);

        // when:
        let outcome = picker.compact_range(&version, &all_levels_request(7));

        // then:
        assert!(outcome.plan.is_none());
        assert!(outcome.manual_conflict);
    }

    #[test]
    fn test_all_levels_on_empty_version_is_a_noop() {
        let settings = CompactionSettings::default();
        let version = version_of(vec![vec![]; 7], HashMap::new(), &settings);
        let mut picker = UniversalCompactionPicker::new(settings, None);

        let outcome = picker.compact_range(&version, &all_levels_request(7));

        assert!(outcome.plan.is_none());
        assert!(!outcome.manual_conflict);
    }

    #[test]
    fn test_lazy_all_levels_narrows_to_the_single_hit_level() {
        // given: lazy mode, the focused file only referenced from level 3
        let mut settings = CompactionSettings::default();
        settings.enable_lazy_compaction = true;
        let map = map_file(20, "a", "j", 50, vec![11]);
        let depend: HashMap<_, _> = [(11, Arc::new(essence_file(11, "a", "j", 100)))].into();
        let mut levels = vec![vec![]; 3];
        levels.push(vec![map]);
        levels.extend((4..7).map(|_| vec![]));
        let version = version_of(levels, depend, &settings);
        let elements = vec![map_element("a", "j", 5, vec![(11, 100)])];
        let cache = Arc::new(StaticTableCache::default().with_elements(20, elements));
        let mut picker = UniversalCompactionPicker::new(settings, Some(cache));

        let mut request = all_levels_request(7);
        request.files_being_compact = HashSet::from([11]);

        // when:
        let outcome = picker.compact_range(&version, &request);

        // then: the request narrowed to level 3 and swept its map elements
        let plan = outcome.plan.expect("expected a ranged plan");
        assert_eq!(plan.inputs().len(), 1);
        assert_eq!(plan.inputs()[0].level, 3);
        assert!(plan.is_partial_compaction());
        assert_eq!(plan.input_range().len(), 1);
        assert!(plan.input_range()[0].include_limit);
        assert_eq!(plan.input_range()[0].limit.as_ref(), b"j");
    }

    #[test]
    fn test_lazy_range_sweep_splits_on_unfocused_elements() {
        // given: three elements, the middle one untouched by the request
        let mut settings = CompactionSettings::default();
        settings.enable_lazy_compaction = true;
        settings.max_subcompactions = 4;
        let map = map_file(20, "a", "r", 50, vec![11, 12]);
        let depend: HashMap<_, _> = [
            (11, Arc::new(essence_file(11, "a", "f", 100))),
            (12, Arc::new(essence_file(12, "g", "r", 100))),
        ]
        .into();
        let mut levels = vec![vec![]; 3];
        levels.push(vec![map]);
        levels.extend((4..7).map(|_| vec![]));
        let version = version_of(levels, depend, &settings);
        let elements = vec![
            map_element("a", "c", 5, vec![(11, 50)]),
            map_element("d", "f", 5, vec![(12, 50)]),
            map_element("g", "r", 5, vec![(11, 50)]),
        ];
        let cache = Arc::new(StaticTableCache::default().with_elements(20, elements));
        let mut picker = UniversalCompactionPicker::new(settings, Some(cache));

        let request = CompactRangeRequest {
            input_level: CompactRangeLevel::Level(3),
            output_level: 3,
            output_path_id: 0,
            max_subcompactions: 4,
            begin: None,
            end: None,
            files_being_compact: HashSet::from([11]),
        };

        // when:
        let outcome = picker.compact_range(&version, &request);

        // then: two ranges split around the unfocused element
        let plan = outcome.plan.expect("expected a ranged plan");
        assert_eq!(plan.input_range().len(), 2);
        assert_eq!(plan.input_range()[0].start.as_ref(), b"a");
        assert_eq!(plan.input_range()[0].limit.as_ref(), b"d");
        assert!(!plan.input_range()[0].include_limit);
        assert_eq!(plan.input_range()[1].start.as_ref(), b"g");
        assert_eq!(plan.input_range()[1].limit.as_ref(), b"r");
        assert!(plan.input_range()[1].include_limit);
    }

    #[test]
    fn test_lazy_range_respects_begin_and_end() {
        // given: the request only covers keys up to "f"
        let mut settings = CompactionSettings::default();
        settings.enable_lazy_compaction = true;
        let map = map_file(20, "a", "r", 50, vec![11]);
        let depend: HashMap<_, _> = [(11, Arc::new(essence_file(11, "a", "r", 100)))].into();
        let mut levels = vec![vec![]; 3];
        levels.push(vec![map]);
        levels.extend((4..7).map(|_| vec![]));
        let version = version_of(levels, depend, &settings);
        let elements = vec![
            map_element("a", "c", 5, vec![(11, 50)]),
            map_element("m", "r", 5, vec![(11, 50)]),
        ];
        let cache = Arc::new(StaticTableCache::default().with_elements(20, elements));
        let mut picker = UniversalCompactionPicker::new(settings, Some(cache));

        let request = CompactRangeRequest {
            input_level: CompactRangeLevel::Level(3),
            output_level: 3,
            output_path_id: 0,
            max_subcompactions: 4,
            begin: None,
            end: Some(ikey("f", u64::MAX)),
            files_being_compact: HashSet::from([11]),
        };

        // when:
        let outcome = picker.compact_range(&version, &request);

        // then: only the first element is in scope; its range closes at the
        // second element's start
        let plan = outcome.plan.expect("expected a ranged plan");
        assert_eq!(plan.input_range().len(), 1);
        assert_eq!(plan.input_range()[0].start.as_ref(), b"a");
        assert_eq!(plan.input_range()[0].limit.as_ref(), b"m");
        assert!(!plan.input_range()[0].include_limit);
    }

    #[test]
    fn test_lazy_multi_file_l0_rebuilds_a_map() {
        // given: two overlapping l0 files under lazy compaction
        let mut settings = CompactionSettings::default();
        settings.enable_lazy_compaction = true;
        let mut levels = vec![vec![
            essence_file(3, "a", "m", 100),
            essence_file(2, "d", "z", 100),
        ]];
        levels.extend((1..7).map(|_| vec![]));
        let version = version_of(levels, HashMap::new(), &settings);
        let mut picker = UniversalCompactionPicker::new(settings, None);

        let request = CompactRangeRequest {
            input_level: CompactRangeLevel::Level(0),
            output_level: 0,
            output_path_id: 0,
            max_subcompactions: 4,
            begin: None,
            end: None,
            files_being_compact: HashSet::from([2]),
        };

        // when:
        let outcome = picker.compact_range(&version, &request);

        // then:
        let plan = outcome.plan.expect("expected an l0 map rebuild");
        assert_eq!(plan.purpose(), SstPurpose::Map);
        assert_eq!(plan.output_level(), 0);
        assert_eq!(plan.num_input_files(), 2);
    }

    #[test]
    fn test_manual_level_compaction_takes_overlapping_output_files() {
        // given: non-lazy, level 2 down to level 4
        let settings = CompactionSettings::default();
        let mut levels = vec![vec![]; 2];
        levels.push(vec![essence_file(3, "d", "j", 100)]);
        levels.push(vec![]);
        levels.push(vec![
            essence_file(1, "a", "e", 100),
            essence_file(2, "f", "p", 100),
        ]);
        levels.extend((5..7).map(|_| vec![]));
        let version = version_of(levels, HashMap::new(), &settings);
        let mut picker = UniversalCompactionPicker::new(settings, None);

        let request = CompactRangeRequest {
            input_level: CompactRangeLevel::Level(2),
            output_level: 4,
            output_path_id: 0,
            max_subcompactions: 1,
            begin: Some(ikey("a", u64::MAX)),
            end: Some(ikey("z", 0)),
            files_being_compact: HashSet::new(),
        };

        // when:
        let outcome = picker.compact_range(&version, &request);

        // then:
        let plan = outcome.plan.expect("expected a manual plan");
        assert_eq!(plan.inputs().len(), 2);
        assert_eq!(plan.inputs()[0].level, 2);
        assert_eq!(plan.inputs()[1].level, 4);
        assert_eq!(plan.inputs()[1].files.len(), 2);
        assert_eq!(plan.output_level(), 4);
    }

    #[test]
    fn test_manual_level_compaction_conflicts_with_busy_files() {
        // given: the input file is already being compacted
        let settings = CompactionSettings::default();
        let mut levels = vec![vec![]; 2];
        levels.push(vec![essence_file(1, "d", "j", 100)]);
        levels.extend((3..7).map(|_| vec![]));
        let version = version_of(levels, HashMap::new(), &settings);
        version.level_files(2)[0].set_being_compacted(true);
        let mut picker = UniversalCompactionPicker::new(settings, None);

        let request = CompactRangeRequest {
            input_level: CompactRangeLevel::Level(2),
            output_level: 6,
            output_path_id: 0,
            max_subcompactions: 1,
            begin: None,
            end: None,
            files_being_compact: HashSet::new(),
        };

        // when:
        let outcome = picker.compact_range(&version, &request);

        // then:
        assert!(outcome.plan.is_none());
        assert!(outcome.manual_conflict);
    }
}
