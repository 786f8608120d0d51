use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, warn};

use crate::paths::path_for_compaction_output;
use crate::picker_state::are_files_in_compaction;
use crate::plan::{CompactionPlan, CompactionReason, LevelInputs, PlanParams};
use crate::sorted_run::SortedRun;
use crate::table_cache::{sst_read_amp, MapSstElement};
use crate::types::{InternalKey, KeyRange};
use crate::universal::UniversalCompactionPicker;
use crate::version::{FileHandle, SstPurpose, VersionView};

struct FileUseInfo {
    size: u64,
    used: u64,
}

/// Map element keyed by the priority the essence-packing pass assigns it:
/// high fan-in first, then high wasted space.
struct PrioritizedElement {
    key: InternalKey,
    priority: f64,
}

impl PartialEq for PrioritizedElement {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PrioritizedElement {}

impl PartialOrd for PrioritizedElement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioritizedElement {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl UniversalCompactionPicker {
    /// Refactors Map/Link/Essence SSTs to bring the read amplification of
    /// map lookups back down. Works on the run with the worst recorded read
    /// amp, or rebuilds a whole level's map when the level has fragmented
    /// into several files.
    pub(crate) fn pick_composite(
        &self,
        version: &VersionView,
        sorted_runs: &[SortedRun],
    ) -> Option<CompactionPlan> {
        let cache = self.table_cache.as_ref()?;
        if !version.has_space_amplification() {
            return None;
        }

        // walk bottom-up for the target: a multi-file amplified level wins
        // outright, otherwise the single file with the largest read amp
        let mut input_level: Option<usize> = None;
        let mut input_files: Vec<Arc<FileHandle>> = Vec::new();
        let mut max_read_amp = 0usize;
        for sr in sorted_runs.iter().rev() {
            if sr.wait_reduce {
                continue;
            }
            let f = if sr.level > 0 {
                if !version.level_has_space_amplification(sr.level) {
                    continue;
                }
                let level_files = version.level_files(sr.level);
                if are_files_in_compaction(level_files) {
                    continue;
                }
                if level_files.len() > 1 {
                    input_level = Some(sr.level);
                    input_files.clear();
                    break;
                }
                level_files[0].clone()
            } else {
                let file = sr.file.clone().expect("level 0 run carries a file");
                if file.is_being_compacted() || file.purpose() != SstPurpose::Map {
                    continue;
                }
                file
            };
            if let Ok(props) = cache.table_properties(&f) {
                let read_amp = sst_read_amp(&props);
                if read_amp >= max_read_amp {
                    max_read_amp = read_amp;
                    input_level = Some(sr.level);
                    input_files = vec![f];
                }
            }
        }
        let input_level = input_level?;

        if input_files.is_empty() {
            // the level fragmented into several files: rebuild its map
            let files = version.level_files(input_level).to_vec();
            debug_assert!(files.len() > 1);
            return Some(self.build_composite_plan(
                version,
                input_level,
                files,
                Vec::new(),
                SstPurpose::Map,
                1,
            ));
        }

        let mut iter = match cache.map_element_iter(&input_files) {
            Ok(iter) => iter,
            Err(e) => {
                warn!("universal: failed to open map sst iterator: {}", e);
                return None;
            }
        };
        if let Err(e) = iter.status() {
            warn!("universal: read map sst error: {}", e);
            return None;
        }

        let is_perfect = |e: &MapSstElement| -> bool {
            if e.links.len() != 1 {
                return false;
            }
            let Some(f) = version.depend_files().get(&e.links[0].file_number) else {
                return false;
            };
            if f.purpose() != SstPurpose::Essence {
                return false;
            }
            e.include_smallest
                && e.include_largest
                && e.smallest_key == *f.smallest()
                && e.largest_key == *f.largest()
        };

        let file_largest_ukey = input_files[0].largest().user_key.clone();
        let max_subcompactions = self.settings.max_subcompactions.max(1);
        let mut input_range: Vec<KeyRange> = Vec::new();
        let mut range = KeyRange::default();

        // First pass: account per-file usage and collapse contiguous
        // high-fan-in elements whose links are dominated by one large file
        // into link rewrite ranges.
        let mut file_used: HashMap<u64, FileUseInfo> = HashMap::new();
        let mut has_start = false;
        iter.seek_to_first();
        while iter.valid() {
            let e = iter.element().clone();
            if is_perfect(&e) {
                iter.next();
                continue;
            }
            let mut sum = 0u64;
            let mut max = 0u64;
            for l in &e.links {
                sum += l.size;
                max = max.max(l.size);
                file_used
                    .entry(l.file_number)
                    .and_modify(|info| info.used += l.size)
                    .or_insert_with(|| FileUseInfo {
                        size: version.recursive_file_size_by_number(l.file_number),
                        used: l.size,
                    });
            }
            if e.links.len() > 2 && (sum - max) * 2 < max {
                if !has_start {
                    has_start = true;
                    range.start = e.smallest_key.user_key.clone();
                }
                range.limit = e.largest_key.user_key.clone();
            } else if has_start {
                has_start = false;
                if e.smallest_key.user_key != range.limit {
                    range.limit = e.smallest_key.user_key.clone();
                    range.include_start = true;
                    range.include_limit = false;
                    input_range.push(range.clone());
                    if input_range.len() >= max_subcompactions {
                        break;
                    }
                }
            }
            iter.next();
        }
        if let Err(e) = iter.status() {
            warn!("universal: read map sst error: {}", e);
            return None;
        }
        if has_start {
            range.include_start = true;
            set_include_limit(&mut range, &file_largest_ukey);
            input_range.push(range.clone());
        }
        if !input_range.is_empty() {
            drop(iter);
            return Some(self.build_composite_plan(
                version,
                input_level,
                input_files,
                input_range,
                SstPurpose::Link,
                max_subcompactions,
            ));
        }

        // Second pass: queue every element by fan-in plus wasted bytes and
        // greedily pack ranges around the worst offenders, up to twice the
        // target file size each.
        let mut priority_heap: BinaryHeap<PrioritizedElement> = BinaryHeap::new();
        iter.seek_to_first();
        while iter.valid() {
            let e = iter.element();
            let mut priority = e.links.len() as f64;
            let mut size = 0u64;
            let mut used = 0u64;
            let mut missing = false;
            for l in &e.links {
                match file_used.get(&l.file_number) {
                    Some(info) => {
                        size += info.size;
                        used += info.used;
                    }
                    None => {
                        missing = true;
                        break;
                    }
                }
            }
            if !missing && size > 0 {
                priority += 2.0 * (size - used.min(size)) as f64 / size as f64;
                priority_heap.push(PrioritizedElement {
                    key: e.largest_key.clone(),
                    priority,
                });
            }
            iter.next();
        }
        if let Err(e) = iter.status() {
            warn!("universal: read map sst error: {}", e);
            return None;
        }

        let max_file_size = self
            .settings
            .target_file_size(input_level.max(1))
            .saturating_mul(2);
        let mut unique_check: BTreeSet<InternalKey> = BTreeSet::new();
        while let Some(item) = priority_heap.pop() {
            iter.seek(&item.key);
            debug_assert!(iter.valid());
            if !iter.valid() {
                break;
            }
            if unique_check.contains(&iter.element().largest_key) {
                continue;
            }
            let mut e = iter.element().clone();
            range.start = e.smallest_key.user_key.clone();
            range.limit = e.largest_key.user_key.clone();
            range.include_start = true;
            range.include_limit = false;
            let mut sum = e.estimate_size();
            unique_check.insert(e.largest_key.clone());
            while sum < max_file_size {
                iter.next();
                if !iter.valid() {
                    set_include_limit(&mut range, &file_largest_ukey);
                    break;
                }
                e = iter.element().clone();
                if unique_check.contains(&e.largest_key)
                    || (is_perfect(&e) && e.smallest_key.user_key != range.limit)
                {
                    range.limit = e.smallest_key.user_key.clone();
                    break;
                }
                range.limit = e.largest_key.user_key.clone();
                sum += e.estimate_size();
                unique_check.insert(e.largest_key.clone());
            }
            if sum < max_file_size {
                iter.seek_for_prev(&item.key);
                loop {
                    iter.prev();
                    if !iter.valid() || unique_check.contains(&iter.element().largest_key) {
                        break;
                    }
                    let prev_e = iter.element().clone();
                    if is_perfect(&prev_e) {
                        break;
                    }
                    range.start = prev_e.smallest_key.user_key.clone();
                    sum += prev_e.estimate_size();
                    unique_check.insert(prev_e.largest_key.clone());
                    if sum >= max_file_size {
                        break;
                    }
                }
            }
            input_range.push(range.clone());
            if input_range.len() >= max_subcompactions {
                break;
            }
        }
        if !input_range.is_empty() {
            input_range.sort_by(|a, b| {
                a.limit
                    .cmp(&b.limit)
                    .then_with(|| a.include_limit.cmp(&b.include_limit))
                    .then_with(|| a.start.cmp(&b.start))
                    .then_with(|| b.include_start.cmp(&a.include_start))
            });
            drop(iter);
            return Some(self.build_composite_plan(
                version,
                input_level,
                input_files,
                input_range,
                SstPurpose::Essence,
                max_subcompactions,
            ));
        }

        // Third pass: no queue candidates left, join runs of consecutive
        // imperfect elements.
        has_start = false;
        iter.seek_to_first();
        while iter.valid() {
            let e = iter.element().clone();
            debug_assert_eq!(e.links.len(), 1);
            if has_start {
                if is_perfect(&e) && e.smallest_key.user_key != range.limit {
                    has_start = false;
                    range.limit = e.smallest_key.user_key.clone();
                    range.include_start = true;
                    range.include_limit = false;
                    input_range.push(range.clone());
                    if input_range.len() >= max_subcompactions {
                        break;
                    }
                } else {
                    range.limit = e.largest_key.user_key.clone();
                }
            } else if !is_perfect(&e) {
                has_start = true;
                range.start = e.smallest_key.user_key.clone();
                range.limit = e.largest_key.user_key.clone();
            }
            iter.next();
        }
        if let Err(e) = iter.status() {
            warn!("universal: read map sst error: {}", e);
            return None;
        }
        if has_start {
            range.include_start = true;
            set_include_limit(&mut range, &file_largest_ukey);
            input_range.push(range.clone());
        }
        drop(iter);
        if !input_range.is_empty() {
            return Some(self.build_composite_plan(
                version,
                input_level,
                input_files,
                input_range,
                SstPurpose::Essence,
                max_subcompactions,
            ));
        }

        if input_level != 0 {
            // nothing to split off; rewrite the whole map file
            return Some(self.build_composite_plan(
                version,
                input_level,
                input_files,
                Vec::new(),
                SstPurpose::Map,
                1,
            ));
        }
        None
    }

    fn build_composite_plan(
        &self,
        _version: &VersionView,
        level: usize,
        files: Vec<Arc<FileHandle>>,
        mut input_range: Vec<KeyRange>,
        purpose: SstPurpose,
        max_subcompactions: usize,
    ) -> CompactionPlan {
        normalize_ranges(&mut input_range);
        debug!(
            "universal: composite pick on level {} with {} ranges, purpose {:?}",
            level,
            input_range.len(),
            purpose
        );

        let estimated_total_size: u64 = files.iter().map(|f| f.size()).sum();
        let path_id = path_for_compaction_output(&self.settings, estimated_total_size);

        let mut params = PlanParams::new(CompactionReason::CompositeAmplification);
        params.inputs = vec![LevelInputs { level, files }];
        params.output_level = level;
        params.target_file_size = self.settings.target_file_size(level.max(1));
        params.output_path_id = path_id;
        params.compression = self.compression_for_output(true);
        params.compression_opts = self.settings.compression_opts;
        params.score = 0.0;
        params.purpose = purpose;
        params.partial_compaction = true;
        params.input_range = input_range;
        params.max_subcompactions = max_subcompactions;
        CompactionPlan::new(params)
    }
}

fn set_include_limit(range: &mut KeyRange, file_largest_ukey: &Bytes) {
    range.include_limit = true;
    debug_assert!(range.limit <= *file_largest_ukey);
    range.limit = file_largest_ukey.clone();
}

/// Absorbs adjacent ranges that share a start or a limit into their
/// predecessor and debug-checks the result is ascending and non-empty.
fn normalize_ranges(input_range: &mut Vec<KeyRange>) {
    if input_range.len() > 1 {
        let mut i = 1;
        while i < input_range.len() {
            if input_range[i].start == input_range[i - 1].start
                || input_range[i].limit == input_range[i - 1].limit
            {
                let removed = input_range.remove(i);
                input_range[i - 1].limit = removed.limit;
                input_range[i - 1].include_limit = removed.include_limit;
            } else {
                i += 1;
            }
        }
    }
    debug_assert!(input_range.windows(2).all(|w| w[0].start < w[1].start));
    debug_assert!(input_range.windows(2).all(|w| w[0].limit < w[1].limit));
    debug_assert!(input_range.iter().all(|r| r.start <= r.limit));
}
