use std::fmt::{Display, Formatter};
use std::sync::Arc;

use crate::config::CompactionSettings;
use crate::version::{FileHandle, VersionView};

/// One unit of universal compaction: a single level 0 file, or an entire
/// non-empty lower level. Runs are ordered newest first, level 0 files in
/// level 0 order, then levels 1, 2, ... down to the bottommost.
#[derive(Clone)]
pub(crate) struct SortedRun {
    pub(crate) level: usize,
    /// Set iff `level == 0`.
    pub(crate) file: Option<Arc<FileHandle>>,
    /// Total bytes, with Map/Link SSTs expanded through the depend map.
    pub(crate) size: u64,
    pub(crate) compensated_size: u64,
    pub(crate) being_compacted: bool,
    /// Set by the grouping ratio strategy on runs it intends to reduce, so
    /// the composite strategy leaves them alone within the same picker call.
    /// Never outlives the call.
    pub(crate) wait_reduce: bool,
}

impl Display for SortedRun {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "file {}", file.file_number()),
            None => write!(f, "level {}", self.level),
        }
    }
}

/// Summarizes a version snapshot into sorted runs.
///
/// For a non-zero level, compaction normally includes all of the level's
/// files, so `being_compacted` is uniform across the level; with trivial
/// moves enabled single files can be relabeled and the run counts as being
/// compacted if any of its files is.
pub(crate) fn calculate_sorted_runs(
    version: &VersionView,
    settings: &CompactionSettings,
) -> Vec<SortedRun> {
    let mut runs = Vec::new();
    for f in version.level_files(0) {
        runs.push(SortedRun {
            level: 0,
            file: Some(f.clone()),
            size: version.recursive_file_size(f),
            compensated_size: f.compensated_size(),
            being_compacted: f.is_being_compacted(),
            wait_reduce: false,
        });
    }
    for level in 1..version.num_levels() {
        let mut total_size = 0u64;
        let mut total_compensated_size = 0u64;
        let mut being_compacted = false;
        let mut is_first = true;
        for f in version.level_files(level) {
            total_size += version.recursive_file_size(f);
            total_compensated_size += f.compensated_size();
            if settings.universal.allow_trivial_move {
                being_compacted |= f.is_being_compacted();
            } else {
                debug_assert!(is_first || f.is_being_compacted() == being_compacted);
            }
            if is_first {
                being_compacted = f.is_being_compacted();
                is_first = false;
            }
        }
        if total_compensated_size > 0 {
            runs.push(SortedRun {
                level,
                file: None,
                size: total_size,
                compensated_size: total_compensated_size,
                being_compacted,
                wait_reduce: false,
            });
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{essence_file, map_file};
    use std::collections::HashMap;

    #[test]
    fn test_one_run_per_l0_file_and_per_nonempty_level() {
        // given:
        let l0: Vec<_> = (0..3)
            .map(|i| Arc::new(essence_file(i, "a", "z", 100)))
            .collect();
        let l2 = vec![
            Arc::new(essence_file(10, "a", "m", 50)),
            Arc::new(essence_file(11, "n", "z", 70)),
        ];
        let version = VersionView::new(
            vec![l0, vec![], l2, vec![]],
            HashMap::new(),
            &CompactionSettings::default(),
        );

        // when:
        let runs = calculate_sorted_runs(&version, &CompactionSettings::default());

        // then:
        assert_eq!(runs.len(), 4);
        assert!(runs[..3].iter().all(|r| r.level == 0 && r.file.is_some()));
        assert_eq!(runs[3].level, 2);
        assert!(runs[3].file.is_none());
        assert_eq!(runs[3].size, 120);
        assert_eq!(runs[3].compensated_size, 120);
    }

    #[test]
    fn test_l0_run_size_expands_map_dependencies() {
        // given: an l0 map file referencing two essence files
        let e1 = Arc::new(essence_file(1, "a", "c", 100));
        let e2 = Arc::new(essence_file(2, "d", "f", 200));
        let map = Arc::new(map_file(3, "a", "f", 10, vec![1, 2]));
        let depend = HashMap::from([(1, e1), (2, e2)]);
        let version = VersionView::new(
            vec![vec![map]],
            depend,
            &CompactionSettings::default(),
        );

        // when:
        let runs = calculate_sorted_runs(&version, &CompactionSettings::default());

        // then: size is recursive, compensated size is the file's own
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].size, 310);
        assert_eq!(runs[0].compensated_size, 10);
    }

    #[test]
    fn test_level_run_being_compacted_is_or_of_files_with_trivial_move() {
        // given:
        let f1 = Arc::new(essence_file(1, "a", "m", 50));
        let f2 = Arc::new(essence_file(2, "n", "z", 70));
        f2.set_being_compacted(true);
        let mut settings = CompactionSettings::default();
        settings.universal.allow_trivial_move = true;
        let version = VersionView::new(
            vec![vec![], vec![f1, f2]],
            HashMap::new(),
            &settings,
        );

        // when:
        let runs = calculate_sorted_runs(&version, &settings);

        // then:
        assert_eq!(runs.len(), 1);
        assert!(runs[0].being_compacted);
    }
}
