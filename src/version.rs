use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::warn;

use crate::config::CompactionSettings;
use crate::error::Error;
use crate::types::{InternalKey, SeqNo};

/// What an SST holds. `Essence` files hold data; `Map` files reference key
/// ranges that resolve to essence files; `Link` files are an intermediate
/// indirection produced while collapsing map fan-in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SstPurpose {
    #[default]
    Essence,
    Map,
    Link,
}

/// Metadata for one on-disk table file.
///
/// Handles are observer references owned by the enclosing version; the picker
/// never touches file data. `being_compacted` is the only mutable field and
/// is flipped exclusively by plan registration and completion, both of which
/// run under the caller's column family lock.
pub struct FileHandle {
    file_number: u64,
    path_id: u32,
    size: u64,
    compensated_size: u64,
    smallest: InternalKey,
    largest: InternalKey,
    smallest_seqno: SeqNo,
    largest_seqno: SeqNo,
    being_compacted: AtomicBool,
    marked_for_compaction: bool,
    purpose: SstPurpose,
    depend: Vec<u64>,
}

impl FileHandle {
    pub fn new(file_number: u64, smallest: InternalKey, largest: InternalKey, size: u64) -> Self {
        debug_assert!(smallest <= largest);
        let smallest_seqno = smallest.seq.min(largest.seq);
        let largest_seqno = smallest.seq.max(largest.seq);
        Self {
            file_number,
            path_id: 0,
            size,
            compensated_size: size,
            smallest,
            largest,
            smallest_seqno,
            largest_seqno,
            being_compacted: AtomicBool::new(false),
            marked_for_compaction: false,
            purpose: SstPurpose::Essence,
            depend: Vec::new(),
        }
    }

    pub fn with_compensated_size(mut self, compensated_size: u64) -> Self {
        debug_assert!(compensated_size >= self.size);
        self.compensated_size = compensated_size;
        self
    }

    pub fn with_seqnos(mut self, smallest_seqno: SeqNo, largest_seqno: SeqNo) -> Self {
        debug_assert!(smallest_seqno <= largest_seqno);
        self.smallest_seqno = smallest_seqno;
        self.largest_seqno = largest_seqno;
        self
    }

    pub fn with_path_id(mut self, path_id: u32) -> Self {
        self.path_id = path_id;
        self
    }

    pub fn with_purpose(mut self, purpose: SstPurpose, depend: Vec<u64>) -> Self {
        self.purpose = purpose;
        self.depend = depend;
        self
    }

    pub fn with_marked_for_compaction(mut self, marked: bool) -> Self {
        self.marked_for_compaction = marked;
        self
    }

    pub fn file_number(&self) -> u64 {
        self.file_number
    }

    pub fn path_id(&self) -> u32 {
        self.path_id
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn compensated_size(&self) -> u64 {
        self.compensated_size
    }

    pub fn smallest(&self) -> &InternalKey {
        &self.smallest
    }

    pub fn largest(&self) -> &InternalKey {
        &self.largest
    }

    pub fn smallest_seqno(&self) -> SeqNo {
        self.smallest_seqno
    }

    pub fn largest_seqno(&self) -> SeqNo {
        self.largest_seqno
    }

    pub fn is_being_compacted(&self) -> bool {
        self.being_compacted.load(Ordering::Acquire)
    }

    pub(crate) fn set_being_compacted(&self, value: bool) {
        self.being_compacted.store(value, Ordering::Release);
    }

    pub fn is_marked_for_compaction(&self) -> bool {
        self.marked_for_compaction
    }

    pub fn purpose(&self) -> SstPurpose {
        self.purpose
    }

    pub fn depend(&self) -> &[u64] {
        &self.depend
    }

    /// True iff this file's key range overlaps `[smallest, largest]`.
    pub(crate) fn overlaps(&self, smallest: &InternalKey, largest: &InternalKey) -> bool {
        self.largest >= *smallest && self.smallest <= *largest
    }
}

impl Clone for FileHandle {
    fn clone(&self) -> Self {
        Self {
            file_number: self.file_number,
            path_id: self.path_id,
            size: self.size,
            compensated_size: self.compensated_size,
            smallest: self.smallest.clone(),
            largest: self.largest.clone(),
            smallest_seqno: self.smallest_seqno,
            largest_seqno: self.largest_seqno,
            being_compacted: AtomicBool::new(self.is_being_compacted()),
            marked_for_compaction: self.marked_for_compaction,
            purpose: self.purpose,
            depend: self.depend.clone(),
        }
    }
}

impl Debug for FileHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "FileHandle({}, {:?}..{:?}, {}b, {:?})",
            self.file_number, self.smallest, self.largest, self.size, self.purpose
        ))
    }
}

/// Read-only facade over one version snapshot of a column family.
///
/// Level 0 files are ordered by descending recency (index 0 newest); files in
/// levels >= 1 are key-disjoint and ordered by key. The snapshot does not
/// change for the duration of a picker invocation.
pub struct VersionView {
    levels: Vec<Vec<Arc<FileHandle>>>,
    depend: HashMap<u64, Arc<FileHandle>>,
    space_amp: Vec<bool>,
    scores: Vec<f64>,
}

impl VersionView {
    pub fn new(
        levels: Vec<Vec<Arc<FileHandle>>>,
        depend: HashMap<u64, Arc<FileHandle>>,
        settings: &CompactionSettings,
    ) -> Self {
        debug_assert!(!levels.is_empty());
        #[cfg(debug_assertions)]
        for level in levels.iter().skip(1) {
            for pair in level.windows(2) {
                debug_assert!(pair[0].largest() < pair[1].smallest());
            }
        }
        let space_amp = levels
            .iter()
            .map(|files| files.iter().any(|f| f.purpose() != SstPurpose::Essence))
            .collect();
        let scores = vec![0.0; levels.len()];
        let mut view = Self {
            levels,
            depend,
            space_amp,
            scores,
        };
        view.compute_compaction_score(settings);
        view
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level_files(&self, level: usize) -> &[Arc<FileHandle>] {
        &self.levels[level]
    }

    pub fn num_level_files(&self, level: usize) -> usize {
        self.levels[level].len()
    }

    pub fn compaction_score(&self, level: usize) -> f64 {
        self.scores[level]
    }

    /// All files marked for compaction, walked level by level, level 0 first.
    pub fn files_marked_for_compaction(&self) -> Vec<(usize, Arc<FileHandle>)> {
        let mut marked = Vec::new();
        for (level, files) in self.levels.iter().enumerate() {
            for f in files {
                if f.is_marked_for_compaction() {
                    marked.push((level, f.clone()));
                }
            }
        }
        marked
    }

    /// True iff any level holds a Map or Link SST, which makes reads through
    /// that level cost more than one lookup.
    pub fn has_space_amplification(&self) -> bool {
        self.space_amp.iter().any(|amp| *amp)
    }

    pub fn level_has_space_amplification(&self, level: usize) -> bool {
        self.space_amp[level]
    }

    pub fn depend_files(&self) -> &HashMap<u64, Arc<FileHandle>> {
        &self.depend
    }

    /// Total bytes reachable from `file`: its own size plus, for Map/Link
    /// SSTs, the recursive size of every dependency. Dependencies are assumed
    /// acyclic; a missing entry or a revisited file is corrupt metadata and
    /// contributes nothing.
    pub fn recursive_file_size(&self, file: &Arc<FileHandle>) -> u64 {
        let mut visited = HashSet::new();
        self.recursive_size_inner(file, &mut visited)
    }

    /// As `recursive_file_size`, resolving the file through the depend map.
    pub(crate) fn recursive_file_size_by_number(&self, file_number: u64) -> u64 {
        match self.depend.get(&file_number) {
            Some(file) => self.recursive_file_size(file),
            None => {
                warn!("{}", Error::CorruptMetadata { file_number });
                0
            }
        }
    }

    fn recursive_size_inner(&self, file: &Arc<FileHandle>, visited: &mut HashSet<u64>) -> u64 {
        if !visited.insert(file.file_number()) {
            warn!(
                "{}",
                Error::CorruptMetadata {
                    file_number: file.file_number()
                }
            );
            return 0;
        }
        let mut size = file.size();
        if file.purpose() != SstPurpose::Essence {
            for &dep in file.depend() {
                match self.depend.get(&dep) {
                    Some(dep_file) => size += self.recursive_size_inner(dep_file, visited),
                    None => warn!("{}", Error::CorruptMetadata { file_number: dep }),
                }
            }
        }
        size
    }

    /// Recomputes the level 0 compaction score as the number of sorted runs
    /// not currently being compacted over the compaction trigger. Called by
    /// the picker after registering a plan so the next scheduling decision
    /// sees the version as if the plan were already running.
    pub fn compute_compaction_score(&mut self, settings: &CompactionSettings) {
        let mut num_runs = self.levels[0]
            .iter()
            .filter(|f| !f.is_being_compacted())
            .count();
        for files in self.levels.iter().skip(1) {
            if !files.is_empty() && !files.iter().any(|f| f.is_being_compacted()) {
                num_runs += 1;
            }
        }
        let trigger = settings.level0_file_num_compaction_trigger.max(1);
        self.scores[0] = num_runs as f64 / trigger as f64;
    }
}
