use crate::config::CompactionSettings;

/// Picks the storage path a compaction output should land on.
///
/// Two conditions must hold for a path: it can fit the file, and the space
/// left in it and the paths before it can still hold the projected future
/// file this output will grow into once more runs accumulate and compact
/// with it. The projection follows the configured size ratio: compacting
/// runs of sizes (1, 1, 2, 4, 8) yields ~16, and eventually (1, 1, 2, 4, 8,
/// 16) must all fit in or before the chosen path.
pub(crate) fn path_for_compaction_output(settings: &CompactionSettings, file_size: u64) -> u32 {
    let paths = &settings.paths;
    if paths.len() <= 1 {
        return 0;
    }
    let size_ratio = u64::from(settings.universal.size_ratio);
    let future_size = file_size * (100u64.saturating_sub(size_ratio)) / 100;
    let mut accumulated_size = 0u64;
    let mut p = 0u32;
    while (p as usize) < paths.len() - 1 {
        let target_size = paths[p as usize].target_size;
        if target_size > file_size && accumulated_size + (target_size - file_size) > future_size {
            return p;
        }
        accumulated_size += target_size;
        p += 1;
    }
    p
}
