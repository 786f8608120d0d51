use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Error;
use crate::types::InternalKey;
use crate::version::FileHandle;

/// User-collected property naming the read amplification of a Map/Link SST:
/// how many lookups it takes to resolve one key through the file.
pub const SST_READ_AMP_PROPERTY: &str = "terndb.sst-read-amp";

/// Table properties collected when an SST was written. Only the
/// user-collected map matters to the picker.
#[derive(Clone, Debug, Default)]
pub struct TableProperties {
    pub user_collected: HashMap<String, String>,
}

/// Read amplification recorded in `props`, defaulting to 1 (a plain lookup)
/// when the property is absent or unparsable.
pub fn sst_read_amp(props: &TableProperties) -> usize {
    props
        .user_collected
        .get(SST_READ_AMP_PROPERTY)
        .and_then(|v| v.parse().ok())
        .unwrap_or(1)
}

/// One link stored in a map element: a referenced file and how many bytes of
/// it the element actually uses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapLink {
    pub file_number: u64,
    pub size: u64,
}

/// One decoded entry of a Map SST: a logical key range resolving to a list
/// of links into underlying files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapSstElement {
    pub smallest_key: InternalKey,
    pub largest_key: InternalKey,
    pub include_smallest: bool,
    pub include_largest: bool,
    pub links: Vec<MapLink>,
}

impl MapSstElement {
    /// Bytes this element resolves to, summed over its links.
    pub fn estimate_size(&self) -> u64 {
        self.links.iter().map(|l| l.size).sum()
    }
}

/// Cursor over the elements of one Map SST or of a whole level of them,
/// ordered by `largest_key`. Elements decode lazily; a decode failure
/// surfaces through `status()` and ends iteration.
///
/// The iterator may block on I/O through the table cache. It is released on
/// every exit path before a plan is returned.
pub trait MapElementIter {
    fn seek_to_first(&mut self);

    /// Positions at the first element whose `largest_key` is not below `key`.
    fn seek(&mut self, key: &InternalKey);

    /// Positions at the last element whose `largest_key` is not above `key`.
    fn seek_for_prev(&mut self, key: &InternalKey);

    fn next(&mut self);

    fn prev(&mut self);

    fn valid(&self) -> bool;

    /// The element under the cursor. Only callable while `valid()`.
    fn element(&self) -> &MapSstElement;

    fn status(&self) -> Result<(), Error>;
}

/// The picker's window onto table metadata. Implementations may block on
/// I/O; both methods are treated as synchronous calls under the caller's
/// lock.
pub trait TableCache {
    fn table_properties(&self, file: &FileHandle) -> Result<Arc<TableProperties>, Error>;

    /// Opens a map element cursor over `files`: a single Map SST or the
    /// ordered files of one level.
    fn map_element_iter(
        &self,
        files: &[Arc<FileHandle>],
    ) -> Result<Box<dyn MapElementIter + '_>, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_amp_defaults_to_one() {
        let props = TableProperties::default();
        assert_eq!(sst_read_amp(&props), 1);

        let mut props = TableProperties::default();
        props
            .user_collected
            .insert(SST_READ_AMP_PROPERTY.to_string(), "broken".to_string());
        assert_eq!(sst_read_amp(&props), 1);
    }

    #[test]
    fn test_read_amp_parses_recorded_property() {
        let mut props = TableProperties::default();
        props
            .user_collected
            .insert(SST_READ_AMP_PROPERTY.to_string(), "5".to_string());
        assert_eq!(sst_read_amp(&props), 5);
    }
}
