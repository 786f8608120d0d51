use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::CompactionSettings;
use crate::error::Error;
use crate::version::VersionView;
use crate::table_cache::{
    MapElementIter, MapLink, MapSstElement, TableCache, TableProperties, SST_READ_AMP_PROPERTY,
};
use crate::types::InternalKey;
use crate::version::{FileHandle, SstPurpose};

pub(crate) fn ikey(user_key: &str, seq: u64) -> InternalKey {
    InternalKey::new(Bytes::copy_from_slice(user_key.as_bytes()), seq)
}

pub(crate) fn version_of(
    levels: Vec<Vec<FileHandle>>,
    depend: HashMap<u64, Arc<FileHandle>>,
    settings: &CompactionSettings,
) -> VersionView {
    VersionView::new(
        levels
            .into_iter()
            .map(|files| files.into_iter().map(Arc::new).collect())
            .collect(),
        depend,
        settings,
    )
}

/// Essence file numbered `n` with seqnos in `n*10 ..= n*10+9`, so files with
/// larger numbers are newer. Level 0 lists in tests therefore go from the
/// largest file number (index 0, newest) down.
pub(crate) fn essence_file(n: u64, smallest: &str, largest: &str, size: u64) -> FileHandle {
    file_with_seqs(n, smallest, largest, size, n * 10, n * 10 + 9)
}

pub(crate) fn file_with_seqs(
    n: u64,
    smallest: &str,
    largest: &str,
    size: u64,
    smallest_seqno: u64,
    largest_seqno: u64,
) -> FileHandle {
    FileHandle::new(
        n,
        ikey(smallest, largest_seqno),
        ikey(largest, smallest_seqno),
        size,
    )
    .with_seqnos(smallest_seqno, largest_seqno)
}

pub(crate) fn map_file(
    n: u64,
    smallest: &str,
    largest: &str,
    size: u64,
    depend: Vec<u64>,
) -> FileHandle {
    essence_file(n, smallest, largest, size).with_purpose(SstPurpose::Map, depend)
}

pub(crate) fn link_file(
    n: u64,
    smallest: &str,
    largest: &str,
    size: u64,
    depend: Vec<u64>,
) -> FileHandle {
    essence_file(n, smallest, largest, size).with_purpose(SstPurpose::Link, depend)
}

pub(crate) fn map_element(
    smallest: &str,
    largest: &str,
    seq: u64,
    links: Vec<(u64, u64)>,
) -> MapSstElement {
    MapSstElement {
        smallest_key: ikey(smallest, seq),
        largest_key: ikey(largest, seq),
        include_smallest: true,
        include_largest: true,
        links: links
            .into_iter()
            .map(|(file_number, size)| MapLink { file_number, size })
            .collect(),
    }
}

/// An element covering exactly `file`'s key range through a single link, the
/// shape the composite strategy recognizes as already perfect.
pub(crate) fn perfect_element(file: &FileHandle, used: u64) -> MapSstElement {
    MapSstElement {
        smallest_key: file.smallest().clone(),
        largest_key: file.largest().clone(),
        include_smallest: true,
        include_largest: true,
        links: vec![MapLink {
            file_number: file.file_number(),
            size: used,
        }],
    }
}

pub(crate) fn read_amp_props(read_amp: usize) -> Arc<TableProperties> {
    let mut props = TableProperties::default();
    props
        .user_collected
        .insert(SST_READ_AMP_PROPERTY.to_string(), read_amp.to_string());
    Arc::new(props)
}

/// Table cache double serving canned properties and map elements keyed by
/// file number.
#[derive(Default)]
pub(crate) struct StaticTableCache {
    pub(crate) props: HashMap<u64, Arc<TableProperties>>,
    pub(crate) elements: HashMap<u64, Vec<MapSstElement>>,
}

impl StaticTableCache {
    pub(crate) fn with_props(mut self, file_number: u64, read_amp: usize) -> Self {
        self.props.insert(file_number, read_amp_props(read_amp));
        self
    }

    pub(crate) fn with_elements(mut self, file_number: u64, elements: Vec<MapSstElement>) -> Self {
        self.elements.insert(file_number, elements);
        self
    }
}

impl TableCache for StaticTableCache {
    fn table_properties(&self, file: &FileHandle) -> Result<Arc<TableProperties>, Error> {
        self.props
            .get(&file.file_number())
            .cloned()
            .ok_or_else(|| Error::IteratorFailure("no properties recorded".to_string()))
    }

    fn map_element_iter(
        &self,
        files: &[Arc<FileHandle>],
    ) -> Result<Box<dyn MapElementIter + '_>, Error> {
        let mut elements = Vec::new();
        for f in files {
            elements.extend(
                self.elements
                    .get(&f.file_number())
                    .cloned()
                    .unwrap_or_default(),
            );
        }
        Ok(Box::new(VecMapElementIter::new(elements)))
    }
}

/// In-memory map element cursor over a sorted element list.
pub(crate) struct VecMapElementIter {
    elements: Vec<MapSstElement>,
    pos: isize,
    status: Result<(), Error>,
}

impl VecMapElementIter {
    pub(crate) fn new(elements: Vec<MapSstElement>) -> Self {
        Self {
            elements,
            pos: -1,
            status: Ok(()),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            elements: Vec::new(),
            pos: -1,
            status: Err(Error::IteratorFailure(message.to_string())),
        }
    }
}

impl MapElementIter for VecMapElementIter {
    fn seek_to_first(&mut self) {
        self.pos = 0;
    }

    fn seek(&mut self, key: &InternalKey) {
        self.pos = self
            .elements
            .iter()
            .position(|e| e.largest_key >= *key)
            .map(|p| p as isize)
            .unwrap_or(self.elements.len() as isize);
    }

    fn seek_for_prev(&mut self, key: &InternalKey) {
        self.pos = self
            .elements
            .iter()
            .rposition(|e| e.largest_key <= *key)
            .map(|p| p as isize)
            .unwrap_or(-1);
    }

    fn next(&mut self) {
        self.pos += 1;
    }

    fn prev(&mut self) {
        self.pos -= 1;
    }

    fn valid(&self) -> bool {
        self.status.is_ok() && self.pos >= 0 && (self.pos as usize) < self.elements.len()
    }

    fn element(&self) -> &MapSstElement {
        &self.elements[self.pos as usize]
    }

    fn status(&self) -> Result<(), Error> {
        self.status.clone()
    }
}

/// Table cache double whose iterators always fail, for exercising the
/// iterator-failure path.
pub(crate) struct FailingTableCache;

impl TableCache for FailingTableCache {
    fn table_properties(&self, _file: &FileHandle) -> Result<Arc<TableProperties>, Error> {
        Ok(read_amp_props(4))
    }

    fn map_element_iter(
        &self,
        _files: &[Arc<FileHandle>],
    ) -> Result<Box<dyn MapElementIter + '_>, Error> {
        Ok(Box::new(VecMapElementIter::failing("read error")))
    }
}
