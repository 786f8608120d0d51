use bytes::Bytes;
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};

/// Sequence number assigned to every write. Larger is newer.
pub type SeqNo = u64;

/// A user key qualified by the sequence number of the write that produced it.
///
/// Internal keys order by ascending user key and then by *descending*
/// sequence number, so that for one user key the newest entry sorts first.
/// File boundary keys, map element boundaries and in-flight range checks all
/// compare in this order.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct InternalKey {
    pub user_key: Bytes,
    pub seq: SeqNo,
}

impl InternalKey {
    pub fn new(user_key: impl Into<Bytes>, seq: SeqNo) -> Self {
        Self {
            user_key: user_key.into(),
            seq,
        }
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.user_key
            .cmp(&other.user_key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Debug for InternalKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:?}@{}", self.user_key, self.seq))
    }
}

/// A user-key range selected for partial compaction, carried on a plan as a
/// sub-compaction partition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Bytes,
    pub limit: Bytes,
    pub include_start: bool,
    pub include_limit: bool,
}

impl KeyRange {
    pub fn new(
        start: impl Into<Bytes>,
        limit: impl Into<Bytes>,
        include_start: bool,
        include_limit: bool,
    ) -> Self {
        Self {
            start: start.into(),
            limit: limit.into(),
            include_start,
            include_limit,
        }
    }
}
