// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The object index: id to in-RAM object.
//!
//! Inodes and blocks share one id space, so a single table covers
//! both; entries carry a typed handle and callers say which kind
//! they expect.  The table is a plain open hash with chaining.
//! Within a bucket, entries keep first-insertion order, which
//! makes the post-scan sweep deterministic; no ordering holds
//! across buckets.

use crate::block::Block;
use crate::inode::Inode;
use crate::pool::Handle;
use alloc::vec::Vec;

/// Number of hash buckets.
const NBUCKETS: usize = 64;

/// A typed reference to an indexed object.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ObjRef {
    Inode(Handle<Inode>),
    Block(Handle<Block>),
}

struct Entry {
    id: u32,
    obj: ObjRef,
}

/// The id-to-object map.
pub(crate) struct ObjectIndex {
    buckets: Vec<Vec<Entry>>,
    len: usize,
}

impl ObjectIndex {
    pub(crate) fn new() -> ObjectIndex {
        let mut buckets = Vec::with_capacity(NBUCKETS);
        buckets.resize_with(NBUCKETS, Vec::new);
        ObjectIndex { buckets, len: 0 }
    }

    fn bucket(id: u32) -> usize {
        id as usize % NBUCKETS
    }

    /// Inserts an object.  The caller has already established
    /// that `id` is not present.
    pub(crate) fn insert(&mut self, id: u32, obj: ObjRef) {
        debug_assert!(self.find(id).is_none());
        self.buckets[Self::bucket(id)].push(Entry { id, obj });
        self.len += 1;
    }

    pub(crate) fn find(&self, id: u32) -> Option<ObjRef> {
        self.buckets[Self::bucket(id)]
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.obj)
    }

    /// Removes and returns the entry for `id`, keeping the order
    /// of the remaining bucket entries.
    pub(crate) fn remove(&mut self, id: u32) -> Option<ObjRef> {
        let bucket = &mut self.buckets[Self::bucket(id)];
        let pos = bucket.iter().position(|e| e.id == id)?;
        let entry = bucket.remove(pos);
        self.len -= 1;
        Some(entry.obj)
    }

    /// Visits every entry, bucket by bucket, in first-insertion
    /// order within each bucket.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (u32, ObjRef)> + '_ {
        self.buckets.iter().flatten().map(|e| (e.id, e.obj))
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}
