// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The in-RAM representation of an inode.
//!
//! An inode is either a directory (it has children) or a file (it
//! has data blocks); never both.  Restore may also fabricate a
//! *dummy* inode: a placeholder for an id that some record referred
//! to before any record for the id itself was seen.  A dummy keeps
//! its identity and its accumulated children or blocks when the
//! real record arrives and overwrites it in place; a dummy still
//! standing after the full scan is an unresolved forward reference
//! and is discarded by the sweep.

use crate::block::Block;
use crate::disk::{self, DiskInode};
use crate::fs::SECTOR_ID_NONE;
use crate::pool::Handle;
use alloc::vec::Vec;
use bitflags::bitflags;

bitflags! {
    /// Inode state flags.  The low bits mirror the on-disk flag
    /// byte; `DUMMY` exists only in RAM.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct InodeFlags: u8 {
        const DIRECTORY = disk::DISK_INODE_F_DIRECTORY;
        const DELETED = disk::DISK_INODE_F_DELETED;
        const DUMMY = 0x80;
    }
}

impl InodeFlags {
    /// Interprets an on-disk flag byte.  Unknown bits are dropped,
    /// and nothing on flash can mark an inode as a dummy.
    pub fn from_disk(bits: u8) -> InodeFlags {
        InodeFlags::from_bits_truncate(bits).difference(InodeFlags::DUMMY)
    }
}

/// An inode, resident in the inode pool.
pub struct Inode {
    pub(crate) id: u32,
    pub(crate) seq: u32,
    pub(crate) sector_id: u16,
    pub(crate) sector_offset: u32,
    pub(crate) flags: InodeFlags,
    pub(crate) parent: Option<Handle<Inode>>,
    #[allow(dead_code)]
    pub(crate) refcnt: u16,
    pub(crate) filename: Vec<u8>,
    pub(crate) children: Vec<Handle<Inode>>,
    pub(crate) blocks: Vec<Handle<Block>>,
    pub(crate) data_len: u32,
}

impl Inode {
    /// Builds an inode from a decoded record.
    pub(crate) fn from_disk(
        di: &DiskInode,
        sector_id: u16,
        sector_offset: u32,
    ) -> Inode {
        let mut inode = Inode {
            id: di.id,
            seq: di.seq,
            sector_id,
            sector_offset,
            flags: InodeFlags::empty(),
            parent: None,
            refcnt: 0,
            filename: Vec::new(),
            children: Vec::new(),
            blocks: Vec::new(),
            data_len: 0,
        };
        inode.update_from_disk(di, sector_id, sector_offset);
        inode
    }

    /// Overwrites the disk-derived fields from a newer record.
    /// Identity is preserved, and so are the reference count and
    /// the accumulated children and block lists: a dummy that is
    /// upgraded here keeps everything attached to it so far.
    pub(crate) fn update_from_disk(
        &mut self,
        di: &DiskInode,
        sector_id: u16,
        sector_offset: u32,
    ) {
        debug_assert_eq!(self.id, di.id);
        self.seq = di.seq;
        self.sector_id = sector_id;
        self.sector_offset = sector_offset;
        self.flags = InodeFlags::from_disk(di.flags);
        self.filename.clear();
        self.filename.extend_from_slice(&di.filename);
    }

    /// Builds a placeholder for a forward-referenced id.
    pub(crate) fn new_dummy(id: u32, is_dir: bool) -> Inode {
        let mut flags = InodeFlags::DUMMY;
        if is_dir {
            flags |= InodeFlags::DIRECTORY;
        }
        Inode {
            id,
            seq: 0,
            sector_id: SECTOR_ID_NONE,
            sector_offset: 0,
            flags,
            parent: None,
            refcnt: 1,
            filename: Vec::new(),
            children: Vec::new(),
            blocks: Vec::new(),
            data_len: 0,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn flags(&self) -> InodeFlags {
        self.flags
    }

    pub fn is_directory(&self) -> bool {
        self.flags.contains(InodeFlags::DIRECTORY)
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(InodeFlags::DELETED)
    }

    pub fn is_dummy(&self) -> bool {
        self.flags.contains(InodeFlags::DUMMY)
    }

    pub fn filename(&self) -> &[u8] {
        &self.filename
    }

    pub fn parent(&self) -> Option<Handle<Inode>> {
        self.parent
    }

    /// Child inodes, in discovery order.  Meaningful only for
    /// directories.
    pub fn children(&self) -> &[Handle<Inode>] {
        &self.children
    }

    /// Attached data blocks, in discovery order.  Meaningful only
    /// for files.
    pub fn blocks(&self) -> &[Handle<Block>] {
        &self.blocks
    }

    /// The cached total length of the file's data, in bytes.
    pub fn data_len(&self) -> u32 {
        self.data_len
    }

    /// Where the newest record for this inode lives.  A dummy has
    /// no record yet and reports `SECTOR_ID_NONE`.
    pub fn location(&self) -> (u16, u32) {
        (self.sector_id, self.sector_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn disk_flags_never_produce_a_dummy() {
        let flags = InodeFlags::from_disk(0xff);
        assert!(!flags.contains(InodeFlags::DUMMY));
        assert!(flags.contains(InodeFlags::DIRECTORY));
        assert!(flags.contains(InodeFlags::DELETED));
    }

    #[test]
    fn upgrade_preserves_attachments() {
        let mut pool = crate::pool::Pool::new(4);
        let mut inode = Inode::new_dummy(10, true);
        // A child accumulated while the parent was still a dummy.
        let child = pool.alloc(Inode::new_dummy(11, false)).unwrap();
        inode.children.push(child);
        let di = DiskInode {
            id: 10,
            seq: 4,
            parent_id: disk::ROOT_ID,
            flags: disk::DISK_INODE_F_DIRECTORY,
            filename: b"etc".to_vec(),
        };
        inode.update_from_disk(&di, 0, 8);
        assert!(!inode.is_dummy());
        assert!(inode.is_directory());
        assert_eq!(inode.seq(), 4);
        assert_eq!(inode.filename(), b"etc");
        assert_eq!(inode.children.len(), 1);
    }

    #[test]
    fn dummy_file_has_no_directory_flag() {
        let inode = Inode::new_dummy(20, false);
        assert!(inode.is_dummy());
        assert!(!inode.is_directory());
        assert_eq!(inode.sector_id, SECTOR_ID_NONE);
        let di = DiskInode {
            id: 20,
            seq: 0,
            parent_id: disk::ID_NONE,
            flags: 0,
            filename: vec![],
        };
        let fresh = Inode::from_disk(&di, 1, 8);
        assert!(!fresh.is_dummy());
        assert_eq!(fresh.refcnt, 0);
    }
}
