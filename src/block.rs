// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The in-RAM representation of a data block.
//!
//! A block does not hold its payload; that stays on flash at the
//! recorded sector and offset.  RAM carries only the bookkeeping
//! needed to find the newest copy and to account the owning
//! file's length.

use crate::disk::{self, DiskBlock};
use crate::inode::Inode;
use crate::pool::Handle;
use bitflags::bitflags;

bitflags! {
    /// Block state flags, mirroring the on-disk flag byte.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct BlockFlags: u8 {
        const DELETED = disk::DISK_BLOCK_F_DELETED;
    }
}

/// A data block, resident in the block pool.
pub struct Block {
    pub(crate) id: u32,
    pub(crate) seq: u32,
    pub(crate) sector_id: u16,
    pub(crate) sector_offset: u32,
    pub(crate) flags: BlockFlags,
    pub(crate) inode: Option<Handle<Inode>>,
    pub(crate) data_len: u16,
}

impl Block {
    /// Builds a block from a decoded record.  The owning-inode
    /// link is established by the caller once the owner is found
    /// or fabricated.
    pub(crate) fn from_disk(
        db: &DiskBlock,
        sector_id: u16,
        sector_offset: u32,
    ) -> Block {
        let mut block = Block {
            id: db.id,
            seq: db.seq,
            sector_id,
            sector_offset,
            flags: BlockFlags::empty(),
            inode: None,
            data_len: 0,
        };
        block.update_from_disk(db, sector_id, sector_offset);
        block
    }

    /// Overwrites the disk-derived fields from a newer record.
    /// The owning-inode link is left alone: a newer generation of
    /// a block never migrates it to another file.
    pub(crate) fn update_from_disk(
        &mut self,
        db: &DiskBlock,
        sector_id: u16,
        sector_offset: u32,
    ) {
        debug_assert_eq!(self.id, db.id);
        self.seq = db.seq;
        self.sector_id = sector_id;
        self.sector_offset = sector_offset;
        self.flags = BlockFlags::from_bits_truncate(db.flags);
        self.data_len = db.data_len;
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(BlockFlags::DELETED)
    }

    /// The owning file inode, if the link is established.
    pub fn inode(&self) -> Option<Handle<Inode>> {
        self.inode
    }

    /// Length of the payload on flash, in bytes.
    pub fn data_len(&self) -> u16 {
        self.data_len
    }

    /// Where the newest copy of this block lives.
    pub fn location(&self) -> (u16, u32) {
        (self.sector_id, self.sector_offset)
    }
}
