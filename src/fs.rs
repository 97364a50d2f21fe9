// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The filesystem aggregate.
//!
//! Everything the engine mutates lives here: the flash handle,
//! the sector table, the inode and block pools, the object index,
//! the id counter, the adopted scratch sector, and the root
//! pointer.  There are no globals; every operation takes the
//! aggregate explicitly, and the engine is single-threaded for
//! the duration of any call.
//!
//! The tree-shaping operations (linking children to parents,
//! attaching blocks to files) also live here because they need
//! both arenas at once.

use crate::block::Block;
use crate::flash::Flash;
use crate::hash::{ObjRef, ObjectIndex};
use crate::inode::Inode;
use crate::pool::{Handle, Pool};
use crate::result::{Error, Result};
use alloc::vec::Vec;

/// Reserved sector id: "no such sector".  Used for the scratch
/// sector before one is adopted, and as the home of objects that
/// have no flash location (dummies).
pub const SECTOR_ID_NONE: u16 = 0xffff;

/// A caller-supplied description of one flash sector.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SectorDesc {
    /// Absolute offset of the sector on the device.
    pub offset: u32,
    /// Length of the sector, in bytes.  A zero length terminates
    /// a descriptor table.
    pub length: u32,
}

/// An adopted sector.
pub(crate) struct Sector {
    pub(crate) offset: u32,
    pub(crate) length: u32,
    /// Scan cursor; after restore, the write frontier.
    pub(crate) cur: u32,
}

/// An instance of the filesystem.
pub struct Filesystem<F: Flash> {
    pub(crate) flash: F,
    pub(crate) sectors: Vec<Sector>,
    pub(crate) scratch_sector_id: u16,
    pub(crate) next_id: u32,
    pub(crate) root: Option<Handle<Inode>>,
    pub(crate) inodes: Pool<Inode>,
    pub(crate) blocks: Pool<Block>,
    pub(crate) index: ObjectIndex,
}

impl<F: Flash> Filesystem<F> {
    /// Creates an empty filesystem over `flash` with the given
    /// object pool capacities.  Nothing is read until `detect`.
    pub fn new(flash: F, max_inodes: usize, max_blocks: usize) -> Self {
        Filesystem {
            flash,
            sectors: Vec::new(),
            scratch_sector_id: SECTOR_ID_NONE,
            next_id: 0,
            root: None,
            inodes: Pool::new(max_inodes),
            blocks: Pool::new(max_blocks),
            index: ObjectIndex::new(),
        }
    }

    /// Reads from a sector at an intra-sector offset.  Fails with
    /// `Range` if the read would run past the end of the sector
    /// and `Flash` if the medium refuses.
    pub(crate) fn read_sector(
        &self,
        sector_id: u16,
        offset: u32,
        dst: &mut [u8],
    ) -> Result<()> {
        let sector =
            self.sectors.get(sector_id as usize).ok_or(Error::Inval)?;
        let end = offset
            .checked_add(dst.len() as u32)
            .ok_or(Error::Range)?;
        if end > sector.length {
            return Err(Error::Range);
        }
        self.flash.read(sector.offset + offset, dst)
    }

    /// Drops the adopted sector set, as after a failed detect.
    pub(crate) fn reset_sectors(&mut self) {
        self.scratch_sector_id = SECTOR_ID_NONE;
        self.sectors.clear();
    }

    pub(crate) fn find_inode(&self, id: u32) -> Result<Handle<Inode>> {
        match self.index.find(id) {
            Some(ObjRef::Inode(h)) => Ok(h),
            Some(ObjRef::Block(_)) => Err(Error::Corrupt),
            None => Err(Error::NoEnt),
        }
    }

    pub(crate) fn find_block(&self, id: u32) -> Result<Handle<Block>> {
        match self.index.find(id) {
            Some(ObjRef::Block(h)) => Ok(h),
            Some(ObjRef::Inode(_)) => Err(Error::Corrupt),
            None => Err(Error::NoEnt),
        }
    }

    /// Makes `child` a child of `parent`.
    pub(crate) fn add_child(
        &mut self,
        parent: Handle<Inode>,
        child: Handle<Inode>,
    ) -> Result<()> {
        let c = self.inodes.get_mut(child).ok_or(Error::Inval)?;
        c.parent = Some(parent);
        let p = self.inodes.get_mut(parent).ok_or(Error::Inval)?;
        p.children.push(child);
        Ok(())
    }

    /// Detaches `child` from its parent, if it has one.
    pub(crate) fn remove_child(&mut self, child: Handle<Inode>) {
        let Some(c) = self.inodes.get_mut(child) else {
            return;
        };
        let Some(parent) = c.parent.take() else {
            return;
        };
        if let Some(p) = self.inodes.get_mut(parent) {
            p.children.retain(|&h| h != child);
        }
    }

    /// Attaches `block` to the file inode `owner`.
    pub(crate) fn insert_block(
        &mut self,
        owner: Handle<Inode>,
        block: Handle<Block>,
    ) -> Result<()> {
        let b = self.blocks.get_mut(block).ok_or(Error::Inval)?;
        b.inode = Some(owner);
        let i = self.inodes.get_mut(owner).ok_or(Error::Inval)?;
        i.blocks.push(block);
        Ok(())
    }

    /// Detaches `block` from its owning inode, if that inode is
    /// still live.
    pub(crate) fn remove_block(&mut self, block: Handle<Block>) {
        let Some(b) = self.blocks.get_mut(block) else {
            return;
        };
        let Some(owner) = b.inode.take() else {
            return;
        };
        if let Some(i) = self.inodes.get_mut(owner) {
            i.blocks.retain(|&h| h != block);
        }
    }

    /// Sums the data lengths of the blocks attached to a file.
    pub(crate) fn calc_data_len(&self, inode: Handle<Inode>) -> u32 {
        let Some(i) = self.inodes.get(inode) else {
            return 0;
        };
        i.blocks
            .iter()
            .filter_map(|&h| self.blocks.get(h))
            .map(|b| b.data_len as u32)
            .sum()
    }

    /// Removes an inode from RAM: out of the index, off its
    /// parent's child list, back to the pool.
    pub(crate) fn delete_inode_from_ram(&mut self, handle: Handle<Inode>) {
        if let Some(i) = self.inodes.get(handle) {
            self.index.remove(i.id);
        }
        self.remove_child(handle);
        if self.root == Some(handle) {
            self.root = None;
        }
        self.inodes.free(handle);
    }

    /// Removes a block from RAM: out of the index, off its
    /// owner's block list, back to the pool.
    pub(crate) fn delete_block_from_ram(&mut self, handle: Handle<Block>) {
        if let Some(b) = self.blocks.get(handle) {
            self.index.remove(b.id);
        }
        self.remove_block(handle);
        self.blocks.free(handle);
    }

    /// A usable filesystem has exactly one scratch sector.
    pub(crate) fn validate_scratch(&self) -> Result<()> {
        if self.scratch_sector_id == SECTOR_ID_NONE {
            return Err(Error::Corrupt);
        }
        Ok(())
    }

    /// A usable filesystem has a root directory.
    pub(crate) fn validate_root(&self) -> Result<()> {
        let Some(root) = self.root else {
            return Err(Error::Corrupt);
        };
        match self.inodes.get(root) {
            Some(i) if i.is_directory() => Ok(()),
            _ => Err(Error::Corrupt),
        }
    }

    /// The root directory inode, once a filesystem is mounted.
    pub fn root(&self) -> Option<&Inode> {
        self.root.and_then(|h| self.inodes.get(h))
    }

    pub fn root_handle(&self) -> Option<Handle<Inode>> {
        self.root
    }

    /// Resolves an inode handle.
    pub fn inode(&self, handle: Handle<Inode>) -> Option<&Inode> {
        self.inodes.get(handle)
    }

    /// Resolves a block handle.
    pub fn block(&self, handle: Handle<Block>) -> Option<&Block> {
        self.blocks.get(handle)
    }

    /// Looks up an inode by object id.
    pub fn get_inode(&self, id: u32) -> Option<&Inode> {
        self.find_inode(id).ok().and_then(|h| self.inodes.get(h))
    }

    /// Looks up a block by object id.
    pub fn get_block(&self, id: u32) -> Option<&Block> {
        self.find_block(id).ok().and_then(|h| self.blocks.get(h))
    }

    /// The next object id a writer would hand out; greater than
    /// every id observed on flash.
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// The number of adopted sectors, scratch included.
    pub fn num_sectors(&self) -> usize {
        self.sectors.len()
    }

    /// The adopted scratch sector, if any.
    pub fn scratch_sector(&self) -> Option<u16> {
        (self.scratch_sector_id != SECTOR_ID_NONE)
            .then_some(self.scratch_sector_id)
    }

    /// The number of live objects in the index.
    pub fn num_objects(&self) -> usize {
        self.index.len()
    }

    pub fn num_inodes(&self) -> usize {
        self.inodes.len()
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskBlock;
    use crate::flash::MemFlash;
    use crate::hash::ObjRef;
    use crate::inode::Inode;

    fn fs_over(data: &[u8]) -> Filesystem<MemFlash<'_>> {
        Filesystem::new(MemFlash::new(data), 16, 16)
    }

    fn block(id: u32, inode_id: u32, data_len: u16) -> Block {
        let db = DiskBlock { id, seq: 0, inode_id, data_len, flags: 0 };
        Block::from_disk(&db, 0, 8)
    }

    #[test]
    fn read_sector_respects_bounds() {
        let data = (0u8..64).collect::<alloc::vec::Vec<_>>();
        let mut fs = fs_over(&data);
        fs.sectors.push(Sector { offset: 16, length: 16, cur: 0 });
        let mut buf = [0u8; 4];
        fs.read_sector(0, 4, &mut buf).unwrap();
        assert_eq!(buf, [20, 21, 22, 23]);
        assert_eq!(fs.read_sector(0, 14, &mut buf), Err(Error::Range));
        assert_eq!(fs.read_sector(1, 0, &mut buf), Err(Error::Inval));
    }

    #[test]
    fn add_and_remove_child() {
        let data = [0u8; 1];
        let mut fs = fs_over(&data);
        let parent = fs.inodes.alloc(Inode::new_dummy(1, true)).unwrap();
        let child = fs.inodes.alloc(Inode::new_dummy(2, false)).unwrap();
        fs.add_child(parent, child).unwrap();
        assert_eq!(fs.inode(parent).unwrap().children(), &[child]);
        assert_eq!(fs.inode(child).unwrap().parent(), Some(parent));
        fs.remove_child(child);
        assert!(fs.inode(parent).unwrap().children().is_empty());
        assert_eq!(fs.inode(child).unwrap().parent(), None);
    }

    #[test]
    fn attach_blocks_and_sum_lengths() {
        let data = [0u8; 1];
        let mut fs = fs_over(&data);
        let file = fs.inodes.alloc(Inode::new_dummy(10, false)).unwrap();
        let b1 = fs.blocks.alloc(block(20, 10, 5)).unwrap();
        let b2 = fs.blocks.alloc(block(21, 10, 7)).unwrap();
        fs.insert_block(file, b1).unwrap();
        fs.insert_block(file, b2).unwrap();
        assert_eq!(fs.calc_data_len(file), 12);
        fs.remove_block(b1);
        assert_eq!(fs.calc_data_len(file), 7);
        assert_eq!(fs.inode(file).unwrap().blocks(), &[b2]);
    }

    #[test]
    fn delete_inode_detaches_everywhere() {
        let data = [0u8; 1];
        let mut fs = fs_over(&data);
        let parent = fs.inodes.alloc(Inode::new_dummy(1, true)).unwrap();
        let child = fs.inodes.alloc(Inode::new_dummy(2, false)).unwrap();
        fs.index.insert(1, ObjRef::Inode(parent));
        fs.index.insert(2, ObjRef::Inode(child));
        fs.add_child(parent, child).unwrap();
        fs.delete_inode_from_ram(child);
        assert_eq!(fs.num_objects(), 1);
        assert!(fs.inode(parent).unwrap().children().is_empty());
        assert!(fs.inode(child).is_none());
    }

    #[test]
    fn validators() {
        let data = [0u8; 1];
        let mut fs = fs_over(&data);
        assert_eq!(fs.validate_scratch(), Err(Error::Corrupt));
        fs.scratch_sector_id = 0;
        assert_eq!(fs.validate_scratch(), Ok(()));
        assert_eq!(fs.validate_root(), Err(Error::Corrupt));
        let root = fs.inodes.alloc(Inode::new_dummy(1, true)).unwrap();
        fs.root = Some(root);
        assert_eq!(fs.validate_root(), Ok(()));
        // A root that is not a directory does not validate.
        let file_root =
            fs.inodes.alloc(Inode::new_dummy(9, false)).unwrap();
        fs.root = Some(file_root);
        assert_eq!(fs.validate_root(), Err(Error::Corrupt));
    }
}
