// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Filesystem detection and restore.
//!
//! A mounted filesystem is reconstructed entirely from the log
//! records on flash.  Each candidate sector is classified by its
//! header, every data sector is scanned record by record, and
//! each record is reconciled against the object index: the record
//! with the highest sequence number for an id describes the live
//! generation of that object, and everything older is ignored.
//!
//! Records may refer to ids that have not been seen yet (a block
//! can precede its file's inode, a child its parent), so the
//! reconciler fabricates dummy placeholder inodes for forward
//! references and lets the real record overwrite the placeholder
//! in place when it shows up.  After the scan, a sweep removes
//! tombstoned objects, unresolved placeholders, and orphaned
//! blocks, then recomputes each surviving file's cached length.
//!
//! Per-sector corruption is contained: a sector with a bad header
//! is dropped from the candidate set, and a sector whose log
//! degenerates into unrecognizable bytes is abandoned at that
//! point.  Logic-level corruption (two distinct records claiming
//! the same id and sequence number) and resource exhaustion abort
//! the mount.

use crate::block::Block;
use crate::disk::{self, DiskBlock, DiskInode, DiskSector};
use crate::flash::Flash;
use crate::fs::{Filesystem, SECTOR_ID_NONE, Sector, SectorDesc};
use crate::hash::ObjRef;
use crate::inode::Inode;
use crate::pool::Handle;
use crate::result::{Error, Result};
use alloc::vec;
use log::{debug, warn};

/// A record decoded during a sector scan, along with where it was
/// found; the location becomes the object's recorded position and
/// feeds later rewrite-on-replace decisions.
pub(crate) struct DiskObject {
    sector_id: u16,
    offset: u32,
    rec: DiskRecord,
}

pub(crate) enum DiskRecord {
    Inode(DiskInode),
    Block(DiskBlock),
}

impl DiskObject {
    /// The record's full on-flash size, trailing bytes included.
    fn size(&self) -> u32 {
        match &self.rec {
            DiskRecord::Inode(di) => di.size(),
            DiskRecord::Block(db) => db.size(),
        }
    }
}

/// Decides whether a decoded inode record displaces the in-RAM
/// inode with the same id.  A dummy always loses to a real
/// record; otherwise the higher sequence number wins, and a tie
/// is corruption.
fn inode_gets_replaced(old: &Inode, di: &DiskInode) -> Result<bool> {
    debug_assert_eq!(old.id(), di.id);
    if old.is_dummy() {
        return Ok(true);
    }
    if old.seq() < di.seq {
        return Ok(true);
    }
    if old.seq() == di.seq {
        return Err(Error::Corrupt);
    }
    Ok(false)
}

/// The block analog of `inode_gets_replaced`.
fn block_gets_replaced(old: &Block, db: &DiskBlock) -> Result<bool> {
    debug_assert_eq!(old.id(), db.id);
    if old.seq() < db.seq {
        return Ok(true);
    }
    if old.seq() == db.seq {
        return Err(Error::Corrupt);
    }
    Ok(false)
}

impl<F: Flash> Filesystem<F> {
    /// Searches for a valid filesystem among the supplied
    /// sectors.  Succeeds if one is detected among any subset of
    /// them; if not, the caller can format the media and try
    /// again.
    ///
    /// The descriptor slice may additionally be terminated by a
    /// zero-length entry, which matches the table layout used on
    /// the wire; entries past the terminator are ignored.
    pub fn detect(&mut self, descs: &[SectorDesc]) -> Result<()> {
        self.reset();
        for desc in descs.iter().take_while(|d| d.length != 0) {
            let is_scratch = match self.detect_one_sector(desc.offset) {
                Ok(is_scratch) => is_scratch,
                Err(Error::Corrupt) => {
                    warn!(
                        "skipping sector at {:#x}: bad header",
                        desc.offset
                    );
                    continue;
                }
                Err(e) => {
                    self.reset_sectors();
                    return Err(e);
                }
            };
            if is_scratch && self.scratch_sector_id != SECTOR_ID_NONE {
                // Only one scratch sector is ever used.
                debug!(
                    "ignoring extra scratch sector at {:#x}",
                    desc.offset
                );
                continue;
            }
            let sector_id = self.sectors.len() as u16;
            self.sectors.push(Sector {
                offset: desc.offset,
                length: desc.length,
                cur: 0,
            });
            if is_scratch {
                self.scratch_sector_id = sector_id;
            } else {
                match self.restore_sector(sector_id) {
                    Ok(()) => {}
                    Err(Error::Corrupt) => return Err(Error::Corrupt),
                    Err(e) => {
                        self.reset_sectors();
                        return Err(e);
                    }
                }
            }
        }
        self.validate_scratch()?;
        self.sweep();
        self.validate_root()?;
        debug!(
            "filesystem detected: {} sectors, {} objects",
            self.sectors.len(),
            self.index.len()
        );
        Ok(())
    }

    /// Forgets all mutable state, as if freshly created.
    fn reset(&mut self) {
        self.sectors.clear();
        self.scratch_sector_id = SECTOR_ID_NONE;
        self.next_id = 0;
        self.root = None;
        self.inodes.clear();
        self.blocks.clear();
        self.index = crate::hash::ObjectIndex::new();
    }

    /// Classifies the sector at `offset`: `Ok(is_scratch)` for a
    /// usable sector, `Corrupt` for one with a missing or
    /// malformed header, `Flash` if the medium refuses the read.
    fn detect_one_sector(&self, offset: u32) -> Result<bool> {
        let mut hdr = [0u8; DiskSector::SIZE];
        self.flash.read(offset, &mut hdr)?;
        let sector = DiskSector::decode(&hdr)?;
        Ok(sector.is_scratch())
    }

    /// Scans one data sector, reconciling every record until the
    /// log ends in erased flash or runs off the sector.
    fn restore_sector(&mut self, sector_id: u16) -> Result<()> {
        self.sectors[sector_id as usize].cur = DiskSector::SIZE as u32;
        loop {
            let cur = self.sectors[sector_id as usize].cur;
            match self.read_disk_object(sector_id, cur) {
                Ok(obj) => {
                    let size = obj.size();
                    self.restore_object(&obj)?;
                    self.sectors[sector_id as usize].cur = cur + size;
                }
                Err(Error::Empty) | Err(Error::Range) => return Ok(()),
                Err(Error::Corrupt) => {
                    // Unrecognizable bytes: the record size is
                    // unknowable, so the rest of this sector is
                    // unreachable.  Keep what was already
                    // reconciled and move on.
                    warn!(
                        "sector {sector_id}: unrecognized record at \
                         offset {cur}; abandoning scan",
                    );
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Probes for a record at the given position and decodes it.
    fn read_disk_object(
        &self,
        sector_id: u16,
        offset: u32,
    ) -> Result<DiskObject> {
        let mut magic = [0u8; 4];
        self.read_sector(sector_id, offset, &mut magic)?;
        let rec = match u32::from_le_bytes(magic) {
            disk::INODE_MAGIC => {
                let mut hdr = [0u8; DiskInode::HDR_SIZE];
                self.read_sector(sector_id, offset, &mut hdr)?;
                let nlen = DiskInode::trailing_len(&hdr)?;
                let mut filename = vec![0u8; nlen];
                self.read_sector(
                    sector_id,
                    offset + DiskInode::HDR_SIZE as u32,
                    &mut filename,
                )?;
                DiskRecord::Inode(DiskInode::decode(&hdr, &filename)?)
            }
            disk::BLOCK_MAGIC => {
                let mut hdr = [0u8; DiskBlock::HDR_SIZE];
                self.read_sector(sector_id, offset, &mut hdr)?;
                // The payload stays on flash; the scanner just
                // steps over it.
                DiskRecord::Block(DiskBlock::decode(&hdr)?)
            }
            disk::ERASED_WORD => return Err(Error::Empty),
            _ => return Err(Error::Corrupt),
        };
        Ok(DiskObject { sector_id, offset, rec })
    }

    fn restore_object(&mut self, obj: &DiskObject) -> Result<()> {
        match &obj.rec {
            DiskRecord::Inode(di) => {
                self.restore_inode(di, obj.sector_id, obj.offset)
            }
            DiskRecord::Block(db) => {
                self.restore_block(db, obj.sector_id, obj.offset)
            }
        }
    }

    /// Fabricates a placeholder inode for a forward-referenced
    /// id.  The placeholder holds the referrer's place in the
    /// tree until the real record arrives and overwrites it.
    fn restore_dummy_inode(
        &mut self,
        id: u32,
        is_dir: bool,
    ) -> Result<Handle<Inode>> {
        debug!("forward reference to inode {id}; inserting dummy");
        let handle = self.inodes.alloc(Inode::new_dummy(id, is_dir))?;
        self.index.insert(id, ObjRef::Inode(handle));
        Ok(handle)
    }

    /// Reconciles one inode record against the index.
    fn restore_inode(
        &mut self,
        di: &DiskInode,
        sector_id: u16,
        offset: u32,
    ) -> Result<()> {
        let (handle, do_add) = match self.index.find(di.id) {
            Some(ObjRef::Inode(handle)) => {
                let old = self.inodes.get(handle).ok_or(Error::Inval)?;
                let replace = inode_gets_replaced(old, di)?;
                if replace {
                    // The newer record may name a different
                    // parent; sever the old link first and let
                    // the common path below re-link.
                    self.remove_child(handle);
                    let inode =
                        self.inodes.get_mut(handle).ok_or(Error::Inval)?;
                    inode.update_from_disk(di, sector_id, offset);
                    debug!("inode {}: seq {} supersedes", di.id, di.seq);
                }
                (handle, replace)
            }
            Some(ObjRef::Block(_)) => return Err(Error::Corrupt),
            None => {
                let mut inode = Inode::from_disk(di, sector_id, offset);
                inode.refcnt = 1;
                let handle = self.inodes.alloc(inode)?;
                self.index.insert(di.id, ObjRef::Inode(handle));
                (handle, true)
            }
        };
        if do_add {
            if di.parent_id != disk::ID_NONE {
                let parent = match self.find_inode(di.parent_id) {
                    Ok(parent) => parent,
                    Err(Error::NoEnt) => {
                        self.restore_dummy_inode(di.parent_id, true)?
                    }
                    Err(e) => return Err(e),
                };
                self.add_child(parent, handle)?;
            }
            if di.is_root() {
                self.root = Some(handle);
            }
        }
        if di.id >= self.next_id {
            self.next_id = di.id + 1;
        }
        Ok(())
    }

    /// Reconciles one block record against the index.
    fn restore_block(
        &mut self,
        db: &DiskBlock,
        sector_id: u16,
        offset: u32,
    ) -> Result<()> {
        match self.index.find(db.id) {
            Some(ObjRef::Block(handle)) => {
                let old = self.blocks.get(handle).ok_or(Error::Inval)?;
                if block_gets_replaced(old, db)? {
                    let block =
                        self.blocks.get_mut(handle).ok_or(Error::Inval)?;
                    block.update_from_disk(db, sector_id, offset);
                    debug!("block {}: seq {} supersedes", db.id, db.seq);
                }
            }
            Some(ObjRef::Inode(_)) => return Err(Error::Corrupt),
            None => {
                let block = Block::from_disk(db, sector_id, offset);
                let handle = self.blocks.alloc(block)?;
                self.index.insert(db.id, ObjRef::Block(handle));
                let owner = match self.find_inode(db.inode_id) {
                    Ok(owner) => owner,
                    Err(Error::NoEnt) => {
                        self.restore_dummy_inode(db.inode_id, false)?
                    }
                    Err(e) => return Err(e),
                };
                self.insert_block(owner, handle)?;
            }
        }
        if db.id >= self.next_id {
            self.next_id = db.id + 1;
        }
        Ok(())
    }

    /// Removes everything the scan proved dead: tombstoned
    /// inodes, placeholders no real record ever resolved,
    /// tombstoned and orphaned blocks.  Then recomputes each
    /// surviving file's cached data length.
    ///
    /// Inodes are judged before blocks so that a block orphaned
    /// by its owner's removal is collected in the same sweep.
    pub(crate) fn sweep(&mut self) {
        let entries = self.index.iter().collect::<alloc::vec::Vec<_>>();
        for &(_, obj) in &entries {
            let ObjRef::Inode(handle) = obj else { continue };
            let Some(inode) = self.inodes.get(handle) else { continue };
            let (id, deleted, dummy) =
                (inode.id(), inode.is_deleted(), inode.is_dummy());
            if deleted {
                debug!("sweep: dropping deleted inode {id}");
                self.delete_inode_from_ram(handle);
            } else if dummy {
                warn!("sweep: unresolved reference to inode {id}");
                self.delete_inode_from_ram(handle);
            }
        }
        for &(_, obj) in &entries {
            let ObjRef::Block(handle) = obj else { continue };
            let Some(block) = self.blocks.get(handle) else { continue };
            let (id, deleted, owner) =
                (block.id(), block.is_deleted(), block.inode());
            let orphaned = match owner {
                None => true,
                Some(owner) => self.inodes.get(owner).is_none(),
            };
            if deleted || orphaned {
                debug!("sweep: dropping block {id}");
                self.delete_block_from_ram(handle);
            }
        }
        for &(_, obj) in &entries {
            let ObjRef::Inode(handle) = obj else { continue };
            let Some(inode) = self.inodes.get(handle) else { continue };
            if !inode.is_directory() {
                let data_len = self.calc_data_len(handle);
                if let Some(inode) = self.inodes.get_mut(handle) {
                    inode.data_len = data_len;
                }
            }
        }
    }
}
