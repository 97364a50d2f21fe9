// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test fixtures: flash images built in memory, and a logical
//! snapshot of a mounted filesystem for structural comparison.

use crate::disk::{
    DISK_INODE_F_DIRECTORY, DiskBlock, DiskInode, DiskSector, ID_NONE,
};
use crate::flash::{Flash, MemFlash};
use crate::fs::{Filesystem, SectorDesc};
use crate::hash::ObjRef;
use crate::result::Result;
use alloc::vec;
use alloc::vec::Vec;

/// Length of every generated sector.
pub(crate) const SECTOR_LEN: usize = 512;

pub(crate) fn inode_rec(
    id: u32,
    seq: u32,
    parent_id: u32,
    flags: u8,
    name: &[u8],
) -> Vec<u8> {
    DiskInode { id, seq, parent_id, flags, filename: name.to_vec() }.encode()
}

pub(crate) fn block_rec(
    id: u32,
    seq: u32,
    inode_id: u32,
    flags: u8,
    data: &[u8],
) -> Vec<u8> {
    let db = DiskBlock {
        id,
        seq,
        inode_id,
        data_len: data.len() as u16,
        flags,
    };
    let mut bytes = db.encode().to_vec();
    bytes.extend_from_slice(data);
    bytes
}

/// Builds one sector: header, then the given records, then an
/// erased tail.
pub(crate) fn sector(is_scratch: bool, records: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = vec![0xffu8; SECTOR_LEN];
    buf[..DiskSector::SIZE]
        .copy_from_slice(&DiskSector::new(is_scratch).encode());
    let mut cur = DiskSector::SIZE;
    for rec in records {
        buf[cur..cur + rec.len()].copy_from_slice(rec);
        cur += rec.len();
    }
    buf
}

/// Concatenates sectors into a device image and the matching
/// descriptor table.
pub(crate) fn image(sectors: &[Vec<u8>]) -> (Vec<u8>, Vec<SectorDesc>) {
    let mut img = Vec::new();
    let mut descs = Vec::new();
    for sector in sectors {
        descs.push(SectorDesc {
            offset: img.len() as u32,
            length: sector.len() as u32,
        });
        img.extend_from_slice(sector);
    }
    (img, descs)
}

/// Mounts the image, returning the outcome together with the
/// filesystem for inspection.
pub(crate) fn mount<'a>(
    img: &'a [u8],
    descs: &[SectorDesc],
) -> (Result<()>, Filesystem<MemFlash<'a>>) {
    let mut fs = Filesystem::new(MemFlash::new(img), 64, 64);
    let result = fs.detect(descs);
    (result, fs)
}

/// The logical state of one indexed object, with physical
/// placement erased.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub(crate) enum Snap {
    Inode {
        id: u32,
        dir: bool,
        deleted: bool,
        dummy: bool,
        name: Vec<u8>,
        parent: Option<u32>,
        children: Vec<u32>,
        data_len: u32,
        blocks: Vec<(u32, u16)>,
    },
    Block {
        id: u32,
        deleted: bool,
        owner: Option<u32>,
        data_len: u16,
    },
}

/// Captures the logical state of every indexed object, sorted so
/// two structurally equal filesystems compare equal.
pub(crate) fn snapshot<F: Flash>(fs: &Filesystem<F>) -> Vec<Snap> {
    let mut snaps = Vec::new();
    for (id, obj) in fs.index.iter() {
        let snap = match obj {
            ObjRef::Inode(h) => {
                let inode = fs.inode(h).expect("indexed inode is live");
                let mut children = inode
                    .children()
                    .iter()
                    .filter_map(|&c| fs.inode(c))
                    .map(|c| c.id())
                    .collect::<Vec<_>>();
                children.sort_unstable();
                let mut blocks = inode
                    .blocks()
                    .iter()
                    .filter_map(|&b| fs.block(b))
                    .map(|b| (b.id(), b.data_len()))
                    .collect::<Vec<_>>();
                blocks.sort_unstable();
                Snap::Inode {
                    id,
                    dir: inode.is_directory(),
                    deleted: inode.is_deleted(),
                    dummy: inode.is_dummy(),
                    name: inode.filename().to_vec(),
                    parent: inode
                        .parent()
                        .and_then(|p| fs.inode(p))
                        .map(|p| p.id()),
                    children,
                    data_len: inode.data_len(),
                    blocks,
                }
            }
            ObjRef::Block(h) => {
                let block = fs.block(h).expect("indexed block is live");
                Snap::Block {
                    id,
                    deleted: block.is_deleted(),
                    owner: block
                        .inode()
                        .and_then(|i| fs.inode(i))
                        .map(|i| i.id()),
                    data_len: block.data_len(),
                }
            }
        };
        snaps.push(snap);
    }
    snaps.sort();
    snaps
}

/// Writes the live index back out as a fresh image: every inode
/// and block re-encoded at sequence zero into one data sector,
/// plus a scratch sector.
pub(crate) fn serialize<F: Flash>(
    fs: &Filesystem<F>,
) -> (Vec<u8>, Vec<SectorDesc>) {
    let mut records = Vec::new();
    for (id, obj) in fs.index.iter() {
        match obj {
            ObjRef::Inode(h) => {
                let inode = fs.inode(h).expect("indexed inode is live");
                let parent = inode
                    .parent()
                    .and_then(|p| fs.inode(p))
                    .map(|p| p.id())
                    .unwrap_or(ID_NONE);
                let flags = if inode.is_directory() {
                    DISK_INODE_F_DIRECTORY
                } else {
                    0
                };
                records.push(inode_rec(id, 0, parent, flags, inode.filename()));
            }
            ObjRef::Block(h) => {
                let block = fs.block(h).expect("indexed block is live");
                let owner = block
                    .inode()
                    .and_then(|i| fs.inode(i))
                    .map(|i| i.id())
                    .expect("live block has an owner");
                let data = vec![0xaau8; block.data_len() as usize];
                records.push(block_rec(id, 0, owner, 0, &data));
            }
        }
    }
    let total = records.iter().map(Vec::len).sum::<usize>();
    assert!(DiskSector::SIZE + total <= SECTOR_LEN);
    image(&[sector(false, &records), sector(true, &[])])
}
