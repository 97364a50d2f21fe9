// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The on-flash record formats.
//!
//! Every sector begins with a fixed header identifying it as part
//! of the filesystem and marking whether it is the scratch sector.
//! The rest of a sector is a packed log of inode and block records
//! in whatever order the writer appended them, terminated by
//! erased flash (all ones on NOR media).  All multi-byte fields
//! are little-endian; nothing here is aligned, so records are
//! decoded field by field rather than overlaid on structs.
//!
//! Layouts are bit-exact with images produced by the writer:
//!
//! ```text
//! sector header: magic:u32  is_scratch:u8  pad[3]
//! inode record:  magic:u32  id:u32  seq:u32  parent_id:u32
//!                flags:u8  filename_len:u8  filename[filename_len]
//! block record:  magic:u32  id:u32  seq:u32  inode_id:u32
//!                data_len:u16  flags:u8  data[data_len]
//! ```

use crate::result::{Error, Result};
use alloc::vec::Vec;
use static_assertions::const_assert;

/// Magic number identifying a filesystem sector header.
pub const SECTOR_MAGIC: u32 = 0xb98a_31e2;

/// Magic number opening an inode record.
pub const INODE_MAGIC: u32 = 0x925f_8bc0;

/// Magic number opening a block record.
pub const BLOCK_MAGIC: u32 = 0x06c8_7fde;

/// An erased 32-bit word of NOR flash.  Probing this value means
/// the written region of the sector has ended.
pub const ERASED_WORD: u32 = 0xffff_ffff;

/// Reserved object id meaning "no parent".
pub const ID_NONE: u32 = 0xffff_ffff;

/// The id of the root directory inode.
pub const ROOT_ID: u32 = 1;

/// `is_scratch` byte values.  Anything else is corruption.
const SCRATCH_SET: u8 = 0xff;
const SCRATCH_UNSET: u8 = 0x00;

/// Maximum length of a filename, in bytes.
pub const MAX_FILENAME_LEN: usize = 255;

/// Maximum length of a data block's payload, in bytes.
pub const MAX_BLOCK_DATA_LEN: u16 = 2048;

/// On-disk inode flag bits.  `Dummy` is an in-RAM-only state and
/// has no bit here.
pub const DISK_INODE_F_DIRECTORY: u8 = 0x01;
pub const DISK_INODE_F_DELETED: u8 = 0x02;

/// On-disk block flag bits.
pub const DISK_BLOCK_F_DELETED: u8 = 0x01;

// The scan cursor advances by a record's full size each step;
// both fixed headers exceed the 4-byte probe, so the cursor
// strictly advances and the scan terminates.
const_assert!(DiskInode::HDR_SIZE >= 4);
const_assert!(DiskBlock::HDR_SIZE >= 4);

fn get_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn get_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

/// A decoded sector header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DiskSector {
    scratch: u8,
}

impl DiskSector {
    /// Size of the header on flash, including padding.
    pub const SIZE: usize = 8;

    pub fn new(is_scratch: bool) -> DiskSector {
        let scratch = if is_scratch { SCRATCH_SET } else { SCRATCH_UNSET };
        DiskSector { scratch }
    }

    /// Decodes and validates a sector header.
    pub fn decode(buf: &[u8]) -> Result<DiskSector> {
        if buf.len() < Self::SIZE {
            return Err(Error::Corrupt);
        }
        if get_u32(buf, 0) != SECTOR_MAGIC {
            return Err(Error::Corrupt);
        }
        let scratch = buf[4];
        if scratch != SCRATCH_SET && scratch != SCRATCH_UNSET {
            return Err(Error::Corrupt);
        }
        Ok(DiskSector { scratch })
    }

    pub fn is_scratch(&self) -> bool {
        self.scratch == SCRATCH_SET
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[..4].copy_from_slice(&SECTOR_MAGIC.to_le_bytes());
        buf[4] = self.scratch;
        buf
    }
}

/// A decoded inode record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiskInode {
    pub id: u32,
    pub seq: u32,
    pub parent_id: u32,
    pub flags: u8,
    pub filename: Vec<u8>,
}

impl DiskInode {
    /// Size of the fixed portion of the record on flash.
    pub const HDR_SIZE: usize = 18;

    /// Validates the fixed header and returns the number of
    /// trailing filename bytes.
    pub fn trailing_len(hdr: &[u8]) -> Result<usize> {
        if hdr.len() < Self::HDR_SIZE || get_u32(hdr, 0) != INODE_MAGIC {
            return Err(Error::Corrupt);
        }
        Ok(hdr[17] as usize)
    }

    /// Decodes a complete record from its fixed header and the
    /// trailing filename bytes.
    pub fn decode(hdr: &[u8], filename: &[u8]) -> Result<DiskInode> {
        let nlen = Self::trailing_len(hdr)?;
        if filename.len() != nlen {
            return Err(Error::Corrupt);
        }
        Ok(DiskInode {
            id: get_u32(hdr, 4),
            seq: get_u32(hdr, 8),
            parent_id: get_u32(hdr, 12),
            flags: hdr[16],
            filename: filename.to_vec(),
        })
    }

    /// The full size of this record on flash.
    pub fn size(&self) -> u32 {
        (Self::HDR_SIZE + self.filename.len()) as u32
    }

    /// Whether this record describes the root directory.
    pub fn is_root(&self) -> bool {
        self.id == ROOT_ID
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size() as usize);
        buf.extend_from_slice(&INODE_MAGIC.to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.seq.to_le_bytes());
        buf.extend_from_slice(&self.parent_id.to_le_bytes());
        buf.push(self.flags);
        buf.push(self.filename.len() as u8);
        buf.extend_from_slice(&self.filename);
        buf
    }
}

/// A decoded block record.  The payload is not decoded with the
/// header; the scanner skips over it and readers fetch it from
/// flash on demand.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DiskBlock {
    pub id: u32,
    pub seq: u32,
    pub inode_id: u32,
    pub data_len: u16,
    pub flags: u8,
}

impl DiskBlock {
    /// Size of the fixed portion of the record on flash.
    pub const HDR_SIZE: usize = 19;

    /// Decodes and validates a block record header.
    pub fn decode(hdr: &[u8]) -> Result<DiskBlock> {
        if hdr.len() < Self::HDR_SIZE || get_u32(hdr, 0) != BLOCK_MAGIC {
            return Err(Error::Corrupt);
        }
        let data_len = get_u16(hdr, 16);
        if data_len > MAX_BLOCK_DATA_LEN {
            return Err(Error::Corrupt);
        }
        Ok(DiskBlock {
            id: get_u32(hdr, 4),
            seq: get_u32(hdr, 8),
            inode_id: get_u32(hdr, 12),
            data_len,
            flags: hdr[18],
        })
    }

    /// The full size of this record on flash, payload included.
    pub fn size(&self) -> u32 {
        Self::HDR_SIZE as u32 + self.data_len as u32
    }

    pub fn encode(&self) -> [u8; Self::HDR_SIZE] {
        let mut buf = [0u8; Self::HDR_SIZE];
        buf[..4].copy_from_slice(&BLOCK_MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&self.id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.seq.to_le_bytes());
        buf[12..16].copy_from_slice(&self.inode_id.to_le_bytes());
        buf[16..18].copy_from_slice(&self.data_len.to_le_bytes());
        buf[18] = self.flags;
        buf
    }
}
