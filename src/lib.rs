// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A small log-structured filesystem for embedded NOR flash.
//!
//! Flash erases in large units (sectors), erased bits read back
//! as ones, and a bit can only be driven from one to zero until
//! the next erase.  A filesystem for such media cannot update
//! records in place; instead it appends a new generation of the
//! record, carrying a per-object sequence number, and reclaims
//! space wholesale by copying live records out of a sector and
//! erasing it (one reserved *scratch* sector stages that copy).
//!
//! The consequence is that mounting is a reconstruction problem:
//! the directory tree and the file data index exist nowhere on
//! the medium in assembled form.  This crate implements that
//! reconstruction.  [`Filesystem::detect`] classifies every
//! candidate sector by its header, scans the record log of each
//! data sector, reconciles the generations of every object
//! (newest sequence number wins, regardless of the order in
//! which sectors or records are discovered), resolves forward
//! references through placeholder inodes, and finally sweeps
//! away tombstones, unresolved placeholders, and orphaned
//! blocks.  A torn write or a rotted sector costs only what was
//! stored there; everything else is recovered.
//!
//! The crate is `no_std` (plus `alloc`); the flash device is
//! abstracted behind the [`Flash`] trait and all engine state
//! lives in the [`Filesystem`] aggregate.

#![cfg_attr(not(any(test, clippy)), no_std)]
#![forbid(unsafe_op_in_unsafe_fn)]

extern crate alloc;

mod block;
pub mod disk;
mod flash;
mod fs;
mod hash;
mod inode;
mod pool;
mod restore;
mod result;

pub use block::{Block, BlockFlags};
pub use flash::{Flash, MemFlash};
pub use fs::{Filesystem, SECTOR_ID_NONE, SectorDesc};
pub use inode::{Inode, InodeFlags};
pub use pool::Handle;
pub use result::{Error, Result};

#[cfg(test)]
mod testimg;
