// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The flash HAL seam.
//!
//! The restore engine only ever reads, and only ever at explicit
//! positions, so the entire device interface is one operation.
//! Sector bounds are enforced by the caller against its sector
//! table; the device itself just honors absolute offsets.

use crate::result::{Error, Result};

/// A read-only flash device.
pub trait Flash {
    /// Reads `dst.len()` bytes starting at the absolute device
    /// offset `offset`.  Fails with `Error::Flash` if the medium
    /// refuses, including reads past the end of the device.
    fn read(&self, offset: u32, dst: &mut [u8]) -> Result<()>;
}

/// A flash device backed by a borrowed byte slice, for RAM-backed
/// media and for tests.
pub struct MemFlash<'a> {
    data: &'a [u8],
}

impl<'a> MemFlash<'a> {
    pub fn new(data: &'a [u8]) -> MemFlash<'a> {
        MemFlash { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Flash for MemFlash<'_> {
    fn read(&self, offset: u32, dst: &mut [u8]) -> Result<()> {
        let offset = offset as usize;
        let end = offset.checked_add(dst.len()).ok_or(Error::Flash)?;
        if end > self.data.len() {
            return Err(Error::Flash);
        }
        dst.copy_from_slice(&self.data[offset..end]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_within_bounds() {
        let data = [1u8, 2, 3, 4, 5];
        let flash = MemFlash::new(&data);
        let mut buf = [0u8; 2];
        flash.read(2, &mut buf).unwrap();
        assert_eq!(buf, [3, 4]);
    }

    #[test]
    fn read_past_end_fails() {
        let data = [0u8; 4];
        let flash = MemFlash::new(&data);
        let mut buf = [0u8; 2];
        assert_eq!(flash.read(3, &mut buf), Err(Error::Flash));
        assert_eq!(flash.read(u32::MAX, &mut buf), Err(Error::Flash));
    }
}
