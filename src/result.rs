// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::fmt;

/// Various errors
#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub enum Error {
    /// The flash HAL refused a read.
    Flash,
    /// A sector-relative access ran past the end of the sector.
    Range,
    /// The probed word was erased flash; ends a sector scan.
    Empty,
    /// An on-disk structure failed validation, or a global
    /// invariant (root present, scratch present) does not hold.
    Corrupt,
    /// An object pool is exhausted.
    NoMem,
    /// No object with the requested id exists.
    NoEnt,
    /// Programmer error: an argument that cannot occur.
    Inval,
}

impl Error {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flash => "flash read failed",
            Self::Range => "access beyond end of sector",
            Self::Empty => "erased flash region",
            Self::Corrupt => "file system corrupt",
            Self::NoMem => "object pool exhausted",
            Self::NoEnt => "no such object",
            Self::Inval => "invalid argument",
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> core::result::Result<(), fmt::Error> {
        write!(f, "{}", self.as_str())
    }
}

pub type Result<T> = core::result::Result<T, Error>;
