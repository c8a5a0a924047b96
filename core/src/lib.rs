// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// An abstraction over raw block storage devices. A [`Volume`] names a device as the platform
// knows it and binds it to a [`VolumeAccessor`], the capability object that performs the actual
// native I/O. The volume layer adds argument validation, open-with-retry, and decoding of the
// fixed geometry record on top of the accessor primitives.
//
// The accessor exposes a single implicit handle: at most one volume is open per accessor at any
// time, which is why accessors are shared behind one mutex (see [`SharedAccessor`]) rather than
// cloned per volume.

mod accessor;
mod block;
mod error;
mod volume;

pub use accessor::{shared, SharedAccessor, VolumeAccessor};
pub use block::{BlockVolume, VolumeInfo};
pub use error::{Error, Result};
pub use volume::Volume;

/// The intent with which a volume is opened.
///
/// Each intent maps to a bitmask understood by the native layer; the bit assignments are part of
/// the wire contract and must not change.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    /// The native bit for read access.
    pub const READ_FLAG: u32 = 1 << 0;
    /// The native bit for write access.
    pub const WRITE_FLAG: u32 = 1 << 1;

    /// Returns the native access bitmask for this intent.
    pub fn flags(self) -> u32 {
        match self {
            Self::Read => Self::READ_FLAG,
            Self::Write => Self::WRITE_FLAG,
            Self::ReadWrite => Self::READ_FLAG | Self::WRITE_FLAG,
        }
    }
}

/// Classification of a volume's physical medium.
///
/// The discriminants are the ordinals asserted against the native layer's own constants; do not
/// reorder them.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(u16)]
pub enum MediumKind {
    #[default]
    Unknown = 0,
    Removable = 1,
    Fixed = 2,
}

impl MediumKind {
    /// Maps a wire ordinal to a medium kind.
    ///
    /// An unrecognized ordinal yields [`MediumKind::Unknown`] rather than an error: a medium
    /// classification this layer does not know about must not block use of the volume.
    pub fn from_index(index: u16) -> Self {
        match index {
            1 => Self::Removable,
            2 => Self::Fixed,
            _ => Self::Unknown,
        }
    }

    /// The wire ordinal of this medium kind.
    pub fn index(self) -> u16 {
        self as u16
    }
}
