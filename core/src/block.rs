// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::ops::{Deref, DerefMut};

use crate::{MediumKind, Result, SharedAccessor, Volume};

impl VolumeInfo {
    /// The exact size of the wire-format record: bytesPerSector(4) | startSector(8) |
    /// numSectors(8) | mediumKindIndex(2).
    pub const ENCODED_LEN: usize = 22;

    /// Decodes the wire-format geometry record.
    ///
    /// The record is a flat sequence of little-endian unsigned fields; there are no length
    /// prefixes and no padding, so decoding is unconditional. An out-of-range medium kind index
    /// decodes to [`MediumKind::Unknown`].
    pub fn decode(buffer: &[u8; Self::ENCODED_LEN]) -> Self {
        Self {
            bytes_per_sector: read_u32_le(buffer, 0),
            start_sector: read_u64_le(buffer, 4),
            num_sectors: read_u64_le(buffer, 12),
            medium_kind: MediumKind::from_index(read_u16_le(buffer, 20)),
        }
    }

    /// Encodes this record into its wire format. Bit-exact inverse of [`decode`](Self::decode)
    /// for in-range medium kinds.
    pub fn encode(&self, buffer: &mut [u8; Self::ENCODED_LEN]) {
        buffer[0..4].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        buffer[4..12].copy_from_slice(&self.start_sector.to_le_bytes());
        buffer[12..20].copy_from_slice(&self.num_sectors.to_le_bytes());
        buffer[20..22].copy_from_slice(&self.medium_kind.index().to_le_bytes());
    }
}

/// The decoded geometry record of a block volume.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct VolumeInfo {
    /// Sector size in bytes.
    pub bytes_per_sector: u32,
    /// First sector index of this volume within its parent medium.
    pub start_sector: u64,
    /// Sector count.
    pub num_sectors: u64,
    /// Medium classification.
    pub medium_kind: MediumKind,
}

fn read_u16_le(buffer: &[u8], offset: usize) -> u16 {
    let mut bytes = [0; 2];
    bytes.copy_from_slice(&buffer[offset..offset + 2]);

    u16::from_le_bytes(bytes)
}

fn read_u32_le(buffer: &[u8], offset: usize) -> u32 {
    let mut bytes = [0; 4];
    bytes.copy_from_slice(&buffer[offset..offset + 4]);

    u32::from_le_bytes(bytes)
}

fn read_u64_le(buffer: &[u8], offset: usize) -> u64 {
    let mut bytes = [0; 8];
    bytes.copy_from_slice(&buffer[offset..offset + 8]);

    u64::from_le_bytes(bytes)
}

impl BlockVolume {
    pub fn new(name: impl Into<String>, accessor: SharedAccessor) -> Self {
        Self {
            volume: Volume::new(name, accessor),
            bytes_per_sector: 0,
            start_sector: 0,
            num_sectors: 0,
        }
    }
}

/// A [`Volume`] on sector-oriented media, with decoded geometry.
///
/// The geometry fields hold their zero defaults until the first successful
/// [`update_info`](BlockVolume::update_info); until then they must not be treated as meaningful.
pub struct BlockVolume {
    volume: Volume,
    bytes_per_sector: u32,
    start_sector: u64,
    num_sectors: u64,
}

impl BlockVolume {
    pub fn bytes_per_sector(&self) -> u32 {
        self.bytes_per_sector
    }

    pub fn start_sector(&self) -> u64 {
        self.start_sector
    }

    pub fn num_sectors(&self) -> u64 {
        self.num_sectors
    }

    /// Fetches and decodes this volume's geometry record.
    ///
    /// The three geometry fields and the medium kind are updated together from one record; on
    /// failure nothing is updated.
    pub fn update_info(&mut self) -> Result<()> {
        let mut buffer = [0; VolumeInfo::ENCODED_LEN];
        self.volume.info(&mut buffer)?;

        let info = VolumeInfo::decode(&buffer);
        tracing::debug!(volume = %self.volume.name(), ?info, "decoded volume geometry");

        self.bytes_per_sector = info.bytes_per_sector;
        self.start_sector = info.start_sector;
        self.num_sectors = info.num_sectors;
        self.volume.set_medium_kind(info.medium_kind);

        Ok(())
    }
}

impl Deref for BlockVolume {
    type Target = Volume;

    fn deref(&self) -> &Volume {
        &self.volume
    }
}

impl DerefMut for BlockVolume {
    fn deref_mut(&mut self) -> &mut Volume {
        &mut self.volume
    }
}
