// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// An in-memory volume backend. It implements the accessor contract against `Vec<u8>`-backed
// media while reproducing the observable behavior of the native backend: one implicit handle,
// sector-aligned seeks, whole-sector transfers, and an error string readable after every failing
// call. Useful for exercising the volume layer without hardware, and for tests.

use volio::{Access, Error, MediumKind, Result, VolumeAccessor, VolumeInfo};

impl MemVolume {
    /// Creates a zero-filled volume with the given geometry.
    pub fn new(
        name: impl Into<String>,
        bytes_per_sector: u32,
        start_sector: u64,
        num_sectors: u64,
    ) -> Self {
        let size = num_sectors as usize * bytes_per_sector as usize;

        Self {
            name: name.into(),
            info: VolumeInfo {
                bytes_per_sector,
                start_sector,
                num_sectors,
                medium_kind: MediumKind::Fixed,
            },
            data: vec![0; size],
            mount_point: None,
        }
    }

    pub fn with_medium_kind(mut self, kind: MediumKind) -> Self {
        self.info.medium_kind = kind;

        self
    }

    pub fn with_mount_point(mut self, mount_point: impl Into<String>) -> Self {
        self.mount_point = Some(mount_point.into());

        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// One simulated medium: a name, its geometry record, and backing bytes.
pub struct MemVolume {
    name: String,
    info: VolumeInfo,
    data: Vec<u8>,
    mount_point: Option<String>,
}

impl MemAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a volume to the set visible to enumeration.
    pub fn add_volume(&mut self, volume: MemVolume) {
        self.volumes.push(volume);
    }

    /// Makes the next `count` open attempts fail with a device-busy message, to exercise the
    /// caller's retry path.
    pub fn fail_next_opens(&mut self, count: u32) {
        self.busy_opens = count;
    }

    fn fail<T>(&mut self, message: impl Into<String>) -> Result<T> {
        let message = message.into();
        tracing::debug!(%message, "backend failure");
        self.last_error = message.clone();

        Err(Error::backend(message))
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.volumes.iter().position(|it| it.name == name)
    }

    /// The open state, or a recorded not-open failure.
    fn open_state(&mut self) -> Result<OpenState> {
        match self.open {
            Some(state) => Ok(state),
            None => self.fail("The volume is not open."),
        }
    }
}

/// A backend over a set of in-memory volumes.
///
/// Like the native backend, it has exactly one handle: `open_volume` fails while another volume
/// is open, and the positioned I/O calls operate on whichever volume the handle is bound to.
#[derive(Default)]
pub struct MemAccessor {
    volumes: Vec<MemVolume>,
    open: Option<OpenState>,
    busy_opens: u32,
    last_error: String,
    initialized: bool,
}

#[derive(Clone, Copy)]
struct OpenState {
    volume: usize,
    access_flags: u32,
    position: u64,
}

impl VolumeAccessor for MemAccessor {
    fn init(&mut self) -> Result<()> {
        // Nothing to load or verify; repeat calls are no-ops, as the contract requires.
        if !self.initialized {
            self.initialized = true;
            tracing::debug!(volumes = self.volumes.len(), "initialized in-memory backend");
        }

        Ok(())
    }

    fn volume_names(&mut self) -> Result<Vec<String>> {
        // A zero-count enumeration is a failure, not an empty list. Callers depend on the
        // distinction, so it is preserved here exactly as the native backend behaves.
        if self.volumes.is_empty() {
            return self.fail("No volumes are present.");
        }

        Ok(self.volumes.iter().map(|it| it.name.clone()).collect())
    }

    fn volume_info(&mut self, name: &str, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() < VolumeInfo::ENCODED_LEN {
            return self.fail(format!(
                "The size of the buffer for information about the volume must be at least {} bytes.",
                VolumeInfo::ENCODED_LEN,
            ));
        }

        let Some(index) = self.find(name) else {
            return self.fail(format!("No such volume: {}", name));
        };

        let mut record = [0; VolumeInfo::ENCODED_LEN];
        self.volumes[index].info.encode(&mut record);
        buffer[..VolumeInfo::ENCODED_LEN].copy_from_slice(&record);

        Ok(())
    }

    fn is_volume_mounted(&mut self, name: &str) -> bool {
        self.find(name)
            .map(|index| self.volumes[index].mount_point.is_some())
            .unwrap_or(false)
    }

    fn volume_mount_point(&mut self, name: &str) -> String {
        self.find(name)
            .and_then(|index| self.volumes[index].mount_point.clone())
            .unwrap_or_default()
    }

    fn is_volume_open(&mut self) -> bool {
        self.open.is_some()
    }

    fn open_volume(&mut self, name: &str, access_flags: u32) -> Result<()> {
        if self.open.is_some() {
            return self.fail("The volume is already open.");
        }
        if self.busy_opens > 0 {
            self.busy_opens -= 1;

            return self.fail("The device is busy.");
        }
        if access_flags & Access::ReadWrite.flags() == 0
            || access_flags & !Access::ReadWrite.flags() != 0
        {
            return self.fail(format!("Invalid access flags: {:#04b}", access_flags));
        }

        let Some(index) = self.find(name) else {
            return self.fail(format!("No such volume: {}", name));
        };

        self.open = Some(OpenState {
            volume: index,
            access_flags,
            position: 0,
        });
        tracing::debug!(volume = name, access_flags, "opened volume");

        Ok(())
    }

    fn close_volume(&mut self) -> Result<()> {
        if self.open.take().is_none() {
            return self.fail("The volume is not open.");
        }
        tracing::debug!("closed volume");

        Ok(())
    }

    fn seek_volume(&mut self, position: u64) -> Result<()> {
        let state = self.open_state()?;

        let bytes_per_sector = u64::from(self.volumes[state.volume].info.bytes_per_sector);
        if position % bytes_per_sector != 0 {
            return self.fail("The seek position is not aligned with the start of a sector.");
        }

        self.open = Some(OpenState { position, ..state });

        Ok(())
    }

    fn read_volume(&mut self, buffer: &mut [u8]) -> Result<()> {
        let state = self.open_state()?;

        if state.access_flags & Access::READ_FLAG == 0 {
            return self.fail("The volume is not open for reading.");
        }

        let volume = &self.volumes[state.volume];
        if buffer.len() % volume.info.bytes_per_sector as usize != 0 {
            return self.fail("The length is not an integral multiple of the sector length.");
        }

        let start = state.position as usize;
        let Some(source) = volume.data.get(start..start + buffer.len()) else {
            return self.fail("An error occurred when reading the volume.");
        };
        buffer.copy_from_slice(source);

        self.open = Some(OpenState {
            position: state.position + buffer.len() as u64,
            ..state
        });

        Ok(())
    }

    fn write_volume(&mut self, data: &[u8]) -> Result<()> {
        let state = self.open_state()?;

        if state.access_flags & Access::WRITE_FLAG == 0 {
            return self.fail("The volume is not open for writing.");
        }

        let volume = &mut self.volumes[state.volume];
        if data.len() % volume.info.bytes_per_sector as usize != 0 {
            return self.fail("The length is not an integral multiple of the sector length.");
        }

        let start = state.position as usize;
        let Some(target) = volume.data.get_mut(start..start + data.len()) else {
            return self.fail("An error occurred when writing the volume.");
        };
        target.copy_from_slice(data);

        self.open = Some(OpenState {
            position: state.position + data.len() as u64,
            ..state
        });

        Ok(())
    }

    fn error_message(&mut self) -> String {
        self.last_error.clone()
    }
}
