// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::{Arc, Mutex};

use crate::Result;

/// The set of primitive operations a volume backend must provide.
///
/// A backend owns one implicit handle: `open_volume` binds it, `close_volume` releases it, and
/// `seek_volume`/`read_volume`/`write_volume` operate on whatever is currently bound. There is no
/// per-open handle value, so at most one volume is open per accessor at any time.
///
/// Every failing operation must leave a description of the failure readable through
/// [`error_message`](VolumeAccessor::error_message) until the next failing call.
pub trait VolumeAccessor {
    /// Performs one-time backend initialization.
    ///
    /// Must be idempotent from the caller's perspective; a backend that verifies a library
    /// identity on startup fails here if the check does not pass.
    fn init(&mut self) -> Result<()>;

    /// Enumerates the names of the volumes currently visible to the backend.
    ///
    /// A zero-count result from the backend is reported as a failure, not as an empty list.
    /// Callers distinguish "enumeration failed" from "no volumes present" on that basis.
    fn volume_names(&mut self) -> Result<Vec<String>>;

    /// Fills `buffer` with the geometry record for the named volume.
    ///
    /// Backends reject buffers shorter than the record (see [`crate::VolumeInfo::ENCODED_LEN`]).
    fn volume_info(&mut self, name: &str, buffer: &mut [u8]) -> Result<()>;

    /// Whether the named volume is currently mounted. Never fails.
    fn is_volume_mounted(&mut self, name: &str) -> bool;

    /// The mount point of the named volume, or an empty string if it is unmounted or unknown.
    fn volume_mount_point(&mut self, name: &str) -> String;

    /// Whether the backend's handle is currently bound to a volume.
    fn is_volume_open(&mut self) -> bool;

    /// Binds the handle to the named volume with the given access bitmask.
    fn open_volume(&mut self, name: &str, access_flags: u32) -> Result<()>;

    /// Releases the handle.
    fn close_volume(&mut self) -> Result<()>;

    /// Positions the handle at the given byte offset.
    fn seek_volume(&mut self, position: u64) -> Result<()>;

    /// Reads exactly `buffer.len()` bytes from the handle's current position.
    ///
    /// Bounds checks have already been applied by the caller; the slice is exactly the bytes to
    /// transfer.
    fn read_volume(&mut self, buffer: &mut [u8]) -> Result<()>;

    /// Writes all of `data` at the handle's current position.
    fn write_volume(&mut self, data: &[u8]) -> Result<()>;

    /// The backend's description of the most recent failing call.
    fn error_message(&mut self) -> String;
}

/// An accessor shared between volumes.
///
/// The single mutex is the exclusion boundary required by the backend's one-handle protocol:
/// every operation on the accessor, including the open-state query, goes through it, so two
/// threads can never interleave an open with a close or observe a torn transition.
pub type SharedAccessor = Arc<Mutex<dyn VolumeAccessor + Send>>;

/// Wraps a backend for sharing between volumes.
pub fn shared<A>(accessor: A) -> SharedAccessor
where
    A: VolumeAccessor + Send + 'static,
{
    Arc::new(Mutex::new(accessor))
}
