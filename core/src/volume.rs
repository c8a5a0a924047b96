// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{
    sync::{MutexGuard, PoisonError},
    thread,
    time::Duration,
};

use crate::{Access, Error, MediumKind, Result, SharedAccessor, VolumeAccessor};

// Native volume handles are contended by the OS (other processes, auto-mounters), so a freshly
// visible volume often reports busy for a short while. A bounded retry absorbs that without
// hanging indefinitely: 10 attempts, 200 ms apart, blocks the caller for at most ~1.8 s.
const OPEN_ATTEMPTS: u32 = 10;
const OPEN_RETRY_INTERVAL: Duration = Duration::from_millis(200);

impl Volume {
    pub fn new(name: impl Into<String>, accessor: SharedAccessor) -> Self {
        Self {
            name: name.into(),
            accessor,
            medium_kind: MediumKind::Unknown,
        }
    }
}

/// A named logical volume bound to a backend.
///
/// The value itself is lightweight metadata: the actual open/closed state lives in the accessor,
/// which holds one handle shared by every `Volume` built on it. Creating or dropping a `Volume`
/// has no side effects; only [`open`](Volume::open) and [`close`](Volume::close) touch shared
/// backend state.
pub struct Volume {
    name: String,
    accessor: SharedAccessor,
    medium_kind: MediumKind,
}

impl Volume {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accessor(&self) -> &SharedAccessor {
        &self.accessor
    }

    pub fn medium_kind(&self) -> MediumKind {
        self.medium_kind
    }

    pub fn set_medium_kind(&mut self, kind: MediumKind) {
        self.medium_kind = kind;
    }

    /// Fills `buffer` with this volume's geometry record.
    pub fn info(&self, buffer: &mut [u8]) -> Result<()> {
        self.lock().volume_info(&self.name, buffer)
    }

    /// Whether the shared handle is currently open.
    ///
    /// The handle belongs to the accessor, not to this value: after another volume on the same
    /// accessor opens, this returns `true` even though the handle represents that other volume.
    pub fn is_open(&self) -> bool {
        self.lock().is_volume_open()
    }

    /// Whether this volume is currently mounted.
    pub fn is_mounted(&self) -> bool {
        self.lock().is_volume_mounted(&self.name)
    }

    /// This volume's mount point, or an empty string if it is not mounted.
    pub fn mount_point(&self) -> String {
        self.lock().volume_mount_point(&self.name)
    }

    /// Opens this volume with the given access intent, retrying on failure.
    ///
    /// After every failed attempt the handle is closed best-effort, so a partially open handle is
    /// never leaked and a cleanup failure never masks the open failure. If the final attempt
    /// fails, its error (not an aggregate) is propagated, and the handle is guaranteed closed.
    ///
    /// The accessor stays locked for the whole retry sequence: a concurrent open on a shared
    /// accessor cannot interleave with the compensating closes. The calling thread blocks for up
    /// to ~1.8 s before failure is surfaced.
    pub fn open(&self, access: Access) -> Result<()> {
        let mut accessor = self.lock();

        let mut attempt = 1;
        loop {
            match accessor.open_volume(&self.name, access.flags()) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::debug!(
                        volume = %self.name,
                        attempt,
                        %err,
                        "failed to open volume",
                    );

                    // Best-effort compensating close. Its own failure is deliberately ignored;
                    // the error worth reporting is the open failure.
                    let _ = accessor.close_volume();

                    if attempt == OPEN_ATTEMPTS {
                        return Err(err);
                    }
                }
            }

            attempt += 1;
            thread::sleep(OPEN_RETRY_INTERVAL);
        }
    }

    /// Closes the shared handle. No retry; a close is expected to be unconditional.
    pub fn close(&self) -> Result<()> {
        self.lock().close_volume()
    }

    /// Positions the handle at `position` bytes from the start of the volume.
    pub fn seek(&self, position: i64) -> Result<()> {
        if position < 0 {
            return Err(Error::invalid_argument(format!("invalid seek position: {}", position)));
        }

        self.lock().seek_volume(position as u64)
    }

    /// Reads `length` bytes into `buffer` at `offset`.
    ///
    /// Bounds are validated before the backend is involved; a rejected call never produces a
    /// backend error message.
    pub fn read(&self, buffer: &mut [u8], offset: usize, length: usize) -> Result<()> {
        check_bounds(buffer.len(), offset, length)?;

        self.lock().read_volume(&mut buffer[offset..offset + length])
    }

    /// Reads into the whole of `buffer`.
    pub fn read_all(&self, buffer: &mut [u8]) -> Result<()> {
        self.lock().read_volume(buffer)
    }

    /// Writes `length` bytes of `data` starting at `offset`.
    pub fn write(&self, data: &[u8], offset: usize, length: usize) -> Result<()> {
        check_bounds(data.len(), offset, length)?;

        self.lock().write_volume(&data[offset..offset + length])
    }

    /// Writes the whole of `data`.
    pub fn write_all(&self, data: &[u8]) -> Result<()> {
        self.lock().write_volume(data)
    }

    fn lock(&self) -> MutexGuard<'_, dyn VolumeAccessor + Send + 'static> {
        // The accessor holds plain state, and the one-handle protocol stays consistent even if a
        // holder panicked mid-call, so a poisoned lock is recovered rather than propagated.
        self.accessor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_bounds(len: usize, offset: usize, length: usize) -> Result<()> {
    if offset > len {
        return Err(Error::invalid_argument(format!("offset out of bounds: {}", offset)));
    }
    if length > len - offset {
        return Err(Error::invalid_argument(format!("length out of bounds: {}", length)));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{accessor, Error};

    /// A scripted backend with the native layer's one-handle semantics: opening while open
    /// fails, and cleanup closes while closed fail (harmlessly, as `open` ignores them). Call
    /// counts live behind a separate handle so tests can inspect them afterwards.
    #[derive(Default)]
    struct State {
        fail_opens: u32,
        open_name: Option<String>,
        opens: u32,
        closes: u32,
        seeks: Vec<u64>,
        last_error: String,
    }

    struct ScriptedAccessor {
        state: Arc<Mutex<State>>,
    }

    impl State {
        fn fail(&mut self, message: &str) -> Error {
            self.last_error = message.to_owned();

            Error::backend(message)
        }
    }

    impl ScriptedAccessor {
        fn state(&self) -> std::sync::MutexGuard<'_, State> {
            self.state.lock().unwrap()
        }
    }

    impl VolumeAccessor for ScriptedAccessor {
        fn init(&mut self) -> Result<()> {
            Ok(())
        }

        fn volume_names(&mut self) -> Result<Vec<String>> {
            Ok(vec!["sda1".to_owned()])
        }

        fn volume_info(&mut self, _: &str, _: &mut [u8]) -> Result<()> {
            Ok(())
        }

        fn is_volume_mounted(&mut self, _: &str) -> bool {
            false
        }

        fn volume_mount_point(&mut self, _: &str) -> String {
            String::new()
        }

        fn is_volume_open(&mut self) -> bool {
            self.state().open_name.is_some()
        }

        fn open_volume(&mut self, name: &str, _: u32) -> Result<()> {
            let mut state = self.state();
            state.opens += 1;

            if state.open_name.is_some() {
                return Err(state.fail("The volume is already open."));
            }
            if state.fail_opens > 0 {
                state.fail_opens -= 1;

                return Err(state.fail("The device is busy."));
            }

            state.open_name = Some(name.to_owned());

            Ok(())
        }

        fn close_volume(&mut self) -> Result<()> {
            let mut state = self.state();
            state.closes += 1;

            if state.open_name.take().is_none() {
                return Err(state.fail("The volume is not open."));
            }

            Ok(())
        }

        fn seek_volume(&mut self, position: u64) -> Result<()> {
            self.state().seeks.push(position);

            Ok(())
        }

        fn read_volume(&mut self, buffer: &mut [u8]) -> Result<()> {
            buffer.fill(0xa5);

            Ok(())
        }

        fn write_volume(&mut self, _: &[u8]) -> Result<()> {
            Ok(())
        }

        fn error_message(&mut self) -> String {
            self.state().last_error.clone()
        }
    }

    fn scripted_volume(name: &str, fail_opens: u32) -> (Volume, Arc<Mutex<State>>) {
        let state = Arc::new(Mutex::new(State {
            fail_opens,
            ..State::default()
        }));
        let accessor = accessor::shared(ScriptedAccessor { state: state.clone() });

        (Volume::new(name, accessor), state)
    }

    #[test]
    fn open_succeeds_on_first_attempt_without_cleanup() {
        let (volume, state) = scripted_volume("sda1", 0);
        volume.open(Access::Read).unwrap();

        assert!(volume.is_open());
        let state = state.lock().unwrap();
        assert_eq!(1, state.opens);
        assert_eq!(0, state.closes);
    }

    #[test]
    fn open_retries_past_transient_failures() {
        let (volume, state) = scripted_volume("sda1", 3);
        volume.open(Access::ReadWrite).unwrap();

        assert!(volume.is_open());
        let state = state.lock().unwrap();
        assert_eq!(4, state.opens);
        assert_eq!(3, state.closes);
    }

    #[test]
    fn open_surfaces_the_final_attempt_error_after_ten_tries() {
        let (volume, state) = scripted_volume("sda1", u32::MAX);
        let err = volume.open(Access::Read).unwrap_err();

        assert_eq!("The device is busy.", err.to_string());
        assert!(!volume.is_open());
        let state = state.lock().unwrap();
        assert_eq!(10, state.opens);
        assert_eq!(10, state.closes);
    }

    #[test]
    fn second_open_on_a_shared_accessor_takes_over_the_handle() {
        let (volume_a, state) = scripted_volume("sda1", 0);
        let volume_b = Volume::new("sdb1", volume_a.accessor().clone());

        volume_a.open(Access::Read).unwrap();
        volume_b.open(Access::Read).unwrap();

        // The first open attempt for `sdb1` hits the already-open handle; the compensating close
        // releases it and the retry binds it to `sdb1`. Exactly one handle remains open.
        {
            let state = state.lock().unwrap();
            assert_eq!(Some("sdb1"), state.open_name.as_deref());
            assert_eq!(3, state.opens);
            assert_eq!(1, state.closes);
        }
        assert!(volume_a.is_open());
        assert!(volume_b.is_open());
    }

    #[test]
    fn close_delegates_once_and_propagates_failure() {
        let (volume, _) = scripted_volume("sda1", 0);

        let err = volume.close().unwrap_err();
        assert_eq!("The volume is not open.", err.to_string());

        volume.open(Access::Read).unwrap();
        volume.close().unwrap();
        assert!(!volume.is_open());
    }

    #[test]
    fn negative_seek_is_rejected_locally() {
        let (volume, state) = scripted_volume("sda1", 0);

        let err = volume.seek(-1).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(state.lock().unwrap().seeks.is_empty());
    }

    #[test]
    fn zero_seek_reaches_the_backend_exactly_once() {
        let (volume, state) = scripted_volume("sda1", 0);
        volume.seek(0).unwrap();

        assert_eq!(vec![0], state.lock().unwrap().seeks);
    }

    #[test]
    fn read_bounds_are_validated_before_the_backend() {
        let (volume, _) = scripted_volume("sda1", 0);
        let mut buffer = [0u8; 8];

        assert!(volume.read(&mut buffer, 9, 0).unwrap_err().is_invalid_argument());
        assert!(volume.read(&mut buffer, 4, 5).unwrap_err().is_invalid_argument());
        assert!(volume.read(&mut buffer, 8, 1).unwrap_err().is_invalid_argument());

        // Zero-length reads at the very end of the buffer are within bounds.
        volume.read(&mut buffer, 8, 0).unwrap();
        volume.read(&mut buffer, 0, 8).unwrap();
        assert_eq!([0xa5; 8], buffer);
    }

    #[test]
    fn write_bounds_are_validated_before_the_backend() {
        let (volume, _) = scripted_volume("sda1", 0);
        let data = [0u8; 4];

        assert!(volume.write(&data, 5, 0).unwrap_err().is_invalid_argument());
        assert!(volume.write(&data, 0, 5).unwrap_err().is_invalid_argument());
        assert!(volume.write(&data, 2, 3).unwrap_err().is_invalid_argument());

        volume.write(&data, 2, 2).unwrap();
        volume.write_all(&data).unwrap();
    }

    #[test]
    fn medium_kind_defaults_to_unknown() {
        let (volume, _) = scripted_volume("sda1", 0);
        assert_eq!(MediumKind::Unknown, volume.medium_kind());
    }
}
