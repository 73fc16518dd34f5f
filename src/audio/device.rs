// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fmt;

use super::error::DeviceError;
use super::format::OutputFormat;

/// Identifies one asynchronous write handed to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// An opened output device accepting asynchronous writes of signed 16-bit
/// interleaved frames.
///
/// Devices copy submitted samples, so the caller may reuse its buffer as soon
/// as `submit_write` returns. The request still counts as in flight until
/// `wait_completion` has returned for it.
pub trait AudioDevice: Send {
    /// Queues `frames` frames from `samples` for playback. `linked` names the
    /// request this one should follow without a gap.
    fn submit_write(
        &mut self,
        samples: &[i16],
        frames: usize,
        linked: Option<RequestId>,
    ) -> Result<RequestId, DeviceError>;

    /// Blocks until the request has been played or aborted. Returns the number
    /// of frames the device actually played.
    fn wait_completion(&mut self, request: RequestId) -> Result<usize, DeviceError>;

    /// Asks the device to drop a request. Completion must still be awaited.
    fn abort(&mut self, request: RequestId);

    /// Releases the device. Called once, after every request has completed.
    fn close(&mut self);
}

/// Opens devices for a given output format.
pub trait AudioBackend {
    type Device: AudioDevice + 'static;

    /// A human readable name for logs.
    fn name(&self) -> String;

    fn open(&self, format: OutputFormat) -> Result<Self::Device, DeviceError>;
}
