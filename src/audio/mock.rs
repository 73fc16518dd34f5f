// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::device::{AudioBackend, AudioDevice, RequestId};
use super::error::DeviceError;
use super::format::OutputFormat;

/// Everything a mock device was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Open(OutputFormat),
    Submit {
        request: RequestId,
        frames: usize,
        linked: Option<RequestId>,
    },
    Wait(RequestId),
    Abort(RequestId),
    Close,
}

/// Opens mock devices. Doesn't actually play anything: writes complete
/// synchronously, after an optional latency.
#[derive(Clone)]
pub struct MockBackend {
    name: String,
    events: Arc<Mutex<Vec<DeviceEvent>>>,
    played: Arc<Mutex<Vec<i16>>>,
    fail_open: bool,
    fail_submit_after: Option<usize>,
    latency: Duration,
}

impl MockBackend {
    /// Gets the given mock backend.
    pub fn new(name: &str) -> MockBackend {
        MockBackend {
            name: name.to_string(),
            events: Arc::new(Mutex::new(Vec::new())),
            played: Arc::new(Mutex::new(Vec::new())),
            fail_open: false,
            fail_submit_after: None,
            latency: Duration::ZERO,
        }
    }

    /// Every open attempt fails.
    pub fn failing_open(mut self) -> MockBackend {
        self.fail_open = true;
        self
    }

    /// Submissions past the first `count` fail.
    pub fn failing_submit_after(mut self, count: usize) -> MockBackend {
        self.fail_submit_after = Some(count);
        self
    }

    /// Each write takes this long to complete unless aborted.
    pub fn with_latency(mut self, latency: Duration) -> MockBackend {
        self.latency = latency;
        self
    }

    /// Snapshot of the device event log.
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.events.lock().clone()
    }

    /// Counts logged events matching the predicate.
    pub fn count<F: Fn(&DeviceEvent) -> bool>(&self, predicate: F) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    /// All samples submitted so far, in submission order.
    pub fn played(&self) -> Vec<i16> {
        self.played.lock().clone()
    }
}

impl AudioBackend for MockBackend {
    type Device = MockDevice;

    fn name(&self) -> String {
        format!("{} (Mock)", self.name)
    }

    fn open(&self, format: OutputFormat) -> Result<MockDevice, DeviceError> {
        if self.fail_open {
            return Err(DeviceError::Open(format!("{} refused to open", self.name)));
        }
        info!(device = self.name, %format, "Opening mock device");
        self.events.lock().push(DeviceEvent::Open(format));
        Ok(MockDevice {
            name: self.name.clone(),
            format,
            events: self.events.clone(),
            played: self.played.clone(),
            fail_submit_after: self.fail_submit_after,
            latency: self.latency,
            next_request: 1,
            submitted: 0,
            outstanding: HashMap::new(),
            closed: false,
        })
    }
}

/// A mock device.
pub struct MockDevice {
    name: String,
    format: OutputFormat,
    events: Arc<Mutex<Vec<DeviceEvent>>>,
    played: Arc<Mutex<Vec<i16>>>,
    fail_submit_after: Option<usize>,
    latency: Duration,
    next_request: u64,
    submitted: usize,
    /// Frames and aborted flag per request not yet waited on.
    outstanding: HashMap<RequestId, (usize, bool)>,
    closed: bool,
}

impl AudioDevice for MockDevice {
    fn submit_write(
        &mut self,
        samples: &[i16],
        frames: usize,
        linked: Option<RequestId>,
    ) -> Result<RequestId, DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed);
        }
        if self
            .fail_submit_after
            .is_some_and(|limit| self.submitted >= limit)
        {
            return Err(DeviceError::Stream(format!("{} write failed", self.name)));
        }
        let request = RequestId(self.next_request);
        self.next_request += 1;
        self.submitted += 1;

        let len = (frames * self.format.channels.channels()).min(samples.len());
        self.played.lock().extend_from_slice(&samples[..len]);
        self.outstanding.insert(request, (frames, false));
        self.events.lock().push(DeviceEvent::Submit {
            request,
            frames,
            linked,
        });
        debug!(device = self.name, %request, frames, "Mock write submitted");
        Ok(request)
    }

    fn wait_completion(&mut self, request: RequestId) -> Result<usize, DeviceError> {
        let Some((frames, aborted)) = self.outstanding.remove(&request) else {
            return Err(DeviceError::UnknownRequest(request.0));
        };
        self.events.lock().push(DeviceEvent::Wait(request));
        if aborted {
            return Ok(0);
        }
        if !self.latency.is_zero() {
            spin_sleep::sleep(self.latency);
        }
        Ok(frames)
    }

    fn abort(&mut self, request: RequestId) {
        if let Some(entry) = self.outstanding.get_mut(&request) {
            entry.1 = true;
        }
        self.events.lock().push(DeviceEvent::Abort(request));
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.events.lock().push(DeviceEvent::Close);
        }
    }
}

impl fmt::Display for MockDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_wait() {
        let backend = MockBackend::new("mock");
        let mut device = backend.open(OutputFormat::default()).unwrap();

        let request = device.submit_write(&[1, 2, 3, 4], 2, None).unwrap();
        assert_eq!(device.wait_completion(request).unwrap(), 2);
        assert!(matches!(
            device.wait_completion(request),
            Err(DeviceError::UnknownRequest(_))
        ));
        device.close();
        device.close();

        assert_eq!(backend.played(), vec![1, 2, 3, 4]);
        assert_eq!(
            backend.events(),
            vec![
                DeviceEvent::Open(OutputFormat::default()),
                DeviceEvent::Submit {
                    request,
                    frames: 2,
                    linked: None
                },
                DeviceEvent::Wait(request),
                DeviceEvent::Close,
            ]
        );
    }

    #[test]
    fn test_aborted_write_plays_nothing() {
        let backend = MockBackend::new("mock").with_latency(Duration::from_secs(30));
        let mut device = backend.open(OutputFormat::default()).unwrap();
        let request = device.submit_write(&[0; 8], 4, None).unwrap();
        device.abort(request);
        assert_eq!(device.wait_completion(request).unwrap(), 0);
    }

    #[test]
    fn test_failures() {
        assert!(MockBackend::new("mock")
            .failing_open()
            .open(OutputFormat::default())
            .is_err());

        let backend = MockBackend::new("mock").failing_submit_after(1);
        let mut device = backend.open(OutputFormat::default()).unwrap();
        assert!(device.submit_write(&[0; 2], 1, None).is_ok());
        assert!(matches!(
            device.submit_write(&[0; 2], 1, None),
            Err(DeviceError::Stream(_))
        ));
        device.close();
        assert!(matches!(
            device.submit_write(&[0; 2], 1, None),
            Err(DeviceError::Closed)
        ));
    }
}
