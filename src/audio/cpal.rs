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
use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, span, Level};

use super::device::{AudioBackend, AudioDevice, RequestId};
use super::error::DeviceError;
use super::format::OutputFormat;

/// Upper bound on how long a single write may take to drain. Only hit when
/// the host stops calling back.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(5);

/// A write waiting to be played by the stream callback.
struct PendingWrite {
    request: RequestId,
    samples: Vec<i16>,
    position: usize,
    frames: usize,
}

#[derive(Default)]
struct WriteQueue {
    pending: VecDeque<PendingWrite>,
    /// Frames played per finished request, until someone waits on it.
    completed: HashMap<RequestId, usize>,
    failed: Option<String>,
    next_request: u64,
}

/// The write queue shared between the device handle and the cpal callback.
#[derive(Default)]
struct Shared {
    queue: Mutex<WriteQueue>,
    completion: Condvar,
}

impl Shared {
    fn submit(&self, samples: Vec<i16>, frames: usize) -> Result<RequestId, DeviceError> {
        let mut queue = self.queue.lock();
        if let Some(reason) = &queue.failed {
            return Err(DeviceError::Stream(reason.clone()));
        }
        queue.next_request += 1;
        let request = RequestId(queue.next_request);
        queue.pending.push_back(PendingWrite {
            request,
            samples,
            position: 0,
            frames,
        });
        Ok(request)
    }

    /// Copies queued samples into the host buffer, completing writes as they
    /// drain. Anything left over is silence.
    fn fill(&self, data: &mut [i16], channels: usize) {
        let mut guard = self.queue.lock();
        let queue = &mut *guard;
        let mut filled = 0;
        let mut any_completed = false;
        while filled < data.len() {
            let Some(front) = queue.pending.front_mut() else {
                break;
            };
            let remaining = &front.samples[front.position..];
            let take = remaining.len().min(data.len() - filled);
            data[filled..filled + take].copy_from_slice(&remaining[..take]);
            front.position += take;
            filled += take;

            if front.position == front.samples.len() {
                let done = front.request;
                let frames = front.position / channels;
                queue.pending.pop_front();
                queue.completed.insert(done, frames);
                any_completed = true;
            }
        }
        data[filled..].fill(0);
        if any_completed {
            self.completion.notify_all();
        }
    }

    fn wait(&self, request: RequestId) -> Result<usize, DeviceError> {
        let mut queue = self.queue.lock();
        loop {
            if let Some(frames) = queue.completed.remove(&request) {
                return Ok(frames);
            }
            if let Some(reason) = &queue.failed {
                return Err(DeviceError::Stream(reason.clone()));
            }
            if !queue.pending.iter().any(|w| w.request == request) {
                return Err(DeviceError::UnknownRequest(request.0));
            }
            if self
                .completion
                .wait_for(&mut queue, COMPLETION_TIMEOUT)
                .timed_out()
            {
                return Err(DeviceError::Stream(format!("{} timed out", request)));
            }
        }
    }

    /// Drops a write from the queue, completing it with whatever was played.
    fn abort(&self, request: RequestId, channels: usize) {
        let mut queue = self.queue.lock();
        if let Some(index) = queue.pending.iter().position(|w| w.request == request) {
            if let Some(write) = queue.pending.remove(index) {
                queue.completed.insert(request, write.position / channels);
            }
            self.completion.notify_all();
        }
    }

    fn fail(&self, reason: String) {
        self.queue.lock().failed = Some(reason);
        self.completion.notify_all();
    }
}

/// Opens cpal output devices.
pub struct CpalBackend {
    /// None picks the host's default output device.
    device_name: Option<String>,
}

impl CpalBackend {
    pub fn new(device_name: Option<String>) -> CpalBackend {
        CpalBackend { device_name }
    }
}

impl AudioBackend for CpalBackend {
    type Device = CpalDevice;

    fn name(&self) -> String {
        self.device_name
            .clone()
            .unwrap_or_else(|| "default".to_string())
    }

    fn open(&self, format: OutputFormat) -> Result<CpalDevice, DeviceError> {
        let shared = Arc::new(Shared::default());
        let (startup_tx, startup_rx) = crossbeam_channel::bounded(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        // cpal streams are not Send everywhere, so one thread owns the
        // stream for its whole life.
        let keeper = {
            let shared = shared.clone();
            let device_name = self.device_name.clone();
            thread::Builder::new()
                .name("wavemix-cpal".to_string())
                .spawn(move || {
                    let span = span!(Level::INFO, "cpal stream");
                    let _enter = span.enter();

                    let stream = match build_stream(device_name.as_deref(), format, shared) {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = startup_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = startup_tx.send(Ok(()));
                    // Returns on stop or when the device handle goes away.
                    let _ = stop_rx.recv();
                    drop(stream);
                    debug!("cpal stream dropped");
                })
                .map_err(|e| DeviceError::Open(e.to_string()))?
        };

        match startup_rx.recv() {
            Ok(Ok(())) => Ok(CpalDevice {
                name: self.name(),
                channels: format.channels.channels(),
                shared,
                stop_tx: Some(stop_tx),
                keeper: Some(keeper),
            }),
            Ok(Err(e)) => {
                let _ = keeper.join();
                Err(e)
            }
            Err(_) => {
                let _ = keeper.join();
                Err(DeviceError::Open(
                    "cpal stream thread exited during startup".to_string(),
                ))
            }
        }
    }
}

fn build_stream(
    device_name: Option<&str>,
    format: OutputFormat,
    shared: Arc<Shared>,
) -> Result<cpal::Stream, DeviceError> {
    let host = cpal::default_host();
    let device = {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout().ok();
        let _shh_stderr = shh::stderr().ok();
        match device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| DeviceError::Open(e.to_string()))?
                .find(|device| device.name().is_ok_and(|n| n.trim() == name)),
            None => host.default_output_device(),
        }
    }
    .ok_or_else(|| {
        DeviceError::Open(format!(
            "no device found with name {}",
            device_name.unwrap_or("default")
        ))
    })?;

    let channels = format.channels.channels();
    let config = cpal::StreamConfig {
        channels: channels as u16,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = {
        let data_shared = shared.clone();
        device
            .build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    data_shared.fill(data, channels);
                },
                move |err| {
                    error!(err = %err, "cpal output stream error");
                    shared.fail(err.to_string());
                },
                None,
            )
            .map_err(|e| DeviceError::Open(e.to_string()))?
    };
    stream
        .play()
        .map_err(|e| DeviceError::Open(e.to_string()))?;

    info!(
        device = device.name().unwrap_or_default(),
        %format,
        "cpal output stream started"
    );
    Ok(stream)
}

/// An open cpal output stream fed through asynchronous writes.
pub struct CpalDevice {
    name: String,
    channels: usize,
    shared: Arc<Shared>,
    stop_tx: Option<crossbeam_channel::Sender<()>>,
    keeper: Option<JoinHandle<()>>,
}

impl AudioDevice for CpalDevice {
    fn submit_write(
        &mut self,
        samples: &[i16],
        frames: usize,
        linked: Option<RequestId>,
    ) -> Result<RequestId, DeviceError> {
        if self.keeper.is_none() {
            return Err(DeviceError::Closed);
        }
        let len = (frames * self.channels).min(samples.len());
        let request = self.shared.submit(samples[..len].to_vec(), frames)?;
        // The queue plays writes back to back, so a link needs no extra work.
        if let Some(linked) = linked {
            debug!(%request, %linked, frames, "Queued linked write");
        }
        Ok(request)
    }

    fn wait_completion(&mut self, request: RequestId) -> Result<usize, DeviceError> {
        self.shared.wait(request)
    }

    fn abort(&mut self, request: RequestId) {
        self.shared.abort(request, self.channels);
    }

    fn close(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(keeper) = self.keeper.take() {
            if keeper.join().is_err() {
                error!(device = %self, "cpal stream thread panicked");
            }
            info!(device = %self, "Closed cpal device");
        }
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Display for CpalDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (cpal)", self.name)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_fill_completes_writes_in_order() {
        let shared = Shared::default();
        let first = shared.submit(vec![1, 1, 2, 2], 2).unwrap();
        let second = shared.submit(vec![3, 3], 1).unwrap();

        let mut data = [9i16; 4];
        shared.fill(&mut data, 2);
        assert_eq!(data, [1, 1, 2, 2]);
        assert_eq!(shared.wait(first).unwrap(), 2);

        let mut data = [9i16; 4];
        shared.fill(&mut data, 2);
        assert_eq!(data, [3, 3, 0, 0]);
        assert_eq!(shared.wait(second).unwrap(), 1);
    }

    #[test]
    fn test_write_split_across_callbacks() {
        let shared = Arc::new(Shared::default());
        let request = shared.submit(vec![5; 6], 3).unwrap();

        let waiter = {
            let shared = shared.clone();
            thread::spawn(move || shared.wait(request))
        };
        let mut data = [0i16; 4];
        shared.fill(&mut data, 2);
        shared.fill(&mut data, 2);
        assert_eq!(data, [5, 5, 0, 0]);
        assert_eq!(waiter.join().unwrap().unwrap(), 3);
    }

    #[test]
    fn test_abort_completes_with_played_frames() {
        let shared = Shared::default();
        let request = shared.submit(vec![1; 8], 4).unwrap();
        let mut data = [0i16; 2];
        shared.fill(&mut data, 2);

        shared.abort(request, 2);
        assert_eq!(shared.wait(request).unwrap(), 1);
        assert!(matches!(
            shared.wait(request),
            Err(DeviceError::UnknownRequest(_))
        ));
    }

    #[test]
    fn test_closed_device_rejects_writes() {
        let mut device = CpalDevice {
            name: "USB Audio".to_string(),
            channels: 2,
            shared: Arc::new(Shared::default()),
            stop_tx: None,
            keeper: None,
        };
        assert_eq!(device.to_string(), "USB Audio (cpal)");
        assert!(matches!(
            device.submit_write(&[0; 4], 2, None),
            Err(DeviceError::Closed)
        ));
        device.close();
    }

    #[test]
    fn test_stream_failure_wakes_waiters() {
        let shared = Arc::new(Shared::default());
        let request = shared.submit(vec![1; 8], 4).unwrap();
        let waiter = {
            let shared = shared.clone();
            thread::spawn(move || shared.wait(request))
        };
        shared.fail("device unplugged".to_string());
        assert!(matches!(
            waiter.join().unwrap(),
            Err(DeviceError::Stream(_))
        ));
        assert!(shared.submit(vec![0; 2], 1).is_err());
    }
}
