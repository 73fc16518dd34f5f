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
//! Double buffered delivery of mixed audio to an asynchronous device.
//!
//! Two buffers alternate. While one is queued on the device the other is
//! mixed and queued behind it, linked so the device can play them back to
//! back. Each slot moves Idle -> Filling -> Submitted -> Completed -> Idle,
//! and only the thread driving the scheduler ever touches the slots.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::device::{AudioDevice, RequestId};
use super::error::{DeviceError, PipelineError};
use super::mixer::AudioMixer;
use crate::playsync::CancelHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Filling,
    Submitted,
    Completed,
}

/// A fixed capacity output buffer, allocated once and reused.
#[derive(Debug)]
pub struct MixBuffer {
    samples: Vec<i16>,
    frames: usize,
    slot: usize,
}

impl MixBuffer {
    pub fn allocate(
        slot: usize,
        capacity_frames: usize,
        channels: usize,
    ) -> Result<MixBuffer, PipelineError> {
        let len = capacity_frames * channels;
        let mut samples = Vec::new();
        samples
            .try_reserve_exact(len)
            .map_err(|_| PipelineError::ResourceExhausted {
                frames: capacity_frames,
            })?;
        samples.resize(len, 0);
        Ok(MixBuffer {
            samples,
            frames: 0,
            slot,
        })
    }

    /// Frames filled by the last mix.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }
}

#[derive(Debug)]
struct BufferSlot {
    state: SlotState,
    buffer: MixBuffer,
    request: Option<RequestId>,
}

/// What one pass of the loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A buffer of this many frames went to the device.
    Submitted(usize),
    /// Nothing was playing; nothing was submitted.
    Idle,
}

pub struct DoubleBufferScheduler<D: AudioDevice> {
    device: Option<D>,
    mixer: AudioMixer,
    slots: [BufferSlot; 2],
    current: usize,
    frames_per_buffer: usize,
    idle_backoff: Duration,
}

impl<D: AudioDevice> DoubleBufferScheduler<D> {
    /// Takes ownership of an opened device and allocates both buffers.
    pub fn new(
        device: D,
        mixer: AudioMixer,
        idle_backoff: Duration,
    ) -> Result<DoubleBufferScheduler<D>, PipelineError> {
        let format = mixer.format();
        let frames_per_buffer = format.frames_per_buffer();
        let channels = format.channels.channels();
        let slot = |index| -> Result<BufferSlot, PipelineError> {
            Ok(BufferSlot {
                state: SlotState::Idle,
                buffer: MixBuffer::allocate(index, frames_per_buffer, channels)?,
                request: None,
            })
        };
        let slots = [slot(0)?, slot(1)?];
        debug!(frames_per_buffer, %format, "Allocated output buffers");

        Ok(DoubleBufferScheduler {
            device: Some(device),
            mixer,
            slots,
            current: 0,
            frames_per_buffer,
            idle_backoff,
        })
    }

    pub fn frames_per_buffer(&self) -> usize {
        self.frames_per_buffer
    }

    pub fn slot_state(&self, slot: usize) -> SlotState {
        self.slots[slot].state
    }

    /// The slot the next cycle will fill.
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Runs cycles until cancelled or the device fails. The device is closed
    /// either way.
    pub fn run(&mut self, cancel: &CancelHandle) -> Result<(), PipelineError> {
        while !cancel.is_cancelled() {
            match self.cycle() {
                Ok(CycleOutcome::Submitted(_)) => {}
                Ok(CycleOutcome::Idle) => spin_sleep::sleep(self.idle_backoff),
                Err(e) => {
                    self.shutdown();
                    return Err(e);
                }
            }
        }
        self.shutdown();
        Ok(())
    }

    /// One pass: reap the current slot, mix into it, and submit it if
    /// anything was mixed.
    pub fn cycle(&mut self) -> Result<CycleOutcome, PipelineError> {
        let current = self.current;
        self.reap(current)?;

        let slot = &mut self.slots[current];
        slot.state = SlotState::Filling;
        let frames = self
            .mixer
            .mix_into(&mut slot.buffer.samples, self.frames_per_buffer);
        slot.buffer.frames = frames;
        if frames == 0 {
            slot.state = SlotState::Idle;
            return Ok(CycleOutcome::Idle);
        }

        self.submit(current)?;
        self.current ^= 1;
        Ok(CycleOutcome::Submitted(frames))
    }

    /// Hands a filled slot to the device, linked behind the other slot when
    /// that one is still queued.
    pub(crate) fn submit(&mut self, index: usize) -> Result<(), PipelineError> {
        if self.slots[index].state == SlotState::Submitted {
            return Err(PipelineError::SlotBusy(index));
        }
        let linked = match self.slots[index ^ 1] {
            BufferSlot {
                state: SlotState::Submitted,
                request,
                ..
            } => request,
            _ => None,
        };
        let device = self.device.as_mut().ok_or(DeviceError::Closed)?;

        let slot = &mut self.slots[index];
        let request = device.submit_write(&slot.buffer.samples, slot.buffer.frames, linked)?;
        slot.request = Some(request);
        slot.state = SlotState::Submitted;
        Ok(())
    }

    /// Blocks until a submitted slot's write completes and returns it to Idle.
    fn reap(&mut self, index: usize) -> Result<(), PipelineError> {
        let slot = &mut self.slots[index];
        if slot.state != SlotState::Submitted {
            return Ok(());
        }
        let Some(request) = slot.request.take() else {
            slot.state = SlotState::Idle;
            return Ok(());
        };
        let device = self.device.as_mut().ok_or(DeviceError::Closed)?;
        match device.wait_completion(request) {
            Ok(played) => {
                slot.state = SlotState::Completed;
                debug!(slot = index, %request, played, "Write completed");
                slot.state = SlotState::Idle;
                Ok(())
            }
            Err(e) => {
                // The request is no longer in flight either way.
                slot.state = SlotState::Idle;
                Err(e.into())
            }
        }
    }

    /// Aborts and awaits every in-flight write, then closes the device.
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        let Some(mut device) = self.device.take() else {
            return;
        };
        for index in [self.current, self.current ^ 1] {
            let slot = &mut self.slots[index];
            if slot.state != SlotState::Submitted {
                continue;
            }
            if let Some(request) = slot.request.take() {
                device.abort(request);
                if let Err(e) = device.wait_completion(request) {
                    warn!(slot = index, %request, err = %e, "Error awaiting aborted write");
                }
            }
            slot.state = SlotState::Idle;
        }
        device.close();
        info!("Output device closed");
    }
}

impl<D: AudioDevice> Drop for DoubleBufferScheduler<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
