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
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{debug, error, info};

use super::decoder::SampleDecoder;
use super::device::AudioBackend;
use super::error::PipelineError;
use super::format::{OutputFormat, OutputSettings};
use super::mixer::{AudioMixer, StreamHandle};
use super::output_thread::AudioOutputThread;
use super::scheduler::DoubleBufferScheduler;

/// Owns the whole output pipeline: the mixer, the output thread and the
/// ready flag. Dropping it tears everything down.
pub struct MixerManager {
    mixer: AudioMixer,
    output: Option<AudioOutputThread>,
    ready: Arc<AtomicBool>,
}

impl MixerManager {
    /// Opens the device, allocates the buffers and starts the output thread.
    /// If the device can't be opened no thread is started.
    pub fn init<B: AudioBackend>(
        backend: &B,
        settings: &OutputSettings,
    ) -> Result<MixerManager, PipelineError> {
        let format = settings.format;
        info!(device = backend.name(), %format, "Initializing audio output");

        let device = backend.open(format)?;
        let mixer = AudioMixer::new(format);
        let scheduler = DoubleBufferScheduler::new(device, mixer.clone(), settings.idle_backoff)?;
        let ready = Arc::new(AtomicBool::new(false));
        let output = AudioOutputThread::spawn(scheduler, settings, ready.clone())?;

        Ok(MixerManager {
            mixer,
            output: Some(output),
            ready,
        })
    }

    /// A manager with no output. Streams are accepted and never played.
    pub fn disabled(format: OutputFormat) -> MixerManager {
        MixerManager {
            mixer: AudioMixer::new(format),
            output: None,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Like init, but falls back to a disabled manager on failure.
    pub fn init_or_disabled<B: AudioBackend>(backend: &B, settings: &OutputSettings) -> MixerManager {
        match MixerManager::init(backend, settings) {
            Ok(manager) => manager,
            Err(e) => {
                error!(err = %e, "Audio output disabled");
                MixerManager::disabled(settings.format)
            }
        }
    }

    pub fn mixer(&self) -> &AudioMixer {
        &self.mixer
    }

    pub fn format(&self) -> OutputFormat {
        self.mixer.format()
    }

    /// Whether an output thread was started. A manager stays enabled after
    /// a device failure; check is_ready for that.
    pub fn is_enabled(&self) -> bool {
        self.output.is_some()
    }

    /// True while the output thread is running its loop.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Starts playing a stream. A disabled manager drops it right away.
    pub fn play(&self, decoder: Box<dyn SampleDecoder>) -> StreamHandle {
        let handle = self.mixer.play(decoder);
        if !self.is_enabled() {
            debug!(stream = %handle, "Audio disabled, dropping stream");
            self.mixer.stop(handle);
        }
        handle
    }

    pub fn stop(&self, handle: StreamHandle) -> bool {
        self.mixer.stop(handle)
    }

    /// Cancels the output thread, waits for the device to close and drops
    /// every stream. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(mut output) = self.output.take() {
            info!("Shutting down audio output");
            if let Some(Err(e)) = output.cancel_and_join() {
                debug!(err = %e, "Output thread had already failed");
            }
        }
        self.ready.store(false, Ordering::Release);
        self.mixer.stop_all();
    }
}

impl Drop for MixerManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
