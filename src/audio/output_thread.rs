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
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use tracing::{error, info, span, Level};

use super::device::AudioDevice;
use super::error::PipelineError;
use super::format::OutputSettings;
use super::scheduler::DoubleBufferScheduler;
use super::thread_priority::{
    configure_output_thread_priority, output_thread_priority, rt_audio_enabled,
};
use crate::playsync::CancelHandle;

/// Lowers the ready flag when the output loop exits, panics included.
struct ReadyGuard(Arc<AtomicBool>);

impl Drop for ReadyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The dedicated thread driving a scheduler until cancelled.
pub struct AudioOutputThread {
    cancel: CancelHandle,
    join: Option<JoinHandle<Result<(), PipelineError>>>,
}

impl AudioOutputThread {
    /// Starts the thread. `ready` is raised once the loop is running and
    /// lowered when it stops for any reason.
    pub fn spawn<D: AudioDevice + 'static>(
        mut scheduler: DoubleBufferScheduler<D>,
        settings: &OutputSettings,
        ready: Arc<AtomicBool>,
    ) -> Result<AudioOutputThread, PipelineError> {
        let cancel = CancelHandle::new();
        let priority = output_thread_priority(settings.thread_priority);
        let rt_audio = rt_audio_enabled(settings.realtime);

        let join = {
            let cancel = cancel.clone();
            thread::Builder::new()
                .name("wavemix-output".to_string())
                .spawn(move || {
                    let span = span!(Level::INFO, "audio output");
                    let _enter = span.enter();

                    configure_output_thread_priority(priority, rt_audio);
                    ready.store(true, Ordering::Release);
                    let _ready = ReadyGuard(ready);
                    info!(
                        frames_per_buffer = scheduler.frames_per_buffer(),
                        "Output thread running"
                    );

                    let result = scheduler.run(&cancel);
                    match &result {
                        Ok(()) => info!("Output thread stopped"),
                        Err(e) => error!(err = %e, "Output thread stopped on device failure"),
                    }
                    result
                })
                .map_err(PipelineError::ThreadSpawn)?
        };

        Ok(AudioOutputThread {
            cancel,
            join: Some(join),
        })
    }

    /// True until the thread has been joined.
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    /// Signals cancellation and waits for teardown to finish. Returns the
    /// loop's result the first time it is called.
    pub fn cancel_and_join(&mut self) -> Option<Result<(), PipelineError>> {
        self.cancel.cancel();
        let join = self.join.take()?;
        match join.join() {
            Ok(result) => Some(result),
            Err(_) => {
                error!("Output thread panicked");
                None
            }
        }
    }
}

impl Drop for AudioOutputThread {
    fn drop(&mut self) {
        self.cancel_and_join();
    }
}
