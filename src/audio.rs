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
use tracing::info;

use crate::config;

pub mod cpal;
pub mod decoder;
pub mod device;
pub mod error;
pub mod format;
pub mod manager;
pub mod mixer;
pub mod mock;
pub mod output_thread;
pub mod riff;
pub mod scheduler;
pub mod thread_priority;

pub use decoder::{make_decoded_stream, open_file, SampleDecoder};
pub use error::{ContainerError, DecodeError, DeviceError, PipelineError};
pub use format::{ChannelFormat, OutputFormat, OutputSettings};
pub use manager::MixerManager;
pub use mixer::{AudioMixer, StreamHandle};

/// Starts the output pipeline on the configured device. Device names starting
/// with "mock" use the mock backend; anything else goes through cpal. A device
/// that fails to open leaves audio disabled rather than failing the caller.
pub fn start(config: &config::Audio) -> Result<MixerManager, config::ConfigError> {
    let settings = config.to_output_settings()?;
    let manager = match config.device() {
        Some(device) if device.starts_with("mock") => {
            MixerManager::init_or_disabled(&mock::MockBackend::new(device), &settings)
        }
        device => MixerManager::init_or_disabled(
            &cpal::CpalBackend::new(device.map(str::to_string)),
            &settings,
        ),
    };
    info!(
        enabled = manager.is_enabled(),
        format = %manager.format(),
        "Audio pipeline started"
    );
    Ok(manager)
}
