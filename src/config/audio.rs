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
use std::{str::FromStr, time::Duration};

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::format::{
    ChannelFormat, OutputFormat, OutputSettings, DEFAULT_IDLE_BACKOFF, DEFAULT_OUTPUT_RATE,
};

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Audio {
    /// The output device. Names starting with "mock" select the mock device.
    device: Option<String>,

    /// Output sample rate in Hz (default: 11025)
    output_rate: Option<u32>,

    /// "mono" or "stereo" (default: stereo)
    channels: Option<String>,

    /// Crossplatform priority (0-99) for the output thread.
    thread_priority: Option<u8>,

    /// Attempt SCHED_FIFO for the output thread on unix (default: false)
    realtime: Option<bool>,

    /// How long to sleep between mix attempts while idle, e.g. "5ms".
    idle_backoff: Option<String>,
}

impl Audio {
    /// New will create a new Audio configuration for the given device.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: Some(device.to_string()),
            ..Default::default()
        }
    }

    /// Returns the configured device, if any.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate.unwrap_or(DEFAULT_OUTPUT_RATE)
    }

    /// Overrides the output rate, as the CLI does with --rate.
    pub fn with_output_rate(mut self, output_rate: u32) -> Audio {
        self.output_rate = Some(output_rate);
        self
    }

    /// Overrides the device, as the CLI does with --device.
    pub fn with_device(mut self, device: &str) -> Audio {
        self.device = Some(device.to_string());
        self
    }

    pub fn channels(&self) -> Result<ChannelFormat, ConfigError> {
        match self.channels.as_deref() {
            Some(channels) => {
                ChannelFormat::from_str(channels).map_err(|reason| ConfigError::InvalidValue {
                    field: "channels",
                    reason,
                })
            }
            None => Ok(ChannelFormat::Stereo),
        }
    }

    pub fn thread_priority(&self) -> Option<u8> {
        self.thread_priority
    }

    pub fn realtime(&self) -> bool {
        self.realtime.unwrap_or(false)
    }

    /// Returns the idle backoff (default: 5ms)
    pub fn idle_backoff(&self) -> Result<Duration, ConfigError> {
        match &self.idle_backoff {
            Some(idle_backoff) => Ok(DurationString::from_string(idle_backoff.clone())
                .map_err(|e| ConfigError::Duration {
                    value: idle_backoff.clone(),
                    reason: e.to_string(),
                })?
                .into()),
            None => Ok(DEFAULT_IDLE_BACKOFF),
        }
    }

    /// Resolves everything the output pipeline needs to start.
    pub fn to_output_settings(&self) -> Result<OutputSettings, ConfigError> {
        if self.thread_priority.is_some_and(|p| p > 99) {
            return Err(ConfigError::InvalidValue {
                field: "thread_priority",
                reason: "must be between 0 and 99".to_string(),
            });
        }
        Ok(OutputSettings {
            format: OutputFormat::new(self.output_rate(), self.channels()?),
            thread_priority: self.thread_priority,
            realtime: self.realtime(),
            idle_backoff: self.idle_backoff()?,
        })
    }
}
