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

use std::{fmt, str::FromStr, time::Duration};

/// Output rate used when the collaborator does not ask for one.
pub const DEFAULT_OUTPUT_RATE: u32 = 11025;

/// How long the output thread sleeps when the mixer has nothing to play.
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_millis(5);

/// Channel layout of the output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelFormat {
    Mono,
    Stereo,
}

impl ChannelFormat {
    /// Number of interleaved samples per frame.
    pub fn channels(self) -> usize {
        match self {
            ChannelFormat::Mono => 1,
            ChannelFormat::Stereo => 2,
        }
    }

    /// Maps a channel count onto a layout, if it is one we can drive.
    pub fn from_channels(channels: u16) -> Option<ChannelFormat> {
        match channels {
            1 => Some(ChannelFormat::Mono),
            2 => Some(ChannelFormat::Stereo),
            _ => None,
        }
    }
}

impl FromStr for ChannelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mono" | "Mono" | "1" => Ok(ChannelFormat::Mono),
            "stereo" | "Stereo" | "2" => Ok(ChannelFormat::Stereo),
            _ => Err(format!("Unsupported channel format: {}", s)),
        }
    }
}

impl fmt::Display for ChannelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelFormat::Mono => write!(f, "mono"),
            ChannelFormat::Stereo => write!(f, "stereo"),
        }
    }
}

/// The format the pipeline mixes into and hands to the device. Samples are
/// always signed 16-bit interleaved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Output channel layout.
    pub channels: ChannelFormat,
}

impl OutputFormat {
    pub fn new(sample_rate: u32, channels: ChannelFormat) -> OutputFormat {
        OutputFormat {
            sample_rate: if sample_rate == 0 {
                DEFAULT_OUTPUT_RATE
            } else {
                sample_rate
            },
            channels,
        }
    }

    /// Frames held by each of the two output buffers at this rate.
    pub fn frames_per_buffer(&self) -> usize {
        frames_per_buffer(self.sample_rate)
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::new(DEFAULT_OUTPUT_RATE, ChannelFormat::Stereo)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz {} s16", self.sample_rate, self.channels)
    }
}

/// Each buffer holds about 1/16th of a second, as a power of two capped at
/// 8192 frames. Rates outside the table get the 22050 Hz size.
pub fn frames_per_buffer(sample_rate: u32) -> usize {
    match sample_rate {
        4000 => 1024,
        8000 | 11025 => 2048,
        44100 | 48000 | 96000 => 8192,
        _ => 4096,
    }
}

/// Everything the pipeline needs to start, already resolved from config.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub format: OutputFormat,
    /// Crossplatform thread priority (0-99) for the output thread.
    pub thread_priority: Option<u8>,
    /// Attempt SCHED_FIFO for the output thread on unix.
    pub realtime: bool,
    /// Sleep between mix attempts while nothing is playing.
    pub idle_backoff: Duration,
}

impl OutputSettings {
    pub fn new(format: OutputFormat) -> OutputSettings {
        OutputSettings {
            format,
            thread_priority: None,
            realtime: false,
            idle_backoff: DEFAULT_IDLE_BACKOFF,
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        OutputSettings::new(OutputFormat::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_per_buffer_table() {
        assert_eq!(frames_per_buffer(4000), 1024);
        assert_eq!(frames_per_buffer(8000), 2048);
        assert_eq!(frames_per_buffer(11025), 2048);
        assert_eq!(frames_per_buffer(22050), 4096);
        assert_eq!(frames_per_buffer(44100), 8192);
        assert_eq!(frames_per_buffer(48000), 8192);
        assert_eq!(frames_per_buffer(96000), 8192);
    }

    #[test]
    fn test_frames_per_buffer_unlisted_rate() {
        assert_eq!(frames_per_buffer(16000), 4096);
        assert_eq!(frames_per_buffer(32000), 4096);
    }

    #[test]
    fn test_output_format_zero_rate_uses_default() {
        let format = OutputFormat::new(0, ChannelFormat::Stereo);
        assert_eq!(format.sample_rate, DEFAULT_OUTPUT_RATE);
        assert_eq!(format.frames_per_buffer(), 2048);
    }

    #[test]
    fn test_channel_format_from_str() {
        assert_eq!(ChannelFormat::from_str("mono").unwrap(), ChannelFormat::Mono);
        assert_eq!(
            ChannelFormat::from_str("Stereo").unwrap(),
            ChannelFormat::Stereo
        );
        assert_eq!(ChannelFormat::from_str("2").unwrap(), ChannelFormat::Stereo);
        assert!(ChannelFormat::from_str("quad").is_err());
    }

    #[test]
    fn test_channel_format_from_channels() {
        assert_eq!(ChannelFormat::from_channels(1), Some(ChannelFormat::Mono));
        assert_eq!(ChannelFormat::from_channels(2), Some(ChannelFormat::Stereo));
        assert_eq!(ChannelFormat::from_channels(6), None);
    }

    #[test]
    fn test_output_format_display() {
        let format = OutputFormat::new(22050, ChannelFormat::Mono);
        assert_eq!(format.to_string(), "22050Hz mono s16");
    }
}
