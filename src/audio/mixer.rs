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
// Core mixing logic shared by every device backend.
use std::{
    fmt, mem,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use super::decoder::SampleDecoder;
use super::error::DecodeError;
use super::format::{ChannelFormat, OutputFormat};

/// Full scale stream volume.
pub const MAX_VOLUME: u8 = 255;

/// Hard left and hard right balance.
pub const PAN_LEFT: i8 = -127;
pub const PAN_RIGHT: i8 = 127;

/// Denominator of a stereo gain: full volume times full balance.
const GAIN_SCALE: i32 = MAX_VOLUME as i32 * PAN_RIGHT as i32;

/// Identifies a stream handed to the mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(u64);

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A stream currently playing through the mixer.
struct ActiveStream {
    handle: StreamHandle,
    decoder: Box<dyn SampleDecoder>,
    volume: u8,
    pan: i8,
    /// Decode target, sized to the largest request seen so far.
    scratch: Vec<i16>,
}

impl ActiveStream {
    /// Left and right gain out of GAIN_SCALE. The far side of the balance is
    /// attenuated linearly while the near side keeps the stream volume.
    fn gains(&self) -> (i32, i32) {
        let volume = i32::from(self.volume);
        let pan = i32::from(self.pan.max(PAN_LEFT));
        if pan < 0 {
            (volume * 127, volume * (127 + pan))
        } else {
            (volume * (127 - pan), volume * 127)
        }
    }
}

enum Adjustment {
    Volume(u8),
    Pan(i8),
}

/// The active stream set. While a mix is running its streams are swapped out
/// and tracked by handle only, so control calls made in the meantime are
/// queued and applied when the streams come back.
#[derive(Default)]
struct StreamSet {
    streams: Vec<ActiveStream>,
    in_flight: Vec<StreamHandle>,
    stopped: Vec<StreamHandle>,
    adjustments: Vec<(StreamHandle, Adjustment)>,
}

impl StreamSet {
    fn is_in_flight(&self, handle: StreamHandle) -> bool {
        self.in_flight.contains(&handle) && !self.stopped.contains(&handle)
    }

    fn adjust(&mut self, handle: StreamHandle, adjustment: Adjustment) -> bool {
        if let Some(stream) = self.streams.iter_mut().find(|s| s.handle == handle) {
            apply(stream, adjustment);
            return true;
        }
        if self.is_in_flight(handle) {
            self.adjustments.push((handle, adjustment));
            return true;
        }
        false
    }
}

fn apply(stream: &mut ActiveStream, adjustment: Adjustment) {
    match adjustment {
        Adjustment::Volume(volume) => stream.volume = volume,
        Adjustment::Pan(pan) => stream.pan = pan.max(PAN_LEFT),
    }
}

/// Mixes any number of decoded streams into signed 16-bit interleaved output.
#[derive(Clone)]
pub struct AudioMixer {
    set: Arc<Mutex<StreamSet>>,
    /// The i32 accumulator. Also serializes concurrent mixes.
    accumulator: Arc<Mutex<Vec<i32>>>,
    next_handle: Arc<AtomicU64>,
    format: OutputFormat,
}

impl AudioMixer {
    /// Creates a new audio mixer
    pub fn new(format: OutputFormat) -> AudioMixer {
        AudioMixer {
            set: Arc::new(Mutex::new(StreamSet::default())),
            accumulator: Arc::new(Mutex::new(Vec::new())),
            next_handle: Arc::new(AtomicU64::new(1)),
            format,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Starts playing a stream at full volume, centered.
    pub fn play(&self, decoder: Box<dyn SampleDecoder>) -> StreamHandle {
        self.play_with(decoder, MAX_VOLUME, 0)
    }

    /// Starts playing a stream with the given volume and balance.
    pub fn play_with(&self, decoder: Box<dyn SampleDecoder>, volume: u8, pan: i8) -> StreamHandle {
        let handle = StreamHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        if decoder.sample_rate() != self.format.sample_rate {
            warn!(
                stream = %handle,
                stream_rate = decoder.sample_rate(),
                output_rate = self.format.sample_rate,
                "Stream rate differs from output rate, playing at output rate"
            );
        }
        debug!(stream = %handle, volume, pan, "Adding stream");
        self.set.lock().streams.push(ActiveStream {
            handle,
            decoder,
            volume,
            pan: pan.max(PAN_LEFT),
            scratch: Vec::new(),
        });
        handle
    }

    /// Stops a stream. Returns false if it had already finished or been stopped.
    pub fn stop(&self, handle: StreamHandle) -> bool {
        let mut set = self.set.lock();
        if let Some(index) = set.streams.iter().position(|s| s.handle == handle) {
            set.streams.remove(index);
            return true;
        }
        if set.is_in_flight(handle) {
            set.stopped.push(handle);
            return true;
        }
        false
    }

    /// Stops every stream.
    pub fn stop_all(&self) {
        let mut set = self.set.lock();
        set.streams.clear();
        let in_flight = set.in_flight.clone();
        set.stopped.extend(in_flight);
    }

    pub fn is_playing(&self, handle: StreamHandle) -> bool {
        let set = self.set.lock();
        set.streams.iter().any(|s| s.handle == handle) || set.is_in_flight(handle)
    }

    /// Returns false if the stream is no longer playing.
    pub fn set_volume(&self, handle: StreamHandle, volume: u8) -> bool {
        self.set.lock().adjust(handle, Adjustment::Volume(volume))
    }

    /// Returns false if the stream is no longer playing.
    pub fn set_pan(&self, handle: StreamHandle, pan: i8) -> bool {
        self.set.lock().adjust(handle, Adjustment::Pan(pan))
    }

    /// Number of streams still playing.
    pub fn active_count(&self) -> usize {
        let set = self.set.lock();
        set.streams.len()
            + set
                .in_flight
                .iter()
                .filter(|h| !set.stopped.contains(h))
                .count()
    }

    /// Mixes up to `max_frames` frames of every active stream into `output`
    /// and returns the number of frames produced, which is the longest any
    /// stream delivered. Zero means nothing is playing. With no active
    /// streams `output` is left untouched, otherwise its first `max_frames`
    /// frames are overwritten. Finished and faulted streams are dropped.
    pub fn mix_into(&self, output: &mut [i16], max_frames: usize) -> usize {
        let channels = self.format.channels.channels();
        let max_frames = max_frames.min(output.len() / channels);

        let mut accumulator = self.accumulator.lock();
        let mut streams = {
            let mut set = self.set.lock();
            let streams = mem::take(&mut set.streams);
            set.in_flight = streams.iter().map(|s| s.handle).collect();
            streams
        };
        if streams.is_empty() || max_frames == 0 {
            self.merge(streams);
            return 0;
        }

        accumulator.clear();
        accumulator.resize(max_frames * channels, 0);
        let mut produced = 0;
        streams.retain_mut(|stream| {
            // A panicking decoder only takes its own stream down. Decoding
            // happens before accumulation, so nothing partial is mixed in.
            let result = catch_unwind(AssertUnwindSafe(|| {
                mix_stream(stream, &mut accumulator, max_frames, self.format.channels)
            }));
            let frames = match result {
                Ok(Ok(frames)) => frames,
                Ok(Err(e)) => {
                    warn!(stream = %stream.handle, err = %e, "Dropping stream after decode fault");
                    return false;
                }
                Err(_) => {
                    error!(stream = %stream.handle, "Dropping stream after decoder panic");
                    return false;
                }
            };
            produced = produced.max(frames);
            if frames == 0 || stream.decoder.is_finished() {
                debug!(stream = %stream.handle, "Stream finished");
                return false;
            }
            true
        });

        for (sample, mixed) in output.iter_mut().zip(accumulator.iter()) {
            *sample = (*mixed).clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        }

        self.merge(streams);
        produced
    }

    /// Returns mixed streams to the set, applying control calls made while
    /// they were out.
    fn merge(&self, mut streams: Vec<ActiveStream>) {
        let mut set = self.set.lock();
        let stopped = mem::take(&mut set.stopped);
        let adjustments = mem::take(&mut set.adjustments);
        set.in_flight.clear();

        streams.retain(|s| !stopped.contains(&s.handle));
        for (handle, adjustment) in adjustments {
            if let Some(stream) = streams.iter_mut().find(|s| s.handle == handle) {
                apply(stream, adjustment);
            }
        }
        // Streams added during the mix go after the existing ones.
        streams.append(&mut set.streams);
        set.streams = streams;
    }
}

/// Decodes one stream and adds it into the accumulator. Returns frames
/// decoded.
fn mix_stream(
    stream: &mut ActiveStream,
    accumulator: &mut [i32],
    max_frames: usize,
    output: ChannelFormat,
) -> Result<usize, DecodeError> {
    let source_channels = (stream.decoder.channel_count() as usize).max(1);
    stream.scratch.resize(max_frames * source_channels, 0);
    let frames = stream.decoder.decode(&mut stream.scratch, max_frames)?;
    let (left_gain, right_gain) = stream.gains();
    let volume = i32::from(stream.volume);
    let unity = i32::from(MAX_VOLUME);

    let source = stream.scratch[..frames * source_channels].chunks_exact(source_channels);
    match output {
        ChannelFormat::Mono => {
            for (acc, frame) in accumulator.iter_mut().zip(source) {
                let sample = if source_channels == 1 {
                    i32::from(frame[0])
                } else {
                    (i32::from(frame[0]) + i32::from(frame[1])) / 2
                };
                *acc += sample * volume / unity;
            }
        }
        ChannelFormat::Stereo => {
            for (acc, frame) in accumulator.chunks_exact_mut(2).zip(source) {
                let (left, right) = if source_channels == 1 {
                    (i32::from(frame[0]), i32::from(frame[0]))
                } else {
                    (i32::from(frame[0]), i32::from(frame[1]))
                };
                acc[0] += left * left_gain / GAIN_SCALE;
                acc[1] += right * right_gain / GAIN_SCALE;
            }
        }
    }
    Ok(frames)
}
