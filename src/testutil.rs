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
    io::Cursor,
    thread,
    time::{Duration, SystemTime},
};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::audio::decoder::{make_decoded_stream, SampleDecoder};
use crate::audio::riff::WAVE_FORMAT_PCM;

/// Writes interleaved integer samples into an in-memory WAV file with hound.
pub fn hound_wav<S: hound::Sample + Copy>(
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    samples: &[S],
) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(
            &mut cursor,
            WavSpec {
                channels,
                sample_rate,
                bits_per_sample,
                sample_format: SampleFormat::Int,
            },
        )
        .unwrap();
        for sample in samples {
            writer.write_sample(*sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// A decoder over 16-bit PCM samples.
pub fn pcm_stream(channels: u16, sample_rate: u32, samples: &[i16]) -> Box<dyn SampleDecoder> {
    let bytes = hound_wav(channels, sample_rate, 16, samples);
    make_decoded_stream(Cursor::new(bytes)).unwrap()
}

/// Builds RIFF containers chunk by chunk, for layouts hound can't write
/// (ADPCM, broken headers, odd chunk orders).
pub struct RiffBuilder {
    chunks: Vec<([u8; 4], Vec<u8>)>,
}

impl RiffBuilder {
    pub fn new() -> RiffBuilder {
        RiffBuilder { chunks: Vec::new() }
    }

    pub fn chunk(mut self, id: &[u8; 4], payload: Vec<u8>) -> RiffBuilder {
        self.chunks.push((*id, payload));
        self
    }

    /// Adds a fmt chunk. A non-empty extension is written with its cbSize.
    pub fn fmt(
        self,
        code: u16,
        channels: u16,
        sample_rate: u32,
        block_align: u16,
        bits_per_sample: u16,
        extension: &[u8],
    ) -> RiffBuilder {
        let mut payload = Vec::new();
        payload.extend_from_slice(&code.to_le_bytes());
        payload.extend_from_slice(&channels.to_le_bytes());
        payload.extend_from_slice(&sample_rate.to_le_bytes());
        payload.extend_from_slice(&(sample_rate * u32::from(block_align)).to_le_bytes());
        payload.extend_from_slice(&block_align.to_le_bytes());
        payload.extend_from_slice(&bits_per_sample.to_le_bytes());
        if !extension.is_empty() {
            payload.extend_from_slice(&(extension.len() as u16).to_le_bytes());
            payload.extend_from_slice(extension);
        }
        self.chunk(b"fmt ", payload)
    }

    pub fn pcm_fmt(self, channels: u16, sample_rate: u32, bits_per_sample: u16) -> RiffBuilder {
        let block_align = channels * bits_per_sample / 8;
        self.fmt(
            WAVE_FORMAT_PCM,
            channels,
            sample_rate,
            block_align,
            bits_per_sample,
            &[],
        )
    }

    pub fn data(self, payload: Vec<u8>) -> RiffBuilder {
        self.chunk(b"data", payload)
    }

    pub fn build(self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(b"WAVE");
        for (id, payload) in self.chunks {
            body.extend_from_slice(&id);
            body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            body.extend_from_slice(&payload);
            if payload.len() % 2 == 1 {
                body.push(0);
            }
        }
        let mut bytes = Vec::with_capacity(body.len() + 8);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&body);
        bytes
    }
}

/// Wait for the given predicate to return true or fail.
#[inline]
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed().expect("System time error");
        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }
        thread::sleep(tick);
    }
}
