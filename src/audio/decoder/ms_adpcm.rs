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
//! Microsoft ADPCM. The block header holds, per field and then per channel, a
//! predictor index (u8), the initial delta, sample1 and sample2 (i16 each).
//! The two seed samples are emitted oldest first. Nibbles follow high nibble
//! first, alternating channels.

use super::adpcm::{AdpcmDecoder, BlockCodec};
use super::DataReader;
use crate::audio::riff::StreamDescriptor;

const ADAPTATION_TABLE: [i32; 16] = [
    230, 230, 230, 230, 307, 409, 512, 614, 768, 614, 512, 409, 307, 230, 230, 230,
];

const DEFAULT_COEFFICIENTS: [(i16, i16); 7] = [
    (256, 0),
    (512, -256),
    (0, 0),
    (192, 64),
    (240, 0),
    (460, -208),
    (392, -232),
];

const MIN_DELTA: i32 = 16;

/// Keeps the adapted delta far enough from overflow that the next
/// adaptation step still fits an i32.
const MAX_DELTA: i32 = i32::MAX / 768;

pub type MsAdpcmDecoder = AdpcmDecoder<MsAdpcm>;

impl MsAdpcmDecoder {
    pub(crate) fn new(descriptor: StreamDescriptor, reader: DataReader) -> MsAdpcmDecoder {
        let codec = match &descriptor.coefficients {
            Some(table) => MsAdpcm::with_coefficients(table.clone()),
            None => MsAdpcm::default(),
        };
        AdpcmDecoder::with_codec(descriptor, reader, codec)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ChannelState {
    coefficient1: i32,
    coefficient2: i32,
    delta: i32,
    sample1: i32,
    sample2: i32,
}

impl ChannelState {
    fn expand(&mut self, nibble: u8) -> i16 {
        let predicted = (i64::from(self.sample1) * i64::from(self.coefficient1)
            + i64::from(self.sample2) * i64::from(self.coefficient2))
            / 256;
        let signed = if nibble & 0x08 != 0 {
            i32::from(nibble) - 16
        } else {
            i32::from(nibble)
        };
        let sample = (predicted + i64::from(signed) * i64::from(self.delta))
            .clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i32;
        self.sample2 = self.sample1;
        self.sample1 = sample;
        self.delta = (ADAPTATION_TABLE[nibble as usize & 0x0f] * self.delta / 256)
            .clamp(MIN_DELTA, MAX_DELTA);
        sample as i16
    }
}

/// Per-channel state and predictor table of the MS codec.
#[derive(Debug)]
pub struct MsAdpcm {
    coefficients: Vec<(i16, i16)>,
    state: [ChannelState; 2],
}

impl MsAdpcm {
    pub fn with_coefficients(coefficients: Vec<(i16, i16)>) -> MsAdpcm {
        MsAdpcm {
            coefficients,
            state: Default::default(),
        }
    }
}

impl Default for MsAdpcm {
    fn default() -> Self {
        MsAdpcm::with_coefficients(DEFAULT_COEFFICIENTS.to_vec())
    }
}

fn read_i16(block: &[u8], offset: usize) -> i32 {
    i32::from(i16::from_le_bytes([block[offset], block[offset + 1]]))
}

impl BlockCodec for MsAdpcm {
    const HEADER_BYTES: usize = 7;

    fn decode_block(
        &mut self,
        block: &[u8],
        channels: usize,
        frames: usize,
        output: &mut [i16],
    ) -> Result<(), String> {
        for channel in 0..channels {
            let predictor = block[channel] as usize;
            let Some(&(c1, c2)) = self.coefficients.get(predictor) else {
                return Err(format!(
                    "predictor index {} on channel {} outside {}-entry table",
                    predictor,
                    channel,
                    self.coefficients.len()
                ));
            };
            self.state[channel] = ChannelState {
                coefficient1: i32::from(c1),
                coefficient2: i32::from(c2),
                delta: read_i16(block, channels + channel * 2),
                sample1: read_i16(block, channels * 3 + channel * 2),
                sample2: read_i16(block, channels * 5 + channel * 2),
            };
            output[channel] = self.state[channel].sample2 as i16;
            if frames > 1 {
                output[channels + channel] = self.state[channel].sample1 as i16;
            }
        }

        let data = &block[Self::HEADER_BYTES * channels..];
        let nibbles = frames.saturating_sub(2) * channels;
        for index in 0..nibbles {
            let byte = data[index / 2];
            let nibble = if index % 2 == 0 { byte >> 4 } else { byte & 0x0f };
            let channel = index % channels;
            output[2 * channels + index] = self.state[channel].expand(nibble);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.state = Default::default();
    }
}
