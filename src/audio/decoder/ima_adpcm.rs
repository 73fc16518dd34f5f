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
//! IMA/DVI ADPCM. Each block starts with a 4-byte header per channel
//! (predictor, step index, reserved) whose predictor is also the block's
//! first frame. Mono data follows as a run of nibbles, low nibble first;
//! stereo data alternates 4-byte groups (8 nibbles) between the channels.

use super::adpcm::{AdpcmDecoder, BlockCodec};
use super::DataReader;
use crate::audio::riff::StreamDescriptor;

const MAX_STEP_INDEX: i32 = 88;

const STEP_TABLE: [i32; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

const INDEX_ADJUST: [i32; 16] = [-1, -1, -1, -1, 2, 4, 6, 8, -1, -1, -1, -1, 2, 4, 6, 8];

pub type ImaAdpcmDecoder = AdpcmDecoder<ImaAdpcm>;

impl ImaAdpcmDecoder {
    pub(crate) fn new(descriptor: StreamDescriptor, reader: DataReader) -> ImaAdpcmDecoder {
        AdpcmDecoder::with_codec(descriptor, reader, ImaAdpcm::default())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ChannelState {
    predictor: i32,
    step_index: i32,
}

impl ChannelState {
    fn expand(&mut self, nibble: u8) -> i16 {
        let step = STEP_TABLE[self.step_index as usize];
        let mut diff = (2 * i32::from(nibble & 0x07) + 1) * step / 8;
        if nibble & 0x08 != 0 {
            diff = -diff;
        }
        self.predictor = (self.predictor + diff).clamp(i16::MIN as i32, i16::MAX as i32);
        self.step_index =
            (self.step_index + INDEX_ADJUST[nibble as usize & 0x0f]).clamp(0, MAX_STEP_INDEX);
        self.predictor as i16
    }
}

/// Per-channel state of the IMA codec.
#[derive(Debug, Default)]
pub struct ImaAdpcm {
    state: [ChannelState; 2],
}

impl BlockCodec for ImaAdpcm {
    const HEADER_BYTES: usize = 4;

    fn decode_block(
        &mut self,
        block: &[u8],
        channels: usize,
        frames: usize,
        output: &mut [i16],
    ) -> Result<(), String> {
        for (channel, header) in block.chunks_exact(4).take(channels).enumerate() {
            let predictor = i16::from_le_bytes([header[0], header[1]]);
            let step_index = i32::from(header[2]);
            if step_index > MAX_STEP_INDEX {
                return Err(format!(
                    "step index {} on channel {} exceeds {}",
                    step_index, channel, MAX_STEP_INDEX
                ));
            }
            self.state[channel] = ChannelState {
                predictor: i32::from(predictor),
                step_index,
            };
            output[channel] = predictor;
        }

        let data = &block[Self::HEADER_BYTES * channels..];
        let groups = (frames - 1).div_ceil(8);
        for group in 0..groups {
            for channel in 0..channels {
                let bytes = &data[(group * channels + channel) * 4..];
                for nibble_index in 0..8 {
                    let frame = 1 + group * 8 + nibble_index;
                    if frame >= frames {
                        break;
                    }
                    let byte = bytes[nibble_index / 2];
                    let nibble = if nibble_index % 2 == 0 {
                        byte & 0x0f
                    } else {
                        byte >> 4
                    };
                    output[frame * channels + channel] = self.state[channel].expand(nibble);
                }
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.state = Default::default();
    }
}
