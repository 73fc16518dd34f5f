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
use super::{prepare_output, DataReader, SampleDecoder};
use crate::audio::error::DecodeError;
use crate::audio::riff::{partial_block_frames, StreamDescriptor};

/// Expands one ADPCM block into interleaved frames. Implementations keep the
/// per-channel predictor state, reseeding it from each block header.
pub trait BlockCodec: Send {
    /// Header bytes per channel at the start of each block.
    const HEADER_BYTES: usize;

    /// Decodes `frames` frames from `block` into `output`, which holds exactly
    /// `frames * channels` samples. The error string describes the corrupt
    /// header.
    fn decode_block(
        &mut self,
        block: &[u8],
        channels: usize,
        frames: usize,
        output: &mut [i16],
    ) -> Result<(), String>;

    /// Forgets all predictor state.
    fn reset(&mut self);
}

/// Drives a block codec over the data chunk, buffering one expanded block at a
/// time.
pub struct AdpcmDecoder<C> {
    descriptor: StreamDescriptor,
    reader: DataReader,
    codec: C,
    block: Vec<u8>,
    samples: Vec<i16>,
    frames_in_block: usize,
    position: usize,
    block_index: u64,
    finished: bool,
}

impl<C: BlockCodec> AdpcmDecoder<C> {
    pub(crate) fn with_codec(
        descriptor: StreamDescriptor,
        reader: DataReader,
        codec: C,
    ) -> AdpcmDecoder<C> {
        let mut decoder = AdpcmDecoder {
            descriptor,
            reader,
            codec,
            block: Vec::new(),
            samples: Vec::new(),
            frames_in_block: 0,
            position: 0,
            block_index: 0,
            finished: false,
        };
        decoder.finished = !decoder.has_block_left();
        decoder
    }

    fn channels(&self) -> usize {
        self.descriptor.channel_count as usize
    }

    /// Whether the unread data still holds at least one block header.
    fn has_block_left(&self) -> bool {
        self.reader.remaining() >= (C::HEADER_BYTES * self.channels()) as u64
    }

    /// Reads and expands the next block. Returns false once no frames are
    /// left in the data chunk.
    fn load_block(&mut self) -> Result<bool, DecodeError> {
        let channels = self.channels();
        self.block.resize(self.descriptor.block_align as usize, 0);
        let read = self.reader.read_up_to(&mut self.block)?;

        let samples_per_block = self.descriptor.samples_per_block.unwrap_or(u16::MAX) as usize;
        let frames = partial_block_frames(self.descriptor.compression, channels, read)
            .min(samples_per_block);
        self.position = 0;
        self.frames_in_block = 0;
        if frames == 0 {
            return Ok(false);
        }

        self.samples.resize(frames * channels, 0);
        self.codec
            .decode_block(&self.block[..read], channels, frames, &mut self.samples)
            .map_err(|reason| DecodeError::Fault {
                block: self.block_index,
                reason,
            })?;
        self.block_index += 1;
        self.frames_in_block = frames;
        Ok(true)
    }
}

impl<C: BlockCodec> SampleDecoder for AdpcmDecoder<C> {
    fn decode(&mut self, output: &mut [i16], max_frames: usize) -> Result<usize, DecodeError> {
        let channels = self.channels();
        prepare_output(output, max_frames, channels)?;
        if self.finished {
            return Ok(0);
        }

        let mut produced = 0;
        while produced < max_frames {
            if self.position == self.frames_in_block && !self.load_block()? {
                break;
            }
            let take = (self.frames_in_block - self.position).min(max_frames - produced);
            output[produced * channels..(produced + take) * channels].copy_from_slice(
                &self.samples[self.position * channels..(self.position + take) * channels],
            );
            self.position += take;
            produced += take;
        }

        if self.position == self.frames_in_block && !self.has_block_left() {
            self.finished = true;
        }
        Ok(produced)
    }

    fn reset(&mut self) -> Result<(), DecodeError> {
        self.reader.rewind()?;
        self.codec.reset();
        self.frames_in_block = 0;
        self.position = 0;
        self.block_index = 0;
        self.finished = !self.has_block_left();
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }
}
