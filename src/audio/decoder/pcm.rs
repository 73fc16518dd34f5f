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
use crate::audio::riff::StreamDescriptor;

/// Raw PCM: 8-bit unsigned or 16-bit signed little endian.
pub struct PcmDecoder {
    descriptor: StreamDescriptor,
    reader: DataReader,
    scratch: Vec<u8>,
    finished: bool,
}

impl PcmDecoder {
    pub(crate) fn new(descriptor: StreamDescriptor, reader: DataReader) -> PcmDecoder {
        let finished = reader.remaining() < descriptor.bytes_per_frame() as u64;
        PcmDecoder {
            descriptor,
            reader,
            scratch: Vec::new(),
            finished,
        }
    }
}

impl SampleDecoder for PcmDecoder {
    fn decode(&mut self, output: &mut [i16], max_frames: usize) -> Result<usize, DecodeError> {
        let channels = self.descriptor.channel_count as usize;
        prepare_output(output, max_frames, channels)?;
        if self.finished || max_frames == 0 {
            return Ok(0);
        }

        let bytes_per_frame = self.descriptor.bytes_per_frame();
        let whole_frames = (self.reader.remaining() / bytes_per_frame as u64) as usize;
        let frames = max_frames.min(whole_frames);
        self.scratch.resize(frames * bytes_per_frame, 0);
        let read = self.reader.read_up_to(&mut self.scratch)?;
        let frames = read / bytes_per_frame;
        let bytes = &self.scratch[..frames * bytes_per_frame];

        if self.descriptor.bits_per_sample == 8 {
            for (sample, byte) in output.iter_mut().zip(bytes) {
                *sample = (i16::from(*byte) - 128) << 8;
            }
        } else {
            for (sample, pair) in output.iter_mut().zip(bytes.chunks_exact(2)) {
                *sample = i16::from_le_bytes([pair[0], pair[1]]);
            }
        }

        if self.reader.remaining() < bytes_per_frame as u64 {
            self.finished = true;
        }
        Ok(frames)
    }

    fn reset(&mut self) -> Result<(), DecodeError> {
        self.reader.rewind()?;
        self.finished = self.reader.remaining() < self.descriptor.bytes_per_frame() as u64;
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }
}
