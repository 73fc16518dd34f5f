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
    fs::File,
    io::{self, BufReader, ErrorKind, Read, Seek, SeekFrom},
    path::Path,
};

use tracing::debug;

use super::error::{ContainerError, DecodeError};
use super::riff::{self, Compression, StreamDescriptor};

pub mod adpcm;
pub mod ima_adpcm;
pub mod ms_adpcm;
pub mod pcm;

#[cfg(test)]
mod tests;

pub use adpcm::{AdpcmDecoder, BlockCodec};
pub use ima_adpcm::ImaAdpcmDecoder;
pub use ms_adpcm::MsAdpcmDecoder;
pub use pcm::PcmDecoder;

/// Anything a container can be read from.
pub trait ByteSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> ByteSource for T {}

/// A restartable decoder producing signed 16-bit interleaved frames in the
/// stream's own channel layout.
pub trait SampleDecoder: Send {
    /// Decodes up to `max_frames` frames into `output`, which must hold at
    /// least `max_frames * channel_count()` samples. Returns the number of
    /// frames written; fewer than requested at the end of the stream and zero
    /// once it is exhausted. Samples past the returned frames, up to
    /// `max_frames`, are zeroed.
    fn decode(&mut self, output: &mut [i16], max_frames: usize) -> Result<usize, DecodeError>;

    /// Rewinds to the first data byte and clears any predictor state.
    fn reset(&mut self) -> Result<(), DecodeError>;

    /// True once every frame of the stream has been handed out.
    fn is_finished(&self) -> bool;

    /// The parameters this decoder was opened with.
    fn descriptor(&self) -> &StreamDescriptor;

    fn channel_count(&self) -> u16 {
        self.descriptor().channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.descriptor().sample_rate
    }
}

impl SampleDecoder for Box<dyn SampleDecoder> {
    fn decode(&mut self, output: &mut [i16], max_frames: usize) -> Result<usize, DecodeError> {
        (**self).decode(output, max_frames)
    }

    fn reset(&mut self) -> Result<(), DecodeError> {
        (**self).reset()
    }

    fn is_finished(&self) -> bool {
        (**self).is_finished()
    }

    fn descriptor(&self) -> &StreamDescriptor {
        (**self).descriptor()
    }
}

/// Opens the decoder matching the descriptor's compression code. The source is
/// positioned at the data chunk before the decoder is returned.
pub fn open_decoder(
    descriptor: StreamDescriptor,
    source: Box<dyn ByteSource>,
) -> Result<Box<dyn SampleDecoder>, DecodeError> {
    debug!(stream = %descriptor, "Opening decoder");
    let reader = DataReader::new(source, &descriptor)?;
    Ok(match descriptor.compression {
        Compression::Pcm => Box::new(PcmDecoder::new(descriptor, reader)),
        Compression::ImaAdpcm => Box::new(ImaAdpcmDecoder::new(descriptor, reader)),
        Compression::MsAdpcm => Box::new(MsAdpcmDecoder::new(descriptor, reader)),
    })
}

/// Parses a container and opens a decoder over it. The decoder takes
/// ownership of the source and drops it along with itself.
pub fn make_decoded_stream<S: ByteSource + 'static>(
    mut source: S,
) -> Result<Box<dyn SampleDecoder>, ContainerError> {
    let descriptor = riff::parse(&mut source)?;
    open_decoder(descriptor, Box::new(source)).map_err(|e| match e {
        DecodeError::Io(e) => ContainerError::Io(e),
        other => ContainerError::Malformed(other.to_string()),
    })
}

/// Opens a decoder over a file on disk.
pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Box<dyn SampleDecoder>, ContainerError> {
    let file = File::open(path.as_ref())?;
    make_decoded_stream(BufReader::new(file))
}

/// Checks the caller's buffer and zeroes the part of it the decoder may leave
/// untouched.
pub(crate) fn prepare_output(
    output: &mut [i16],
    max_frames: usize,
    channels: usize,
) -> Result<(), DecodeError> {
    let required = max_frames * channels;
    if output.len() < required {
        return Err(DecodeError::OutputTooSmall {
            available: output.len(),
            required,
        });
    }
    output[..required].fill(0);
    Ok(())
}

/// Reads the data chunk of a container, never past its declared extent.
pub(crate) struct DataReader {
    source: Box<dyn ByteSource>,
    data_offset: u64,
    data_size: u64,
    remaining: u64,
}

impl DataReader {
    pub(crate) fn new(
        mut source: Box<dyn ByteSource>,
        descriptor: &StreamDescriptor,
    ) -> io::Result<DataReader> {
        source.seek(SeekFrom::Start(descriptor.data_offset))?;
        let data_size = u64::from(descriptor.data_byte_size);
        Ok(DataReader {
            source,
            data_offset: descriptor.data_offset,
            data_size,
            remaining: data_size,
        })
    }

    /// Fills as much of `buf` as the data chunk allows. A short count means
    /// the chunk (or the source) has ended.
    pub(crate) fn read_up_to(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = (buf.len() as u64).min(self.remaining) as usize;
        let mut filled = 0;
        while filled < want {
            match self.source.read(&mut buf[filled..want]) {
                Ok(0) => {
                    // The source is shorter than the header claimed.
                    self.remaining = 0;
                    return Ok(filled);
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.remaining -= filled as u64;
        Ok(filled)
    }

    pub(crate) fn remaining(&self) -> u64 {
        self.remaining
    }

    pub(crate) fn rewind(&mut self) -> io::Result<()> {
        self.source.seek(SeekFrom::Start(self.data_offset))?;
        self.remaining = self.data_size;
        Ok(())
    }
}
