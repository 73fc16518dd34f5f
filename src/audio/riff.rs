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
//! RIFF/WAVE header parsing. Only metadata is extracted here; samples are left
//! for the decoders.

use std::{
    fmt,
    io::{Read, Seek, SeekFrom},
    ops::BitOr,
    time::Duration,
};

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::{debug, warn};

use super::error::ContainerError;

pub const WAVE_FORMAT_PCM: u16 = 0x0001;
pub const WAVE_FORMAT_MS_ADPCM: u16 = 0x0002;
pub const WAVE_FORMAT_IMA_ADPCM: u16 = 0x0011;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xfffe;

/// Minimum size of the fixed part of a fmt chunk.
const FMT_CHUNK_MIN_SIZE: u32 = 16;

/// Per-channel header sizes of an ADPCM block.
const IMA_BLOCK_HEADER: usize = 4;
const MS_BLOCK_HEADER: usize = 7;

/// The codecs this crate can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Pcm,
    MsAdpcm,
    ImaAdpcm,
}

impl Compression {
    pub fn from_code(code: u16) -> Option<Compression> {
        match code {
            WAVE_FORMAT_PCM => Some(Compression::Pcm),
            WAVE_FORMAT_MS_ADPCM => Some(Compression::MsAdpcm),
            WAVE_FORMAT_IMA_ADPCM => Some(Compression::ImaAdpcm),
            _ => None,
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Compression::Pcm => WAVE_FORMAT_PCM,
            Compression::MsAdpcm => WAVE_FORMAT_MS_ADPCM,
            Compression::ImaAdpcm => WAVE_FORMAT_IMA_ADPCM,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::Pcm => write!(f, "PCM"),
            Compression::MsAdpcm => write!(f, "MS ADPCM"),
            Compression::ImaAdpcm => write!(f, "IMA ADPCM"),
        }
    }
}

/// Legacy playback flags describing the raw sample layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamFlags(u8);

impl StreamFlags {
    pub const UNSIGNED: StreamFlags = StreamFlags(1 << 0);
    pub const SIXTEEN_BITS: StreamFlags = StreamFlags(1 << 1);
    pub const LITTLE_ENDIAN: StreamFlags = StreamFlags(1 << 2);
    pub const STEREO: StreamFlags = StreamFlags(1 << 3);

    pub fn empty() -> StreamFlags {
        StreamFlags(0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: StreamFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for StreamFlags {
    type Output = StreamFlags;

    fn bitor(self, rhs: StreamFlags) -> StreamFlags {
        StreamFlags(self.0 | rhs.0)
    }
}

/// The summary a caller gets back from a header probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub byte_size: u32,
    pub sample_rate: u32,
    pub flags: StreamFlags,
    pub compression_tag: u16,
    pub block_align: u16,
}

/// Parameters of one audio stream inside a container. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bits_per_sample: u16,
    pub compression: Compression,
    pub block_align: u16,
    pub data_byte_size: u32,
    pub data_offset: u64,
    /// Frames per ADPCM block. None for PCM.
    pub samples_per_block: Option<u16>,
    /// MS ADPCM predictor coefficients from the format extension, if any.
    pub coefficients: Option<Vec<(i16, i16)>>,
}

impl StreamDescriptor {
    pub fn compression_code(&self) -> u16 {
        self.compression.code()
    }

    /// Bytes per PCM frame. Meaningless for ADPCM.
    pub fn bytes_per_frame(&self) -> usize {
        self.channel_count as usize * (self.bits_per_sample as usize / 8)
    }

    /// Number of frames the data chunk decodes to.
    pub fn total_frames(&self) -> u64 {
        let data = u64::from(self.data_byte_size);
        match (self.compression, self.samples_per_block) {
            (Compression::Pcm, _) => {
                let bpf = self.bytes_per_frame() as u64;
                if bpf == 0 {
                    0
                } else {
                    data / bpf
                }
            }
            (compression, Some(spb)) => {
                let block = u64::from(self.block_align);
                let full = data / block * u64::from(spb);
                let tail = (data % block) as usize;
                full + partial_block_frames(compression, self.channel_count as usize, tail) as u64
            }
            (_, None) => 0,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_frames() as f64 / f64::from(self.sample_rate))
    }

    pub fn flags(&self) -> StreamFlags {
        let mut flags = StreamFlags::empty();
        if self.channel_count == 2 {
            flags = flags | StreamFlags::STEREO;
        }
        match self.compression {
            Compression::Pcm if self.bits_per_sample == 8 => flags | StreamFlags::UNSIGNED,
            Compression::Pcm => flags | StreamFlags::SIXTEEN_BITS | StreamFlags::LITTLE_ENDIAN,
            // ADPCM decodes to native 16-bit samples.
            _ => flags | StreamFlags::SIXTEEN_BITS,
        }
    }

    pub fn info(&self) -> WavInfo {
        WavInfo {
            byte_size: self.data_byte_size,
            sample_rate: self.sample_rate,
            flags: self.flags(),
            compression_tag: self.compression_code(),
            block_align: self.block_align,
        }
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}Hz {}ch {}bit block={} data={}@{}",
            self.compression,
            self.sample_rate,
            self.channel_count,
            self.bits_per_sample,
            self.block_align,
            self.data_byte_size,
            self.data_offset
        )
    }
}

/// Frames contained in a trailing ADPCM block of `len` bytes.
pub(crate) fn partial_block_frames(compression: Compression, channels: usize, len: usize) -> usize {
    match compression {
        Compression::Pcm => 0,
        Compression::ImaAdpcm => {
            let header = IMA_BLOCK_HEADER * channels;
            if len < header {
                return 0;
            }
            if channels == 1 {
                return 1 + (len - header) * 2;
            }
            // Stereo data interleaves the channels in 4-byte groups of 8 nibbles.
            let groups = (len - header) / (4 * channels);
            1 + groups * 8
        }
        Compression::MsAdpcm => {
            let header = MS_BLOCK_HEADER * channels;
            if len < header {
                return 0;
            }
            2 + (len - header) * 2 / channels
        }
    }
}

/// Raw contents of the fmt chunk before validation.
struct FormatChunk {
    code: u16,
    channels: u16,
    sample_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
    extension: Vec<u8>,
}

/// Parses the RIFF/WAVE header from `source`, leaving the read position at the
/// first byte of sample data. On error the source is rewound to where it was.
pub fn parse<R: Read + Seek + ?Sized>(source: &mut R) -> Result<StreamDescriptor, ContainerError> {
    let start = source.stream_position()?;
    let result = parse_from(source);
    if let Err(e) = &result {
        debug!(err = %e, "Rewinding after failed container parse");
        let _ = source.seek(SeekFrom::Start(start));
    }
    result
}

/// The legacy probe: header summary only.
pub fn load_wav_info<R: Read + Seek + ?Sized>(source: &mut R) -> Result<WavInfo, ContainerError> {
    parse(source).map(|descriptor| descriptor.info())
}

fn parse_from<R: Read + Seek + ?Sized>(source: &mut R) -> Result<StreamDescriptor, ContainerError> {
    let riff_tag = read_tag(source, "RIFF header")?;
    if &riff_tag != b"RIFF" {
        return Err(ContainerError::Malformed("missing RIFF tag".to_string()));
    }
    let _riff_size = source
        .read_u32::<LittleEndian>()
        .map_err(|e| ContainerError::from_header_io(e, "RIFF header"))?;
    let wave_tag = read_tag(source, "RIFF header")?;
    if &wave_tag != b"WAVE" {
        return Err(ContainerError::Malformed("missing WAVE tag".to_string()));
    }

    let mut format: Option<FormatChunk> = None;
    loop {
        let id = match read_tag(source, "chunk header") {
            Ok(id) => id,
            Err(ContainerError::Malformed(_)) => {
                return Err(ContainerError::Malformed(match format {
                    Some(_) => "no data chunk".to_string(),
                    None => "no fmt chunk".to_string(),
                }))
            }
            Err(e) => return Err(e),
        };
        let size = source
            .read_u32::<LittleEndian>()
            .map_err(|e| ContainerError::from_header_io(e, "chunk header"))?;

        match &id {
            b"fmt " => format = Some(read_format_chunk(source, size)?),
            b"data" => {
                let Some(format) = format else {
                    return Err(ContainerError::Malformed(
                        "data chunk before fmt chunk".to_string(),
                    ));
                };
                let data_offset = source.stream_position()?;
                let available = stream_len(source)?.saturating_sub(data_offset);
                let data_byte_size = if u64::from(size) > available {
                    warn!(
                        declared = size,
                        available, "Data chunk runs past end of source, truncating"
                    );
                    available as u32
                } else {
                    size
                };
                return build_descriptor(format, data_byte_size, data_offset);
            }
            _ => {
                debug!(
                    chunk = String::from_utf8_lossy(&id).as_ref(),
                    size, "Skipping chunk"
                );
                source.seek(SeekFrom::Current(padded(size)))?;
            }
        }
    }
}

fn read_tag<R: Read + ?Sized>(source: &mut R, what: &str) -> Result<[u8; 4], ContainerError> {
    let mut tag = [0u8; 4];
    source
        .read_exact(&mut tag)
        .map_err(|e| ContainerError::from_header_io(e, what))?;
    Ok(tag)
}

fn padded(size: u32) -> i64 {
    i64::from(size) + i64::from(size & 1)
}

/// Length of the source without disturbing the read position.
fn stream_len<R: Seek + ?Sized>(source: &mut R) -> Result<u64, ContainerError> {
    let position = source.stream_position()?;
    let end = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(position))?;
    Ok(end)
}

fn read_format_chunk<R: Read + Seek + ?Sized>(
    source: &mut R,
    size: u32,
) -> Result<FormatChunk, ContainerError> {
    if size < FMT_CHUNK_MIN_SIZE {
        return Err(ContainerError::Malformed(format!(
            "fmt chunk is {} bytes, at least {} required",
            size, FMT_CHUNK_MIN_SIZE
        )));
    }

    let mut body = vec![0u8; size as usize];
    source
        .read_exact(&mut body)
        .map_err(|e| ContainerError::from_header_io(e, "fmt chunk"))?;
    if size & 1 == 1 {
        source.seek(SeekFrom::Current(1))?;
    }

    let mut fields = &body[..];
    let mut code = fields.read_u16::<LittleEndian>()?;
    let channels = fields.read_u16::<LittleEndian>()?;
    let sample_rate = fields.read_u32::<LittleEndian>()?;
    let _byte_rate = fields.read_u32::<LittleEndian>()?;
    let block_align = fields.read_u16::<LittleEndian>()?;
    let bits_per_sample = fields.read_u16::<LittleEndian>()?;

    let extension = if fields.len() >= 2 {
        let cb_size = fields.read_u16::<LittleEndian>()? as usize;
        if cb_size > fields.len() {
            return Err(ContainerError::Malformed(format!(
                "fmt extension declares {} bytes, {} present",
                cb_size,
                fields.len()
            )));
        }
        fields[..cb_size].to_vec()
    } else {
        Vec::new()
    };

    if code == WAVE_FORMAT_EXTENSIBLE {
        // valid bits (2), channel mask (4), then the sub-format GUID whose
        // first two bytes carry the real format code.
        if extension.len() < 22 {
            return Err(ContainerError::Malformed(
                "extensible fmt chunk without sub-format".to_string(),
            ));
        }
        code = u16::from_le_bytes([extension[6], extension[7]]);
    }

    Ok(FormatChunk {
        code,
        channels,
        sample_rate,
        block_align,
        bits_per_sample,
        extension,
    })
}

fn build_descriptor(
    format: FormatChunk,
    data_byte_size: u32,
    data_offset: u64,
) -> Result<StreamDescriptor, ContainerError> {
    let Some(compression) = Compression::from_code(format.code) else {
        return Err(ContainerError::Unsupported(format!(
            "compression code 0x{:04x}",
            format.code
        )));
    };
    if format.channels == 0 || format.channels > 2 {
        return Err(ContainerError::Unsupported(format!(
            "{} channels",
            format.channels
        )));
    }
    if format.sample_rate == 0 {
        return Err(ContainerError::Malformed("sample rate is zero".to_string()));
    }

    let channels = format.channels as usize;
    let mut samples_per_block = None;
    let mut coefficients = None;
    match compression {
        Compression::Pcm => {
            if format.bits_per_sample != 8 && format.bits_per_sample != 16 {
                return Err(ContainerError::Unsupported(format!(
                    "{}-bit PCM",
                    format.bits_per_sample
                )));
            }
        }
        Compression::ImaAdpcm | Compression::MsAdpcm => {
            let block_align = format.block_align as usize;
            let header = match compression {
                Compression::ImaAdpcm => IMA_BLOCK_HEADER,
                _ => MS_BLOCK_HEADER,
            } * channels;
            if block_align <= header {
                return Err(ContainerError::Malformed(format!(
                    "block align {} too small for {} {}-channel blocks",
                    block_align, compression, channels
                )));
            }
            if compression == Compression::ImaAdpcm && (block_align - header) % (4 * channels) != 0
            {
                return Err(ContainerError::Malformed(format!(
                    "block align {} is not a whole number of IMA groups",
                    block_align
                )));
            }

            let computed = partial_block_frames(compression, channels, block_align);
            let declared = if format.extension.len() >= 2 {
                Some(u16::from_le_bytes([format.extension[0], format.extension[1]]))
            } else {
                None
            };
            let spb = match declared {
                Some(declared) if declared as usize > computed || declared == 0 => {
                    return Err(ContainerError::Malformed(format!(
                        "{} samples per block declared, block holds {}",
                        declared, computed
                    )));
                }
                Some(declared) => declared,
                None => u16::try_from(computed).map_err(|_| {
                    ContainerError::Malformed(format!("block align {} too large", block_align))
                })?,
            };
            samples_per_block = Some(spb);

            if compression == Compression::MsAdpcm {
                coefficients = read_ms_coefficients(&format.extension)?;
            }
        }
    }

    Ok(StreamDescriptor {
        sample_rate: format.sample_rate,
        channel_count: format.channels,
        bits_per_sample: format.bits_per_sample,
        compression,
        block_align: format.block_align,
        data_byte_size,
        data_offset,
        samples_per_block,
        coefficients,
    })
}

/// Reads the custom predictor table that follows samplesPerBlock in an MS
/// ADPCM format extension.
fn read_ms_coefficients(extension: &[u8]) -> Result<Option<Vec<(i16, i16)>>, ContainerError> {
    if extension.len() < 4 {
        return Ok(None);
    }
    let mut fields = &extension[2..];
    let count = fields.read_u16::<LittleEndian>()? as usize;
    if count == 0 {
        return Ok(None);
    }
    if fields.len() < count * 4 {
        return Err(ContainerError::Malformed(format!(
            "{} coefficient pairs declared, room for {}",
            count,
            fields.len() / 4
        )));
    }
    let mut coefficients = Vec::with_capacity(count);
    for _ in 0..count {
        let c1 = fields.read_i16::<LittleEndian>()?;
        let c2 = fields.read_i16::<LittleEndian>()?;
        coefficients.push((c1, c2));
    }
    Ok(Some(coefficients))
}
