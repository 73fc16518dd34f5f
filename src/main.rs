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
use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use clap::{crate_version, Parser, Subcommand};
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wavemix::audio::{self, open_file, riff};
use wavemix::config::{self, Audio};

/// Frames decoded per call when converting files.
const DECODE_CHUNK_FRAMES: usize = 4096;

/// How often the play command checks whether streams are still running.
const PLAY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long the play command waits for the output thread to come up.
const READY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Decodes and mixes RIFF/WAVE audio through a double-buffered output."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prints the stream parameters of a WAVE file.
    Info {
        /// The file to inspect.
        path: PathBuf,
    },
    /// Decodes a WAVE file (PCM, IMA or MS ADPCM) into 16-bit PCM.
    Decode {
        /// The file to decode.
        path: PathBuf,
        /// Where to write the decoded WAVE file.
        output: PathBuf,
    },
    /// Plays one or more files concurrently through the output device.
    Play {
        /// The path to an audio config file.
        #[arg[short, long]]
        config: Option<PathBuf>,
        /// The device to play through. Names starting with "mock" use the mock device.
        #[arg[short, long]]
        device: Option<String>,
        /// The output rate in Hz.
        #[arg[short, long]]
        rate: Option<u32>,
        /// The files to play.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info { path } => print_info(&path)?,
        Commands::Decode { path, output } => {
            let frames = decode_to_wav(&path, &output)?;
            println!(
                "Decoded {} frames from {} into {}.",
                frames,
                path.display(),
                output.display()
            );
        }
        Commands::Play {
            config,
            device,
            rate,
            files,
        } => {
            let mut audio_config = match config {
                Some(path) => config::load_audio(&path)?,
                None => Audio::default(),
            };
            if let Some(device) = device {
                audio_config = audio_config.with_device(&device);
            }
            if let Some(rate) = rate {
                audio_config = audio_config.with_output_rate(rate);
            }
            play(&audio_config, &files)?;
        }
    }

    Ok(())
}

fn print_info(path: &Path) -> Result<(), Box<dyn Error>> {
    let mut reader = BufReader::new(File::open(path)?);
    let descriptor = riff::parse(&mut reader)?;
    let info = descriptor.info();

    println!("{}:", path.display());
    println!("  Compression: {} (0x{:04x})", descriptor.compression, info.compression_tag);
    println!("  Sample rate: {}Hz", descriptor.sample_rate);
    println!("  Channels: {}", descriptor.channel_count);
    println!("  Bits per sample: {}", descriptor.bits_per_sample);
    println!("  Block align: {}", descriptor.block_align);
    if let Some(samples_per_block) = descriptor.samples_per_block {
        println!("  Samples per block: {}", samples_per_block);
    }
    println!("  Data: {} bytes at offset {}", info.byte_size, descriptor.data_offset);
    println!("  Flags: 0x{:02x}", info.flags.bits());
    println!(
        "  Frames: {} ({:.3}s)",
        descriptor.total_frames(),
        descriptor.duration().as_secs_f64()
    );
    Ok(())
}

fn decode_to_wav(path: &Path, output: &Path) -> Result<u64, Box<dyn Error>> {
    let mut decoder = open_file(path)?;
    let channels = decoder.channel_count();
    let mut writer = WavWriter::create(
        output,
        WavSpec {
            channels,
            sample_rate: decoder.sample_rate(),
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )?;

    let mut buffer = vec![0i16; DECODE_CHUNK_FRAMES * channels as usize];
    let mut total = 0u64;
    loop {
        let frames = decoder.decode(&mut buffer, DECODE_CHUNK_FRAMES)?;
        if frames == 0 {
            break;
        }
        for sample in &buffer[..frames * channels as usize] {
            writer.write_sample(*sample)?;
        }
        total += frames as u64;
    }
    writer.finalize()?;
    info!(path = %path.display(), frames = total, "Decoded file");
    Ok(total)
}

fn play(audio_config: &Audio, files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let manager = audio::start(audio_config)?;
    if !manager.is_enabled() {
        return Err("audio output is unavailable".into());
    }

    let started = Instant::now();
    while !manager.is_ready() {
        if started.elapsed() > READY_TIMEOUT {
            return Err("audio output never became ready".into());
        }
        thread::sleep(PLAY_POLL_INTERVAL);
    }

    for file in files {
        match open_file(file) {
            Ok(decoder) => {
                let handle = manager.play(decoder);
                println!("Playing {} as stream {}.", file.display(), handle);
            }
            Err(e) => warn!(path = %file.display(), err = %e, "Skipping file"),
        }
    }

    while manager.mixer().active_count() > 0 {
        if !manager.is_ready() {
            return Err("audio output stopped on a device failure".into());
        }
        thread::sleep(PLAY_POLL_INTERVAL);
    }
    println!("Finished playing {} file(s).", files.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, channels: u16, samples: &[i16]) {
        let mut writer = WavWriter::create(
            path,
            WavSpec {
                channels,
                sample_rate: 8000,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
        )
        .unwrap();
        for sample in samples {
            writer.write_sample(*sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_to_wav() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        let samples: Vec<i16> = (0..5000).map(|i| (i % 300) as i16 - 150).collect();
        write_wav(&input, 2, &samples);

        assert_eq!(decode_to_wav(&input, &output).unwrap(), 2500);

        let reader = hound::WavReader::open(&output).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 8000);
        let decoded: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_print_info_rejects_non_wave() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.txt");
        std::fs::write(&input, b"definitely not a RIFF file").unwrap();
        assert!(print_info(&input).is_err());
    }

    #[test]
    fn test_play_through_mock_device() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.wav");
        let second = dir.path().join("second.wav");
        write_wav(&first, 1, &[100; 3000]);
        write_wav(&second, 2, &[-100; 1000]);

        let audio_config = Audio::new("mock").with_output_rate(8000);
        play(&audio_config, &[first, second]).unwrap();
    }
}
