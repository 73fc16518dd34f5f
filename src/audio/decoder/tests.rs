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
#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::audio::decoder::{make_decoded_stream, open_file, SampleDecoder};
    use crate::audio::error::{ContainerError, DecodeError};
    use crate::audio::riff::{WAVE_FORMAT_IMA_ADPCM, WAVE_FORMAT_MS_ADPCM};
    use crate::testutil::{hound_wav, RiffBuilder};

    /// Reads the whole stream, `chunk` frames at a time.
    trait DecodeAll {
        fn decode_all(&mut self, chunk: usize) -> Result<Vec<i16>, DecodeError>;
    }

    impl<T: SampleDecoder + ?Sized> DecodeAll for T {
        fn decode_all(&mut self, chunk: usize) -> Result<Vec<i16>, DecodeError> {
            let channels = self.channel_count() as usize;
            let mut buffer = vec![0i16; chunk * channels];
            let mut all = Vec::new();
            loop {
                let frames = self.decode(&mut buffer, chunk)?;
                if frames == 0 {
                    break;
                }
                all.extend_from_slice(&buffer[..frames * channels]);
            }
            Ok(all)
        }
    }

    const IMA_BLOCK: [u8; 8] = [100, 0, 0, 0, 0x37, 0x8c, 0x00, 0x00];
    const IMA_BLOCK_FRAMES: [i16; 9] = [100, 113, 127, 112, 110, 112, 113, 114, 115];

    fn ima_stream(data: Vec<u8>) -> Box<dyn SampleDecoder> {
        let bytes = RiffBuilder::new()
            .fmt(WAVE_FORMAT_IMA_ADPCM, 1, 11025, 8, 4, &[])
            .data(data)
            .build();
        make_decoded_stream(Cursor::new(bytes)).unwrap()
    }

    const MS_BLOCK: [u8; 9] = [0, 16, 0, 200, 0, 100, 0, 0x12, 0xf4];

    fn ms_stream(data: Vec<u8>) -> Box<dyn SampleDecoder> {
        ms_stream_aligned(9, data)
    }

    fn ms_stream_aligned(block_align: u16, data: Vec<u8>) -> Box<dyn SampleDecoder> {
        let bytes = RiffBuilder::new()
            .fmt(WAVE_FORMAT_MS_ADPCM, 1, 11025, block_align, 4, &[])
            .data(data)
            .build();
        make_decoded_stream(Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn test_pcm_16_bit_round_trip() {
        let payload: Vec<i16> = (0..500).map(|i| (i * 131 - 30000) as i16).collect();
        let bytes = hound_wav::<i16>(2, 22050, 16, &payload);

        let mut decoder = make_decoded_stream(Cursor::new(bytes)).unwrap();
        assert_eq!(decoder.channel_count(), 2);
        assert_eq!(decoder.sample_rate(), 22050);
        assert_eq!(decoder.decode_all(64).unwrap(), payload);
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_pcm_8_bit_is_recentered() {
        let bytes = hound_wav::<i8>(1, 8000, 8, &[-128, 0, 127]);
        let mut decoder = make_decoded_stream(Cursor::new(bytes)).unwrap();
        assert_eq!(decoder.decode_all(16).unwrap(), vec![-32768, 0, 32512]);
    }

    #[test]
    fn test_one_second_of_silence() {
        let bytes = RiffBuilder::new()
            .pcm_fmt(1, 11025, 8)
            .data(vec![128; 11025])
            .build();
        let mut decoder = make_decoded_stream(Cursor::new(bytes)).unwrap();
        assert_eq!(decoder.descriptor().total_frames(), 11025);

        let frames = decoder.decode_all(2048).unwrap();
        assert_eq!(frames.len(), 11025);
        assert!(frames.iter().all(|s| *s == 0));
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_short_read_zeroes_requested_tail_only() {
        let bytes = hound_wav::<i16>(1, 8000, 16, &[1, 2, 3]);
        let mut decoder = make_decoded_stream(Cursor::new(bytes)).unwrap();

        let mut output = [7i16; 8];
        assert_eq!(decoder.decode(&mut output, 5).unwrap(), 3);
        assert_eq!(output, [1, 2, 3, 0, 0, 7, 7, 7]);
        assert!(decoder.is_finished());

        assert_eq!(decoder.decode(&mut output, 5).unwrap(), 0);
        assert_eq!(&output[..5], &[0; 5]);
    }

    #[test]
    fn test_output_too_small() {
        let bytes = hound_wav::<i16>(2, 8000, 16, &[1, 2, 3, 4]);
        let mut decoder = make_decoded_stream(Cursor::new(bytes)).unwrap();
        let mut output = [0i16; 3];
        assert!(matches!(
            decoder.decode(&mut output, 2),
            Err(DecodeError::OutputTooSmall {
                available: 3,
                required: 4
            })
        ));
    }

    #[test]
    fn test_ima_block_expansion() {
        let mut decoder = ima_stream(IMA_BLOCK.to_vec());
        assert_eq!(decoder.descriptor().samples_per_block, Some(9));
        assert_eq!(decoder.decode_all(1024).unwrap(), IMA_BLOCK_FRAMES);
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_ima_partial_final_block() {
        let mut data = IMA_BLOCK.to_vec();
        // A 6 byte tail: header plus two bytes of zero nibbles.
        data.extend_from_slice(&[100, 0, 0, 0, 0, 0]);
        let mut decoder = ima_stream(data);
        assert_eq!(decoder.descriptor().total_frames(), 14);

        let frames = decoder.decode_all(1024).unwrap();
        assert_eq!(&frames[..9], &IMA_BLOCK_FRAMES);
        // Zero nibbles at step 7 add nothing.
        assert_eq!(&frames[9..], &[100; 5]);
    }

    #[test]
    fn test_ima_chunking_does_not_change_output() {
        let data: Vec<u8> = IMA_BLOCK.iter().chain(IMA_BLOCK.iter()).copied().collect();
        let whole = ima_stream(data.clone()).decode_all(1024).unwrap();
        let chunked = ima_stream(data).decode_all(2).unwrap();
        assert_eq!(whole.len(), 18);
        assert_eq!(whole, chunked);
    }

    #[test]
    fn test_ima_bad_step_index_faults() {
        let mut decoder = ima_stream(vec![0, 0, 89, 0, 0, 0, 0, 0]);
        let mut output = [0i16; 16];
        assert!(matches!(
            decoder.decode(&mut output, 16),
            Err(DecodeError::Fault { block: 0, .. })
        ));
    }

    #[test]
    fn test_ima_reset_restarts_stream() {
        let mut decoder = ima_stream(IMA_BLOCK.to_vec());
        let first = decoder.decode_all(4).unwrap();
        assert!(decoder.is_finished());

        decoder.reset().unwrap();
        assert!(!decoder.is_finished());
        assert_eq!(decoder.decode_all(4).unwrap(), first);
    }

    #[test]
    fn test_ms_block_expansion() {
        // Predictor 0, delta 16, sample1 200, sample2 100.
        let mut decoder = ms_stream(MS_BLOCK.to_vec());
        assert_eq!(decoder.descriptor().samples_per_block, Some(6));
        assert_eq!(
            decoder.decode_all(1024).unwrap(),
            vec![100, 200, 216, 248, 232, 296]
        );
    }

    #[test]
    fn test_ms_partial_final_block() {
        let mut data = MS_BLOCK.to_vec();
        // An 8 byte tail: header plus one byte holding two nibbles.
        data.extend_from_slice(&MS_BLOCK[..8]);
        let mut decoder = ms_stream(data);
        assert_eq!(decoder.descriptor().total_frames(), 10);

        let frames = decoder.decode_all(4).unwrap();
        assert_eq!(
            frames,
            vec![100, 200, 216, 248, 232, 296, 100, 200, 216, 248]
        );
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_ms_long_run_of_large_nibbles_saturates() {
        // Predictor 0, delta 16, both seeds 0, then nothing but -8 nibbles.
        let mut data = vec![0, 16, 0, 0, 0, 0, 0];
        data.extend_from_slice(&[0x88; 249]);
        let mut decoder = ms_stream_aligned(256, data);
        assert_eq!(decoder.descriptor().samples_per_block, Some(500));

        let frames = decoder.decode_all(1024).unwrap();
        assert_eq!(frames.len(), 500);
        assert_eq!(frames[499], i16::MIN);
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_ms_reset_restarts_stream() {
        let mut decoder = ms_stream(MS_BLOCK.to_vec());
        let first = decoder.decode_all(3).unwrap();
        decoder.reset().unwrap();
        assert_eq!(decoder.decode_all(5).unwrap(), first);
    }

    #[test]
    fn test_ms_bad_predictor_faults() {
        let mut data = IMA_BLOCK.to_vec();
        data.insert(0, 7);
        let mut decoder = ms_stream(data);
        let mut output = [0i16; 8];
        assert!(matches!(
            decoder.decode(&mut output, 8),
            Err(DecodeError::Fault { block: 0, .. })
        ));
    }

    #[test]
    fn test_make_decoded_stream_rejects_unsupported() {
        let bytes = RiffBuilder::new()
            .fmt(0x0055, 2, 44100, 1, 0, &[])
            .data(vec![0; 16])
            .build();
        assert!(matches!(
            make_decoded_stream(Cursor::new(bytes)),
            Err(ContainerError::Unsupported(_))
        ));
    }

    #[test]
    fn test_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        std::fs::write(&path, hound_wav::<i16>(1, 11025, 16, &[10, -10, 20, -20])).unwrap();

        let mut decoder = open_file(&path).unwrap();
        assert_eq!(decoder.decode_all(3).unwrap(), vec![10, -10, 20, -20]);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            open_file(dir.path().join("missing.wav")),
            Err(ContainerError::Io(_))
        ));
    }
}
