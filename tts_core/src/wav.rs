use std::io::{Seek, Write};
use std::path::Path;

use anyhow::Context;

use crate::format::SampleFormat;

/// Convert f32 samples in [-1.0, 1.0] to little-endian 16-bit PCM bytes.
pub fn pcm16_from_f32(samples: &[f32]) -> Vec<u8> {
    const I16_MAX_F32: f32 = i16::MAX as f32;

    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * I16_MAX_F32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Write raw little-endian PCM to `path` as a WAV file.
pub fn write_pcm_wav<P: AsRef<Path>>(path: P, pcm: &[u8], format: SampleFormat) -> anyhow::Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_wav(std::io::BufWriter::new(file), pcm, format)
}

fn write_wav<W: Write + Seek>(sink: W, pcm: &[u8], format: SampleFormat) -> anyhow::Result<()> {
    let width = format.sample_width as usize;
    if !matches!(width, 1..=4) {
        anyhow::bail!("unsupported sample width: {} bytes", width);
    }
    if format.channels == 0 || format.sample_rate == 0 {
        anyhow::bail!("invalid sample format: {:?}", format);
    }

    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: (width * 8) as u16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer =
        hound::WavWriter::new(sink, spec).map_err(|e| anyhow::anyhow!("wav write err: {e}"))?;

    // Partial trailing frames are dropped.
    let usable = pcm.len() - pcm.len() % format.frame_size();
    for sample in pcm[..usable].chunks_exact(width) {
        let result = match *sample {
            // 8-bit PCM is unsigned on the wire; hound expects it centred on zero.
            [b] => writer.write_sample((b as i16 - 128) as i8),
            [lo, hi] => writer.write_sample(i16::from_le_bytes([lo, hi])),
            [b0, b1, b2] => writer.write_sample(i32::from_le_bytes([0, b0, b1, b2]) >> 8),
            [b0, b1, b2, b3] => writer.write_sample(i32::from_le_bytes([b0, b1, b2, b3])),
            _ => unreachable!("chunks_exact yields {width}-byte slices"),
        };
        result.map_err(|e| anyhow::anyhow!("wav sample err: {e}"))?;
    }

    writer
        .finalize()
        .map_err(|e| anyhow::anyhow!("wav finalize err: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode(pcm: &[u8], format: SampleFormat) -> anyhow::Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        write_wav(&mut cursor, pcm, format)?;
        Ok(cursor.into_inner())
    }

    #[test]
    fn test_pcm16_from_f32_clamps() {
        let bytes = pcm16_from_f32(&[0.0, 1.0, -2.0]);
        assert_eq!(bytes.len(), 6);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 0);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), -i16::MAX);
    }

    #[test]
    fn test_wav_reads_back() {
        let samples: Vec<i16> = vec![0, 1000, -1000, i16::MAX, i16::MIN];
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        let wav = encode(&pcm, SampleFormat::default()).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(wav.len(), 44 + pcm.len());

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 22_050);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_trailing_partial_frame_dropped() {
        let wav = encode(&[1, 0, 2, 0, 9], SampleFormat::default()).unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.len(), 2);
    }

    #[test]
    fn test_unsupported_width() {
        let format = SampleFormat::new(22_050, 8, 1);
        assert!(encode(&[0; 16], format).is_err());
    }

    #[test]
    fn test_write_pcm_wav_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        write_pcm_wav(&path, &[0u8; 441 * 2], SampleFormat::default()).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.duration(), 441);
    }
}
