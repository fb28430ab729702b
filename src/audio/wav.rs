use super::format::AudioFormat;
use crate::error::PipelineError;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;

/// Wrap accumulated raw PCM bytes in a WAV container.
///
/// The bytes are little-endian 16-bit frames in arrival order; the whole
/// buffer is written and finalized in one pass, so the file either exists
/// complete or not at all. An odd byte count means a torn frame somewhere in
/// the stream and is rejected rather than rounded away.
pub fn write_pcm(path: &Path, pcm: &[u8], format: AudioFormat) -> Result<(), PipelineError> {
    if pcm.len() % format.bytes_per_frame() != 0 {
        return Err(PipelineError::MalformedFragment(format!(
            "accumulated {} bytes, not a whole number of {}-byte frames",
            pcm.len(),
            format.bytes_per_frame()
        )));
    }

    let spec = WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: AudioFormat::BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .map_err(|e| PipelineError::FileUnreadable(format!("{}: {}", path.display(), e)))?;

    for frame in pcm.chunks_exact(2) {
        writer
            .write_sample(i16::from_le_bytes([frame[0], frame[1]]))
            .map_err(|e| PipelineError::FileUnreadable(format!("{}: {}", path.display(), e)))?;
    }

    writer
        .finalize()
        .map_err(|e| PipelineError::FileUnreadable(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answer.wav");

        // Two frames: 0x0102 and 0xfffe as little-endian i16
        let pcm = [0x02u8, 0x01, 0xfe, 0xff];
        write_pcm(&path, &pcm, AudioFormat::default()).unwrap();

        let mut reader = WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 24_000);
        assert_eq!(spec.bits_per_sample, 16);

        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0x0102, -2]);
    }

    #[test]
    fn test_torn_frame_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answer.wav");

        let err = write_pcm(&path, &[0x01, 0x02, 0x03], AudioFormat::default()).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedFragment(_)));
    }

    #[test]
    fn test_empty_stream_yields_empty_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answer.wav");

        write_pcm(&path, &[], AudioFormat::default()).unwrap();

        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 0);
    }
}
