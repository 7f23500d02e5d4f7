use std::fs::File;
use std::path::Path;

use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
    io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};

use super::AudioError;

/// Raw decoded audio in interleaved `f32` samples.
pub(crate) struct DecodedAudio {
    pub(crate) samples: Vec<f32>,
    pub(crate) sample_rate: u32,
    pub(crate) channels: u16,
}

/// Decode a whole file into interleaved `f32` samples.
pub(crate) fn decode_audio(path: &Path) -> Result<DecodedAudio, AudioError> {
    let file = File::open(path).map_err(|source| AudioError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| AudioError::decode(path, format!("probe failed: {err}")))?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| AudioError::decode(path, "no default track"))?;
    let codec_params = &track.codec_params;
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| AudioError::decode(path, "missing sample rate"))?;
    let channels = codec_params
        .channels
        .ok_or_else(|| AudioError::decode(path, "missing channel count"))?
        .count() as u16;

    let mut decoder = symphonia::default::get_codecs()
        .make(codec_params, &DecoderOptions::default())
        .map_err(|err| AudioError::decode(path, format!("decoder init failed: {err}")))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(_)) => break,
            Err(err) => {
                return Err(AudioError::decode(path, format!("packet read failed: {err}")));
            }
        };
        let audio_buf = match decoder.decode(&packet) {
            Ok(audio_buf) => audio_buf,
            Err(Error::DecodeError(_)) => continue,
            Err(err) => return Err(AudioError::decode(path, format!("decode failed: {err}"))),
        };
        let spec = *audio_buf.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.is_empty() {
        return Err(AudioError::Empty(path.to_path_buf()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate: sample_rate.max(1),
        channels: channels.max(1),
    })
}

/// Average interleaved channels into one mono signal.
pub(crate) fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return samples.iter().copied().map(sanitize_sample).collect();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().copied().map(sanitize_sample).sum::<f32>() / channels as f32)
        .collect()
}

fn sanitize_sample(sample: f32) -> f32 {
    if sample.is_finite() { sample } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use tempfile::TempDir;

    #[test]
    fn decodes_stereo_wav_and_downmixes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..2_205 {
            writer.write_sample::<f32>(0.5).unwrap();
            writer.write_sample::<f32>(-0.25).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = decode_audio(&path).unwrap();
        assert_eq!(decoded.sample_rate, 22_050);
        assert_eq!(decoded.channels, 2);
        let mono = downmix_to_mono(&decoded.samples, decoded.channels);
        assert_eq!(mono.len(), 2_205);
        assert!(mono.iter().all(|v| (v - 0.125).abs() < 1e-6));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"definitely not a riff header").unwrap();
        assert!(decode_audio(&path).is_err());
    }

    #[test]
    fn missing_file_reports_open_error() {
        let dir = TempDir::new().unwrap();
        let err = decode_audio(&dir.path().join("nope.wav")).err().unwrap();
        assert!(matches!(err, AudioError::Open { .. }));
    }

    #[test]
    fn non_finite_samples_are_zeroed() {
        let mono = downmix_to_mono(&[f32::NAN, 0.5, f32::INFINITY, 0.25], 2);
        assert_eq!(mono, vec![0.25, 0.125]);
    }
}
