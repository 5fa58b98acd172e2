use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::impulse_response::ImpulseResponse;

/// Destination for the final impulse response.
pub trait OutputSink {
    fn write(&mut self, response: &ImpulseResponse) -> Result<()>;
}

/// Keeps every response written to it.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub responses: Vec<ImpulseResponse>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&ImpulseResponse> {
        self.responses.last()
    }
}

impl OutputSink for MemorySink {
    fn write(&mut self, response: &ImpulseResponse) -> Result<()> {
        self.responses.push(response.clone());
        Ok(())
    }
}

/// Writes one 32-bit float mono WAV file per channel,
/// `<directory>/<stem>_<channel>.wav`.
///
/// Samples are written unscaled; a unit source at 1 m has amplitude 1.
#[derive(Debug, Clone)]
pub struct WavSink {
    directory: PathBuf,
    stem: String,
    written: Vec<PathBuf>,
}

impl WavSink {
    pub fn new<P: AsRef<Path>>(directory: P, stem: &str) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            stem: stem.to_string(),
            written: Vec::new(),
        }
    }

    pub fn channel_path(&self, channel: usize) -> PathBuf {
        self.directory.join(format!("{}_{}.wav", self.stem, channel))
    }

    /// Files written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl OutputSink for WavSink {
    fn write(&mut self, response: &ImpulseResponse) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: response.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        for (index, channel) in response.channels.iter().enumerate() {
            let path = self.channel_path(index);
            let mut writer = hound::WavWriter::create(&path, spec)
                .with_context(|| format!("Failed to create WAV file {}", path.display()))?;
            for &s in channel {
                writer
                    .write_sample(s as f32)
                    .context("Failed to write sample")?;
            }
            writer.finalize().context("Failed to finalize WAV file")?;
            log::info!("Wrote {} ({} samples)", path.display(), channel.len());
            self.written.push(path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_back(path: &Path) -> (Vec<f32>, u32) {
        let reader = hound::WavReader::open(path).unwrap();
        let rate = reader.spec().sample_rate;
        let samples = reader.into_samples::<f32>().map(|s| s.unwrap()).collect();
        (samples, rate)
    }

    #[test]
    fn test_wav_sink_writes_one_file_per_channel() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = WavSink::new(dir.path(), "room");
        let ir = ImpulseResponse::new(48000, vec![vec![0.0, 1.5, -0.25], vec![0.5]]);
        sink.write(&ir).unwrap();

        assert_eq!(sink.written().len(), 2);
        let (left, rate) = read_back(&sink.channel_path(0));
        assert_eq!(rate, 48000);
        // Float samples are not clamped
        assert_eq!(left, vec![0.0, 1.5, -0.25]);
        let (right, _) = read_back(&sink.channel_path(1));
        assert_eq!(right, vec![0.5]);
    }

    #[test]
    fn test_wav_sink_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = WavSink::new(dir.path().join("missing"), "ir");
        let ir = ImpulseResponse::new(8000, vec![vec![0.0]]);
        let err = sink.write(&ir).unwrap_err();
        assert!(err.to_string().contains("Failed to create WAV file"));
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::new();
        let ir = ImpulseResponse::new(8000, vec![vec![1.0]]);
        sink.write(&ir).unwrap();
        assert_eq!(sink.last(), Some(&ir));
    }
}
