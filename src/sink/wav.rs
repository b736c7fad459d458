//! WAV file sink

use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::constants::CANONICAL_SAMPLE_RATE;
use crate::error::SinkError;
use crate::sink::Sink;

/// Canonical-format WAV writer (48 kHz, mono, 16-bit)
pub struct WavSink {
    path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
    samples_written: u64,
}

impl WavSink {
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: CANONICAL_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(path, spec)
            .map_err(|e| SinkError::Open(format!("{}: {}", path.display(), e)))?;
        tracing::info!("Recording mix to {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            samples_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }
}

impl Sink for WavSink {
    fn write(&mut self, frame: &[i16]) -> Result<(), SinkError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SinkError::Write("sink already finished".to_string()))?;
        for &s in frame {
            writer.write_sample(s)?;
        }
        self.samples_written += frame.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        match self.writer.take() {
            Some(writer) => {
                writer
                    .finalize()
                    .map_err(|e| SinkError::Finalize(e.to_string()))?;
                tracing::info!(
                    "Finalized {} ({} samples)",
                    self.path.display(),
                    self.samples_written
                );
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for WavSink {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_file_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mix.wav");

        let mut sink = WavSink::create(&path).unwrap();
        sink.write(&[1000; 480]).unwrap();
        sink.write(&[-1000; 480]).unwrap();
        sink.finish().unwrap();
        sink.finish().unwrap();
        assert!(sink.write(&[0; 480]).is_err());

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 960);
        assert_eq!(samples[0], 1000);
        assert_eq!(samples[959], -1000);
    }

    #[test]
    fn test_drop_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropped.wav");
        {
            let mut sink = WavSink::create(&path).unwrap();
            sink.write(&[7; 100]).unwrap();
        }
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 100);
    }
}
