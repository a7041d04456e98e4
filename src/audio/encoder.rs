use anyhow::{Context, Result};
use std::io::Cursor;

/// One finalized segment of encoded audio.
#[derive(Debug, Clone)]
pub struct EncodedSegment {
    /// Encoded WAV bytes, ready for upload
    pub bytes: Vec<u8>,
    /// Number of PCM samples in the segment
    pub sample_count: usize,
    /// Segment duration in milliseconds
    pub duration_ms: u64,
}

/// Accumulates captured PCM and finalizes it into fixed-duration WAV
/// segments, in memory.
///
/// Rotation is loss-free: `rotate()` takes exactly one segment's worth of
/// samples and leaves everything past the boundary buffered for the next
/// segment, so the finalize-and-resume sequence is atomic from the
/// caller's point of view. Concatenating all produced segments in order
/// reconstructs the captured stream with no gap or overlap.
pub struct SegmentEncoder {
    sample_rate: u32,
    channels: u16,
    samples_per_segment: usize,
    buffer: Vec<i16>,
}

impl SegmentEncoder {
    /// Encoded blobs smaller than this are considered spurious (startup or
    /// rotation jitter) and silently dropped.
    pub const MIN_PAYLOAD_BYTES: usize = 1024;

    pub fn new(sample_rate: u32, channels: u16, segment_duration_secs: u32) -> Self {
        let samples_per_segment =
            sample_rate as usize * channels as usize * segment_duration_secs as usize;

        Self {
            sample_rate,
            channels,
            samples_per_segment,
            buffer: Vec::new(),
        }
    }

    /// Append captured samples to the current segment.
    pub fn push(&mut self, samples: &[i16]) {
        self.buffer.extend_from_slice(samples);
    }

    /// Number of samples buffered toward the next boundary.
    pub fn buffered_samples(&self) -> usize {
        self.buffer.len()
    }

    /// True once a full segment's worth of samples is buffered.
    pub fn boundary_reached(&self) -> bool {
        self.buffer.len() >= self.samples_per_segment
    }

    /// Finalize one segment's worth of samples into a WAV blob.
    ///
    /// Returns `None` when the encoded blob is under the minimum payload
    /// size; those samples are discarded.
    pub fn rotate(&mut self) -> Result<Option<EncodedSegment>> {
        let take = self.buffer.len().min(self.samples_per_segment);
        let segment: Vec<i16> = self.buffer.drain(..take).collect();
        self.encode(&segment)
    }

    /// Finalize everything still buffered. No new segment is started.
    pub fn finish(mut self) -> Result<Option<EncodedSegment>> {
        let segment: Vec<i16> = self.buffer.drain(..).collect();
        self.encode(&segment)
    }

    fn encode(&self, samples: &[i16]) -> Result<Option<EncodedSegment>> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer =
                hound::WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;

            for &sample in samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }

            writer.finalize().context("Failed to finalize WAV segment")?;
        }

        let bytes = cursor.into_inner();
        if bytes.len() < Self::MIN_PAYLOAD_BYTES {
            return Ok(None);
        }

        let frames = samples.len() / self.channels as usize;
        Ok(Some(EncodedSegment {
            sample_count: samples.len(),
            duration_ms: frames as u64 * 1000 / self.sample_rate as u64,
            bytes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(segment: &EncodedSegment) -> Vec<i16> {
        let reader = hound::WavReader::new(Cursor::new(segment.bytes.clone())).unwrap();
        reader.into_samples::<i16>().map(|s| s.unwrap()).collect()
    }

    #[test]
    fn rotation_splits_exactly_at_the_boundary() {
        // 1-second segments at 1kHz mono, fed 1.5 segments of a ramp
        let mut encoder = SegmentEncoder::new(1000, 1, 1);
        let input: Vec<i16> = (0..1500).map(|i| i as i16).collect();
        encoder.push(&input);

        assert!(encoder.boundary_reached());
        let first = encoder.rotate().unwrap().expect("full segment");
        assert_eq!(first.sample_count, 1000);
        assert_eq!(first.duration_ms, 1000);
        assert!(!encoder.boundary_reached());

        let rest = encoder.finish().unwrap().expect("partial segment");
        assert_eq!(rest.sample_count, 500);

        // No gap or overlap across the rotation
        let mut reassembled = decode(&first);
        reassembled.extend(decode(&rest));
        assert_eq!(reassembled, input);
    }

    #[test]
    fn tiny_segments_are_dropped() {
        let mut encoder = SegmentEncoder::new(16000, 1, 30);
        encoder.push(&[7i16; 100]); // 200 bytes of PCM, well under the threshold
        assert!(encoder.finish().unwrap().is_none());
    }

    #[test]
    fn empty_rotation_yields_nothing() {
        let mut encoder = SegmentEncoder::new(16000, 1, 30);
        assert!(encoder.rotate().unwrap().is_none());
    }
}
