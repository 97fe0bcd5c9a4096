//! Decoded audio frames and the sub-chunk accumulator.

use std::time::Duration;

/// A block of mono f32 samples (-1.0..1.0) at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length of this frame.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Concatenates engine sub-chunks until a frame is big enough to play without
/// stutter. Many tiny sink buffers cause audible gaps on most backends.
#[derive(Debug)]
pub struct FrameAccumulator {
    buffer: Vec<f32>,
    min_samples: usize,
    sample_rate: u32,
}

impl FrameAccumulator {
    pub fn new(min_samples: usize, sample_rate: u32) -> Self {
        Self {
            buffer: Vec::with_capacity(min_samples),
            min_samples,
            sample_rate,
        }
    }

    /// Append a sub-chunk; returns a frame once the minimum size is reached.
    pub fn push(&mut self, chunk: &[f32]) -> Option<AudioFrame> {
        self.buffer.extend_from_slice(chunk);
        if self.buffer.len() >= self.min_samples {
            return Some(self.take());
        }
        None
    }

    /// Residual audio shorter than the minimum, if any.
    pub fn flush(&mut self) -> Option<AudioFrame> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.take())
    }

    /// Drop buffered audio without emitting it.
    pub fn discard(&mut self) -> usize {
        let n = self.buffer.len();
        self.buffer.clear();
        n
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn take(&mut self) -> AudioFrame {
        let samples = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.min_samples));
        AudioFrame::new(samples, self.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_duration() {
        let frame = AudioFrame::new(vec![0.0; 12_000], 24_000);
        assert_eq!(frame.duration(), Duration::from_millis(500));
        assert_eq!(AudioFrame::new(vec![0.0; 10], 0).duration(), Duration::ZERO);
    }

    #[test]
    fn accumulates_until_minimum() {
        let mut acc = FrameAccumulator::new(10, 24_000);
        assert!(acc.push(&[0.1; 4]).is_none());
        assert!(acc.push(&[0.2; 4]).is_none());
        let frame = acc.push(&[0.3; 4]).expect("12 >= 10");
        assert_eq!(frame.len(), 12);
        assert_eq!(frame.samples[0], 0.1);
        assert_eq!(frame.samples[11], 0.3);
        assert_eq!(acc.buffered(), 0);
    }

    #[test]
    fn flush_emits_partial_once() {
        let mut acc = FrameAccumulator::new(10, 24_000);
        acc.push(&[0.5; 3]);
        assert_eq!(acc.flush().unwrap().len(), 3);
        assert!(acc.flush().is_none());
    }

    #[test]
    fn discard_drops_partial() {
        let mut acc = FrameAccumulator::new(10, 24_000);
        acc.push(&[0.5; 3]);
        assert_eq!(acc.discard(), 3);
        assert!(acc.flush().is_none());
    }
}
