//! Host-facing audio buffer.
//!
//! The core writes first-pass samples with [`AudioOutput::write`]; the host
//! audio callback pulls fixed-size blocks at the device rate with
//! [`AudioOutput::fill`]. Resampling happens lazily on the pull side.

use crate::error::ResampleError;
use crate::resampler::{OutputSemantics, Resampler};

/// Frames handed to the device per callback.
pub const SAMPLES_PER_CALLBACK: usize = 2048;

#[derive(Debug, Clone)]
pub struct AudioOutput {
    channels: usize,
    min_buffer: usize,
    max_buffer: usize,
    volume: f32,
    /// First-pass samples waiting to be resampled.
    pending: Vec<f32>,
    resampler: Resampler,
    ring: Vec<f32>,
    ring_start: usize,
    ring_end: usize,
}

impl AudioOutput {
    /// `min_buffer` and `max_buffer` are in samples (frames times channels)
    /// at `source_rate`. Out-of-range values fall back to one callback's
    /// worth of samples.
    pub fn new(
        channels: usize,
        source_rate: f64,
        device_rate: f64,
        min_buffer: usize,
        max_buffer: usize,
        volume: f32,
    ) -> Result<Self, ResampleError> {
        let channels = channels.max(1);
        let block = SAMPLES_PER_CALLBACK * channels;
        let min_buffer = if min_buffer >= block && min_buffer < max_buffer {
            min_buffer - min_buffer % channels
        } else {
            block
        };
        let max_buffer = if max_buffer > min_buffer + channels {
            max_buffer - max_buffer % channels
        } else {
            min_buffer * channels
        };
        let volume = if (0.0..=1.0).contains(&volume) { volume } else { 1.0 };

        let source_rate = source_rate.abs();
        if source_rate == 0.0 {
            return Err(ResampleError::InvalidSettings);
        }
        let ring_size =
            (max_buffer * (device_rate / source_rate).ceil() as usize + channels).max(block);
        let resampler = Resampler::new(
            source_rate,
            device_rate,
            channels,
            ring_size,
            OutputSemantics::InPlace,
        )?;
        log::debug!(
            "audio output: {channels} ch, {source_rate:.0} Hz -> {device_rate:.0} Hz, buffer {min_buffer}..{max_buffer}"
        );

        Ok(Self {
            channels,
            min_buffer,
            max_buffer,
            volume,
            pending: Vec::with_capacity(max_buffer),
            resampler,
            ring: vec![0.0; ring_size],
            ring_start: 0,
            ring_end: 0,
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn min_buffer(&self) -> usize {
        self.min_buffer
    }

    pub fn max_buffer(&self) -> usize {
        self.max_buffer
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Values outside 0..=1 are ignored.
    pub fn set_volume(&mut self, volume: f32) {
        if (0.0..=1.0).contains(&volume) {
            self.volume = volume;
        }
    }

    /// Queue interleaved samples; anything beyond the maximum buffer is
    /// dropped.
    pub fn write(&mut self, samples: &[f32]) {
        let room = self.max_buffer.saturating_sub(self.pending.len());
        let take = samples.len().min(room);
        self.pending.extend_from_slice(&samples[..take]);
    }

    /// Buffered audio, expressed in source-rate samples.
    pub fn remaining_buffer(&self) -> usize {
        let resampled = self.resampled_left() as f64 * self.resampler.ratio_weight();
        let frames = (resampled / self.channels as f64).floor() as usize;
        frames * self.channels + self.pending.len()
    }

    /// Samples missing below the minimum buffer, if any.
    pub fn deficit(&self) -> usize {
        self.min_buffer.saturating_sub(self.remaining_buffer())
    }

    /// Fill `out` with interleaved samples at the device rate, scaled by the
    /// volume. Missing samples are written as silence.
    pub fn fill(&mut self, out: &mut [f32]) -> Result<(), ResampleError> {
        self.refill()?;
        let mut written = 0;
        while written + self.channels <= out.len() && self.ring_start != self.ring_end {
            for _ in 0..self.channels {
                out[written] = self.ring[self.ring_start] * self.volume;
                written += 1;
                self.ring_start += 1;
            }
            if self.ring_start == self.ring.len() {
                self.ring_start = 0;
            }
        }
        out[written..].fill(0.0);
        Ok(())
    }

    /// One callback's worth of interleaved samples.
    pub fn fill_block(&mut self) -> Result<Vec<f32>, ResampleError> {
        let mut block = vec![0.0; SAMPLES_PER_CALLBACK * self.channels];
        self.fill(&mut block)?;
        Ok(block)
    }

    /// Drop everything buffered on both sides of the resampler.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.ring_start = 0;
        self.ring_end = 0;
    }

    fn resampled_left(&self) -> usize {
        if self.ring_start <= self.ring_end {
            self.ring_end - self.ring_start
        } else {
            self.ring.len() + self.ring_end - self.ring_start
        }
    }

    fn refill(&mut self) -> Result<(), ResampleError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let len = self.resampler.resample(&self.pending)?.len();
        let size = self.ring.len();
        for &sample in &self.resampler.output()[..len] {
            self.ring[self.ring_end] = sample;
            self.ring_end += 1;
            if self.ring_end == size {
                self.ring_end = 0;
            }
            // Overwrite the oldest frame rather than stalling.
            if self.ring_start == self.ring_end {
                self.ring_start += self.channels;
                if self.ring_start >= size {
                    self.ring_start = 0;
                }
            }
        }
        self.pending.clear();
        Ok(())
    }
}
