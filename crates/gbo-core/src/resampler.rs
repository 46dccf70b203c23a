//! Sample-rate conversion for interleaved audio.
//!
//! Upsampling interpolates linearly between neighbouring frames.
//! Downsampling averages every input frame that overlaps an output period,
//! carrying any partial period over to the next call so that block
//! boundaries neither drop nor repeat input.

use crate::error::ResampleError;

/// Where resampled data ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSemantics {
    /// Results stay in the resampler's own buffer; [`Resampler::resample`]
    /// reports how many samples were written and [`Resampler::output`]
    /// exposes them.
    InPlace,
    /// [`Resampler::resample`] hands back the produced samples directly.
    CopyOut,
}

#[derive(Debug)]
pub enum Resampled<'a> {
    Written(usize),
    Samples(&'a [f32]),
}

impl Resampled<'_> {
    pub fn len(&self) -> usize {
        match self {
            Resampled::Written(len) => *len,
            Resampled::Samples(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Bypass,
    Linear,
    MultiTap,
}

#[derive(Debug, Clone)]
pub struct Resampler {
    channels: usize,
    ratio_weight: f64,
    mode: Mode,
    semantics: OutputSemantics,
    output: Vec<f32>,
    written: usize,
    last_output: Vec<f64>,
    last_weight: f64,
    tail_exists: bool,
    tap: Vec<f64>,
}

impl Resampler {
    pub fn new(
        from_rate: f64,
        to_rate: f64,
        channels: usize,
        output_size: usize,
        semantics: OutputSemantics,
    ) -> Result<Self, ResampleError> {
        if !(from_rate > 0.0 && to_rate > 0.0 && channels > 0) {
            return Err(ResampleError::InvalidSettings);
        }
        let (mode, ratio_weight, last_weight) = if from_rate == to_rate {
            (Mode::Bypass, 1.0, 0.0)
        } else if from_rate < to_rate {
            (Mode::Linear, from_rate / to_rate, 1.0)
        } else {
            (Mode::MultiTap, from_rate / to_rate, 0.0)
        };
        Ok(Self {
            channels,
            ratio_weight,
            mode,
            semantics,
            output: vec![0.0; output_size],
            written: 0,
            last_output: vec![0.0; channels],
            last_weight,
            tail_exists: false,
            tap: vec![0.0; channels],
        })
    }

    /// Input frames consumed per output frame.
    pub fn ratio_weight(&self) -> f64 {
        self.ratio_weight
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Samples produced by the most recent [`Resampler::resample`] call.
    pub fn output(&self) -> &[f32] {
        &self.output[..self.written]
    }

    pub fn resample<'a>(&'a mut self, input: &'a [f32]) -> Result<Resampled<'a>, ResampleError> {
        if input.len() % self.channels != 0 {
            return Err(ResampleError::IncorrectSampleLength {
                len: input.len(),
                channels: self.channels,
            });
        }
        if self.mode == Mode::Bypass {
            return Ok(match self.semantics {
                OutputSemantics::InPlace => {
                    self.output.clear();
                    self.output.extend_from_slice(input);
                    self.written = input.len();
                    Resampled::Written(self.written)
                }
                OutputSemantics::CopyOut => Resampled::Samples(input),
            });
        }

        self.written = if input.is_empty() {
            0
        } else if self.mode == Mode::Linear {
            self.linear(input)
        } else {
            self.multi_tap(input)
        };
        Ok(match self.semantics {
            OutputSemantics::InPlace => Resampled::Written(self.written),
            OutputSemantics::CopyOut => Resampled::Samples(&self.output[..self.written]),
        })
    }

    fn linear(&mut self, input: &[f32]) -> usize {
        let channels = self.channels;
        let out_len = self.output.len();
        let mut out = 0;
        let mut weight = self.last_weight;

        // Frames between the previous call's last input and this one's first.
        while weight < 1.0 && out + channels <= out_len {
            let second = weight % 1.0;
            let first = 1.0 - second;
            for c in 0..channels {
                self.output[out] = (self.last_output[c] * first + input[c] as f64 * second) as f32;
                out += 1;
            }
            weight += self.ratio_weight;
        }
        weight -= 1.0;

        let limit = input.len() - channels;
        let mut src = weight.floor() as usize * channels;
        while out + channels <= out_len && src < limit {
            let second = weight % 1.0;
            let first = 1.0 - second;
            for c in 0..channels {
                self.output[out] =
                    (input[src + c] as f64 * first + input[src + channels + c] as f64 * second) as f32;
                out += 1;
            }
            weight += self.ratio_weight;
            src = weight.floor() as usize * channels;
        }

        let src = src.min(limit);
        for c in 0..channels {
            self.last_output[c] = input[src + c] as f64;
        }
        self.last_weight = weight % 1.0;
        out
    }

    fn multi_tap(&mut self, input: &[f32]) -> usize {
        let channels = self.channels;
        let len = input.len();
        let out_len = self.output.len();
        let mut out = 0;
        let mut actual = 0usize;
        let mut current = 0.0f64;
        let mut tail_done = !self.tail_exists;
        self.tail_exists = false;

        loop {
            let mut weight;
            if tail_done {
                weight = self.ratio_weight;
                self.tap.fill(0.0);
            } else {
                weight = self.last_weight;
                self.tap.copy_from_slice(&self.last_output);
                tail_done = true;
            }

            while weight > 0.0 && actual < len {
                let to_next = 1.0 + actual as f64 - current;
                if weight >= to_next {
                    for tap in self.tap.iter_mut() {
                        *tap += input[actual] as f64 * to_next;
                        actual += 1;
                    }
                    current = actual as f64;
                    weight -= to_next;
                } else {
                    for (c, tap) in self.tap.iter_mut().enumerate() {
                        *tap += input[actual + c] as f64 * weight;
                    }
                    current += weight;
                    weight = 0.0;
                    break;
                }
            }

            if weight <= 0.0 {
                if out + channels > out_len {
                    break;
                }
                for c in 0..channels {
                    self.output[out] = (self.tap[c] / self.ratio_weight) as f32;
                    out += 1;
                }
            } else {
                self.last_weight = weight;
                self.last_output.copy_from_slice(&self.tap);
                self.tail_exists = true;
                break;
            }

            if actual >= len || out >= out_len {
                break;
            }
        }
        out
    }
}
