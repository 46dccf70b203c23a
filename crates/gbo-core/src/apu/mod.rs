//! Sound generation.
//!
//! The four channels are advanced in batches: [`Apu::run`] splits a span of
//! dots at every point where something audible can change (a channel
//! frequency timer, the frame sequencer, or the end of a first-pass output
//! sample) and only recomputes the mixed level at those points.

mod channels;
mod lfsr;

pub use channels::{Envelope, NoiseChannel, PulseChannel, Sweep, WaveChannel};

use serde::{Deserialize, Serialize};

/// Dots between frame sequencer steps (512 Hz).
const SEQUENCER_PERIOD: u32 = 8192;

/// Largest mixed level: four channels at 15, master volume 8.
pub const MAX_MIX: u32 = 0x1E0;

const POWER_ON_REGS: [u8; 0x20] = [
    0x80, 0xBF, 0xF3, 0xFF, 0xBF, 0xFF, 0x3F, 0x00, 0xFF, 0xBF, 0x7F, 0xFF, 0x9F, 0xFF, 0xBF, 0xFF,
    0xFF, 0x00, 0x00, 0xBF, 0x77, 0xF3, 0xF1, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

fn read_mask(addr: u16) -> u8 {
    match addr {
        0xFF10 => 0x80,
        0xFF11 | 0xFF16 => 0x3F,
        0xFF12 | 0xFF17 | 0xFF21 | 0xFF22 | 0xFF24 | 0xFF25 => 0x00,
        0xFF13 | 0xFF18 | 0xFF1B | 0xFF1D | 0xFF20 => 0xFF,
        0xFF14 | 0xFF19 | 0xFF1E | 0xFF23 => 0xBF,
        0xFF1A => 0x7F,
        0xFF1C => 0x9F,
        0xFF26 => 0x70,
        _ => 0xFF,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Apu {
    pub ch1: PulseChannel,
    pub ch2: PulseChannel,
    pub ch3: WaveChannel,
    pub ch4: NoiseChannel,
    /// Last value written to each of FF10-FF2F, for read-back.
    regs: [u8; 0x20],
    pub nr50: u8,
    pub nr51: u8,
    powered: bool,
    sequencer_counter: u32,
    sequencer_step: u8,
    mix_left: u32,
    mix_right: u32,
    /// Dots folded into one first-pass output sample.
    factor: u32,
    downsample_counter: u32,
    acc_left: u32,
    acc_right: u32,
    output_enabled: bool,
    /// Dots queued by the CPU but not yet synthesised.
    pending: u32,
    #[serde(skip)]
    samples: Vec<f32>,
}

impl Apu {
    pub fn new() -> Self {
        Self {
            ch1: PulseChannel::new(true),
            ch2: PulseChannel::new(false),
            ch3: WaveChannel::default(),
            ch4: NoiseChannel::default(),
            regs: [0; 0x20],
            nr50: 0,
            nr51: 0,
            powered: false,
            sequencer_counter: SEQUENCER_PERIOD,
            sequencer_step: 0,
            mix_left: 0,
            mix_right: 0,
            factor: 1,
            downsample_counter: 0,
            acc_left: 0,
            acc_right: 0,
            output_enabled: false,
            pending: 0,
            samples: Vec::new(),
        }
    }

    /// Register state left behind by the boot ROM: channel 1 still enabled
    /// after the start-up chime with its envelope decayed to silence.
    pub fn post_boot() -> Self {
        let mut apu = Self::new();
        apu.powered = true;
        for (i, &val) in POWER_ON_REGS.iter().enumerate() {
            let addr = 0xFF10 + i as u16;
            if addr == 0xFF26 {
                continue;
            }
            let val = match addr {
                0xFF14 | 0xFF19 | 0xFF1E | 0xFF23 => val & 0x7F,
                _ => val,
            };
            apu.write(addr, val);
        }
        apu.regs = POWER_ON_REGS;
        apu.ch1.enabled = true;
        apu.ch1.envelope.volume = 0;
        apu.update_mix();
        apu
    }

    pub fn powered(&self) -> bool {
        self.powered
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF26 => {
                let mut val = read_mask(addr);
                if self.powered {
                    val |= 0x80;
                }
                val |= self.ch1.enabled as u8;
                val |= (self.ch2.enabled as u8) << 1;
                val |= (self.ch3.enabled as u8) << 2;
                val |= (self.ch4.enabled as u8) << 3;
                val
            }
            0xFF30..=0xFF3F => self.ch3.ram[self.ch3.ram_index(addr)],
            0xFF10..=0xFF2F => self.regs[(addr - 0xFF10) as usize] | read_mask(addr),
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        apu_trace!("write {addr:04X} <- {val:02X}");
        if (0xFF30..=0xFF3F).contains(&addr) {
            let idx = self.ch3.ram_index(addr);
            self.ch3.ram[idx] = val;
            return;
        }
        if !self.powered && addr != 0xFF26 {
            return;
        }
        if let Some(slot) = self.regs.get_mut(addr.wrapping_sub(0xFF10) as usize) {
            *slot = val;
        }

        match addr {
            0xFF10 => {
                if let Some(sweep) = self.ch1.sweep.as_mut() {
                    sweep.write(val);
                }
            }
            0xFF11 => self.ch1.write_length(val),
            0xFF12 => self.ch1.write_envelope(val),
            0xFF13 => self.ch1.write_frequency_low(val),
            0xFF14 => {
                self.ch1.write_frequency_high(val);
                if val & 0x80 != 0 {
                    self.ch1.trigger();
                }
            }
            0xFF16 => self.ch2.write_length(val),
            0xFF17 => self.ch2.write_envelope(val),
            0xFF18 => self.ch2.write_frequency_low(val),
            0xFF19 => {
                self.ch2.write_frequency_high(val);
                if val & 0x80 != 0 {
                    self.ch2.trigger();
                }
            }
            0xFF1A => self.ch3.write_dac(val),
            0xFF1B => self.ch3.length = 256 - val as u16,
            0xFF1C => self.ch3.volume_code = (val >> 5) & 0x03,
            0xFF1D => self.ch3.frequency = (self.ch3.frequency & 0x700) | val as u16,
            0xFF1E => {
                self.ch3.write_frequency_high(val);
                if val & 0x80 != 0 {
                    self.ch3.trigger();
                }
            }
            0xFF20 => self.ch4.write_length(val),
            0xFF21 => self.ch4.write_envelope(val),
            0xFF22 => self.ch4.write_polynomial(val),
            0xFF23 => {
                self.ch4.length_enabled = val & 0x40 != 0;
                if val & 0x80 != 0 {
                    self.ch4.trigger();
                }
            }
            0xFF24 => self.nr50 = val,
            0xFF25 => self.nr51 = val,
            0xFF26 => self.write_power(val & 0x80 != 0),
            _ => {}
        }
        self.update_mix();
    }

    fn write_power(&mut self, on: bool) {
        if on && !self.powered {
            self.powered = true;
            self.sequencer_step = 0;
            self.sequencer_counter = SEQUENCER_PERIOD;
        } else if !on && self.powered {
            let wave_ram = self.ch3.ram;
            self.ch1 = PulseChannel::new(true);
            self.ch2 = PulseChannel::new(false);
            self.ch3 = WaveChannel::with_ram(wave_ram);
            self.ch4 = NoiseChannel::default();
            self.regs = [0; 0x20];
            self.nr50 = 0;
            self.nr51 = 0;
            self.powered = false;
        }
    }

    /// FF76: current digital output of channels 1 (low) and 2 (high).
    pub fn pcm12(&self) -> u8 {
        self.ch1.level() | (self.ch2.level() << 4)
    }

    /// FF77: current digital output of channels 3 (low) and 4 (high).
    pub fn pcm34(&self) -> u8 {
        self.ch3.level() | (self.ch4.level() << 4)
    }

    /// Recompute the cached left/right level from the channel outputs,
    /// NR51 routing and NR50 master volume.
    fn update_mix(&mut self) {
        let levels = [
            self.ch1.level() as u32,
            self.ch2.level() as u32,
            self.ch3.level() as u32,
            self.ch4.level() as u32,
        ];
        let mut left = 0;
        let mut right = 0;
        for (i, level) in levels.iter().enumerate() {
            if self.nr51 & (0x10 << i) != 0 {
                left += level;
            }
            if self.nr51 & (0x01 << i) != 0 {
                right += level;
            }
        }
        self.mix_left = left * (((self.nr50 >> 4) & 0x07) as u32 + 1);
        self.mix_right = right * ((self.nr50 & 0x07) as u32 + 1);
    }

    pub fn mix(&self) -> (u32, u32) {
        (self.mix_left, self.mix_right)
    }

    /// Start producing first-pass samples, one per `factor` dots.
    pub fn configure_output(&mut self, factor: u32) {
        self.factor = factor.max(1);
        self.downsample_counter = 0;
        self.acc_left = 0;
        self.acc_right = 0;
        self.output_enabled = true;
    }

    pub fn output_factor(&self) -> u32 {
        self.factor
    }

    pub fn output_enabled(&self) -> bool {
        self.output_enabled
    }

    /// Defer `dots` of synthesis until the next [`Apu::flush`].
    pub fn queue(&mut self, dots: u32) {
        self.pending += dots;
    }

    pub fn flush(&mut self) {
        let dots = std::mem::take(&mut self.pending);
        if dots > 0 {
            self.run(dots);
        }
    }

    /// Interleaved stereo samples produced since the last call.
    pub fn drain_samples(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.samples)
    }

    pub fn run(&mut self, dots: u32) {
        let mut remaining = dots;
        while remaining > 0 {
            let mut chunk = remaining.min(self.sequencer_counter);
            if self.output_enabled {
                chunk = chunk.min(self.factor - self.downsample_counter);
            }
            for counter in [
                self.ch1.counter(),
                self.ch2.counter(),
                self.ch3.counter(),
                self.ch4.counter(),
            ]
            .into_iter()
            .flatten()
            {
                if counter > 0 {
                    chunk = chunk.min(counter);
                }
            }

            if self.output_enabled {
                self.acc_left += self.mix_left * chunk;
                self.acc_right += self.mix_right * chunk;
                self.downsample_counter += chunk;
                if self.downsample_counter >= self.factor {
                    self.emit_sample();
                }
            }

            let mut changed = self.ch1.tick(chunk);
            changed |= self.ch2.tick(chunk);
            changed |= self.ch3.tick(chunk);
            changed |= self.ch4.tick(chunk);

            self.sequencer_counter -= chunk;
            if self.sequencer_counter == 0 {
                self.sequencer_counter = SEQUENCER_PERIOD;
                if self.powered {
                    changed |= self.clock_sequencer();
                }
            }

            if changed {
                self.update_mix();
            }
            remaining -= chunk;
        }
    }

    fn emit_sample(&mut self) {
        let scale = (self.factor * MAX_MIX / 2) as f32;
        self.samples.push(self.acc_left as f32 / scale - 1.0);
        self.samples.push(self.acc_right as f32 / scale - 1.0);
        self.acc_left = 0;
        self.acc_right = 0;
        self.downsample_counter = 0;
    }

    fn clock_sequencer(&mut self) -> bool {
        let step = self.sequencer_step;
        self.sequencer_step = (step + 1) & 7;
        let mut changed = false;
        if step % 2 == 0 {
            changed |= self.ch1.clock_length();
            changed |= self.ch2.clock_length();
            changed |= self.ch3.clock_length();
            changed |= self.ch4.clock_length();
        }
        if step == 2 || step == 6 {
            changed |= self.ch1.clock_sweep();
        }
        if step == 7 {
            changed |= self.ch1.clock_envelope();
            changed |= self.ch2.clock_envelope();
            changed |= self.ch4.clock_envelope();
        }
        changed
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}
