use serde::{Deserialize, Serialize};

use super::lfsr;

const DUTY_TABLE: [[u8; 8]; 4] = [
    [0, 0, 0, 0, 0, 0, 0, 1],
    [1, 0, 0, 0, 0, 0, 0, 1],
    [1, 0, 0, 0, 0, 1, 1, 1],
    [0, 1, 1, 1, 1, 1, 1, 0],
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    pub initial: u8,
    pub add: bool,
    pub period: u8,
    pub volume: u8,
    timer: u8,
}

impl Envelope {
    pub fn write(&mut self, val: u8) {
        self.initial = val >> 4;
        self.add = val & 0x08 != 0;
        self.period = val & 0x07;
    }

    fn trigger(&mut self) {
        self.volume = self.initial;
        self.timer = self.period;
    }

    /// Step 7 of the frame sequencer. Returns true if the volume moved.
    fn clock(&mut self) -> bool {
        if self.period == 0 {
            return false;
        }
        if self.timer > 0 {
            self.timer -= 1;
        }
        if self.timer > 0 {
            return false;
        }
        self.timer = self.period;
        if self.add && self.volume < 15 {
            self.volume += 1;
            true
        } else if !self.add && self.volume > 0 {
            self.volume -= 1;
            true
        } else {
            false
        }
    }
}

/// Channel 1 frequency sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sweep {
    pub period: u8,
    pub negate: bool,
    pub shift: u8,
    timer: u8,
    shadow: u16,
    enabled: bool,
}

impl Sweep {
    pub fn write(&mut self, val: u8) {
        self.period = (val >> 4) & 0x07;
        self.negate = val & 0x08 != 0;
        self.shift = val & 0x07;
    }

    fn calculate(&self) -> u16 {
        let delta = self.shadow >> self.shift;
        if self.negate {
            self.shadow - delta
        } else {
            self.shadow + delta
        }
    }

    fn reload_timer(&mut self) {
        self.timer = if self.period == 0 { 8 } else { self.period };
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PulseChannel {
    pub enabled: bool,
    pub dac_enabled: bool,
    /// Remaining length ticks (64 max).
    pub length: u16,
    pub length_enabled: bool,
    pub duty: u8,
    duty_pos: u8,
    pub frequency: u16,
    counter: u32,
    pub envelope: Envelope,
    pub sweep: Option<Sweep>,
}

impl PulseChannel {
    pub fn new(with_sweep: bool) -> Self {
        Self {
            sweep: with_sweep.then(Sweep::default),
            ..Self::default()
        }
    }

    fn period(&self) -> u32 {
        (2048 - self.frequency as u32) * 4
    }

    pub fn level(&self) -> u8 {
        if self.enabled && DUTY_TABLE[self.duty as usize][self.duty_pos as usize] != 0 {
            self.envelope.volume
        } else {
            0
        }
    }

    pub fn write_length(&mut self, val: u8) {
        self.duty = val >> 6;
        self.length = 64 - (val & 0x3F) as u16;
    }

    pub fn write_envelope(&mut self, val: u8) {
        self.envelope.write(val);
        self.dac_enabled = val & 0xF8 != 0;
        if !self.dac_enabled {
            self.enabled = false;
        }
    }

    pub fn write_frequency_low(&mut self, val: u8) {
        self.frequency = (self.frequency & 0x700) | val as u16;
    }

    pub fn write_frequency_high(&mut self, val: u8) {
        self.frequency = (self.frequency & 0xFF) | (((val & 0x07) as u16) << 8);
        self.length_enabled = val & 0x40 != 0;
    }

    pub fn trigger(&mut self) {
        self.enabled = self.dac_enabled;
        if self.length == 0 {
            self.length = 64;
        }
        self.counter = self.period();
        self.envelope.trigger();
        let frequency = self.frequency;
        if let Some(sweep) = self.sweep.as_mut() {
            sweep.shadow = frequency;
            sweep.reload_timer();
            sweep.enabled = sweep.period != 0 || sweep.shift != 0;
            if sweep.shift != 0 && sweep.calculate() > 0x7FF {
                self.enabled = false;
            }
        }
    }

    /// Advance the frequency timer; true when the output level may change.
    pub fn tick(&mut self, dots: u32) -> bool {
        if !self.enabled {
            return false;
        }
        self.counter = self.counter.saturating_sub(dots);
        if self.counter > 0 {
            return false;
        }
        self.counter = self.period();
        self.duty_pos = (self.duty_pos + 1) & 7;
        true
    }

    pub fn counter(&self) -> Option<u32> {
        self.enabled.then_some(self.counter)
    }

    pub fn clock_length(&mut self) -> bool {
        clock_length(self.length_enabled, &mut self.length, &mut self.enabled)
    }

    pub fn clock_envelope(&mut self) -> bool {
        self.enabled && self.envelope.clock()
    }

    /// Sequencer steps 2 and 6. An overflowing result disables the channel,
    /// and the written-back frequency is checked a second time.
    pub fn clock_sweep(&mut self) -> bool {
        let Some(sweep) = self.sweep.as_mut() else {
            return false;
        };
        if sweep.timer > 0 {
            sweep.timer -= 1;
        }
        if sweep.timer > 0 {
            return false;
        }
        sweep.reload_timer();
        if !sweep.enabled || sweep.period == 0 || !self.enabled {
            return false;
        }
        let next = sweep.calculate();
        if next > 0x7FF {
            self.enabled = false;
            return true;
        }
        if sweep.shift == 0 {
            return false;
        }
        sweep.shadow = next;
        self.frequency = next;
        if sweep.calculate() > 0x7FF {
            self.enabled = false;
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveChannel {
    pub enabled: bool,
    pub dac_enabled: bool,
    pub length: u16,
    pub length_enabled: bool,
    pub volume_code: u8,
    pub frequency: u16,
    position: u8,
    sample: u8,
    counter: u32,
    pub ram: [u8; 16],
}

impl Default for WaveChannel {
    fn default() -> Self {
        Self {
            enabled: false,
            dac_enabled: false,
            length: 0,
            length_enabled: false,
            volume_code: 0,
            frequency: 0,
            position: 0,
            sample: 0,
            counter: 0,
            ram: [
                0x84, 0x40, 0x43, 0xAA, 0x2D, 0x78, 0x92, 0x3C, 0x60, 0x59, 0x59, 0xB0, 0x34,
                0xB8, 0x2E, 0xDA,
            ],
        }
    }
}

impl WaveChannel {
    /// Power-on channel state around existing wave RAM.
    pub fn with_ram(ram: [u8; 16]) -> Self {
        Self {
            ram,
            ..Self::default()
        }
    }

    fn period(&self) -> u32 {
        (2048 - self.frequency as u32) * 2
    }

    pub fn level(&self) -> u8 {
        if !self.enabled {
            return 0;
        }
        match self.volume_code {
            0 => 0,
            code => self.sample >> (code - 1),
        }
    }

    pub fn write_dac(&mut self, val: u8) {
        self.dac_enabled = val & 0x80 != 0;
        if !self.dac_enabled {
            self.enabled = false;
        }
    }

    pub fn write_frequency_high(&mut self, val: u8) {
        self.frequency = (self.frequency & 0xFF) | (((val & 0x07) as u16) << 8);
        self.length_enabled = val & 0x40 != 0;
    }

    pub fn trigger(&mut self) {
        self.enabled = self.dac_enabled;
        if self.length == 0 {
            self.length = 256;
        }
        self.position = 0;
        self.counter = self.period();
    }

    pub fn tick(&mut self, dots: u32) -> bool {
        if !self.enabled {
            return false;
        }
        self.counter = self.counter.saturating_sub(dots);
        if self.counter > 0 {
            return false;
        }
        self.counter = self.period();
        self.position = (self.position + 1) & 31;
        let byte = self.ram[(self.position >> 1) as usize];
        self.sample = if self.position & 1 == 0 { byte >> 4 } else { byte & 0x0F };
        true
    }

    pub fn counter(&self) -> Option<u32> {
        self.enabled.then_some(self.counter)
    }

    /// Wave RAM index the CPU reaches: the playing byte while active.
    pub fn ram_index(&self, addr: u16) -> usize {
        if self.enabled {
            (self.position >> 1) as usize
        } else {
            (addr & 0x0F) as usize
        }
    }

    pub fn clock_length(&mut self) -> bool {
        clock_length(self.length_enabled, &mut self.length, &mut self.enabled)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoiseChannel {
    pub enabled: bool,
    pub dac_enabled: bool,
    pub length: u16,
    pub length_enabled: bool,
    pub envelope: Envelope,
    pub shift: u8,
    pub short_mode: bool,
    pub divisor: u8,
    step: usize,
    counter: u32,
}

impl NoiseChannel {
    fn period(&self) -> u32 {
        let base = ((self.divisor as u32) << 4).max(8);
        base << self.shift
    }

    pub fn level(&self) -> u8 {
        if !self.enabled {
            return 0;
        }
        lfsr::level(self.short_mode, self.step, self.envelope.volume)
    }

    pub fn write_length(&mut self, val: u8) {
        self.length = 64 - (val & 0x3F) as u16;
    }

    pub fn write_envelope(&mut self, val: u8) {
        self.envelope.write(val);
        self.dac_enabled = val & 0xF8 != 0;
        if !self.dac_enabled {
            self.enabled = false;
        }
    }

    pub fn write_polynomial(&mut self, val: u8) {
        self.shift = val >> 4;
        self.short_mode = val & 0x08 != 0;
        self.divisor = val & 0x07;
        self.step &= lfsr::step_mask(self.short_mode);
    }

    pub fn trigger(&mut self) {
        self.enabled = self.dac_enabled;
        if self.length == 0 {
            self.length = 64;
        }
        self.step = 0;
        self.counter = self.period();
        self.envelope.trigger();
    }

    pub fn tick(&mut self, dots: u32) -> bool {
        if !self.enabled {
            return false;
        }
        self.counter = self.counter.saturating_sub(dots);
        if self.counter > 0 {
            return false;
        }
        self.counter = self.period();
        self.step = (self.step + 1) & lfsr::step_mask(self.short_mode);
        true
    }

    pub fn counter(&self) -> Option<u32> {
        self.enabled.then_some(self.counter)
    }

    pub fn clock_length(&mut self) -> bool {
        clock_length(self.length_enabled, &mut self.length, &mut self.enabled)
    }

    pub fn clock_envelope(&mut self) -> bool {
        self.enabled && self.envelope.clock()
    }
}

fn clock_length(length_enabled: bool, length: &mut u16, enabled: &mut bool) -> bool {
    if !length_enabled || *length == 0 {
        return false;
    }
    *length -= 1;
    if *length == 0 && *enabled {
        *enabled = false;
        return true;
    }
    false
}
