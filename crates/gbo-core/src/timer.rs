use serde::{Deserialize, Serialize};

use crate::interrupt::{Interrupt, Interrupts};

/// CPU cycles per DIV increment (16384 Hz in single speed).
const DIV_PERIOD: u32 = 0x100;

/// DIV and TIMA. Counts CPU cycles, so double speed doubles both rates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timer {
    /// Visible DIV register.
    pub div: u8,
    /// Sub-counter feeding DIV; DIV steps when it reaches [`DIV_PERIOD`].
    div_ticks: u32,
    pub tima: u8,
    pub tma: u8,
    pub tac: u8,
    /// Cycles accumulated toward the next TIMA increment.
    timer_ticks: u32,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            div: 0,
            div_ticks: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            timer_ticks: 0,
        }
    }

    /// Register values left behind by the DMG/CGB boot ROM.
    pub fn post_boot(cgb: bool) -> Self {
        Self {
            div: if cgb { 0x1E } else { 0xAB },
            div_ticks: 0xCC,
            ..Self::new()
        }
    }

    pub fn enabled(&self) -> bool {
        self.tac & 0x04 != 0
    }

    /// CPU cycles per TIMA increment for the selected clock.
    pub fn period(&self) -> u32 {
        match self.tac & 0x03 {
            0 => 1024,
            1 => 16,
            2 => 64,
            _ => 256,
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => self.div,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF04 => {
                // The register clears; the sub-counter keeps its phase.
                self.div = 0;
                self.div_ticks &= 0xFF;
            }
            0xFF05 => self.tima = val,
            0xFF06 => self.tma = val,
            // The running count carries over to the new clock.
            0xFF07 => self.tac = val & 0x07,
            _ => {}
        }
    }

    /// Advance by `cycles` CPU cycles, reloading TIMA from TMA and
    /// requesting the timer interrupt on every overflow.
    pub fn step(&mut self, cycles: u32, irq: &mut Interrupts) {
        self.div_ticks += cycles;
        if self.div_ticks >= DIV_PERIOD {
            self.div = self.div.wrapping_add((self.div_ticks / DIV_PERIOD) as u8);
            self.div_ticks %= DIV_PERIOD;
        }

        if !self.enabled() {
            return;
        }
        let period = self.period();
        self.timer_ticks += cycles;
        while self.timer_ticks >= period {
            self.timer_ticks -= period;
            let (next, overflow) = self.tima.overflowing_add(1);
            if overflow {
                self.tima = self.tma;
                irq.request(Interrupt::Timer);
            } else {
                self.tima = next;
            }
        }
    }

    /// CPU cycles until TIMA next overflows, if the timer is running.
    pub fn cycles_until_overflow(&self) -> Option<u32> {
        if !self.enabled() {
            return None;
        }
        let increments = 0x100 - self.tima as u32;
        Some((increments * self.period()).saturating_sub(self.timer_ticks))
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
