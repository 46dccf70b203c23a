use serde::{Deserialize, Serialize};

use crate::CYCLES_PER_SECOND;

const RTC_BLOB_MAGIC: &[u8; 4] = b"RTC1";
const RTC_BLOB_VERSION: u8 = 1;
const RTC_BLOB_LEN: usize = 4 + 1 + 8 + 4 + 6 + 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcRegisters {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    /// Nine-bit day counter.
    pub days: u16,
    pub halt: bool,
    pub carry: bool,
}

impl RtcRegisters {
    /// Day-high register: bit 0 day bit 8, bit 6 halt, bit 7 carry.
    fn control_byte(&self) -> u8 {
        let mut out = ((self.days >> 8) as u8) & 0x01;
        if self.halt {
            out |= 0x40;
        }
        if self.carry {
            out |= 0x80;
        }
        out
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.seconds & 0x3F);
        out.push(self.minutes & 0x3F);
        out.push(self.hours & 0x1F);
        out.extend_from_slice(&(self.days & 0x01FF).to_le_bytes());
        out.push(self.halt as u8 | (self.carry as u8) << 1);
    }

    fn decode(data: &[u8]) -> Self {
        Self {
            seconds: data[0] & 0x3F,
            minutes: data[1] & 0x3F,
            hours: data[2] & 0x1F,
            days: u16::from_le_bytes([data[3], data[4]]) & 0x01FF,
            halt: data[5] & 0x01 != 0,
            carry: data[5] & 0x02 != 0,
        }
    }
}

/// MBC3 real-time clock. Runs on emulated time; wall-clock catch-up only
/// happens when a persisted blob is loaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rtc {
    regs: RtcRegisters,
    latched: RtcRegisters,
    subsecond_cycles: u32,
    /// Set by a 0x00 write to the latch register; a following 0x01 latches.
    latch_armed: bool,
}

impl Rtc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registers(&self) -> RtcRegisters {
        self.regs
    }

    pub fn latched(&self) -> RtcRegisters {
        self.latched
    }

    /// Write to 0x6000-0x7FFF.
    pub fn write_latch(&mut self, value: u8) {
        if value == 0x00 {
            self.latch_armed = true;
        } else {
            if value == 0x01 && self.latch_armed {
                self.latched = self.regs;
            }
            self.latch_armed = false;
        }
    }

    /// Read the latched copy of register 0x08-0x0C.
    pub fn read(&self, reg: u8) -> u8 {
        match reg {
            0x08 => self.latched.seconds & 0x3F,
            0x09 => self.latched.minutes & 0x3F,
            0x0A => self.latched.hours & 0x1F,
            0x0B => (self.latched.days & 0x00FF) as u8,
            0x0C => self.latched.control_byte(),
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, reg: u8, value: u8) {
        match reg {
            0x08 => {
                self.regs.seconds = value & 0x3F;
                self.subsecond_cycles = 0;
            }
            0x09 => self.regs.minutes = value & 0x3F,
            0x0A => self.regs.hours = value & 0x1F,
            0x0B => self.regs.days = (self.regs.days & 0x0100) | value as u16,
            0x0C => {
                self.regs.days = (self.regs.days & 0x00FF) | (((value & 0x01) as u16) << 8);
                self.regs.halt = value & 0x40 != 0;
                self.regs.carry = value & 0x80 != 0;
            }
            _ => {}
        }
        self.latched = self.regs;
    }

    /// Advance by base-clock cycles.
    pub fn step(&mut self, cycles: u64) {
        if self.regs.halt {
            return;
        }
        let mut seconds = cycles / CYCLES_PER_SECOND as u64;
        let mut sub = self.subsecond_cycles + (cycles % CYCLES_PER_SECOND as u64) as u32;
        if sub >= CYCLES_PER_SECOND {
            sub -= CYCLES_PER_SECOND;
            seconds += 1;
        }
        self.subsecond_cycles = sub;
        if seconds > 0 {
            self.advance_seconds(seconds);
        }
    }

    fn advance_seconds(&mut self, mut seconds: u64) {
        while seconds > 0 {
            let until_minute = self.seconds_until_minute_tick();
            if seconds < until_minute {
                self.regs.seconds = ((self.regs.seconds as u64 + seconds) & 0x3F) as u8;
                return;
            }
            seconds -= until_minute;
            self.regs.seconds = 0;
            self.minute_tick();
        }
    }

    fn seconds_until_minute_tick(&self) -> u64 {
        let sec = self.regs.seconds as u64;
        // Out-of-range seconds count up to 63 and wrap before reaching 60.
        if sec <= 59 { 60 - sec } else { 64 - sec + 60 }
    }

    fn minute_tick(&mut self) {
        if self.regs.minutes == 59 {
            self.regs.minutes = 0;
            self.hour_tick();
        } else {
            self.regs.minutes = (self.regs.minutes + 1) & 0x3F;
        }
    }

    fn hour_tick(&mut self) {
        if self.regs.hours == 23 {
            self.regs.hours = 0;
            self.day_tick();
        } else {
            self.regs.hours = (self.regs.hours + 1) & 0x1F;
        }
    }

    fn day_tick(&mut self) {
        if self.regs.days >= 0x01FF {
            self.regs.days = 0;
            self.regs.carry = true;
        } else {
            self.regs.days += 1;
        }
    }

    /// Serialize for persistence, stamped with `now` (unix seconds).
    pub fn to_blob(&self, now: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(RTC_BLOB_LEN);
        data.extend_from_slice(RTC_BLOB_MAGIC);
        data.push(RTC_BLOB_VERSION);
        data.extend_from_slice(&now.to_le_bytes());
        data.extend_from_slice(&self.subsecond_cycles.to_le_bytes());
        self.regs.encode(&mut data);
        self.latched.encode(&mut data);
        data
    }

    /// Restore from a persisted blob and catch up on the wall-clock seconds
    /// elapsed since it was written. Returns false for a foreign blob.
    pub fn load_blob(&mut self, data: &[u8], now: u64) -> bool {
        if data.len() < RTC_BLOB_LEN
            || &data[..4] != RTC_BLOB_MAGIC
            || data[4] != RTC_BLOB_VERSION
        {
            return false;
        }
        let mut stamp = [0u8; 8];
        stamp.copy_from_slice(&data[5..13]);
        let saved_at = u64::from_le_bytes(stamp);
        let mut sub = [0u8; 4];
        sub.copy_from_slice(&data[13..17]);
        self.subsecond_cycles = u32::from_le_bytes(sub).min(CYCLES_PER_SECOND - 1);
        self.regs = RtcRegisters::decode(&data[17..23]);
        self.latched = RtcRegisters::decode(&data[23..29]);
        self.latch_armed = false;

        let elapsed = now.saturating_sub(saved_at);
        if elapsed > 0 && !self.regs.halt {
            self.advance_seconds(elapsed);
        }
        true
    }
}
