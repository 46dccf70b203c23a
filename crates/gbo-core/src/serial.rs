use serde::{Deserialize, Serialize};

use crate::interrupt::{Interrupt, Interrupts};

/// CPU cycles for a full byte at the normal (8192 Hz) internal clock.
const BYTE_CYCLES_NORMAL: i32 = 4096;
/// CPU cycles for a full byte with the GBC fast clock bit set.
const BYTE_CYCLES_FAST: i32 = 128;

/// SB/SC with only the local side of the link modelled. No peer is
/// attached, so every shifted-in bit reads as 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Serial {
    sb: u8,
    sc: u8,
    cgb: bool,
    /// Cycles until the transfer completes; zero when idle.
    byte_timer: i32,
    /// Cycles until the next bit shifts.
    shift_timer: i32,
    shift_period: i32,
    #[serde(skip)]
    out_buf: Vec<u8>,
}

impl Serial {
    pub fn new(cgb: bool) -> Self {
        Self {
            sb: 0,
            sc: if cgb { 0x7F } else { 0x7E },
            cgb,
            byte_timer: 0,
            shift_timer: 0,
            shift_period: 0,
            out_buf: Vec::new(),
        }
    }

    pub fn set_cgb(&mut self, cgb: bool) {
        self.cgb = cgb;
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF01 => self.sb,
            0xFF02 => {
                if self.cgb {
                    self.sc | 0x7C
                } else {
                    self.sc | 0x7E
                }
            }
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF01 => self.sb = val,
            0xFF02 => {
                self.sc = if self.cgb { val & 0x83 } else { val & 0x81 };
                if val & 0x81 == 0x81 {
                    let fast = self.cgb && val & 0x02 != 0;
                    self.byte_timer = if fast { BYTE_CYCLES_FAST } else { BYTE_CYCLES_NORMAL };
                    self.shift_period = self.byte_timer / 8;
                    self.shift_timer = self.shift_period;
                    self.out_buf.push(self.sb);
                }
            }
            _ => {}
        }
    }

    pub fn transferring(&self) -> bool {
        self.byte_timer > 0
    }

    /// CPU cycles until the running transfer raises its interrupt.
    pub fn cycles_until_complete(&self) -> Option<u32> {
        self.transferring().then_some(self.byte_timer as u32)
    }

    /// Advance by `cycles` CPU cycles.
    pub fn step(&mut self, cycles: u32, irq: &mut Interrupts) {
        if self.byte_timer <= 0 {
            return;
        }
        let cycles = cycles as i32;
        self.shift_timer -= cycles;
        while self.shift_timer <= 0 && self.shift_period > 0 {
            self.shift_timer += self.shift_period;
            self.sb = (self.sb << 1) | 0x01;
        }
        self.byte_timer -= cycles;
        if self.byte_timer <= 0 {
            self.byte_timer = 0;
            self.sb = 0xFF;
            self.sc &= 0x7F;
            irq.request(Interrupt::Serial);
        }
    }

    /// Drain the bytes sent by internal-clock transfers so far.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out_buf)
    }

    pub fn peek_output(&self) -> &[u8] {
        &self.out_buf
    }
}
