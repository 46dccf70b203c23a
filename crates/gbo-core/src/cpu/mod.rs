//! SM83 interpreter.
//!
//! Decoding is a lookup into [`PRIMARY`] or [`CB`], two 256-entry tables of
//! plain function pointers that operate on the whole [`GameBoy`]. Base costs
//! come from [`PRIMARY_CYCLES`] and [`CB_CYCLES`]; taken branches add their
//! extra cost through [`Cpu::extra_cycles`].

mod cb;
mod ops;

use serde::{Deserialize, Serialize};

use crate::gameboy::GameBoy;

pub use cb::CB;
pub use ops::PRIMARY;

pub type Opcode = fn(&mut GameBoy);

// Flag bits as they appear in F (gbdev.io/pandocs/The_CPU_Flags.html)
pub const FLAG_Z: u8 = 0x80;
pub const FLAG_N: u8 = 0x40;
pub const FLAG_H: u8 = 0x20;
pub const FLAG_C: u8 = 0x10;

/// Cycles for interrupt dispatch: two wait states, two pushes, the jump.
pub const INTERRUPT_CYCLES: u32 = 20;

/// Base cost of every primary opcode in clock cycles. Conditional control
/// flow lists the not-taken cost. 0xCB is charged by [`CB_CYCLES`].
#[rustfmt::skip]
pub const PRIMARY_CYCLES: [u8; 256] = [
//  x0  x1  x2  x3  x4  x5  x6  x7  x8  x9  xA  xB  xC  xD  xE  xF
     4, 12,  8,  8,  4,  4,  8,  4, 20,  8,  8,  8,  4,  4,  8,  4, // 0x
     4, 12,  8,  8,  4,  4,  8,  4, 12,  8,  8,  8,  4,  4,  8,  4, // 1x
     8, 12,  8,  8,  4,  4,  8,  4,  8,  8,  8,  8,  4,  4,  8,  4, // 2x
     8, 12,  8,  8, 12, 12, 12,  4,  8,  8,  8,  8,  4,  4,  8,  4, // 3x
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 4x
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 5x
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 6x
     8,  8,  8,  8,  8,  8,  4,  8,  4,  4,  4,  4,  4,  4,  8,  4, // 7x
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 8x
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 9x
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // Ax
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // Bx
     8, 12, 12, 16, 12, 16,  8, 16,  8, 16, 12,  0, 12, 24,  8, 16, // Cx
     8, 12, 12,  4, 12, 16,  8, 16,  8, 16, 12,  4, 12,  4,  8, 16, // Dx
    12, 12,  8,  4,  4, 16,  8, 16, 16,  4, 16,  4,  4,  4,  8, 16, // Ex
    12, 12,  8,  4,  4, 16,  8, 16, 12,  8, 16,  4,  4,  4,  8, 16, // Fx
];

/// Full cost of every 0xCB-prefixed opcode, prefix included.
pub const CB_CYCLES: [u8; 256] = {
    let mut table = [8u8; 256];
    let mut op = 0;
    while op < 256 {
        if op & 0x07 == 6 {
            // BIT only reads (HL); everything else reads and writes it.
            table[op] = if op >> 6 == 1 { 12 } else { 16 };
        }
        op += 1;
    }
    table
};

// Post-boot register values (gbdev.io/pandocs/Power_Up_State.html)
const DMG_BOOT: [u8; 8] = [0x01, 0xB0, 0x00, 0x13, 0x00, 0xD8, 0x01, 0x4D];
const CGB_BOOT: [u8; 8] = [0x11, 0x80, 0x00, 0x00, 0x00, 0x08, 0x00, 0x7C];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cpu {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub hl: u16,
    pub sp: u16,
    pub pc: u16,
    pub zero: bool,
    pub subtract: bool,
    pub half_carry: bool,
    pub carry: bool,
    pub ime: bool,
    /// EI/RETI countdown: 2 right after the instruction, 1 once the
    /// following instruction has started, then IME is set.
    pub ime_delay: u8,
    pub halted: bool,
    pub stopped: bool,
    /// Halt bug: the next fetch does not advance PC.
    pub(crate) skip_pc_increment: bool,
    /// Cycles added by the current instruction on top of its table cost.
    pub(crate) extra_cycles: u32,
    pub(crate) last_opcode: u8,
}

impl Cpu {
    /// Registers as the boot ROM leaves them.
    pub fn post_boot(cgb: bool) -> Self {
        let [a, f, b, c, d, e, h, l] = if cgb { CGB_BOOT } else { DMG_BOOT };
        let mut cpu = Self {
            a,
            b,
            c,
            d,
            e,
            hl: u16::from_be_bytes([h, l]),
            sp: 0xFFFE,
            pc: 0x0100,
            ..Self::default()
        };
        cpu.set_flags(f);
        cpu
    }

    /// All-zero registers with PC at the boot ROM entry point.
    pub fn power_on() -> Self {
        Self::default()
    }

    pub fn flags(&self) -> u8 {
        (self.zero as u8) << 7
            | (self.subtract as u8) << 6
            | (self.half_carry as u8) << 5
            | (self.carry as u8) << 4
    }

    pub fn set_flags(&mut self, f: u8) {
        self.zero = f & FLAG_Z != 0;
        self.subtract = f & FLAG_N != 0;
        self.half_carry = f & FLAG_H != 0;
        self.carry = f & FLAG_C != 0;
    }

    pub fn af(&self) -> u16 {
        u16::from_be_bytes([self.a, self.flags()])
    }

    pub fn bc(&self) -> u16 {
        u16::from_be_bytes([self.b, self.c])
    }

    pub fn de(&self) -> u16 {
        u16::from_be_bytes([self.d, self.e])
    }

    pub fn h(&self) -> u8 {
        (self.hl >> 8) as u8
    }

    pub fn l(&self) -> u8 {
        self.hl as u8
    }

    pub fn set_bc(&mut self, val: u16) {
        [self.b, self.c] = val.to_be_bytes();
    }

    pub fn set_de(&mut self, val: u16) {
        [self.d, self.e] = val.to_be_bytes();
    }

    pub fn set_h(&mut self, val: u8) {
        self.hl = (self.hl & 0x00FF) | (val as u16) << 8;
    }

    pub fn set_l(&mut self, val: u8) {
        self.hl = (self.hl & 0xFF00) | val as u16;
    }

    /// Pair index as encoded in bits 4-5 of the opcode: BC, DE, HL, SP.
    pub(crate) fn pair(&self, index: u8) -> u16 {
        match index {
            0 => self.bc(),
            1 => self.de(),
            2 => self.hl,
            _ => self.sp,
        }
    }

    pub(crate) fn set_pair(&mut self, index: u8, val: u16) {
        match index {
            0 => self.set_bc(val),
            1 => self.set_de(val),
            2 => self.hl = val,
            _ => self.sp = val,
        }
    }

    /// Conditions as encoded in bits 3-4: NZ, Z, NC, C.
    pub(crate) fn condition(&self, index: u8) -> bool {
        match index {
            0 => !self.zero,
            1 => self.zero,
            2 => !self.carry,
            _ => self.carry,
        }
    }

    pub fn debug_state(&self) -> String {
        format!(
            "A:{:02X} F:{:02X} B:{:02X} C:{:02X} D:{:02X} E:{:02X} H:{:02X} L:{:02X} SP:{:04X} PC:{:04X}",
            self.a,
            self.flags(),
            self.b,
            self.c,
            self.d,
            self.e,
            self.h(),
            self.l(),
            self.sp,
            self.pc
        )
    }
}

impl GameBoy {
    pub(crate) fn fetch(&mut self) -> u8 {
        let val = self.read(self.cpu.pc);
        if self.cpu.skip_pc_increment {
            self.cpu.skip_pc_increment = false;
        } else {
            self.cpu.pc = self.cpu.pc.wrapping_add(1);
        }
        val
    }

    pub(crate) fn fetch_word(&mut self) -> u16 {
        let lo = self.fetch();
        let hi = self.fetch();
        u16::from_le_bytes([lo, hi])
    }

    pub(crate) fn push(&mut self, val: u16) {
        let [hi, lo] = val.to_be_bytes();
        self.cpu.sp = self.cpu.sp.wrapping_sub(1);
        self.write(self.cpu.sp, hi);
        self.cpu.sp = self.cpu.sp.wrapping_sub(1);
        self.write(self.cpu.sp, lo);
    }

    pub(crate) fn pop(&mut self) -> u16 {
        let lo = self.read(self.cpu.sp);
        self.cpu.sp = self.cpu.sp.wrapping_add(1);
        let hi = self.read(self.cpu.sp);
        self.cpu.sp = self.cpu.sp.wrapping_add(1);
        u16::from_le_bytes([lo, hi])
    }

    /// Register by its three-bit opcode encoding; 6 is the byte at (HL).
    #[inline]
    pub(crate) fn reg(&mut self, index: u8) -> u8 {
        match index {
            0 => self.cpu.b,
            1 => self.cpu.c,
            2 => self.cpu.d,
            3 => self.cpu.e,
            4 => self.cpu.h(),
            5 => self.cpu.l(),
            6 => self.read(self.cpu.hl),
            _ => self.cpu.a,
        }
    }

    #[inline]
    pub(crate) fn set_reg(&mut self, index: u8, val: u8) {
        match index {
            0 => self.cpu.b = val,
            1 => self.cpu.c = val,
            2 => self.cpu.d = val,
            3 => self.cpu.e = val,
            4 => self.cpu.set_h(val),
            5 => self.cpu.set_l(val),
            6 => self.write(self.cpu.hl, val),
            _ => self.cpu.a = val,
        }
    }

    /// Run one instruction, or service one interrupt, and return its cost in
    /// clock cycles.
    pub(crate) fn execute(&mut self) -> u32 {
        match self.cpu.ime_delay {
            1 => {
                self.cpu.ime = true;
                self.cpu.ime_delay = 0;
            }
            2 => self.cpu.ime_delay = 1,
            _ => {}
        }

        if self.cpu.ime
            && let Some(line) = self.interrupts.highest_pending()
        {
            self.cpu.ime = false;
            self.cpu.halted = false;
            self.interrupts.acknowledge(line);
            let pc = self.cpu.pc;
            self.push(pc);
            self.cpu.pc = line.vector();
            cpu_trace!("interrupt {line:?} from {pc:04X}");
            return INTERRUPT_CYCLES;
        }

        let opcode = self.fetch();
        cpu_trace!("{:04X}: {opcode:02X}  {}", self.cpu.pc.wrapping_sub(1), self.cpu.debug_state());
        self.cpu.last_opcode = opcode;
        self.cpu.extra_cycles = 0;
        PRIMARY[opcode as usize](self);
        PRIMARY_CYCLES[opcode as usize] as u32 + self.cpu.extra_cycles
    }

    /// Clock cycles until an enabled interrupt source can next fire, used to
    /// skip ahead while halted.
    pub(crate) fn cycles_until_wake(&self) -> Option<u32> {
        let enabled = self.interrupts.enabled;
        let shift = self.double_speed as u32;
        let mut best: Option<u32> = None;
        let mut consider = |cycles: Option<u32>| {
            if let Some(cycles) = cycles {
                best = Some(best.map_or(cycles, |b| b.min(cycles)));
            }
        };
        consider(self.ppu.dots_until_interrupt(enabled).map(|dots| dots << shift));
        if enabled & crate::interrupt::Interrupt::Timer.mask() != 0 {
            consider(self.timer.cycles_until_overflow());
        }
        if enabled & crate::interrupt::Interrupt::Serial.mask() != 0 {
            consider(self.serial.cycles_until_complete());
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_round_trip_through_f() {
        let mut cpu = Cpu::default();
        cpu.set_flags(0xFF);
        assert_eq!(cpu.flags(), 0xF0, "low nibble of F always reads zero");
        cpu.set_flags(0x50);
        assert!(!cpu.zero && cpu.subtract && !cpu.half_carry && cpu.carry);
    }

    #[test]
    fn post_boot_registers() {
        let dmg = Cpu::post_boot(false);
        assert_eq!(dmg.af(), 0x01B0);
        assert_eq!(dmg.bc(), 0x0013);
        assert_eq!(dmg.de(), 0x00D8);
        assert_eq!(dmg.hl, 0x014D);
        assert_eq!((dmg.sp, dmg.pc), (0xFFFE, 0x0100));

        let cgb = Cpu::post_boot(true);
        assert_eq!(cgb.af(), 0x1180);
        assert_eq!(cgb.de(), 0x0008);
        assert_eq!(cgb.hl, 0x007C);
    }

    #[test]
    fn cb_cycle_table() {
        assert_eq!(CB_CYCLES[0x00], 8);
        assert_eq!(CB_CYCLES[0x06], 16, "RLC (HL)");
        assert_eq!(CB_CYCLES[0x46], 12, "BIT 0,(HL)");
        assert_eq!(CB_CYCLES[0x86], 16, "RES 0,(HL)");
        assert_eq!(CB_CYCLES[0xFE], 16, "SET 7,(HL)");
    }
}
