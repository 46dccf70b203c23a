mod common;

use common::{IDLE_ROM, PROGRAM, RomBuilder, machine, run_snippet, run_to};
use gbo_core::{CoreError, GameBoy};

#[test]
fn add_sets_half_carry() {
    // LD A,0F; ADD A,01
    let gb = run_snippet(&[0x3E, 0x0F, 0xC6, 0x01]);
    assert_eq!(gb.cpu.a, 0x10);
    assert!(gb.cpu.half_carry, "carry out of bit 3");
    assert!(!gb.cpu.zero && !gb.cpu.carry && !gb.cpu.subtract);
}

#[test]
fn sub_to_zero_sets_flags() {
    // LD A,42; SUB A,42
    let gb = run_snippet(&[0x3E, 0x42, 0xD6, 0x42]);
    assert_eq!(gb.cpu.a, 0);
    assert!(gb.cpu.zero && gb.cpu.subtract);
    assert!(!gb.cpu.carry && !gb.cpu.half_carry);
}

#[test]
fn daa_corrects_bcd_addition() {
    // LD A,45; ADD A,38; DAA
    let gb = run_snippet(&[0x3E, 0x45, 0xC6, 0x38, 0x27]);
    assert_eq!(gb.cpu.a, 0x83, "45 + 38 = 83 in BCD");
    assert!(!gb.cpu.carry);
}

#[test]
fn pop_af_drops_low_flag_bits() {
    // LD BC,12FF; PUSH BC; POP AF
    let gb = run_snippet(&[0x01, 0xFF, 0x12, 0xC5, 0xF1]);
    assert_eq!(gb.cpu.af(), 0x12F0);
}

#[test]
fn call_and_ret_use_the_stack() {
    // CALL 0160; JR -2 ... at 0160: LD B,99; RET
    let rom = RomBuilder::new()
        .program(&[0xCD, 0x60, 0x01, 0x18, 0xFE])
        .at(0x160, &[0x06, 0x99, 0xC9])
        .build();
    let mut gb = machine(&rom);
    run_to(&mut gb, 0x0160, 100);
    assert_eq!(gb.cpu.sp, 0xFFFC);
    run_to(&mut gb, PROGRAM + 3, 100);
    assert_eq!(gb.cpu.b, 0x99);
    assert_eq!(gb.cpu.sp, 0xFFFE);
}

#[test]
fn cb_swap_and_bit() {
    // LD A,F1; SWAP A; BIT 7,A
    let gb = run_snippet(&[0x3E, 0xF1, 0xCB, 0x37, 0xCB, 0x7F]);
    assert_eq!(gb.cpu.a, 0x1F);
    assert!(gb.cpu.zero, "bit 7 of 1F is clear");
    assert!(gb.cpu.half_carry);
}

#[test]
fn instruction_costs() {
    let rom = RomBuilder::new()
        .program(&[
            0x00, // NOP
            0x01, 0x00, 0xC0, // LD BC,C000
            0x21, 0x00, 0xC0, // LD HL,C000
            0xCB, 0x06, // RLC (HL)
            0xCB, 0x46, // BIT 0,(HL)
            0x20, 0x00, // JR NZ,+0 (not taken: Z set by BIT)
            0x28, 0x00, // JR Z,+0 (taken)
            0xC3, 0x50, 0x01, // JP 0150
        ])
        .build();
    let mut gb = machine(&rom);
    run_to(&mut gb, PROGRAM, 10);
    let costs: Vec<u32> = (0..8).map(|_| gb.step().unwrap()).collect();
    assert_eq!(costs, vec![4, 12, 12, 16, 12, 8, 12, 16]);
}

#[test]
fn interrupt_dispatch_costs_twenty_cycles() {
    // LD A,04; LDH (FF),A; LDH (0F),A; EI; NOP; NOP
    let rom = RomBuilder::new()
        .program(&[0x3E, 0x04, 0xE0, 0xFF, 0xE0, 0x0F, 0xFB, 0x00, 0x00, 0x18, 0xFE])
        .at(0x50, &[0x18, 0xFE])
        .build();
    let mut gb = machine(&rom);
    run_to(&mut gb, PROGRAM + 6, 100);
    assert_eq!(gb.step().unwrap(), 4, "EI");
    assert_eq!(gb.step().unwrap(), 4, "one instruction runs before IME takes effect");
    assert_eq!(gb.step().unwrap(), 20, "timer interrupt dispatch");
    assert_eq!(gb.cpu.pc, 0x0050);
    assert!(!gb.cpu.ime);
    assert_eq!(gb.interrupts.requested & 0x04, 0, "request acknowledged");
}

#[test]
fn halt_wakes_on_vblank() {
    // LD A,01; LDH (FF),A; XOR A; LDH (0F),A; EI; HALT; LD B,77
    let rom = RomBuilder::new()
        .program(&[0x3E, 0x01, 0xE0, 0xFF, 0xAF, 0xE0, 0x0F, 0xFB, 0x76, 0x06, 0x77, 0x18, 0xFE])
        .at(0x40, &[0xD9]) // RETI
        .build();
    let mut gb = machine(&rom);
    run_to(&mut gb, PROGRAM + 9, 200_000);
    assert_eq!(gb.ppu.ly(), 144, "woken by the VBlank interrupt");
    assert_eq!(gb.ppu.mode(), 1);
}

#[test]
fn halt_bug_repeats_next_byte() {
    // DI; LD A,04; LDH (FF),A; LDH (0F),A; HALT; INC B; JR -2
    let rom = RomBuilder::new()
        .program(&[0xF3, 0x3E, 0x04, 0xE0, 0xFF, 0xE0, 0x0F, 0x76, 0x04, 0x18, 0xFE])
        .build();
    let mut gb = machine(&rom);
    run_to(&mut gb, PROGRAM + 7, 100);
    let b = gb.cpu.b;
    gb.step().unwrap(); // HALT with a pending request and IME off
    assert!(!gb.cpu.halted);
    gb.step().unwrap();
    gb.step().unwrap();
    assert_eq!(gb.cpu.b, b.wrapping_add(2), "INC B ran twice");
}

#[test]
fn illegal_opcode_is_fatal() {
    let rom = RomBuilder::new().program(&[0x00, 0xD3]).build();
    let mut gb = machine(&rom);
    run_to(&mut gb, PROGRAM + 1, 10);
    let err = gb.step().unwrap_err();
    assert!(
        matches!(err, CoreError::IllegalOpcode { opcode: 0xD3, pc: 0x0151 }),
        "{err}"
    );
    assert_eq!(gb.fault(), Some((0xD3, 0x0151)));
    assert!(gb.run_frame().is_err(), "the core stays stopped");
    gb.reset();
    assert_eq!(gb.fault(), None);
    assert_eq!(gb.cpu.pc, 0x0100);
}

// Table-driven check of every opcode against an independent model. Each
// instruction runs from WRAM with fixed operands: n = 0x80, nn = 0xC280.

const AT: u16 = 0xC100;
const N8: u8 = 0x80;
const N16: u16 = 0xC280;
const A: usize = 7;
const HL: usize = 6;

const Z: u8 = 0x80;
const N: u8 = 0x40;
const H: u8 = 0x20;
const C: u8 = 0x10;

/// Flag fixtures: H+C, then Z+N, so every condition goes both ways.
const FLAG_FIXTURES: [u8; 2] = [H | C, Z | N];

const ILLEGAL: [u8; 11] = [
    0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD,
];

/// Memory the fixture initialises and the comparison reads back.
const WATCHED: [(u16, u8); 11] = [
    (0xC200, 0x8F), // (HL)
    (0xC280, 0x21), // (nn)
    (0xC281, 0x43),
    (0xC385, 0x11), // (BC)
    (0xC478, 0x22), // (DE)
    (0xDFEE, 0x00), // pushed word
    (0xDFEF, 0x00),
    (0xDFF0, 0x34), // popped word
    (0xDFF1, 0x12),
    (0xFF80, 0x5A), // (FF00+n)
    (0xFF85, 0x66), // (FF00+C)
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct State {
    /// B C D E H L - A, indexed by the three-bit register encoding.
    regs: [u8; 8],
    f: u8,
    sp: u16,
    pc: u16,
    halted: bool,
    stopped: bool,
    ime_delay: u8,
    mem: [u8; WATCHED.len()],
}

impl State {
    fn fixture(f: u8) -> Self {
        Self {
            regs: [0xC3, 0x85, 0xC4, 0x78, 0xC2, 0x00, 0x00, 0x3C],
            f,
            sp: 0xDFF0,
            pc: AT,
            halted: false,
            stopped: false,
            ime_delay: 0,
            mem: WATCHED.map(|(_, val)| val),
        }
    }

    fn load(&self, gb: &mut GameBoy, code: [u8; 3]) {
        for ((addr, _), &val) in WATCHED.iter().zip(&self.mem) {
            gb.write(*addr, val);
        }
        for (addr, byte) in (AT..).zip(code) {
            gb.write(addr, byte);
        }
        gb.interrupts.enabled = 0;
        let cpu = &mut gb.cpu;
        cpu.b = self.regs[0];
        cpu.c = self.regs[1];
        cpu.d = self.regs[2];
        cpu.e = self.regs[3];
        cpu.hl = self.hl();
        cpu.a = self.regs[A];
        cpu.set_flags(self.f);
        cpu.sp = self.sp;
        cpu.pc = self.pc;
        cpu.ime = false;
        cpu.ime_delay = self.ime_delay;
        cpu.halted = self.halted;
        cpu.stopped = self.stopped;
    }

    fn observe(gb: &mut GameBoy) -> Self {
        let [h, l] = gb.cpu.hl.to_be_bytes();
        let mut mem = [0; WATCHED.len()];
        for (slot, (addr, _)) in mem.iter_mut().zip(WATCHED) {
            *slot = gb.read(addr);
        }
        let cpu = &gb.cpu;
        Self {
            regs: [cpu.b, cpu.c, cpu.d, cpu.e, h, l, 0, cpu.a],
            f: cpu.flags(),
            sp: cpu.sp,
            pc: cpu.pc,
            halted: cpu.halted,
            stopped: cpu.stopped,
            ime_delay: cpu.ime_delay,
            mem,
        }
    }

    fn byte(&mut self, addr: u16) -> &mut u8 {
        let i = WATCHED
            .iter()
            .position(|&(watched, _)| watched == addr)
            .unwrap_or_else(|| panic!("{addr:04X} is not watched"));
        &mut self.mem[i]
    }

    fn hl(&self) -> u16 {
        u16::from_be_bytes([self.regs[4], self.regs[5]])
    }

    fn reg(&mut self, r: usize) -> u8 {
        if r == HL {
            let hl = self.hl();
            *self.byte(hl)
        } else {
            self.regs[r]
        }
    }

    fn set_reg(&mut self, r: usize, val: u8) {
        if r == HL {
            let hl = self.hl();
            *self.byte(hl) = val;
        } else {
            self.regs[r] = val;
        }
    }

    /// BC DE HL SP.
    fn pair(&self, p: usize) -> u16 {
        match p {
            3 => self.sp,
            _ => u16::from_be_bytes([self.regs[p * 2], self.regs[p * 2 + 1]]),
        }
    }

    fn set_pair(&mut self, p: usize, val: u16) {
        match p {
            3 => self.sp = val,
            _ => [self.regs[p * 2], self.regs[p * 2 + 1]] = val.to_be_bytes(),
        }
    }

    fn read_word(&mut self, addr: u16) -> u16 {
        u16::from_le_bytes([*self.byte(addr), *self.byte(addr + 1)])
    }

    fn write_word(&mut self, addr: u16, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        *self.byte(addr) = lo;
        *self.byte(addr + 1) = hi;
    }

    fn push(&mut self, val: u16) {
        self.sp -= 2;
        self.write_word(self.sp, val);
    }

    fn pop(&mut self) -> u16 {
        let val = self.read_word(self.sp);
        self.sp += 2;
        val
    }

    fn flag(&self, mask: u8) -> bool {
        self.f & mask != 0
    }

    fn set_znhc(&mut self, z: bool, n: bool, h: bool, c: bool) {
        self.f = (z as u8) << 7 | (n as u8) << 6 | (h as u8) << 5 | (c as u8) << 4;
    }

    /// NZ Z NC C.
    fn condition(&self, cc: u8) -> bool {
        match cc {
            0 => !self.flag(Z),
            1 => self.flag(Z),
            2 => !self.flag(C),
            _ => self.flag(C),
        }
    }

    fn alu(&mut self, op: u8, val: u8) {
        let a = self.regs[A];
        let cin = (op == 1 || op == 3) && self.flag(C);
        match op {
            0 | 1 => {
                let sum = a as u16 + val as u16 + cin as u16;
                let res = sum as u8;
                self.set_znhc(res == 0, false, (a ^ val ^ res) & 0x10 != 0, sum > 0xFF);
                self.regs[A] = res;
            }
            2 | 3 | 7 => {
                let res = a.wrapping_sub(val).wrapping_sub(cin as u8);
                let borrow = (a as u16) < val as u16 + cin as u16;
                self.set_znhc(res == 0, true, (a ^ val ^ res) & 0x10 != 0, borrow);
                if op != 7 {
                    self.regs[A] = res;
                }
            }
            4 => {
                self.regs[A] = a & val;
                self.set_znhc(a & val == 0, false, true, false);
            }
            5 => {
                self.regs[A] = a ^ val;
                self.set_znhc(a ^ val == 0, false, false, false);
            }
            _ => {
                self.regs[A] = a | val;
                self.set_znhc(a | val == 0, false, false, false);
            }
        }
    }

    fn sp_plus_e(&self) -> u16 {
        let e = N8 as i8 as i16 as u16;
        self.sp.wrapping_add(e)
    }

    fn sp_plus_e_flags(&mut self) {
        let res = self.sp_plus_e();
        let carries = self.sp ^ (N8 as i8 as i16 as u16) ^ res;
        self.set_znhc(false, false, carries & 0x10 != 0, carries & 0x100 != 0);
    }

    fn daa(&mut self) {
        let mut a = self.regs[A];
        let mut carry = self.flag(C);
        if self.flag(N) {
            if carry {
                a = a.wrapping_sub(0x60);
            }
            if self.flag(H) {
                a = a.wrapping_sub(0x06);
            }
        } else {
            if carry || a > 0x99 {
                a = a.wrapping_add(0x60);
                carry = true;
            }
            if self.flag(H) || a & 0x0F > 0x09 {
                a = a.wrapping_add(0x06);
            }
        }
        self.regs[A] = a;
        let n = self.flag(N);
        self.set_znhc(a == 0, n, false, carry);
    }

    /// Expected state and cost after one primary opcode, or `None` for the
    /// CB prefix and unassigned opcodes.
    fn primary(mut self, op: u8) -> Option<(Self, u32)> {
        self.pc = AT + 1;
        let r = (op >> 3 & 7) as usize;
        let src = (op & 7) as usize;
        let p = (op >> 4 & 3) as usize;
        let cc = op >> 3 & 3;
        let a = self.regs[A];
        let cycles = match op {
            0x00 => 4,
            0x76 => {
                self.halted = true;
                4
            }
            0x40..=0x7F => {
                let val = self.reg(src);
                self.set_reg(r, val);
                if r == HL || src == HL { 8 } else { 4 }
            }
            0x80..=0xBF => {
                let val = self.reg(src);
                self.alu(r as u8, val);
                if src == HL { 8 } else { 4 }
            }
            0x00..=0x3F if op & 0x07 == 0x04 => {
                let val = self.reg(r);
                let res = val.wrapping_add(1);
                let c = self.flag(C);
                self.set_znhc(res == 0, false, res & 0x0F == 0, c);
                self.set_reg(r, res);
                if r == HL { 12 } else { 4 }
            }
            0x00..=0x3F if op & 0x07 == 0x05 => {
                let val = self.reg(r);
                let res = val.wrapping_sub(1);
                let c = self.flag(C);
                self.set_znhc(res == 0, true, res & 0x0F == 0x0F, c);
                self.set_reg(r, res);
                if r == HL { 12 } else { 4 }
            }
            0x00..=0x3F if op & 0x07 == 0x06 => {
                self.pc += 1;
                self.set_reg(r, N8);
                if r == HL { 12 } else { 8 }
            }
            0x00..=0x3F if op & 0x0F == 0x01 => {
                self.pc += 2;
                self.set_pair(p, N16);
                12
            }
            0x00..=0x3F if op & 0x0F == 0x03 => {
                self.set_pair(p, self.pair(p).wrapping_add(1));
                8
            }
            0x00..=0x3F if op & 0x0F == 0x0B => {
                self.set_pair(p, self.pair(p).wrapping_sub(1));
                8
            }
            0x00..=0x3F if op & 0x0F == 0x09 => {
                let hl = self.hl();
                let val = self.pair(p);
                let sum = hl as u32 + val as u32;
                let res = sum as u16;
                let z = self.flag(Z);
                self.set_znhc(z, false, (hl ^ val ^ res) & 0x1000 != 0, sum > 0xFFFF);
                self.set_pair(2, res);
                8
            }
            0x02 | 0x12 => {
                let addr = self.pair(p);
                *self.byte(addr) = a;
                8
            }
            0x22 | 0x32 => {
                let hl = self.hl();
                *self.byte(hl) = a;
                let next = if op == 0x22 { hl.wrapping_add(1) } else { hl.wrapping_sub(1) };
                self.set_pair(2, next);
                8
            }
            0x0A | 0x1A => {
                let addr = self.pair(p);
                self.regs[A] = *self.byte(addr);
                8
            }
            0x2A | 0x3A => {
                let hl = self.hl();
                self.regs[A] = *self.byte(hl);
                let next = if op == 0x2A { hl.wrapping_add(1) } else { hl.wrapping_sub(1) };
                self.set_pair(2, next);
                8
            }
            0x07 | 0x0F | 0x17 | 0x1F => {
                let cin = self.flag(C) as u8;
                let (res, carry) = match op {
                    0x07 => (a << 1 | a >> 7, a & 0x80 != 0),
                    0x0F => (a >> 1 | a << 7, a & 0x01 != 0),
                    0x17 => (a << 1 | cin, a & 0x80 != 0),
                    _ => (a >> 1 | cin << 7, a & 0x01 != 0),
                };
                self.regs[A] = res;
                self.set_znhc(false, false, false, carry);
                4
            }
            0x08 => {
                self.pc += 2;
                self.write_word(N16, self.sp);
                20
            }
            0x10 => {
                self.pc += 1;
                self.stopped = true;
                4
            }
            0x18 => {
                self.pc = (self.pc + 1).wrapping_add_signed(N8 as i8 as i16);
                12
            }
            0x20 | 0x28 | 0x30 | 0x38 => {
                self.pc += 1;
                if self.condition(cc) {
                    self.pc = self.pc.wrapping_add_signed(N8 as i8 as i16);
                    12
                } else {
                    8
                }
            }
            0x27 => {
                self.daa();
                4
            }
            0x2F => {
                self.regs[A] = !a;
                self.f |= N | H;
                4
            }
            0x37 => {
                self.f = self.f & Z | C;
                4
            }
            0x3F => {
                self.f = self.f & Z | (self.f ^ C) & C;
                4
            }
            0xC0 | 0xC8 | 0xD0 | 0xD8 => {
                if self.condition(cc) {
                    self.pc = self.pop();
                    20
                } else {
                    8
                }
            }
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let val = self.pop();
                if p == 3 {
                    let [hi, lo] = val.to_be_bytes();
                    self.regs[A] = hi;
                    self.f = lo & 0xF0;
                } else {
                    self.set_pair(p, val);
                }
                12
            }
            0xC2 | 0xCA | 0xD2 | 0xDA => {
                self.pc += 2;
                if self.condition(cc) {
                    self.pc = N16;
                    16
                } else {
                    12
                }
            }
            0xC3 => {
                self.pc = N16;
                16
            }
            0xC4 | 0xCC | 0xD4 | 0xDC => {
                self.pc += 2;
                if self.condition(cc) {
                    self.push(self.pc);
                    self.pc = N16;
                    24
                } else {
                    12
                }
            }
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                let val = if p == 3 {
                    u16::from_be_bytes([a, self.f])
                } else {
                    self.pair(p)
                };
                self.push(val);
                16
            }
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                self.pc += 1;
                self.alu(r as u8, N8);
                8
            }
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.push(self.pc);
                self.pc = (op & 0x38) as u16;
                16
            }
            0xC9 => {
                self.pc = self.pop();
                16
            }
            0xCD => {
                self.pc += 2;
                self.push(self.pc);
                self.pc = N16;
                24
            }
            0xD9 => {
                self.pc = self.pop();
                self.ime_delay = 2;
                16
            }
            0xE0 => {
                self.pc += 1;
                *self.byte(0xFF00 | N8 as u16) = a;
                12
            }
            0xF0 => {
                self.pc += 1;
                self.regs[A] = *self.byte(0xFF00 | N8 as u16);
                12
            }
            0xE2 => {
                let addr = 0xFF00 | self.regs[1] as u16;
                *self.byte(addr) = a;
                8
            }
            0xF2 => {
                let addr = 0xFF00 | self.regs[1] as u16;
                self.regs[A] = *self.byte(addr);
                8
            }
            0xE8 => {
                self.pc += 1;
                self.sp_plus_e_flags();
                self.sp = self.sp_plus_e();
                16
            }
            0xF8 => {
                self.pc += 1;
                self.sp_plus_e_flags();
                self.set_pair(2, self.sp_plus_e());
                12
            }
            0xE9 => {
                self.pc = self.hl();
                4
            }
            0xF9 => {
                self.sp = self.hl();
                8
            }
            0xEA => {
                self.pc += 2;
                *self.byte(N16) = a;
                16
            }
            0xFA => {
                self.pc += 2;
                self.regs[A] = *self.byte(N16);
                16
            }
            0xF3 => 4,
            0xFB => {
                self.ime_delay = 2;
                4
            }
            _ => return None,
        };
        Some((self, cycles))
    }

    /// Expected state and cost after `CB op`.
    fn cb(mut self, op: u8) -> (Self, u32) {
        self.pc = AT + 2;
        let r = (op & 7) as usize;
        let b = op >> 3 & 7;
        let val = self.reg(r);
        let cin = self.flag(C) as u8;
        let cycles = if r == HL { 16 } else { 8 };
        match op >> 6 {
            0 => {
                let (res, carry) = match b {
                    0 => (val << 1 | val >> 7, val >> 7),
                    1 => (val >> 1 | val << 7, val & 1),
                    2 => (val << 1 | cin, val >> 7),
                    3 => (val >> 1 | cin << 7, val & 1),
                    4 => (val << 1, val >> 7),
                    5 => (val >> 1 | val & 0x80, val & 1),
                    6 => (val >> 4 | val << 4, 0),
                    _ => (val >> 1, val & 1),
                };
                self.set_znhc(res == 0, false, false, carry == 1);
                self.set_reg(r, res);
            }
            1 => {
                let c = self.flag(C);
                self.set_znhc(val & (1 << b) == 0, false, true, c);
                return (self, if r == HL { 12 } else { 8 });
            }
            2 => self.set_reg(r, val & !(1 << b)),
            _ => self.set_reg(r, val | 1 << b),
        }
        (self, cycles)
    }
}

#[test]
fn primary_opcodes_match_reference_model() {
    let mut gb = machine(&IDLE_ROM);
    let [lo, hi] = N16.to_le_bytes();
    assert_eq!(lo, N8);
    for f in FLAG_FIXTURES {
        for op in 0..=0xFFu8 {
            let fixture = State::fixture(f);
            let Some((expected, cost)) = fixture.clone().primary(op) else {
                continue;
            };
            fixture.load(&mut gb, [op, lo, hi]);
            let cycles = gb
                .step()
                .unwrap_or_else(|err| panic!("{op:02X} with F={f:02X}: {err}"));
            assert_eq!(State::observe(&mut gb), expected, "{op:02X} with F={f:02X}");
            assert_eq!(cycles, cost, "cycles of {op:02X} with F={f:02X}");
        }
    }
}

#[test]
fn cb_opcodes_match_reference_model() {
    let mut gb = machine(&IDLE_ROM);
    for f in FLAG_FIXTURES {
        for op in 0..=0xFFu8 {
            let fixture = State::fixture(f);
            let (expected, cost) = fixture.clone().cb(op);
            fixture.load(&mut gb, [0xCB, op, 0x00]);
            let cycles = gb
                .step()
                .unwrap_or_else(|err| panic!("CB {op:02X} with F={f:02X}: {err}"));
            assert_eq!(State::observe(&mut gb), expected, "CB {op:02X} with F={f:02X}");
            assert_eq!(cycles, cost, "cycles of CB {op:02X} with F={f:02X}");
        }
    }
}

#[test]
fn every_unassigned_opcode_is_fatal() {
    let unassigned: Vec<u8> = (0..=0xFFu8)
        .filter(|&op| op != 0xCB && State::fixture(0).primary(op).is_none())
        .collect();
    assert_eq!(unassigned, ILLEGAL);

    for op in ILLEGAL {
        let mut gb = machine(&IDLE_ROM);
        State::fixture(H | C).load(&mut gb, [op, 0x00, 0x00]);
        let err = gb.step().unwrap_err();
        assert!(
            matches!(err, CoreError::IllegalOpcode { opcode, pc: AT } if opcode == op),
            "{op:02X}: {err}"
        );
        assert_eq!(gb.fault(), Some((op, AT)));
        assert_eq!(gb.cpu.pc, AT, "PC stays on the opcode");
    }
}
