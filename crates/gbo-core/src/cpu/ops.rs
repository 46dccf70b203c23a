//! Primary opcode handlers.
//!
//! Register operands use the three-bit encoding from the opcode
//! (B, C, D, E, H, L, (HL), A); pair operands use the two-bit encoding
//! (BC, DE, HL, SP, with AF in place of SP for PUSH/POP).

use super::{CB, CB_CYCLES, Cpu, Opcode};
use crate::gameboy::GameBoy;

#[rustfmt::skip]
pub static PRIMARY: [Opcode; 256] = [
    // 0x
    nop, ld_rr_nn::<0>, ld_bc_a, inc_rr::<0>,
    inc_r::<0>, dec_r::<0>, ld_r_n::<0>, rlca,
    ld_nn_sp, add_hl_rr::<0>, ld_a_bc, dec_rr::<0>,
    inc_r::<1>, dec_r::<1>, ld_r_n::<1>, rrca,
    // 1x
    stop, ld_rr_nn::<1>, ld_de_a, inc_rr::<1>,
    inc_r::<2>, dec_r::<2>, ld_r_n::<2>, rla,
    jr, add_hl_rr::<1>, ld_a_de, dec_rr::<1>,
    inc_r::<3>, dec_r::<3>, ld_r_n::<3>, rra,
    // 2x
    jr_cc::<0>, ld_rr_nn::<2>, ld_hli_a, inc_rr::<2>,
    inc_r::<4>, dec_r::<4>, ld_r_n::<4>, daa,
    jr_cc::<1>, add_hl_rr::<2>, ld_a_hli, dec_rr::<2>,
    inc_r::<5>, dec_r::<5>, ld_r_n::<5>, cpl,
    // 3x
    jr_cc::<2>, ld_rr_nn::<3>, ld_hld_a, inc_rr::<3>,
    inc_r::<6>, dec_r::<6>, ld_r_n::<6>, scf,
    jr_cc::<3>, add_hl_rr::<3>, ld_a_hld, dec_rr::<3>,
    inc_r::<7>, dec_r::<7>, ld_r_n::<7>, ccf,
    // 4x
    ld_r_r::<0, 0>, ld_r_r::<0, 1>, ld_r_r::<0, 2>, ld_r_r::<0, 3>,
    ld_r_r::<0, 4>, ld_r_r::<0, 5>, ld_r_r::<0, 6>, ld_r_r::<0, 7>,
    ld_r_r::<1, 0>, ld_r_r::<1, 1>, ld_r_r::<1, 2>, ld_r_r::<1, 3>,
    ld_r_r::<1, 4>, ld_r_r::<1, 5>, ld_r_r::<1, 6>, ld_r_r::<1, 7>,
    // 5x
    ld_r_r::<2, 0>, ld_r_r::<2, 1>, ld_r_r::<2, 2>, ld_r_r::<2, 3>,
    ld_r_r::<2, 4>, ld_r_r::<2, 5>, ld_r_r::<2, 6>, ld_r_r::<2, 7>,
    ld_r_r::<3, 0>, ld_r_r::<3, 1>, ld_r_r::<3, 2>, ld_r_r::<3, 3>,
    ld_r_r::<3, 4>, ld_r_r::<3, 5>, ld_r_r::<3, 6>, ld_r_r::<3, 7>,
    // 6x
    ld_r_r::<4, 0>, ld_r_r::<4, 1>, ld_r_r::<4, 2>, ld_r_r::<4, 3>,
    ld_r_r::<4, 4>, ld_r_r::<4, 5>, ld_r_r::<4, 6>, ld_r_r::<4, 7>,
    ld_r_r::<5, 0>, ld_r_r::<5, 1>, ld_r_r::<5, 2>, ld_r_r::<5, 3>,
    ld_r_r::<5, 4>, ld_r_r::<5, 5>, ld_r_r::<5, 6>, ld_r_r::<5, 7>,
    // 7x
    ld_r_r::<6, 0>, ld_r_r::<6, 1>, ld_r_r::<6, 2>, ld_r_r::<6, 3>,
    ld_r_r::<6, 4>, ld_r_r::<6, 5>, halt, ld_r_r::<6, 7>,
    ld_r_r::<7, 0>, ld_r_r::<7, 1>, ld_r_r::<7, 2>, ld_r_r::<7, 3>,
    ld_r_r::<7, 4>, ld_r_r::<7, 5>, ld_r_r::<7, 6>, ld_r_r::<7, 7>,
    // 8x
    alu_r::<0, 0>, alu_r::<0, 1>, alu_r::<0, 2>, alu_r::<0, 3>,
    alu_r::<0, 4>, alu_r::<0, 5>, alu_r::<0, 6>, alu_r::<0, 7>,
    alu_r::<1, 0>, alu_r::<1, 1>, alu_r::<1, 2>, alu_r::<1, 3>,
    alu_r::<1, 4>, alu_r::<1, 5>, alu_r::<1, 6>, alu_r::<1, 7>,
    // 9x
    alu_r::<2, 0>, alu_r::<2, 1>, alu_r::<2, 2>, alu_r::<2, 3>,
    alu_r::<2, 4>, alu_r::<2, 5>, alu_r::<2, 6>, alu_r::<2, 7>,
    alu_r::<3, 0>, alu_r::<3, 1>, alu_r::<3, 2>, alu_r::<3, 3>,
    alu_r::<3, 4>, alu_r::<3, 5>, alu_r::<3, 6>, alu_r::<3, 7>,
    // Ax
    alu_r::<4, 0>, alu_r::<4, 1>, alu_r::<4, 2>, alu_r::<4, 3>,
    alu_r::<4, 4>, alu_r::<4, 5>, alu_r::<4, 6>, alu_r::<4, 7>,
    alu_r::<5, 0>, alu_r::<5, 1>, alu_r::<5, 2>, alu_r::<5, 3>,
    alu_r::<5, 4>, alu_r::<5, 5>, alu_r::<5, 6>, alu_r::<5, 7>,
    // Bx
    alu_r::<6, 0>, alu_r::<6, 1>, alu_r::<6, 2>, alu_r::<6, 3>,
    alu_r::<6, 4>, alu_r::<6, 5>, alu_r::<6, 6>, alu_r::<6, 7>,
    alu_r::<7, 0>, alu_r::<7, 1>, alu_r::<7, 2>, alu_r::<7, 3>,
    alu_r::<7, 4>, alu_r::<7, 5>, alu_r::<7, 6>, alu_r::<7, 7>,
    // Cx
    ret_cc::<0>, pop_rr::<0>, jp_cc::<0>, jp,
    call_cc::<0>, push_rr::<0>, alu_n::<0>, rst::<0x00>,
    ret_cc::<1>, ret, jp_cc::<1>, prefix_cb,
    call_cc::<1>, call, alu_n::<1>, rst::<0x08>,
    // Dx
    ret_cc::<2>, pop_rr::<1>, jp_cc::<2>, illegal,
    call_cc::<2>, push_rr::<1>, alu_n::<2>, rst::<0x10>,
    ret_cc::<3>, reti, jp_cc::<3>, illegal,
    call_cc::<3>, illegal, alu_n::<3>, rst::<0x18>,
    // Ex
    ldh_n_a, pop_rr::<2>, ld_c_a, illegal,
    illegal, push_rr::<2>, alu_n::<4>, rst::<0x20>,
    add_sp_e, jp_hl, ld_nn_a, illegal,
    illegal, illegal, alu_n::<5>, rst::<0x28>,
    // Fx
    ldh_a_n, pop_rr::<3>, ld_a_c, di,
    illegal, push_rr::<3>, alu_n::<6>, rst::<0x30>,
    ld_hl_sp_e, ld_sp_hl, ld_a_nn, ei,
    illegal, illegal, alu_n::<7>, rst::<0x38>,
];

fn nop(_: &mut GameBoy) {}

fn illegal(gb: &mut GameBoy) {
    let pc = gb.cpu.pc.wrapping_sub(1);
    let opcode = gb.cpu.last_opcode;
    log::error!("illegal opcode {opcode:02X} at {pc:04X}; emulation halted");
    gb.cpu.pc = pc;
    gb.fault = Some((opcode, pc));
}

// 8-bit loads

fn ld_r_r<const D: u8, const S: u8>(gb: &mut GameBoy) {
    let val = gb.reg(S);
    gb.set_reg(D, val);
}

fn ld_r_n<const R: u8>(gb: &mut GameBoy) {
    let val = gb.fetch();
    gb.set_reg(R, val);
}

fn ld_bc_a(gb: &mut GameBoy) {
    gb.write(gb.cpu.bc(), gb.cpu.a);
}

fn ld_de_a(gb: &mut GameBoy) {
    gb.write(gb.cpu.de(), gb.cpu.a);
}

fn ld_hli_a(gb: &mut GameBoy) {
    let hl = gb.cpu.hl;
    gb.write(hl, gb.cpu.a);
    gb.cpu.hl = hl.wrapping_add(1);
}

fn ld_hld_a(gb: &mut GameBoy) {
    let hl = gb.cpu.hl;
    gb.write(hl, gb.cpu.a);
    gb.cpu.hl = hl.wrapping_sub(1);
}

fn ld_a_bc(gb: &mut GameBoy) {
    gb.cpu.a = gb.read(gb.cpu.bc());
}

fn ld_a_de(gb: &mut GameBoy) {
    gb.cpu.a = gb.read(gb.cpu.de());
}

fn ld_a_hli(gb: &mut GameBoy) {
    let hl = gb.cpu.hl;
    gb.cpu.a = gb.read(hl);
    gb.cpu.hl = hl.wrapping_add(1);
}

fn ld_a_hld(gb: &mut GameBoy) {
    let hl = gb.cpu.hl;
    gb.cpu.a = gb.read(hl);
    gb.cpu.hl = hl.wrapping_sub(1);
}

fn ld_nn_a(gb: &mut GameBoy) {
    let addr = gb.fetch_word();
    gb.write(addr, gb.cpu.a);
}

fn ld_a_nn(gb: &mut GameBoy) {
    let addr = gb.fetch_word();
    gb.cpu.a = gb.read(addr);
}

fn ldh_n_a(gb: &mut GameBoy) {
    let offset = gb.fetch();
    gb.write_high(offset, gb.cpu.a);
}

fn ldh_a_n(gb: &mut GameBoy) {
    let offset = gb.fetch();
    gb.cpu.a = gb.read_high(offset);
}

fn ld_c_a(gb: &mut GameBoy) {
    gb.write_high(gb.cpu.c, gb.cpu.a);
}

fn ld_a_c(gb: &mut GameBoy) {
    gb.cpu.a = gb.read_high(gb.cpu.c);
}

// 16-bit loads and arithmetic

fn ld_rr_nn<const P: u8>(gb: &mut GameBoy) {
    let val = gb.fetch_word();
    gb.cpu.set_pair(P, val);
}

fn ld_nn_sp(gb: &mut GameBoy) {
    let addr = gb.fetch_word();
    gb.write_word(addr, gb.cpu.sp);
}

fn ld_sp_hl(gb: &mut GameBoy) {
    gb.cpu.sp = gb.cpu.hl;
}

fn push_rr<const P: u8>(gb: &mut GameBoy) {
    let val = if P == 3 { gb.cpu.af() } else { gb.cpu.pair(P) };
    gb.push(val);
}

fn pop_rr<const P: u8>(gb: &mut GameBoy) {
    let val = gb.pop();
    if P == 3 {
        let [a, f] = val.to_be_bytes();
        gb.cpu.a = a;
        gb.cpu.set_flags(f);
    } else {
        gb.cpu.set_pair(P, val);
    }
}

fn inc_rr<const P: u8>(gb: &mut GameBoy) {
    let val = gb.cpu.pair(P).wrapping_add(1);
    gb.cpu.set_pair(P, val);
}

fn dec_rr<const P: u8>(gb: &mut GameBoy) {
    let val = gb.cpu.pair(P).wrapping_sub(1);
    gb.cpu.set_pair(P, val);
}

fn add_hl_rr<const P: u8>(gb: &mut GameBoy) {
    let cpu = &mut gb.cpu;
    let hl = cpu.hl;
    let val = cpu.pair(P);
    let (res, carry) = hl.overflowing_add(val);
    cpu.subtract = false;
    cpu.half_carry = (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF;
    cpu.carry = carry;
    cpu.hl = res;
}

/// SP plus a signed immediate; flags come from the unsigned low-byte add.
fn sp_plus_e(gb: &mut GameBoy) -> u16 {
    let e = gb.fetch();
    let cpu = &mut gb.cpu;
    let sp = cpu.sp;
    cpu.zero = false;
    cpu.subtract = false;
    cpu.half_carry = (sp & 0x0F) + (e as u16 & 0x0F) > 0x0F;
    cpu.carry = (sp & 0xFF) + e as u16 > 0xFF;
    sp.wrapping_add_signed(e as i8 as i16)
}

fn add_sp_e(gb: &mut GameBoy) {
    gb.cpu.sp = sp_plus_e(gb);
}

fn ld_hl_sp_e(gb: &mut GameBoy) {
    gb.cpu.hl = sp_plus_e(gb);
}

// 8-bit arithmetic

fn inc_r<const R: u8>(gb: &mut GameBoy) {
    let val = gb.reg(R);
    let res = val.wrapping_add(1);
    gb.cpu.zero = res == 0;
    gb.cpu.subtract = false;
    gb.cpu.half_carry = val & 0x0F == 0x0F;
    gb.set_reg(R, res);
}

fn dec_r<const R: u8>(gb: &mut GameBoy) {
    let val = gb.reg(R);
    let res = val.wrapping_sub(1);
    gb.cpu.zero = res == 0;
    gb.cpu.subtract = true;
    gb.cpu.half_carry = val & 0x0F == 0;
    gb.set_reg(R, res);
}

fn add(cpu: &mut Cpu, val: u8, carry_in: bool) {
    let c = carry_in as u8;
    let res = cpu.a as u16 + val as u16 + c as u16;
    cpu.half_carry = (cpu.a & 0x0F) + (val & 0x0F) + c > 0x0F;
    cpu.carry = res > 0xFF;
    cpu.a = res as u8;
    cpu.zero = cpu.a == 0;
    cpu.subtract = false;
}

fn sub(cpu: &mut Cpu, val: u8, carry_in: bool) -> u8 {
    let c = carry_in as i16;
    let res = cpu.a as i16 - val as i16 - c;
    cpu.half_carry = (cpu.a & 0x0F) as i16 - (val & 0x0F) as i16 - c < 0;
    cpu.carry = res < 0;
    cpu.subtract = true;
    let res = res as u8;
    cpu.zero = res == 0;
    res
}

/// ALU operation by its three-bit encoding: ADD ADC SUB SBC AND XOR OR CP.
fn alu(cpu: &mut Cpu, op: u8, val: u8) {
    let carry = cpu.carry;
    match op {
        0 => add(cpu, val, false),
        1 => add(cpu, val, carry),
        2 => cpu.a = sub(cpu, val, false),
        3 => cpu.a = sub(cpu, val, carry),
        7 => {
            sub(cpu, val, false);
        }
        _ => {
            cpu.a = match op {
                4 => cpu.a & val,
                5 => cpu.a ^ val,
                _ => cpu.a | val,
            };
            cpu.zero = cpu.a == 0;
            cpu.subtract = false;
            cpu.half_carry = op == 4;
            cpu.carry = false;
        }
    }
}

fn alu_r<const OP: u8, const R: u8>(gb: &mut GameBoy) {
    let val = gb.reg(R);
    alu(&mut gb.cpu, OP, val);
}

fn alu_n<const OP: u8>(gb: &mut GameBoy) {
    let val = gb.fetch();
    alu(&mut gb.cpu, OP, val);
}

fn daa(gb: &mut GameBoy) {
    let cpu = &mut gb.cpu;
    let mut adjust = 0u8;
    if cpu.subtract {
        if cpu.half_carry {
            adjust |= 0x06;
        }
        if cpu.carry {
            adjust |= 0x60;
        }
        cpu.a = cpu.a.wrapping_sub(adjust);
    } else {
        if cpu.half_carry || cpu.a & 0x0F > 0x09 {
            adjust |= 0x06;
        }
        if cpu.carry || cpu.a > 0x99 {
            adjust |= 0x60;
            cpu.carry = true;
        }
        cpu.a = cpu.a.wrapping_add(adjust);
    }
    cpu.zero = cpu.a == 0;
    cpu.half_carry = false;
}

fn cpl(gb: &mut GameBoy) {
    gb.cpu.a = !gb.cpu.a;
    gb.cpu.subtract = true;
    gb.cpu.half_carry = true;
}

fn scf(gb: &mut GameBoy) {
    gb.cpu.subtract = false;
    gb.cpu.half_carry = false;
    gb.cpu.carry = true;
}

fn ccf(gb: &mut GameBoy) {
    gb.cpu.subtract = false;
    gb.cpu.half_carry = false;
    gb.cpu.carry = !gb.cpu.carry;
}

// Accumulator rotates always clear Z.

fn rotate_a(cpu: &mut Cpu, res: u8, carry: bool) {
    cpu.a = res;
    cpu.zero = false;
    cpu.subtract = false;
    cpu.half_carry = false;
    cpu.carry = carry;
}

fn rlca(gb: &mut GameBoy) {
    let a = gb.cpu.a;
    rotate_a(&mut gb.cpu, a.rotate_left(1), a & 0x80 != 0);
}

fn rrca(gb: &mut GameBoy) {
    let a = gb.cpu.a;
    rotate_a(&mut gb.cpu, a.rotate_right(1), a & 0x01 != 0);
}

fn rla(gb: &mut GameBoy) {
    let a = gb.cpu.a;
    let res = a << 1 | gb.cpu.carry as u8;
    rotate_a(&mut gb.cpu, res, a & 0x80 != 0);
}

fn rra(gb: &mut GameBoy) {
    let a = gb.cpu.a;
    let res = a >> 1 | (gb.cpu.carry as u8) << 7;
    rotate_a(&mut gb.cpu, res, a & 0x01 != 0);
}

// Control flow

fn jr(gb: &mut GameBoy) {
    let e = gb.fetch() as i8;
    gb.cpu.pc = gb.cpu.pc.wrapping_add_signed(e as i16);
}

fn jr_cc<const C: u8>(gb: &mut GameBoy) {
    let e = gb.fetch() as i8;
    if gb.cpu.condition(C) {
        gb.cpu.pc = gb.cpu.pc.wrapping_add_signed(e as i16);
        gb.cpu.extra_cycles += 4;
    }
}

fn jp(gb: &mut GameBoy) {
    gb.cpu.pc = gb.fetch_word();
}

fn jp_cc<const C: u8>(gb: &mut GameBoy) {
    let addr = gb.fetch_word();
    if gb.cpu.condition(C) {
        gb.cpu.pc = addr;
        gb.cpu.extra_cycles += 4;
    }
}

fn jp_hl(gb: &mut GameBoy) {
    gb.cpu.pc = gb.cpu.hl;
}

fn call(gb: &mut GameBoy) {
    let addr = gb.fetch_word();
    gb.push(gb.cpu.pc);
    gb.cpu.pc = addr;
}

fn call_cc<const C: u8>(gb: &mut GameBoy) {
    let addr = gb.fetch_word();
    if gb.cpu.condition(C) {
        gb.push(gb.cpu.pc);
        gb.cpu.pc = addr;
        gb.cpu.extra_cycles += 12;
    }
}

fn ret(gb: &mut GameBoy) {
    gb.cpu.pc = gb.pop();
}

fn ret_cc<const C: u8>(gb: &mut GameBoy) {
    if gb.cpu.condition(C) {
        gb.cpu.pc = gb.pop();
        gb.cpu.extra_cycles += 12;
    }
}

fn reti(gb: &mut GameBoy) {
    gb.cpu.pc = gb.pop();
    schedule_ime(gb);
}

fn rst<const N: u8>(gb: &mut GameBoy) {
    gb.push(gb.cpu.pc);
    gb.cpu.pc = N as u16;
}

// Interrupt and power control

/// IME turns on after the next instruction, or straight after a HALT that
/// follows immediately so the HALT itself can be interrupted.
fn schedule_ime(gb: &mut GameBoy) {
    let next = gb.read(gb.cpu.pc);
    gb.cpu.ime_delay = if gb.cpu.ime_delay == 2 || next == 0x76 { 1 } else { 2 };
}

fn di(gb: &mut GameBoy) {
    gb.cpu.ime = false;
    gb.cpu.ime_delay = 0;
}

fn ei(gb: &mut GameBoy) {
    schedule_ime(gb);
}

fn halt(gb: &mut GameBoy) {
    if gb.interrupts.pending() == 0 {
        gb.cpu.halted = true;
    } else if !gb.cpu.ime && !gb.cgb && !gb.used_boot_rom {
        // DMG halt bug: the next opcode byte is read twice.
        gb.cpu.skip_pc_increment = true;
    } else {
        gb.cpu.extra_cycles += 4;
    }
}

fn stop(gb: &mut GameBoy) {
    gb.fetch();
    if gb.cgb && gb.speed_switch_armed {
        gb.switch_speed();
    } else {
        gb.cpu.stopped = true;
    }
}

fn prefix_cb(gb: &mut GameBoy) {
    let opcode = gb.fetch();
    CB[opcode as usize](gb);
    gb.cpu.extra_cycles += CB_CYCLES[opcode as usize] as u32;
}
