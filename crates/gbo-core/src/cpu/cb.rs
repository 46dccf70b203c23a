//! 0xCB-prefixed opcode handlers: rotates, shifts, SWAP and the bit
//! operations.

use super::Opcode;
use crate::gameboy::GameBoy;

#[rustfmt::skip]
pub static CB: [Opcode; 256] = [
    // 0x
    shift::<0, 0>, shift::<0, 1>, shift::<0, 2>, shift::<0, 3>,
    shift::<0, 4>, shift::<0, 5>, shift::<0, 6>, shift::<0, 7>,
    shift::<1, 0>, shift::<1, 1>, shift::<1, 2>, shift::<1, 3>,
    shift::<1, 4>, shift::<1, 5>, shift::<1, 6>, shift::<1, 7>,
    // 1x
    shift::<2, 0>, shift::<2, 1>, shift::<2, 2>, shift::<2, 3>,
    shift::<2, 4>, shift::<2, 5>, shift::<2, 6>, shift::<2, 7>,
    shift::<3, 0>, shift::<3, 1>, shift::<3, 2>, shift::<3, 3>,
    shift::<3, 4>, shift::<3, 5>, shift::<3, 6>, shift::<3, 7>,
    // 2x
    shift::<4, 0>, shift::<4, 1>, shift::<4, 2>, shift::<4, 3>,
    shift::<4, 4>, shift::<4, 5>, shift::<4, 6>, shift::<4, 7>,
    shift::<5, 0>, shift::<5, 1>, shift::<5, 2>, shift::<5, 3>,
    shift::<5, 4>, shift::<5, 5>, shift::<5, 6>, shift::<5, 7>,
    // 3x
    shift::<6, 0>, shift::<6, 1>, shift::<6, 2>, shift::<6, 3>,
    shift::<6, 4>, shift::<6, 5>, shift::<6, 6>, shift::<6, 7>,
    shift::<7, 0>, shift::<7, 1>, shift::<7, 2>, shift::<7, 3>,
    shift::<7, 4>, shift::<7, 5>, shift::<7, 6>, shift::<7, 7>,
    // 4x
    bit::<0, 0>, bit::<0, 1>, bit::<0, 2>, bit::<0, 3>,
    bit::<0, 4>, bit::<0, 5>, bit::<0, 6>, bit::<0, 7>,
    bit::<1, 0>, bit::<1, 1>, bit::<1, 2>, bit::<1, 3>,
    bit::<1, 4>, bit::<1, 5>, bit::<1, 6>, bit::<1, 7>,
    // 5x
    bit::<2, 0>, bit::<2, 1>, bit::<2, 2>, bit::<2, 3>,
    bit::<2, 4>, bit::<2, 5>, bit::<2, 6>, bit::<2, 7>,
    bit::<3, 0>, bit::<3, 1>, bit::<3, 2>, bit::<3, 3>,
    bit::<3, 4>, bit::<3, 5>, bit::<3, 6>, bit::<3, 7>,
    // 6x
    bit::<4, 0>, bit::<4, 1>, bit::<4, 2>, bit::<4, 3>,
    bit::<4, 4>, bit::<4, 5>, bit::<4, 6>, bit::<4, 7>,
    bit::<5, 0>, bit::<5, 1>, bit::<5, 2>, bit::<5, 3>,
    bit::<5, 4>, bit::<5, 5>, bit::<5, 6>, bit::<5, 7>,
    // 7x
    bit::<6, 0>, bit::<6, 1>, bit::<6, 2>, bit::<6, 3>,
    bit::<6, 4>, bit::<6, 5>, bit::<6, 6>, bit::<6, 7>,
    bit::<7, 0>, bit::<7, 1>, bit::<7, 2>, bit::<7, 3>,
    bit::<7, 4>, bit::<7, 5>, bit::<7, 6>, bit::<7, 7>,
    // 8x
    res::<0, 0>, res::<0, 1>, res::<0, 2>, res::<0, 3>,
    res::<0, 4>, res::<0, 5>, res::<0, 6>, res::<0, 7>,
    res::<1, 0>, res::<1, 1>, res::<1, 2>, res::<1, 3>,
    res::<1, 4>, res::<1, 5>, res::<1, 6>, res::<1, 7>,
    // 9x
    res::<2, 0>, res::<2, 1>, res::<2, 2>, res::<2, 3>,
    res::<2, 4>, res::<2, 5>, res::<2, 6>, res::<2, 7>,
    res::<3, 0>, res::<3, 1>, res::<3, 2>, res::<3, 3>,
    res::<3, 4>, res::<3, 5>, res::<3, 6>, res::<3, 7>,
    // Ax
    res::<4, 0>, res::<4, 1>, res::<4, 2>, res::<4, 3>,
    res::<4, 4>, res::<4, 5>, res::<4, 6>, res::<4, 7>,
    res::<5, 0>, res::<5, 1>, res::<5, 2>, res::<5, 3>,
    res::<5, 4>, res::<5, 5>, res::<5, 6>, res::<5, 7>,
    // Bx
    res::<6, 0>, res::<6, 1>, res::<6, 2>, res::<6, 3>,
    res::<6, 4>, res::<6, 5>, res::<6, 6>, res::<6, 7>,
    res::<7, 0>, res::<7, 1>, res::<7, 2>, res::<7, 3>,
    res::<7, 4>, res::<7, 5>, res::<7, 6>, res::<7, 7>,
    // Cx
    set::<0, 0>, set::<0, 1>, set::<0, 2>, set::<0, 3>,
    set::<0, 4>, set::<0, 5>, set::<0, 6>, set::<0, 7>,
    set::<1, 0>, set::<1, 1>, set::<1, 2>, set::<1, 3>,
    set::<1, 4>, set::<1, 5>, set::<1, 6>, set::<1, 7>,
    // Dx
    set::<2, 0>, set::<2, 1>, set::<2, 2>, set::<2, 3>,
    set::<2, 4>, set::<2, 5>, set::<2, 6>, set::<2, 7>,
    set::<3, 0>, set::<3, 1>, set::<3, 2>, set::<3, 3>,
    set::<3, 4>, set::<3, 5>, set::<3, 6>, set::<3, 7>,
    // Ex
    set::<4, 0>, set::<4, 1>, set::<4, 2>, set::<4, 3>,
    set::<4, 4>, set::<4, 5>, set::<4, 6>, set::<4, 7>,
    set::<5, 0>, set::<5, 1>, set::<5, 2>, set::<5, 3>,
    set::<5, 4>, set::<5, 5>, set::<5, 6>, set::<5, 7>,
    // Fx
    set::<6, 0>, set::<6, 1>, set::<6, 2>, set::<6, 3>,
    set::<6, 4>, set::<6, 5>, set::<6, 6>, set::<6, 7>,
    set::<7, 0>, set::<7, 1>, set::<7, 2>, set::<7, 3>,
    set::<7, 4>, set::<7, 5>, set::<7, 6>, set::<7, 7>,
];

/// RLC RRC RL RR SLA SRA SWAP SRL by their three-bit encoding.
fn shift<const OP: u8, const R: u8>(gb: &mut GameBoy) {
    let val = gb.reg(R);
    let carry_in = gb.cpu.carry as u8;
    let (res, carry) = match OP {
        0 => (val.rotate_left(1), val & 0x80 != 0),
        1 => (val.rotate_right(1), val & 0x01 != 0),
        2 => (val << 1 | carry_in, val & 0x80 != 0),
        3 => (val >> 1 | carry_in << 7, val & 0x01 != 0),
        4 => (val << 1, val & 0x80 != 0),
        5 => (val >> 1 | val & 0x80, val & 0x01 != 0),
        6 => (val.rotate_left(4), false),
        _ => (val >> 1, val & 0x01 != 0),
    };
    gb.cpu.zero = res == 0;
    gb.cpu.subtract = false;
    gb.cpu.half_carry = false;
    gb.cpu.carry = carry;
    gb.set_reg(R, res);
}

fn bit<const B: u8, const R: u8>(gb: &mut GameBoy) {
    let val = gb.reg(R);
    gb.cpu.zero = val & (1 << B) == 0;
    gb.cpu.subtract = false;
    gb.cpu.half_carry = true;
}

fn res<const B: u8, const R: u8>(gb: &mut GameBoy) {
    let val = gb.reg(R);
    gb.set_reg(R, val & !(1 << B));
}

fn set<const B: u8, const R: u8>(gb: &mut GameBoy) {
    let val = gb.reg(R);
    gb.set_reg(R, val | 1 << B);
}
