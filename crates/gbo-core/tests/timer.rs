mod common;

use common::{IDLE_ROM, RomBuilder, machine, run_to};
use gbo_core::interrupt::Interrupts;
use gbo_core::timer::Timer;

#[test]
fn div_counts_through_the_bus() {
    let mut gb = machine(&IDLE_ROM);
    gb.write(0xFF04, 0x55);
    assert_eq!(gb.read(0xFF04), 0);
    let mut spent = 0;
    while spent < 256 * 4 {
        spent += gb.step().unwrap();
    }
    let div = gb.read(0xFF04);
    assert!((4..=5).contains(&div), "DIV = {div}");
}

#[test]
fn timer_interrupt_runs_handler() {
    // TMA=F0, TIMA=F0, TAC=05 (16 cycles), IE=timer, EI, spin.
    let rom = RomBuilder::new()
        .program(&[
            0x3E, 0xF0, 0xE0, 0x06, 0xE0, 0x05, // LD A,F0; LDH (06),A; LDH (05),A
            0x3E, 0x04, 0xE0, 0xFF, // LD A,04; LDH (FF),A
            0xAF, 0xE0, 0x0F, // XOR A; LDH (0F),A
            0x3E, 0x05, 0xE0, 0x07, // LD A,05; LDH (07),A
            0x06, 0x00, // LD B,0
            0xFB, // EI
            0x18, 0xFE, // JR -2
        ])
        .at(0x50, &[0x04, 0xD9]) // INC B; RETI
        .build();
    let mut gb = machine(&rom);
    run_to(&mut gb, 0x0050, 1_000);
    assert_eq!(gb.cpu.b, 0);
    let tima = gb.read(0xFF05);
    assert!((0xF0..=0xF3).contains(&tima), "reloaded from TMA, got {tima:02X}");
    gb.run_frame().unwrap();
    // 70224 cycles at 16 per increment and 16 increments per overflow.
    let handled = u32::from(gb.cpu.b);
    assert!((250..=280).contains(&handled), "{handled} overflows handled");
}

#[test]
fn disabled_timer_leaves_tima() {
    let mut timer = Timer::new();
    let mut irq = Interrupts::default();
    timer.write(0xFF05, 0x10);
    timer.write(0xFF07, 0x01);
    timer.step(10_000, &mut irq);
    assert_eq!(timer.read(0xFF05), 0x10);
    assert_eq!(timer.read(0xFF07), 0xF9);
    assert_eq!(timer.cycles_until_overflow(), None);
}

#[test]
fn overflow_estimate_matches_stepping() {
    let mut timer = Timer::new();
    let mut irq = Interrupts::default();
    timer.write(0xFF05, 0xFE);
    timer.write(0xFF07, 0x05);
    timer.step(7, &mut irq);
    let until = timer.cycles_until_overflow().unwrap();
    assert_eq!(until, 32 - 7);
    timer.step(until - 1, &mut irq);
    assert_eq!(irq.requested, 0);
    timer.step(1, &mut irq);
    assert_eq!(irq.requested, 0x04);
}
