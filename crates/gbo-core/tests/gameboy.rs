mod common;

use common::{IDLE_ROM, PROGRAM, RomBuilder, machine, machine_with, run_to};
use gbo_core::{Button, CoreConfig};

fn boot_rom(len: usize) -> Vec<u8> {
    let mut boot = vec![0u8; len];
    // LD A,01; LDH (50),A, ending exactly at 0x0100.
    boot[0xFC..0x100].copy_from_slice(&[0x3E, 0x01, 0xE0, 0x50]);
    boot
}

#[test]
fn mode_follows_header_and_override() {
    let cgb_rom = RomBuilder::new().cgb().build();
    assert!(machine(&cgb_rom).cgb);
    assert!(!machine(&IDLE_ROM).cgb);
    let forced = machine_with(
        &cgb_rom,
        CoreConfig {
            force_dmg: true,
            ..CoreConfig::default()
        },
    );
    assert!(!forced.cgb);
}

#[test]
fn boot_rom_overlay_unmaps_on_ff50() {
    let rom = RomBuilder::new().at(0x0000, &[0xAA]).program(&[0x18, 0xFE]).build();
    let mut gb = machine_with(
        &rom,
        CoreConfig {
            boot_rom: Some(boot_rom(0x100)),
            ..CoreConfig::default()
        },
    );
    assert!(gb.used_boot_rom);
    assert_eq!(gb.cpu.pc, 0x0000);
    assert!(!gb.ppu.lcd_on(), "the boot ROM turns the LCD on itself");
    assert_eq!(gb.read(0x0000), 0x00);
    run_to(&mut gb, 0x0100, 1_000);
    assert_eq!(gb.read(0x0000), 0xAA, "cartridge visible again");
    gb.write(0xFF50, 0x00);
    assert_eq!(gb.read(0x0000), 0xAA, "the overlay cannot be remapped");
}

#[test]
fn cgb_boot_steps_down_for_dmg_cartridge() {
    let mut gb = machine_with(
        &IDLE_ROM,
        CoreConfig {
            boot_rom: Some(boot_rom(0x900)),
            ..CoreConfig::default()
        },
    );
    assert!(gb.cgb, "a GBC boot ROM starts in GBC mode");
    assert_eq!(gb.read(0xFF70), 0xF9);
    run_to(&mut gb, 0x0100, 1_000);
    assert!(!gb.cgb);
    assert_eq!(gb.read(0xFF70), 0xFF, "GBC registers unmapped");
}

#[test]
fn speed_switch_through_stop() {
    // LD A,01; LDH (4D),A; STOP
    let rom = RomBuilder::new()
        .cgb()
        .program(&[0x3E, 0x01, 0xE0, 0x4D, 0x10, 0x00, 0x18, 0xFE])
        .build();
    let mut gb = machine(&rom);
    run_to(&mut gb, PROGRAM + 4, 100);
    assert_eq!(gb.read(0xFF4D), 0x7F, "armed");
    gb.step().unwrap();
    assert!(gb.double_speed);
    assert!(!gb.cpu.stopped);
    assert_eq!(gb.read(0xFF4D), 0xFE);

    // Twice the CPU cycles fit in one frame.
    let mut spent = 0u64;
    let frames = gb.ppu.frames();
    while gb.ppu.frames() == frames {
        spent += gb.step().unwrap() as u64;
    }
    assert!(spent > 70_224, "{spent} CPU cycles until the next frame");
}

#[test]
fn stop_without_switch_waits_for_a_key() {
    let rom = RomBuilder::new().program(&[0x10, 0x00, 0x04, 0x18, 0xFE]).build();
    let mut gb = machine(&rom);
    run_to(&mut gb, PROGRAM, 10);
    gb.step().unwrap();
    assert!(gb.cpu.stopped);
    gb.run_frame().unwrap();
    assert_eq!(gb.cpu.pc, PROGRAM + 2, "nothing runs while stopped");
    gb.set_button(Button::Start, true);
    assert!(!gb.cpu.stopped);
    gb.step().unwrap();
    assert_eq!(gb.cpu.pc, PROGRAM + 3);
}

#[test]
fn joypad_press_requests_interrupt() {
    let mut gb = machine(&IDLE_ROM);
    gb.write(0xFF00, 0x10);
    gb.interrupts.requested = 0;
    gb.joypad_event(4, true);
    assert_eq!(gb.read(0xFF00) & 0x0F, 0x0E, "A reads low");
    assert_eq!(gb.interrupts.requested, 0x10);

    gb.interrupts.requested = 0;
    gb.joypad_event(4, false);
    gb.joypad_event(9, true);
    gb.joypad_event(0, true);
    assert_eq!(gb.interrupts.requested, 0, "direction row not selected");
}

#[test]
fn joypad_interrupt_can_be_disabled() {
    let mut gb = machine_with(
        &IDLE_ROM,
        CoreConfig {
            joypad_interrupt: false,
            ..CoreConfig::default()
        },
    );
    gb.write(0xFF00, 0x20);
    gb.interrupts.requested = 0;
    gb.set_button(Button::Down, true);
    assert_eq!(gb.read(0xFF00) & 0x0F, 0x07);
    assert_eq!(gb.interrupts.requested, 0);
}

#[test]
fn audio_underrun_lengthens_the_iteration() {
    let mut gb = machine(&IDLE_ROM);
    gb.attach_audio(44_100).unwrap();
    gb.run_frame().unwrap();
    assert_eq!(gb.ppu.frames(), 3, "empty buffer: two extra frames of cycles");
    let frames = gb.ppu.frames();
    gb.run_frame().unwrap();
    assert!(gb.ppu.frames() - frames <= 3);
}

#[test]
fn fractional_iterations_do_not_drift() {
    let mut gb = machine_with(
        &IDLE_ROM,
        CoreConfig {
            iteration_cycles: 70_224.0 / 2.0 + 0.25,
            ..CoreConfig::default()
        },
    );
    let delivered = (0..200).filter(|_| gb.run_frame().unwrap()).count();
    assert_eq!(delivered, 100);
}

#[test]
fn reset_keeps_battery_ram() {
    let rom = RomBuilder::new().cart_type(0x03).ram(0x02).program(&[0x18, 0xFE]).build();
    let mut gb = machine(&rom);
    gb.write(0x0000, 0x0A);
    gb.write(0xA000, 0x77);
    gb.run_frame().unwrap();
    gb.reset();
    assert_eq!(gb.cpu.pc, 0x0100);
    assert_eq!(gb.ppu.frames(), 0);
    gb.write(0x0000, 0x0A);
    assert_eq!(gb.read(0xA000), 0x77);
}
