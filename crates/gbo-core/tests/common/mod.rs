#![allow(dead_code)]

use gbo_core::{CoreConfig, GameBoy, MemoryStore};
use once_cell::sync::Lazy;

pub const BANK_SIZE: usize = 0x4000;

/// Where test programs are placed; the header jumps here.
pub const PROGRAM: u16 = 0x0150;

/// Builds ROM images with a valid-enough header. Every bank starts with its
/// own bank number so bank switching can be observed at 0x4000.
pub struct RomBuilder {
    rom: Vec<u8>,
}

impl RomBuilder {
    pub fn new() -> Self {
        let mut rom = vec![0u8; 2 * BANK_SIZE];
        // NOP; JP 0x0150
        rom[0x100..0x104].copy_from_slice(&[0x00, 0xC3, 0x50, 0x01]);
        let mut builder = Self { rom };
        builder.set_title("TEST");
        builder.stamp_banks();
        builder
    }

    fn set_title(&mut self, title: &str) {
        self.rom[0x134..0x144].fill(0);
        let bytes = title.as_bytes();
        let len = bytes.len().min(15);
        self.rom[0x134..0x134 + len].copy_from_slice(&bytes[..len]);
    }

    fn stamp_banks(&mut self) {
        for bank in 1..self.rom.len() / BANK_SIZE {
            self.rom[bank * BANK_SIZE] = bank as u8;
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.set_title(title);
        self
    }

    pub fn banks(mut self, banks: usize) -> Self {
        self.rom.resize(banks * BANK_SIZE, 0);
        self.stamp_banks();
        self
    }

    pub fn cart_type(mut self, cart_type: u8) -> Self {
        self.rom[0x147] = cart_type;
        self
    }

    /// RAM size code for 0x149.
    pub fn ram(mut self, code: u8) -> Self {
        self.rom[0x149] = code;
        self
    }

    pub fn cgb(mut self) -> Self {
        self.rom[0x143] = 0x80;
        self
    }

    pub fn checksum(mut self, checksum: u16) -> Self {
        self.rom[0x14E..0x150].copy_from_slice(&checksum.to_be_bytes());
        self
    }

    pub fn at(mut self, addr: usize, bytes: &[u8]) -> Self {
        self.rom[addr..addr + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn program(self, code: &[u8]) -> Self {
        self.at(PROGRAM as usize, code)
    }

    pub fn build(self) -> Vec<u8> {
        self.rom
    }
}

impl Default for RomBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `JR -2` forever.
pub static IDLE_ROM: Lazy<Vec<u8>> = Lazy::new(|| RomBuilder::new().program(&[0x18, 0xFE]).build());

/// Counts in B and keeps the LCD, timer and sound busy. Deterministic but
/// touches most of the machine.
pub static BUSY_ROM: Lazy<Vec<u8>> = Lazy::new(|| {
    RomBuilder::new()
        .title("BUSY")
        .program(&[
            0x3E, 0x80, 0xE0, 0x26, // LD A,80; LDH (26),A  sound on
            0x3E, 0x77, 0xE0, 0x24, // LD A,77; LDH (24),A
            0x3E, 0xFF, 0xE0, 0x25, // LD A,FF; LDH (25),A
            0x3E, 0xF0, 0xE0, 0x17, // LD A,F0; LDH (17),A  ch2 envelope
            0x3E, 0x87, 0xE0, 0x19, // LD A,87; LDH (19),A  ch2 trigger
            0x3E, 0x05, 0xE0, 0x07, // LD A,05; LDH (07),A  timer on
            0x04, // loop: INC B
            0x21, 0x00, 0xC0, // LD HL,C000
            0x70, // LD (HL),B
            0xF0, 0x44, // LDH A,(44)
            0x80, // ADD A,B
            0xE0, 0x42, // LDH (42),A  SCY
            0x18, 0xF4, // JR loop
        ])
        .build()
});

pub fn machine(rom: &[u8]) -> GameBoy {
    machine_with(rom, CoreConfig::default())
}

pub fn machine_with(rom: &[u8], config: CoreConfig) -> GameBoy {
    GameBoy::new(rom.to_vec(), config, &MemoryStore::new()).expect("test ROM loads")
}

/// Step until PC reaches `pc`, panicking after `max_steps`.
pub fn run_to(gb: &mut GameBoy, pc: u16, max_steps: usize) {
    for _ in 0..max_steps {
        if gb.cpu.pc == pc {
            return;
        }
        gb.step().expect("no illegal opcode");
    }
    panic!("PC never reached {pc:04X}; stuck at {:04X}", gb.cpu.pc);
}

/// Run `code` from the program address and stop right after it.
pub fn run_snippet(code: &[u8]) -> GameBoy {
    let mut full = code.to_vec();
    full.extend_from_slice(&[0x18, 0xFE]);
    let rom = RomBuilder::new().program(&full).build();
    let mut gb = machine(&rom);
    run_to(&mut gb, PROGRAM + code.len() as u16, 10_000);
    gb
}
