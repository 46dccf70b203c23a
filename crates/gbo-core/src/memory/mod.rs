//! Flat memory and the per-address dispatch tables.
//!
//! Every one of the 65536 addresses owns exactly one read handler and one
//! write handler; the 0xFF00 page is mirrored into 256-entry tables used by
//! the `LDH` forms. Tables are rebuilt from scratch whenever the cartridge
//! controller, the GBC/DMG mode or the boot ROM overlay changes.

mod io;

use serde::{Deserialize, Serialize};

use crate::cartridge::MbcKind;
use crate::gameboy::GameBoy;

pub type ReadHandler = fn(&mut GameBoy, u16) -> u8;
pub type WriteHandler = fn(&mut GameBoy, u16, u8);

const WRAM_BANK_SIZE: usize = 0x1000;
const WRAM_BANKS: usize = 8;

/// Work RAM, HRAM and the boot ROM overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// 64 KiB backing store; holds WRAM bank 0 at 0xC000 and HRAM.
    pub flat: Vec<u8>,
    /// Switchable WRAM for 0xD000-0xDFFF. DMG only ever uses bank 1.
    pub wram_banks: Vec<u8>,
    pub wram_bank: u8,
    #[serde(skip)]
    pub boot_rom: Vec<u8>,
    pub boot_mapped: bool,
    /// FF72-FF75.
    pub undocumented: [u8; 4],
    /// FF56 infrared port, write side only.
    pub infrared: u8,
}

impl Memory {
    pub fn new(boot_rom: Option<Vec<u8>>) -> Self {
        let boot_mapped = boot_rom.is_some();
        Self {
            flat: vec![0; 0x10000],
            wram_banks: vec![0; WRAM_BANK_SIZE * WRAM_BANKS],
            wram_bank: 1,
            boot_rom: boot_rom.unwrap_or_default(),
            boot_mapped,
            undocumented: [0; 4],
            infrared: 0,
        }
    }

    #[inline]
    fn banked_index(&self, addr: u16) -> usize {
        let bank = (self.wram_bank as usize & 0x07).max(1);
        bank * WRAM_BANK_SIZE + (addr as usize & 0x0FFF)
    }
}

/// The four dispatch tables.
pub struct HandlerTables {
    read: Box<[ReadHandler]>,
    write: Box<[WriteHandler]>,
    high_read: Box<[ReadHandler]>,
    high_write: Box<[WriteHandler]>,
}

impl HandlerTables {
    pub fn new() -> Self {
        Self {
            read: vec![open_bus_read as ReadHandler; 0x10000].into_boxed_slice(),
            write: vec![ignore_write as WriteHandler; 0x10000].into_boxed_slice(),
            high_read: vec![open_bus_read as ReadHandler; 0x100].into_boxed_slice(),
            high_write: vec![ignore_write as WriteHandler; 0x100].into_boxed_slice(),
        }
    }

    fn map_read(&mut self, range: std::ops::RangeInclusive<usize>, handler: ReadHandler) {
        self.read[range].fill(handler);
    }

    fn map_write(&mut self, range: std::ops::RangeInclusive<usize>, handler: WriteHandler) {
        self.write[range].fill(handler);
    }
}

impl Default for HandlerTables {
    fn default() -> Self {
        Self::new()
    }
}

impl GameBoy {
    #[inline]
    pub fn read(&mut self, addr: u16) -> u8 {
        let handler = self.handlers.read[addr as usize];
        handler(self, addr)
    }

    #[inline]
    pub fn write(&mut self, addr: u16, val: u8) {
        let handler = self.handlers.write[addr as usize];
        handler(self, addr, val);
    }

    /// `0xFF00 + offset`, through the high-page tables.
    #[inline]
    pub fn read_high(&mut self, offset: u8) -> u8 {
        let handler = self.handlers.high_read[offset as usize];
        handler(self, 0xFF00 | offset as u16)
    }

    #[inline]
    pub fn write_high(&mut self, offset: u8, val: u8) {
        let handler = self.handlers.high_write[offset as usize];
        handler(self, 0xFF00 | offset as u16, val);
    }

    pub fn read_word(&mut self, addr: u16) -> u16 {
        let lo = self.read(addr);
        let hi = self.read(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    pub fn write_word(&mut self, addr: u16, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        self.write(addr, lo);
        self.write(addr.wrapping_add(1), hi);
    }

    /// Rebuild every dispatch table from the current cartridge, mode and
    /// boot-ROM state.
    pub(crate) fn rebuild_handlers(&mut self) {
        let tables = &mut self.handlers;

        tables.map_read(0x0000..=0x3FFF, rom_low_read);
        tables.map_read(0x4000..=0x7FFF, rom_high_read);
        if self.memory.boot_mapped {
            tables.map_read(0x0000..=0x00FF, boot_rom_read);
            if self.cgb && self.memory.boot_rom.len() > 0x200 {
                tables.map_read(0x0200..=0x08FF, boot_rom_read);
            }
        }

        match self.cartridge.kind {
            MbcKind::RomOnly => {
                tables.map_write(0x0000..=0x7FFF, ignore_write);
            }
            MbcKind::Mbc1 => {
                tables.map_write(0x0000..=0x1FFF, ram_enable_write);
                tables.map_write(0x2000..=0x3FFF, rom_bank_write);
                tables.map_write(0x4000..=0x5FFF, ram_bank_write);
                tables.map_write(0x6000..=0x7FFF, mbc1_mode_write);
            }
            MbcKind::Mbc2 => {
                tables.map_write(0x0000..=0x3FFF, mbc2_control_write);
                tables.map_write(0x4000..=0x7FFF, ignore_write);
            }
            MbcKind::Mbc3 => {
                tables.map_write(0x0000..=0x1FFF, ram_enable_write);
                tables.map_write(0x2000..=0x3FFF, rom_bank_write);
                tables.map_write(0x4000..=0x5FFF, ram_bank_write);
                tables.map_write(0x6000..=0x7FFF, rtc_latch_write);
            }
            MbcKind::Mbc5 => {
                tables.map_write(0x0000..=0x1FFF, ram_enable_write);
                tables.map_write(0x2000..=0x2FFF, rom_bank_write);
                tables.map_write(0x3000..=0x3FFF, rom_bank_high_write);
                tables.map_write(0x4000..=0x5FFF, ram_bank_write);
                tables.map_write(0x6000..=0x7FFF, ignore_write);
            }
        }

        tables.map_read(0x8000..=0x9FFF, vram_read);
        tables.map_write(0x8000..=0x9FFF, vram_write);

        let has_ram = !self.cartridge.ram.is_empty();
        let (ram_read, ram_write): (ReadHandler, WriteHandler) = match self.cartridge.kind {
            MbcKind::Mbc2 => (mbc2_ram_read, mbc2_ram_write),
            MbcKind::Mbc3 if has_ram || self.cartridge.rtc.is_some() => {
                (mbc3_ram_read, mbc3_ram_write)
            }
            _ if has_ram => (cart_ram_read, cart_ram_write),
            _ => (open_bus_read, ignore_write),
        };
        tables.map_read(0xA000..=0xBFFF, ram_read);
        tables.map_write(0xA000..=0xBFFF, ram_write);

        tables.map_read(0xC000..=0xCFFF, wram_read);
        tables.map_write(0xC000..=0xCFFF, wram_write);
        tables.map_read(0xD000..=0xDFFF, wram_banked_read);
        tables.map_write(0xD000..=0xDFFF, wram_banked_write);
        tables.map_read(0xE000..=0xFDFF, echo_read);
        tables.map_write(0xE000..=0xFDFF, echo_write);

        tables.map_read(0xFE00..=0xFE9F, oam_read);
        tables.map_write(0xFE00..=0xFE9F, oam_write);
        tables.map_read(0xFEA0..=0xFEFF, open_bus_read);
        tables.map_write(0xFEA0..=0xFEFF, ignore_write);

        io::install(
            &mut tables.high_read,
            &mut tables.high_write,
            self.cgb,
        );
        tables.read[0xFF00..=0xFFFF].copy_from_slice(&tables.high_read);
        tables.write[0xFF00..=0xFFFF].copy_from_slice(&tables.high_write);
    }
}

fn open_bus_read(_: &mut GameBoy, _: u16) -> u8 {
    0xFF
}

fn ignore_write(_: &mut GameBoy, _: u16, _: u8) {}

fn rom_low_read(gb: &mut GameBoy, addr: u16) -> u8 {
    gb.cartridge.read_rom_low(addr)
}

fn rom_high_read(gb: &mut GameBoy, addr: u16) -> u8 {
    gb.cartridge.read_rom_high(addr)
}

fn boot_rom_read(gb: &mut GameBoy, addr: u16) -> u8 {
    match gb.memory.boot_rom.get(addr as usize) {
        Some(&byte) => byte,
        None => gb.cartridge.read_rom_low(addr),
    }
}

fn ram_enable_write(gb: &mut GameBoy, _: u16, val: u8) {
    gb.cartridge.write_ram_enable(val);
}

fn rom_bank_write(gb: &mut GameBoy, _: u16, val: u8) {
    gb.cartridge.write_rom_bank_low(val);
}

fn rom_bank_high_write(gb: &mut GameBoy, _: u16, val: u8) {
    gb.cartridge.write_rom_bank_high(val);
}

fn ram_bank_write(gb: &mut GameBoy, _: u16, val: u8) {
    gb.cartridge.write_ram_bank(val);
}

fn mbc1_mode_write(gb: &mut GameBoy, _: u16, val: u8) {
    gb.cartridge.write_mbc1_mode(val);
}

fn mbc2_control_write(gb: &mut GameBoy, addr: u16, val: u8) {
    gb.cartridge.write_mbc2_control(addr, val);
}

fn rtc_latch_write(gb: &mut GameBoy, _: u16, val: u8) {
    gb.cartridge.write_rtc_latch(val);
}

fn cart_ram_read(gb: &mut GameBoy, addr: u16) -> u8 {
    gb.cartridge.read_ram(addr)
}

fn cart_ram_write(gb: &mut GameBoy, addr: u16, val: u8) {
    gb.cartridge.write_ram(addr, val);
}

fn mbc2_ram_read(gb: &mut GameBoy, addr: u16) -> u8 {
    gb.cartridge.read_mbc2_ram(addr)
}

fn mbc2_ram_write(gb: &mut GameBoy, addr: u16, val: u8) {
    gb.cartridge.write_mbc2_ram(addr, val);
}

fn mbc3_ram_read(gb: &mut GameBoy, addr: u16) -> u8 {
    gb.cartridge.read_mbc3_ram(addr)
}

fn mbc3_ram_write(gb: &mut GameBoy, addr: u16, val: u8) {
    gb.cartridge.write_mbc3_ram(addr, val);
}

fn vram_read(gb: &mut GameBoy, addr: u16) -> u8 {
    if gb.ppu.vram_blocked() {
        return 0xFF;
    }
    gb.ppu.read_vram(addr)
}

fn vram_write(gb: &mut GameBoy, addr: u16, val: u8) {
    if gb.ppu.vram_blocked() {
        return;
    }
    gb.ppu.write_vram(addr, val);
}

fn wram_read(gb: &mut GameBoy, addr: u16) -> u8 {
    gb.memory.flat[addr as usize]
}

fn wram_write(gb: &mut GameBoy, addr: u16, val: u8) {
    gb.memory.flat[addr as usize] = val;
}

fn wram_banked_read(gb: &mut GameBoy, addr: u16) -> u8 {
    let index = gb.memory.banked_index(addr);
    gb.memory.wram_banks[index]
}

fn wram_banked_write(gb: &mut GameBoy, addr: u16, val: u8) {
    let index = gb.memory.banked_index(addr);
    gb.memory.wram_banks[index] = val;
}

fn echo_read(gb: &mut GameBoy, addr: u16) -> u8 {
    gb.read(addr - 0x2000)
}

fn echo_write(gb: &mut GameBoy, addr: u16, val: u8) {
    gb.write(addr - 0x2000, val);
}

fn oam_read(gb: &mut GameBoy, addr: u16) -> u8 {
    if gb.ppu.oam_blocked() {
        return 0xFF;
    }
    gb.ppu.oam[(addr - 0xFE00) as usize]
}

fn oam_write(gb: &mut GameBoy, addr: u16, val: u8) {
    if gb.ppu.oam_blocked() {
        return;
    }
    gb.ppu.write_oam((addr - 0xFE00) as usize, val);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banked_index_treats_zero_as_one() {
        let mut memory = Memory::new(None);
        memory.wram_bank = 0;
        assert_eq!(memory.banked_index(0xD000), WRAM_BANK_SIZE);
        memory.wram_bank = 7;
        assert_eq!(memory.banked_index(0xDFFF), 8 * WRAM_BANK_SIZE - 1);
    }
}
