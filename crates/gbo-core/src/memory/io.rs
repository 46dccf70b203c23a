//! Handlers for the 0xFF00 page.

use super::{ReadHandler, WriteHandler, ignore_write, open_bus_read};
use crate::gameboy::GameBoy;

/// Fill the 256-entry high-page tables for the given mode.
pub(super) fn install(read: &mut [ReadHandler], write: &mut [WriteHandler], cgb: bool) {
    read.fill(open_bus_read);
    write.fill(ignore_write);

    let mut map = |offset: usize, r: ReadHandler, w: WriteHandler| {
        read[offset] = r;
        write[offset] = w;
    };

    map(0x00, joypad_read, joypad_write);
    map(0x01, serial_read, serial_write);
    map(0x02, serial_read, serial_write);
    for offset in 0x04..=0x07 {
        map(offset, timer_read, timer_write);
    }
    map(0x0F, if_read, if_write);
    for offset in 0x10..=0x3F {
        map(offset, sound_read, sound_write);
    }
    map(0x40, lcdc_read, lcdc_write);
    map(0x41, stat_read, stat_write);
    for offset in [0x42, 0x43, 0x45, 0x47, 0x48, 0x49, 0x4A, 0x4B] {
        map(offset, ppu_reg_read, ppu_reg_write);
    }
    map(0x44, ppu_reg_read, ignore_write);
    map(0x46, oam_dma_read, oam_dma_write);
    map(0x50, open_bus_read, boot_unmap_write);
    for offset in 0x80..=0xFE {
        map(offset, hram_read, hram_write);
    }
    map(0xFF, ie_read, ie_write);

    if !cgb {
        return;
    }
    map(0x4C, open_bus_read, ignore_write);
    map(0x4D, key1_read, key1_write);
    map(0x4F, vbk_read, vbk_write);
    for offset in 0x51..=0x54 {
        map(offset, open_bus_read, hdma_source_write);
    }
    map(0x55, hdma_control_read, hdma_control_write);
    map(0x56, infrared_read, infrared_write);
    for offset in 0x68..=0x6C {
        map(offset, ppu_reg_read, ppu_reg_write);
    }
    map(0x70, svbk_read, svbk_write);
    for offset in 0x72..=0x75 {
        map(offset, undocumented_read, undocumented_write);
    }
    map(0x76, pcm_read, ignore_write);
    map(0x77, pcm_read, ignore_write);
}

fn joypad_read(gb: &mut GameBoy, _: u16) -> u8 {
    gb.joypad.read()
}

fn joypad_write(gb: &mut GameBoy, _: u16, val: u8) {
    gb.joypad.write(val);
}

fn serial_read(gb: &mut GameBoy, addr: u16) -> u8 {
    gb.serial.read(addr)
}

fn serial_write(gb: &mut GameBoy, addr: u16, val: u8) {
    gb.serial.write(addr, val);
}

fn timer_read(gb: &mut GameBoy, addr: u16) -> u8 {
    gb.timer.read(addr)
}

fn timer_write(gb: &mut GameBoy, addr: u16, val: u8) {
    gb.timer.write(addr, val);
}

fn if_read(gb: &mut GameBoy, _: u16) -> u8 {
    gb.interrupts.read_if()
}

fn if_write(gb: &mut GameBoy, _: u16, val: u8) {
    gb.interrupts.write_if(val);
}

fn ie_read(gb: &mut GameBoy, _: u16) -> u8 {
    gb.interrupts.enabled
}

fn ie_write(gb: &mut GameBoy, _: u16, val: u8) {
    gb.interrupts.enabled = val;
}

fn sound_read(gb: &mut GameBoy, addr: u16) -> u8 {
    gb.audio_jit();
    gb.apu.read(addr)
}

fn sound_write(gb: &mut GameBoy, addr: u16, val: u8) {
    gb.audio_jit();
    gb.apu.write(addr, val);
}

fn pcm_read(gb: &mut GameBoy, addr: u16) -> u8 {
    gb.audio_jit();
    if addr == 0xFF76 {
        gb.apu.pcm12()
    } else {
        gb.apu.pcm34()
    }
}

fn lcdc_read(gb: &mut GameBoy, _: u16) -> u8 {
    gb.ppu.lcdc
}

fn lcdc_write(gb: &mut GameBoy, _: u16, val: u8) {
    gb.ppu.write_lcdc(val, &mut gb.interrupts);
}

fn stat_read(gb: &mut GameBoy, _: u16) -> u8 {
    gb.ppu.read_stat()
}

fn stat_write(gb: &mut GameBoy, _: u16, val: u8) {
    gb.ppu.write_stat(val);
}

fn ppu_reg_read(gb: &mut GameBoy, addr: u16) -> u8 {
    gb.ppu.read_reg(addr)
}

fn ppu_reg_write(gb: &mut GameBoy, addr: u16, val: u8) {
    gb.ppu.write_reg(addr, val, &mut gb.interrupts);
}

fn oam_dma_read(gb: &mut GameBoy, _: u16) -> u8 {
    gb.dma.oam_source
}

fn oam_dma_write(gb: &mut GameBoy, _: u16, val: u8) {
    gb.oam_dma(val);
}

fn boot_unmap_write(gb: &mut GameBoy, _: u16, val: u8) {
    if val != 0 && gb.memory.boot_mapped {
        gb.unmap_boot_rom();
    }
}

fn hram_read(gb: &mut GameBoy, addr: u16) -> u8 {
    gb.memory.flat[addr as usize]
}

fn hram_write(gb: &mut GameBoy, addr: u16, val: u8) {
    gb.memory.flat[addr as usize] = val;
}

fn key1_read(gb: &mut GameBoy, _: u16) -> u8 {
    0x7E | (gb.double_speed as u8) << 7 | gb.speed_switch_armed as u8
}

fn key1_write(gb: &mut GameBoy, _: u16, val: u8) {
    gb.speed_switch_armed = val & 0x01 != 0;
}

fn vbk_read(gb: &mut GameBoy, _: u16) -> u8 {
    0xFE | gb.ppu.vram_bank
}

fn vbk_write(gb: &mut GameBoy, _: u16, val: u8) {
    gb.ppu.vram_bank = val & 0x01;
}

fn hdma_source_write(gb: &mut GameBoy, addr: u16, val: u8) {
    gb.dma.write_address(addr, val);
}

fn hdma_control_read(gb: &mut GameBoy, _: u16) -> u8 {
    gb.dma.read_control()
}

fn hdma_control_write(gb: &mut GameBoy, _: u16, val: u8) {
    gb.hdma_control(val);
}

fn infrared_read(gb: &mut GameBoy, _: u16) -> u8 {
    // No light is ever received.
    (gb.memory.infrared & 0xC1) | 0x3E
}

fn infrared_write(gb: &mut GameBoy, _: u16, val: u8) {
    gb.memory.infrared = val;
}

fn svbk_read(gb: &mut GameBoy, _: u16) -> u8 {
    0xF8 | gb.memory.wram_bank
}

fn svbk_write(gb: &mut GameBoy, _: u16, val: u8) {
    gb.memory.wram_bank = val & 0x07;
}

fn undocumented_read(gb: &mut GameBoy, addr: u16) -> u8 {
    let value = gb.memory.undocumented[(addr - 0xFF72) as usize];
    if addr == 0xFF75 { value | 0x8F } else { value }
}

fn undocumented_write(gb: &mut GameBoy, addr: u16, val: u8) {
    let value = if addr == 0xFF75 { val & 0x70 } else { val };
    gb.memory.undocumented[(addr - 0xFF72) as usize] = value;
}
