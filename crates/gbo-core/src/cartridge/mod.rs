//! Cartridge header decoding and bank controllers.
//!
//! The memory fabric installs a different handler per controller family, so
//! each register write below maps to exactly one method here.

mod rtc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub use rtc::{Rtc, RtcRegisters};

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;
const MBC2_RAM_SIZE: usize = 0x200;

/// Bank controller families with distinct register semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MbcKind {
    RomOnly,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

/// Header fields the core depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeHeader {
    pub title: String,
    pub cgb: bool,
    pub cart_type: u8,
    pub ram_size: usize,
    pub global_checksum: u16,
}

impl CartridgeHeader {
    pub fn parse(rom: &[u8]) -> Self {
        let title_bytes = &rom[0x134..0x144];
        let end = title_bytes.iter().position(|&b| b == 0).unwrap_or(title_bytes.len());
        let title = String::from_utf8_lossy(&title_bytes[..end])
            .trim()
            .to_string();
        let ram_size = match rom[0x149] {
            0x01 => 0x800,
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x20000,
            0x05 => 0x10000,
            _ => 0,
        };
        Self {
            title,
            cgb: rom[0x143] & 0x80 != 0,
            cart_type: rom[0x147],
            ram_size,
            global_checksum: u16::from_be_bytes([rom[0x14E], rom[0x14F]]),
        }
    }
}

/// Map a cartridge type byte to (controller, has_ram, battery, rtc, rumble).
fn classify(cart_type: u8) -> (MbcKind, bool, bool, bool, bool) {
    match cart_type {
        0x00 => (MbcKind::RomOnly, false, false, false, false),
        0x01 => (MbcKind::Mbc1, false, false, false, false),
        0x02 => (MbcKind::Mbc1, true, false, false, false),
        0x03 => (MbcKind::Mbc1, true, true, false, false),
        0x05 => (MbcKind::Mbc2, true, false, false, false),
        0x06 => (MbcKind::Mbc2, true, true, false, false),
        0x08 => (MbcKind::RomOnly, true, false, false, false),
        0x09 => (MbcKind::RomOnly, true, true, false, false),
        0x0B..=0x0D => {
            warn!("MMM01 cartridge ({cart_type:#04X}) runs as ROM only");
            (MbcKind::RomOnly, cart_type != 0x0B, cart_type == 0x0D, false, false)
        }
        0x0F => (MbcKind::Mbc3, false, true, true, false),
        0x10 => (MbcKind::Mbc3, true, true, true, false),
        0x11 => (MbcKind::Mbc3, false, false, false, false),
        0x12 => (MbcKind::Mbc3, true, false, false, false),
        0x13 => (MbcKind::Mbc3, true, true, false, false),
        0x19 => (MbcKind::Mbc5, false, false, false, false),
        0x1A => (MbcKind::Mbc5, true, false, false, false),
        0x1B => (MbcKind::Mbc5, true, true, false, false),
        0x1C => (MbcKind::Mbc5, false, false, false, true),
        0x1D => (MbcKind::Mbc5, true, false, false, true),
        0x1E => (MbcKind::Mbc5, true, true, false, true),
        0x1F => {
            info!("pocket camera sensor is not emulated; banking as MBC5");
            (MbcKind::Mbc5, true, true, false, false)
        }
        0x22 => {
            info!("MBC7 accelerometer is not emulated; banking as MBC5");
            (MbcKind::Mbc5, true, true, false, false)
        }
        0xFD => {
            warn!("TAMA5 cartridge runs as ROM only");
            (MbcKind::RomOnly, false, false, false, false)
        }
        0xFE => {
            info!("HuC3 clock is not emulated; banking as MBC3");
            (MbcKind::Mbc3, true, true, false, false)
        }
        0xFF => {
            info!("HuC1 infrared port is not emulated; banking as MBC1");
            (MbcKind::Mbc1, true, true, false, false)
        }
        other => {
            warn!("unknown cartridge type {other:#04X}; treating as ROM only");
            (MbcKind::RomOnly, false, false, false, false)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cartridge {
    #[serde(skip)]
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub kind: MbcKind,
    pub has_battery: bool,
    pub has_rumble: bool,
    rom_banks: usize,
    /// Raw bank register as last written (MBC1 keeps both halves here).
    rom_bank_reg: u16,
    /// Byte offset of the bank visible at 0x4000-0x7FFF.
    rom_offset: usize,
    ram_bank: u8,
    ram_offset: usize,
    ram_enabled: bool,
    mbc1_ram_mode: bool,
    pub rtc: Option<Rtc>,
    pub rumble: bool,
}

impl Cartridge {
    /// Decode a full ROM image. Images smaller than one bank are rejected.
    pub fn load(rom: Vec<u8>) -> Result<(Self, CartridgeHeader), CoreError> {
        if rom.len() < ROM_BANK_SIZE {
            return Err(CoreError::RomTooSmall { len: rom.len() });
        }
        let header = CartridgeHeader::parse(&rom);
        let (kind, has_ram, has_battery, has_rtc, has_rumble) = classify(header.cart_type);
        let ram_len = match (kind, has_ram) {
            (_, false) => 0,
            (MbcKind::Mbc2, true) => MBC2_RAM_SIZE,
            (_, true) => header.ram_size,
        };
        info!(
            "cartridge \"{}\": type {:#04X} ({kind:?}), {} KiB ROM, {} bytes RAM",
            header.title,
            header.cart_type,
            rom.len() / 1024,
            ram_len
        );

        let rom_banks = (rom.len() / ROM_BANK_SIZE).max(1);
        let mut cart = Self {
            rom,
            ram: vec![0; ram_len],
            kind,
            has_battery,
            has_rumble,
            rom_banks,
            rom_bank_reg: 1,
            rom_offset: ROM_BANK_SIZE,
            ram_bank: 0,
            ram_offset: 0,
            ram_enabled: kind == MbcKind::RomOnly,
            mbc1_ram_mode: false,
            rtc: has_rtc.then(Rtc::new),
            rumble: false,
        };
        cart.update_rom_offset();
        Ok((cart, header))
    }

    pub fn rom_bank(&self) -> usize {
        self.rom_offset / ROM_BANK_SIZE
    }

    pub fn ram_bank(&self) -> u8 {
        self.ram_bank
    }

    pub fn ram_enabled(&self) -> bool {
        self.ram_enabled
    }

    pub fn ram_bank_count(&self) -> usize {
        self.ram.len().div_ceil(RAM_BANK_SIZE)
    }

    #[inline]
    pub fn read_rom_low(&self, addr: u16) -> u8 {
        self.rom[addr as usize]
    }

    #[inline]
    pub fn read_rom_high(&self, addr: u16) -> u8 {
        self.rom
            .get(self.rom_offset + (addr as usize - ROM_BANK_SIZE))
            .copied()
            .unwrap_or(0xFF)
    }

    /// Recompute the switchable-window offset. The window never exposes
    /// physical bank 0.
    fn update_rom_offset(&mut self) {
        let raw = match self.kind {
            MbcKind::RomOnly => 1,
            MbcKind::Mbc1 => {
                let reg = if self.mbc1_ram_mode {
                    self.rom_bank_reg & 0x1F
                } else {
                    self.rom_bank_reg & 0x7F
                };
                if reg & 0x1F == 0 { reg + 1 } else { reg }
            }
            MbcKind::Mbc2 => self.rom_bank_reg & 0x0F,
            MbcKind::Mbc3 => self.rom_bank_reg & 0x7F,
            MbcKind::Mbc5 => self.rom_bank_reg & 0x1FF,
        } as usize;
        let mut bank = raw % self.rom_banks;
        if bank == 0 {
            bank = 1;
        }
        self.rom_offset = bank * ROM_BANK_SIZE;
    }

    fn update_ram_offset(&mut self) {
        let banks = self.ram_bank_count().max(1);
        self.ram_offset = (self.ram_bank as usize % banks) * RAM_BANK_SIZE;
    }

    /// 0x0000-0x1FFF on MBC1/3/5.
    pub fn write_ram_enable(&mut self, val: u8) {
        self.ram_enabled = val & 0x0F == 0x0A;
    }

    /// 0x2000-0x3FFF on MBC1/3, 0x2000-0x2FFF on MBC5.
    pub fn write_rom_bank_low(&mut self, val: u8) {
        self.rom_bank_reg = match self.kind {
            MbcKind::Mbc1 => (self.rom_bank_reg & 0x60) | (val & 0x1F) as u16,
            MbcKind::Mbc5 => (self.rom_bank_reg & 0x100) | val as u16,
            _ => (val & 0x7F) as u16,
        };
        self.update_rom_offset();
    }

    /// 0x3000-0x3FFF on MBC5: ninth bank bit.
    pub fn write_rom_bank_high(&mut self, val: u8) {
        self.rom_bank_reg = (self.rom_bank_reg & 0xFF) | (((val & 0x01) as u16) << 8);
        self.update_rom_offset();
    }

    /// 0x0000-0x3FFF on MBC2: address bit 8 picks RAM enable or ROM bank.
    pub fn write_mbc2_control(&mut self, addr: u16, val: u8) {
        if addr & 0x0100 == 0 {
            self.write_ram_enable(val);
        } else {
            self.rom_bank_reg = (val & 0x0F) as u16;
            self.update_rom_offset();
        }
    }

    /// 0x4000-0x5FFF.
    pub fn write_ram_bank(&mut self, val: u8) {
        match self.kind {
            MbcKind::Mbc1 => {
                if self.mbc1_ram_mode {
                    self.ram_bank = val & 0x03;
                    self.update_ram_offset();
                } else {
                    self.rom_bank_reg = (self.rom_bank_reg & 0x1F) | (((val & 0x03) as u16) << 5);
                    self.update_rom_offset();
                }
            }
            MbcKind::Mbc3 => {
                // 0x08-0x0C select RTC registers; keep the raw value.
                self.ram_bank = val & 0x0F;
                if self.ram_bank < 0x08 {
                    self.update_ram_offset();
                }
            }
            MbcKind::Mbc5 => {
                if self.has_rumble {
                    self.rumble = val & 0x08 != 0;
                    self.ram_bank = val & 0x07;
                } else {
                    self.ram_bank = val & 0x0F;
                }
                self.update_ram_offset();
            }
            MbcKind::RomOnly | MbcKind::Mbc2 => {}
        }
    }

    /// 0x6000-0x7FFF on MBC1.
    pub fn write_mbc1_mode(&mut self, val: u8) {
        self.mbc1_ram_mode = val & 0x01 != 0;
        if !self.mbc1_ram_mode {
            self.ram_bank = 0;
            self.update_ram_offset();
        }
        self.update_rom_offset();
    }

    /// 0x6000-0x7FFF on MBC3.
    pub fn write_rtc_latch(&mut self, val: u8) {
        if let Some(rtc) = self.rtc.as_mut() {
            rtc.write_latch(val);
        }
    }

    /// 0xA000-0xBFFF for controllers with plain banked RAM.
    pub fn read_ram(&self, addr: u16) -> u8 {
        if !self.ram_enabled {
            return 0xFF;
        }
        self.ram
            .get(self.ram_offset + (addr as usize - 0xA000))
            .copied()
            .unwrap_or(0xFF)
    }

    pub fn write_ram(&mut self, addr: u16, val: u8) {
        if !self.ram_enabled {
            return;
        }
        let offset = self.ram_offset + (addr as usize - 0xA000);
        if let Some(byte) = self.ram.get_mut(offset) {
            *byte = val;
        }
    }

    /// MBC2 built-in RAM: 512 nibbles mirrored across the window.
    pub fn read_mbc2_ram(&self, addr: u16) -> u8 {
        if !self.ram_enabled || self.ram.is_empty() {
            return 0xFF;
        }
        0xF0 | (self.ram[(addr as usize - 0xA000) % MBC2_RAM_SIZE] & 0x0F)
    }

    pub fn write_mbc2_ram(&mut self, addr: u16, val: u8) {
        if !self.ram_enabled || self.ram.is_empty() {
            return;
        }
        self.ram[(addr as usize - 0xA000) % MBC2_RAM_SIZE] = val & 0x0F;
    }

    /// MBC3: RAM banks 0-7, RTC registers at "banks" 0x08-0x0C.
    pub fn read_mbc3_ram(&self, addr: u16) -> u8 {
        if !self.ram_enabled {
            return 0xFF;
        }
        match (self.ram_bank, self.rtc.as_ref()) {
            (0x08..=0x0C, Some(rtc)) => rtc.read(self.ram_bank),
            (0x08..=0x0F, _) => 0xFF,
            _ => self.read_ram(addr),
        }
    }

    pub fn write_mbc3_ram(&mut self, addr: u16, val: u8) {
        if !self.ram_enabled {
            return;
        }
        match self.ram_bank {
            0x08..=0x0C => {
                let reg = self.ram_bank;
                if let Some(rtc) = self.rtc.as_mut() {
                    rtc.write(reg, val);
                }
            }
            0x0D..=0x0F => {}
            _ => self.write_ram(addr, val),
        }
    }

    /// Advance the cartridge clock by base-clock cycles.
    pub fn step_rtc(&mut self, cycles: u32) {
        if let Some(rtc) = self.rtc.as_mut() {
            rtc.step(cycles as u64);
        }
    }

    /// Battery RAM to persist, if the cartridge keeps any.
    pub fn sram(&self) -> Option<&[u8]> {
        (self.has_battery && !self.ram.is_empty()).then_some(self.ram.as_slice())
    }

    /// Restore battery RAM. Shorter blobs fill a prefix; extra bytes are
    /// ignored.
    pub fn load_sram(&mut self, data: &[u8]) {
        let len = data.len().min(self.ram.len());
        self.ram[..len].copy_from_slice(&data[..len]);
    }

    pub fn rtc_blob(&self, now: u64) -> Option<Vec<u8>> {
        self.rtc.as_ref().map(|rtc| rtc.to_blob(now))
    }

    pub fn load_rtc(&mut self, data: &[u8], now: u64) -> bool {
        match self.rtc.as_mut() {
            Some(rtc) => rtc.load_blob(data, now),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with_type(cart_type: u8, banks: usize) -> Vec<u8> {
        let mut rom = vec![0u8; banks * ROM_BANK_SIZE];
        for bank in 0..banks {
            rom[bank * ROM_BANK_SIZE] = bank as u8;
        }
        rom[0x134..0x138].copy_from_slice(b"TEST");
        rom[0x147] = cart_type;
        rom[0x149] = 0x03;
        rom
    }

    #[test]
    fn small_rom_is_rejected() {
        let err = Cartridge::load(vec![0; 0x3FFF]).err();
        assert!(matches!(err, Some(CoreError::RomTooSmall { len: 0x3FFF })));
    }

    #[test]
    fn mbc5_bank_zero_maps_to_one() {
        let (mut cart, _) = Cartridge::load(rom_with_type(0x19, 4)).unwrap();
        cart.write_rom_bank_low(0);
        assert_eq!(cart.rom_bank(), 1);
        cart.write_rom_bank_low(3);
        assert_eq!(cart.read_rom_high(0x4000), 3);
    }

    #[test]
    fn mbc1_ram_mode_selects_ram_bank() {
        let (mut cart, _) = Cartridge::load(rom_with_type(0x03, 4)).unwrap();
        cart.write_ram_enable(0x0A);
        cart.write_mbc1_mode(1);
        cart.write_ram_bank(2);
        cart.write_ram(0xA000, 0x5A);
        assert_eq!(cart.ram[2 * RAM_BANK_SIZE], 0x5A);
        cart.write_mbc1_mode(0);
        assert_eq!(cart.read_ram(0xA000), 0x00, "mode 0 maps RAM bank 0");
    }

    #[test]
    fn mbc2_uses_address_bit_eight() {
        let (mut cart, _) = Cartridge::load(rom_with_type(0x06, 8)).unwrap();
        cart.write_mbc2_control(0x0000, 0x0A);
        assert!(cart.ram_enabled());
        cart.write_mbc2_control(0x2100, 0x05);
        assert_eq!(cart.rom_bank(), 5);
        cart.write_mbc2_ram(0xA203, 0xAB);
        assert_eq!(cart.read_mbc2_ram(0xA003), 0xFB, "nibble RAM mirrors every 512 bytes");
    }
}
