//! Versioned save-state schema.
//!
//! A snapshot is one named-field record serialized as JSON. The ROM and the
//! boot ROM are never part of it; a snapshot only restores onto the
//! cartridge it was captured from.

use std::io;

use log::info;
use serde::{Deserialize, Serialize};

use crate::apu::Apu;
use crate::cartridge::Cartridge;
use crate::cpu::Cpu;
use crate::dma::Dma;
use crate::error::{CoreError, SaveStateError};
use crate::gameboy::{GameBoy, IterationClock};
use crate::interrupt::Interrupts;
use crate::joypad::Joypad;
use crate::memory::Memory;
use crate::ppu::Ppu;
use crate::serial::Serial;
use crate::storage::{SaveStore, freeze_key, next_free_slot};
use crate::timer::Timer;

/// Bumped whenever a field is added, removed or changes meaning.
pub const SAVE_STATE_VERSION: u32 = 1;

/// Slot name the frontend uses when saving on exit.
pub const AUTO_SLOT: &str = "auto";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartridgeIdentity {
    pub title: String,
    pub global_checksum: u16,
    pub rom_len: usize,
}

impl CartridgeIdentity {
    fn of(gb: &GameBoy) -> Self {
        Self {
            title: gb.header.title.clone(),
            global_checksum: gb.header.global_checksum,
            rom_len: gb.cartridge.rom.len(),
        }
    }
}

/// Everything needed to resume execution bit-for-bit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveState {
    pub version: u32,
    pub identity: CartridgeIdentity,
    pub cgb: bool,
    pub double_speed: bool,
    pub speed_switch_armed: bool,
    pub used_boot_rom: bool,
    pub cpu: Cpu,
    pub interrupts: Interrupts,
    pub memory: Memory,
    pub cartridge: Cartridge,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub serial: Serial,
    pub joypad: Joypad,
    pub dma: Dma,
    pub clock: IterationClock,
}

impl SaveState {
    pub fn capture(gb: &GameBoy) -> Self {
        let mut apu = gb.apu.clone();
        apu.drain_samples();
        Self {
            version: SAVE_STATE_VERSION,
            identity: CartridgeIdentity::of(gb),
            cgb: gb.cgb,
            double_speed: gb.double_speed,
            speed_switch_armed: gb.speed_switch_armed,
            used_boot_rom: gb.used_boot_rom,
            cpu: gb.cpu.clone(),
            interrupts: gb.interrupts.clone(),
            memory: gb.memory.clone(),
            cartridge: gb.cartridge.clone(),
            ppu: gb.ppu.clone(),
            apu,
            timer: gb.timer.clone(),
            serial: gb.serial.clone(),
            joypad: gb.joypad.clone(),
            dma: gb.dma.clone(),
            clock: gb.clock.clone(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SaveStateError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, SaveStateError> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Check the snapshot against the running machine without touching it.
    pub fn validate(&self, gb: &GameBoy) -> Result<(), SaveStateError> {
        if self.version != SAVE_STATE_VERSION {
            return Err(SaveStateError::Version {
                found: self.version,
                expected: SAVE_STATE_VERSION,
            });
        }
        let live = CartridgeIdentity::of(gb);
        if self.identity != live {
            return Err(SaveStateError::CartridgeMismatch {
                expected: live.title,
                found: self.identity.title.clone(),
            });
        }
        let buffers = [
            ("memory.flat", gb.memory.flat.len(), self.memory.flat.len()),
            ("memory.wram_banks", gb.memory.wram_banks.len(), self.memory.wram_banks.len()),
            ("cartridge.ram", gb.cartridge.ram.len(), self.cartridge.ram.len()),
            ("ppu.vram", gb.ppu.vram.len(), self.ppu.vram.len()),
            ("ppu.oam", gb.ppu.oam.len(), self.ppu.oam.len()),
        ];
        for (field, expected, found) in buffers {
            if expected != found {
                return Err(SaveStateError::Length {
                    field,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Replace the machine's state. Only call between iterations.
    pub fn restore(self, gb: &mut GameBoy) -> Result<(), SaveStateError> {
        self.validate(gb)?;
        let rom = std::mem::take(&mut gb.cartridge.rom);
        let boot_rom = std::mem::take(&mut gb.memory.boot_rom);
        let factor = gb.apu.output_factor();

        gb.cgb = self.cgb;
        gb.double_speed = self.double_speed;
        gb.speed_switch_armed = self.speed_switch_armed;
        gb.used_boot_rom = self.used_boot_rom;
        gb.cpu = self.cpu;
        gb.interrupts = self.interrupts;
        gb.memory = self.memory;
        gb.memory.boot_rom = boot_rom;
        gb.cartridge = self.cartridge;
        gb.cartridge.rom = rom;
        gb.ppu = self.ppu;
        gb.ppu.rebuild_caches();
        gb.apu = self.apu;
        gb.timer = self.timer;
        gb.serial = self.serial;
        gb.joypad = self.joypad;
        gb.dma = self.dma;
        gb.clock = self.clock;
        gb.fault = None;

        if let Some(audio) = gb.audio.as_mut() {
            // Keep the snapshot's partial sample unless the host rate differs.
            if !gb.apu.output_enabled() || gb.apu.output_factor() != factor {
                gb.apu.configure_output(factor);
            }
            audio.reset();
        }
        gb.rebuild_handlers();
        Ok(())
    }
}

impl GameBoy {
    /// Serialized snapshot of the whole machine.
    pub fn save_state(&self) -> Result<Vec<u8>, SaveStateError> {
        SaveState::capture(self).to_bytes()
    }

    /// Restore a snapshot from [`GameBoy::save_state`]. On error the running
    /// machine is left as it was.
    pub fn load_state(&mut self, data: &[u8]) -> Result<(), SaveStateError> {
        SaveState::from_bytes(data)?.restore(self)
    }

    /// Store a snapshot under `slot`, or the first free numbered slot.
    /// Returns the slot name used.
    pub fn store_state(&self, store: &mut dyn SaveStore, slot: Option<&str>) -> Result<String, CoreError> {
        let slot = match slot {
            Some(slot) => slot.to_owned(),
            None => next_free_slot(store, self.title()).to_string(),
        };
        let data = self.save_state()?;
        store.store(&freeze_key(self.title(), &slot), &data)?;
        info!("saved state to slot {slot}");
        Ok(slot)
    }

    /// Load the snapshot stored under `slot`.
    pub fn restore_state(&mut self, store: &dyn SaveStore, slot: &str) -> Result<(), CoreError> {
        let data = store.load(&freeze_key(self.title(), slot)).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no save state in slot {slot}"))
        })?;
        self.load_state(&data)?;
        info!("restored state from slot {slot}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gameboy::CoreConfig;
    use crate::storage::MemoryStore;

    fn rom(title: &[u8], fill: u8) -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        rom[0x100..0x104].copy_from_slice(&[0x00, 0xC3, 0x50, 0x01]);
        rom[0x134..0x134 + title.len()].copy_from_slice(title);
        // INC A; JR back to it.
        rom[0x150] = 0x3C;
        rom[0x151] = 0x18;
        rom[0x152] = 0xFD;
        rom[0x14E] = fill;
        rom
    }

    fn machine(title: &[u8], fill: u8) -> GameBoy {
        GameBoy::new(rom(title, fill), CoreConfig::default(), &MemoryStore::new()).unwrap()
    }

    #[test]
    fn version_is_checked_first() {
        let gb = machine(b"ONE", 0);
        let mut state = SaveState::capture(&gb);
        state.version = 99;
        state.identity.title = "OTHER".into();
        assert!(matches!(
            state.validate(&gb),
            Err(SaveStateError::Version { found: 99, .. })
        ));
    }

    #[test]
    fn other_cartridge_is_rejected() {
        let mut gb = machine(b"ONE", 0);
        let foreign = machine(b"ONE", 1).save_state().unwrap();
        let before = gb.cpu.pc;
        let err = gb.load_state(&foreign).unwrap_err();
        assert!(matches!(err, SaveStateError::CartridgeMismatch { .. }), "{err}");
        assert_eq!(gb.cpu.pc, before, "running state untouched");
    }

    #[test]
    fn buffer_length_mismatch_is_rejected() {
        let gb = machine(b"ONE", 0);
        let mut state = SaveState::capture(&gb);
        state.ppu.oam.pop();
        assert!(matches!(
            state.validate(&gb),
            Err(SaveStateError::Length { field: "ppu.oam", .. })
        ));
    }

    #[test]
    fn slots_fill_in_order() {
        let gb = machine(b"SLOTS", 0);
        let mut store = MemoryStore::new();
        assert_eq!(gb.store_state(&mut store, None).unwrap(), "0");
        assert_eq!(gb.store_state(&mut store, None).unwrap(), "1");
        assert_eq!(gb.store_state(&mut store, Some(AUTO_SLOT)).unwrap(), AUTO_SLOT);
        assert_eq!(store.len(), 3);
    }
}
