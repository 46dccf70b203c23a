use serde::{Deserialize, Serialize};

use crate::gameboy::GameBoy;

const OAM_DMA_LEN: u16 = 0xA0;
const VRAM_DMA_BLOCK: u16 = 0x10;

/// OAM DMA source latch and the GBC VRAM DMA engine (FF51-FF55).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dma {
    pub oam_source: u8,
    source: u16,
    dest: u16,
    /// FF55 as read back: remaining blocks minus one while running,
    /// bit 7 set once stopped, 0xFF when finished.
    control: u8,
    hblank_active: bool,
    /// CPU cycles the running instruction is stalled by VRAM DMA.
    pub(crate) stall: u32,
}

impl Dma {
    pub fn new() -> Self {
        Self {
            oam_source: 0xFF,
            source: 0,
            dest: 0x8000,
            control: 0xFF,
            hblank_active: false,
            stall: 0,
        }
    }

    pub fn hblank_active(&self) -> bool {
        self.hblank_active
    }

    pub fn read_control(&self) -> u8 {
        self.control
    }

    /// FF51-FF54.
    pub fn write_address(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF51 => self.source = (self.source & 0x00FF) | (val as u16) << 8,
            0xFF52 => self.source = (self.source & 0xFF00) | (val & 0xF0) as u16,
            0xFF53 => self.dest = (self.dest & 0x00FF) | ((val & 0x1F) as u16) << 8,
            0xFF54 => self.dest = (self.dest & 0xFF00) | (val & 0xF0) as u16,
            _ => {}
        }
    }

    fn vram_dest(&self) -> u16 {
        0x8000 | (self.dest & 0x1FFF)
    }
}

impl Default for Dma {
    fn default() -> Self {
        Self::new()
    }
}

impl GameBoy {
    /// FF46: copy 160 bytes into OAM through the normal read handlers.
    pub(crate) fn oam_dma(&mut self, val: u8) {
        self.dma.oam_source = val;
        let mut source = (val as u16) << 8;
        if source >= 0xE000 {
            source -= 0x2000;
        }
        let mut block = [0u8; OAM_DMA_LEN as usize];
        for (offset, byte) in block.iter_mut().enumerate() {
            *byte = self.read(source + offset as u16);
        }
        self.ppu.load_oam(&block);
    }

    /// FF55 write: start a general or h-blank transfer, or stop one.
    pub(crate) fn hdma_control(&mut self, val: u8) {
        if self.dma.hblank_active {
            if val & 0x80 == 0 {
                self.dma.hblank_active = false;
                self.dma.control |= 0x80;
            } else {
                self.dma.control = val & 0x7F;
            }
            return;
        }

        if val & 0x80 == 0 {
            let blocks = (val & 0x7F) as u32 + 1;
            for _ in 0..blocks {
                self.vram_dma_block();
            }
            self.dma.control = 0xFF;
            self.dma.stall += 4 + ((blocks * 32) << self.double_speed as u32);
        } else {
            self.dma.hblank_active = true;
            self.dma.control = val & 0x7F;
            if !self.ppu.lcd_on() {
                self.hdma_hblank();
            }
        }
    }

    /// One h-blank period's worth of transfer.
    pub(crate) fn hdma_hblank(&mut self) {
        if !self.dma.hblank_active {
            return;
        }
        self.vram_dma_block();
        self.dma.stall += 4 + (32 << self.double_speed as u32);
        if self.dma.control == 0 {
            self.dma.hblank_active = false;
            self.dma.control = 0xFF;
        } else {
            self.dma.control -= 1;
        }
    }

    fn vram_dma_block(&mut self) {
        for _ in 0..VRAM_DMA_BLOCK {
            let source = self.dma.source;
            let byte = match source {
                0x8000..=0x9FFF => 0xFF,
                _ => self.read(source),
            };
            let dest = self.dma.vram_dest();
            self.ppu.write_vram(dest, byte);
            self.dma.source = source.wrapping_add(1);
            self.dma.dest = self.dma.dest.wrapping_add(1);
        }
    }
}
