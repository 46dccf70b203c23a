//! Pixel Processing Unit.
//!
//! The STAT mode machine advances with the shared clock; pixels are produced
//! lazily by [`render`](self::render) whenever render-affecting state is
//! about to change, and in bulk when v-blank starts.

mod render;
mod tile_cache;

use serde::{Deserialize, Serialize};

use crate::interrupt::{Interrupt, Interrupts};

pub use render::{BgPath, RenderPaths, SpritePath, WindowPath};
pub use tile_cache::TileCache;

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

pub const LINE_CYCLES: u32 = 456;
pub const MODE2_END: u32 = 80;
pub const MODE3_BASE_END: u32 = 252;
const LINES_PER_FRAME: u8 = 154;
const LY_RESET_CYCLE: u32 = 8;
const FRAME_CYCLES: u32 = LINE_CYCLES * LINES_PER_FRAME as u32;
/// Blank frames still delivered after the LCD is switched off.
const BLANK_GRACE_FRAMES: u8 = 2;

/// Frame-buffer flag: background/window colour index is not 0.
pub const OPAQUE: u32 = 0x100_0000;
/// Frame-buffer flag: GBC tile attribute gives the background priority.
pub const PRIORITY: u32 = 0x200_0000;

pub const MODE_HBLANK: u8 = 0;
pub const MODE_VBLANK: u8 = 1;
pub const MODE_OAM: u8 = 2;
pub const MODE_TRANSFER: u8 = 3;

const PAL_INDEX_MASK: u8 = 0x3F;
const PAL_AUTO_INCREMENT: u8 = 0x80;

const DMG_SHADES: [u32; 4] = [0xEFFFDE, 0xADD794, 0x529273, 0x183442];
const COMPAT_BG: [u16; 4] = [0x7FFF, 0x1BEF, 0x6180, 0x0000];
const COMPAT_OBJ: [u16; 4] = [0x7FFF, 0x421F, 0x1CF2, 0x0000];

/// Mode-machine boundary crossed by a call to [`Ppu::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpuEvent {
    None,
    HBlank,
    VBlank,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ppu {
    cgb: bool,
    pub vram: Vec<u8>,
    pub vram_bank: u8,
    pub oam: Vec<u8>,

    pub lcdc: u8,
    /// STAT interrupt enables (bits 3-6).
    stat: u8,
    pub scy: u8,
    pub scx: u8,
    ly: u8,
    pub lyc: u8,
    pub bgp: u8,
    pub obp0: u8,
    pub obp1: u8,
    pub wy: u8,
    pub wx: u8,
    opri: u8,
    bgpi: u8,
    obpi: u8,
    bg_palette_ram: Vec<u8>,
    obj_palette_ram: Vec<u8>,

    mode: u8,
    /// Scanline being timed, 0-153. LY diverges from it on line 153.
    line: u8,
    line_cycles: u32,
    mode3_end: u32,
    lyc_match: bool,
    stat_line: bool,
    off_cycles: u32,
    blank_frames: u8,

    paths: RenderPaths,
    bg_colors: Vec<u32>,
    obj_colors: Vec<u32>,
    dmg_bg: [u32; 4],
    dmg_obj: [[u32; 4]; 2],
    frame: Vec<u32>,
    render_line: u8,
    render_x: u8,
    window_line: u8,
    window_used: bool,

    output: Vec<u8>,
    frame_ready: bool,
    frames: u64,

    #[serde(skip)]
    tiles: TileCache,
}

pub(crate) fn decode_cgb_color(lo: u8, hi: u8) -> u32 {
    let raw = u16::from_le_bytes([lo, hi]);
    let expand = |v: u16| {
        let v = (v & 0x1F) as u32;
        v << 3 | v >> 2
    };
    expand(raw) << 16 | expand(raw >> 5) << 8 | expand(raw >> 10)
}

impl Ppu {
    pub fn new(cgb: bool, colorize: bool) -> Self {
        let mut ppu = Self {
            cgb,
            vram: vec![0; 0x4000],
            vram_bank: 0,
            oam: vec![0; 0xA0],
            lcdc: 0,
            stat: 0,
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            bgp: 0xFC,
            obp0: 0xFF,
            obp1: 0xFF,
            wy: 0,
            wx: 0,
            opri: if cgb { 0 } else { 1 },
            bgpi: 0,
            obpi: 0,
            bg_palette_ram: vec![0xFF; 0x40],
            obj_palette_ram: vec![0xFF; 0x40],
            mode: MODE_HBLANK,
            line: 0,
            line_cycles: 0,
            mode3_end: MODE3_BASE_END,
            lyc_match: false,
            stat_line: false,
            off_cycles: 0,
            blank_frames: 0,
            paths: RenderPaths::select(0, cgb),
            bg_colors: vec![0xFFFFFF; 32],
            obj_colors: vec![0xFFFFFF; 32],
            dmg_bg: DMG_SHADES,
            dmg_obj: [DMG_SHADES; 2],
            frame: vec![0xFFFFFF; SCREEN_WIDTH * SCREEN_HEIGHT],
            render_line: 0,
            render_x: 0,
            window_line: 0,
            window_used: false,
            output: vec![0xFF; SCREEN_WIDTH * SCREEN_HEIGHT * 3],
            frame_ready: false,
            frames: 0,
            tiles: TileCache::new(),
        };
        if colorize && !cgb {
            ppu.colorize_with(COMPAT_BG, COMPAT_OBJ, COMPAT_OBJ);
        }
        ppu
    }

    /// State left by the boot ROM: LCD on, BG enabled, line 0.
    pub fn apply_post_boot(&mut self, irq: &mut Interrupts) {
        self.bgp = 0xFC;
        self.write_lcdc(0x91, irq);
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb
    }

    pub fn lcd_on(&self) -> bool {
        self.lcdc & 0x80 != 0
    }

    pub fn mode(&self) -> u8 {
        self.mode
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    pub fn line(&self) -> u8 {
        self.line
    }

    pub fn line_cycles(&self) -> u32 {
        self.line_cycles
    }

    pub fn window_line_counter(&self) -> u8 {
        self.window_line
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn render_paths(&self) -> RenderPaths {
        self.paths
    }

    /// Flag-tagged frame buffer (see [`OPAQUE`], [`PRIORITY`]).
    pub fn framebuffer(&self) -> &[u32] {
        &self.frame
    }

    /// Last delivered frame as packed RGB bytes.
    pub fn frame_rgb(&self) -> &[u8] {
        &self.output
    }

    pub fn take_frame_ready(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }

    pub fn vram_blocked(&self) -> bool {
        self.lcd_on() && self.mode == MODE_TRANSFER
    }

    pub fn oam_blocked(&self) -> bool {
        self.lcd_on() && (self.mode == MODE_OAM || self.mode == MODE_TRANSFER)
    }

    /// Replace the DMG shades with GBC-style colours.
    fn colorize_with(&mut self, bg: [u16; 4], obj0: [u16; 4], obj1: [u16; 4]) {
        let decode = |pal: [u16; 4]| pal.map(|c| decode_cgb_color(c as u8, (c >> 8) as u8));
        self.dmg_bg = decode(bg);
        self.dmg_obj = [decode(obj0), decode(obj1)];
    }

    /// Drop out of GBC mode after a GBC boot ROM ran a DMG cartridge,
    /// keeping the palettes it programmed as the colorization.
    pub fn enter_dmg_compat(&mut self) {
        self.catch_up();
        self.cgb = false;
        self.opri = 1;
        self.dmg_bg.copy_from_slice(&self.bg_colors[0..4]);
        self.dmg_obj[0].copy_from_slice(&self.obj_colors[0..4]);
        self.dmg_obj[1].copy_from_slice(&self.obj_colors[4..8]);
        self.paths = RenderPaths::select(self.lcdc, self.cgb);
    }

    /// Rebuild derived caches after a restore.
    pub fn rebuild_caches(&mut self) {
        self.tiles.rebuild(&self.vram);
    }

    pub fn read_vram(&self, addr: u16) -> u8 {
        self.vram[self.vram_bank as usize * 0x2000 + (addr as usize & 0x1FFF)]
    }

    /// Store a VRAM byte and refresh the tile cache row it belongs to.
    pub fn write_vram(&mut self, addr: u16, val: u8) {
        self.catch_up();
        let bank = self.vram_bank as usize;
        let offset = addr as usize & 0x1FFF;
        let index = bank * 0x2000 + offset;
        if self.vram[index] == val {
            return;
        }
        self.vram[index] = val;
        if offset < 0x1800 {
            let tile = offset >> 4;
            let row = (offset & 0x0F) >> 1;
            let base = bank * 0x2000 + tile * 16 + row * 2;
            self.tiles
                .update_row(bank, tile, row, self.vram[base], self.vram[base + 1]);
        }
    }

    pub fn write_oam(&mut self, index: usize, val: u8) {
        self.catch_up();
        self.oam[index] = val;
    }

    /// OAM DMA target.
    pub fn load_oam(&mut self, data: &[u8]) {
        self.catch_up();
        let len = data.len().min(self.oam.len());
        self.oam[..len].copy_from_slice(&data[..len]);
    }

    pub fn read_stat(&self) -> u8 {
        let mode = if self.lcd_on() { self.mode } else { 0 };
        0x80 | (self.stat & 0x78) | (self.lyc_match as u8) << 2 | mode
    }

    pub fn write_stat(&mut self, val: u8) {
        self.stat = val & 0x78;
    }

    pub fn write_lcdc(&mut self, val: u8, irq: &mut Interrupts) {
        self.catch_up();
        let was_on = self.lcd_on();
        self.lcdc = val;
        let on = self.lcd_on();
        if was_on && !on {
            ppu_trace!("lcd off at line {} cycle {}", self.line, self.line_cycles);
            self.mode = MODE_HBLANK;
            self.line = 0;
            self.ly = 0;
            self.line_cycles = 0;
            self.off_cycles = 0;
            self.blank_frames = 0;
            self.stat_line = false;
        } else if !was_on && on {
            ppu_trace!("lcd on");
            self.line = 0;
            self.line_cycles = 0;
            self.mode = MODE_OAM;
            self.start_frame();
            self.set_ly(0, irq);
        }
        self.paths = RenderPaths::select(self.lcdc, self.cgb);
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            0xFF42 => self.scy,
            0xFF43 => self.scx,
            0xFF44 => self.ly,
            0xFF45 => self.lyc,
            0xFF47 => self.bgp,
            0xFF48 => self.obp0,
            0xFF49 => self.obp1,
            0xFF4A => self.wy,
            0xFF4B => self.wx,
            0xFF68 => self.bgpi | 0x40,
            0xFF69 => {
                if self.vram_blocked() {
                    0xFF
                } else {
                    self.bg_palette_ram[(self.bgpi & PAL_INDEX_MASK) as usize]
                }
            }
            0xFF6A => self.obpi | 0x40,
            0xFF6B => {
                if self.vram_blocked() {
                    0xFF
                } else {
                    self.obj_palette_ram[(self.obpi & PAL_INDEX_MASK) as usize]
                }
            }
            0xFF6C => self.opri | 0xFE,
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8, irq: &mut Interrupts) {
        self.catch_up();
        match addr {
            0xFF42 => self.scy = val,
            0xFF43 => self.scx = val,
            0xFF45 => {
                self.lyc = val;
                if self.lcd_on() {
                    self.lyc_match = self.ly == self.lyc;
                    self.update_stat_irq(irq);
                }
            }
            0xFF47 => self.bgp = val,
            0xFF48 => self.obp0 = val,
            0xFF49 => self.obp1 = val,
            0xFF4A => self.wy = val,
            0xFF4B => self.wx = val,
            0xFF68 => self.bgpi = val & (PAL_AUTO_INCREMENT | PAL_INDEX_MASK),
            0xFF69 => {
                let index = self.bgpi & PAL_INDEX_MASK;
                if !self.vram_blocked() {
                    self.bg_palette_ram[index as usize] = val;
                    Self::refresh_color(&self.bg_palette_ram, &mut self.bg_colors, index);
                }
                Self::step_palette_index(&mut self.bgpi);
            }
            0xFF6A => self.obpi = val & (PAL_AUTO_INCREMENT | PAL_INDEX_MASK),
            0xFF6B => {
                let index = self.obpi & PAL_INDEX_MASK;
                if !self.vram_blocked() {
                    self.obj_palette_ram[index as usize] = val;
                    Self::refresh_color(&self.obj_palette_ram, &mut self.obj_colors, index);
                }
                Self::step_palette_index(&mut self.obpi);
            }
            0xFF6C => self.opri = val & 0x01,
            _ => {}
        }
    }

    fn refresh_color(ram: &[u8], colors: &mut [u32], index: u8) {
        let entry = (index >> 1) as usize;
        colors[entry] = decode_cgb_color(ram[entry * 2], ram[entry * 2 + 1]);
    }

    fn step_palette_index(index: &mut u8) {
        if *index & PAL_AUTO_INCREMENT != 0 {
            *index = PAL_AUTO_INCREMENT | (index.wrapping_add(1) & PAL_INDEX_MASK);
        }
    }

    fn set_ly(&mut self, ly: u8, irq: &mut Interrupts) {
        self.ly = ly;
        self.lyc_match = ly == self.lyc;
        self.update_stat_irq(irq);
    }

    /// Request LCD STAT on a rising edge of the combined STAT line.
    fn update_stat_irq(&mut self, irq: &mut Interrupts) {
        let line = self.lcd_on()
            && ((self.stat & 0x40 != 0 && self.lyc_match)
                || (self.stat & 0x08 != 0 && self.mode == MODE_HBLANK)
                || (self.stat & 0x10 != 0 && self.mode == MODE_VBLANK)
                || (self.stat & 0x20 != 0 && self.mode == MODE_OAM));
        if line && !self.stat_line {
            irq.request(Interrupt::LcdStat);
        }
        self.stat_line = line;
    }

    fn start_frame(&mut self) {
        self.render_line = 0;
        self.render_x = 0;
        self.window_line = 0;
        self.window_used = false;
    }

    /// Sprites overlapping `line` extend mode 3.
    fn mode3_length_for(&self, line: u8) -> u32 {
        let sprites = if self.lcdc & 0x02 != 0 {
            self.count_line_sprites(line)
        } else {
            0
        };
        MODE3_BASE_END + sprites as u32 * 6 + (self.scx & 0x07) as u32
    }

    /// Base-clock cycles until the mode machine next changes state.
    pub fn dots_to_boundary(&self) -> u32 {
        if !self.lcd_on() {
            return FRAME_CYCLES - self.off_cycles;
        }
        let boundary = if (self.line as usize) < SCREEN_HEIGHT {
            match self.mode {
                MODE_OAM => MODE2_END,
                MODE_TRANSFER => self.mode3_end,
                _ => LINE_CYCLES,
            }
        } else if self.line == LINES_PER_FRAME - 1 && self.ly != 0 {
            LY_RESET_CYCLE
        } else {
            LINE_CYCLES
        };
        boundary - self.line_cycles
    }

    /// Base-clock cycles until an enabled PPU interrupt could next be
    /// requested. STAT sources only change at mode boundaries, so the next
    /// boundary is exact for them.
    pub fn dots_until_interrupt(&self, enabled: u8) -> Option<u32> {
        if !self.lcd_on() {
            return None;
        }
        let mut best = None;
        if enabled & Interrupt::VBlank.mask() != 0 {
            let line = self.line as u32;
            let lines = if line < SCREEN_HEIGHT as u32 {
                SCREEN_HEIGHT as u32 - line
            } else {
                LINES_PER_FRAME as u32 - line + SCREEN_HEIGHT as u32
            };
            best = Some(lines * LINE_CYCLES - self.line_cycles);
        }
        if enabled & Interrupt::LcdStat.mask() != 0 && self.stat & 0x78 != 0 {
            let next = self.dots_to_boundary();
            best = Some(best.map_or(next, |b: u32| b.min(next)));
        }
        best
    }

    /// Advance the mode machine. `dots` must not exceed
    /// [`dots_to_boundary`](Self::dots_to_boundary).
    pub fn step(&mut self, dots: u32, irq: &mut Interrupts) -> PpuEvent {
        if !self.lcd_on() {
            self.off_cycles += dots;
            if self.off_cycles >= FRAME_CYCLES {
                self.off_cycles -= FRAME_CYCLES;
                if self.blank_frames < BLANK_GRACE_FRAMES {
                    self.blank_frames += 1;
                    self.deliver_blank();
                }
            }
            return PpuEvent::None;
        }

        let remaining = self.dots_to_boundary();
        self.line_cycles += dots;
        if dots < remaining {
            return PpuEvent::None;
        }

        let event = if (self.line as usize) < SCREEN_HEIGHT {
            self.visible_transition(irq)
        } else {
            self.vblank_transition(irq);
            PpuEvent::None
        };
        self.update_stat_irq(irq);
        event
    }

    fn visible_transition(&mut self, irq: &mut Interrupts) -> PpuEvent {
        match self.mode {
            MODE_OAM => {
                self.mode = MODE_TRANSFER;
                self.mode3_end = self.mode3_length_for(self.line);
                PpuEvent::None
            }
            MODE_TRANSFER => {
                self.mode = MODE_HBLANK;
                PpuEvent::HBlank
            }
            _ => {
                self.line_cycles -= LINE_CYCLES;
                self.line += 1;
                if self.line as usize == SCREEN_HEIGHT {
                    self.mode = MODE_VBLANK;
                    irq.request(Interrupt::VBlank);
                    self.set_ly(self.line, irq);
                    self.deliver_frame();
                    PpuEvent::VBlank
                } else {
                    self.mode = MODE_OAM;
                    self.set_ly(self.line, irq);
                    PpuEvent::None
                }
            }
        }
    }

    fn vblank_transition(&mut self, irq: &mut Interrupts) {
        if self.line == LINES_PER_FRAME - 1 && self.ly != 0 && self.line_cycles == LY_RESET_CYCLE {
            self.set_ly(0, irq);
            return;
        }
        self.line_cycles -= LINE_CYCLES;
        self.line += 1;
        if self.line == LINES_PER_FRAME {
            self.line = 0;
            self.mode = MODE_OAM;
            self.start_frame();
        }
        ppu_trace!("line {} mode {}", self.line, self.mode);
        self.set_ly(self.line, irq);
    }

    fn deliver_frame(&mut self) {
        self.catch_up();
        for (pixel, rgb) in self.frame.iter().zip(self.output.chunks_exact_mut(3)) {
            rgb[0] = (pixel >> 16) as u8;
            rgb[1] = (pixel >> 8) as u8;
            rgb[2] = *pixel as u8;
        }
        self.frame_ready = true;
        self.frames += 1;
    }

    fn deliver_blank(&mut self) {
        let color = self.blank_color();
        self.frame.fill(color);
        self.deliver_frame();
    }

    fn blank_color(&self) -> u32 {
        if self.cgb { 0xFFFFFF } else { self.dmg_bg[0] }
    }
}
