//! Lazy scanline composition.
//!
//! The renderer trails the mode machine. `catch_up` draws every pixel the
//! beam has passed since the previous call, so state changes only ever
//! affect pixels not yet drawn.

use serde::{Deserialize, Serialize};

use super::tile_cache::FLIP_X;
use super::{
    MODE_HBLANK, MODE_OAM, MODE_TRANSFER, MODE_VBLANK, MODE2_END, OPAQUE, PRIORITY, Ppu,
    SCREEN_HEIGHT, SCREEN_WIDTH,
};

const MAX_SPRITES_PER_LINE: usize = 10;
const BG_MAP_LOW: usize = 0x1800;
const BG_MAP_HIGH: usize = 0x1C00;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BgPath {
    /// DMG with LCDC bit 0 clear: background and window are blank.
    Blank,
    Dmg,
    Cgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowPath {
    Off,
    Dmg,
    Cgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpritePath {
    Off,
    Dmg { tall: bool },
    Cgb { tall: bool },
}

/// Layer renderers chosen from LCDC and the hardware mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderPaths {
    pub bg: BgPath,
    pub window: WindowPath,
    pub sprites: SpritePath,
}

impl RenderPaths {
    pub fn select(lcdc: u8, cgb: bool) -> Self {
        let bg_enabled = cgb || lcdc & 0x01 != 0;
        let bg = match (cgb, bg_enabled) {
            (true, _) => BgPath::Cgb,
            (false, true) => BgPath::Dmg,
            (false, false) => BgPath::Blank,
        };
        let window = match (lcdc & 0x20 != 0 && bg_enabled, cgb) {
            (false, _) => WindowPath::Off,
            (true, false) => WindowPath::Dmg,
            (true, true) => WindowPath::Cgb,
        };
        let tall = lcdc & 0x04 != 0;
        let sprites = match (lcdc & 0x02 != 0, cgb) {
            (false, _) => SpritePath::Off,
            (true, false) => SpritePath::Dmg { tall },
            (true, true) => SpritePath::Cgb { tall },
        };
        Self {
            bg,
            window,
            sprites,
        }
    }
}

#[derive(Clone, Copy)]
struct LineSprite {
    x: i16,
    row: u8,
    tile: u8,
    flags: u8,
}

impl Ppu {
    /// Render everything the beam has already passed.
    pub(crate) fn catch_up(&mut self) {
        if !self.lcd_on() {
            return;
        }
        let (target_line, target_x) = match self.mode {
            MODE_VBLANK => (SCREEN_HEIGHT as u8, 0),
            _ if self.line as usize >= SCREEN_HEIGHT => (SCREEN_HEIGHT as u8, 0),
            MODE_OAM => (self.line, 0),
            MODE_TRANSFER => {
                let span = self.mode3_end.saturating_sub(MODE2_END).max(1);
                let done = self.line_cycles.saturating_sub(MODE2_END);
                let x = (done * SCREEN_WIDTH as u32 / span).min(SCREEN_WIDTH as u32);
                (self.line, x as u8)
            }
            MODE_HBLANK => (self.line, SCREEN_WIDTH as u8),
            _ => return,
        };

        while self.render_line < target_line {
            let line = self.render_line;
            let start = self.render_x as usize;
            if start < SCREEN_WIDTH {
                self.render_segment(line, start, SCREEN_WIDTH);
            }
            self.finish_line();
        }
        if self.render_line == target_line && target_x > self.render_x {
            let start = self.render_x as usize;
            self.render_segment(target_line, start, target_x as usize);
            self.render_x = target_x;
        }
    }

    fn finish_line(&mut self) {
        if self.window_used {
            self.window_line = self.window_line.wrapping_add(1);
            self.window_used = false;
        }
        self.render_line += 1;
        self.render_x = 0;
    }

    fn render_segment(&mut self, line: u8, x0: usize, x1: usize) {
        let row = line as usize * SCREEN_WIDTH;
        match self.paths.bg {
            BgPath::Blank => {
                let color = self.dmg_bg[0];
                self.frame[row + x0..row + x1].fill(color);
            }
            BgPath::Dmg | BgPath::Cgb => {
                let map = if self.lcdc & 0x08 != 0 { BG_MAP_HIGH } else { BG_MAP_LOW };
                let map_y = line.wrapping_add(self.scy);
                let scroll = self.scx as usize;
                self.draw_map_span(row, x0, x1, map, map_y, |x| (x + scroll) & 0xFF);
            }
        }

        if self.paths.window != WindowPath::Off && line >= self.wy && self.wx <= 166 {
            let origin = self.wx as isize - 7;
            let start = x0.max(origin.max(0) as usize);
            if start < x1 {
                let map = if self.lcdc & 0x40 != 0 { BG_MAP_HIGH } else { BG_MAP_LOW };
                let map_y = self.window_line;
                self.draw_map_span(row, start, x1, map, map_y, |x| {
                    (x as isize - origin) as usize
                });
                self.window_used = true;
            }
        }

        if self.paths.sprites != SpritePath::Off {
            self.draw_sprites(line, row, x0, x1);
        }
    }

    /// Draw `[x0, x1)` of one row from a tile map, fetching one tile's worth
    /// of cached pixels at a time.
    fn draw_map_span(
        &mut self,
        row: usize,
        x0: usize,
        x1: usize,
        map: usize,
        map_y: u8,
        map_x: impl Fn(usize) -> usize,
    ) {
        let cgb = self.paths.bg == BgPath::Cgb;
        let unsigned_tiles = self.lcdc & 0x10 != 0;
        let tile_row = (map_y as usize >> 3) * 32;
        let fine_y = (map_y & 7) as usize;

        let mut x = x0;
        while x < x1 {
            let mx = map_x(x);
            let fine_x = mx & 7;
            let map_index = map + tile_row + ((mx >> 3) & 31);
            let number = self.vram[map_index] as usize;
            let attrs = if cgb { self.vram[0x2000 + map_index] } else { 0 };
            let tile = if unsigned_tiles || number >= 128 {
                number
            } else {
                256 + number
            };
            let bank = ((attrs >> 3) & 1) as usize;
            let flip = ((attrs >> 5) & 0x03) as usize;
            let pixels = self.tiles.row(bank, tile, flip, fine_y);

            let count = (8 - fine_x).min(x1 - x);
            for (offset, &color) in pixels[fine_x..fine_x + count].iter().enumerate() {
                let mut value = if cgb {
                    self.bg_colors[(attrs & 0x07) as usize * 4 + color as usize]
                } else {
                    self.dmg_bg[((self.bgp >> (color * 2)) & 0x03) as usize]
                };
                if color != 0 {
                    value |= OPAQUE;
                    if attrs & 0x80 != 0 {
                        value |= PRIORITY;
                    }
                }
                self.frame[row + x + offset] = value;
            }
            x += count;
        }
    }

    pub(crate) fn count_line_sprites(&self, line: u8) -> usize {
        let height = if self.lcdc & 0x04 != 0 { 16 } else { 8 };
        self.oam
            .chunks_exact(4)
            .filter(|entry| {
                let top = entry[0] as i16 - 16;
                (top..top + height).contains(&(line as i16))
            })
            .take(MAX_SPRITES_PER_LINE)
            .count()
    }

    /// Up to ten sprites on `line`, highest priority first.
    fn line_sprites(&self, line: u8, tall: bool) -> Vec<LineSprite> {
        let height: i16 = if tall { 16 } else { 8 };
        let mut sprites: Vec<LineSprite> = self
            .oam
            .chunks_exact(4)
            .filter_map(|entry| {
                let top = entry[0] as i16 - 16;
                let offset = line as i16 - top;
                if !(0..height).contains(&offset) {
                    return None;
                }
                let flags = entry[3];
                let mut row = offset as u8;
                if flags & 0x40 != 0 {
                    row = height as u8 - 1 - row;
                }
                let mut tile = entry[2];
                if tall {
                    tile = (tile & 0xFE) + (row >> 3);
                }
                Some(LineSprite {
                    x: entry[1] as i16 - 8,
                    row: row & 7,
                    tile,
                    flags,
                })
            })
            .take(MAX_SPRITES_PER_LINE)
            .collect();
        if self.opri & 0x01 != 0 {
            // Stable: ties keep OAM order.
            sprites.sort_by_key(|sprite| sprite.x);
        }
        sprites
    }

    fn draw_sprites(&mut self, line: u8, row: usize, x0: usize, x1: usize) {
        let (tall, cgb) = match self.paths.sprites {
            SpritePath::Off => return,
            SpritePath::Dmg { tall } => (tall, false),
            SpritePath::Cgb { tall } => (tall, true),
        };
        let master_priority = !cgb || self.lcdc & 0x01 != 0;
        let mut taken = [false; SCREEN_WIDTH];

        for sprite in self.line_sprites(line, tall) {
            let left = sprite.x.max(x0 as i16);
            let right = (sprite.x + 8).min(x1 as i16);
            if left >= right {
                continue;
            }
            let bank = if cgb { ((sprite.flags >> 3) & 1) as usize } else { 0 };
            let flip = if sprite.flags & 0x20 != 0 { FLIP_X } else { 0 };
            let pixels = self
                .tiles
                .row(bank, sprite.tile as usize, flip, sprite.row as usize);
            for x in left..right {
                let screen_x = x as usize;
                let color = pixels[(x - sprite.x) as usize];
                if color == 0 || taken[screen_x] {
                    continue;
                }
                taken[screen_x] = true;

                let under = self.frame[row + screen_x];
                let visible = if !master_priority {
                    true
                } else if sprite.flags & 0x80 != 0 {
                    under < OPAQUE
                } else {
                    under < PRIORITY
                };
                if !visible {
                    continue;
                }
                self.frame[row + screen_x] = if cgb {
                    self.obj_colors[(sprite.flags & 0x07) as usize * 4 + color as usize]
                } else {
                    let (palette, shades) = if sprite.flags & 0x10 != 0 {
                        (self.obp1, &self.dmg_obj[1])
                    } else {
                        (self.obp0, &self.dmg_obj[0])
                    };
                    shades[((palette >> (color * 2)) & 0x03) as usize]
                };
            }
        }
    }
}
