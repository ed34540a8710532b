//! K2GE display engine (0x8000-0xBFFF)
//!
//! # Registers (offsets from 0x8000)
//!
//! - `0x000`: bit 7 VBlank interrupt enable, bit 6 HBlank (TI0) enable
//! - `0x002-0x005`: window origin and size
//! - `0x006`: frame rate register
//! - `0x008/0x009`: raster position (read only)
//! - `0x010`: status, bit 6 set during VBlank
//! - `0x012`: bit 7 negative display, bits 2-0 outside-window colour
//! - `0x020/0x021`: sprite position offset
//! - `0x030`: bit 7 puts plane 2 in front of plane 1
//! - `0x032-0x035`: plane 1 and plane 2 scroll
//! - `0x100-0x118`: K1GE shade palettes and background select
//! - `0x200-0x3FF`: colour palettes (sprite, plane 1, plane 2, background, window)
//! - `0x7E0`: writing 0x52 resets the registers
//! - `0x7E2`: bit 7 selects K1GE monochrome mode
//!
//! # Memory
//!
//! - `0x800`: sprite table, 64 entries of tile, attribute, x, y
//! - `0xC00`: sprite colour palette codes
//! - `0x1000/0x1800`: 32x32 tile maps for planes 1 and 2
//! - `0x2000`: character RAM, 512 tiles
//!
//! # Timing
//!
//! A scanline lasts 515 CPU states and a frame 199 lines. Each visible line
//! is rendered into the back buffer when it ends, unless rendering is being
//! skipped. Reaching line 152 starts VBlank and publishes the back buffer.

use emu_core::graphics::ColorOps;
use emu_core::ppu::{Bgr444Palette, PackedTileDecoder, ShadePalette, TileDecoder, TILE_BYTES};
use emu_core::types::Frame;
use serde::{Deserialize, Serialize};

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 152;
pub const STATES_PER_LINE: u32 = 515;
pub const LINES_PER_FRAME: u32 = 199;
pub const VBLANK_LINE: u32 = SCREEN_HEIGHT as u32;

pub const VIDEO_BASE: u32 = 0x8000;
pub const VIDEO_SIZE: usize = 0x4000;

pub const REG_INT_CONTROL: usize = 0x000;
pub const REG_WINDOW_X: usize = 0x002;
pub const REG_WINDOW_Y: usize = 0x003;
pub const REG_WINDOW_W: usize = 0x004;
pub const REG_WINDOW_H: usize = 0x005;
pub const REG_FRAME_RATE: usize = 0x006;
const REG_RASTER_H: usize = 0x008;
const REG_RASTER_V: usize = 0x009;
const REG_STATUS: usize = 0x010;
const REG_DISPLAY_CONTROL: usize = 0x012;
const REG_SPRITE_OFFSET_H: usize = 0x020;
const REG_SPRITE_OFFSET_V: usize = 0x021;
const REG_PLANE_PRIORITY: usize = 0x030;
const REG_SCROLL1_H: usize = 0x032;
const REG_SCROLL2_H: usize = 0x034;
pub const REG_BACKGROUND: usize = 0x118;
const REG_RESET: usize = 0x7E0;
pub const REG_MODE: usize = 0x7E2;

const MONO_SPRITE: usize = 0x100;
const MONO_PLANE1: usize = 0x108;
const MONO_PLANE2: usize = 0x110;
const COLOR_SPRITE: usize = 0x200;
const COLOR_PLANE1: usize = 0x280;
const COLOR_PLANE2: usize = 0x300;
const COLOR_BACKGROUND: usize = 0x3E0;
const COLOR_WINDOW: usize = 0x3F0;

const SPRITE_TABLE: usize = 0x800;
const SPRITE_CODES: usize = 0xC00;
const PLANE1_MAP: usize = 0x1000;
const PLANE2_MAP: usize = 0x1800;
const CHARACTER_RAM: usize = 0x2000;

const STATUS_VBLANK: u8 = 0x40;
const RESET_KEY: u8 = 0x52;

/// What happened during a `tick`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoEvents {
    /// HBlank pulses delivered to timer 0's TI0 input
    pub hblanks: u32,
    /// VBlank started and the VBlank interrupt is enabled
    pub vblank_irq: bool,
    /// VBlank started
    pub vblank: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Sprite {
    tile: usize,
    attr: u8,
    x: u8,
    y: u8,
    code: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct K2ge {
    vram: Vec<u8>,
    line: u32,
    line_cycles: u32,
    back: Vec<u16>,
    front: Vec<u16>,
    frames: u64,
    #[serde(skip)]
    skip_render: bool,
}

impl K2ge {
    pub fn new() -> Self {
        let mut k2ge = Self {
            vram: vec![0; VIDEO_SIZE],
            line: 0,
            line_cycles: 0,
            back: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
            front: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
            frames: 0,
            skip_render: false,
        };
        k2ge.reset_registers();
        k2ge
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn reset_registers(&mut self) {
        self.vram[..0x400].fill(0);
        self.vram[REG_WINDOW_W] = SCREEN_WIDTH as u8;
        self.vram[REG_WINDOW_H] = SCREEN_HEIGHT as u8;
        self.vram[REG_FRAME_RATE] = 0xC6;
    }

    pub fn read(&self, offset: usize) -> u8 {
        match offset {
            REG_RASTER_H => ((self.line_cycles * 0xC6) / STATES_PER_LINE) as u8,
            REG_RASTER_V => self.line as u8,
            _ => self.vram.get(offset).copied().unwrap_or(0xFF),
        }
    }

    pub fn write(&mut self, offset: usize, val: u8) {
        match offset {
            REG_RASTER_H | REG_RASTER_V | REG_STATUS => {}
            REG_RESET => {
                if val == RESET_KEY {
                    self.reset_registers();
                }
            }
            REG_MODE => self.vram[REG_MODE] = val & 0x80,
            _ => {
                if let Some(cell) = self.vram.get_mut(offset) {
                    *cell = val;
                }
            }
        }
    }

    pub fn set_render_skip(&mut self, skip: bool) {
        self.skip_render = skip;
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// Completed frames since reset
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_color(&self) -> bool {
        self.vram[REG_MODE] & 0x80 == 0
    }

    fn vblank_irq_enabled(&self) -> bool {
        self.vram[REG_INT_CONTROL] & 0x80 != 0
    }

    fn hblank_enabled(&self) -> bool {
        self.vram[REG_INT_CONTROL] & 0x40 != 0
    }

    pub fn tick(&mut self, cycles: u32) -> VideoEvents {
        let mut events = VideoEvents::default();
        self.line_cycles += cycles;
        while self.line_cycles >= STATES_PER_LINE {
            self.line_cycles -= STATES_PER_LINE;
            self.end_line(&mut events);
        }
        events
    }

    fn end_line(&mut self, events: &mut VideoEvents) {
        if (self.line as usize) < SCREEN_HEIGHT && !self.skip_render {
            self.render_line(self.line as usize);
        }
        if self.hblank_enabled() {
            events.hblanks += 1;
        }

        self.line += 1;
        if self.line == VBLANK_LINE {
            self.vram[REG_STATUS] |= STATUS_VBLANK;
            self.frames += 1;
            if !self.skip_render {
                self.front.copy_from_slice(&self.back);
            }
            events.vblank = true;
            events.vblank_irq |= self.vblank_irq_enabled();
        } else if self.line >= LINES_PER_FRAME {
            self.line = 0;
            self.vram[REG_STATUS] &= !STATUS_VBLANK;
        }
    }

    /// Copy the last completed frame into `frame` as RGB565, darkened by
    /// `dark_filter` percent.
    pub fn paint(&self, frame: &mut Frame, dark_filter: u8) {
        let keep = 100 - dark_filter.min(100);
        for (dst, &src) in frame.pixels.iter_mut().zip(&self.front) {
            let rgb = ColorOps::from_bgr444(src);
            *dst = if keep == 100 { rgb } else { ColorOps::scale_brightness(rgb, keep) };
        }
    }

    /// Last completed frame as raw BGR444
    pub fn front_buffer(&self) -> &[u16] {
        &self.front
    }

    /// Buffer sizes and raster position are within hardware limits
    pub fn is_well_formed(&self) -> bool {
        self.vram.len() == VIDEO_SIZE
            && self.back.len() == SCREEN_WIDTH * SCREEN_HEIGHT
            && self.front.len() == SCREEN_WIDTH * SCREEN_HEIGHT
            && self.line < LINES_PER_FRAME
            && self.line_cycles < STATES_PER_LINE
    }

    fn palette_color(&self, color_base: usize, mono_base: usize, code: u8, mono_select: bool, index: u8) -> u16 {
        if self.is_color() {
            let raw = &self.vram[color_base..color_base + 0x80];
            Bgr444Palette::new(raw).raw_color(code as usize * 4 + index as usize)
        } else {
            let raw = &self.vram[mono_base..mono_base + 8];
            ShadePalette::new(raw).raw_color(if mono_select { 4 } else { 0 } + index as usize)
        }
    }

    fn background_color(&self) -> u16 {
        let select = self.vram[REG_BACKGROUND];
        if !self.is_color() {
            ShadePalette::shade_to_bgr444(0)
        } else if select & 0xC0 == 0x80 {
            Bgr444Palette::new(&self.vram[COLOR_BACKGROUND..COLOR_BACKGROUND + 0x10]).raw_color((select & 7) as usize)
        } else {
            0
        }
    }

    fn window_color(&self) -> u16 {
        let select = (self.vram[REG_DISPLAY_CONTROL] & 7) as usize;
        if self.is_color() {
            Bgr444Palette::new(&self.vram[COLOR_WINDOW..COLOR_WINDOW + 0x10]).raw_color(select)
        } else {
            ShadePalette::shade_to_bgr444(select as u8)
        }
    }

    fn tile(&self, tile: usize) -> &[u8] {
        let at = CHARACTER_RAM + (tile & 0x1FF) * TILE_BYTES;
        &self.vram[at..at + TILE_BYTES]
    }

    fn sprites(&self) -> [Sprite; 64] {
        let offset_x = self.vram[REG_SPRITE_OFFSET_H];
        let offset_y = self.vram[REG_SPRITE_OFFSET_V];
        let mut sprites = [Sprite::default(); 64];
        let (mut prev_x, mut prev_y) = (0u8, 0u8);
        for (i, sprite) in sprites.iter_mut().enumerate() {
            let entry = &self.vram[SPRITE_TABLE + i * 4..SPRITE_TABLE + i * 4 + 4];
            let attr = entry[1];
            let x = if attr & 0x04 != 0 { prev_x.wrapping_add(entry[2]) } else { entry[2].wrapping_add(offset_x) };
            let y = if attr & 0x02 != 0 { prev_y.wrapping_add(entry[3]) } else { entry[3].wrapping_add(offset_y) };
            prev_x = x;
            prev_y = y;
            *sprite = Sprite {
                tile: entry[0] as usize | ((attr as usize & 1) << 8),
                attr,
                x,
                y,
                code: self.vram[SPRITE_CODES + i] & 0x0F,
            };
        }
        sprites
    }

    fn draw_sprites(&self, line: &mut [u16; SCREEN_WIDTH], sprites: &[Sprite; 64], y: u8, priority: u8) {
        // Lower-numbered sprites win, so draw them last.
        for sprite in sprites.iter().rev() {
            if (sprite.attr >> 3) & 3 != priority {
                continue;
            }
            let row = y.wrapping_sub(sprite.y);
            if row >= 8 {
                continue;
            }
            let row = if sprite.attr & 0x40 != 0 { 7 - row } else { row };
            let pixels = PackedTileDecoder.decode_row(self.tile(sprite.tile), row, sprite.attr & 0x80 != 0);
            for (col, &index) in pixels.iter().enumerate() {
                let x = sprite.x.wrapping_add(col as u8) as usize;
                if index != 0 && x < SCREEN_WIDTH {
                    line[x] = self.palette_color(COLOR_SPRITE, MONO_SPRITE, sprite.code, sprite.attr & 0x20 != 0, index);
                }
            }
        }
    }

    fn draw_plane(&self, line: &mut [u16; SCREEN_WIDTH], plane: usize, y: u8) {
        let (map, scroll, color_base, mono_base) = match plane {
            1 => (PLANE1_MAP, REG_SCROLL1_H, COLOR_PLANE1, MONO_PLANE1),
            _ => (PLANE2_MAP, REG_SCROLL2_H, COLOR_PLANE2, MONO_PLANE2),
        };
        let scroll_x = self.vram[scroll];
        let map_y = y.wrapping_add(self.vram[scroll + 1]);

        for (x, pixel) in line.iter_mut().enumerate() {
            let map_x = (x as u8).wrapping_add(scroll_x);
            let at = map + ((map_y as usize >> 3) * 32 + (map_x as usize >> 3)) * 2;
            let (lo, hi) = (self.vram[at], self.vram[at + 1]);
            let col = if hi & 0x80 != 0 { 7 - (map_x & 7) } else { map_x & 7 };
            let row = if hi & 0x40 != 0 { 7 - (map_y & 7) } else { map_y & 7 };
            let tile = lo as usize | ((hi as usize & 1) << 8);
            let index = PackedTileDecoder.decode_pixel(self.tile(tile), col, row);
            if index != 0 {
                *pixel = self.palette_color(color_base, mono_base, (hi >> 1) & 0x0F, hi & 0x20 != 0, index);
            }
        }
    }

    fn render_line(&mut self, y: usize) {
        let win_x = self.vram[REG_WINDOW_X] as usize;
        let win_y = self.vram[REG_WINDOW_Y] as usize;
        let win_right = (win_x + self.vram[REG_WINDOW_W] as usize).min(SCREEN_WIDTH);
        let win_bottom = win_y + self.vram[REG_WINDOW_H] as usize;
        let outside = self.window_color();

        let mut line = [self.background_color(); SCREEN_WIDTH];
        if (win_y..win_bottom).contains(&y) {
            let sprites = self.sprites();
            let (back, front) = if self.vram[REG_PLANE_PRIORITY] & 0x80 != 0 { (1, 2) } else { (2, 1) };
            let y8 = y as u8;
            self.draw_sprites(&mut line, &sprites, y8, 1);
            self.draw_plane(&mut line, back, y8);
            self.draw_sprites(&mut line, &sprites, y8, 2);
            self.draw_plane(&mut line, front, y8);
            self.draw_sprites(&mut line, &sprites, y8, 3);
            line[..win_x.min(SCREEN_WIDTH)].fill(outside);
            line[win_right.max(win_x.min(SCREEN_WIDTH))..].fill(outside);
        } else {
            line.fill(outside);
        }

        if self.vram[REG_DISPLAY_CONTROL] & 0x80 != 0 {
            for pixel in line.iter_mut() {
                *pixel = ColorOps::invert_bgr444(*pixel);
            }
        }
        self.back[y * SCREEN_WIDTH..(y + 1) * SCREEN_WIDTH].copy_from_slice(&line);
    }
}

impl Default for K2ge {
    fn default() -> Self {
        Self::new()
    }
}
