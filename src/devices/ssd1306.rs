//! SSD1306 128x64 monochrome OLED controller.
//!
//! Text is rendered into an in-memory [`Framebuffer`] with monospace fonts and
//! only the touched window is sent to display RAM, using horizontal
//! addressing mode.

use super::{DeviceKind, TextDisplay, TextSize};
use crate::bus::BusTransport;
use crate::error::{BusError, DeviceError, DeviceInitError, MisuseError};
use arrayvec::ArrayVec;
use core::convert::Infallible;
use embedded_graphics::{
    draw_target::DrawTarget,
    geometry::{OriginDimensions, Point, Size},
    mono_font::{
        ascii::{FONT_5X8, FONT_8X13},
        MonoFont, MonoTextStyle,
    },
    pixelcolor::BinaryColor,
    primitives::Rectangle,
    text::{Baseline, Text},
    Drawable, Pixel,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_ADDRESS: u8 = 0x3C;

pub const WIDTH: usize = 128;
pub const HEIGHT: usize = 64;
pub const PAGES: usize = HEIGHT / 8;
pub const RAM_SIZE: usize = WIDTH * PAGES;

/// Control byte preceding command bytes.
pub const CONTROL_COMMAND: u8 = 0x00;
/// Control byte preceding display RAM bytes.
pub const CONTROL_DATA: u8 = 0x40;

pub const CMD_SET_CONTRAST: u8 = 0x81;
pub const CMD_ENTIRE_DISPLAY_RESUME: u8 = 0xA4;
pub const CMD_NORMAL_DISPLAY: u8 = 0xA6;
pub const CMD_DISPLAY_OFF: u8 = 0xAE;
pub const CMD_DISPLAY_ON: u8 = 0xAF;
pub const CMD_MEMORY_MODE: u8 = 0x20;
pub const CMD_COLUMN_ADDRESS: u8 = 0x21;
pub const CMD_PAGE_ADDRESS: u8 = 0x22;
pub const CMD_START_LINE: u8 = 0x40;
pub const CMD_SEGMENT_REMAP: u8 = 0xA0;
pub const CMD_MULTIPLEX: u8 = 0xA8;
pub const CMD_COM_SCAN_INC: u8 = 0xC0;
pub const CMD_COM_SCAN_DEC: u8 = 0xC8;
pub const CMD_DISPLAY_OFFSET: u8 = 0xD3;
pub const CMD_CLOCK_DIV: u8 = 0xD5;
pub const CMD_PRECHARGE: u8 = 0xD9;
pub const CMD_COM_PINS: u8 = 0xDA;
pub const CMD_VCOM_DETECT: u8 = 0xDB;
pub const CMD_CHARGE_PUMP: u8 = 0x8D;

const INIT_SEQUENCE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Ssd1306Config {
    pub address: u8,
    pub contrast: u8,
    /// Rotate the picture by 180 degrees.
    pub flipped: bool,
}

impl Default for Ssd1306Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            contrast: 0xCF,
            flipped: false,
        }
    }
}

/// Page-major 1 bpp image of the display RAM: byte `page * WIDTH + x` holds
/// the eight vertical pixels of column `x` in `page`, LSB on top.
#[derive(Clone, PartialEq, Eq)]
pub struct Framebuffer {
    ram: [u8; RAM_SIZE],
}

impl Framebuffer {
    pub const fn new() -> Self {
        Self { ram: [0; RAM_SIZE] }
    }

    pub fn ram(&self) -> &[u8; RAM_SIZE] {
        &self.ram
    }

    pub fn blank(&mut self) {
        self.ram = [0; RAM_SIZE];
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        x < WIDTH && y < HEIGHT && self.ram[(y / 8) * WIDTH + x] & (1 << (y % 8)) != 0
    }
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let lit = self.ram.iter().map(|b| b.count_ones()).sum::<u32>();
        write!(f, "Framebuffer {{ {WIDTH}x{HEIGHT}, {lit} pixels lit }}")
    }
}

impl OriginDimensions for Framebuffer {
    fn size(&self) -> Size {
        Size::new(WIDTH as u32, HEIGHT as u32)
    }
}

impl DrawTarget for Framebuffer {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            let (Ok(x), Ok(y)) = (usize::try_from(coord.x), usize::try_from(coord.y)) else {
                continue;
            };
            if x >= WIDTH || y >= HEIGHT {
                continue;
            }
            let byte = &mut self.ram[(y / 8) * WIDTH + x];
            let mask = 1u8 << (y % 8);
            if color.is_on() {
                *byte |= mask;
            } else {
                *byte &= !mask;
            }
        }
        Ok(())
    }
}

fn unwrap_infallible<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}

fn font(size: TextSize) -> &'static MonoFont<'static> {
    match size {
        TextSize::Small => &FONT_5X8,
        TextSize::Large => &FONT_8X13,
    }
}

/// Vertical offset of the glyph inside its cell.
fn glyph_offset(size: TextSize) -> i32 {
    match size {
        TextSize::Small => 0,
        TextSize::Large => 1,
    }
}

pub fn init_sequence(config: &Ssd1306Config) -> ArrayVec<u8, INIT_SEQUENCE_CAPACITY> {
    let (remap, scan) = if config.flipped {
        (CMD_SEGMENT_REMAP, CMD_COM_SCAN_INC)
    } else {
        (CMD_SEGMENT_REMAP | 0x01, CMD_COM_SCAN_DEC)
    };

    let mut seq = ArrayVec::new();
    seq.extend([
        CMD_DISPLAY_OFF,
        CMD_CLOCK_DIV,
        0x80,
        CMD_MULTIPLEX,
        (HEIGHT - 1) as u8,
        CMD_DISPLAY_OFFSET,
        0x00,
        CMD_START_LINE,
        CMD_CHARGE_PUMP,
        0x14,
        CMD_MEMORY_MODE,
        0x00,
        remap,
        scan,
        CMD_COM_PINS,
        0x12,
        CMD_SET_CONTRAST,
        config.contrast,
        CMD_PRECHARGE,
        0xF1,
        CMD_VCOM_DETECT,
        0x40,
        CMD_ENTIRE_DISPLAY_RESUME,
        CMD_NORMAL_DISPLAY,
        CMD_DISPLAY_ON,
    ]);
    seq
}

#[derive(Debug)]
pub struct Ssd1306<B> {
    bus: B,
    config: Ssd1306Config,
    framebuffer: Framebuffer,
    initialized: bool,
}

impl<B: BusTransport> Ssd1306<B> {
    pub fn new(bus: B, config: Ssd1306Config) -> Self {
        Self {
            bus,
            config,
            framebuffer: Framebuffer::new(),
            initialized: false,
        }
    }

    pub fn config(&self) -> &Ssd1306Config {
        &self.config
    }

    /// The image the controller is expected to hold.
    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    pub fn release(self) -> B {
        self.bus
    }

    fn ensure_initialized(&self) -> Result<(), MisuseError> {
        if self.initialized {
            Ok(())
        } else {
            Err(MisuseError::NotInitialized(DeviceKind::Display))
        }
    }

    fn command(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        self.bus.write(self.config.address, CONTROL_COMMAND, bytes)
    }

    /// Send columns `x0..=x1` of pages `p0..=p1` from the framebuffer.
    fn flush_window(&mut self, x0: usize, x1: usize, p0: usize, p1: usize) -> Result<(), BusError> {
        debug_assert!(x0 <= x1 && x1 < WIDTH && p0 <= p1 && p1 < PAGES);
        self.command(&[
            CMD_COLUMN_ADDRESS,
            x0 as u8,
            x1 as u8,
            CMD_PAGE_ADDRESS,
            p0 as u8,
            p1 as u8,
        ])?;
        for page in p0..=p1 {
            let start = page * WIDTH;
            self.bus.write(
                self.config.address,
                CONTROL_DATA,
                &self.framebuffer.ram()[start + x0..=start + x1],
            )?;
        }
        Ok(())
    }

    fn blank_all(&mut self) -> Result<(), BusError> {
        self.framebuffer.blank();
        self.flush_window(0, WIDTH - 1, 0, PAGES - 1)
    }
}

impl<B: BusTransport> TextDisplay for Ssd1306<B> {
    fn init(&mut self) -> Result<(), DeviceInitError> {
        self.initialized = false;
        let seq = init_sequence(&self.config);
        self.command(&seq)
            .and_then(|()| self.blank_all())
            .map_err(|e| DeviceInitError::new(DeviceKind::Display, e))?;
        self.initialized = true;

        info!(address = self.config.address, "SSD1306 on");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DeviceError> {
        self.ensure_initialized()?;
        self.blank_all()?;
        debug!("display cleared");
        Ok(())
    }

    // Pixel coordinates are bounded by the 128x64 surface.
    #[allow(clippy::cast_possible_wrap)]
    fn draw_text(
        &mut self,
        column: u8,
        row: u8,
        text: &str,
        size: TextSize,
    ) -> Result<(), DeviceError> {
        self.ensure_initialized()?;

        let rows = self.rows(size);
        if row >= rows {
            return Err(MisuseError::RowOutOfRange { row, rows }.into());
        }
        let capacity = self.columns(size);
        let len = text.chars().count();
        if usize::from(column) + len > usize::from(capacity) {
            return Err(MisuseError::RowOverflow {
                column,
                len,
                capacity,
            }
            .into());
        }
        if len == 0 {
            return Ok(());
        }

        let cell_w = usize::from(size.cell_width());
        let cell_h = usize::from(size.cell_height());
        let x0 = usize::from(column) * cell_w;
        let y0 = usize::from(row) * cell_h;

        // Blank the cells first so shorter glyphs leave nothing behind.
        let cells = Rectangle::new(
            Point::new(x0 as i32, y0 as i32),
            Size::new((len * cell_w) as u32, cell_h as u32),
        );
        unwrap_infallible(self.framebuffer.fill_solid(&cells, BinaryColor::Off));

        let style = MonoTextStyle::new(font(size), BinaryColor::On);
        let mut utf8 = [0u8; 4];
        for (i, ch) in text.chars().enumerate() {
            let origin = Point::new((x0 + i * cell_w) as i32, y0 as i32 + glyph_offset(size));
            let glyph =
                Text::with_baseline(ch.encode_utf8(&mut utf8), origin, style, Baseline::Top);
            unwrap_infallible(glyph.draw(&mut self.framebuffer));
        }

        self.flush_window(x0, x0 + len * cell_w - 1, y0 / 8, (y0 + cell_h - 1) / 8)?;
        Ok(())
    }

    fn columns(&self, size: TextSize) -> u8 {
        (WIDTH / usize::from(size.cell_width())) as u8
    }

    fn rows(&self, size: TextSize) -> u8 {
        (HEIGHT / usize::from(size.cell_height())) as u8
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
