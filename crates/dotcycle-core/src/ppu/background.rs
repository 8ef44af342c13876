//! Background/window fetcher feeding the background pixel FIFO.

use super::FetchContext;
use crate::queue::Queue;

#[derive(Clone, Copy, PartialEq, Eq)]
enum FetchState {
    TileNumber,
    TileDataLow,
    TileDataHigh,
    Push,
}

pub(super) struct BackgroundFetcher {
    pixel_queue: Queue<u8, 16>,

    current_tile_no: u8,
    current_tile_row: [u8; 8],
    row_of_tile: usize,

    /// Tile column within the current row, counted from the fetch start.
    fetcher_x: u8,

    state: FetchState,
    ticks: u8,
    /// The first fetch of a scanline is thrown away: the fetcher restarts
    /// after its dummy tile-data-high state.
    reset_on_tile_data_high: bool,
    dequeued_pixels: u16,
    skipped_pixels: u8,
    /// SCX % 8 pixels to discard at the start of the line.
    pixels_to_skip: u8,
    drawing_window: bool,
    suspended: bool,

    /// Latched once WY <= LY has been true anywhere in this frame.
    wy_reached: bool,
    window_line: i16,

    // Scroll/window registers (the fetcher is their hardware consumer).
    scroll_y: u8,
    scroll_x: u8,
    window_y: u8,
    /// WX minus the hardware's +7 offset; can go negative.
    window_x: i16,
}

impl BackgroundFetcher {
    pub fn new() -> Self {
        Self {
            pixel_queue: Queue::new(),
            current_tile_no: 0,
            current_tile_row: [0; 8],
            row_of_tile: 0,
            fetcher_x: 0,
            state: FetchState::TileNumber,
            ticks: 0,
            reset_on_tile_data_high: false,
            dequeued_pixels: 0,
            skipped_pixels: 0,
            pixels_to_skip: 0,
            drawing_window: false,
            suspended: false,
            wy_reached: false,
            window_line: -1,
            scroll_y: 0,
            scroll_x: 0,
            window_y: 0,
            window_x: -7,
        }
    }

    /// Restart for a new scanline (entry into pixel transfer).
    pub fn start(&mut self, ctx: &FetchContext<'_>) {
        self.reset();
        self.reset_on_tile_data_high = true;
        self.drawing_window = false;
        self.window_check(ctx);
    }

    pub fn tick(&mut self, ctx: &FetchContext<'_>) {
        if self.suspended {
            return;
        }

        self.ticks += 1;
        // Every state takes two dots, except push which retries each dot.
        if self.state != FetchState::Push && self.ticks < 2 {
            return;
        }
        self.ticks = 0;

        match self.state {
            FetchState::TileNumber => {
                if self.drawing_window {
                    self.fetch_window_tile_no(ctx);
                } else {
                    self.fetch_background_tile_no(ctx);
                }
                self.state = FetchState::TileDataLow;
            }
            // Tile rows come pre-decoded from the tile cache; the data
            // states only burn the dots the hardware would.
            FetchState::TileDataLow => self.state = FetchState::TileDataHigh,
            FetchState::TileDataHigh => {
                self.current_tile_row = ctx.tile_row(self.current_tile_no, self.row_of_tile);

                if self.reset_on_tile_data_high {
                    self.state = FetchState::TileNumber;
                    self.reset_on_tile_data_high = false;
                } else {
                    self.state = FetchState::Push;
                }
            }
            FetchState::Push => {
                if self.pixel_queue.is_empty() {
                    for color_id in self.current_tile_row {
                        self.pixel_queue.push(color_id);
                    }
                    self.fetcher_x = self.fetcher_x.wrapping_add(1);
                    self.state = FetchState::TileNumber;
                }
            }
        }
    }

    /// Frame finished: forget the window latch and line counter.
    pub fn vblank(&mut self) {
        self.wy_reached = false;
        self.window_line = -1;
    }

    /// Dequeue one background pixel. `None` means nothing left the FIFO
    /// this dot (empty, suspended, or an SCX-discarded pixel).
    pub fn output_pixel(&mut self, ctx: &FetchContext<'_>) -> Option<u8> {
        if self.pixel_queue.is_empty() || self.suspended {
            return None;
        }

        self.dequeued_pixels += 1;
        let pixel = self.pixel_queue.pop();
        let result = if self.skipped_pixels < self.pixels_to_skip {
            self.skipped_pixels += 1;
            None
        } else {
            pixel
        };

        // The window switch is evaluated after every dequeued or skipped
        // pixel; it can only fire once per line.
        self.window_check(ctx);
        result
    }

    pub fn set_suspended(&mut self, suspended: bool) {
        if !self.suspended && suspended {
            self.state = FetchState::TileNumber;
            self.ticks = 0;
        }
        self.suspended = suspended;
    }

    pub fn scroll_y(&self) -> u8 {
        self.scroll_y
    }

    pub fn set_scroll_y(&mut self, value: u8) {
        self.scroll_y = value;
    }

    pub fn scroll_x(&self) -> u8 {
        self.scroll_x
    }

    pub fn set_scroll_x(&mut self, value: u8) {
        self.scroll_x = value;
    }

    pub fn window_y(&self) -> u8 {
        self.window_y
    }

    pub fn set_window_y(&mut self, value: u8) {
        self.window_y = value;
    }

    /// WX holds the window X position plus 7; 7 maps the window to the
    /// left edge of the screen.
    pub fn window_x(&self) -> u8 {
        (self.window_x + 7) as u8
    }

    pub fn set_window_x(&mut self, value: u8) {
        self.window_x = value as i16 - 7;
    }

    fn fetch_background_tile_no(&mut self, ctx: &FetchContext<'_>) {
        // LCDC bit 3 picks the background tile map.
        let map_base: u16 = if ctx.control & 0x08 != 0 {
            0x1C00
        } else {
            0x1800
        };

        // The map is 256 lines tall and 32 tiles wide; both axes wrap.
        let effective_line = (ctx.ly as usize + self.scroll_y as usize) % 256;
        let tile_row = effective_line / 8;
        self.row_of_tile = effective_line % 8;

        let tile_col = ((self.scroll_x / 8).wrapping_add(self.fetcher_x)) as usize % 32;
        self.pixels_to_skip = self.scroll_x % 8;

        let tile_addr = map_base + (tile_row as u16) * 32 + tile_col as u16;
        self.current_tile_no = ctx.vram[tile_addr as usize];
    }

    fn fetch_window_tile_no(&mut self, ctx: &FetchContext<'_>) {
        // LCDC bit 6 picks the window tile map.
        let map_base: u16 = if ctx.control & 0x40 != 0 {
            0x1C00
        } else {
            0x1800
        };

        let line = self.window_line.max(0) as usize;
        let tile_row = line / 8;
        self.row_of_tile = line % 8;
        let tile_col = self.fetcher_x as usize % 32;

        let tile_addr = map_base + (tile_row as u16) * 32 + tile_col as u16;
        self.current_tile_no = ctx.vram[tile_addr as usize];
    }

    /// Switch into window mode once the window becomes visible mid-line:
    /// LCDC bit 5 set, WY has matched LY somewhere this frame, and the
    /// output column has reached WX - 7.
    fn window_check(&mut self, ctx: &FetchContext<'_>) {
        if self.window_y <= ctx.ly {
            self.wy_reached = true;
        }

        if !self.drawing_window
            && ctx.control & 0x20 != 0
            && self.wy_reached
            && (self.dequeued_pixels as i16 - self.skipped_pixels as i16) >= self.window_x
        {
            // The window keeps its own row counter, advancing only on
            // lines where it was actually drawn.
            self.window_line += 1;
            self.drawing_window = true;
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.state = FetchState::TileNumber;
        self.ticks = 0;
        self.current_tile_no = 0;
        self.current_tile_row = [0; 8];
        self.fetcher_x = 0;
        self.dequeued_pixels = 0;
        self.pixels_to_skip = 0;
        self.skipped_pixels = 0;
        self.pixel_queue.clear();
    }
}
