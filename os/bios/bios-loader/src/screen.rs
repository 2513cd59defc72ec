//! # VGA Text Console
//!
//! Log lines on the 80×25 text screen at `0xB8000`, scrolling up when the
//! last row is used. Every record also goes to the QEMU debug port through
//! [`QemuLogger`].

use boot_qemu::{Console, QemuLogger};
use core::fmt::{self, Write};
use core::sync::atomic::{AtomicUsize, Ordering};
use log::LevelFilter;

pub const COLUMNS: usize = 80;
pub const ROWS: usize = 25;

/// Light grey on black.
const ATTRIBUTE: u8 = 0x07;

/// Somewhere to put character cells.
pub trait TextBuffer {
    fn write_cell(&self, row: usize, column: usize, byte: u8);
    fn read_cell(&self, row: usize, column: usize) -> u16;
    fn write_raw(&self, row: usize, column: usize, cell: u16);
}

/// The VGA text buffer.
pub struct Vga;

impl Vga {
    const BASE: usize = 0xB8000;

    fn cell(row: usize, column: usize) -> *mut u16 {
        (Self::BASE + 2 * (row * COLUMNS + column)) as *mut u16
    }
}

impl TextBuffer for Vga {
    fn write_cell(&self, row: usize, column: usize, byte: u8) {
        self.write_raw(row, column, u16::from(ATTRIBUTE) << 8 | u16::from(byte));
    }

    fn read_cell(&self, row: usize, column: usize) -> u16 {
        // SAFETY: `row` and `column` are inside the 80×25 buffer.
        unsafe { Self::cell(row, column).read_volatile() }
    }

    fn write_raw(&self, row: usize, column: usize, cell: u16) {
        // SAFETY: as above.
        unsafe { Self::cell(row, column).write_volatile(cell) }
    }
}

/// Line-oriented console over a [`TextBuffer`].
pub struct ScreenConsole<B> {
    buffer: B,
    row: AtomicUsize,
}

impl<B: TextBuffer> ScreenConsole<B> {
    pub const fn new(buffer: B) -> Self {
        Self {
            buffer,
            row: AtomicUsize::new(0),
        }
    }

    /// Blank the screen and start at the top.
    pub fn clear(&self) {
        for row in 0..ROWS {
            self.blank_row(row);
        }
        self.row.store(0, Ordering::Relaxed);
    }

    fn blank_row(&self, row: usize) {
        for column in 0..COLUMNS {
            self.buffer.write_cell(row, column, b' ');
        }
    }

    fn scroll(&self) {
        for row in 1..ROWS {
            for column in 0..COLUMNS {
                let cell = self.buffer.read_cell(row, column);
                self.buffer.write_raw(row - 1, column, cell);
            }
        }
        self.blank_row(ROWS - 1);
    }

    /// Row for the next line, scrolling if the screen is full.
    fn next_row(&self) -> usize {
        let row = self.row.load(Ordering::Relaxed);
        if row < ROWS {
            self.row.store(row + 1, Ordering::Relaxed);
            row
        } else {
            self.scroll();
            ROWS - 1
        }
    }
}

/// Fills one row, wrapping onto further rows.
struct LineWriter<'a, B: TextBuffer> {
    console: &'a ScreenConsole<B>,
    row: usize,
    column: usize,
}

impl<B: TextBuffer> Write for LineWriter<'_, B> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if self.column == COLUMNS || byte == b'\n' {
                self.row = self.console.next_row();
                self.column = 0;
                self.console.blank_row(self.row);
                if byte == b'\n' {
                    continue;
                }
            }
            let byte = if byte.is_ascii() && !byte.is_ascii_control() {
                byte
            } else {
                b'?'
            };
            self.console.buffer.write_cell(self.row, self.column, byte);
            self.column += 1;
        }
        Ok(())
    }
}

impl<B: TextBuffer + Send + Sync> Console for ScreenConsole<B> {
    fn write_line(&self, args: fmt::Arguments<'_>) {
        let row = self.next_row();
        self.blank_row(row);
        let mut writer = LineWriter {
            console: self,
            row,
            column: 0,
        };
        // Best-effort output; the buffer cannot fail.
        let _ = writer.write_fmt(args);
    }
}

pub type ScreenLogger = QemuLogger<ScreenConsole<Vga>>;

pub static LOGGER: ScreenLogger = QemuLogger::new(LevelFilter::Info, ScreenConsole::new(Vga));

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Memory(Mutex<Vec<u16>>);

    impl Memory {
        fn new() -> Self {
            Self(Mutex::new(vec![0; ROWS * COLUMNS]))
        }

        fn line(&self, row: usize) -> String {
            let cells = self.0.lock().unwrap();
            cells[row * COLUMNS..(row + 1) * COLUMNS]
                .iter()
                .map(|&c| char::from(c.to_le_bytes()[0]))
                .collect::<String>()
                .trim_end()
                .to_owned()
        }
    }

    impl TextBuffer for Memory {
        fn write_cell(&self, row: usize, column: usize, byte: u8) {
            self.write_raw(row, column, u16::from(ATTRIBUTE) << 8 | u16::from(byte));
        }

        fn read_cell(&self, row: usize, column: usize) -> u16 {
            self.0.lock().unwrap()[row * COLUMNS + column]
        }

        fn write_raw(&self, row: usize, column: usize, cell: u16) {
            self.0.lock().unwrap()[row * COLUMNS + column] = cell;
        }
    }

    #[test]
    fn lines_fill_from_the_top() {
        let console = ScreenConsole::new(Memory::new());
        console.clear();
        console.write_line(format_args!("[INFO ] first"));
        console.write_line(format_args!("second {}", 2));
        assert_eq!(console.buffer.line(0), "[INFO ] first");
        assert_eq!(console.buffer.line(1), "second 2");
        assert_eq!(console.buffer.line(2), "");
    }

    #[test]
    fn full_screen_scrolls_up() {
        let console = ScreenConsole::new(Memory::new());
        console.clear();
        for i in 0..ROWS + 2 {
            console.write_line(format_args!("line {i}"));
        }
        assert_eq!(console.buffer.line(0), "line 2");
        assert_eq!(console.buffer.line(ROWS - 1), format!("line {}", ROWS + 1));
    }

    #[test]
    fn long_lines_wrap() {
        let console = ScreenConsole::new(Memory::new());
        console.clear();
        let long = "x".repeat(COLUMNS + 5);
        console.write_line(format_args!("{long}"));
        assert_eq!(console.buffer.line(0).len(), COLUMNS);
        assert_eq!(console.buffer.line(1), "xxxxx");
    }

    #[test]
    fn non_ascii_is_replaced() {
        let console = ScreenConsole::new(Memory::new());
        console.clear();
        console.write_line(format_args!("µ\tok"));
        assert_eq!(console.buffer.line(0), "???ok");
    }
}
