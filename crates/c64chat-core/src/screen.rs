//! 40x25 character screen model of the device display.

use crate::palette::C64Color;

pub const COLUMNS: usize = 40;
pub const ROWS: usize = 25;

pub const TITLE_ROW: usize = 0;
pub const BORDER_TOP_ROW: usize = 1;
pub const HISTORY_TOP_ROW: usize = 2;
pub const HISTORY_ROWS: usize = 16;
pub const BORDER_BOTTOM_ROW: usize = HISTORY_TOP_ROW + HISTORY_ROWS;
pub const STATUS_ROW: usize = BORDER_BOTTOM_ROW + 1;
pub const INPUT_TOP_ROW: usize = STATUS_ROW + 1;
pub const INPUT_ROWS: usize = ROWS - INPUT_TOP_ROW;

/// First column of history text (inside the border and one column of padding).
pub const HISTORY_LEFT_COLUMN: usize = 2;
/// Columns available to a history line, prefix included.
pub const HISTORY_WIDTH: usize = COLUMNS - 2 * HISTORY_LEFT_COLUMN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub color: C64Color,
}

impl Cell {
    pub const BLANK: Cell = Cell {
        ch: ' ',
        color: C64Color::LightBlue,
    };
}

#[derive(Debug, Clone)]
pub struct TextScreen {
    cells: Vec<Cell>,
    pub border: C64Color,
    pub background: C64Color,
    pub text: C64Color,
}

impl TextScreen {
    pub fn new() -> Self {
        Self {
            cells: vec![Cell::BLANK; COLUMNS * ROWS],
            border: C64Color::LightBlue,
            background: C64Color::Blue,
            text: C64Color::LightBlue,
        }
    }

    pub fn clear(&mut self) {
        self.clear_rows(0, ROWS);
    }

    pub fn clear_rows(&mut self, first: usize, count: usize) {
        let start = first.min(ROWS) * COLUMNS;
        let end = (first + count).min(ROWS) * COLUMNS;
        for cell in &mut self.cells[start..end] {
            *cell = Cell {
                ch: ' ',
                color: self.text,
            };
        }
    }

    pub fn put_char(&mut self, row: usize, column: usize, ch: char, color: C64Color) {
        if row < ROWS && column < COLUMNS {
            self.cells[row * COLUMNS + column] = Cell { ch, color };
        }
    }

    /// Write `text` starting at (row, column), clipped at the right edge.
    /// Returns the column after the last character written.
    pub fn put_str(&mut self, row: usize, column: usize, text: &str, color: C64Color) -> usize {
        let mut col = column;
        for ch in text.chars() {
            if col >= COLUMNS {
                break;
            }
            self.put_char(row, col, ch, color);
            col += 1;
        }
        col
    }

    pub fn cell(&self, row: usize, column: usize) -> Cell {
        if row < ROWS && column < COLUMNS {
            self.cells[row * COLUMNS + column]
        } else {
            Cell::BLANK
        }
    }

    pub fn row(&self, row: usize) -> &[Cell] {
        let row = row.min(ROWS - 1);
        &self.cells[row * COLUMNS..(row + 1) * COLUMNS]
    }

    pub fn row_text(&self, row: usize) -> String {
        self.row(row).iter().map(|c| c.ch).collect()
    }

    /// Frame around the history area in the border colour.
    pub fn draw_frame(&mut self) {
        let color = self.border;
        for row in [BORDER_TOP_ROW, BORDER_BOTTOM_ROW] {
            self.put_char(row, 0, '+', color);
            for column in 1..COLUMNS - 1 {
                self.put_char(row, column, '-', color);
            }
            self.put_char(row, COLUMNS - 1, '+', color);
        }
        for row in HISTORY_TOP_ROW..BORDER_BOTTOM_ROW {
            self.put_char(row, 0, '|', color);
            self.put_char(row, COLUMNS - 1, '|', color);
        }
    }
}

impl Default for TextScreen {
    fn default() -> Self {
        Self::new()
    }
}
