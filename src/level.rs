use std::fmt;
use std::fmt::{Debug, Display, Formatter};

use crate::board::Cell;

/// A parsed level: a flat grid of cell flags plus the dynamic pieces.
///
/// `cells` is indexed by `row * width + col`, rows padded to uniform width.
#[derive(Clone, PartialEq, Eq)]
pub struct Level {
    pub width: usize,
    pub cells: Vec<Cell>,
    pub player_pos: usize,
    pub boxes: Vec<usize>,
    pub goals: Vec<usize>,
}

impl Level {
    pub fn height(&self) -> usize {
        self.cells.len() / self.width
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (r, row) in self.cells.chunks(self.width).enumerate() {
            let row_start = r * self.width;

            let mut line = String::with_capacity(self.width);
            for (c, &cell) in row.iter().enumerate() {
                let pos = row_start + c;
                let has_box = self.boxes.contains(&pos);
                let ch = if cell.has(Cell::WALL) {
                    '#'
                } else if pos == self.player_pos {
                    if cell.has(Cell::GOAL) {
                        '+'
                    } else {
                        '@'
                    }
                } else if has_box {
                    if cell.has(Cell::GOAL) {
                        '*'
                    } else {
                        '$'
                    }
                } else if cell.has(Cell::GOAL) {
                    '.'
                } else {
                    ' '
                };
                line.push(ch);
            }
            writeln!(f, "{}", line.trim_end())?;
        }
        Ok(())
    }
}

impl Debug for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
