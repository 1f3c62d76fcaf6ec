use std::fmt;
use std::fmt::{Display, Formatter};

/// The packed move encoding carries a 12 bit cell index.
pub const MAX_CELLS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dir {
    Left,
    Right,
    Up,
    Down,
}

pub const DIRECTIONS: [Dir; 4] = [Dir::Left, Dir::Right, Dir::Up, Dir::Down];

impl Dir {
    pub fn index(self) -> usize {
        match self {
            Dir::Left => 0,
            Dir::Right => 1,
            Dir::Up => 2,
            Dir::Down => 3,
        }
    }

    pub fn from_index(index: usize) -> Dir {
        DIRECTIONS[index]
    }

    /// Offset into a flat grid of the given width.
    pub fn offset(self, width: usize) -> isize {
        match self {
            Dir::Left => -1,
            Dir::Right => 1,
            Dir::Up => -(width as isize),
            Dir::Down => width as isize,
        }
    }
}

impl Display for Dir {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let c = match self {
            Dir::Left => 'l',
            Dir::Right => 'r',
            Dir::Up => 'u',
            Dir::Down => 'd',
        };
        write!(f, "{}", c)
    }
}

/// Steps `pos` by a signed flat-grid offset.
///
/// Board validation guarantees every non-wall cell is strictly interior
/// so stepping from one never leaves the grid.
pub fn step(pos: usize, offset: isize) -> usize {
    (pos as isize + offset) as usize
}
