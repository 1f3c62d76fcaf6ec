use std::fmt;
use std::fmt::{Display, Formatter};

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::{Dir, DIRECTIONS};
use crate::distances::Distances;
use crate::level::Level;

/// Fixed seed so state hashes are reproducible across runs.
const ZOBRIST_SEED: u64 = 1024;

/// Per-cell flag bitset.
///
/// `BOX_START` marks the box's initial cell and doubles as the backward
/// search's target marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cell(u8);

impl Cell {
    pub const EMPTY: Cell = Cell(0);
    pub const WALL: Cell = Cell(1);
    pub const GOAL: Cell = Cell(2);
    pub const BOX_START: Cell = Cell(4);
    pub const PLAYER_START: Cell = Cell(8);
    pub const PUSH_DEAD: Cell = Cell(16);
    pub const PULL_DEAD: Cell = Cell(32);

    pub fn has(self, flag: Cell) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn insert(&mut self, flag: Cell) {
        self.0 |= flag.0;
    }
}

#[derive(Debug, PartialEq)]
pub enum BoardErr {
    IncompleteBorder,
    UnreachableBoxes,
    UnreachableGoals,
}

impl Display for BoardErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            BoardErr::IncompleteBorder => write!(f, "Player can exit the level because of missing border"),
            BoardErr::UnreachableBoxes => write!(f, "Boxes that are not on goal but can't be reached"),
            BoardErr::UnreachableGoals => write!(f, "Goals that don't have a box but can't be reached"),
        }
    }
}

impl std::error::Error for BoardErr {}

/// A validated, preprocessed level.
///
/// After `Board::new` every non-wall cell is strictly interior: the
/// validation flood turns unreachable floor into walls and rejects levels
/// whose border lets the flood escape. Single and double step neighbor
/// arithmetic on non-wall cells therefore stays in bounds with no checks.
pub struct Board {
    pub width: usize,
    pub cells: Vec<Cell>,
    pub offsets: [isize; 4],
    pub player_start: usize,
    pub box_starts: Vec<usize>,
    pub goals: Vec<usize>,
    pub distances: Distances,
    pub box_tags: Vec<u64>,
    pub player_tags: Vec<u64>,
}

impl Board {
    pub fn new(level: &Level) -> Result<Board, BoardErr> {
        let width = level.width;
        let mut cells = level.cells.clone();

        mark_reachable_interior(&mut cells, width, level.height(), level.player_pos)?;

        let box_starts: Vec<_> = level
            .boxes
            .iter()
            .cloned()
            .filter(|&b| !cells[b].has(Cell::WALL))
            .collect();
        let goals: Vec<_> = level
            .goals
            .iter()
            .cloned()
            .filter(|&g| !cells[g].has(Cell::WALL))
            .collect();
        if box_starts.len() != level.boxes.len() {
            debug!(
                "dropped {} boxes solved in sealed pockets",
                level.boxes.len() - box_starts.len()
            );
        }

        let offsets = [
            Dir::Left.offset(width),
            Dir::Right.offset(width),
            Dir::Up.offset(width),
            Dir::Down.offset(width),
        ];
        let distances = Distances::new(&cells, width, &box_starts, &goals);

        for pos in 0..cells.len() {
            let cell = cells[pos];
            if cell.has(Cell::WALL) {
                continue;
            }
            if !cell.has(Cell::GOAL) && distances.pushes(pos).is_none() {
                cells[pos].insert(Cell::PUSH_DEAD);
            }
            if !cell.has(Cell::BOX_START) && distances.pulls(pos).is_none() {
                cells[pos].insert(Cell::PULL_DEAD);
            }
        }

        let mut rng = StdRng::seed_from_u64(ZOBRIST_SEED);
        let mut box_tags = vec![0; cells.len()];
        let mut player_tags = vec![0; cells.len()];
        for pos in 0..cells.len() {
            if !cells[pos].has(Cell::WALL) {
                box_tags[pos] = rng.gen();
                player_tags[pos] = rng.gen();
            }
        }

        Ok(Board {
            width,
            cells,
            offsets,
            player_start: level.player_pos,
            box_starts,
            goals,
            distances,
            box_tags,
            player_tags,
        })
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn offset(&self, dir: Dir) -> isize {
        self.offsets[dir.index()]
    }

    /// XOR of the box tags of the given cells.
    pub fn box_hash(&self, boxes: &[usize]) -> u64 {
        boxes.iter().fold(0, |hash, &b| hash ^ self.box_tags[b])
    }
}

/// Floods from the player, turning unreachable floor into walls.
///
/// Unreachable boxes parked on goals get walled over too (they never move
/// again), anything else unreachable and flagged is an error.
fn mark_reachable_interior(
    cells: &mut [Cell],
    width: usize,
    height: usize,
    player_pos: usize,
) -> Result<(), BoardErr> {
    let mut reachable = vec![false; cells.len()];
    let mut to_visit = vec![player_pos];

    while let Some(pos) = to_visit.pop() {
        if reachable[pos] {
            continue;
        }
        reachable[pos] = true;

        let (r, c) = (pos / width, pos % width);
        for &dir in &DIRECTIONS {
            let (nr, nc) = match dir {
                Dir::Left => (r as isize, c as isize - 1),
                Dir::Right => (r as isize, c as isize + 1),
                Dir::Up => (r as isize - 1, c as isize),
                Dir::Down => (r as isize + 1, c as isize),
            };
            if nr < 0 || nc < 0 || nr >= height as isize || nc >= width as isize {
                return Err(BoardErr::IncompleteBorder);
            }
            let new_pos = nr as usize * width + nc as usize;
            if !cells[new_pos].has(Cell::WALL) && !reachable[new_pos] {
                to_visit.push(new_pos);
            }
        }
    }

    for pos in 0..cells.len() {
        let cell = cells[pos];
        if cell.has(Cell::WALL) || reachable[pos] {
            continue;
        }
        if cell.has(Cell::BOX_START) && !cell.has(Cell::GOAL) {
            return Err(BoardErr::UnreachableBoxes);
        }
        if cell.has(Cell::GOAL) && !cell.has(Cell::BOX_START) {
            return Err(BoardErr::UnreachableGoals);
        }
        cells[pos] = Cell::WALL;
    }
    Ok(())
}
