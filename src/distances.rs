use crate::board::Cell;
use crate::data::step;

/// Saturation sentinel for unreachable box/target pairs.
///
/// Large enough to dominate any finite sum (boards are capped at 4096
/// cells) while `saturating_add` keeps mixed sums from wrapping.
pub const UNREACHABLE: u32 = 1 << 30;

/// Lower-bound distance tables, computed once per board.
///
/// `pushes[cell]` holds, per goal, the minimum number of pushes to move a
/// box from `cell` to that goal, ignoring other boxes. `pulls[cell]` is the
/// mirror image seeded from each box's starting cell. A cell that no flood
/// ever reached keeps no row at all, which is what dead cell detection
/// looks for.
pub struct Distances {
    pushes: Vec<Option<Box<[u32]>>>,
    pulls: Vec<Option<Box<[u32]>>>,
}

impl Distances {
    pub fn new(cells: &[Cell], width: usize, box_starts: &[usize], goals: &[usize]) -> Distances {
        let offsets = [-1, 1, -(width as isize), width as isize];

        let mut pushes = vec![None; cells.len()];
        for (gi, &goal) in goals.iter().enumerate() {
            flood_pulling(cells, &offsets, &mut pushes, goals.len(), gi, goal);
        }

        let mut pulls = vec![None; cells.len()];
        for (bi, &start) in box_starts.iter().enumerate() {
            flood_pushing(cells, &offsets, &mut pulls, box_starts.len(), bi, start);
        }

        Distances { pushes, pulls }
    }

    pub fn pushes(&self, pos: usize) -> Option<&[u32]> {
        self.pushes[pos].as_deref()
    }

    pub fn pulls(&self, pos: usize) -> Option<&[u32]> {
        self.pulls[pos].as_deref()
    }

    /// Admissible lower bound on the pushes remaining to put every box on
    /// a goal.
    pub fn push_heuristic(
        &self,
        cells: &[Cell],
        boxes: &[usize],
        scratch: &mut MatchScratch,
    ) -> u32 {
        self.matching(cells, boxes, Cell::GOAL, &self.pushes, scratch)
    }

    /// Admissible lower bound on the pulls remaining to return every box
    /// to a starting cell.
    pub fn pull_heuristic(
        &self,
        cells: &[Cell],
        boxes: &[usize],
        scratch: &mut MatchScratch,
    ) -> u32 {
        self.matching(cells, boxes, Cell::BOX_START, &self.pulls, scratch)
    }

    /// Greedy first-fit matching over (distance, box, target) triples
    /// sorted by distance. Boxes already sitting on a target cell count as
    /// placed and are skipped.
    fn matching(
        &self,
        cells: &[Cell],
        boxes: &[usize],
        placed: Cell,
        rows: &[Option<Box<[u32]>>],
        scratch: &mut MatchScratch,
    ) -> u32 {
        scratch.triples.clear();
        let mut unplaced = 0;

        for (bi, &pos) in boxes.iter().enumerate() {
            if cells[pos].has(placed) {
                continue;
            }
            let row = match &rows[pos] {
                Some(row) => row,
                // a box on a cell no flood reached can never be placed
                None => return UNREACHABLE,
            };
            unplaced += 1;
            for (ti, &dist) in row.iter().enumerate() {
                scratch.triples.push((dist, bi as u16, ti as u16));
            }
        }
        if unplaced == 0 {
            return 0;
        }

        let num_targets = rows
            .iter()
            .find_map(|row| row.as_ref().map(|r| r.len()))
            .unwrap_or(0);
        scratch.box_used.clear();
        scratch.box_used.resize(boxes.len(), false);
        scratch.target_used.clear();
        scratch.target_used.resize(num_targets, false);

        scratch.triples.sort_unstable();
        let mut sum: u32 = 0;
        let mut matched = 0;
        for &(dist, bi, ti) in &scratch.triples {
            if scratch.box_used[bi as usize] || scratch.target_used[ti as usize] {
                continue;
            }
            scratch.box_used[bi as usize] = true;
            scratch.target_used[ti as usize] = true;
            sum = sum.saturating_add(dist);
            matched += 1;
            if matched == unplaced {
                break;
            }
        }
        if matched < unplaced || sum >= UNREACHABLE {
            UNREACHABLE
        } else {
            sum
        }
    }
}

/// Reusable buffers for the matching heuristic, owned by each worker.
pub struct MatchScratch {
    triples: Vec<(u32, u16, u16)>,
    box_used: Vec<bool>,
    target_used: Vec<bool>,
}

impl MatchScratch {
    pub fn new() -> MatchScratch {
        MatchScratch {
            triples: Vec::new(),
            box_used: Vec::new(),
            target_used: Vec::new(),
        }
    }
}

impl Default for MatchScratch {
    fn default() -> Self {
        Self::new()
    }
}

/// Labels every cell a box could be pulled to starting at `goal` with its
/// push distance *to* the goal. Pulling from `pos` to `new_pos` needs
/// `new_pos` and the player cell one further to be floor.
///
/// A plain stack relaxation rather than a strict BFS; cells get revisited
/// when a shorter path turns up.
fn flood_pulling(
    cells: &[Cell],
    offsets: &[isize; 4],
    rows: &mut [Option<Box<[u32]>>],
    row_len: usize,
    target: usize,
    goal: usize,
) {
    set_dist(rows, row_len, goal, target, 0);
    let mut to_visit = vec![goal];
    while let Some(pos) = to_visit.pop() {
        let dist = rows[pos].as_ref().unwrap()[target] + 1;
        for &offset in offsets {
            let new_pos = step(pos, offset);
            if cells[new_pos].has(Cell::WALL) || cells[step(new_pos, offset)].has(Cell::WALL) {
                continue;
            }
            if improves(rows, new_pos, target, dist) {
                set_dist(rows, row_len, new_pos, target, dist);
                to_visit.push(new_pos);
            }
        }
    }
}

/// Labels every cell a box could be pushed to starting at `start` with its
/// pull distance to the start. Pushing from `pos` to `new_pos` needs
/// `new_pos` and the player cell behind `pos` to be floor.
fn flood_pushing(
    cells: &[Cell],
    offsets: &[isize; 4],
    rows: &mut [Option<Box<[u32]>>],
    row_len: usize,
    target: usize,
    start: usize,
) {
    set_dist(rows, row_len, start, target, 0);
    let mut to_visit = vec![start];
    while let Some(pos) = to_visit.pop() {
        let dist = rows[pos].as_ref().unwrap()[target] + 1;
        for &offset in offsets {
            let new_pos = step(pos, offset);
            if cells[new_pos].has(Cell::WALL) || cells[step(pos, -offset)].has(Cell::WALL) {
                continue;
            }
            if improves(rows, new_pos, target, dist) {
                set_dist(rows, row_len, new_pos, target, dist);
                to_visit.push(new_pos);
            }
        }
    }
}

fn improves(rows: &[Option<Box<[u32]>>], pos: usize, target: usize, dist: u32) -> bool {
    match &rows[pos] {
        Some(row) => dist < row[target],
        None => true,
    }
}

fn set_dist(rows: &mut [Option<Box<[u32]>>], row_len: usize, pos: usize, target: usize, dist: u32) {
    let row = rows[pos].get_or_insert_with(|| vec![UNREACHABLE; row_len].into_boxed_slice());
    row[target] = dist;
}
