use crate::board::{Board, Cell};
use crate::data::{step, Dir};
use crate::moves::Moves;
use crate::solver::mark::MarkSet;

pub const WALL: u32 = u32::MAX;
pub const BOX: u32 = u32::MAX - 1;
pub const BLOCKED: u32 = BOX;

/// Player reachability sharing one table with occupancy.
///
/// Walls are `WALL`, boxes are `BOX`, and a cell is reachable iff its
/// entry equals the current generation stamp, so a full reset is just a
/// stamp bump. `calculate` normalizes the player to the minimum reachable
/// cell index, which is what makes forward and backward state hashes
/// comparable.
pub struct Reachable<'a> {
    board: &'a Board,
    table: Vec<u32>,
    current: u32,
    valid: bool,
    player_pos: usize,
    marks: MarkSet,
    to_visit: Vec<usize>,
}

impl<'a> Reachable<'a> {
    pub fn new(board: &'a Board, boxes: &[usize], player_pos: usize) -> Reachable<'a> {
        let mut table: Vec<u32> = board
            .cells
            .iter()
            .map(|c| if c.has(Cell::WALL) { WALL } else { 0 })
            .collect();
        for &b in boxes {
            table[b] = BOX;
        }
        Reachable {
            board,
            table,
            current: 1,
            valid: false,
            player_pos,
            marks: MarkSet::new(board.num_cells(), boxes.len().max(1)),
            to_visit: Vec::with_capacity(boxes.len() * 4),
        }
    }

    fn clear_table(&mut self) {
        for entry in &mut self.table {
            if *entry < BLOCKED {
                *entry = 0;
            }
        }
    }

    /// Flood-fills from the player unless the map is still valid. The
    /// player position is normalized to the minimum reachable cell.
    pub fn calculate(&mut self) {
        if self.valid {
            return;
        }

        self.current += 1;
        if self.current >= BLOCKED {
            self.clear_table();
            self.current = 1;
        }
        let current = self.current;

        let mut min_pos = self.player_pos;
        self.table[self.player_pos] = current;
        self.to_visit.clear();
        self.to_visit.push(self.player_pos);
        while let Some(pos) = self.to_visit.pop() {
            for &offset in &self.board.offsets {
                let new_pos = step(pos, offset);
                if self.table[new_pos] < current {
                    self.table[new_pos] = current;
                    if new_pos < min_pos {
                        min_pos = new_pos;
                    }
                    self.to_visit.push(new_pos);
                }
            }
        }
        self.player_pos = min_pos;
        self.valid = true;
    }

    /// Normalized player position; meaningful after `calculate`.
    pub fn player_pos(&self) -> usize {
        self.player_pos
    }

    pub fn is_reachable(&self, pos: usize) -> bool {
        self.table[pos] == self.current
    }

    pub fn blocked(&self, pos: usize) -> bool {
        self.table[pos] >= BLOCKED
    }

    /// Moves a box from `from` to `to` (a push), patching the map
    /// incrementally where the move provably cannot split or merge player
    /// regions, invalidating it otherwise.
    pub fn apply_push(&mut self, from: usize, to: usize) {
        let offset = to as isize - from as isize;
        let ortho = (self.board.width as isize + 1) - offset.abs();
        let current = self.current;

        if self.valid
            && ((self.at(to, ortho) >= BLOCKED && self.at(to, -ortho) >= BLOCKED)
                || self.table[to] != current)
            && self.at(from, ortho) >= current
            && self.at(from, -ortho) >= current
        {
            if from < self.player_pos {
                self.player_pos = from;
            } else if self.player_pos == to {
                // the box landed on the normalized minimum, rescan forward
                let mut pos = self.player_pos;
                loop {
                    pos += 1;
                    if self.table[pos] == current {
                        break;
                    }
                }
                self.player_pos = pos;
            }
        } else {
            self.valid = false;
            self.player_pos = from;
        }

        self.table[to] = BOX;
        self.table[from] = current;
    }

    /// Push variant that first rejects the move if it freezes a box group
    /// that is not entirely parked on goals. Returns true on deadlock with
    /// the occupancy change rolled back.
    pub fn apply_push_checked(&mut self, from: usize, to: usize) -> bool {
        let old_reachable = self.table[to];
        let current = self.current;

        self.table[to] = BOX;
        self.table[from] = current;

        if self.is_box_push_deadlocked(to) {
            self.table[to] = old_reachable;
            self.table[from] = BOX;
            return true;
        }

        let offset = to as isize - from as isize;
        let ortho = (self.board.width as isize + 1) - offset.abs();
        if self.valid
            && ((self.at(to, ortho) >= BLOCKED && self.at(to, -ortho) >= BLOCKED)
                || old_reachable != current)
            && self.at(from, ortho) >= current
            && self.at(from, -ortho) >= current
        {
            if from < self.player_pos {
                self.player_pos = from;
            } else if self.player_pos == to {
                let mut pos = self.player_pos;
                loop {
                    pos += 1;
                    if self.table[pos] == current {
                        break;
                    }
                }
                self.player_pos = pos;
            }
        } else {
            self.valid = false;
            self.player_pos = from;
        }
        false
    }

    /// Moves a box from `from` to `to` (a pull). The player ends one cell
    /// past `to`, dragging the box behind it.
    pub fn apply_pull(&mut self, from: usize, to: usize) {
        let offset = from as isize - to as isize;
        let ortho = (self.board.width as isize + 1) - offset.abs();
        let current = self.current;

        // does the vacated cell join the player's region?
        let from_reachable = if self.at(from, offset) == current
            || self.at(from, ortho) == current
            || self.at(from, -ortho) == current
        {
            current
        } else {
            0
        };

        if self.valid
            && self.at(to, ortho) >= BLOCKED
            && self.at(to, -ortho) >= BLOCKED
            && (from_reachable != current
                || (self.at(from, ortho) >= current
                    && self.at(from, -ortho) >= current
                    && self.at(from, offset) >= current))
        {
            let player = step(to, -offset);
            if player < self.player_pos {
                self.player_pos = player;
            } else if from_reachable == current && from < self.player_pos {
                self.player_pos = from;
            } else if self.player_pos == to {
                let mut pos = self.player_pos;
                loop {
                    pos += 1;
                    if self.table[pos] == current {
                        break;
                    }
                }
                self.player_pos = pos;
            }
        } else {
            self.valid = false;
            self.player_pos = step(to, -offset);
        }

        self.table[to] = BOX;
        self.table[from] = from_reachable;
    }

    /// Pull variant with the frozen-box rejection; backward moves may only
    /// freeze boxes on box starting cells.
    pub fn apply_pull_checked(&mut self, from: usize, to: usize) -> bool {
        let old_reachable = self.table[to];
        let offset = from as isize - to as isize;
        let ortho = (self.board.width as isize + 1) - offset.abs();
        let current = self.current;

        let from_reachable = if self.at(from, offset) == current
            || self.at(from, ortho) == current
            || self.at(from, -ortho) == current
        {
            current
        } else {
            0
        };
        self.table[to] = BOX;
        self.table[from] = from_reachable;

        if self.is_box_pull_deadlocked(to) {
            self.table[to] = old_reachable;
            self.table[from] = BOX;
            return true;
        }

        if self.valid
            && self.at(to, ortho) >= BLOCKED
            && self.at(to, -ortho) >= BLOCKED
            && (from_reachable != current
                || (self.at(from, ortho) >= current
                    && self.at(from, -ortho) >= current
                    && self.at(from, offset) >= current))
        {
            let player = step(to, -offset);
            if player < self.player_pos {
                self.player_pos = player;
            } else if from_reachable == current && from < self.player_pos {
                self.player_pos = from;
            } else if self.player_pos == to {
                let mut pos = self.player_pos;
                loop {
                    pos += 1;
                    if self.table[pos] == current {
                        break;
                    }
                }
                self.player_pos = pos;
            }
        } else {
            self.valid = false;
            self.player_pos = step(to, -offset);
        }
        false
    }

    fn at(&self, pos: usize, offset: isize) -> u32 {
        self.table[step(pos, offset)]
    }

    /// True if the box at `box_pos` is part of a frozen group with a box
    /// off-goal. Marks every box that blocks the group.
    pub fn is_box_push_deadlocked(&mut self, box_pos: usize) -> bool {
        self.marks.reset();

        if self.is_box_pushable(box_pos) {
            return false;
        }

        // frozen boxes are fine as long as they all sit on goals
        for i in (0..self.marks.marked().len()).rev() {
            let pos = self.marks.marked()[i];
            if !self.board.cells[pos].has(Cell::GOAL) {
                return true;
            }
        }
        false
    }

    fn is_box_pushable(&mut self, box_pos: usize) -> bool {
        if self.marks.is_marked(box_pos) {
            return false;
        }

        // free on either axis means movable
        let h1 = self.at(box_pos, -1);
        let h2 = self.at(box_pos, 1);
        if h1 < BLOCKED && h2 < BLOCKED {
            return true;
        }
        let w = self.board.width as isize;
        let v1 = self.at(box_pos, -w);
        let v2 = self.at(box_pos, w);
        if v1 < BLOCKED && v2 < BLOCKED {
            return true;
        }

        // temporarily mark the box so we avoid recursive loops
        self.marks.mark(box_pos);

        // The middle `&` is deliberately not short-circuiting: the far
        // side has to be visited even when the near side is already
        // blocked, so every box fencing this one in gets marked and the
        // on-goal check above sees all of them. E.g. pushing the lower
        // box up into the corner goal:
        // ####    ####
        // #.$  => #*$
        // #$      #
        // The corner box is walled in on the left, but the box to its
        // right still has to be marked and checked.
        let horizontal = self.side_pushable(h1, step(box_pos, -1))
            & self.side_pushable(h2, step(box_pos, 1));
        let movable = horizontal
            || self.side_pushable(v1, step(box_pos, -w)) & self.side_pushable(v2, step(box_pos, w));
        if movable {
            self.marks.unmark(box_pos);
            return true;
        }
        false
    }

    fn side_pushable(&mut self, entry: u32, pos: usize) -> bool {
        if entry == BOX {
            self.is_box_pushable(pos)
        } else {
            entry != WALL
        }
    }

    /// Pull-side frozen test; a frozen group is legal only when every
    /// marked box is on a box starting cell.
    pub fn is_box_pull_deadlocked(&mut self, box_pos: usize) -> bool {
        self.marks.reset();

        if self.is_box_pullable(box_pos) {
            return false;
        }

        for i in (0..self.marks.marked().len()).rev() {
            let pos = self.marks.marked()[i];
            if !self.board.cells[pos].has(Cell::BOX_START) {
                return true;
            }
        }
        false
    }

    fn is_box_pullable(&mut self, box_pos: usize) -> bool {
        if self.marks.is_marked(box_pos) {
            return false;
        }

        // pulling needs two free cells in a row in some direction
        let w = self.board.width as isize;
        for &offset in &[-1isize, 1, -w, w] {
            if self.at(box_pos, offset) < BLOCKED && self.at(box_pos, 2 * offset) < BLOCKED {
                return true;
            }
        }

        // temporarily mark the box so we avoid recursive loops
        self.marks.mark(box_pos);

        if self.dir_pullable(box_pos, -1)
            || self.dir_pullable(box_pos, 1)
            || self.dir_pullable(box_pos, w)
            || self.dir_pullable(box_pos, -w)
        {
            self.marks.unmark(box_pos);
            return true;
        }
        false
    }

    fn dir_pullable(&mut self, box_pos: usize, offset: isize) -> bool {
        let t1 = self.at(box_pos, offset);
        if t1 == WALL {
            return false;
        }
        let t2 = self.at(box_pos, 2 * offset);

        // same non-short-circuiting `&` as the push side
        let near = t1 != BOX || self.is_box_pullable(step(box_pos, offset));
        near & (t2 != WALL && (t2 != BOX || self.is_box_pullable(step(box_pos, 2 * offset))))
    }

    /// Appends the walk from `player_pos` to `target_pos` over the current
    /// occupancy. Trashes the reachability stamps; the map is left
    /// invalidated.
    pub fn append_player_path(&mut self, player_pos: usize, target_pos: usize, moves: &mut Moves) {
        if player_pos == target_pos {
            return;
        }
        let width = self.board.width as isize;

        // breadth-first distances from the target, written straight into
        // the shared table (blocked cells keep their sentinels)
        self.clear_table();
        self.table[target_pos] = 1;
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(target_pos);
        while let Some(pos) = queue.pop_front() {
            if pos == player_pos {
                break;
            }
            let dist = self.table[pos] + 1;
            for &offset in &self.board.offsets {
                let new_pos = step(pos, offset);
                if self.table[new_pos] == 0 {
                    self.table[new_pos] = dist;
                    queue.push_back(new_pos);
                }
            }
        }

        let mut pos = player_pos;
        while pos != target_pos {
            let dist = self.table[pos] - 1;
            if self.at(pos, 1) == dist {
                pos += 1;
                moves.add_walk(Dir::Right);
            } else if self.at(pos, -1) == dist {
                pos -= 1;
                moves.add_walk(Dir::Left);
            } else if self.at(pos, width) == dist {
                pos = step(pos, width);
                moves.add_walk(Dir::Down);
            } else if self.at(pos, -width) == dist {
                pos = step(pos, -width);
                moves.add_walk(Dir::Up);
            }
        }

        self.clear_table();
        self.current = 1;
        self.valid = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;

    fn board(xsb: &str) -> Board {
        let level: Level = xsb.parse().unwrap();
        Board::new(&level).unwrap()
    }

    fn fresh<'a>(board: &'a Board, boxes: &[usize], player: usize) -> Reachable<'a> {
        let mut reachable = Reachable::new(board, boxes, player);
        reachable.calculate();
        reachable
    }

    #[test]
    fn normalizes_player_to_min_cell() {
        let b = board(
            r"
#####
#   #
# @ #
#####
",
        );
        let r = fresh(&b, &[], b.player_start);
        assert_eq!(r.player_pos(), 5 + 1);
    }

    #[test]
    fn boxes_block_and_split_regions() {
        // the box splits the corridor in two
        let b = board(
            r"
######
#@$ .#
######
",
        );
        let box_pos = 6 + 2;
        let r = fresh(&b, &[box_pos], b.player_start);
        assert!(r.blocked(box_pos));
        assert!(r.is_reachable(6 + 1));
        assert!(!r.is_reachable(6 + 3));
        assert!(!r.is_reachable(6 + 4));
    }

    #[test]
    fn incremental_push_matches_full_recompute() {
        let b = board(
            r"
########
#@     #
# $$   #
#  $  .#
#..   *#
########
",
        );
        let mut boxes = b.box_starts.clone();
        let mut incremental = Reachable::new(&b, &boxes, b.player_start);
        incremental.calculate();

        // greedily walk through a fixed sequence of legal pushes and
        // compare against a from-scratch flood after every one
        let mut player = b.player_start;
        for round in 0..40 {
            let mut applied = None;
            'outer: for i in 0..boxes.len() {
                let from = boxes[i];
                for &offset in &b.offsets {
                    let to = step(from, offset);
                    if incremental.is_reachable(step(from, -offset)) && !incremental.blocked(to) {
                        incremental.apply_push(from, to);
                        boxes[i] = to;
                        player = from;
                        applied = Some((from, to));
                        break 'outer;
                    }
                }
            }
            if applied.is_none() {
                break;
            }

            incremental.calculate();
            let full = fresh(&b, &boxes, player);
            assert_eq!(
                incremental.player_pos(),
                full.player_pos(),
                "round {}",
                round
            );
            for pos in 0..b.num_cells() {
                assert_eq!(
                    incremental.is_reachable(pos),
                    full.is_reachable(pos),
                    "round {} pos {}",
                    round,
                    pos
                );
            }
        }
    }

    #[test]
    fn incremental_pull_matches_full_recompute() {
        // backward view of the same layout: boxes sit on the goals and
        // get pulled away from them
        let b = board(
            r"
########
#@     #
# $$   #
#  $  .#
#..   *#
########
",
        );
        let mut boxes = b.goals.clone();
        let mut incremental = Reachable::new(&b, &boxes, b.player_start);
        incremental.calculate();

        let mut player = b.player_start;
        for round in 0..40 {
            let mut applied = None;
            'outer: for i in 0..boxes.len() {
                let from = boxes[i];
                for &offset in &b.offsets {
                    let to = step(from, -offset);
                    if !incremental.is_reachable(to) {
                        continue;
                    }
                    let beyond = step(from, -2 * offset);
                    if !incremental.blocked(beyond) {
                        incremental.apply_pull(from, to);
                        boxes[i] = to;
                        player = beyond;
                        applied = Some((from, to));
                        break 'outer;
                    }
                }
            }
            if applied.is_none() {
                break;
            }

            incremental.calculate();
            let full = fresh(&b, &boxes, player);
            assert_eq!(
                incremental.player_pos(),
                full.player_pos(),
                "round {}",
                round
            );
            for pos in 0..b.num_cells() {
                assert_eq!(
                    incremental.is_reachable(pos),
                    full.is_reachable(pos),
                    "round {} pos {}",
                    round,
                    pos
                );
            }
        }
    }

    #[test]
    fn push_into_free_corner_is_deadlock() {
        let b = board(
            r"
#####
#@$ #
#  .#
#####
",
        );
        let box_pos = 5 + 2;
        let mut r = fresh(&b, &[box_pos], b.player_start);
        // push right into the top-right area corner cell
        assert!(r.apply_push_checked(box_pos, box_pos + 1));
        // the rollback leaves the original occupancy
        assert!(r.blocked(box_pos));
        assert!(!r.blocked(box_pos + 1));
    }

    #[test]
    fn frozen_boxes_on_goals_are_no_deadlock() {
        // the whole 3-box cluster is frozen but parked on goals
        let b = board(
            r"
#####
#**@#
#*  #
#####
",
        );
        let mut r = fresh(&b, &b.box_starts, b.player_start);
        assert!(!r.is_box_push_deadlocked(5 + 1));
    }

    #[test]
    fn frozen_pair_off_goal_is_deadlock() {
        let b = board(
            r"
#####
#.$@#
#$  #
#.  #
#####
",
        );
        let top = 5 + 2;
        let left = 2 * 5 + 1;
        let mut r = fresh(&b, &[top, left], b.player_start);
        // pushing the top box onto the corner goal freezes the left box
        // with it, and that one is not on a goal
        assert!(r.apply_push_checked(top, top - 1));
        // occupancy rolled back
        assert!(r.blocked(top));
        assert!(!r.blocked(top - 1));
    }

    #[test]
    fn player_path_walks_around_boxes() {
        let b = board(
            r"
######
#@$ .#
#    #
######
",
        );
        let box_pos = 6 + 2;
        let mut r = fresh(&b, &[box_pos], b.player_start);
        let mut moves = Moves::new();
        r.append_player_path(b.player_start, 6 + 3, &mut moves);
        assert_eq!(moves.to_string(), "drru");
    }
}
