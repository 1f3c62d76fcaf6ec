use crate::board::{Board, Cell};
use crate::data::{step, Dir, DIRECTIONS};
use crate::distances::MatchScratch;
use crate::moves::Moves;
use crate::solver::boxes::BoxPositions;
use crate::solver::reachable::Reachable;

/// One box move in 16 bits: direction in bits 0-1, the box cell in bits
/// 2-13, bit 14 flags that the player could also reach the far side of
/// the box when the move was generated, bit 15 tags backward-tree moves.
///
/// For pushes `box_pos` is the box's source cell, for pulls its
/// destination, so undoing a pull is a push with the identical encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackedMove(u16);

impl PackedMove {
    pub const NONE: PackedMove = PackedMove(0);

    pub fn new(box_pos: usize, dir: Dir, other_side_reachable: bool) -> PackedMove {
        let mut bits = ((box_pos as u16) << 2) | dir.index() as u16;
        if other_side_reachable {
            bits |= 1 << 14;
        }
        PackedMove(bits)
    }

    pub fn box_pos(self) -> usize {
        ((self.0 >> 2) & 0xfff) as usize
    }

    pub fn dir(self) -> Dir {
        Dir::from_index((self.0 & 3) as usize)
    }

    pub fn other_side_reachable(self) -> bool {
        self.0 & (1 << 14) != 0
    }

    pub fn is_backward(self) -> bool {
        self.0 & (1 << 15) != 0
    }

    pub fn backward(self) -> PackedMove {
        PackedMove(self.0 | 1 << 15)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn from_bits(bits: u16) -> PackedMove {
        PackedMove(bits)
    }
}

/// The mutable search state a worker drags along its tree: box positions,
/// reachability and an incrementally maintained box hash. States are
/// moved by applying and undoing moves, never cloned.
pub struct PuzzleState<'a> {
    board: &'a Board,
    boxes: BoxPositions,
    reachable: Reachable<'a>,
    box_hash: u64,
    scratch: MatchScratch,
}

impl<'a> PuzzleState<'a> {
    pub fn new(board: &'a Board, boxes: &[usize], player_pos: usize) -> PuzzleState<'a> {
        PuzzleState {
            board,
            boxes: BoxPositions::new(board.num_cells(), boxes),
            reachable: Reachable::new(board, boxes, player_pos),
            box_hash: board.box_hash(boxes),
            scratch: MatchScratch::new(),
        }
    }

    /// State identity: box hash XOR the player tag of the normalized
    /// player position.
    pub fn hash(&mut self) -> u64 {
        self.reachable.calculate();
        self.box_hash ^ self.board.player_tags[self.reachable.player_pos()]
    }

    pub fn boxes(&self) -> &[usize] {
        self.boxes.positions()
    }

    pub fn all_boxes_on_goals(&self) -> bool {
        self.boxes
            .positions()
            .iter()
            .all(|&b| self.board.cells[b].has(Cell::GOAL))
    }

    /// Every legal, not obviously dead push. The exact inverse of
    /// `came_from` is skipped when that move recorded the far side as
    /// reachable; the parent already generated the resulting state.
    pub fn possible_push_moves(&mut self, moves: &mut Vec<PackedMove>, came_from: PackedMove) {
        self.reachable.calculate();
        moves.clear();

        let mut came_from_offset = 0;
        let mut came_from_box = 0;
        if came_from.other_side_reachable() {
            came_from_offset = self.board.offset(came_from.dir());
            came_from_box = step(came_from.box_pos(), came_from_offset);
        }

        for &box_pos in self.boxes.positions() {
            for &dir in &DIRECTIONS {
                let offset = self.board.offset(dir);
                if !self.reachable.is_reachable(step(box_pos, -offset)) {
                    continue;
                }
                if box_pos == came_from_box && offset == -came_from_offset {
                    continue;
                }
                let to = step(box_pos, offset);
                if !self.reachable.blocked(to) && !self.board.cells[to].has(Cell::PUSH_DEAD) {
                    moves.push(PackedMove::new(
                        box_pos,
                        dir,
                        self.reachable.is_reachable(to),
                    ));
                }
            }
        }
    }

    /// Pull mirror of `possible_push_moves`: the player stands on the
    /// box's destination and backs away one further cell.
    pub fn possible_pull_moves(&mut self, moves: &mut Vec<PackedMove>, came_from: PackedMove) {
        self.reachable.calculate();
        moves.clear();

        let mut came_from_offset = 0;
        let mut came_from_box = 0;
        if came_from.other_side_reachable() {
            came_from_offset = self.board.offset(came_from.dir());
            came_from_box = came_from.box_pos();
        }

        for &box_pos in self.boxes.positions() {
            for &dir in &DIRECTIONS {
                let offset = self.board.offset(dir);
                if !self.reachable.is_reachable(step(box_pos, -offset)) {
                    continue;
                }
                if box_pos == came_from_box && offset == -came_from_offset {
                    continue;
                }
                let to = step(box_pos, -offset);
                if !self.reachable.blocked(step(box_pos, -2 * offset))
                    && !self.board.cells[to].has(Cell::PULL_DEAD)
                {
                    moves.push(PackedMove::new(to, dir, self.reachable.is_reachable(step(box_pos, offset))));
                }
            }
        }
    }

    /// Applies a push unless it deadlocks; returns whether it was applied.
    pub fn apply_push_checked(&mut self, mov: PackedMove) -> bool {
        let from = mov.box_pos();
        let to = step(from, self.board.offset(mov.dir()));
        if self.reachable.apply_push_checked(from, to) {
            return false;
        }
        self.boxes.move_box(from, to);
        self.box_hash ^= self.board.box_tags[from] ^ self.board.box_tags[to];
        true
    }

    /// Applies a pull unless it deadlocks; returns whether it was applied.
    pub fn apply_pull_checked(&mut self, mov: PackedMove) -> bool {
        let to = mov.box_pos();
        let from = step(to, self.board.offset(mov.dir()));
        if self.reachable.apply_pull_checked(from, to) {
            return false;
        }
        self.boxes.move_box(from, to);
        self.box_hash ^= self.board.box_tags[from] ^ self.board.box_tags[to];
        true
    }

    /// Applies either interpretation of an encoding without deadlock
    /// checks; used for undo and replay.
    pub fn apply_move(&mut self, mov: PackedMove, pull: bool) {
        let offset = self.board.offset(mov.dir());
        let mut from = mov.box_pos();
        let mut to = from;
        if pull {
            from = step(from, offset);
        } else {
            to = step(to, offset);
        }

        self.boxes.move_box(from, to);
        self.box_hash ^= self.board.box_tags[from] ^ self.board.box_tags[to];

        if pull {
            self.reachable.apply_pull(from, to);
        } else {
            self.reachable.apply_push(from, to);
        }
    }

    pub fn heuristic_push(&mut self) -> u32 {
        self.board
            .distances
            .push_heuristic(&self.board.cells, self.boxes.positions(), &mut self.scratch)
    }

    pub fn heuristic_pull(&mut self) -> u32 {
        self.board
            .distances
            .pull_heuristic(&self.board.cells, self.boxes.positions(), &mut self.scratch)
    }

    pub fn append_player_path(&mut self, player_pos: usize, target_pos: usize, moves: &mut Moves) {
        self.reachable
            .append_player_path(player_pos, target_pos, moves);
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

    #[test]
    fn packed_move_roundtrip() {
        for &(pos, dir, other) in &[
            (0usize, Dir::Left, false),
            (4095, Dir::Down, true),
            (1234, Dir::Up, false),
        ] {
            let mov = PackedMove::new(pos, dir, other);
            assert_eq!(mov.box_pos(), pos);
            assert_eq!(mov.dir(), dir);
            assert_eq!(mov.other_side_reachable(), other);
            assert!(!mov.is_backward());
            let back = mov.backward();
            assert!(back.is_backward());
            assert_eq!(back.box_pos(), pos);
            assert_eq!(PackedMove::from_bits(mov.bits()), mov);
        }
    }

    #[test]
    fn push_moves_avoid_dead_cells() {
        let b = board(
            r"
#####
#  @#
# $.#
#####
",
        );
        let mut state = PuzzleState::new(&b, &b.box_starts, b.player_start);
        let mut moves = Vec::new();
        state.possible_push_moves(&mut moves, PackedMove::NONE);
        // left and up would land in dead cells, down is a wall
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].box_pos(), 2 * 5 + 2);
        assert_eq!(moves[0].dir(), Dir::Right);
        assert!(moves[0].other_side_reachable());
    }

    #[test]
    fn pull_moves_need_two_cells_of_clearance() {
        let b = board(
            r"
#####
#  @#
# $.#
#####
",
        );
        // backward view: box on the goal, pulled away from it
        let mut state = PuzzleState::new(&b, &b.goals, b.player_start);
        let mut moves = Vec::new();
        state.possible_pull_moves(&mut moves, PackedMove::NONE);
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].box_pos(), 2 * 5 + 2);
        assert_eq!(moves[0].dir(), Dir::Right);
    }

    #[test]
    fn inverse_of_previous_push_is_skipped() {
        let b = board(
            r"
########
#@     #
#  $  .#
#      #
########
",
        );
        let mut state = PuzzleState::new(&b, &b.box_starts, b.player_start);
        let mut moves = Vec::new();
        state.possible_push_moves(&mut moves, PackedMove::NONE);
        // row 1 and row 3 are dead (no way to ever push back to the goal
        // row), so only left and right remain
        assert_eq!(moves.len(), 2);

        let right = *moves
            .iter()
            .find(|m| m.dir() == Dir::Right)
            .unwrap();
        assert!(state.apply_push_checked(right));
        state.possible_push_moves(&mut moves, right);
        // pushing straight on is the only option, the undo is filtered
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].dir(), Dir::Right);
    }

    #[test]
    fn undo_restores_hash_and_boxes() {
        let b = board(
            r"
########
#@     #
#  $  .#
#      #
########
",
        );
        let mut state = PuzzleState::new(&b, &b.box_starts, b.player_start);
        let hash0 = state.hash();
        let boxes0 = state.boxes().to_vec();

        let mut moves = Vec::new();
        state.possible_push_moves(&mut moves, PackedMove::NONE);
        let mov = moves[0];
        assert!(state.apply_push_checked(mov));
        assert_ne!(state.hash(), hash0);

        state.apply_move(mov, true);
        assert_eq!(state.hash(), hash0);
        assert_eq!(state.boxes(), &boxes0[..]);
    }

    #[test]
    fn hash_ignores_player_position_within_region() {
        let b = board(
            r"
########
#@     #
#  $  .#
#      #
########
",
        );
        let boxes = b.box_starts.clone();
        let mut at_start = PuzzleState::new(&b, &boxes, b.player_start);
        let mut at_corner = PuzzleState::new(&b, &boxes, 3 * 8 + 6);
        assert_eq!(at_start.hash(), at_corner.hash());
    }
}
