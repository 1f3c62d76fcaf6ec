use fnv::FnvHashSet;

use crate::board::Board;
use crate::data::step;
use crate::moves::Moves;
use crate::solver::state::{PackedMove, PuzzleState};
use crate::solver::table::{StateTable, EMPTY};

/// Fills `out` with the chain from `hash` up to its tree root, entry by
/// entry (node hash plus the move that created it; the root carries a
/// null move).
fn chain(table: &StateTable, mut hash: u64, out: &mut Vec<(u64, PackedMove)>) {
    out.clear();
    while let Some((parent, mov)) = table.get(hash) {
        out.push((hash, mov));
        if parent == EMPTY {
            return;
        }
        hash = parent;
    }
    debug_assert!(false, "parent chain leads outside the store");
}

/// Moves a worker's puzzle state between two nodes of the same tree by
/// undoing up to the lowest common ancestor and replaying down the other
/// branch. Buffers are reused across calls.
pub struct Replayer {
    up: Vec<(u64, PackedMove)>,
    down: Vec<(u64, PackedMove)>,
    seen: FnvHashSet<u64>,
}

impl Replayer {
    pub fn new() -> Replayer {
        Replayer {
            up: Vec::new(),
            down: Vec::new(),
            seen: FnvHashSet::default(),
        }
    }

    pub fn replay(
        &mut self,
        state: &mut PuzzleState<'_>,
        table: &StateTable,
        current: u64,
        target: u64,
    ) {
        if current == target {
            return;
        }
        chain(table, current, &mut self.up);
        chain(table, target, &mut self.down);

        self.seen.clear();
        for &(hash, _) in &self.up {
            self.seen.insert(hash);
        }
        // both chains end in the same root, so this always terminates
        let mut lca = 0;
        let mut branch = self.down.len();
        for (i, &(hash, _)) in self.down.iter().enumerate() {
            if self.seen.contains(&hash) {
                lca = hash;
                branch = i;
                break;
            }
        }

        for &(hash, mov) in &self.up {
            if hash == lca {
                break;
            }
            // undoing a push is a pull of the same encoding and vice versa
            state.apply_move(mov, !mov.is_backward());
        }
        for &(_, mov) in self.down[..branch].iter().rev() {
            state.apply_move(mov, mov.is_backward());
        }
    }
}

/// Stitches the full move sequence together once the trees have met at
/// `meet`: the forward chain reversed gives the pushes from the start to
/// the meeting state, the backward chain in order gives the remaining
/// pushes to the solved state (each entry's pull, undone). The pushes are
/// then replayed from the start with the player's literal cell tracked so
/// the walks in between can be emitted too.
pub fn solution_moves(board: &Board, fwd: &StateTable, bwd: &StateTable, meet: u64) -> Moves {
    let mut fwd_chain = Vec::new();
    let mut bwd_chain = Vec::new();
    chain(fwd, meet, &mut fwd_chain);
    chain(bwd, meet, &mut bwd_chain);

    let mut moves = Moves::new();
    let mut state = PuzzleState::new(board, &board.box_starts, board.player_start);
    let mut player = board.player_start;

    let pushes = fwd_chain
        .iter()
        .rev()
        .chain(bwd_chain.iter())
        .map(|&(_, mov)| mov)
        .filter(|&mov| mov != PackedMove::NONE);
    for mov in pushes {
        let offset = board.offset(mov.dir());
        let box_pos = mov.box_pos();
        state.append_player_path(player, step(box_pos, -offset), &mut moves);
        moves.add_push(mov.dir());
        state.apply_move(mov, false);
        player = box_pos;
    }

    debug_assert!(state.all_boxes_on_goals());
    moves
}
