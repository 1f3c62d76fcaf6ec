//! Concurrent bidirectional best-first search.
//!
//! Forward workers push boxes from the start toward the goals, backward
//! workers pull boxes from the solved states toward the start. Both sides
//! share nothing but their visited-state stores; a state inserted by one
//! side and already present in the other is a meeting point and yields a
//! solution.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::Ordering::{Relaxed, SeqCst};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize};
use std::thread;

use log::{debug, info};
use separator::Separatable;

use crate::board::{Board, BoardErr, Cell};
use crate::data::step;
use crate::distances::UNREACHABLE;
use crate::moves::Moves;
use crate::solver::frontier::{Frontier, FrontierEntry};
use crate::solver::reconstruct::Replayer;
use crate::solver::state::{PackedMove, PuzzleState};
use crate::solver::table::{StateTable, EMPTY};

mod boxes;
mod frontier;
mod mark;
mod reachable;
mod reconstruct;
mod state;
mod sync;
mod table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverErr {
    IncompleteBorder,
    UnreachableBoxes,
    UnreachableGoals,
    /// Some box cannot reach any goal at all, not even with every other
    /// box out of the way.
    Infeasible,
}

impl Display for SolverErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SolverErr::IncompleteBorder => write!(f, "Incomplete border"),
            SolverErr::UnreachableBoxes => {
                write!(f, "Unreachable boxes - some boxes are not on goal but can't be reached")
            }
            SolverErr::UnreachableGoals => {
                write!(f, "Unreachable goals - some goals don't have a box but can't be reached")
            }
            SolverErr::Infeasible => {
                write!(f, "Infeasible - some box can never reach any goal")
            }
        }
    }
}

impl Error for SolverErr {}

impl From<BoardErr> for SolverErr {
    fn from(err: BoardErr) -> SolverErr {
        match err {
            BoardErr::IncompleteBorder => SolverErr::IncompleteBorder,
            BoardErr::UnreachableBoxes => SolverErr::UnreachableBoxes,
            BoardErr::UnreachableGoals => SolverErr::UnreachableGoals,
        }
    }
}

#[derive(Debug)]
pub struct SolverOk {
    /// `None` when the search space was exhausted without a solution or
    /// the search was stopped.
    pub moves: Option<Moves>,
    pub stats: Stats,
}

#[derive(Debug, Clone, Default)]
pub struct DirStats {
    pub expanded: usize,
    pub created: usize,
    pub duplicates: usize,
    pub deadlocks: usize,
    /// States in the visited store.
    pub visited: usize,
    /// Entries waiting in the frontier.
    pub open: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub forward: DirStats,
    pub backward: DirStats,
}

impl Stats {
    pub fn total_visited(&self) -> usize {
        self.forward.visited + self.backward.visited
    }
}

impl Display for DirStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} visited, {} open, {} expanded, {} duplicates, {} deadlocks",
            self.visited.separated_string(),
            self.open.separated_string(),
            self.expanded.separated_string(),
            self.duplicates.separated_string(),
            self.deadlocks.separated_string(),
        )
    }
}

impl Display for Stats {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "forward:  {}", self.forward)?;
        write!(f, "backward: {}", self.backward)
    }
}

/// One search direction: its visited store, its frontier and its counters.
struct Side {
    table: StateTable,
    frontier: Frontier,
    expanded: AtomicUsize,
    created: AtomicUsize,
    duplicates: AtomicUsize,
    deadlocks: AtomicUsize,
}

impl Side {
    fn new() -> Side {
        Side {
            table: StateTable::with_capacity(1 << 16),
            frontier: Frontier::new(),
            expanded: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            duplicates: AtomicUsize::new(0),
            deadlocks: AtomicUsize::new(0),
        }
    }

    fn stats(&self) -> DirStats {
        DirStats {
            expanded: self.expanded.load(Relaxed),
            created: self.created.load(Relaxed),
            duplicates: self.duplicates.load(Relaxed),
            deadlocks: self.deadlocks.load(Relaxed),
            visited: self.table.len(),
            open: self.frontier.len(),
        }
    }
}

pub struct Solver<'a> {
    board: &'a Board,
    fwd: Side,
    bwd: Side,
    fwd_root: u64,
    /// Root hash and a player cell for every player region of the solved
    /// board.
    bwd_roots: Vec<(u64, usize)>,
    /// Meeting state hash, 0 while the trees have not met.
    solution: AtomicU64,
    done: AtomicBool,
    idle: AtomicUsize,
    wakeups: AtomicUsize,
}

impl<'a> Solver<'a> {
    /// Seeds both searches. The forward root is the start state; the
    /// backward side gets one root per connected player region of the
    /// solved board, all inserted as meeting targets and enqueued when a
    /// box can actually be pulled back from that region.
    pub fn new(board: &'a Board) -> Result<Solver<'a>, SolverErr> {
        let fwd = Side::new();
        let bwd = Side::new();

        let mut start = PuzzleState::new(board, &board.box_starts, board.player_start);
        let heuristic = start.heuristic_push();
        if heuristic >= UNREACHABLE {
            return Err(SolverErr::Infeasible);
        }
        let fwd_root = start.hash();
        fwd.table.try_add(fwd_root, EMPTY, PackedMove::NONE);
        fwd.created.fetch_add(1, Relaxed);
        fwd.frontier.push(
            heuristic,
            FrontierEntry {
                hash: fwd_root,
                depth: 0,
                root: 0,
            },
        );

        let mut bwd_roots = Vec::new();
        let mut seen = vec![false; board.num_cells()];
        for &goal in &board.goals {
            // goals hold the boxes of the solved board
            seen[goal] = true;
        }
        for pos in 0..board.num_cells() {
            if seen[pos] || board.cells[pos].has(Cell::WALL) {
                continue;
            }
            let mut to_visit = vec![pos];
            seen[pos] = true;
            while let Some(p) = to_visit.pop() {
                for &offset in &board.offsets {
                    let new_pos = step(p, offset);
                    if !seen[new_pos] && !board.cells[new_pos].has(Cell::WALL) {
                        seen[new_pos] = true;
                        to_visit.push(new_pos);
                    }
                }
            }

            let mut solved = PuzzleState::new(board, &board.goals, pos);
            let hash = solved.hash();
            if !bwd.table.try_add(hash, EMPTY, PackedMove::NONE) {
                continue;
            }
            bwd.created.fetch_add(1, Relaxed);
            let root = bwd_roots.len() as u32;
            bwd_roots.push((hash, pos));

            let heuristic = solved.heuristic_pull();
            if heuristic < UNREACHABLE {
                bwd.frontier.push(heuristic, FrontierEntry { hash, depth: 0, root });
            }
        }
        debug!("{} backward root(s)", bwd_roots.len());

        let solution = AtomicU64::new(0);
        if bwd.table.contains(fwd_root) {
            // already solved
            solution.store(fwd_root, Relaxed);
        }

        Ok(Solver {
            board,
            fwd,
            bwd,
            fwd_root,
            bwd_roots,
            solution,
            done: AtomicBool::new(false),
            idle: AtomicUsize::new(0),
            wakeups: AtomicUsize::new(0),
        })
    }

    /// Runs `threads` workers per direction to completion and stitches
    /// the solution together if the trees met.
    pub fn solve(&self, threads: usize) -> SolverOk {
        let threads = threads.max(1);
        info!("searching with {} worker(s) per direction", threads);

        thread::scope(|s| {
            for _ in 0..threads {
                s.spawn(|| self.work(true, threads * 2));
                s.spawn(|| self.work(false, threads * 2));
            }
        });

        let meet = self.solution.load(SeqCst);
        let moves = if meet != 0 {
            let moves =
                reconstruct::solution_moves(self.board, &self.fwd.table, &self.bwd.table, meet);
            info!(
                "solution found: {} moves, {} pushes",
                moves.move_cnt(),
                moves.push_cnt()
            );
            Some(moves)
        } else {
            info!("no solution found");
            None
        };
        SolverOk {
            moves,
            stats: self.stats(),
        }
    }

    /// Makes every worker return as soon as it notices; safe to call from
    /// another thread while `solve` runs.
    pub fn stop(&self) {
        self.done.store(true, SeqCst);
    }

    /// Live snapshot for progress reporting.
    pub fn stats(&self) -> Stats {
        Stats {
            forward: self.fwd.stats(),
            backward: self.bwd.stats(),
        }
    }

    fn work(&self, forward: bool, total_workers: usize) {
        let (side, other) = if forward {
            (&self.fwd, &self.bwd)
        } else {
            (&self.bwd, &self.fwd)
        };

        // one private state per tree root, moved around by replaying moves
        let mut states: Vec<(PuzzleState<'_>, u64)> = if forward {
            vec![(
                PuzzleState::new(self.board, &self.board.box_starts, self.board.player_start),
                self.fwd_root,
            )]
        } else {
            self.bwd_roots
                .iter()
                .map(|&(hash, player)| (PuzzleState::new(self.board, &self.board.goals, player), hash))
                .collect()
        };
        let mut moves = Vec::new();
        let mut replayer = Replayer::new();

        loop {
            if self.done.load(SeqCst) || self.solution.load(SeqCst) != 0 {
                return;
            }
            let entry = match side.frontier.try_pop() {
                Some(entry) => entry,
                None => match self.wait_for_work(side, total_workers) {
                    Some(entry) => entry,
                    None => return,
                },
            };

            let (state, at) = &mut states[entry.root as usize];
            replayer.replay(state, &side.table, *at, entry.hash);
            *at = entry.hash;
            side.expanded.fetch_add(1, Relaxed);

            let came_from = match side.table.get(entry.hash) {
                Some((_, mov)) => mov,
                None => PackedMove::NONE,
            };
            if forward {
                state.possible_push_moves(&mut moves, came_from);
            } else {
                state.possible_pull_moves(&mut moves, came_from);
            }

            for i in 0..moves.len() {
                let mov = moves[i];
                let applied = if forward {
                    state.apply_push_checked(mov)
                } else {
                    state.apply_pull_checked(mov)
                };
                if !applied {
                    side.deadlocks.fetch_add(1, Relaxed);
                    continue;
                }

                let child = state.hash();
                let stored = if forward { mov } else { mov.backward() };
                if side.table.try_add(child, entry.hash, stored) {
                    side.created.fetch_add(1, Relaxed);
                    if other.table.contains(child) {
                        // the trees meet in this state
                        let _ = self.solution.compare_exchange(0, child, SeqCst, SeqCst);
                        state.apply_move(mov, forward);
                        break;
                    }
                    let heuristic = if forward {
                        state.heuristic_push()
                    } else {
                        state.heuristic_pull()
                    };
                    // saturated children stay in the store as meeting
                    // targets but are never expanded
                    if heuristic < UNREACHABLE {
                        let depth = entry.depth + 1;
                        side.frontier.push(
                            depth + heuristic,
                            FrontierEntry {
                                hash: child,
                                depth,
                                root: entry.root,
                            },
                        );
                    }
                } else {
                    side.duplicates.fetch_add(1, Relaxed);
                }
                // undoing a push is a pull of the same encoding and vice
                // versa
                state.apply_move(mov, forward);
            }
        }
    }

    /// Parks an out-of-work worker. Returns `None` when the search is
    /// over: a solution was found, `stop` was called, or all workers sat
    /// idle over two empty frontiers (exhaustion).
    fn wait_for_work(&self, side: &Side, total_workers: usize) -> Option<FrontierEntry> {
        self.idle.fetch_add(1, SeqCst);
        loop {
            if self.done.load(SeqCst) || self.solution.load(SeqCst) != 0 {
                self.idle.fetch_sub(1, SeqCst);
                return None;
            }

            // Exhaustion check. Every worker bumps `wakeups` between
            // leaving the idle set and popping, so an unchanged count
            // around the idle and emptiness reads proves no worker went
            // from idle to expanding in the window. All idle plus both
            // frontiers empty then means no new entries can ever appear.
            let wakeups = self.wakeups.load(SeqCst);
            let all_idle = self.idle.load(SeqCst) == total_workers;
            let empty = self.fwd.frontier.len() == 0 && self.bwd.frontier.len() == 0;
            if all_idle && empty && self.wakeups.load(SeqCst) == wakeups {
                self.done.store(true, SeqCst);
                self.idle.fetch_sub(1, SeqCst);
                return None;
            }

            self.idle.fetch_sub(1, SeqCst);
            self.wakeups.fetch_add(1, SeqCst);
            if let Some(entry) = side.frontier.try_pop() {
                return Some(entry);
            }
            self.idle.fetch_add(1, SeqCst);
            thread::yield_now();
        }
    }
}
