// Opt in to warnings about new 2018 idioms
#![warn(rust_2018_idioms)]
// Additional warnings that are allow by default (`rustc -W help`)
#![warn(trivial_casts)]
#![warn(trivial_numeric_casts)]

pub mod board;
pub mod data;
pub mod level;
pub mod moves;
pub mod solver;

mod distances;
mod parser;

use std::error::Error;
use std::fs;
use std::path::Path;

use crate::board::Board;
use crate::level::Level;
use crate::solver::{Solver, SolverErr, SolverOk};

pub trait LoadLevel {
    fn load_level(&self) -> Result<Level, Box<dyn Error>>;
}

impl<P: AsRef<Path>> LoadLevel for P {
    fn load_level(&self) -> Result<Level, Box<dyn Error>> {
        let text = fs::read_to_string(self)?;
        Ok(text.parse()?)
    }
}

pub trait Solve {
    /// Solves the level with `threads` workers per search direction.
    fn solve(&self, threads: usize) -> Result<SolverOk, SolverErr>;
}

impl Solve for Level {
    fn solve(&self, threads: usize) -> Result<SolverOk, SolverErr> {
        let board = Board::new(self)?;
        let solver = Solver::new(&board)?;
        Ok(solver.solve(threads))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_files_load_and_solve() {
        let cases = [
            ("levels/custom/00-solved.txt", true),
            ("levels/custom/01-corridor.txt", true),
            ("levels/custom/02-two-boxes.txt", true),
            ("levels/custom/03-microban-1.txt", true),
            ("levels/custom/no-solution.txt", false),
        ];
        for &(path, solvable) in &cases {
            let level = path.load_level().unwrap();
            let ok = level.solve(2).unwrap();
            assert_eq!(ok.moves.is_some(), solvable, "{}", path);
        }
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!("levels/custom/does-not-exist.txt".load_level().is_err());
    }
}
