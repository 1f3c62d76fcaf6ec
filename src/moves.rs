use std::fmt;
use std::fmt::{Display, Formatter};

use crate::data::Dir;

/// One key press of a solution: a player step, pushing or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub dir: Dir,
    pub is_push: bool,
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_push {
            write!(f, "{}", self.dir.to_string().to_uppercase())
        } else {
            write!(f, "{}", self.dir)
        }
    }
}

/// A full solution in the usual lurd notation: lowercase walks, uppercase
/// pushes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Moves(Vec<Step>);

impl Moves {
    pub fn new() -> Moves {
        Moves(Vec::new())
    }

    pub fn add_walk(&mut self, dir: Dir) {
        self.0.push(Step {
            dir,
            is_push: false,
        });
    }

    pub fn add_push(&mut self, dir: Dir) {
        self.0.push(Step { dir, is_push: true });
    }

    pub fn steps(&self) -> &[Step] {
        &self.0
    }

    pub fn move_cnt(&self) -> usize {
        self.0.len()
    }

    pub fn push_cnt(&self) -> usize {
        self.0.iter().filter(|s| s.is_push).count()
    }
}

impl Display for Moves {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for step in &self.0 {
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}
