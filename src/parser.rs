use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::board::Cell;
use crate::data::MAX_CELLS;
use crate::level::Level;

#[derive(Debug, PartialEq)]
pub enum ParserErr {
    Pos(usize, usize),
    TooLarge,
    MultiplePlayers,
    NoPlayer,
    BoxesGoals(usize, usize),
}

impl Display for ParserErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            ParserErr::Pos(r, c) => write!(f, "Invalid cell at pos: [{}, {}]", r, c),
            ParserErr::TooLarge => write!(f, "Map larger than {} cells", MAX_CELLS),
            ParserErr::MultiplePlayers => write!(f, "More than one player"),
            ParserErr::NoPlayer => write!(f, "No player"),
            ParserErr::BoxesGoals(boxes, goals) => {
                write!(f, "{} boxes but {} goals", boxes, goals)
            }
        }
    }
}

impl std::error::Error for ParserErr {}

impl FromStr for Level {
    type Err = ParserErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_xsb(s)
    }
}

/// Parses (a subset of) the format described
/// [here](http://www.sokobano.de/wiki/index.php?title=Level_format)
pub fn parse_xsb(level: &str) -> Result<Level, ParserErr> {
    // trim so we can specify levels using raw strings more easily
    let level = level.trim_matches('\n').trim_end();

    let mut rows: Vec<Vec<Cell>> = Vec::new();
    let mut row_boxes = Vec::new();
    let mut row_goals = Vec::new();
    let mut player = None;

    for (r, line) in level.lines().enumerate() {
        let mut row = Vec::new();
        for (c, cur_char) in line.chars().enumerate() {
            let mut cell = Cell::EMPTY;
            match cur_char {
                '#' => cell.insert(Cell::WALL),
                '@' => {
                    if player.is_some() {
                        return Err(ParserErr::MultiplePlayers);
                    }
                    player = Some((r, c));
                    cell.insert(Cell::PLAYER_START);
                }
                '+' => {
                    if player.is_some() {
                        return Err(ParserErr::MultiplePlayers);
                    }
                    player = Some((r, c));
                    cell.insert(Cell::PLAYER_START);
                    cell.insert(Cell::GOAL);
                    row_goals.push((r, c));
                }
                '$' => {
                    cell.insert(Cell::BOX_START);
                    row_boxes.push((r, c));
                }
                '*' => {
                    cell.insert(Cell::BOX_START);
                    cell.insert(Cell::GOAL);
                    row_boxes.push((r, c));
                    row_goals.push((r, c));
                }
                '.' => {
                    cell.insert(Cell::GOAL);
                    row_goals.push((r, c));
                }
                ' ' | '-' | '_' => {}
                _ => return Err(ParserErr::Pos(r, c)),
            }
            row.push(cell);
        }
        rows.push(row);
    }

    let player = player.ok_or(ParserErr::NoPlayer)?;
    if row_boxes.len() != row_goals.len() {
        return Err(ParserErr::BoxesGoals(row_boxes.len(), row_goals.len()));
    }

    let width = rows.iter().map(|row| row.len()).max().unwrap_or(0);
    if width * rows.len() > MAX_CELLS {
        return Err(ParserErr::TooLarge);
    }

    let mut cells = Vec::with_capacity(width * rows.len());
    for mut row in rows {
        row.resize(width, Cell::EMPTY);
        cells.extend(row);
    }

    let flat = |(r, c): (usize, usize)| r * width + c;
    Ok(Level {
        width,
        cells,
        player_pos: flat(player),
        boxes: row_boxes.into_iter().map(flat).collect(),
        goals: row_goals.into_iter().map(flat).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_empty() {
        assert_failure("", ParserErr::NoPlayer);
    }

    #[test]
    fn fail_no_player() {
        let level = r"
#####
#   #
#####
";
        assert_failure(level, ParserErr::NoPlayer);
    }

    #[test]
    fn fail_invalid_char() {
        let level = r"
#####
#@X.#
#####
";
        assert_failure(level, ParserErr::Pos(1, 2));
    }

    #[test]
    fn fail_multiple_players() {
        let level = r"
######
#@ @.#
######
";
        assert_failure(level, ParserErr::MultiplePlayers);
    }

    #[test]
    fn fail_box_goal_mismatch() {
        let level = r"
######
#@$$.#
######
";
        assert_failure(level, ParserErr::BoxesGoals(2, 1));
    }

    #[test]
    fn simplest() {
        let level: Level = r"
#####
#@$.#
#####
"
        .parse()
        .unwrap();
        assert_eq!(level.width, 5);
        assert_eq!(level.player_pos, 5 + 1);
        assert_eq!(level.boxes, vec![5 + 2]);
        assert_eq!(level.goals, vec![5 + 3]);
    }

    #[test]
    fn player_and_box_on_goals() {
        // the player's goal is matched by the plain box
        let level: Level = r"
#####
#+*$#
#####
"
        .parse()
        .unwrap();
        assert_eq!(level.player_pos, 5 + 1);
        assert_eq!(level.boxes, vec![5 + 2, 5 + 3]);
        assert_eq!(level.goals, vec![5 + 1, 5 + 2]);
    }

    #[test]
    fn size_limit_is_exclusive() {
        // 64x64 fills the cell cap exactly, one more row goes over
        let mut rows = vec!["#".repeat(64)];
        for _ in 0..62 {
            rows.push(format!("#{}#", " ".repeat(62)));
        }
        rows.push("#".repeat(64));
        let at_cap = rows.join("\n").replacen("# ", "#@", 1);
        assert!(at_cap.parse::<Level>().is_ok());

        let over_cap = format!("{}\n{}", "#".repeat(64), at_cap);
        assert_failure(&over_cap, ParserErr::TooLarge);
    }

    #[test]
    fn ragged_rows_padded() {
        let level: Level = r"
  ####
###@ #
# $. #
######
"
        .parse()
        .unwrap();
        assert_eq!(level.width, 6);
        assert_eq!(level.cells.len(), 24);
    }

    fn assert_failure(input: &str, expected: ParserErr) {
        assert_eq!(input.parse::<Level>().unwrap_err(), expected);
    }
}
