#![warn(rust_2018_idioms)]

#[macro_use]
extern crate prettytable;

use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::thread;
use std::time::Duration;

use clap::{App, Arg};
use prettytable::Table;
use separator::Separatable;

use bisoko::board::Board;
use bisoko::solver::{Solver, SolverOk, Stats};
use bisoko::LoadLevel;

fn main() {
    env_logger::init();

    let matches = App::new("bisoko")
        .about("Concurrent bidirectional Sokoban solver")
        .arg(Arg::with_name("file").required(true).help("Level in XSB format"))
        .arg(
            Arg::with_name("threads")
                .short("t")
                .long("threads")
                .takes_value(true)
                .help("Workers per search direction (default: half the available cores)"),
        )
        .arg(
            Arg::with_name("max-states")
                .long("max-states")
                .takes_value(true)
                .help("Abort after visiting this many states"),
        )
        .arg(
            Arg::with_name("status")
                .short("s")
                .long("status")
                .help("Print search statistics every second"),
        )
        .get_matches();

    let path = matches.value_of("file").unwrap();
    let threads = match matches.value_of("threads") {
        Some(t) => t.parse().unwrap_or_else(|_| {
            eprintln!("--threads must be a number");
            process::exit(1);
        }),
        None => default_threads(),
    };
    let max_states: Option<usize> = matches.value_of("max-states").map(|m| {
        m.parse().unwrap_or_else(|_| {
            eprintln!("--max-states must be a number");
            process::exit(1);
        })
    });
    let status = matches.is_present("status");

    let level = path.load_level().unwrap_or_else(|err| {
        eprintln!("Can't load level {}: {}", path, err);
        process::exit(1);
    });
    let board = Board::new(&level).unwrap_or_else(|err| {
        eprintln!("Invalid level: {}", err);
        process::exit(1);
    });
    let solver = Solver::new(&board).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(1);
    });

    println!("Solving...");
    let finished = AtomicBool::new(false);
    let ok = thread::scope(|s| {
        s.spawn(|| poll_progress(&solver, &finished, status, max_states));
        let ok = solver.solve(threads);
        finished.store(true, Relaxed);
        ok
    });

    print_result(&ok);
}

fn default_threads() -> usize {
    thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}

fn poll_progress(solver: &Solver<'_>, finished: &AtomicBool, status: bool, max_states: Option<usize>) {
    let mut ticks = 0;
    loop {
        thread::sleep(Duration::from_millis(100));
        if finished.load(Relaxed) {
            return;
        }
        ticks += 1;
        if ticks % 10 != 0 {
            continue;
        }

        let stats = solver.stats();
        if status {
            println!("{}", stats);
        }
        if let Some(max) = max_states {
            if stats.total_visited() >= max {
                println!("State limit reached, aborting");
                solver.stop();
                return;
            }
        }
    }
}

fn print_result(ok: &SolverOk) {
    match &ok.moves {
        Some(moves) => {
            println!("Found solution:");
            println!("{}", moves);
            println!(
                "{} moves, {} pushes",
                moves.move_cnt().separated_string(),
                moves.push_cnt().separated_string()
            );
        }
        None => println!("No solution"),
    }
    print_stats(&ok.stats);
}

fn print_stats(stats: &Stats) {
    let mut table = Table::new();
    table.add_row(row![
        "", "visited", "open", "expanded", "duplicates", "deadlocks"
    ]);
    for (name, dir) in &[("forward", &stats.forward), ("backward", &stats.backward)] {
        table.add_row(row![
            name,
            dir.visited.separated_string(),
            dir.open.separated_string(),
            dir.expanded.separated_string(),
            dir.duplicates.separated_string(),
            dir.deadlocks.separated_string()
        ]);
    }
    table.printstd();
}
