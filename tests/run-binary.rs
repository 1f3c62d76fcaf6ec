use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn solves_a_corridor_level() {
    Command::cargo_bin("bisoko")
        .unwrap()
        .args(&["--threads", "2", "levels/custom/01-corridor.txt"])
        .assert()
        .success()
        .stdout(contains("Found solution:"))
        .stdout(contains("rR"));
}

#[test]
fn reports_unsolvable_levels() {
    Command::cargo_bin("bisoko")
        .unwrap()
        .arg("levels/custom/no-solution.txt")
        .assert()
        .success()
        .stdout(contains("No solution"));
}

#[test]
fn missing_file_fails() {
    Command::cargo_bin("bisoko")
        .unwrap()
        .arg("levels/custom/does-not-exist.txt")
        .assert()
        .failure();
}

#[test]
fn bad_thread_count_fails() {
    Command::cargo_bin("bisoko")
        .unwrap()
        .args(&["--threads", "many", "levels/custom/01-corridor.txt"])
        .assert()
        .failure()
        .stderr(contains("--threads must be a number"));
}
