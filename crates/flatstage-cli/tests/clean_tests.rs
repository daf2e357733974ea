//! CLI tests for the record repair filter

#![allow(clippy::unwrap_used, clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn clean_reassembles_multiline_records_from_stdin() {
    Command::cargo_bin("flatstage")
        .unwrap()
        .arg("clean")
        .write_stdin("first\nsecond#=#\nsolo#=#\n")
        .assert()
        .success()
        .stdout("first\\\nsecond\nsolo\n");
}

#[test]
fn clean_escapes_tabs_and_drops_control_chars() {
    Command::cargo_bin("flatstage")
        .unwrap()
        .arg("clean")
        .write_stdin("a\tb\u{7}c#=#\n")
        .assert()
        .success()
        .stdout("a\\\tbc\n");
}

#[test]
fn clean_emits_trailing_unterminated_record() {
    Command::cargo_bin("flatstage")
        .unwrap()
        .arg("clean")
        .write_stdin("done#=#\ndangling without terminator\n")
        .assert()
        .success()
        .stdout("done\ndangling without terminator\n");
}

#[test]
fn clean_round_trips_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("raw.bcp");
    let output = dir.path().join("clean.bcp");
    std::fs::write(&input, "1&=&Kit#=#\n2&=&Pax6#=#\n").unwrap();

    Command::cargo_bin("flatstage")
        .unwrap()
        .arg("clean")
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    assert_eq!(
        std::fs::read_to_string(output).unwrap(),
        "1&=&Kit\n2&=&Pax6\n"
    );
}

#[test]
fn checksum_reports_recorded_and_missing_values() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker.checksum"), "1234\n").unwrap();

    Command::cargo_bin("flatstage")
        .unwrap()
        .arg("checksum")
        .arg("marker")
        .arg("--data-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("marker: 1234"));

    Command::cargo_bin("flatstage")
        .unwrap()
        .arg("checksum")
        .arg("probe")
        .arg("--data-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("no checksum recorded"));
}
