//! CLI tests for the funk binary.
//!
//! Spawns `funk` against a scratch working directory holding a `funk.toml`
//! with a single command-backed test, and checks output and exit codes.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use funk::exit_codes;

fn write_config(root: &Path, expected: f64) {
    let config = format!(
        r#"store = "files"

[[command_tests]]
name = "external"
command = ["sh", "-c", "echo 'y: 1.0'"]
variable = "y"
expected = {expected:?}
sigma = 0.1
"#
    );
    fs::write(root.join("funk.toml"), config).expect("write config");
}

fn funk(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_funk"))
        .current_dir(root)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("spawn funk")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn run_then_analyse_passes_quietly() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_config(temp.path(), 1.0);

    let run = funk(temp.path(), &["run", "external", "-r", "2"]);
    assert_eq!(run.status.code(), Some(exit_codes::OK), "{run:?}");
    let results: Vec<_> = fs::read_dir(temp.path().join("results"))
        .expect("results dir")
        .collect();
    assert_eq!(results.len(), 2);

    let analyse = funk(temp.path(), &["analyse", "external"]);
    assert_eq!(analyse.status.code(), Some(exit_codes::OK), "{analyse:?}");
    assert_eq!(stdout(&analyse), "external: ok\n");
    assert!(analyse.stderr.is_empty(), "{analyse:?}");
}

#[test]
fn malformed_result_lines_do_not_reach_stderr() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_config(temp.path(), 1.0);
    let run = funk(temp.path(), &["run", "external"]);
    assert_eq!(run.status.code(), Some(exit_codes::OK), "{run:?}");

    let result = fs::read_dir(temp.path().join("results"))
        .expect("results dir")
        .next()
        .expect("one result")
        .expect("entry")
        .path();
    let mut contents = fs::read_to_string(&result).expect("read result");
    contents.push_str("this line has no separator\n");
    fs::write(&result, contents).expect("write result");

    let analyse = funk(temp.path(), &["analyse", "external"]);
    assert_eq!(analyse.status.code(), Some(exit_codes::OK), "{analyse:?}");
    assert_eq!(stdout(&analyse), "external: ok\n");
    assert!(analyse.stderr.is_empty(), "{analyse:?}");
}

#[test]
fn failing_analysis_writes_stderr_and_exits_2() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_config(temp.path(), 5.0);

    let run = funk(temp.path(), &["run", "external"]);
    assert_eq!(run.status.code(), Some(exit_codes::OK), "{run:?}");

    let analyse = funk(temp.path(), &["analyse", "--last"]);
    assert_eq!(analyse.status.code(), Some(exit_codes::ANALYSIS_FAILED));
    assert_eq!(stdout(&analyse), "external: FAILED\n");
    assert_eq!(
        String::from_utf8_lossy(&analyse.stderr),
        "analysis failed: external\n"
    );
}

#[test]
fn list_and_report_cover_the_suite() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_config(temp.path(), 1.0);
    assert!(funk(temp.path(), &["run", "external", "--plot"]).status.success());

    let list = funk(temp.path(), &["list"]);
    assert!(list.status.success());
    let lines: Vec<String> = stdout(&list).lines().map(str::to_string).collect();
    assert!(lines.iter().any(|l| l.starts_with("test1") && l.ends_with("never")));
    let last = lines.last().expect("lines");
    assert!(last.starts_with("external") && !last.ends_with("never"));

    let report = funk(temp.path(), &["report"]);
    assert!(report.status.success(), "{report:?}");
    let contents = fs::read_to_string(temp.path().join("report.md")).expect("report");
    assert!(contents.starts_with("# Functional testing report"));
    assert!(contents.contains("| external |"));
    assert!(contents.contains("](plots/external-"));
}

#[test]
fn unknown_test_is_an_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_config(temp.path(), 1.0);
    let run = funk(temp.path(), &["run", "nope"]);
    assert_eq!(run.status.code(), Some(exit_codes::ERROR));
    assert!(String::from_utf8_lossy(&run.stderr).contains("unknown test 'nope'"));
}
