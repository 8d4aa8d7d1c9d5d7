//! End-to-end harness flow through the library API with the SQLite store.

use funk::analyse::{AnalyseTarget, analyse};
use funk::harness::Harness;
use funk::io::config::{FunkConfig, StoreKind};
use funk::io::store::{keys, status};
use funk::report::write_test_report;
use funk::run::{RunOptions, run_tests};
use funk::suite::Registry;
use funk::test_support::ScriptedTest;

fn sqlite_harness(root: &std::path::Path) -> Harness {
    let config = FunkConfig {
        store: StoreKind::Sqlite,
        ..FunkConfig::default()
    };
    let mut registry = Registry::new();
    registry
        .add(Box::new(ScriptedTest::passing("alpha", 1.0)))
        .expect("add alpha");
    let mut beta = ScriptedTest::passing("beta", 3.0);
    beta.passes = false;
    registry.add(Box::new(beta)).expect("add beta");
    Harness::with_registry(root, config, registry).expect("harness")
}

#[test]
fn next_runs_cycle_through_suite_and_analyse() {
    let temp = tempfile::tempdir().expect("tempdir");
    let harness = sqlite_harness(temp.path());

    let outcomes = run_tests(
        &harness,
        &RunOptions {
            name: None,
            next: true,
            plot: true,
            repeats: 2,
        },
    )
    .expect("run");
    let names: Vec<&str> = outcomes.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
    assert!(harness.paths.database_path.exists());

    let alpha = harness.store.load("alpha").expect("load");
    assert_eq!(alpha.len(), 1);
    let record = &alpha.records()[0];
    assert_eq!(
        record.get(keys::STATUS).and_then(|v| v.as_str()),
        Some(status::DONE)
    );
    assert_eq!(
        record.get(keys::FUNK_VERSION).and_then(|v| v.as_str()),
        Some(env!("CARGO_PKG_VERSION"))
    );

    let verdicts = analyse(&harness, &AnalyseTarget::All).expect("analyse");
    assert!(verdicts[0].passed);
    assert!(!verdicts[1].passed);

    let last = analyse(&harness, &AnalyseTarget::Last).expect("analyse last");
    assert_eq!(last[0].name, "beta");

    let report = std::fs::read_to_string(write_test_report(&harness).expect("report"))
        .expect("read report");
    assert!(report.contains("| alpha |"));
    assert!(report.contains("| FAILED |"));
}
