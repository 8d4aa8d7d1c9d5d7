//! Functional tests backed by an external command.

use std::process::Command;

use anyhow::{Result, bail};
use tracing::{debug, warn};

use super::{FunctionalTest, PlotSpec, RunContext, assert_not_deviated_from};
use crate::core::value::parse_results;
use crate::io::config::CommandTestConfig;
use crate::io::process::{CommandLimits, run_command_with_timeout};
use crate::io::store::{ResultSet, keys};

/// Keys the harness owns; a command may not overwrite them.
const RESERVED: [&str; 8] = [
    keys::STATUS,
    keys::DATE,
    keys::NAME,
    keys::SEED,
    keys::FUNK_VERSION,
    keys::FUNK_COMMIT,
    keys::TARGET_COMMIT,
    keys::HOSTNAME,
];

/// Runs a configured command and stores the `key: value` lines it prints.
///
/// The run's seed is exported as `FUNK_SEED` so the command can reproduce it.
pub struct CommandTest {
    config: CommandTestConfig,
    limits: CommandLimits,
}

impl CommandTest {
    pub fn new(config: CommandTestConfig, limits: CommandLimits) -> Self {
        Self { config, limits }
    }
}

impl FunctionalTest for CommandTest {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn run(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        let Some((program, args)) = self.config.command.split_first() else {
            bail!("command test {} has an empty command", self.config.name);
        };
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = &self.config.workdir {
            cmd.current_dir(dir);
        }
        if let Some(seed) = ctx.results.get(keys::SEED) {
            cmd.env("FUNK_SEED", seed.to_string());
        }

        let limits = self.limits.clone().with_tee(&ctx.log_path);
        let output = run_command_with_timeout(cmd, &limits)?;
        if output.timed_out {
            bail!(
                "command timed out after {}s",
                self.limits.timeout.as_secs()
            );
        }
        if !output.status.success() {
            bail!(
                "command exited with {}: {}",
                output.status,
                output.stderr_lossy().trim()
            );
        }

        let parsed = parse_results(&output.stdout_lossy());
        for message in &parsed.skipped {
            warn!(test = %self.config.name, "{message}");
        }
        for (key, value) in parsed.values {
            if RESERVED.contains(&key.as_str()) {
                warn!(test = %self.config.name, key = %key, "ignoring reserved key");
                continue;
            }
            debug!(key = %key, value = %value, "command result");
            ctx.results.set(&key, value)?;
        }
        if ctx.results.get(&self.config.variable).is_none() {
            warn!(
                test = %self.config.name,
                variable = %self.config.variable,
                "command did not print the analysed variable"
            );
        }
        Ok(())
    }

    fn analyse(&self, results: &ResultSet) -> Result<bool> {
        Ok(assert_not_deviated_from(
            self.config.expected,
            self.config.sigma,
            results,
            &self.config.variable,
        ))
    }

    fn plots(&self) -> Vec<PlotSpec> {
        vec![PlotSpec::new(&self.config.variable, &self.config.name)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::store::ResultWriter;
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::time::Duration;

    fn config(script: &str) -> CommandTestConfig {
        CommandTestConfig {
            name: "external".to_string(),
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            workdir: None,
            timeout_secs: None,
            variable: "y".to_string(),
            expected: 1.0,
            sigma: 0.1,
        }
    }

    fn run(script: &str, timeout: Duration) -> (Result<()>, ResultWriter) {
        let temp = tempfile::tempdir().expect("tempdir");
        let date = NaiveDate::from_ymd_opt(2018, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut writer = ResultWriter::new("external", date);
        writer.set(keys::SEED, 77i64).expect("seed");
        writer
            .set_text(keys::TARGET_COMMIT, "abc123")
            .expect("target commit");
        let test = CommandTest::new(config(script), CommandLimits::new(timeout, 4096));
        let mut ctx = RunContext {
            results: &mut writer,
            rng: StdRng::seed_from_u64(0),
            log_path: temp.path().join("external.log"),
        };
        let result = test.run(&mut ctx);
        (result, writer)
    }

    #[test]
    fn stores_parsed_stdout() {
        let (result, writer) = run(
            "echo 'y: 1.25'; echo 'seed: 3'; echo 'echoed: '$FUNK_SEED; echo junk",
            Duration::from_secs(5),
        );
        result.expect("run");
        assert_eq!(writer.get("y").and_then(|v| v.as_f64()), Some(1.25));
        assert_eq!(writer.get("echoed").and_then(|v| v.as_f64()), Some(77.0));
        assert_eq!(writer.get(keys::SEED).and_then(|v| v.as_f64()), Some(77.0));
    }

    #[test]
    fn command_cannot_overwrite_target_commit() {
        let (result, writer) = run(
            "echo 'y: 1.0'; echo 'target_commit: deadbeef'",
            Duration::from_secs(5),
        );
        result.expect("run");
        assert_eq!(
            writer.get(keys::TARGET_COMMIT).and_then(|v| v.as_str()),
            Some("abc123")
        );
    }

    #[test]
    fn non_zero_exit_fails() {
        let (result, _) = run("echo 'y: 1.0'; exit 3", Duration::from_secs(5));
        assert!(result.is_err());
    }

    #[test]
    fn timeout_fails() {
        let (result, _) = run("exec sleep 5", Duration::from_millis(200));
        let err = result.err().expect("timeout");
        assert!(err.to_string().contains("timed out"));
    }
}
