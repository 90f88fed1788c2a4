//! Test orchestration: iterate the extracted tests, drive one emulator
//! process per test, verify its output and aggregate the verdicts.

use std::io::IsTerminal;

use ansi_term::Colour;
use anyhow::Result;

use crate::emulator::{run_script, EmulatorConfig, Outcome};
use crate::script::{build_script, render};
use crate::testbench::Test;
use crate::timing::TimingModel;
use crate::verify::{TestReport, Verdict, Verifier};

/// Cap on failure messages printed per test.
const MAX_REPORTED_ERRORS: usize = 3;
/// Scripts longer than this are not echoed even in verbose mode.
const SCRIPT_ECHO_LIMIT: usize = 30;

/// Options for one orchestrated run.
#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    /// Restrict to these test numbers (empty means all).
    pub filter: Vec<u32>,
    /// Echo scripts and per-check outcomes.
    pub verbose: bool,
}

/// Aggregate verdict counts across every executed test.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Summary {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

pub struct Runner {
    config: EmulatorConfig,
    timing: TimingModel,
    verifier: Verifier,
    color: bool,
}

impl Runner {
    pub fn new(config: EmulatorConfig, timing: TimingModel) -> Self {
        Self {
            config,
            timing,
            verifier: Verifier::new(),
            color: std::io::stdout().is_terminal(),
        }
    }

    /// Run every selected test in order, one emulator process per test.
    /// Tests without checks are skipped: executing them would prove nothing.
    pub fn run(&self, tests: &[Test], opts: &RunOptions) -> Result<Summary> {
        let mut summary = Summary::default();

        println!("{}", "=".repeat(60));
        println!(" Running VHDL Tests on Emulator");
        println!("{}", "=".repeat(60));
        println!();

        for test in tests {
            if !opts.filter.is_empty() && !opts.filter.contains(&test.number) {
                continue;
            }
            println!("Test {}: {}", test.number, test.name);
            if test.check_count() == 0 {
                println!("  SKIP (no checks)");
                println!();
                summary.skipped += 1;
                continue;
            }

            let report = self.run_test(test, opts.verbose)?;
            summary.passed += report.passed;
            summary.failed += report.failed;

            if report.is_pass() {
                println!(
                    "  {} ({} checks)",
                    self.paint(Colour::Green, "PASS"),
                    report.passed
                );
            } else {
                println!(
                    "  {} ({} passed, {} failed)",
                    self.paint(Colour::Red, "FAIL"),
                    report.passed,
                    report.failed
                );
                for err in report.errors.iter().take(MAX_REPORTED_ERRORS) {
                    println!("    - {err}");
                }
            }
            println!();
        }

        println!("{}", "=".repeat(60));
        println!(
            " Results: {} passed, {} failed",
            summary.passed, summary.failed
        );
        println!("{}", "=".repeat(60));

        Ok(summary)
    }

    /// Build, drive and verify one test.
    fn run_test(&self, test: &Test, verbose: bool) -> Result<TestReport> {
        let script = build_script(test, &self.timing);
        if verbose {
            println!(
                "  Script ({} pokes, {} cycles, {} phases):",
                test.poke_count(),
                test.total_cycles(),
                test.phases.len()
            );
            if script.len() < SCRIPT_ECHO_LIMIT {
                for cmd in &script {
                    println!("    {cmd}");
                }
            }
        }

        let (status_ok, output, stderr) = match run_script(&self.config, &render(&script))? {
            Outcome::TimedOut => {
                tracing::warn!(test = test.number, "emulator timed out");
                return Ok(TestReport::timeout(test.check_count()));
            }
            Outcome::Completed {
                status,
                output,
                stderr,
            } => (status.success(), output, stderr),
        };
        if !status_ok {
            tracing::debug!(test = test.number, "emulator exited non-zero");
            if verbose && !stderr.is_empty() {
                let head: String = stderr.chars().take(200).collect();
                println!("  Emulator stderr: {head}");
            }
        }

        let outcomes = self.verifier.verify(&output, test.checks());
        if verbose {
            for o in &outcomes {
                match o.verdict {
                    Verdict::Passed => println!(
                        "    PASS: {} (${:04X} = ${:02X})",
                        o.check.label, o.check.addr, o.check.expected
                    ),
                    Verdict::Failed { expected, actual } => println!(
                        "    FAIL: {} (${:04X} = ${:02X}, expected ${:02X})",
                        o.check.label, o.check.addr, actual, expected
                    ),
                    Verdict::Unreadable => println!(
                        "    ERROR: Could not find ${:04X} in output",
                        o.check.addr
                    ),
                }
            }
        }
        Ok(TestReport::from_outcomes(&outcomes))
    }

    fn paint(&self, colour: Colour, text: &str) -> String {
        if self.color {
            colour.bold().paint(text).to_string()
        } else {
            text.to_string()
        }
    }
}

/// Print the extracted tests without executing anything.
pub fn list_tests(tests: &[Test], verbose: bool) {
    for test in tests {
        if verbose {
            println!("Test {}: {}", test.number, test.name);
            println!(
                "  Phases: {}, Total pokes: {}, Total checks: {}, Total cycles: {}",
                test.phases.len(),
                test.poke_count(),
                test.check_count(),
                test.total_cycles()
            );
            for (i, phase) in test.phases.iter().enumerate() {
                println!(
                    "  Phase {}: {} pokes, {} checks, {} cycles",
                    i + 1,
                    phase.pokes.len(),
                    phase.checks.len(),
                    phase.cycles
                );
                for &(addr, data) in phase.pokes.iter().take(3) {
                    println!("      poke(${addr:04X}, ${data:02X})");
                }
                if phase.pokes.len() > 3 {
                    println!("      ... and {} more pokes", phase.pokes.len() - 3);
                }
                for check in &phase.checks {
                    println!(
                        "      check(${:04X}, ${:02X}, \"{}\")",
                        check.addr, check.expected, check.label
                    );
                }
            }
            println!();
        } else {
            let phase_info = if test.phases.len() > 1 {
                format!(" ({} phases)", test.phases.len())
            } else {
                String::new()
            };
            println!("  {:3}  {}{}", test.number, test.name, phase_info);
        }
    }
}
