//! Parse the emulator's memory-dump output and judge each assertion.

use std::collections::HashMap;

use regex::Regex;

use crate::testbench::Check;

/// Outcome of a single assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    /// Value mismatch, both sides recorded.
    Failed { expected: u8, actual: u8 },
    /// The address never appeared in the captured output, which is a
    /// different failure from a wrong value.
    Unreadable,
}

#[derive(Debug)]
pub struct CheckOutcome<'a> {
    pub check: &'a Check,
    pub verdict: Verdict,
}

/// Per-test verdict counts plus the rendered failure messages.
#[derive(Debug, Default, Clone)]
pub struct TestReport {
    pub passed: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl TestReport {
    /// Report for a run that hit the wall-clock bound: every assertion
    /// fails, with a single note.
    pub fn timeout(checks: usize) -> Self {
        Self {
            passed: 0,
            failed: checks,
            errors: vec!["Timeout".to_string()],
        }
    }

    pub fn is_pass(&self) -> bool {
        self.failed == 0
    }

    pub fn from_outcomes(outcomes: &[CheckOutcome]) -> Self {
        let mut report = TestReport::default();
        for outcome in outcomes {
            match outcome.verdict {
                Verdict::Passed => report.passed += 1,
                Verdict::Failed { expected, actual } => {
                    report.failed += 1;
                    report.errors.push(format!(
                        "{}: expected ${:02X}, got ${:02X}",
                        outcome.check.label, expected, actual
                    ));
                }
                Verdict::Unreadable => {
                    report.failed += 1;
                    report.errors.push(format!(
                        "{}: could not read address ${:04X}",
                        outcome.check.label, outcome.check.addr
                    ));
                }
            }
        }
        report
    }
}

pub struct Verifier {
    dump_line: Regex,
}

impl Verifier {
    pub fn new() -> Self {
        Self {
            // `00008000: A9 ...` -- 8 hex digit address, first byte value.
            // Unanchored: a prompt or echo before the dump must not hide it.
            dump_line: Regex::new(r"\b([0-9A-Fa-f]{8}):\s+([0-9A-Fa-f]{2})\b").unwrap(),
        }
    }

    /// Collapse the dump output to address -> byte. Later lines overwrite
    /// earlier ones: dumps appear in script order, so the last occurrence of
    /// an address is its latest checkpoint. Taking the first would read a
    /// stale value whenever an address is checked more than once.
    pub fn memory_map(&self, output: &str) -> HashMap<u32, u8> {
        let mut mem = HashMap::new();
        for caps in self.dump_line.captures_iter(output) {
            let addr = u32::from_str_radix(&caps[1], 16).unwrap();
            let value = u8::from_str_radix(&caps[2], 16).unwrap();
            mem.insert(addr, value);
        }
        mem
    }

    /// Judge every assertion of a test against the captured output. Phase
    /// membership no longer matters here; each check stands alone.
    pub fn verify<'a>(
        &self,
        output: &str,
        checks: impl Iterator<Item = &'a Check>,
    ) -> Vec<CheckOutcome<'a>> {
        let mem = self.memory_map(output);
        checks
            .map(|check| {
                let verdict = match mem.get(&check.addr) {
                    Some(&actual) if actual == check.expected => Verdict::Passed,
                    Some(&actual) => Verdict::Failed {
                        expected: check.expected,
                        actual,
                    },
                    None => Verdict::Unreadable,
                };
                CheckOutcome { check, verdict }
            })
            .collect()
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}
