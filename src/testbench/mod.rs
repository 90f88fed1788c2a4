//! Testbench parsing: recover ordered, multi-phase test cases from the raw
//! testbench text.
//!
//! The bench has no explicit phase object. Phase boundaries are implied by
//! reset assertions and by the ordering of writes against checks, so the
//! parser scans each line into [`Directive`] events and folds them through a
//! single reducer per test.

mod directive;

pub use directive::{Directive, IntLine, Scanner, TestHeader};

use std::collections::HashSet;

use crate::timing::TimingModel;

/// Baseline cycle budget of a phase before any wait accumulates, inherited
/// from the reference harness.
pub const DEFAULT_PHASE_CYCLES: u64 = 100;

/// One memory assertion, timed by the scaled wait counter at the moment it
/// appeared in the bench.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub addr: u32,
    pub expected: u8,
    pub label: String,
    /// Emulator-cycle checkpoint: waits seen so far in the phase, scaled.
    pub cycles_at: u64,
}

/// A reset-to-reset epoch of stimulus and verification within a test.
#[derive(Debug, Clone)]
pub struct Phase {
    pub pokes: Vec<(u32, u8)>,
    pub checks: Vec<Check>,
    /// Total unscaled cycle budget, for the full-run fallback.
    pub cycles: u64,
    pub irq_active: bool,
    pub nmi_active: bool,
    pub abort_active: bool,
    /// Scaled wait cycles accumulated so far, stamped onto each new check.
    cycles_so_far: u64,
}

impl Phase {
    fn new() -> Self {
        Self {
            pokes: Vec::new(),
            checks: Vec::new(),
            cycles: DEFAULT_PHASE_CYCLES,
            irq_active: false,
            nmi_active: false,
            abort_active: false,
            cycles_so_far: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pokes.is_empty() && self.checks.is_empty()
    }

    pub fn uses_interrupts(&self) -> bool {
        self.irq_active || self.nmi_active || self.abort_active
    }
}

/// A test case: the ordered phases between one `TEST n:` marker and the next.
#[derive(Debug, Clone)]
pub struct Test {
    pub number: u32,
    pub name: String,
    pub phases: Vec<Phase>,
}

impl Test {
    pub fn poke_count(&self) -> usize {
        self.phases.iter().map(|p| p.pokes.len()).sum()
    }

    pub fn check_count(&self) -> usize {
        self.phases.iter().map(|p| p.checks.len()).sum()
    }

    pub fn total_cycles(&self) -> u64 {
        self.phases.iter().map(|p| p.cycles).sum()
    }

    pub fn irq_active(&self) -> bool {
        self.phases.iter().any(|p| p.irq_active)
    }

    pub fn nmi_active(&self) -> bool {
        self.phases.iter().any(|p| p.nmi_active)
    }

    pub fn abort_active(&self) -> bool {
        self.phases.iter().any(|p| p.abort_active)
    }

    /// All checks across phases, in script order.
    pub fn checks(&self) -> impl Iterator<Item = &Check> {
        self.phases.iter().flat_map(|p| p.checks.iter())
    }

    /// Every address the test itself writes, in any phase.
    pub fn poked_addresses(&self) -> HashSet<u32> {
        self.phases
            .iter()
            .flat_map(|p| p.pokes.iter().map(|&(addr, _)| addr))
            .collect()
    }
}

/// A line that mentions a directive keyword yet parsed to nothing. The
/// reference extractor dropped these silently, which hides authoring typos;
/// they are surfaced here instead, without failing the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub line_no: usize,
    pub text: String,
}

/// Parse result: the extracted tests plus the warning channel.
#[derive(Debug)]
pub struct Testbench {
    pub tests: Vec<Test>,
    pub warnings: Vec<ParseWarning>,
}

/// Result of closing a phase at a reset edge: the finished phase, and the
/// deferred writes that open the next one. Writes seen after a phase already
/// holds checks are setup for a fresh reset cycle, not late stimulus.
struct PhaseFlush {
    closed: Phase,
    carry: Vec<(u32, u8)>,
}

struct TestBuilder {
    test: Test,
    phase: Phase,
    pending: Vec<(u32, u8)>,
}

impl TestBuilder {
    fn new(header: TestHeader) -> Self {
        Self {
            test: Test {
                number: header.number,
                name: header.name,
                phases: Vec::new(),
            },
            phase: Phase::new(),
            pending: Vec::new(),
        }
    }

    fn flush_phase(&mut self) -> PhaseFlush {
        PhaseFlush {
            closed: std::mem::replace(&mut self.phase, Phase::new()),
            carry: std::mem::take(&mut self.pending),
        }
    }

    fn apply(&mut self, directive: Directive, timing: &TimingModel) {
        match directive {
            Directive::ResetAssert => {
                if !self.pending.is_empty() && !self.phase.checks.is_empty() {
                    let PhaseFlush { closed, carry } = self.flush_phase();
                    self.test.phases.push(closed);
                    self.phase.pokes = carry;
                }
            }
            Directive::Write { addr, data } => {
                if self.phase.checks.is_empty() {
                    self.phase.pokes.push((addr, data));
                } else {
                    self.pending.push((addr, data));
                }
            }
            Directive::Wait { cycles } => {
                if timing.is_stimulus(cycles) {
                    self.phase.cycles_so_far += timing.scale_wait(cycles);
                    self.phase.cycles += cycles;
                }
            }
            Directive::Check { addr, expected, label } => {
                self.phase.checks.push(Check {
                    addr,
                    expected,
                    label,
                    cycles_at: self.phase.cycles_so_far,
                });
            }
            Directive::Interrupt { line, asserted } => {
                if asserted {
                    match line {
                        IntLine::Irq => self.phase.irq_active = true,
                        IntLine::Nmi => self.phase.nmi_active = true,
                        IntLine::Abort => self.phase.abort_active = true,
                    }
                }
            }
        }
    }

    fn finish(mut self) -> Test {
        if !self.phase.is_empty() {
            self.test.phases.push(self.phase);
        }
        self.test
    }
}

/// Parse the whole testbench in one line-oriented pass. Directives outside a
/// `TEST n:` boundary are ignored; a trailing open test is finalized.
pub fn parse(src: &str, timing: &TimingModel) -> Testbench {
    let scanner = Scanner::new();
    let mut tests = Vec::new();
    let mut warnings = Vec::new();
    let mut builder: Option<TestBuilder> = None;

    for (idx, line) in src.lines().enumerate() {
        if let Some(header) = scanner.test_header(line) {
            if let Some(prev) = builder.take() {
                tests.push(prev.finish());
            }
            builder = Some(TestBuilder::new(header));
            continue;
        }
        let Some(builder) = builder.as_mut() else {
            continue;
        };
        let directives = scanner.scan_line(line);
        if directives.is_empty() {
            if scanner.mentions_directive(line) {
                tracing::warn!(
                    line = idx + 1,
                    "directive-like line did not parse: {}",
                    line.trim()
                );
                warnings.push(ParseWarning {
                    line_no: idx + 1,
                    text: line.trim().to_string(),
                });
            }
            continue;
        }
        for directive in directives {
            builder.apply(directive, timing);
        }
    }
    if let Some(builder) = builder.take() {
        tests.push(builder.finish());
    }

    Testbench { tests, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_default(src: &str) -> Testbench {
        parse(src, &TimingModel::default())
    }

    #[test]
    fn test_single_phase_extraction() {
        let bench = parse_default(
            r#"
            -- TEST 1: LDA immediate
            poke(16#8000#, x"A9");
            poke(16#8001#, x"42");
            wait_cycles(30);
            check_mem(16#0010#, x"42", "accumulator stored");
            "#,
        );
        assert_eq!(bench.tests.len(), 1);
        let test = &bench.tests[0];
        assert_eq!(test.number, 1);
        assert_eq!(test.name, "LDA immediate");
        assert_eq!(test.phases.len(), 1);
        let phase = &test.phases[0];
        assert_eq!(phase.pokes, vec![(0x8000, 0xA9), (0x8001, 0x42)]);
        assert_eq!(phase.cycles, DEFAULT_PHASE_CYCLES + 30);
        assert_eq!(phase.checks.len(), 1);
        // 30 reference cycles scale down to a 15-cycle checkpoint
        assert_eq!(phase.checks[0].cycles_at, 15);
        assert!(bench.warnings.is_empty());
    }

    #[test]
    fn test_settle_waits_ignored() {
        let bench = parse_default(
            r#"
            -- TEST 1: settle
            poke(16#8000#, x"EA");
            wait_cycles(10);
            check_mem(16#8000#, x"EA", "nop intact");
            "#,
        );
        let phase = &bench.tests[0].phases[0];
        assert_eq!(phase.cycles, DEFAULT_PHASE_CYCLES);
        assert_eq!(phase.checks[0].cycles_at, 0);
    }

    #[test]
    fn test_checkpoint_counter_accumulates() {
        let bench = parse_default(
            r#"
            -- TEST 1: two checkpoints
            poke(16#8000#, x"EA");
            wait_cycles(20);
            check_mem(16#0010#, x"01", "first");
            wait_cycles(40);
            check_mem(16#0011#, x"02", "second");
            "#,
        );
        let phase = &bench.tests[0].phases[0];
        assert_eq!(phase.checks[0].cycles_at, 10);
        assert_eq!(phase.checks[1].cycles_at, 10 + 20);
        assert_eq!(phase.cycles, DEFAULT_PHASE_CYCLES + 60);
    }

    #[test]
    fn test_pending_writes_open_next_phase() {
        let bench = parse_default(
            r#"
            -- TEST 1: reset carries setup over
            poke(16#8000#, x"01");
            wait_cycles(20);
            check_mem(16#0010#, x"01", "first epoch");
            poke(16#8000#, x"02");
            rst_n <= '0';
            wait_cycles(20);
            check_mem(16#0010#, x"02", "second epoch");
            "#,
        );
        let test = &bench.tests[0];
        assert_eq!(test.phases.len(), 2);
        assert_eq!(test.phases[0].pokes, vec![(0x8000, 0x01)]);
        assert_eq!(test.phases[0].checks[0].label, "first epoch");
        assert_eq!(test.phases[1].pokes, vec![(0x8000, 0x02)]);
        assert_eq!(test.phases[1].checks[0].label, "second epoch");
        // the carried-over phase starts its own counters
        assert_eq!(test.phases[1].checks[0].cycles_at, 10);
        assert_eq!(test.phases[1].cycles, DEFAULT_PHASE_CYCLES + 20);
    }

    #[test]
    fn test_reset_without_pending_keeps_phase() {
        let bench = parse_default(
            r#"
            -- TEST 1: reset inside setup
            rst_n <= '0';
            poke(16#8000#, x"A9");
            check_mem(16#8000#, x"A9", "still one phase");
            "#,
        );
        assert_eq!(bench.tests[0].phases.len(), 1);
    }

    #[test]
    fn test_interrupt_flags_are_per_phase() {
        let bench = parse_default(
            r#"
            -- TEST 1: irq in second phase only
            poke(16#8000#, x"01");
            check_mem(16#0010#, x"01", "a");
            poke(16#8000#, x"02");
            rst_n <= '0';
            irq_n <= '0';
            irq_n <= '1';
            check_mem(16#0010#, x"02", "b");
            "#,
        );
        let test = &bench.tests[0];
        assert!(!test.phases[0].irq_active);
        assert!(test.phases[1].irq_active);
        assert!(test.irq_active());
        assert!(!test.nmi_active());
    }

    #[test]
    fn test_deassertion_never_sets_flags() {
        let bench = parse_default(
            r#"
            -- TEST 1: lines held high
            poke(16#8000#, x"EA");
            irq_n <= '1';
            nmi_n <= '1';
            abort_n <= '1';
            check_mem(16#8000#, x"EA", "quiet");
            "#,
        );
        let phase = &bench.tests[0].phases[0];
        assert!(!phase.uses_interrupts());
    }

    #[test]
    fn test_directives_outside_tests_ignored() {
        let bench = parse_default(
            r#"
            poke(16#8000#, x"FF");
            check_mem(16#8000#, x"FF", "stray");
            -- TEST 3: real one
            poke(16#8000#, x"01");
            check_mem(16#8000#, x"01", "in bounds");
            "#,
        );
        assert_eq!(bench.tests.len(), 1);
        assert_eq!(bench.tests[0].number, 3);
        assert_eq!(bench.tests[0].poke_count(), 1);
    }

    #[test]
    fn test_boundary_finalizes_previous_test() {
        let bench = parse_default(
            r#"
            -- TEST 1: first
            poke(16#8000#, x"01");
            check_mem(16#8000#, x"01", "a");
            -- TEST 2: second
            poke(16#8000#, x"02");
            "#,
        );
        assert_eq!(bench.tests.len(), 2);
        assert_eq!(bench.tests[0].check_count(), 1);
        // trailing test with only pokes still gets its phase
        assert_eq!(bench.tests[1].phases.len(), 1);
        assert_eq!(bench.tests[1].check_count(), 0);
    }

    #[test]
    fn test_word_write_order_in_phase() {
        let bench = parse_default(
            r#"
            -- TEST 1: vector setup
            poke16(16#FFFC#, x"8000");
            "#,
        );
        assert_eq!(
            bench.tests[0].phases[0].pokes,
            vec![(0xFFFC, 0x00), (0xFFFD, 0x80)]
        );
    }

    #[test]
    fn test_warning_channel_collects_near_misses() {
        let bench = parse_default(
            r#"
            -- TEST 1: typo below
            poke(16#8000, x"A9");
            check_mem(16#8000#, x"A9", "ok");
            "#,
        );
        assert_eq!(bench.warnings.len(), 1);
        assert_eq!(bench.warnings[0].line_no, 3);
        assert!(bench.warnings[0].text.contains("poke"));
        assert_eq!(bench.tests[0].poke_count(), 0);
        assert_eq!(bench.tests[0].check_count(), 1);
    }
}
