//! The directive grammar of the testbench: everything the extractor
//! recognizes on a line, as a tagged event stream.

use regex::Regex;

/// Interrupt input of the core. IRQ is level-sensitive, NMI and ABORT are
/// edge-sensitive; all three are active-low in the testbench.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntLine {
    Irq,
    Nmi,
    Abort,
}

/// One parsed testbench directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Single-byte memory write. `poke16` word writes arrive pre-split into
    /// two of these, low byte first.
    Write { addr: u32, data: u8 },
    /// Memory assertion carrying its message label.
    Check { addr: u32, expected: u8, label: String },
    Wait { cycles: u64 },
    /// `rst_n <= '0'`, the start of a new run portion.
    ResetAssert,
    Interrupt { line: IntLine, asserted: bool },
}

/// Test boundary marker: a comment line `-- TEST <n>: <name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestHeader {
    pub number: u32,
    pub name: String,
}

/// Line scanner with the directive patterns compiled once.
pub struct Scanner {
    header: Regex,
    poke: Regex,
    poke16: Regex,
    check: Regex,
    wait: Regex,
    reset: Regex,
    irq: Regex,
    nmi: Regex,
    abort: Regex,
}

impl Scanner {
    pub fn new() -> Self {
        Self {
            header: Regex::new(r"(?i)--+\s*TEST\s+(\d+):\s*(\S[^\r\n]*)").unwrap(),
            poke: Regex::new(r#"(?i)\bpoke\s*\(\s*16#([0-9A-Fa-f]{1,8})#\s*,\s*x"([0-9A-Fa-f]{1,2})"\s*\)"#)
                .unwrap(),
            poke16: Regex::new(r#"(?i)\bpoke16\s*\(\s*16#([0-9A-Fa-f]{1,8})#\s*,\s*x"([0-9A-Fa-f]{1,4})"\s*\)"#)
                .unwrap(),
            check: Regex::new(
                r#"(?i)\bcheck_mem\s*\(\s*16#([0-9A-Fa-f]{1,8})#\s*,\s*x"([0-9A-Fa-f]{1,2})"\s*,\s*"([^"]+)"\s*\)"#,
            )
            .unwrap(),
            wait: Regex::new(r"(?i)\bwait_cycles\s*\(\s*(\d+)\s*\)").unwrap(),
            reset: Regex::new(r"(?i)rst_n\s*<=\s*'0'").unwrap(),
            irq: Regex::new(r"(?i)irq_n\s*<=\s*'([01])'").unwrap(),
            nmi: Regex::new(r"(?i)nmi_n\s*<=\s*'([01])'").unwrap(),
            abort: Regex::new(r"(?i)abort_n\s*<=\s*'([01])'").unwrap(),
        }
    }

    pub fn test_header(&self, line: &str) -> Option<TestHeader> {
        let caps = self.header.captures(line)?;
        Some(TestHeader {
            number: caps[1].parse().ok()?,
            name: caps[2].trim().to_string(),
        })
    }

    /// All directives on one line, in stimulus order: reset edge first, then
    /// writes, waits, checks, interrupt levels. Waits must precede checks so
    /// that a checkpoint sees every wait issued on its own line.
    pub fn scan_line(&self, line: &str) -> Vec<Directive> {
        let mut out = Vec::new();
        if self.reset.is_match(line) {
            out.push(Directive::ResetAssert);
        }
        for caps in self.poke16.captures_iter(line) {
            let addr = hex32(&caps[1]);
            let data = hex32(&caps[2]) as u16;
            out.push(Directive::Write {
                addr,
                data: (data & 0xFF) as u8,
            });
            out.push(Directive::Write {
                addr: addr + 1,
                data: (data >> 8) as u8,
            });
        }
        for caps in self.poke.captures_iter(line) {
            out.push(Directive::Write {
                addr: hex32(&caps[1]),
                data: hex32(&caps[2]) as u8,
            });
        }
        for caps in self.wait.captures_iter(line) {
            out.push(Directive::Wait {
                cycles: caps[1].parse().unwrap_or(0),
            });
        }
        for caps in self.check.captures_iter(line) {
            out.push(Directive::Check {
                addr: hex32(&caps[1]),
                expected: hex32(&caps[2]) as u8,
                label: caps[3].to_string(),
            });
        }
        for (re, line_kind) in [
            (&self.irq, IntLine::Irq),
            (&self.nmi, IntLine::Nmi),
            (&self.abort, IntLine::Abort),
        ] {
            if let Some(caps) = re.captures(line) {
                out.push(Directive::Interrupt {
                    line: line_kind,
                    asserted: &caps[1] == "0",
                });
            }
        }
        out
    }

    /// Whether a line mentions a directive keyword at all. Used to flag
    /// lines that resemble directives but fail to parse.
    pub fn mentions_directive(&self, line: &str) -> bool {
        let lower = line.to_ascii_lowercase();
        ["poke", "check_mem", "wait_cycles"]
            .iter()
            .any(|kw| lower.contains(kw))
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

// capture groups are bounded to 8 hex digits, so this cannot overflow
fn hex32(digits: &str) -> u32 {
    u32::from_str_radix(digits, 16).unwrap()
}
