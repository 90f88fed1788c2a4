//! Build the emulator protocol script for a parsed test.
//!
//! Script emission is a pure function of the test: it performs no I/O and
//! never mutates the parsed phases, so a script can be regenerated at will.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::testbench::{Check, Phase, Test};
use crate::timing::TimingModel;

/// Execution entry point forced into the reset vector. The testbench
/// hard-wires RESET_PC to this address, so whatever the test wrote into the
/// vector must be overridden for the emulator to match.
pub const ENTRY_ADDR: u32 = 0x8000;
/// Fallback interrupt handler: a single halt instruction parked here.
pub const HALT_ADDR: u32 = 0xFF00;
/// STP opcode, stops the core until reset.
pub const HALT_OPCODE: u8 = 0xDB;

pub const RESET_VECTOR: u32 = 0xFFFC;
pub const IRQ_VECTOR: u32 = 0xFFFE;
pub const NMI_VECTOR: u32 = 0xFFFA;
pub const ABORT_VECTOR: u32 = 0xFFF8;

/// 64 KiB bank boundary; writes below it are mirrored one bank up.
pub const BANK_SIZE: u32 = 0x10000;

/// Instructions executed before asserting a level IRQ, enough for the reset
/// handler to reach its wait instruction.
pub const IRQ_WARMUP_STEPS: u64 = 3;

/// Default vector table: reset to the entry address, the three interrupt
/// vectors to the halt handler. Each byte is injected once per test, only
/// when no phase of the test writes that address itself.
const DEFAULT_VECTORS: [(u32, u8); 9] = [
    (RESET_VECTOR, (ENTRY_ADDR & 0xFF) as u8),
    (RESET_VECTOR + 1, (ENTRY_ADDR >> 8) as u8),
    (IRQ_VECTOR, (HALT_ADDR & 0xFF) as u8),
    (IRQ_VECTOR + 1, (HALT_ADDR >> 8) as u8),
    (HALT_ADDR, HALT_OPCODE),
    (NMI_VECTOR, (HALT_ADDR & 0xFF) as u8),
    (NMI_VECTOR + 1, (HALT_ADDR >> 8) as u8),
    (ABORT_VECTOR, (HALT_ADDR & 0xFF) as u8),
    (ABORT_VECTOR + 1, (HALT_ADDR >> 8) as u8),
];

/// One line of the emulator's interactive protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Write { addr: u32, data: u8 },
    Reset,
    /// Assert the level-sensitive IRQ line.
    IrqAssert,
    NmiPulse,
    AbortPulse,
    /// Execute N instructions.
    Step(u64),
    /// Free-run for N cycles.
    RunCycles(u64),
    /// Dump one byte.
    ReadByte(u32),
    Quit,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Write { addr, data } => write!(f, "w {addr:x} {data:x}"),
            Command::Reset => write!(f, "reset"),
            Command::IrqAssert => write!(f, "irq 1"),
            Command::NmiPulse => write!(f, "nmi"),
            Command::AbortPulse => write!(f, "abort"),
            Command::Step(n) => write!(f, "s {n}"),
            Command::RunCycles(n) => write!(f, "r {n}"),
            Command::ReadByte(addr) => write!(f, "m {addr:x} 1"),
            Command::Quit => write!(f, "q"),
        }
    }
}

/// Render a script to the text fed to the emulator's stdin.
pub fn render(script: &[Command]) -> String {
    let mut text = script
        .iter()
        .map(|cmd| cmd.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    text.push('\n');
    text
}

/// Build the full protocol script for one test: default-vector injection,
/// then every phase in order, then the terminating quit.
pub fn build_script(test: &Test, timing: &TimingModel) -> Vec<Command> {
    let mut script = Vec::new();

    let poked = test.poked_addresses();
    for (addr, data) in DEFAULT_VECTORS {
        if !poked.contains(&addr) {
            script.push(Command::Write { addr, data });
        }
    }

    for phase in &test.phases {
        emit_phase(phase, timing, &mut script);
    }

    script.push(Command::Quit);
    script
}

fn emit_phase(phase: &Phase, timing: &TimingModel, script: &mut Vec<Command>) {
    let original: HashSet<u32> = phase.pokes.iter().map(|&(addr, _)| addr).collect();

    // Reset-vector normalization: drop whatever the bench wrote there and
    // force the entry address.
    let mut pokes: Vec<(u32, u8)> = phase
        .pokes
        .iter()
        .copied()
        .filter(|&(addr, _)| addr != RESET_VECTOR && addr != RESET_VECTOR + 1)
        .collect();
    pokes.push((RESET_VECTOR, (ENTRY_ADDR & 0xFF) as u8));
    pokes.push((RESET_VECTOR + 1, (ENTRY_ADDR >> 8) as u8));

    if !original.contains(&IRQ_VECTOR) {
        pokes.push((IRQ_VECTOR, (HALT_ADDR & 0xFF) as u8));
        pokes.push((IRQ_VECTOR + 1, (HALT_ADDR >> 8) as u8));
    }
    if !original.contains(&HALT_ADDR) {
        pokes.push((HALT_ADDR, HALT_OPCODE));
    }

    let addrs: HashSet<u32> = pokes.iter().map(|&(addr, _)| addr).collect();
    // Word writes spanning vector pairs leave stray NMI vector bytes that
    // would corrupt interrupt dispatch. The reset pair is never dropped.
    let drop_nmi_vector = phase.uses_interrupts()
        && addrs.contains(&ABORT_VECTOR)
        && addrs.contains(&(ABORT_VECTOR + 1));

    for (addr, data) in pokes {
        if drop_nmi_vector && (addr == NMI_VECTOR || addr == NMI_VECTOR + 1) {
            continue;
        }
        script.push(Command::Write { addr, data });
        if addr < BANK_SIZE {
            script.push(Command::Write {
                addr: addr + BANK_SIZE,
                data,
            });
        }
    }

    script.push(Command::Reset);

    // Edge-sensitive lines fire once, right after reset.
    if phase.nmi_active {
        script.push(Command::NmiPulse);
    }
    if phase.abort_active {
        script.push(Command::AbortPulse);
    }
    // IRQ is level-sensitive; let the startup code reach its wait state
    // before raising the line.
    if phase.irq_active {
        script.push(Command::Step(IRQ_WARMUP_STEPS));
        script.push(Command::IrqAssert);
    }

    if phase.checks.is_empty() {
        script.push(Command::RunCycles(phase.cycles));
        return;
    }

    let mut by_checkpoint: BTreeMap<u64, Vec<&Check>> = BTreeMap::new();
    for check in &phase.checks {
        by_checkpoint.entry(check.cycles_at).or_default().push(check);
    }

    let mut reached = 0;
    for (cycles_at, checks) in by_checkpoint {
        let inst = timing.instructions_at(cycles_at);
        if inst > reached {
            script.push(Command::Step(inst - reached));
        }
        reached = inst;
        for check in checks {
            script.push(Command::ReadByte(check.addr));
        }
    }

    // Finish the phase even when the last checkpoint is short of the tail,
    // so the end state matches a full run.
    let total = timing.instructions_at(phase.cycles);
    if reached < total {
        script.push(Command::Step(total - reached));
    }
}
