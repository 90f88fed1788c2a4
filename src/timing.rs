/// Timing heuristics that map the reference design's cycle counts onto the
/// emulator's step/run protocol.
///
/// The RTL core spends roughly twice as many cycles per instruction as the
/// emulator, and one emulator instruction costs about three cycles on
/// average. Both ratios are empirical and can drift when either side
/// changes, so they are carried as configuration rather than constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingModel {
    /// Divisor applied to wait counts when stamping checkpoint times.
    pub wait_divisor: u64,
    /// Average emulator cycles per instruction, for `s` step translation.
    pub cycles_per_inst: u64,
    /// Waits at or below this count are reset settle time, not stimulus.
    pub settle_threshold: u64,
}

impl Default for TimingModel {
    fn default() -> Self {
        Self {
            wait_divisor: 2,
            cycles_per_inst: 3,
            settle_threshold: 10,
        }
    }
}

impl TimingModel {
    /// Whether a `wait_cycles` count is meaningful stimulus.
    pub fn is_stimulus(&self, cycles: u64) -> bool {
        cycles > self.settle_threshold
    }

    /// Checkpoint time of a wait, in emulator cycles.
    pub fn scale_wait(&self, cycles: u64) -> u64 {
        cycles / self.wait_divisor
    }

    /// Instruction count reached after `cycles` emulator cycles, at least one.
    pub fn instructions_at(&self, cycles: u64) -> u64 {
        1.max(cycles / self.cycles_per_inst)
    }
}
