//! Replay test vectors extracted from a VHDL testbench against the m65832
//! emulator and compare memory state, holding the emulator to the exact
//! externally observable behavior of the RTL core.
//!
//! The pipeline runs strictly left to right for every test: the
//! [`testbench`] parser recovers multi-phase test cases from the bench text,
//! [`script`] turns each test into a protocol script (translating the
//! bench's cycle timing into step counts on the way), [`emulator`] feeds the
//! script to the emulator subprocess, and [`verify`] judges the captured
//! memory dumps. [`runner`] ties the stages together and aggregates the
//! verdicts.

pub mod emulator;
pub mod logging;
pub mod runner;
pub mod script;
pub mod testbench;
pub mod timing;
pub mod verify;

pub use emulator::EmulatorConfig;
pub use runner::{list_tests, RunOptions, Runner, Summary};
pub use testbench::{parse, Test, Testbench};
pub use timing::TimingModel;
