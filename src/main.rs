use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tbcheck::{list_tests, logging, parse, EmulatorConfig, RunOptions, Runner, TimingModel};

// Extract tests from the VHDL testbench and replay them on the emulator
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    styles = logging::get_styles(),
    arg_required_else_help = true,
)]
struct Args {
    /// Path to the VHDL testbench file
    testbench: String,

    /// Path to the emulator binary (bare names are searched on PATH)
    #[arg(short, long, default_value = "m65832emu")]
    emulator: String,

    /// Parse the testbench and list its tests without running anything
    #[arg(short, long)]
    list: bool,

    /// Same as --list
    #[arg(long)]
    vhdl_only: bool,

    /// Run only the given test number (repeatable)
    #[arg(short = 't', long = "test", value_name = "NUM")]
    tests: Vec<u32>,

    /// Wall-clock bound for one emulator run, in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Emulator memory size in KiB
    #[arg(long, default_value_t = 256)]
    mem: u32,

    /// Average emulator cycles per instruction, for step translation
    #[arg(long, default_value_t = 3)]
    cycles_per_inst: u64,

    /// Divisor mapping testbench wait cycles onto emulator checkpoints
    #[arg(long, default_value_t = 2)]
    wait_divisor: u64,

    /// Print per-check outcomes and emulator scripts
    #[command(flatten)]
    verbose: clap_verbosity_flag::Verbosity,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::logging_setup(logging::verbose_level_to_trace(args.verbose.log_level()));
    let verbose = args
        .verbose
        .log_level()
        .is_some_and(|lv| lv >= log::Level::Warn);

    let content = std::fs::read_to_string(&args.testbench)
        .with_context(|| format!("could not read file `{}`", &args.testbench))?;

    let timing = TimingModel {
        cycles_per_inst: args.cycles_per_inst.max(1),
        wait_divisor: args.wait_divisor.max(1),
        ..TimingModel::default()
    };

    println!("Parsing {}...", args.testbench);
    let bench = parse(&content, &timing);
    println!("Found {} tests\n", bench.tests.len());
    if !bench.warnings.is_empty() {
        println!(
            "Warning: {} directive-like lines did not parse (rerun with -v for details)\n",
            bench.warnings.len()
        );
    }

    if args.list || args.vhdl_only {
        list_tests(&bench.tests, verbose);
        return Ok(());
    }

    // Fatal precondition: no emulator, no run.
    let emulator = resolve_emulator(&args.emulator)?;

    if !args.tests.is_empty() {
        anyhow::ensure!(
            bench
                .tests
                .iter()
                .any(|t| args.tests.contains(&t.number)),
            "test {:?} not found",
            args.tests
        );
    }

    let mut config = EmulatorConfig::new(emulator);
    config.mem_kb = args.mem;
    config.timeout = Duration::from_secs(args.timeout);

    let runner = Runner::new(config, timing);
    let summary = runner.run(
        &bench.tests,
        &RunOptions {
            filter: args.tests,
            verbose,
        },
    )?;

    if !summary.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}

/// Locate the emulator binary before any test runs: an explicit path must
/// exist, a bare name is searched on PATH.
fn resolve_emulator(name: &str) -> Result<PathBuf> {
    let path = PathBuf::from(name);
    if path.components().count() > 1 {
        anyhow::ensure!(
            path.is_file(),
            "emulator not found at `{}`",
            path.display()
        );
        return Ok(path);
    }
    if path.is_file() {
        return Ok(path);
    }
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(name))
                .find(|p| p.is_file())
        })
        .ok_or_else(|| anyhow::anyhow!("emulator `{name}` not found on PATH"))
}
