//! Drive the emulator as a subprocess over its interactive protocol.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use anyhow::Context;

/// How to launch the emulator for one scripted run.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    pub path: PathBuf,
    /// Run in 8-bit emulation mode, matching the testbench's core setup.
    pub emulation: bool,
    /// Memory size handed to the emulator, in KiB.
    pub mem_kb: u32,
    pub timeout: Duration,
}

impl EmulatorConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            emulation: true,
            mem_kb: 256,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Result of one scripted emulator run.
#[derive(Debug)]
pub enum Outcome {
    Completed {
        status: ExitStatus,
        output: String,
        stderr: String,
    },
    /// The wall-clock bound expired and the child was killed.
    TimedOut,
}

/// Run one protocol script to completion: spawn the emulator in interactive
/// mode, feed the script to stdin and capture stdout, bounded by the
/// configured timeout. A non-zero exit is not an error here; whatever output
/// was produced is still returned for parsing.
pub fn run_script(config: &EmulatorConfig, script: &str) -> anyhow::Result<Outcome> {
    let mut cmd = Command::new(&config.path);
    if config.emulation {
        cmd.arg("--emulation");
    }
    cmd.arg("-m")
        .arg(config.mem_kb.to_string())
        .arg("-i")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to launch emulator `{}`", config.path.display()))?;

    // All three pipes get their own thread: a child that dumps a lot while
    // we are still writing the script must not wedge either pipe, and a
    // child that exits early (closing stdin) must not fail the run.
    let stdin = child.stdin.take();
    let script_text = script.to_string();
    let in_thread = std::thread::spawn(move || {
        if let Some(mut stdin) = stdin {
            if let Err(err) = stdin.write_all(script_text.as_bytes()) {
                tracing::debug!("short script write: {err}");
            }
        }
    });
    let stdout = child.stdout.take();
    let out_thread = std::thread::spawn(move || read_all(stdout));
    let stderr = child.stderr.take();
    let err_thread = std::thread::spawn(move || read_all(stderr));

    let waited = wait_with_timeout(&mut child, config.timeout)?;

    // Killed or exited, the pipes are closed now, so the threads finish.
    let _ = in_thread.join();
    let output = out_thread.join().unwrap_or_default();
    let stderr = err_thread.join().unwrap_or_default();

    match waited {
        Some(status) => Ok(Outcome::Completed {
            status,
            output,
            stderr,
        }),
        None => Ok(Outcome::TimedOut),
    }
}

fn read_all(pipe: Option<impl Read>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf);
    }
    buf
}

/// Poll the child until it exits or the bound expires; on expiry kill it and
/// reap the zombie. `None` means timed out.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> anyhow::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().context("waiting for emulator")? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}
