use std::process::Command;

use anyhow::{Result, anyhow};
use log::warn;

#[derive(Clone, Debug, Default)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// Process execution seam. `run` treats a non-zero exit status as an error;
/// `observe` reports it in the output instead, for probes and best-effort
/// commands that inspect the result themselves.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> Result<CmdOutput> {
        let output = self.observe(program, args)?;
        if !output.success {
            return Err(anyhow!(
                "{} {} failed: {}",
                program,
                args.join(" "),
                output.stderr.trim()
            ));
        }
        Ok(output)
    }

    fn observe(&self, program: &str, args: &[&str]) -> Result<CmdOutput>;
}

pub struct HostRunner;

impl CommandRunner for HostRunner {
    fn observe(&self, program: &str, args: &[&str]) -> Result<CmdOutput> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| anyhow!("unable to run {}: {}", program, e))?;
        Ok(CmdOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        })
    }
}

/// Outcome of an operation that must never abort the caller. Failure is
/// logged where it happens and is not representable as an Err, so it cannot
/// accidentally be propagated with `?`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BestEffort {
    Done,
    LoggedFailure,
}

impl BestEffort {
    pub fn failed(self) -> bool {
        self == BestEffort::LoggedFailure
    }
}

/// Collapse a command result into a best-effort outcome, logging any failure.
pub fn best_effort(what: &str, result: Result<CmdOutput>) -> BestEffort {
    match result {
        Ok(output) if output.success => BestEffort::Done,
        Ok(output) => {
            warn!("ignoring failure of '{}': {}", what, output.stderr.trim());
            BestEffort::LoggedFailure
        }
        Err(e) => {
            warn!("ignoring failure of '{}': {}", what, e);
            BestEffort::LoggedFailure
        }
    }
}
