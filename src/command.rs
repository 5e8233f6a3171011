//! External process invocation
use crate::error::InventoryError;
use log::debug;
#[cfg(test)]
use std::collections::HashMap;
use std::process::Command;

/// Captured result of an external command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CommandOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Narrow seam around process spawning so sources can be tested with fixtures.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, InventoryError>;

    /// Run and require a zero exit status.
    fn run_checked(&self, program: &str, args: &[&str]) -> Result<CommandOutput, InventoryError> {
        let output = self.run(program, args)?;
        if output.success {
            Ok(output)
        } else {
            Err(InventoryError::enrichment(
                "external command",
                format!("{} {} failed: {}", program, args.join(" "), output.stderr.trim()),
            ))
        }
    }
}

/// Runs commands on the host, blocking until they exit.
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, InventoryError> {
        debug!("Running {} {}", program, args.join(" "));
        let output = Command::new(program).args(args).output().map_err(|e| {
            InventoryError::enrichment("external command", format!("cannot run {}: {}", program, e))
        })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Refuses every invocation. Used when external tools are disabled.
pub struct DisabledCommandRunner;

impl CommandRunner for DisabledCommandRunner {
    fn run(&self, program: &str, _args: &[&str]) -> Result<CommandOutput, InventoryError> {
        Err(InventoryError::enrichment(
            "external command",
            format!("external tools disabled, not running {}", program),
        ))
    }
}

/// Replays canned output keyed by the full command line.
#[cfg(test)]
#[derive(Default)]
pub struct FixtureCommandRunner {
    responses: HashMap<String, CommandOutput>,
}

#[cfg(test)]
impl FixtureCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, command_line: &str, stdout: &str) -> Self {
        self.responses.insert(
            command_line.to_string(),
            CommandOutput {
                success: true,
                stdout: stdout.as_bytes().to_vec(),
                stderr: String::new(),
            },
        );
        self
    }

    pub fn with_bytes(mut self, command_line: &str, stdout: &[u8]) -> Self {
        self.responses.insert(
            command_line.to_string(),
            CommandOutput {
                success: true,
                stdout: stdout.to_vec(),
                stderr: String::new(),
            },
        );
        self
    }

    pub fn with_failure(mut self, command_line: &str, stderr: &str) -> Self {
        self.responses.insert(
            command_line.to_string(),
            CommandOutput {
                success: false,
                stdout: Vec::new(),
                stderr: stderr.to_string(),
            },
        );
        self
    }
}

#[cfg(test)]
impl CommandRunner for FixtureCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, InventoryError> {
        let mut command_line = program.to_string();
        for arg in args {
            command_line.push(' ');
            command_line.push_str(arg);
        }
        self.responses.get(&command_line).cloned().ok_or_else(|| {
            InventoryError::enrichment("external command", format!("no fixture for {}", command_line))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_runner_replays_output() {
        let runner = FixtureCommandRunner::new().with_output("modinfo -n ext4", "/lib/ext4.ko\n");
        let out = runner.run_checked("modinfo", &["-n", "ext4"]).unwrap();
        assert_eq!(out.stdout_text(), "/lib/ext4.ko\n");
        assert!(runner.run("modinfo", &["-n", "xfs"]).is_err());
    }

    #[test]
    fn test_run_checked_rejects_failure() {
        let runner = FixtureCommandRunner::new().with_failure("modinfo -n nope", "not found");
        let err = runner.run_checked("modinfo", &["-n", "nope"]).unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_disabled_runner_never_runs() {
        assert!(DisabledCommandRunner.run("true", &[]).is_err());
    }

    #[test]
    fn test_system_runner_missing_program_is_enrichment_failure() {
        let err = SystemCommandRunner
            .run("kmodlist-definitely-not-a-real-program", &[])
            .unwrap_err();
        assert!(matches!(err, InventoryError::EnrichmentFailure { .. }));
    }
}
