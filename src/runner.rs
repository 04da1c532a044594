use crate::error::SnapError;
use anyhow::Result;
use log::debug;
use std::process::Command;

/// What a finished subprocess left behind. A non-zero exit is data here,
/// not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub command_line: String,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Seam between snapzap and `diskutil`/`tmutil`.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Runs `program` with `args` to completion. Fails only when the
    /// process could not be spawned.
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let command_line = command_line(program, args);
        debug!("Running: {}", command_line);
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| SnapError::ExternalTool {
                command: command_line.clone(),
                source,
            })?;
        debug!("{} exited with {:?}", program, output.status.code());
        Ok(CommandOutput {
            command_line,
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
