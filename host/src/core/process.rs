//! Process spawning helpers.
//!
//! Shell commands, extension scripts and the HTTP transfer tool all go through
//! here. On Windows the creation flags suppress a console window per spawn.

use serde::{Deserialize, Serialize};
use tokio::process::Command;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `-1` when the process was terminated by a signal
    pub code: i32,
}

impl ExecOutput {
    pub fn succeeded(&self) -> bool {
        self.code == 0
    }
}

/// Apply platform-specific flags to a tokio process command.
pub fn configure_tokio_command(cmd: &mut Command) {
    #[cfg(target_os = "windows")]
    {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(not(target_os = "windows"))]
    let _ = cmd;
}

/// Builds a command that runs `line` through the platform shell.
pub fn shell_command(line: &str) -> Command {
    #[cfg(target_os = "windows")]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", line]);
        cmd
    };
    #[cfg(not(target_os = "windows"))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", line]);
        cmd
    };
    configure_tokio_command(&mut cmd);
    cmd
}

/// Runs a command to completion and captures its output as UTF-8 (lossy).
pub async fn run_captured(mut cmd: Command) -> std::io::Result<ExecOutput> {
    configure_tokio_command(&mut cmd);
    let output = cmd.output().await?;
    Ok(ExecOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        code: output.status.code().unwrap_or(-1),
    })
}

/// Quotes one argument for the shell [`shell_command`] runs.
pub fn shell_quote(arg: &str) -> String {
    #[cfg(target_os = "windows")]
    {
        cmd_quote(arg)
    }
    #[cfg(not(target_os = "windows"))]
    {
        posix_quote(arg)
    }
}

/// Quotes one argument for `sh -c` using single quotes.
pub fn posix_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Quotes one argument for `cmd /C` and the MSVC argument parser.
///
/// Embedded quotes are doubled so cmd's own quote tracking never ends the
/// argument early; `%` is emitted outside the quotes as `^%` so cmd does not
/// expand variables.
pub fn cmd_quote(arg: &str) -> String {
    let mut quoted = String::from("\"");
    let mut backslashes = 0;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.push_str(&"\\".repeat(backslashes * 2));
                quoted.push_str("\"\"");
                backslashes = 0;
            }
            '%' => {
                quoted.push_str(&"\\".repeat(backslashes));
                quoted.push_str("\"^%\"");
                backslashes = 0;
            }
            _ => {
                quoted.push_str(&"\\".repeat(backslashes));
                quoted.push(c);
                backslashes = 0;
            }
        }
    }
    // trailing backslashes must not escape the closing quote
    quoted.push_str(&"\\".repeat(backslashes * 2));
    quoted.push('"');
    quoted
}
