//! Subprocess runner with timeouts.

use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use rapidkit_core::application::ports::{CommandOutcome, CommandRunner, CommandSpec};

/// Runs commands through `std::process`, killing them at their timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

impl CommandRunner for SystemCommandRunner {
    #[instrument(skip(self), fields(command = %spec.display()))]
    fn run(&self, spec: &CommandSpec) -> CommandOutcome {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Program not installed");
                return CommandOutcome::NotFound;
            }
            Err(e) => {
                return CommandOutcome::Completed {
                    success: false,
                    code: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                };
            }
        };

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match child.wait_timeout(spec.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!(timeout_secs = spec.timeout.as_secs(), "Command timed out");
                let _ = child.kill();
                let _ = child.wait();
                return CommandOutcome::TimedOut;
            }
            Err(e) => {
                let _ = child.kill();
                return CommandOutcome::Completed {
                    success: false,
                    code: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                };
            }
        };

        CommandOutcome::Completed {
            success: status.success(),
            code: status.code(),
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn captures_output_and_status() {
        let spec = CommandSpec::new("sh", &["-c", "echo hello; exit 3"], Duration::from_secs(10));
        match SystemCommandRunner::new().run(&spec) {
            CommandOutcome::Completed {
                success,
                code,
                stdout,
                ..
            } => {
                assert!(!success);
                assert_eq!(code, Some(3));
                assert_eq!(stdout.trim(), "hello");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn missing_programs_are_not_found() {
        let spec = CommandSpec::new("rapidkit-no-such-tool", &[], Duration::from_secs(1));
        assert_eq!(SystemCommandRunner::new().run(&spec), CommandOutcome::NotFound);
    }

    #[test]
    fn slow_programs_time_out() {
        let spec = CommandSpec::new("sleep", &["5"], Duration::from_millis(100));
        assert_eq!(SystemCommandRunner::new().run(&spec), CommandOutcome::TimedOut);
    }

    #[test]
    fn runs_in_the_requested_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        let spec = CommandSpec::new("pwd", &[], Duration::from_secs(5)).in_dir(temp.path());
        let CommandOutcome::Completed { stdout, .. } = SystemCommandRunner::new().run(&spec) else {
            panic!("pwd did not complete");
        };
        let expected = temp.path().canonicalize().unwrap();
        assert_eq!(std::path::Path::new(stdout.trim()).canonicalize().unwrap(), expected);
    }
}
