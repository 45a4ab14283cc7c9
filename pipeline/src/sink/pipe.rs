use std::io::{self, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};

use tracing::{debug, warn};

use super::SinkError;

/// A child process fed JPEG images on stdin (`-f image2pipe`).
pub(crate) struct ChildPipe {
    program: String,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl ChildPipe {
    pub(crate) fn spawn(program: &str, args: &[String], capture_stderr: bool) -> Result<Self, SinkError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(if capture_stderr { Stdio::piped() } else { Stdio::null() })
            .spawn()
            .map_err(|e| SinkError::Spawn {
                program: program.to_string(),
                reason: e.to_string(),
            })?;
        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SinkError::Spawn {
                program: program.to_string(),
                reason: "could not get stdin handle".into(),
            });
        };
        debug!(program, ?args, "child pipe started");
        Ok(Self {
            program: program.to_string(),
            child,
            stdin: Some(stdin),
        })
    }

    pub(crate) fn program(&self) -> &str {
        &self.program
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(data),
            None => Err(io::Error::from(io::ErrorKind::BrokenPipe)),
        }
    }

    /// Non-blocking check whether the child has already exited.
    pub(crate) fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(status) => status.is_some(),
            Err(e) => {
                warn!(program = %self.program, error = %e, "failed to poll child");
                true
            }
        }
    }

    /// Close stdin and wait for the child to finish. Returns the exit status
    /// and whatever it wrote to stderr.
    pub(crate) fn finish(mut self) -> io::Result<(ExitStatus, String)> {
        drop(self.stdin.take());
        let output = self.child.wait_with_output()?;
        Ok((output.status, String::from_utf8_lossy(&output.stderr).into_owned()))
    }

    pub(crate) fn kill(mut self) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
