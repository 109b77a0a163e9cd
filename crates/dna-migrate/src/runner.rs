//! Step script execution.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{MigrateError, Result};

/// How often a running script is checked for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs the script of an automated migration step.
pub trait ScriptRunner: Send + Sync {
    /// Run `script` with `project_path` as working directory and return its
    /// output.
    ///
    /// A script still running after `timeout` is stopped and reported as
    /// [`MigrateError::TimedOut`]. Nothing the script started may still be
    /// running when this returns.
    fn execute(&self, script: &str, project_path: &Path, timeout: Duration) -> Result<String>;
}

/// Runs scripts with `sh -c`.
///
/// On Unix each script gets its own process group, and the whole group is
/// killed once the script exits or times out.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellScriptRunner;

impl ScriptRunner for ShellScriptRunner {
    fn execute(&self, script: &str, project_path: &Path, timeout: Duration) -> Result<String> {
        debug!(script, project = %project_path.display(), "running step script");
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(script)
            .current_dir(project_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command
            .spawn()
            .map_err(|e| MigrateError::Script(format!("failed to invoke sh: {e}")))?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    terminate(&mut child);
                    warn!(script, timeout_secs = timeout.as_secs_f64(), "step script timed out");
                    return Err(MigrateError::TimedOut {
                        operation: "script".to_string(),
                        timeout,
                    });
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    terminate(&mut child);
                    return Err(MigrateError::Script(format!("waiting for sh: {e}")));
                }
            }
        };
        // Background jobs would otherwise keep writing after the step ends.
        kill_group(&child);

        let stdout = collect(stdout);
        if !status.success() {
            let stderr = collect(stderr);
            let code = status.code().map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(MigrateError::Script(format!("exit status {code}: {}", stderr.trim())));
        }
        Ok(stdout.trim().to_string())
    }
}

/// Read a child pipe to the end on a separate thread, so a chatty script
/// never blocks on a full pipe.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(reader: Option<JoinHandle<String>>) -> String {
    reader.and_then(|r| r.join().ok()).unwrap_or_default()
}

/// Kill the script and everything it started, then reap it.
fn terminate(child: &mut Child) {
    kill_group(child);
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_group(child: &Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    // The group is gone (ESRCH) when nothing in it is left running.
    if let Ok(pgid) = i32::try_from(child.id()) {
        let _ = killpg(Pid::from_raw(pgid), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

#[cfg(test)]
mod tests {
    use super::*;

    const GENEROUS: Duration = Duration::from_secs(30);

    #[test]
    fn shell_runner_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let out = ShellScriptRunner.execute("echo hello", dir.path(), GENEROUS).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn shell_runner_runs_in_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        ShellScriptRunner
            .execute("echo done > marker.txt", dir.path(), GENEROUS)
            .unwrap();
        assert!(dir.path().join("marker.txt").is_file());
    }

    #[test]
    fn shell_runner_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = ShellScriptRunner
            .execute("echo broken >&2; exit 3", dir.path(), GENEROUS)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("exit status 3"));
        assert!(message.contains("broken"));
    }

    #[test]
    fn large_output_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let out = ShellScriptRunner
            .execute("i=0; while [ $i -lt 20000 ]; do echo line-$i; i=$((i+1)); done", dir.path(), GENEROUS)
            .unwrap();
        assert!(out.ends_with("line-19999"));
    }

    #[test]
    fn timed_out_script_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let err = ShellScriptRunner
            .execute("sleep 1; echo late > late.txt", dir.path(), Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, MigrateError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(1));

        std::thread::sleep(Duration::from_millis(1500));
        assert!(!dir.path().join("late.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn background_jobs_do_not_outlive_the_script() {
        let dir = tempfile::tempdir().unwrap();
        ShellScriptRunner
            .execute("(sleep 1; echo late > late.txt) > /dev/null 2>&1 &", dir.path(), GENEROUS)
            .unwrap();

        std::thread::sleep(Duration::from_millis(1500));
        assert!(!dir.path().join("late.txt").exists());
    }
}
