//! Child-process management for task commands.
//!
//! The [`ProcessManager`] spawns task commands and tracks a kill switch for
//! each. While the manager is open new children can be spawned; closing it
//! flips every kill switch and refuses further spawns, which is how the
//! runner tears everything down on a terminating signal.
//!
//! Task commands always run through the system shell in the package
//! directory, with output piped back line-by-line.

use std::{
    collections::BTreeMap,
    io,
    sync::{Arc, Mutex},
};

use lazyrepo_paths::{AbsoluteSystemPath, AbsoluteSystemPathBuf};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{ChildStderr, ChildStdout},
    sync::{oneshot, watch},
};
use tracing::{debug, trace};

/// A shell command to run in a directory with a fixed environment.
#[derive(Debug, Clone)]
pub struct Command {
    script: String,
    cwd: AbsoluteSystemPathBuf,
    env: BTreeMap<String, String>,
}

impl Command {
    pub fn shell(script: impl Into<String>, cwd: &AbsoluteSystemPath) -> Self {
        Command {
            script: script.into(),
            cwd: cwd.to_owned(),
            env: BTreeMap::new(),
        }
    }

    /// Vars set on top of the inherited parent environment.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn label(&self) -> &str {
        &self.script
    }

    fn build(&self) -> tokio::process::Command {
        #[cfg(windows)]
        let (shell, flag) = ("cmd", "/C");
        #[cfg(not(windows))]
        let (shell, flag) = ("sh", "-c");

        let mut command = tokio::process::Command::new(shell);
        command
            .arg(flag)
            .arg(&self.script)
            .current_dir(self.cwd.as_std_path())
            .envs(&self.env)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

/// How a child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    Finished(i32),
    /// Killed through the manager's kill switch.
    Killed,
    /// No exit code (terminated by a signal we didn't send, or wait failed).
    Failed,
}

impl ChildExit {
    pub fn success(&self) -> bool {
        matches!(self, ChildExit::Finished(0))
    }
}

/// A spawned task command. Dropping it does not kill the process; the
/// manager owns the kill switch.
pub struct Child {
    label: String,
    exit: oneshot::Receiver<ChildExit>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl Child {
    /// Streams the child's stdout and stderr, line by line, into `writer`,
    /// then reports how the child exited.
    pub async fn wait_with_piped_outputs<W: io::Write>(
        &mut self,
        mut writer: W,
    ) -> Result<ChildExit, io::Error> {
        let stdout = self.stdout.take().expect("child stdout is piped");
        let stderr = self.stderr.take().expect("child stderr is piped");
        let mut stdout = BufReader::new(stdout).lines();
        let mut stderr = BufReader::new(stderr).lines();
        let (mut out_open, mut err_open) = (true, true);

        while out_open || err_open {
            tokio::select! {
                line = stdout.next_line(), if out_open => match line? {
                    Some(line) => write_line(&mut writer, &line)?,
                    None => out_open = false,
                },
                line = stderr.next_line(), if err_open => match line? {
                    Some(line) => write_line(&mut writer, &line)?,
                    None => err_open = false,
                },
            }
        }

        let exit = (&mut self.exit).await.unwrap_or(ChildExit::Failed);
        trace!("child '{}' exited: {exit:?}", self.label);
        Ok(exit)
    }
}

fn write_line<W: io::Write>(writer: &mut W, line: &str) -> Result<(), io::Error> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}

#[derive(Debug, Default)]
struct ProcessManagerInner {
    is_closing: bool,
    kill_switches: Vec<watch::Sender<bool>>,
}

/// See module docs.
#[derive(Debug, Clone, Default)]
pub struct ProcessManager {
    state: Arc<Mutex<ProcessManagerInner>>,
}

impl ProcessManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `command` unless the manager is closing.
    ///
    /// `None` means the manager is closed and nothing was spawned;
    /// `Some(Err)` means the spawn itself failed.
    pub fn spawn(&self, command: Command) -> Option<io::Result<Child>> {
        let mut lock = self.state.lock().expect("process manager lock");
        if lock.is_closing {
            debug!("refusing to spawn '{}': manager closing", command.label());
            return None;
        }

        let label = command.label().to_string();
        let mut child = match command.build().spawn() {
            Ok(child) => child,
            Err(err) => return Some(Err(err)),
        };
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (kill_tx, mut kill_rx) = watch::channel(false);
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(async move {
            let exit = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => status
                        .code()
                        .map(ChildExit::Finished)
                        .unwrap_or(ChildExit::Failed),
                    Err(_) => ChildExit::Failed,
                },
                _ = kill_rx.changed() => {
                    child.start_kill().ok();
                    child.wait().await.ok();
                    ChildExit::Killed
                }
            };
            exit_tx.send(exit).ok();
        });
        lock.kill_switches.push(kill_tx);

        Some(Ok(Child {
            label,
            exit: exit_rx,
            stdout,
            stderr,
        }))
    }

    /// Kills every running child and refuses further spawns.
    pub fn close(&self) {
        let mut lock = self.state.lock().expect("process manager lock");
        lock.is_closing = true;
        for kill_switch in lock.kill_switches.drain(..) {
            kill_switch.send(true).ok();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cwd() -> AbsoluteSystemPathBuf {
        AbsoluteSystemPathBuf::cwd().unwrap()
    }

    #[tokio::test]
    async fn test_exit_codes() {
        let manager = ProcessManager::new();
        let mut child = manager
            .spawn(Command::shell("exit 3", &cwd()))
            .unwrap()
            .unwrap();
        let exit = child.wait_with_piped_outputs(Vec::new()).await.unwrap();
        assert_eq!(exit, ChildExit::Finished(3));
        assert!(!exit.success());
    }

    #[tokio::test]
    async fn test_output_is_piped() {
        let manager = ProcessManager::new();
        let mut child = manager
            .spawn(Command::shell("echo hello && echo oops >&2", &cwd()))
            .unwrap()
            .unwrap();
        let mut output = Vec::new();
        let exit = child.wait_with_piped_outputs(&mut output).await.unwrap();
        assert!(exit.success());
        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("hello\n"));
        assert!(output.contains("oops\n"));
    }

    #[tokio::test]
    async fn test_env_overrides_are_applied() {
        let manager = ProcessManager::new();
        let env = BTreeMap::from([("ANSWER".to_string(), "42".to_string())]);
        let mut child = manager
            .spawn(Command::shell("echo $ANSWER", &cwd()).with_env(env))
            .unwrap()
            .unwrap();
        let mut output = Vec::new();
        child.wait_with_piped_outputs(&mut output).await.unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "42\n");
    }

    #[tokio::test]
    async fn test_closed_manager_refuses_spawns() {
        let manager = ProcessManager::new();
        manager.close();
        assert!(manager.spawn(Command::shell("true", &cwd())).is_none());
    }

    #[tokio::test]
    async fn test_close_kills_running_children() {
        let manager = ProcessManager::new();
        let mut child = manager
            .spawn(Command::shell("sleep 30", &cwd()))
            .unwrap()
            .unwrap();
        manager.close();
        let exit = child.wait_with_piped_outputs(Vec::new()).await.unwrap();
        assert_eq!(exit, ChildExit::Killed);
    }
}
