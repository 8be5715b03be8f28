//! # Subworker Pool
//!
//! Owns the OS processes backing multi-process mode. Subworkers are started by
//! re-executing a program (normally the daemon binary in its hidden `subworker`
//! mode), so no process state is inherited across the boundary; each child
//! builds its own bus connections.

use std::fmt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use tracing::{debug, error, info, warn};

use crate::error::DaemonError;

/// Program and arguments used to start one subworker.
///
/// The pool appends `--id <n>` to `args` for every child it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubworkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl SubworkerCommand {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Re-execute the running binary with `args`
    pub fn current_exe<I, S>(args: I) -> std::io::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::new(std::env::current_exe()?, args))
    }

    fn spawn(&self, worker_id: usize) -> Result<Child, DaemonError> {
        Command::new(&self.program)
            .args(&self.args)
            .arg("--id")
            .arg(worker_id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| DaemonError::SubworkerSpawn { worker_id, source })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubworkerHealth {
    Running,
    Exited(ExitStatus),
}

struct SubworkerHandle {
    id: usize,
    child: Child,
    health: SubworkerHealth,
}

/// Fixed-size roster of subworker processes
pub struct SubworkerPool {
    command: SubworkerCommand,
    size: usize,
    respawn_exited: bool,
    workers: Vec<SubworkerHandle>,
    respawns: usize,
}

impl fmt::Debug for SubworkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubworkerPool")
            .field("program", &self.command.program)
            .field("size", &self.size)
            .field("running", &self.running_count())
            .field("respawns", &self.respawns)
            .finish()
    }
}

impl SubworkerPool {
    /// Start `size` subworkers. Children already started are killed if a later spawn fails.
    pub fn spawn(
        command: SubworkerCommand,
        size: usize,
        respawn_exited: bool,
    ) -> Result<Self, DaemonError> {
        let mut pool = Self {
            command,
            size,
            respawn_exited,
            workers: Vec::with_capacity(size),
            respawns: 0,
        };

        for id in 0..size {
            let child = pool.command.spawn(id)?;
            debug!(worker_id = id, pid = child.id(), "Subworker spawned");
            pool.workers.push(SubworkerHandle {
                id,
                child,
                health: SubworkerHealth::Running,
            });
        }

        info!(
            size = size,
            program = %pool.command.program.display(),
            pids = ?pool.pids(),
            "Subworker pool started"
        );
        Ok(pool)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of processes on the roster, running or not
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.workers.iter().map(|w| w.child.id()).collect()
    }

    pub fn running_count(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.health == SubworkerHealth::Running)
            .count()
    }

    pub fn health(&self) -> Vec<(usize, SubworkerHealth)> {
        self.workers.iter().map(|w| (w.id, w.health)).collect()
    }

    pub fn respawns(&self) -> usize {
        self.respawns
    }

    /// Reap children that exited on their own; returns their ids.
    ///
    /// With `respawn_exited` set, exited children are replaced immediately.
    pub fn check_health(&mut self) -> Vec<usize> {
        let mut exited = Vec::new();

        for worker in &mut self.workers {
            if worker.health != SubworkerHealth::Running {
                continue;
            }
            match worker.child.try_wait() {
                Ok(Some(status)) => {
                    warn!(worker_id = worker.id, status = %status, "Subworker exited");
                    worker.health = SubworkerHealth::Exited(status);
                    exited.push(worker.id);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(worker_id = worker.id, error = %e, "Failed to poll subworker status");
                }
            }
        }

        if self.respawn_exited && !exited.is_empty() {
            if let Err(e) = self.respawn_exited() {
                error!(error = %e, "Failed to respawn subworker");
            }
        }

        exited
    }

    /// Replace every exited child with a fresh process; returns how many were started
    pub fn respawn_exited(&mut self) -> Result<usize, DaemonError> {
        let mut started = 0;

        for worker in &mut self.workers {
            if worker.health == SubworkerHealth::Running {
                continue;
            }
            worker.child = self.command.spawn(worker.id)?;
            worker.health = SubworkerHealth::Running;
            started += 1;
            info!(worker_id = worker.id, pid = worker.child.id(), "Subworker respawned");
        }

        self.respawns += started;
        Ok(started)
    }

    /// Kill every child immediately and clear the roster. In-flight jobs are lost.
    pub fn terminate_all(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        let count = self.workers.len();
        for mut worker in self.workers.drain(..) {
            if worker.health == SubworkerHealth::Running {
                if let Err(e) = worker.child.kill() {
                    warn!(worker_id = worker.id, error = %e, "Failed to kill subworker");
                }
            }
            if let Err(e) = worker.child.wait() {
                warn!(worker_id = worker.id, error = %e, "Failed to reap subworker");
            }
        }

        info!(terminated = count, "Subworker pool terminated");
    }
}

impl Drop for SubworkerPool {
    fn drop(&mut self) {
        self.terminate_all();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    fn shell(script: &str) -> SubworkerCommand {
        // The appended `--id <n>` lands in $0/$1 and is ignored
        SubworkerCommand::new("/bin/sh", ["-c", script])
    }

    fn wait_for_exits(pool: &mut SubworkerPool, expected: usize) -> Vec<usize> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut exited = Vec::new();
        while exited.len() < expected && Instant::now() < deadline {
            exited.extend(pool.check_health());
            thread::sleep(Duration::from_millis(20));
        }
        exited
    }

    #[test]
    fn test_spawn_and_terminate_all() {
        let mut pool = SubworkerPool::spawn(shell("sleep 30"), 3, false).unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.running_count(), 3);
        assert!(pool.check_health().is_empty());

        pool.terminate_all();
        assert!(pool.is_empty());
        assert_eq!(pool.running_count(), 0);
    }

    #[test]
    fn test_exited_children_are_detected() {
        let mut pool = SubworkerPool::spawn(shell("exit 3"), 2, false).unwrap();

        let mut exited = wait_for_exits(&mut pool, 2);
        exited.sort_unstable();
        assert_eq!(exited, vec![0, 1]);
        assert!(pool
            .health()
            .iter()
            .all(|(_, health)| matches!(health, SubworkerHealth::Exited(status) if status.code() == Some(3))));

        assert_eq!(pool.respawn_exited().unwrap(), 2);
        assert_eq!(pool.respawns(), 2);
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let err = SubworkerPool::spawn(
            SubworkerCommand::new("/nonexistent/tasker-dispatchd", Vec::<String>::new()),
            2,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, DaemonError::SubworkerSpawn { worker_id: 0, .. }));
    }
}
