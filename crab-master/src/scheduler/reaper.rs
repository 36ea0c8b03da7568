//! 子进程回收
//!
//! 重启看门狗和日结钩子都以子进程形式运行；每个 tick 非阻塞地检查一次。

use shared::error::{AppError, AppResult};
use std::process::ExitStatus;
use tokio::process::{Child, Command};

struct Tracked {
    label: String,
    child: Child,
}

/// Children spawned by the master, reaped without blocking
#[derive(Default)]
pub struct ChildReaper {
    children: Vec<Tracked>,
}

impl ChildReaper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `command_line` (program followed by whitespace separated args)
    pub fn spawn(&mut self, label: &str, command_line: &str) -> AppResult<Option<u32>> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| AppError::invalid(format!("empty {} command", label)))?;
        let child = Command::new(program).args(parts).spawn()?;
        let pid = child.id();
        tracing::info!(child = %label, pid = ?pid, command = %command_line, "Child process started");
        self.children.push(Tracked {
            label: label.to_string(),
            child,
        });
        Ok(pid)
    }

    /// Collect every child that has exited
    pub fn reap(&mut self) -> Vec<(String, ExitStatus)> {
        let mut finished = Vec::new();
        self.children.retain_mut(|t| match t.child.try_wait() {
            Ok(Some(status)) => {
                tracing::info!(child = %t.label, status = %status, "Child process exited");
                finished.push((t.label.clone(), status));
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(child = %t.label, error = %e, "Failed to poll child process");
                false
            }
        });
        finished
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
