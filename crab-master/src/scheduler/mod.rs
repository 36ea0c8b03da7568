//! 协作式调度器
//!
//! 单线程主循环。每个 tick 依次执行：
//!
//! | 步骤 | 内容 |
//! |------|------|
//! | 1 | 回收子进程 |
//! | 2 | 重启请求 (无活动会话时) |
//! | 3 | 远程连接轮询 |
//! | 4 | 时钟翻转通知 |
//! | 5 | 日结状态机前进一步 |
//! | 6 | 终端维护：配置重载、超时、闪烁、移除 |
//! | 7 | 无终端则关闭 |
//! | 8 | 一个后台任务单元 |
//!
//! 打印在独立任务中进行，不占用 tick。

pub mod clock;
pub mod eod;
pub mod jobs;
pub mod reaper;
pub mod reports;

pub use clock::{Rollover, WallClock};
pub use eod::{EndOfDay, EodStage};
pub use jobs::{BatchJob, BatchQueue, JobOutcome};
pub use reaper::ChildReaper;
pub use reports::{ReportJob, ReportKind, ReportOutput, ReportStep};

use crate::core::{Control, ShutdownOutcome};
use crate::protocol::RemoteListener;
use crate::utils::time::{local_now, millis};
use chrono::NaiveDateTime;
use futures::FutureExt;
use shared::error::AppResult;
use shared::message::UpdateEvent;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Shutdown(ShutdownOutcome),
    /// Watchdog spawned and the system shut down
    Restart,
    /// Already shut down; nothing ran
    Stopped,
}

/// How the main loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Shutdown(ShutdownOutcome),
    Restart,
    /// Ctrl+C; no cleanup performed
    Interrupted,
    /// A tick panicked; a forced shutdown was attempted
    Crashed(ShutdownOutcome),
}

pub struct Scheduler {
    ctl: Control,
    listener: RemoteListener,
    clock: WallClock,
    batch: BatchQueue,
    last_blink: i64,
}

impl Scheduler {
    pub fn new(ctl: Control, listener: RemoteListener) -> Self {
        let batch = BatchQueue::new(ctl.config.batch_path(), ctl.config.batch_out_path());
        Self {
            ctl,
            listener,
            clock: WallClock::new(),
            batch,
            last_blink: 0,
        }
    }

    pub fn ctl(&self) -> &Control {
        &self.ctl
    }

    pub fn ctl_mut(&mut self) -> &mut Control {
        &mut self.ctl
    }

    pub fn listener_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn batch(&self) -> &BatchQueue {
        &self.batch
    }

    pub fn into_control(self) -> Control {
        self.ctl
    }

    pub async fn tick(&mut self) -> TickOutcome {
        self.tick_at(local_now()).await
    }

    /// Run one scheduler pass as if the wall clock read `now`
    pub async fn tick_at(&mut self, now: NaiveDateTime) -> TickOutcome {
        if self.ctl.is_shut_down() {
            return TickOutcome::Stopped;
        }
        let now_ms = millis(now);

        for (label, status) in self.ctl.children.reap() {
            tracing::debug!(child = %label, status = %status, "Child reaped");
        }

        if self.ctl.restart_requested() && self.ctl.registry.active_sessions() == 0 {
            if let Err(e) = self.ctl.spawn_restart_watchdog() {
                tracing::error!(error = %e, "Failed to start restart watchdog");
            }
            self.ctl.shutdown("restart").await;
            return TickOutcome::Restart;
        }

        self.listener.poll(&mut self.ctl).await;

        for rollover in self.clock.observe(now, &self.ctl.settings) {
            match rollover {
                Rollover::Minute => self.ctl.registry.notify_all(UpdateEvent::Minute),
                Rollover::Hour => self.ctl.registry.notify_all(UpdateEvent::Hour),
                Rollover::Day => self.ctl.registry.notify_all(UpdateEvent::Day),
                Rollover::MealPeriod(name) => {
                    tracing::info!(period = %name, "Meal period changed");
                    self.ctl.registry.notify_all_with(UpdateEvent::MealPeriod, &name);
                }
            }
        }

        eod::advance(&mut self.ctl, now_ms);

        self.maintain_terminals(now_ms);

        if self.ctl.registry.terminal_count() == 0 {
            tracing::info!("No terminals left");
            return TickOutcome::Shutdown(self.ctl.shutdown("no terminals").await);
        }

        match self.batch.run_one(&mut self.ctl) {
            JobOutcome::Exit => TickOutcome::Shutdown(self.ctl.shutdown("batch exit").await),
            JobOutcome::Idle | JobOutcome::Worked => TickOutcome::Continue,
        }
    }

    fn maintain_terminals(&mut self, now_ms: i64) {
        let idle_ms = (self.ctl.settings.idle_timeout_secs as i64).saturating_mul(1000);
        let blink_ms = (self.ctl.settings.blink_secs as i64).saturating_mul(1000);
        let blink = blink_ms > 0 && now_ms - self.last_blink >= blink_ms;
        if blink {
            self.last_blink = now_ms;
        }

        let mut doomed = Vec::new();
        for id in self.ctl.registry.terminal_ids() {
            if let Err(e) = self.ctl.registry.reload_copy(id) {
                tracing::warn!(terminal = id, error = %e, "Configuration reload deferred");
            }
            let Some(node) = self.ctl.registry.terminal_mut(id) else {
                continue;
            };
            if node.kill_pending {
                doomed.push(id);
                continue;
            }
            let timed_out = node.timeout_due(now_ms, idle_ms);
            if timed_out {
                node.timed_out = true;
                self.ctl.registry.notify(id, UpdateEvent::Timeout);
            }
            if blink {
                self.ctl.registry.notify(id, UpdateEvent::Blink);
            }
        }

        for id in doomed {
            if let Some(node) = self.ctl.registry.remove_terminal(id) {
                tracing::info!(terminal = id, host = %node.host, "Terminal removed");
            }
        }
    }

    /// Tick until shutdown, restart or a signal
    pub async fn run(&mut self) -> AppResult<RunOutcome> {
        let period = Duration::from_millis(self.ctl.config.tick_interval_ms.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        #[cfg(unix)]
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        tracing::info!(interval_ms = period.as_millis() as u64, "Scheduler running");
        loop {
            #[cfg(unix)]
            let sigterm = terminate.recv();
            #[cfg(not(unix))]
            let sigterm = std::future::pending::<Option<()>>();

            tokio::select! {
                biased;
                _ = &mut ctrl_c => {
                    tracing::warn!("Received Ctrl+C, exiting without cleanup");
                    return Ok(RunOutcome::Interrupted);
                }
                _ = sigterm => {
                    tracing::info!("Received SIGTERM, shutting down");
                    return Ok(RunOutcome::Shutdown(self.ctl.shutdown("SIGTERM").await));
                }
                _ = interval.tick() => {
                    match AssertUnwindSafe(self.tick()).catch_unwind().await {
                        Ok(TickOutcome::Continue) => {}
                        Ok(TickOutcome::Shutdown(outcome)) => return Ok(RunOutcome::Shutdown(outcome)),
                        Ok(TickOutcome::Restart) => return Ok(RunOutcome::Restart),
                        Ok(TickOutcome::Stopped) => {
                            return Ok(RunOutcome::Shutdown(ShutdownOutcome::WithoutCleanup));
                        }
                        Err(_) => {
                            tracing::error!("Scheduler tick panicked, forcing shutdown");
                            let outcome = self.ctl.shutdown("panic").await;
                            return Ok(RunOutcome::Crashed(outcome));
                        }
                    }
                }
            }
        }
    }
}
