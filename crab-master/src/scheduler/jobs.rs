//! 后台命令文件 `<data>/batch`
//!
//! | 命令 | 参数 | 说明 |
//! |------|------|------|
//! | `report` | `<sales\|checks> [printer]` | 分块生成报表 |
//! | `printer` | `<name>` | 切换报表打印机 |
//! | `nologin` | - | 禁止登录 |
//! | `endday` | - | 请求日结 |
//! | `macros` | `[file]` | 回放宏 (默认 `<data>/macros`) |
//! | `ping` | - | 向 `batch.out` 追加 `pong` |
//! | `usercount` | - | 向 `batch.out` 追加在线用户数 |
//! | `exit` | - | 关闭系统 |
//!
//! 每个 tick 只执行一个工作单元；文件中的任务全部完成后删除该文件。

use super::reports::{ReportJob, ReportKind, ReportStep};
use crate::core::Control;
use crate::persist::files;
use crate::utils::time::local_now;
use shared::error::AppResult;
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};

/// 可恢复的后台任务
#[derive(Debug, Clone, PartialEq)]
pub enum BatchJob {
    Report(ReportJob),
    Printer(String),
    NoLogin,
    EndDay,
    Macros(Option<PathBuf>),
    Ping,
    UserCount,
    Exit,
}

impl BatchJob {
    /// Parse one line: first word is the key, the rest the value
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (key, value) = match line.split_once(char::is_whitespace) {
            Some((k, v)) => (k, v.trim()),
            None => (line, ""),
        };
        match key.to_ascii_lowercase().as_str() {
            "report" => {
                let mut words = value.split_whitespace();
                let kind = words
                    .next()
                    .ok_or_else(|| "report needs a kind".to_string())?
                    .parse::<ReportKind>()?;
                let printer = words.next().map(str::to_string);
                Ok(Self::Report(ReportJob::new(kind, printer)))
            }
            "printer" if !value.is_empty() => Ok(Self::Printer(value.to_string())),
            "printer" => Err("printer needs a name".into()),
            "nologin" => Ok(Self::NoLogin),
            "endday" => Ok(Self::EndDay),
            "macros" => Ok(Self::Macros((!value.is_empty()).then(|| PathBuf::from(value)))),
            "ping" => Ok(Self::Ping),
            "usercount" => Ok(Self::UserCount),
            "exit" => Ok(Self::Exit),
            other => Err(format!("unknown job '{}'", other)),
        }
    }
}

/// Outcome of one scheduler slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Idle,
    Worked,
    Exit,
}

/// Background job queue fed from the batch file
pub struct BatchQueue {
    path: PathBuf,
    out_path: PathBuf,
    jobs: VecDeque<BatchJob>,
    loaded: bool,
}

impl BatchQueue {
    pub fn new(path: impl Into<PathBuf>, out_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            out_path: out_path.into(),
            jobs: VecDeque::new(),
            loaded: false,
        }
    }

    /// Whether a batch file is being worked through
    pub fn is_pending(&self) -> bool {
        self.loaded
    }

    pub fn remaining(&self) -> usize {
        self.jobs.len()
    }

    fn load(&mut self) -> AppResult<bool> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            match BatchJob::parse(line) {
                Ok(job) => self.jobs.push_back(job),
                Err(reason) => tracing::warn!(line = %line, reason = %reason, "Skipping batch line"),
            }
        }
        self.loaded = true;
        tracing::info!(path = %self.path.display(), jobs = self.jobs.len(), "Batch file loaded");
        Ok(true)
    }

    /// Execute exactly one unit of background work
    pub fn run_one(&mut self, ctl: &mut Control) -> JobOutcome {
        if !self.loaded {
            match self.load() {
                Ok(true) => {}
                Ok(false) => return JobOutcome::Idle,
                Err(e) => {
                    tracing::error!(path = %self.path.display(), error = %e, "Failed to read batch file");
                    return JobOutcome::Idle;
                }
            }
        }

        let outcome = match self.jobs.pop_front() {
            Some(mut job) => {
                let (outcome, unfinished) = self.execute(&mut job, ctl);
                if unfinished {
                    self.jobs.push_front(job);
                }
                outcome
            }
            None => JobOutcome::Idle,
        };

        if self.jobs.is_empty() {
            self.finish();
        }
        outcome
    }

    /// Returns the outcome and whether the job needs more units
    fn execute(&self, job: &mut BatchJob, ctl: &mut Control) -> (JobOutcome, bool) {
        match job {
            BatchJob::Report(report) => match report.step(ctl) {
                Ok(ReportStep::Pending) => return (JobOutcome::Worked, true),
                Ok(ReportStep::Done(_)) => {}
                Err(e) => tracing::error!(report = ?report.kind(), error = %e, "Report failed"),
            },
            BatchJob::Printer(name) => {
                if let Err(e) = ctl.set_report_printer(name) {
                    tracing::warn!(printer = %name, error = %e, "Report printer not changed");
                }
            }
            BatchJob::NoLogin => ctl.disable_logins(),
            BatchJob::EndDay => {
                if !ctl.eod.request() {
                    tracing::info!("End of day already running");
                }
            }
            BatchJob::Macros(path) => {
                let path = path
                    .clone()
                    .unwrap_or_else(|| ctl.config.data_file(files::MACROS));
                if let Err(e) = ctl.replay_macros(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "Macro replay failed");
                }
            }
            BatchJob::Ping => {
                let line = format!("pong {}", local_now().format("%Y-%m-%d %H:%M:%S"));
                self.append_out(&line);
            }
            BatchJob::UserCount => {
                let line = format!(
                    "usercount {} terminals {}",
                    ctl.registry.active_sessions(),
                    ctl.registry.terminal_count()
                );
                self.append_out(&line);
            }
            BatchJob::Exit => return (JobOutcome::Exit, false),
        }
        (JobOutcome::Worked, false)
    }

    fn append_out(&self, line: &str) {
        if let Err(e) = append_line(&self.out_path, line) {
            tracing::warn!(path = %self.out_path.display(), error = %e, "Failed to write batch output");
        }
    }

    /// Delete the exhausted batch file and clear the pending flag
    fn finish(&mut self) {
        if !self.loaded {
            return;
        }
        self.loaded = false;
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Batch file done"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove batch file"),
        }
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{}", line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_jobs() {
        assert_eq!(BatchJob::parse("ping").unwrap(), BatchJob::Ping);
        assert_eq!(BatchJob::parse("  NOLOGIN ").unwrap(), BatchJob::NoLogin);
        assert_eq!(
            BatchJob::parse("printer Office Laser").unwrap(),
            BatchJob::Printer("Office Laser".into())
        );
        assert_eq!(BatchJob::parse("macros").unwrap(), BatchJob::Macros(None));
        assert_eq!(
            BatchJob::parse("macros /tmp/keys").unwrap(),
            BatchJob::Macros(Some(PathBuf::from("/tmp/keys")))
        );
        let BatchJob::Report(report) = BatchJob::parse("report sales Office").unwrap() else {
            panic!("expected report");
        };
        assert_eq!(report.kind(), ReportKind::Sales);
        assert!(BatchJob::parse("report").is_err());
        assert!(BatchJob::parse("printer").is_err());
        assert!(BatchJob::parse("reboot").is_err());
    }

    #[test]
    fn test_append_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.out");
        append_line(&path, "a").unwrap();
        append_line(&path, "b").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\n");
    }
}
