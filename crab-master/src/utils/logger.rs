//! Logging Infrastructure
//!
//! Console output always; a daily rolling file is added when a log
//! directory is configured. `RUST_LOG` overrides the configured level.

use std::backtrace::Backtrace;
use std::fs;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Effective level after the `notrace` handshake option
fn effective_level(level: &str, notrace: bool) -> &str {
    match (notrace, level) {
        (true, "trace" | "debug") => "info",
        _ => level,
    }
}

/// Initialize the logging system
///
/// # Examples
/// ```no_run
/// // Console only
/// crab_master::init_logger("debug", false, None).unwrap();
///
/// // Console + daily file under /var/log/crab
/// crab_master::init_logger("info", false, Some("/var/log/crab")).unwrap();
/// ```
pub fn init_logger(level: &str, notrace: bool, log_dir: Option<&str>) -> anyhow::Result<()> {
    let level = effective_level(level, notrace);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    match log_dir {
        Some(dir) => {
            let log_dir = Path::new(dir);
            fs::create_dir_all(log_dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "crab-master");
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(std::sync::Mutex::new(appender));
            subscriber.with(file_layer).try_init()?;
        }
        None => subscriber.try_init()?,
    }
    Ok(())
}

/// Log panics with a captured backtrace before unwinding continues
///
/// The scheduler catches the unwind and turns it into a forced shutdown.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::force_capture();
        tracing::error!(
            target: "fatal",
            panic = %info,
            backtrace = %backtrace,
            "Fatal runtime fault"
        );
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notrace_lowers_verbosity() {
        assert_eq!(effective_level("debug", true), "info");
        assert_eq!(effective_level("trace", true), "info");
        assert_eq!(effective_level("warn", true), "warn");
        assert_eq!(effective_level("debug", false), "debug");
    }
}
