use super::bootstrap::BootstrapOptions;
use std::path::{Path, PathBuf};

/// Idle ticks before a half-open remote connection is abandoned
#[cfg(not(test))]
const DEFAULT_RETRY_LIMIT: u32 = 40;
#[cfg(test)]
const DEFAULT_RETRY_LIMIT: u32 = 4;

/// Master 进程配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖 (启动握手的选项优先)：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | DATA_PATH | /var/lib/crab/master | 数据目录 |
/// | REMOTE_PORT | 10001 | 远程命令端口 |
/// | TICK_INTERVAL_MS | 500 | 调度间隔(毫秒) |
/// | POLL_WAIT_MS | 20 | 每次 tick 等待 socket 的上限(毫秒) |
/// | CONNECTION_RETRY_LIMIT | 40 | 空闲 tick 数上限，超过后断开半开连接 |
/// | LICENSE_TERMINALS | 4 | 许可终端数 (含本地终端) |
/// | DISPLAY | :0 | 当前显示 |
/// | NETWORK_ENABLED | true | 是否监听远程端口 |
/// | BOOTSTRAP_SOCKET | - | 启动器握手 socket |
/// | LOG_LEVEL | debug | 日志级别 |
/// | LOG_DIR | - | 日志文件目录 |
/// | RESTART_COMMAND | 当前可执行文件 | 重启看门狗命令 |
/// | EOD_HOOK | - | 日结完成后执行的命令 |
/// | REPORT_CHUNK | 25 | 报表每 tick 处理的账单数 |
///
/// # 示例
///
/// ```ignore
/// DATA_PATH=/srv/pos REMOTE_PORT=10010 cargo run -p crab-master
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 数据目录，存放配置页、账单库、归档等文件
    pub data_path: PathBuf,
    /// 远程命令端口 (0 = 随机端口，测试用)
    pub remote_port: u16,
    pub tick_interval_ms: u64,
    pub poll_wait_ms: u64,
    pub connection_retry_limit: u32,
    /// 许可终端数
    pub license_terminals: u32,
    /// 当前显示 (用于 server 终端选举)
    pub display: String,
    pub network_enabled: bool,
    pub bootstrap_socket: Option<PathBuf>,
    pub log_level: String,
    pub log_dir: Option<String>,
    /// 降低日志级别 (握手 `notrace`)
    pub notrace: bool,
    /// 启动前清除账单、归档和异常记录 (握手 `purge`)
    pub purge: bool,
    pub restart_command: Option<String>,
    pub eod_hook: Option<String>,
    pub report_chunk: usize,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        Self {
            data_path: std::env::var("DATA_PATH")
                .unwrap_or_else(|_| "/var/lib/crab/master".into())
                .into(),
            remote_port: env_parse("REMOTE_PORT", 10001),
            tick_interval_ms: env_parse("TICK_INTERVAL_MS", 500),
            poll_wait_ms: env_parse("POLL_WAIT_MS", 20),
            connection_retry_limit: env_parse("CONNECTION_RETRY_LIMIT", DEFAULT_RETRY_LIMIT),
            license_terminals: env_parse("LICENSE_TERMINALS", 4),
            display: std::env::var("DISPLAY").unwrap_or_else(|_| ":0".into()),
            network_enabled: env_parse("NETWORK_ENABLED", true),
            bootstrap_socket: env_opt("BOOTSTRAP_SOCKET").map(PathBuf::from),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "debug".into()),
            log_dir: env_opt("LOG_DIR"),
            notrace: false,
            purge: false,
            restart_command: env_opt("RESTART_COMMAND"),
            eod_hook: env_opt("EOD_HOOK"),
            report_chunk: env_parse("REPORT_CHUNK", 25usize).max(1),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(data_path: impl Into<PathBuf>, remote_port: u16) -> Self {
        let mut config = Self::from_env();
        config.data_path = data_path.into();
        config.remote_port = remote_port;
        config
    }

    /// 合并启动握手选项
    pub fn apply_bootstrap(&mut self, opts: &BootstrapOptions) {
        if let Some(path) = &opts.data_path {
            self.data_path = path.clone();
        }
        if let Some(display) = &opts.display {
            self.display = display.clone();
        }
        if !opts.network_enabled {
            self.network_enabled = false;
        }
        self.purge |= opts.purge;
        self.notrace |= opts.notrace;
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_path.join(name)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_file(".crab-master.lock")
    }

    pub fn batch_path(&self) -> PathBuf {
        self.data_file("batch")
    }

    pub fn batch_out_path(&self) -> PathBuf {
        self.data_file("batch.out")
    }

    pub fn checks_path(&self) -> PathBuf {
        self.data_file("checks.redb")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.data_file("archive")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_file("reports")
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_overrides() {
        let mut config = Config::with_overrides("/tmp/crab", 0);
        let opts = BootstrapOptions {
            data_path: Some("/srv/pos".into()),
            network_enabled: false,
            display: Some("host:1".into()),
            purge: true,
            notrace: true,
        };
        config.apply_bootstrap(&opts);
        assert_eq!(config.data_path, PathBuf::from("/srv/pos"));
        assert_eq!(config.display, "host:1");
        assert!(!config.network_enabled);
        assert!(config.purge && config.notrace);
        assert_eq!(config.batch_path(), PathBuf::from("/srv/pos/batch"));
    }

    #[test]
    fn test_retry_limit_smaller_under_test() {
        assert_eq!(DEFAULT_RETRY_LIMIT, 4);
    }
}
