//! Control 上下文
//!
//! 进程内唯一的可变状态，由调度循环持有并以 `&mut` 传递。
//! 没有全局变量，也没有锁。
//!
//! # 启动顺序
//!
//! 1. 时钟检查 (早于发布日期则拒绝启动)
//! 2. 数据目录 + 锁文件
//! 3. purge (可选)
//! 4. 加载持久化资源 (损坏则备份并重试)
//! 5. 加载 master 配置
//! 6. 打开账单库、扫描归档、启动打印任务
//! 7. 按 settings 打开终端

use super::config::Config;
use crate::message::UpdateBus;
use crate::orders::{ArchiveList, CardMatch, CheckStorage, find_card_payment};
use crate::persist::{
    AccountBook, Catalog, ExceptionLog, Inventory, Settings, TerminalDef, Versioned, files,
    load_or_recover, save,
};
use crate::printing::{PrintDispatcher, PrintJob, render_delivery_slip};
use crate::protocol::DeviceSpec;
use crate::registry::{LicenseSlot, PrinterId, PrinterKind, Registry, TerminalId, zone};
use crate::scheduler::eod::EndOfDay;
use crate::scheduler::reaper::ChildReaper;
use crate::utils::time::{local_now, now_millis};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::message::UpdateEvent;
use shared::order::Check;
use std::path::{Path, PathBuf};

/// Clocks earlier than this are treated as unset
pub const RELEASE_DATE: (i32, u32, u32) = (2025, 6, 1);

/// Default printer port for `host` without `:port`
const DEFAULT_PRINTER_PORT: u16 = 9100;

/// 关闭结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Clean,
    /// Shutdown was already done or under way
    WithoutCleanup,
}

/// Refuse to run with a clock earlier than the release date
pub fn check_clock(today: NaiveDate) -> AppResult<()> {
    let (y, m, d) = RELEASE_DATE;
    let release = NaiveDate::from_ymd_opt(y, m, d)
        .ok_or_else(|| AppError::internal("invalid release date"))?;
    if today < release {
        return Err(AppError::with_message(
            ErrorCode::ClockBeforeRelease,
            format!("system clock {} is earlier than release date {}", today, release),
        ));
    }
    Ok(())
}

fn load_resource<T: Versioned>(config: &Config, file: &str) -> AppResult<T> {
    let path = config.data_file(file);
    let loaded = load_or_recover::<T>(&path)?;
    if loaded.recovered {
        tracing::warn!(kind = T::KIND, path = %path.display(), "Recovered from corrupt file");
    }
    Ok(loaded.value)
}

/// Split `host[:port]`
fn split_printer_addr(addr: &str) -> (String, u16) {
    if addr.starts_with('/') {
        return (addr.to_string(), 0);
    }
    match addr.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (addr.to_string(), DEFAULT_PRINTER_PORT),
        },
        None => (addr.to_string(), DEFAULT_PRINTER_PORT),
    }
}

/// 系统上下文
pub struct Control {
    pub config: Config,
    pub registry: Registry,
    pub bus: UpdateBus,
    pub settings: Settings,
    pub catalog: Catalog,
    pub accounts: AccountBook,
    pub exceptions: ExceptionLog,
    pub inventory: Inventory,
    pub checks: CheckStorage,
    pub archives: ArchiveList,
    pub children: ChildReaper,
    pub eod: EndOfDay,
    printing: PrintDispatcher,
    report_printer: Option<PrinterId>,
    logins_disabled: bool,
    restart_requested: bool,
    shut_down: bool,
    lock_path: Option<PathBuf>,
}

impl Control {
    /// Bring the system up; errors here are fatal
    pub fn start(config: Config) -> AppResult<Self> {
        check_clock(local_now().date())?;
        let lock_path = prepare_data_path(&config)?;

        if config.purge {
            purge(&config)?;
        }

        let settings: Settings = load_resource(&config, files::SETTINGS)?;
        let catalog: Catalog = load_resource(&config, files::CATALOG)?;
        let mut accounts: AccountBook = load_resource(&config, files::ACCOUNTS)?;
        if accounts.ensure_defaults() {
            tracing::info!("Installed default chart of accounts");
        }
        let exceptions: ExceptionLog = load_resource(&config, files::EXCEPTIONS)?;
        let inventory: Inventory = load_resource(&config, files::INVENTORY)?;

        let bus = UpdateBus::new();
        let mut registry = Registry::new(config.license_terminals, config.display.clone(), bus.clone());
        let version = registry.load_master(config.data_path())?;
        tracing::info!(version = version, "Configuration loaded");

        for def in &settings.printers {
            if let Err(e) = registry.add_printer(def, true) {
                tracing::warn!(printer = %def.name, error = %e, "Skipping printer definition");
            }
        }

        let (checks, recovered) = CheckStorage::open_or_recover(config.checks_path())?;
        if recovered {
            tracing::warn!("Live check store was recovered empty");
        }
        let archives = ArchiveList::scan(config.archive_dir())?;
        let report_printer = registry.find_printer_by_kind(PrinterKind::Report);

        let mut ctl = Self {
            config,
            registry,
            bus,
            settings,
            catalog,
            accounts,
            exceptions,
            inventory,
            checks,
            archives,
            children: ChildReaper::new(),
            eod: EndOfDay::default(),
            printing: PrintDispatcher::spawn(),
            report_printer,
            logins_disabled: false,
            restart_requested: false,
            shut_down: false,
            lock_path: Some(lock_path),
        };
        ctl.open_configured_terminals();
        tracing::info!(
            terminals = ctl.registry.terminal_count(),
            printers = ctl.registry.printer_count(),
            checks = ctl.checks.check_count()?,
            archives = ctl.archives.len(),
            "Master started"
        );
        Ok(ctl)
    }

    fn open_configured_terminals(&mut self) {
        let now = now_millis();
        let mut defs = std::mem::take(&mut self.settings.terminals);
        let opened = self.registry.open_configured_terminals(&mut defs, now);
        for id in opened {
            let Some(host) = self.registry.terminal(id).map(|t| t.host.clone()) else {
                continue;
            };
            if let Some(def) = defs.iter().find(|d| d.host == host && d.printer_host.is_some()) {
                self.bind_terminal_printer(id, def);
            }
        }
        self.settings.terminals = defs;
    }

    fn bind_terminal_printer(&mut self, terminal: TerminalId, def: &TerminalDef) {
        let Some(addr) = def.printer_host.as_deref() else {
            return;
        };
        let (host, mut port) = split_printer_addr(addr);
        if !addr.contains(':') && !host.starts_with('/') {
            port = def.printer_port;
        }
        let result = self
            .registry
            .get_or_create_printer(&host, port, def.printer_model, PrinterKind::Receipt)
            .and_then(|pid| self.registry.bind_printer(terminal, pid));
        if let Err(e) = result {
            tracing::warn!(terminal = %def.name, printer = %addr, error = %e, "Printer binding failed");
        }
    }

    // ========== Remote terminals ==========

    /// `openterm`: open a remote terminal
    ///
    /// | 状态 | 行为 |
    /// |------|------|
    /// | 已有活动终端 | 不做任何事 |
    /// | 无定义 | 用给出的字段创建定义并保存，然后打开 |
    /// | 有定义，带 `update` | 用给出的字段更新定义并保存，然后打开 |
    /// | 有定义，不带 `update` | 按已保存的定义打开 |
    pub fn open_remote_terminal(
        &mut self,
        name: &str,
        host: &str,
        update: bool,
        device: Option<&DeviceSpec>,
    ) -> AppResult<TerminalId> {
        if let Some(id) = self.registry.find_terminal_by_host(host) {
            tracing::debug!(terminal = id, host = %host, "Terminal already open");
            return Ok(id);
        }

        let (mut def, store) = match self.settings.terminal_def(host).cloned() {
            Some(existing) if !update => (existing, false),
            existing => {
                let mut def = existing.unwrap_or_else(|| TerminalDef::new(name, host));
                def.name = name.to_string();
                if let Some(device) = device {
                    def.kind = device.kind;
                    def.printer_host = Some(device.printer_host.clone());
                    def.printer_model = device.printer_model;
                    def.drawers = device.drawers;
                }
                (def, true)
            }
        };
        def.server = false;

        let id = self.registry.add_terminal(&def, LicenseSlot::Remote, now_millis())?;
        if def.printer_host.is_some() {
            self.bind_terminal_printer(id, &def);
        }
        if store {
            self.remember_terminal(def)?;
        }
        Ok(id)
    }

    /// `closeterm`: removal happens at the next tick
    pub fn close_remote_terminal(&mut self, host: &str) -> AppResult<()> {
        let id = self
            .registry
            .find_terminal_by_host(host)
            .ok_or_else(|| AppError::terminal_not_found(host))?;
        self.registry.unbind_printer(id);
        self.registry.request_kill(id);
        tracing::info!(terminal = id, host = %host, "Terminal close requested");
        Ok(())
    }

    /// `cloneterm`: open `destination` with the setup of the terminal on `host`
    pub fn clone_terminal(&mut self, host: &str, destination: &str) -> AppResult<TerminalId> {
        let source = self
            .registry
            .find_terminal_by_host(host)
            .and_then(|id| self.registry.terminal(id))
            .ok_or_else(|| AppError::terminal_not_found(host))?;
        if self.registry.find_terminal_by_host(destination).is_some() {
            return Err(AppError::with_message(
                ErrorCode::TerminalAlreadyOpen,
                format!("terminal already open on {}", destination),
            ));
        }

        let mut def = TerminalDef::new(destination, destination);
        def.kind = source.kind;
        def.drawers = source.drawers;
        let printer = source.printer;
        if let Some(p) = printer.and_then(|pid| self.registry.printer(pid)) {
            def.printer_host = Some(if p.is_device() {
                p.host.clone()
            } else {
                format!("{}:{}", p.host, p.port)
            });
            def.printer_model = p.model;
        }

        let id = self.registry.add_terminal(&def, LicenseSlot::Remote, now_millis())?;
        if let Some(pid) = printer {
            self.registry.bind_printer(id, pid)?;
        }
        tracing::info!(source = %host, destination = %destination, terminal = id, "Terminal cloned");
        self.remember_terminal(def)?;
        Ok(id)
    }

    /// Store a terminal definition in settings and save them
    fn remember_terminal(&mut self, def: TerminalDef) -> AppResult<()> {
        match self.settings.terminal_def_mut(&def.host) {
            Some(existing) => *existing = def,
            None => self.settings.terminals.push(def),
        }
        save(&self.config.data_file(files::SETTINGS), &self.settings)?;
        Ok(())
    }

    pub fn find_card_payment(&mut self, card: &str, amount: Decimal) -> AppResult<Option<CardMatch>> {
        find_card_payment(&self.checks, &mut self.archives, card, amount)
    }

    // ========== Checks & printing ==========

    /// Persist a new check and consume stock for it
    pub fn record_check(&mut self, check: &mut Check) -> AppResult<u64> {
        let serial = self.checks.persist_check(check)?;
        for order in check.sub_checks.iter().flat_map(|s| s.orders.iter()) {
            self.inventory.consume(&order.item_code, order.quantity);
            for detail in &order.details {
                self.inventory.consume(&detail.item_code, order.quantity);
            }
        }
        Ok(serial)
    }

    /// Printer for remote order slips: named in settings, else by kind
    pub fn remote_order_printer(&self) -> Option<PrinterId> {
        self.settings
            .remote_order_printer
            .as_deref()
            .and_then(|name| self.registry.find_printer_by_name(name))
            .or_else(|| self.registry.find_printer_by_kind(PrinterKind::RemoteOrder))
    }

    /// Queue a delivery slip; true when it was handed to the print worker
    pub fn print_remote_order(&mut self, check: &Check) -> bool {
        let Some(pid) = self.remote_order_printer() else {
            return false;
        };
        let Some(printer) = self.registry.printer(pid) else {
            return false;
        };
        let data = render_delivery_slip(check, printer.model, &self.settings.store_name);
        self.print(pid, data).is_ok()
    }

    pub fn print(&self, printer: PrinterId, data: Vec<u8>) -> AppResult<()> {
        let node = self
            .registry
            .printer(printer)
            .ok_or_else(|| AppError::printer_not_found(printer.to_string()))?;
        let job = PrintJob::new(node, data).map_err(|e| {
            AppError::with_message(ErrorCode::PrinterNotAvailable, e.to_string())
        })?;
        self.printing.submit(job).inspect_err(|e| {
            tracing::warn!(printer = %node.name, error = %e, "Print job not queued");
        })
    }

    pub fn report_printer(&self) -> Option<PrinterId> {
        self.report_printer
    }

    /// Switch the report printer by name
    pub fn set_report_printer(&mut self, name: &str) -> AppResult<PrinterId> {
        let id = self
            .registry
            .find_printer_by_name(name)
            .ok_or_else(|| AppError::printer_not_found(name))?;
        self.report_printer = Some(id);
        tracing::info!(printer = %name, "Report printer changed");
        Ok(id)
    }

    // ========== Operator requests ==========

    pub fn disable_logins(&mut self) {
        if !self.logins_disabled {
            self.logins_disabled = true;
            tracing::info!("Logins disabled");
            self.registry.notify_all(UpdateEvent::LoginsDisabled);
        }
    }

    pub fn logins_disabled(&self) -> bool {
        self.logins_disabled
    }

    /// 在终端上登录用户；`nologin` 之后拒绝新的会话
    pub fn begin_session(&mut self, id: TerminalId, user: &str, now: i64) -> AppResult<uuid::Uuid> {
        if self.logins_disabled {
            tracing::warn!(terminal = id, user = %user, "Login refused, logins are disabled");
            return Err(AppError::with_message(
                ErrorCode::LoginsDisabled,
                format!("login for '{}' refused", user),
            ));
        }
        self.registry.begin_session(id, user, now)
    }

    pub fn request_restart(&mut self) {
        tracing::info!("Restart requested");
        self.restart_requested = true;
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }

    /// Spawn the watchdog that starts a fresh master
    pub fn spawn_restart_watchdog(&mut self) -> AppResult<()> {
        let command = match self.config.restart_command.clone() {
            Some(cmd) => cmd,
            None => std::env::current_exe()?.to_string_lossy().into_owned(),
        };
        self.children.spawn("restart", &command)?;
        Ok(())
    }

    /// Feed each line of a macro file to every terminal
    pub fn replay_macros(&mut self, path: &Path) -> AppResult<usize> {
        let text = std::fs::read_to_string(path)?;
        let mut count = 0;
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            self.registry.notify_all_with(UpdateEvent::MacroInput, line);
            count += 1;
        }
        tracing::info!(path = %path.display(), keys = count, "Macros replayed");
        Ok(count)
    }

    // ========== Persistence ==========

    /// Save transactional resources (each file on its own)
    pub fn save_state(&self) -> AppResult<()> {
        save(&self.config.data_file(files::EXCEPTIONS), &self.exceptions)?;
        save(&self.config.data_file(files::INVENTORY), &self.inventory)?;
        save(&self.config.data_file(files::ACCOUNTS), &self.accounts)?;
        Ok(())
    }

    /// Save settings and the master pages
    pub fn save_config(&self) -> AppResult<()> {
        save(&self.config.data_file(files::SETTINGS), &self.settings)?;
        if let Some(master) = self.registry.master_config() {
            zone::save_menu_pages(master, self.config.data_path())?;
            zone::save_table_pages(master, self.config.data_path())?;
        }
        Ok(())
    }

    // ========== Shutdown ==========

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Multi-phase shutdown; a second call does nothing
    pub async fn shutdown(&mut self, reason: &str) -> ShutdownOutcome {
        if self.shut_down {
            tracing::error!(reason = %reason, "Shutdown requested again, exiting without cleanup");
            return ShutdownOutcome::WithoutCleanup;
        }
        self.shut_down = true;
        tracing::info!(reason = %reason, "Shutting down");

        self.registry.notify_all(UpdateEvent::ShuttingDown);

        if let Err(e) = self.save_config() {
            tracing::error!(error = %e, "Failed to save configuration");
        }
        if let Err(e) = self.save_state() {
            tracing::error!(error = %e, "Failed to save state");
        }
        if let Some(lock) = self.lock_path.take()
            && let Err(e) = std::fs::remove_file(&lock)
        {
            tracing::warn!(path = %lock.display(), error = %e, "Failed to remove lock file");
        }
        self.printing.stop().await;

        tracing::info!("Shutdown complete");
        ShutdownOutcome::Clean
    }
}

/// Create the data directory and the pid lock file
fn prepare_data_path(config: &Config) -> AppResult<PathBuf> {
    let unavailable = |e: std::io::Error| {
        AppError::with_message(
            ErrorCode::DataPathUnavailable,
            format!("data path {} unusable: {}", config.data_path().display(), e),
        )
    };
    std::fs::create_dir_all(config.data_path()).map_err(unavailable)?;

    let lock = config.lock_path();
    if let Ok(previous) = std::fs::read_to_string(&lock) {
        tracing::warn!(pid = %previous.trim(), path = %lock.display(), "Replacing stale lock file");
    }
    std::fs::write(&lock, format!("{}\n", std::process::id())).map_err(unavailable)?;
    Ok(lock)
}

/// Drop live checks, archives and the exception log
fn purge(config: &Config) -> AppResult<()> {
    let checks = config.checks_path();
    if checks.exists() {
        std::fs::remove_file(&checks)?;
    }
    let archives = config.archive_dir();
    if archives.exists() {
        std::fs::remove_dir_all(&archives)?;
    }
    let exceptions = config.data_file(files::EXCEPTIONS);
    if exceptions.exists() {
        std::fs::remove_file(&exceptions)?;
    }
    tracing::warn!(path = %config.data_path().display(), "Transaction data purged");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_check() {
        assert!(check_clock(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()).is_ok());
        let err = check_clock(NaiveDate::from_ymd_opt(2001, 1, 1).unwrap()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ClockBeforeRelease);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_split_printer_addr() {
        assert_eq!(split_printer_addr("10.0.0.5:9101"), ("10.0.0.5".into(), 9101));
        assert_eq!(split_printer_addr("kitchen"), ("kitchen".into(), 9100));
        assert_eq!(split_printer_addr("/dev/usb/lp0"), ("/dev/usb/lp0".into(), 0));
    }

    #[tokio::test]
    async fn test_start_creates_lock_and_local_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_overrides(dir.path(), 0);
        let mut ctl = Control::start(config).unwrap();

        assert!(dir.path().join(".crab-master.lock").exists());
        assert_eq!(ctl.registry.terminal_count(), 1);
        assert!(ctl.accounts.balance(crate::persist::ACCOUNT_CASH).is_some());

        assert_eq!(ctl.shutdown("test").await, ShutdownOutcome::Clean);
        assert!(!dir.path().join(".crab-master.lock").exists());
        assert!(dir.path().join(files::SETTINGS).exists());
        assert_eq!(ctl.shutdown("again").await, ShutdownOutcome::WithoutCleanup);
    }

    #[tokio::test]
    async fn test_open_close_clone_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::with_overrides(dir.path(), 0);
        config.license_terminals = 4;
        let mut ctl = Control::start(config).unwrap();

        let device = DeviceSpec {
            kind: crate::registry::TerminalType::Bar,
            printer_host: "10.0.0.8".into(),
            printer_model: crab_printer::PrinterModel::Star,
            drawers: 1,
        };
        let id = ctl
            .open_remote_terminal("Bar", "pos2:0", true, Some(&device))
            .unwrap();
        let printer = ctl.registry.terminal(id).unwrap().printer.unwrap();
        assert_eq!(ctl.registry.printer(printer).unwrap().port, 9100);
        assert!(ctl.settings.terminal_def("pos2:0").is_some());

        // a live terminal makes openterm a no-op
        assert_eq!(ctl.open_remote_terminal("Other", "pos2:0", true, None).unwrap(), id);
        assert_eq!(ctl.registry.terminal(id).unwrap().name, "Bar");

        let clone = ctl.clone_terminal("pos2:0", "pos3:0").unwrap();
        assert_eq!(ctl.registry.terminal(clone).unwrap().printer, Some(printer));

        ctl.close_remote_terminal("pos2:0").unwrap();
        assert!(ctl.registry.terminal(id).unwrap().kill_pending);
        // Still bound to the clone
        assert!(ctl.registry.printer(printer).is_some());
        assert!(ctl.close_remote_terminal("nowhere:0").is_err());

        // reopening without update uses the stored definition
        ctl.registry.remove_terminal(id);
        let reopened = ctl.open_remote_terminal("Ignored", "pos2:0", false, None).unwrap();
        assert_eq!(ctl.registry.terminal(reopened).unwrap().name, "Bar");
        ctl.shutdown("test").await;
    }

    #[tokio::test]
    async fn test_begin_session_refused_after_nologin() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = Control::start(Config::with_overrides(dir.path(), 0)).unwrap();
        let id = ctl.registry.terminal_ids()[0];

        ctl.begin_session(id, "anna", 0).unwrap();
        ctl.registry.end_session(id);

        ctl.disable_logins();
        let err = ctl.begin_session(id, "anna", 1).unwrap_err();
        assert_eq!(err.code, ErrorCode::LoginsDisabled);
        assert_eq!(ctl.registry.active_sessions(), 0);
        ctl.shutdown("test").await;
    }
}
