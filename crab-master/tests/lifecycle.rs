mod common;

use common::{start, start_with, test_config, write_settings};
use crab_master::persist::{Settings, TerminalDef};
use crab_master::registry::{MasterStatus, Page, PageClass};
use crab_master::scheduler::EodStage;
use crab_master::{Control, ShutdownOutcome, TickOutcome};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use shared::error::ErrorCode;
use shared::order::{Check, Order};

fn at(minute: u32, second: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 2)
        .unwrap()
        .and_hms_opt(14, minute, second)
        .unwrap()
}

fn pizza_check() -> Check {
    let mut check = Check::new(0);
    check.sub_checks[0].orders.push(Order {
        item_code: "PZ1".into(),
        name: "Pizza".into(),
        family: "Pizza".into(),
        quantity: 1,
        unit_price: Decimal::new(1000, 2),
        details: Vec::new(),
    });
    check
}

fn remote(name: &str, host: &str) -> TerminalDef {
    TerminalDef::new(name, host)
}

#[tokio::test]
async fn test_batch_jobs_share_ticks_one_unit_each() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), false);
    config.report_chunk = 2;
    let mut sched = start_with(config).await;
    for _ in 0..10 {
        sched.ctl_mut().record_check(&mut pizza_check()).unwrap();
    }

    let batch = sched.ctl().config.batch_path();
    let out = sched.ctl().config.batch_out_path();
    std::fs::write(&batch, "ping\nreport checks\nusercount\n").unwrap();

    // ping
    assert_eq!(sched.tick_at(at(0, 0)).await, TickOutcome::Continue);
    assert_eq!(std::fs::read_to_string(&out).unwrap().lines().count(), 1);

    // five report chunks of two checks
    for s in 1..=5 {
        sched.tick_at(at(0, s)).await;
        assert!(batch.exists());
        assert_eq!(std::fs::read_to_string(&out).unwrap().lines().count(), 1);
    }
    let reports: Vec<_> = std::fs::read_dir(sched.ctl().config.reports_dir())
        .unwrap()
        .collect();
    assert_eq!(reports.len(), 1);

    // usercount, then the exhausted file goes away
    sched.tick_at(at(0, 6)).await;
    let lines: Vec<String> = std::fs::read_to_string(&out)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("pong"));
    assert_eq!(lines[1], "usercount 0 terminals 1");
    assert!(!batch.exists());
    assert!(!sched.batch().is_pending());
}

#[tokio::test]
async fn test_end_of_day_archives_checks() {
    let dir = tempfile::tempdir().unwrap();
    let mut sched = start(dir.path(), false).await;
    for _ in 0..3 {
        sched.ctl_mut().record_check(&mut pizza_check()).unwrap();
    }
    std::fs::write(sched.ctl().config.batch_path(), "endday\n").unwrap();

    let mut seen_running = false;
    for s in 0..12 {
        sched.tick_at(at(1, s)).await;
        seen_running |= sched.ctl().eod.is_running();
    }
    assert!(seen_running);
    assert_eq!(sched.ctl().eod.stage(), EodStage::Idle);
    assert_eq!(sched.ctl().checks.check_count().unwrap(), 0);
    assert_eq!(sched.ctl().archives.len(), 1);

    // serials keep counting after the day is closed
    let serial = sched.ctl_mut().record_check(&mut pizza_check()).unwrap();
    assert_eq!(serial, 4);
}

#[tokio::test]
async fn test_end_of_day_waits_for_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let mut sched = start(dir.path(), false).await;
    sched.ctl_mut().record_check(&mut pizza_check()).unwrap();
    let id = sched.ctl().registry.terminal_ids()[0];
    sched.ctl_mut().begin_session(id, "anna", 0).unwrap();
    assert!(sched.ctl_mut().eod.request());

    for s in 0..5 {
        sched.tick_at(at(2, s)).await;
    }
    assert_eq!(sched.ctl().eod.stage(), EodStage::Requested);
    assert_eq!(sched.ctl().checks.check_count().unwrap(), 1);

    sched.ctl_mut().registry.end_session(id);
    for s in 5..12 {
        sched.tick_at(at(2, s)).await;
    }
    assert_eq!(sched.ctl().eod.stage(), EodStage::Idle);
    assert_eq!(sched.ctl().checks.check_count().unwrap(), 0);
}

#[tokio::test]
async fn test_batch_exit_shuts_down() {
    let dir = tempfile::tempdir().unwrap();
    let mut sched = start(dir.path(), false).await;
    std::fs::write(sched.ctl().config.batch_path(), "nologin\nexit\n").unwrap();

    assert_eq!(sched.tick_at(at(3, 0)).await, TickOutcome::Continue);
    assert!(sched.ctl().logins_disabled());
    let id = sched.ctl().registry.terminal_ids()[0];
    let err = sched.ctl_mut().begin_session(id, "anna", 0).unwrap_err();
    assert_eq!(err.code, ErrorCode::LoginsDisabled);
    assert_eq!(
        sched.tick_at(at(3, 1)).await,
        TickOutcome::Shutdown(ShutdownOutcome::Clean)
    );
    assert_eq!(sched.tick_at(at(3, 2)).await, TickOutcome::Stopped);
}

#[tokio::test]
async fn test_last_terminal_gone_shuts_down_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut sched = start(dir.path(), false).await;
    let lock = sched.ctl().config.lock_path();
    assert!(lock.exists());

    for id in sched.ctl().registry.terminal_ids() {
        sched.ctl_mut().registry.request_kill(id);
    }
    assert_eq!(
        sched.tick_at(at(4, 0)).await,
        TickOutcome::Shutdown(ShutdownOutcome::Clean)
    );
    assert!(!lock.exists());
    assert!(dir.path().join("settings.dat").exists());

    assert_eq!(sched.tick_at(at(4, 1)).await, TickOutcome::Stopped);
    assert_eq!(
        sched.ctl_mut().shutdown("again").await,
        ShutdownOutcome::WithoutCleanup
    );
}

#[tokio::test]
async fn test_corrupt_check_store_is_backed_up_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), false);
    std::fs::write(config.checks_path(), vec![0xAB; 8192]).unwrap();

    let mut ctl = Control::start(config).unwrap();
    assert_eq!(ctl.checks.check_count().unwrap(), 0);
    assert_eq!(ctl.record_check(&mut pizza_check()).unwrap(), 1);

    let backups = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".bak"))
        .count();
    assert_eq!(backups, 1);
    ctl.shutdown("test").await;
}

#[tokio::test]
async fn test_license_bounds_configured_terminals() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        terminals: (2..=6)
            .map(|n| remote(&format!("POS {}", n), &format!("pos{}:0", n)))
            .collect(),
        ..Settings::default()
    };
    write_settings(dir.path(), &settings);
    let mut config = test_config(dir.path(), false);
    config.license_terminals = 3;

    let mut ctl = Control::start(config).unwrap();
    assert_eq!(ctl.registry.terminal_count(), 3);
    assert_eq!(ctl.registry.remote_count(), 2);
    assert!(ctl.registry.find_terminal_by_host("pos4:0").is_none());

    // a remote open past the quota is refused
    let err = ctl.open_remote_terminal("Late", "pos9:0", false, None).unwrap_err();
    assert_eq!(err.code, shared::error::ErrorCode::TerminalLimitReached);
    ctl.shutdown("test").await;
}

#[tokio::test]
async fn test_master_moves_to_next_terminal_then_goes_masterless() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        terminals: vec![remote("Bar", "pos2:0")],
        ..Settings::default()
    };
    write_settings(dir.path(), &settings);
    let mut sched = start(dir.path(), false).await;

    let ids = sched.ctl().registry.terminal_ids();
    assert_eq!(ids.len(), 2);
    assert_eq!(sched.ctl().registry.master_status(), MasterStatus::Held(ids[0]));

    sched.ctl_mut().registry.request_kill(ids[0]);
    assert_eq!(sched.tick_at(at(5, 0)).await, TickOutcome::Continue);
    assert_eq!(sched.ctl().registry.master_status(), MasterStatus::Held(ids[1]));
    assert!(sched.ctl().registry.terminal(ids[1]).unwrap().master_holder);

    sched.ctl_mut().registry.request_kill(ids[1]);
    assert_eq!(
        sched.tick_at(at(5, 1)).await,
        TickOutcome::Shutdown(ShutdownOutcome::Clean)
    );
    assert_eq!(sched.ctl().registry.master_status(), MasterStatus::Masterless);
    // the retired master was still flushed
    assert!(dir.path().join("menu.pages").exists());
}

#[tokio::test]
async fn test_config_copies_are_isolated_until_commit() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        terminals: vec![remote("Bar", "pos2:0"), remote("Patio", "pos3:0")],
        ..Settings::default()
    };
    write_settings(dir.path(), &settings);
    let mut sched = start(dir.path(), false).await;
    let ids = sched.ctl().registry.terminal_ids();
    // Bar opened first and holds the master
    let (bar, patio, local) = (ids[0], ids[1], ids[2]);
    assert_eq!(sched.ctl().registry.master_status(), MasterStatus::Held(bar));

    // scribbling on a copy changes nobody else
    sched
        .ctl_mut()
        .registry
        .terminal_mut(patio)
        .unwrap()
        .config
        .pages
        .push(Page {
            id: 7,
            class: PageClass::Menu,
            name: "Scratch".into(),
            zones: Vec::new(),
        });
    assert!(sched.ctl().registry.master_config().unwrap().pages.is_empty());
    assert!(sched.ctl().registry.terminal(local).unwrap().config.pages.is_empty());

    // committing updates the master and flags the rest for reload
    let edited = sched.ctl().registry.terminal(patio).unwrap().config.clone();
    sched.ctl_mut().registry.commit_edit(patio, edited).unwrap();
    assert_eq!(sched.ctl().registry.master_config().unwrap().pages.len(), 1);
    assert!(sched.ctl().registry.terminal(local).unwrap().reload_pending);
    assert!(!sched.ctl().registry.terminal(bar).unwrap().reload_pending);

    sched.tick_at(at(6, 0)).await;
    let local_node = sched.ctl().registry.terminal(local).unwrap();
    assert!(!local_node.reload_pending);
    assert_eq!(local_node.config.pages[0].name, "Scratch");
}
