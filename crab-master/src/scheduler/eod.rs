//! 日结状态机
//!
//! ```text
//! Idle ─request─▶ Requested ─(无活动会话)─▶ Begin ─▶ ArchiveChecks ─▶ ArchiveExceptions ─▶ SaveState ─▶ Done ─▶ Idle
//! ```
//!
//! 每个 tick 最多前进一步。任一步失败则放弃本次日结，回到 Idle；
//! 科目过账与异常记录的清空只在对应的写盘成功之后生效。

use crate::core::Control;
use crate::persist::{
    ACCOUNT_CARDS, ACCOUNT_CASH, ACCOUNT_DELIVERY, ACCOUNT_FOOD_SALES, AccountBook,
};
use rust_decimal::Decimal;
use shared::error::AppResult;
use shared::message::UpdateEvent;
use shared::order::{Check, Tender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EodStage {
    #[default]
    Idle,
    Requested,
    Begin,
    ArchiveChecks,
    ArchiveExceptions,
    SaveState,
    Done,
}

/// End-of-day progress
#[derive(Debug, Default)]
pub struct EndOfDay {
    stage: EodStage,
    archive: Option<u64>,
    waiting_logged: bool,
}

impl EndOfDay {
    pub fn stage(&self) -> EodStage {
        self.stage
    }

    pub fn is_running(&self) -> bool {
        self.stage != EodStage::Idle
    }

    /// Returns false when one is already under way
    pub fn request(&mut self) -> bool {
        if self.stage != EodStage::Idle {
            return false;
        }
        tracing::info!("End of day requested");
        self.stage = EodStage::Requested;
        self.waiting_logged = false;
        true
    }

    fn abort(&mut self) {
        self.stage = EodStage::Idle;
        self.archive = None;
    }
}

/// Advance the state machine by one stage
pub fn advance(ctl: &mut Control, now: i64) -> EodStage {
    let stage = ctl.eod.stage;
    let next = match step(ctl, stage, now) {
        Ok(next) => next,
        Err(e) => {
            tracing::error!(stage = ?stage, error = %e, "End of day aborted");
            ctl.eod.abort();
            return EodStage::Idle;
        }
    };
    if next != stage {
        tracing::debug!(from = ?stage, to = ?next, "End of day stage");
    }
    ctl.eod.stage = next;
    next
}

fn step(ctl: &mut Control, stage: EodStage, now: i64) -> AppResult<EodStage> {
    Ok(match stage {
        EodStage::Idle => EodStage::Idle,
        EodStage::Requested => {
            let sessions = ctl.registry.active_sessions();
            if sessions > 0 {
                if !ctl.eod.waiting_logged {
                    tracing::info!(sessions = sessions, "End of day waiting for users to log out");
                    ctl.eod.waiting_logged = true;
                }
                EodStage::Requested
            } else {
                EodStage::Begin
            }
        }
        EodStage::Begin => {
            tracing::info!(checks = ctl.checks.check_count()?, "End of day started");
            EodStage::ArchiveChecks
        }
        EodStage::ArchiveChecks => {
            let checks = ctl.checks.list_checks()?;
            // Postings land only once the checks have left the live store
            let mut accounts = ctl.accounts.clone();
            for check in &checks {
                post_sales(&mut accounts, check)?;
            }
            let serials: Vec<u64> = checks.iter().map(|c| c.serial).collect();
            let id = ctl.archives.create(checks, now)?;
            ctl.checks.remove_checks(&serials)?;
            ctl.accounts = accounts;
            ctl.eod.archive = Some(id);
            EodStage::ArchiveExceptions
        }
        EodStage::ArchiveExceptions => {
            if let Some(id) = ctl.eod.archive {
                tracing::debug!(archive = id, exceptions = ctl.exceptions.len(), "Archiving exceptions");
                ctl.archives.append_exceptions(id, &ctl.exceptions.records)?;
                ctl.exceptions.take_all();
            }
            EodStage::SaveState
        }
        EodStage::SaveState => {
            ctl.save_state()?;
            EodStage::Done
        }
        EodStage::Done => {
            ctl.registry.notify_all(UpdateEvent::EndOfDay);
            if let Some(hook) = ctl.config.eod_hook.clone()
                && let Err(e) = ctl.children.spawn("eod-hook", &hook)
            {
                tracing::warn!(error = %e, "End of day hook failed to start");
            }
            tracing::info!(archive = ?ctl.eod.archive, "End of day finished");
            ctl.eod.archive = None;
            EodStage::Idle
        }
    })
}

/// Post one check to the chart of accounts
fn post_sales(accounts: &mut AccountBook, check: &Check) -> AppResult<()> {
    let food = check.total() - check.delivery_charge;
    accounts.post(ACCOUNT_FOOD_SALES, food)?;
    if !check.delivery_charge.is_zero() {
        accounts.post(ACCOUNT_DELIVERY, check.delivery_charge)?;
    }
    let (mut cash, mut cards) = (Decimal::ZERO, Decimal::ZERO);
    for payment in check.sub_checks.iter().flat_map(|s| s.payments.iter()) {
        match payment.tender {
            Tender::Cash => cash += payment.amount,
            Tender::CreditCard | Tender::DebitCard => cards += payment.amount,
            Tender::GiftCertificate | Tender::Account => {}
        }
    }
    accounts.post(ACCOUNT_CASH, cash)?;
    accounts.post(ACCOUNT_CARDS, cards)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::persist::{ExceptionKind, ExceptionRecord};
    use shared::order::Order;

    fn start_with_check(dir: &std::path::Path) -> Control {
        let mut ctl = Control::start(Config::with_overrides(dir, 0)).unwrap();
        let mut check = Check::new(0);
        check.sub_checks[0].orders.push(Order {
            item_code: "PZ1".into(),
            name: "Pizza".into(),
            family: "Pizza".into(),
            quantity: 1,
            unit_price: Decimal::new(1000, 2),
            details: Vec::new(),
        });
        ctl.record_check(&mut check).unwrap();
        ctl
    }

    #[tokio::test]
    async fn test_failed_archive_leaves_accounts_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = start_with_check(dir.path());
        let before = ctl.accounts.balance(ACCOUNT_FOOD_SALES);

        // a plain file where the archive directory belongs
        let archive_dir = ctl.config.archive_dir();
        let _ = std::fs::remove_dir_all(&archive_dir);
        std::fs::write(&archive_dir, b"").unwrap();

        assert!(ctl.eod.request());
        assert_eq!(advance(&mut ctl, 1), EodStage::Begin);
        assert_eq!(advance(&mut ctl, 1), EodStage::ArchiveChecks);
        assert_eq!(advance(&mut ctl, 1), EodStage::Idle);

        assert_eq!(ctl.accounts.balance(ACCOUNT_FOOD_SALES), before);
        assert_eq!(ctl.checks.check_count().unwrap(), 1);
        assert!(!ctl.eod.is_running());
        ctl.shutdown("test").await;
    }

    #[tokio::test]
    async fn test_failed_exception_append_keeps_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = start_with_check(dir.path());
        ctl.exceptions.record(ExceptionRecord {
            at: 0,
            terminal: "Bar".into(),
            kind: ExceptionKind::Void,
            check_serial: 1,
            item: Some("PZ1".into()),
            amount: Decimal::ONE,
            reason: String::new(),
        });

        assert!(ctl.eod.request());
        advance(&mut ctl, 1);
        advance(&mut ctl, 1);
        assert_eq!(advance(&mut ctl, 1), EodStage::ArchiveExceptions);
        assert_eq!(ctl.checks.check_count().unwrap(), 0);

        // a directory where the archive file belongs
        let archive = ctl.config.archive_dir().join("1.arc");
        std::fs::remove_file(&archive).unwrap();
        std::fs::create_dir(&archive).unwrap();

        assert_eq!(advance(&mut ctl, 1), EodStage::Idle);
        assert_eq!(ctl.exceptions.len(), 1);
        ctl.shutdown("test").await;
    }
}
