//! Chunked report jobs
//!
//! 报表每个 tick 只处理 `report_chunk` 张账单，部分结果保存在任务对象中，
//! 处理完毕后打印 (或写入 `<data>/reports/` 下的文件) 并清空。

use crate::core::Control;
use crate::printing::render_report;
use crab_printer::PrinterModel;
use rust_decimal::Decimal;
use shared::error::{AppError, AppResult};
use shared::order::{Check, Tender};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Sales,
    Checks,
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sales" => Ok(Self::Sales),
            "checks" => Ok(Self::Checks),
            other => Err(format!("unknown report '{}'", other)),
        }
    }
}

impl ReportKind {
    fn title(self) -> &'static str {
        match self {
            ReportKind::Sales => "SALES REPORT",
            ReportKind::Checks => "CHECK REPORT",
        }
    }

    fn file_stem(self) -> &'static str {
        match self {
            ReportKind::Sales => "sales",
            ReportKind::Checks => "checks",
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Totals {
    checks: usize,
    food: Decimal,
    delivery: Decimal,
    cash: Decimal,
    cards: Decimal,
    other: Decimal,
}

/// Where a finished report went
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutput {
    Printed(String),
    Spooled(PathBuf),
}

/// Result of one unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportStep {
    Pending,
    Done(ReportOutput),
}

/// 可恢复的报表任务
#[derive(Debug, Clone, PartialEq)]
pub struct ReportJob {
    kind: ReportKind,
    printer: Option<String>,
    serials: Option<Vec<u64>>,
    cursor: usize,
    totals: Totals,
    rows: Vec<(String, String)>,
}

impl ReportJob {
    pub fn new(kind: ReportKind, printer: Option<String>) -> Self {
        Self {
            kind,
            printer,
            serials: None,
            cursor: 0,
            totals: Totals::default(),
            rows: Vec::new(),
        }
    }

    pub fn kind(&self) -> ReportKind {
        self.kind
    }

    /// Process one chunk; print when the last chunk is done
    pub fn step(&mut self, ctl: &mut Control) -> AppResult<ReportStep> {
        if self.serials.is_none() {
            let serials = ctl.checks.serials()?;
            tracing::debug!(report = ?self.kind, checks = serials.len(), "Report started");
            self.serials = Some(serials);
        }
        let serials = self.serials.as_deref().unwrap_or_default();
        let chunk = ctl.config.report_chunk.max(1);
        let end = (self.cursor + chunk).min(serials.len());

        let batch: Vec<u64> = serials[self.cursor..end].to_vec();
        for serial in batch {
            if let Some(check) = ctl.checks.get_check(serial)? {
                self.accumulate(&check);
            }
        }
        self.cursor = end;

        if self.cursor < self.serials.as_ref().map_or(0, Vec::len) {
            return Ok(ReportStep::Pending);
        }
        let output = self.emit(ctl)?;
        Ok(ReportStep::Done(output))
    }

    fn accumulate(&mut self, check: &Check) {
        let t = &mut self.totals;
        t.checks += 1;
        t.delivery += check.delivery_charge;
        t.food += check.total() - check.delivery_charge;
        for p in check.sub_checks.iter().flat_map(|s| s.payments.iter()) {
            match p.tender {
                Tender::Cash => t.cash += p.amount,
                Tender::CreditCard | Tender::DebitCard => t.cards += p.amount,
                Tender::GiftCertificate | Tender::Account => t.other += p.amount,
            }
        }
        if self.kind == ReportKind::Checks {
            self.rows.push((
                format!("#{} {}", check.serial, check.customer.full_name()),
                format!("{:.2}", check.total()),
            ));
        }
    }

    fn summary_rows(&self) -> Vec<(String, String)> {
        let t = &self.totals;
        let money = |d: Decimal| format!("{:.2}", d.round_dp(2));
        vec![
            ("Checks".to_string(), t.checks.to_string()),
            ("Food".to_string(), money(t.food)),
            ("Delivery".to_string(), money(t.delivery)),
            ("Total".to_string(), money(t.food + t.delivery)),
            ("Cash".to_string(), money(t.cash)),
            ("Cards".to_string(), money(t.cards)),
            ("Other".to_string(), money(t.other)),
        ]
    }

    fn emit(&mut self, ctl: &mut Control) -> AppResult<ReportOutput> {
        let mut rows = std::mem::take(&mut self.rows);
        rows.extend(self.summary_rows());
        let subtitle = ctl.settings.store_name.clone();

        let printer = match &self.printer {
            Some(name) => Some(
                ctl.registry
                    .find_printer_by_name(name)
                    .ok_or_else(|| AppError::printer_not_found(name))?,
            ),
            None => ctl.report_printer(),
        };

        let output = match printer.and_then(|id| ctl.registry.printer(id).map(|p| (id, p))) {
            Some((id, node)) => {
                let name = node.name.clone();
                let data = render_report(node.model, self.kind.title(), &subtitle, &rows);
                ctl.print(id, data)?;
                ReportOutput::Printed(name)
            }
            None => {
                let dir = ctl.config.reports_dir();
                std::fs::create_dir_all(&dir)?;
                let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
                let path = dir.join(format!("{}-{}.txt", self.kind.file_stem(), stamp));
                let data = render_report(PrinterModel::Text, self.kind.title(), &subtitle, &rows);
                std::fs::write(&path, data)?;
                ReportOutput::Spooled(path)
            }
        };
        tracing::info!(report = ?self.kind, checks = self.totals.checks, output = ?output, "Report finished");

        self.serials = None;
        self.cursor = 0;
        self.totals = Totals::default();
        Ok(output)
    }
}
