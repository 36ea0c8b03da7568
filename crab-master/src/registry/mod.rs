//! 终端与打印机注册表
//!
//! Registry 拥有所有终端节点、打印机节点以及 master 配置副本。
//! 节点存放在按 id 索引的 `BTreeMap` 中，交叉引用只保存 id。
//!
//! # 许可
//!
//! 许可值 N 表示最多 N 个终端：1 个保留给本地终端，其余 N-1 个给远程终端。

pub mod printer;
pub mod terminal;
pub mod zone;

pub use printer::{PrinterId, PrinterKind, PrinterNode};
pub use terminal::{LicenseSlot, Session, TerminalNode, TerminalType};
pub use zone::{ConfigDatabase, MasterSlot, Page, PageClass, TerminalId, Zone};

use crate::message::UpdateBus;
use crate::persist::{PrinterDef, TerminalDef};
use crab_printer::PrinterModel;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::message::UpdateEvent;
use std::collections::BTreeMap;
use std::path::Path;

/// 终端许可
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct License {
    quota: u32,
}

impl License {
    pub fn new(quota: u32) -> Self {
        Self { quota }
    }

    pub fn quota(&self) -> u32 {
        self.quota
    }

    /// Remote terminals allowed beside the reserved local slot
    pub fn remote_limit(&self) -> usize {
        self.quota.saturating_sub(1) as usize
    }
}

/// Master 副本状态摘要
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterStatus {
    Unloaded,
    Unissued,
    Held(TerminalId),
    Masterless,
}

/// 注册表
pub struct Registry {
    terminals: BTreeMap<TerminalId, TerminalNode>,
    printers: BTreeMap<PrinterId, PrinterNode>,
    next_terminal_id: TerminalId,
    next_printer_id: PrinterId,
    master: MasterSlot,
    license: License,
    display: String,
    bus: UpdateBus,
}

impl Registry {
    pub fn new(license_quota: u32, display: impl Into<String>, bus: UpdateBus) -> Self {
        Self {
            terminals: BTreeMap::new(),
            printers: BTreeMap::new(),
            next_terminal_id: 1,
            next_printer_id: 1,
            master: MasterSlot::Unloaded,
            license: License::new(license_quota),
            display: display.into(),
            bus,
        }
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn license(&self) -> License {
        self.license
    }

    // ========== Configuration master ==========

    /// LoadMaster: load pages from disk and install them as the unissued master
    pub fn load_master(&mut self, data_path: &Path) -> AppResult<u32> {
        let db = zone::load_master(data_path)?;
        let version = db.version;
        self.install_master(db);
        Ok(version)
    }

    /// Install a fresh master; live terminals keep their copies and are
    /// flagged to reload
    pub fn install_master(&mut self, db: ConfigDatabase) {
        for node in self.terminals.values_mut() {
            node.master_holder = false;
            node.reload_pending = true;
        }
        self.master = MasterSlot::Unissued(db);
    }

    pub fn master_status(&self) -> MasterStatus {
        match &self.master {
            MasterSlot::Unloaded => MasterStatus::Unloaded,
            MasterSlot::Unissued(_) => MasterStatus::Unissued,
            MasterSlot::Held(id) => MasterStatus::Held(*id),
            MasterSlot::Masterless { .. } => MasterStatus::Masterless,
        }
    }

    /// Master contents, including a retired master kept for the shutdown flush
    pub fn master_config(&self) -> Option<&ConfigDatabase> {
        match &self.master {
            MasterSlot::Masterless { retired } => retired.as_ref(),
            _ => self.issuable_master(),
        }
    }

    fn issuable_master(&self) -> Option<&ConfigDatabase> {
        match &self.master {
            MasterSlot::Unissued(db) => Some(db),
            MasterSlot::Held(id) => self.terminals.get(id).map(|t| &t.config),
            _ => None,
        }
    }

    /// IssueCopy: the first request takes the master itself, later ones get
    /// deep copies. `for_node` must be inserted by the caller.
    fn issue_copy(&mut self, for_node: TerminalId) -> AppResult<ConfigDatabase> {
        match std::mem::replace(&mut self.master, MasterSlot::Unloaded) {
            MasterSlot::Unissued(db) => {
                self.master = MasterSlot::Held(for_node);
                tracing::debug!(terminal = for_node, "Master configuration handed over");
                Ok(db)
            }
            MasterSlot::Held(holder) => {
                self.master = MasterSlot::Held(holder);
                self.terminals
                    .get(&holder)
                    .map(|t| t.config.clone())
                    .ok_or_else(|| AppError::internal(format!("master holder {} missing", holder)))
            }
            slot @ MasterSlot::Masterless { .. } => {
                self.master = slot;
                Err(AppError::new(ErrorCode::ConfigMasterless))
            }
            MasterSlot::Unloaded => Err(AppError::with_message(
                ErrorCode::ConfigError,
                "configuration not loaded",
            )),
        }
    }

    /// ReclaimMaster: move the master into the lowest remaining terminal,
    /// or go masterless
    fn reclaim_master(&mut self, master: ConfigDatabase) {
        match self.terminals.iter_mut().next() {
            Some((&id, node)) => {
                node.config = master;
                node.master_holder = true;
                node.reload_pending = false;
                self.master = MasterSlot::Held(id);
                tracing::info!(terminal = id, name = %node.name, "Master configuration re-elected");
            }
            None => {
                self.master = MasterSlot::Masterless {
                    retired: Some(master),
                };
                tracing::warn!("No terminal left to hold the master configuration");
            }
        }
    }

    /// Commit an edited working copy into the master
    ///
    /// Every other terminal is flagged for a lazy reload. A terminal with a
    /// reload of its own still pending holds a stale copy and is refused.
    pub fn commit_edit(&mut self, id: TerminalId, db: ConfigDatabase) -> AppResult<()> {
        let node = self
            .terminals
            .get(&id)
            .ok_or_else(|| AppError::terminal_not_found(id.to_string()))?;
        if node.reload_pending {
            return Err(AppError::with_message(
                ErrorCode::ConfigStale,
                format!("terminal '{}' must reload before committing", node.name),
            ));
        }

        match &mut self.master {
            MasterSlot::Unissued(master) => *master = db.clone(),
            MasterSlot::Held(holder) => {
                let holder = *holder;
                if let Some(h) = self.terminals.get_mut(&holder) {
                    h.config = db.clone();
                }
            }
            MasterSlot::Masterless { .. } | MasterSlot::Unloaded => {
                return Err(AppError::new(ErrorCode::ConfigMasterless));
            }
        }

        for (other_id, node) in self.terminals.iter_mut() {
            if *other_id == id {
                node.config = db.clone();
            } else if !node.master_holder {
                node.reload_pending = true;
            }
        }
        tracing::info!(terminal = id, "Configuration edit committed");
        Ok(())
    }

    /// Pull a fresh copy for a terminal flagged for reload
    pub fn reload_copy(&mut self, id: TerminalId) -> AppResult<bool> {
        let copy = self.issuable_master().cloned();
        let node = self
            .terminals
            .get_mut(&id)
            .ok_or_else(|| AppError::terminal_not_found(id.to_string()))?;
        if !node.reload_pending {
            return Ok(false);
        }
        if node.master_holder {
            node.reload_pending = false;
            return Ok(false);
        }
        node.config = copy.ok_or_else(|| AppError::new(ErrorCode::ConfigMasterless))?;
        node.reload_pending = false;
        self.bus.notify(id, UpdateEvent::ConfigReloaded);
        Ok(true)
    }

    // ========== Terminals ==========

    /// AddTerminal
    ///
    /// Remote terminals are bounded by the license; the local slot is unique.
    pub fn add_terminal(
        &mut self,
        def: &TerminalDef,
        slot: LicenseSlot,
        now: i64,
    ) -> AppResult<TerminalId> {
        match slot {
            LicenseSlot::Remote if self.remote_count() >= self.license.remote_limit() => {
                tracing::warn!(
                    terminal = %def.name,
                    host = %def.host,
                    quota = self.license.quota(),
                    "Terminal not permitted by license"
                );
                return Err(AppError::terminal_limit(&def.host));
            }
            LicenseSlot::Local if self.terminals.values().any(|t| t.slot == LicenseSlot::Local) => {
                return Err(AppError::with_message(
                    ErrorCode::TerminalAlreadyOpen,
                    "local terminal already open",
                ));
            }
            _ => {}
        }

        let id = self.next_terminal_id;
        let config = self.issue_copy(id)?;
        let master_holder = matches!(self.master, MasterSlot::Held(h) if h == id);
        self.next_terminal_id += 1;

        let node = TerminalNode {
            id,
            name: def.name.clone(),
            host: def.host.clone(),
            kind: def.kind,
            slot,
            config,
            master_holder,
            printer: None,
            drawers: def.drawers,
            server: def.server,
            last_activity: now,
            kill_pending: false,
            reload_pending: false,
            session: None,
            timed_out: false,
        };
        tracing::info!(
            terminal = id,
            name = %node.name,
            host = %node.host,
            slot = ?slot,
            master = master_holder,
            "Terminal opened"
        );
        self.terminals.insert(id, node);
        self.notify_others(id, UpdateEvent::RosterChanged);
        Ok(id)
    }

    /// RemoveTerminal: re-elect the master holder if needed, release the
    /// printer binding, then tell everyone left about the new roster
    pub fn remove_terminal(&mut self, id: TerminalId) -> Option<TerminalNode> {
        let mut node = self.terminals.remove(&id)?;
        if node.master_holder {
            node.master_holder = false;
            let master = std::mem::take(&mut node.config);
            self.reclaim_master(master);
        }
        if let Some(pid) = node.printer.take() {
            self.release_printer(pid);
        }
        tracing::info!(terminal = id, name = %node.name, host = %node.host, "Terminal removed");
        self.notify_others(id, UpdateEvent::RosterChanged);
        Some(node)
    }

    /// Open terminals from settings at startup
    ///
    /// The first self-declared server on the active display takes the local
    /// slot. Later self-declared servers lose the flag and have their display
    /// reconciled to the active one. A server declared on another display
    /// loses the flag and opens as remote. Remote terminals past the license are
    /// skipped with a diagnostic. With no server elected a default local
    /// terminal is opened.
    pub fn open_configured_terminals(
        &mut self,
        defs: &mut [TerminalDef],
        now: i64,
    ) -> Vec<TerminalId> {
        let mut opened = Vec::new();
        let mut server_elected = false;

        for def in defs.iter_mut() {
            let slot = if def.server && !server_elected && def.host == self.display {
                server_elected = true;
                LicenseSlot::Local
            } else {
                if def.server && server_elected {
                    tracing::warn!(
                        terminal = %def.name,
                        host = %def.host,
                        display = %self.display,
                        "Duplicate server terminal: clearing server flag and reconciling display"
                    );
                    def.server = false;
                    def.host = self.display.clone();
                } else if def.server {
                    tracing::warn!(
                        terminal = %def.name,
                        host = %def.host,
                        display = %self.display,
                        "Server terminal is not on the active display: opening it as remote"
                    );
                    def.server = false;
                }
                LicenseSlot::Remote
            };

            match self.add_terminal(def, slot, now) {
                Ok(id) => opened.push(id),
                Err(e) if e.code == ErrorCode::TerminalLimitReached => {
                    tracing::warn!(terminal = %def.name, "terminal '{}' not permitted", def.name);
                }
                Err(e) => tracing::error!(terminal = %def.name, error = %e, "Failed to open terminal"),
            }
        }

        if !server_elected {
            let def = TerminalDef::local(&self.display);
            match self.add_terminal(&def, LicenseSlot::Local, now) {
                Ok(id) => opened.push(id),
                Err(e) => tracing::error!(error = %e, "Failed to open default local terminal"),
            }
        }
        opened
    }

    pub fn find_terminal_by_host(&self, host: &str) -> Option<TerminalId> {
        self.terminals
            .values()
            .find(|t| t.host == host)
            .map(|t| t.id)
    }

    pub fn terminal(&self, id: TerminalId) -> Option<&TerminalNode> {
        self.terminals.get(&id)
    }

    pub fn terminal_mut(&mut self, id: TerminalId) -> Option<&mut TerminalNode> {
        self.terminals.get_mut(&id)
    }

    pub fn terminals(&self) -> impl Iterator<Item = &TerminalNode> {
        self.terminals.values()
    }

    pub fn terminal_ids(&self) -> Vec<TerminalId> {
        self.terminals.keys().copied().collect()
    }

    pub fn terminal_count(&self) -> usize {
        self.terminals.len()
    }

    pub fn remote_count(&self) -> usize {
        self.terminals
            .values()
            .filter(|t| t.slot == LicenseSlot::Remote)
            .count()
    }

    /// Terminals with a logged-in user
    pub fn active_sessions(&self) -> usize {
        self.terminals.values().filter(|t| t.has_session()).count()
    }

    pub(crate) fn begin_session(&mut self, id: TerminalId, user: &str, now: i64) -> AppResult<uuid::Uuid> {
        let node = self
            .terminals
            .get_mut(&id)
            .ok_or_else(|| AppError::terminal_not_found(id.to_string()))?;
        if let Some(existing) = &node.session {
            return Err(AppError::already_exists(format!(
                "session for '{}' on terminal '{}'",
                existing.user, node.name
            )));
        }
        let session = Session {
            id: uuid::Uuid::new_v4(),
            user: user.to_string(),
            started_at: now,
        };
        let sid = session.id;
        node.session = Some(session);
        node.last_activity = now;
        node.timed_out = false;
        tracing::info!(terminal = id, user = %user, "Session started");
        Ok(sid)
    }

    pub fn end_session(&mut self, id: TerminalId) -> Option<Session> {
        let session = self.terminals.get_mut(&id)?.session.take();
        if let Some(s) = &session {
            tracing::info!(terminal = id, user = %s.user, "Session ended");
        }
        session
    }

    pub fn note_activity(&mut self, id: TerminalId, now: i64) {
        if let Some(node) = self.terminals.get_mut(&id) {
            node.last_activity = now;
            node.timed_out = false;
        }
    }

    /// Flag for removal at the next tick
    pub fn request_kill(&mut self, id: TerminalId) -> bool {
        match self.terminals.get_mut(&id) {
            Some(node) => {
                node.kill_pending = true;
                true
            }
            None => false,
        }
    }

    // ========== Notifications ==========

    pub fn notify(&self, id: TerminalId, event: UpdateEvent) {
        self.bus.notify(id, event);
    }

    pub fn notify_all(&self, event: UpdateEvent) {
        for id in self.terminals.keys() {
            self.bus.notify(*id, event);
        }
    }

    pub fn notify_all_with(&self, event: UpdateEvent, value: &str) {
        for id in self.terminals.keys() {
            self.bus.notify_with(*id, event, value);
        }
    }

    fn notify_others(&self, except: TerminalId, event: UpdateEvent) {
        for id in self.terminals.keys().filter(|id| **id != except) {
            self.bus.notify(*id, event);
        }
    }

    // ========== Printers ==========

    /// AddPrinter
    pub fn add_printer(&mut self, def: &PrinterDef, persistent: bool) -> AppResult<PrinterId> {
        if self.find_printer_by_addr(&def.host, def.port).is_some() {
            return Err(AppError::already_exists(format!(
                "printer {}:{}",
                def.host, def.port
            )));
        }
        let id = self.next_printer_id;
        self.next_printer_id += 1;
        self.printers.insert(
            id,
            PrinterNode {
                id,
                name: def.name.clone(),
                host: def.host.clone(),
                port: def.port,
                model: def.model,
                kind: def.kind,
                persistent,
            },
        );
        tracing::info!(printer = id, name = %def.name, host = %def.host, kind = %def.kind, "Printer added");
        Ok(id)
    }

    /// RemovePrinter: terminals bound to it lose the binding
    pub fn remove_printer(&mut self, id: PrinterId) -> Option<PrinterNode> {
        let node = self.printers.remove(&id)?;
        for t in self.terminals.values_mut() {
            if t.printer == Some(id) {
                t.printer = None;
            }
        }
        tracing::info!(printer = id, name = %node.name, "Printer removed");
        Some(node)
    }

    pub fn find_printer_by_addr(&self, host: &str, port: u16) -> Option<PrinterId> {
        self.printers
            .values()
            .find(|p| p.matches_addr(host, port))
            .map(|p| p.id)
    }

    pub fn find_printer_by_name(&self, name: &str) -> Option<PrinterId> {
        self.printers
            .values()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.id)
    }

    pub fn find_printer_by_kind(&self, kind: PrinterKind) -> Option<PrinterId> {
        self.printers
            .values()
            .find(|p| p.kind == kind)
            .map(|p| p.id)
    }

    /// GetOrCreatePrinter (idempotent)
    pub fn get_or_create_printer(
        &mut self,
        host: &str,
        port: u16,
        model: PrinterModel,
        kind: PrinterKind,
    ) -> AppResult<PrinterId> {
        if let Some(id) = self.find_printer_by_addr(host, port) {
            return Ok(id);
        }
        let def = PrinterDef {
            name: format!("{}:{}", host, port),
            host: host.to_string(),
            port,
            model,
            kind,
        };
        self.add_printer(&def, false)
    }

    pub fn bind_printer(&mut self, terminal: TerminalId, printer: PrinterId) -> AppResult<()> {
        if !self.printers.contains_key(&printer) {
            return Err(AppError::printer_not_found(printer.to_string()));
        }
        let node = self
            .terminals
            .get_mut(&terminal)
            .ok_or_else(|| AppError::terminal_not_found(terminal.to_string()))?;
        let previous = node.printer.replace(printer);
        if let Some(old) = previous.filter(|old| *old != printer) {
            self.release_printer(old);
        }
        Ok(())
    }

    /// Drop a terminal's printer binding and the printer itself when
    /// nothing else uses it
    pub fn unbind_printer(&mut self, terminal: TerminalId) {
        let previous = self
            .terminals
            .get_mut(&terminal)
            .and_then(|t| t.printer.take());
        if let Some(pid) = previous {
            self.release_printer(pid);
        }
    }

    fn release_printer(&mut self, id: PrinterId) {
        let referenced = self.terminals.values().any(|t| t.printer == Some(id));
        let persistent = self.printers.get(&id).is_none_or(|p| p.persistent);
        if !referenced && !persistent {
            if let Some(p) = self.printers.remove(&id) {
                tracing::debug!(printer = id, name = %p.name, "Unreferenced printer released");
            }
        }
    }

    pub fn printer(&self, id: PrinterId) -> Option<&PrinterNode> {
        self.printers.get(&id)
    }

    pub fn printers(&self) -> impl Iterator<Item = &PrinterNode> {
        self.printers.values()
    }

    pub fn printer_count(&self) -> usize {
        self.printers.len()
    }
}
