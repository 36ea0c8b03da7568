//! 历史归档
//!
//! 每次日结生成一个 `<data>/archive/<id>.arc`，内容是该营业期的账单
//! 与异常记录。启动时只扫描文件名，按 id 从新到旧排列；内容在第一次
//! 被遍历到时才加载。

use crate::persist::{ExceptionRecord, Versioned, load_or_recover, save};
use serde::{Deserialize, Serialize};
use shared::error::AppResult;
use shared::order::Check;
use std::path::{Path, PathBuf};

const ARCHIVE_EXT: &str = "arc";

/// 归档内容 (写入后不再修改，日结期间追加异常记录除外)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArchiveData {
    pub id: u64,
    /// 营业期结束时间 (Unix millis)
    pub period_end: i64,
    #[serde(default)]
    pub checks: Vec<Check>,
    #[serde(default)]
    pub exceptions: Vec<ExceptionRecord>,
}

impl Versioned for ArchiveData {
    const KIND: &'static str = "archive";
    const VERSION: u32 = 1;
}

#[derive(Debug)]
struct ArchiveEntry {
    id: u64,
    path: PathBuf,
    data: Option<ArchiveData>,
}

/// Archives ordered newest-first, loaded on demand
#[derive(Debug)]
pub struct ArchiveList {
    dir: PathBuf,
    entries: Vec<ArchiveEntry>,
}

impl ArchiveList {
    /// Scan the archive directory without loading anything
    pub fn scan(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        let mut entries = Vec::new();
        if dir.is_dir() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(ARCHIVE_EXT) {
                    continue;
                }
                let id = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<u64>().ok());
                match id {
                    Some(id) => entries.push(ArchiveEntry {
                        id,
                        path,
                        data: None,
                    }),
                    None => tracing::warn!(path = %path.display(), "Ignoring archive with bad name"),
                }
            }
        }
        entries.sort_by(|a, b| b.id.cmp(&a.id));
        tracing::debug!(dir = %dir.display(), count = entries.len(), "Archives scanned");
        Ok(Self { dir, entries })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_loaded(&self, index: usize) -> bool {
        self.entries.get(index).is_some_and(|e| e.data.is_some())
    }

    pub fn loaded_count(&self) -> usize {
        self.entries.iter().filter(|e| e.data.is_some()).count()
    }

    /// Load archive `index` (0 = newest) if needed
    pub fn ensure_loaded(&mut self, index: usize) -> AppResult<Option<&ArchiveData>> {
        let Some(entry) = self.entries.get_mut(index) else {
            return Ok(None);
        };
        if entry.data.is_none() {
            let loaded = load_or_recover::<ArchiveData>(&entry.path)?;
            if loaded.recovered {
                tracing::warn!(archive = entry.id, "Archive was corrupt and has been reset");
            }
            let mut data = loaded.value;
            data.id = entry.id;
            tracing::debug!(archive = entry.id, checks = data.checks.len(), "Archive loaded");
            entry.data = Some(data);
        }
        Ok(entry.data.as_ref())
    }

    /// Write a new archive and put it at the front
    pub fn create(&mut self, checks: Vec<Check>, period_end: i64) -> AppResult<u64> {
        let id = self.entries.first().map(|e| e.id + 1).unwrap_or(1);
        let path = self.dir.join(format!("{}.{}", id, ARCHIVE_EXT));
        let data = ArchiveData {
            id,
            period_end,
            checks,
            exceptions: Vec::new(),
        };
        save(&path, &data)?;
        tracing::info!(archive = id, checks = data.checks.len(), "Archive created");
        self.entries.insert(
            0,
            ArchiveEntry {
                id,
                path,
                data: Some(data),
            },
        );
        Ok(id)
    }

    /// Append exception records to an archive and rewrite it
    pub fn append_exceptions(&mut self, id: u64, records: &[ExceptionRecord]) -> AppResult<()> {
        let index = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| shared::error::AppError::not_found(format!("Archive {}", id)))?;
        self.ensure_loaded(index)?;
        let entry = &mut self.entries[index];
        if let Some(data) = entry.data.as_mut() {
            let kept = data.exceptions.len();
            data.exceptions.extend_from_slice(records);
            if let Err(e) = save(&entry.path, &*data) {
                data.exceptions.truncate(kept);
                return Err(e.into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_orders_newest_first_and_loads_lazily() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut list = ArchiveList::scan(dir.path()).unwrap();
            list.create(vec![Check::new(1)], 10).unwrap();
            list.create(vec![Check::new(2), Check::new(3)], 20).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let mut list = ArchiveList::scan(dir.path()).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.loaded_count(), 0);

        let newest = list.ensure_loaded(0).unwrap().unwrap();
        assert_eq!(newest.id, 2);
        assert_eq!(newest.checks.len(), 2);
        assert!(list.is_loaded(0));
        assert!(!list.is_loaded(1));
        assert!(list.ensure_loaded(5).unwrap().is_none());
    }

    #[test]
    fn test_append_exceptions_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut list = ArchiveList::scan(dir.path()).unwrap();
        let id = list.create(Vec::new(), 0).unwrap();
        let record = ExceptionRecord {
            at: 5,
            terminal: "Bar".into(),
            kind: crate::persist::ExceptionKind::Void,
            check_serial: 7,
            item: Some("PZ1".into()),
            amount: rust_decimal::Decimal::ONE,
            reason: "spilled".into(),
        };
        list.append_exceptions(id, std::slice::from_ref(&record)).unwrap();

        let mut reread = ArchiveList::scan(dir.path()).unwrap();
        let data = reread.ensure_loaded(0).unwrap().unwrap();
        assert_eq!(data.exceptions, vec![record]);
    }
}
