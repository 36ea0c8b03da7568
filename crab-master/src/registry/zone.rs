//! 配置数据库 (菜单页 + 桌台页)
//!
//! Master 副本的归属：
//!
//! ```text
//!   load_master ──▶ Unissued(db)
//!                      │ 第一个终端 issue_copy
//!                      ▼
//!                   Held(terminal) ──── holder 被移除 ──▶ Held(最小 id 的剩余终端)
//!                      │                                   │
//!                      └──── 没有剩余终端 ──▶ Masterless { retired }
//! ```
//!
//! Masterless 状态下不再发放副本，直到重新 `load_master`；retired 副本只用于关闭时保存。

use crate::persist::{Versioned, files, load_or_recover, save};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, AppResult, ErrorCode};
use std::path::Path;

pub type TerminalId = u32;

/// 配置页类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PageClass {
    /// 点单菜单页
    Menu,
    /// 桌台布局页
    Table,
}

/// 页面上的区域 (按钮、桌台等)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Zone {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default)]
    pub w: i32,
    #[serde(default)]
    pub h: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    pub id: u32,
    pub class: PageClass,
    pub name: String,
    #[serde(default)]
    pub zones: Vec<Zone>,
}

/// Pages as stored in one file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PageFile {
    pub pages: Vec<Page>,
}

impl Versioned for PageFile {
    const KIND: &'static str = "pages";
    const VERSION: u32 = 2;
}

/// 配置数据库
///
/// `Clone` 是深拷贝：发放出去的副本之间没有共享状态。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDatabase {
    pub version: u32,
    pub pages: Vec<Page>,
}

impl ConfigDatabase {
    pub fn pages_of(&self, class: PageClass) -> impl Iterator<Item = &Page> {
        self.pages.iter().filter(move |p| p.class == class)
    }

    fn page_file(&self, class: PageClass) -> PageFile {
        PageFile {
            pages: self.pages_of(class).cloned().collect(),
        }
    }
}

/// Master 副本状态
#[derive(Debug)]
pub enum MasterSlot {
    /// 尚未加载
    Unloaded,
    /// 已加载，尚未发放
    Unissued(ConfigDatabase),
    /// master 由该终端持有 (存放在终端节点内)
    Held(TerminalId),
    /// 无 master；retired 仅供关闭时保存
    Masterless { retired: Option<ConfigDatabase> },
}

/// Load menu and table pages and merge them into one master database
///
/// A page whose class disagrees with the file it was found in is kept
/// under the file's class.
pub fn load_master(data_path: &Path) -> AppResult<ConfigDatabase> {
    let mut db = ConfigDatabase::default();
    for (file, class) in [
        (files::MENU_PAGES, PageClass::Menu),
        (files::TABLE_PAGES, PageClass::Table),
    ] {
        let path = data_path.join(file);
        let loaded = load_or_recover::<PageFile>(&path).map_err(|e| {
            AppError::with_message(
                ErrorCode::ConfigLoadFailed,
                format!("cannot load configuration: {}", e),
            )
        })?;
        db.version = db.version.max(loaded.version);
        for mut page in loaded.value.pages {
            if page.class != class {
                tracing::warn!(page = page.id, file = file, "Page class mismatch, reclassified");
                page.class = class;
            }
            db.pages.push(page);
        }
    }
    tracing::info!(version = db.version, pages = db.pages.len(), "Configuration loaded");
    Ok(db)
}

pub fn save_menu_pages(db: &ConfigDatabase, data_path: &Path) -> AppResult<()> {
    save(&data_path.join(files::MENU_PAGES), &db.page_file(PageClass::Menu))?;
    Ok(())
}

pub fn save_table_pages(db: &ConfigDatabase, data_path: &Path) -> AppResult<()> {
    save(&data_path.join(files::TABLE_PAGES), &db.page_file(PageClass::Table))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: u32, class: PageClass) -> Page {
        Page {
            id,
            class,
            name: format!("page {}", id),
            zones: vec![Zone {
                id: 1,
                name: "Button".into(),
                kind: "item".into(),
                x: 0,
                y: 0,
                w: 10,
                h: 10,
            }],
        }
    }

    #[test]
    fn test_save_filters_by_class_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let db = ConfigDatabase {
            version: 2,
            pages: vec![page(1, PageClass::Menu), page(2, PageClass::Table), page(3, PageClass::Menu)],
        };
        save_menu_pages(&db, dir.path()).unwrap();
        save_table_pages(&db, dir.path()).unwrap();

        let menu = crate::persist::load::<PageFile>(&dir.path().join(files::MENU_PAGES))
            .unwrap()
            .unwrap();
        assert_eq!(menu.value.pages.len(), 2);

        let loaded = load_master(dir.path()).unwrap();
        assert_eq!(loaded.pages.len(), 3);
        assert_eq!(loaded.pages_of(PageClass::Table).count(), 1);
    }

    #[test]
    fn test_corrupt_pages_recover_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(files::MENU_PAGES), "2\n{broken").unwrap();
        let db = load_master(dir.path()).unwrap();
        assert!(db.pages.is_empty());
        assert!(dir.path().join("menu.pages.bak").exists());
    }

    #[test]
    fn test_unsupported_pages_version_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(files::TABLE_PAGES), "99\n{\"pages\":[]}").unwrap();
        let err = load_master(dir.path()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigLoadFailed);
        assert!(err.is_fatal());
    }
}
