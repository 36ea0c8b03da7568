//! Versioned file format with backup-and-recover
//!
//! ```text
//! 3                      <- format version (integer line)
//! { ...json body... }
//! ```
//!
//! Load discipline shared by every persisted resource:
//!
//! 1. missing file → default value
//! 2. version outside `MIN_VERSION..=VERSION` → [`PersistError::UnsupportedVersion`], file untouched
//! 3. unreadable header or body → rename to `<file>.bak`, retry once (now empty)

use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::error::{AppError, ErrorCode};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A resource stored in a versioned file
pub trait Versioned: Serialize + DeserializeOwned + Default {
    /// Resource name for diagnostics
    const KIND: &'static str;
    /// Oldest version this build can read
    const MIN_VERSION: u32 = 1;
    /// Version written by this build
    const VERSION: u32;
}

/// Persistence errors
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt {kind} file {path}: {reason}")]
    Corrupt {
        kind: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("unsupported {kind} version {found} in {path} (supported {min}..={max})")]
    UnsupportedVersion {
        kind: &'static str,
        path: PathBuf,
        found: u32,
        min: u32,
        max: u32,
    },
}

pub type PersistResult<T> = Result<T, PersistError>;

impl From<PersistError> for AppError {
    fn from(err: PersistError) -> Self {
        let code = match &err {
            PersistError::Io { .. } => ErrorCode::InternalError,
            PersistError::Corrupt { .. } => ErrorCode::StorageCorrupted,
            PersistError::UnsupportedVersion { .. } => ErrorCode::UnsupportedVersion,
        };
        AppError::with_message(code, err.to_string())
    }
}

/// A loaded value with the version it was stored under
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub value: T,
    pub version: u32,
    /// Whether a corrupt file was moved aside to produce this value
    pub recovered: bool,
}

/// `<file>.bak` next to the original
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}

/// Load a versioned file; `Ok(None)` when the file does not exist
pub fn load<T: Versioned>(path: &Path) -> PersistResult<Option<Loaded<T>>> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let corrupt = |reason: String| PersistError::Corrupt {
        kind: T::KIND,
        path: path.to_path_buf(),
        reason,
    };

    let text = String::from_utf8(bytes).map_err(|_| corrupt("not valid UTF-8".into()))?;
    let (header, body) = text
        .split_once('\n')
        .ok_or_else(|| corrupt("missing version header".into()))?;
    let version: u32 = header
        .trim()
        .parse()
        .map_err(|_| corrupt(format!("bad version header {:?}", header.trim())))?;

    if !(T::MIN_VERSION..=T::VERSION).contains(&version) {
        return Err(PersistError::UnsupportedVersion {
            kind: T::KIND,
            path: path.to_path_buf(),
            found: version,
            min: T::MIN_VERSION,
            max: T::VERSION,
        });
    }

    let value: T = serde_json::from_str(body).map_err(|e| corrupt(e.to_string()))?;
    Ok(Some(Loaded {
        value,
        version,
        recovered: false,
    }))
}

/// Save under the current version
///
/// Each resource is written on its own; a torn write is caught by the
/// recovery path on the next load.
pub fn save<T: Versioned>(path: &Path, value: &T) -> PersistResult<()> {
    let io_err = |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };
    let body = serde_json::to_string_pretty(value).map_err(|e| PersistError::Corrupt {
        kind: T::KIND,
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, format!("{}\n{}\n", T::VERSION, body)).map_err(io_err)?;
    tracing::debug!(kind = T::KIND, path = %path.display(), "Saved");
    Ok(())
}

/// Load with backup-and-recover
///
/// A corrupt file is renamed to `<file>.bak` (replacing any older backup)
/// and the load is retried exactly once. Unsupported versions and I/O
/// failures are returned unchanged.
pub fn load_or_recover<T: Versioned>(path: &Path) -> PersistResult<Loaded<T>> {
    match load::<T>(path) {
        Ok(Some(loaded)) => Ok(loaded),
        Ok(None) => Ok(empty()),
        Err(PersistError::Corrupt { reason, .. }) => {
            let backup = backup_path(path);
            tracing::warn!(
                kind = T::KIND,
                path = %path.display(),
                backup = %backup.display(),
                reason = %reason,
                "Corrupt file moved aside, starting empty"
            );
            fs::rename(path, &backup).map_err(|source| PersistError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let mut retried = load::<T>(path)?.unwrap_or_else(empty);
            retried.recovered = true;
            Ok(retried)
        }
        Err(e) => Err(e),
    }
}

fn empty<T: Versioned>() -> Loaded<T> {
    Loaded {
        value: T::default(),
        version: T::VERSION,
        recovered: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Sample {
        names: Vec<String>,
    }

    impl Versioned for Sample {
        const KIND: &'static str = "sample";
        const MIN_VERSION: u32 = 2;
        const VERSION: u32 = 3;
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.dat");
        let value = Sample {
            names: vec!["a".into()],
        };
        save(&path, &value).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("3\n"));
        let loaded = load::<Sample>(&path).unwrap().unwrap();
        assert_eq!(loaded.value, value);
        assert_eq!(loaded.version, 3);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_or_recover::<Sample>(&dir.path().join("none.dat")).unwrap();
        assert_eq!(loaded.value, Sample::default());
        assert!(!loaded.recovered);
    }

    #[test]
    fn test_unsupported_version_is_not_backed_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.dat");
        fs::write(&path, "1\n{\"names\":[]}\n").unwrap();
        let err = load_or_recover::<Sample>(&path).unwrap_err();
        assert!(matches!(err, PersistError::UnsupportedVersion { found: 1, .. }));
        assert!(path.exists());
        assert!(!backup_path(&path).exists());

        fs::write(&path, "9\n{\"names\":[]}\n").unwrap();
        assert!(matches!(
            load::<Sample>(&path),
            Err(PersistError::UnsupportedVersion { found: 9, .. })
        ));
    }

    #[test]
    fn test_corrupt_body_recovers_with_single_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.dat");

        // An older backup is replaced, never accumulated
        fs::write(backup_path(&path), "stale").unwrap();
        fs::write(&path, "3\n{\"names\":[\"a\", tru").unwrap();

        let loaded = load_or_recover::<Sample>(&path).unwrap();
        assert!(loaded.recovered);
        assert_eq!(loaded.value, Sample::default());
        assert!(!path.exists());

        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".bak"))
            .collect();
        assert_eq!(backups.len(), 1);
        let kept = fs::read_to_string(backup_path(&path)).unwrap();
        assert!(kept.starts_with("3\n"));
    }

    #[test]
    fn test_garbled_header_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.dat");
        fs::write(&path, "\u{0}\u{1}garbage").unwrap();
        assert!(matches!(
            load::<Sample>(&path),
            Err(PersistError::Corrupt { .. })
        ));
    }
}
