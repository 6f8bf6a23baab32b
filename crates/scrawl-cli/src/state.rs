//! Persisted author state for id allocation.
//!
//! The counter in the state file is the only record of which ids this
//! machine has already issued. Reissuing an id would corrupt pages, so
//! loading fails closed: a corrupt file, or a missing file shadowed by a
//! backup, is an error rather than a silent restart from zero.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use scrawl_scene::AuthorState;
use tempfile::NamedTempFile;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("no user data directory available; pass --state explicitly")]
    NoDataDir,

    #[error("cannot access author state at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("author state at {path} is corrupt; refusing to restart counters from zero")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "author state missing at {path} but a backup exists at {backup}; \
         restore the backup before writing"
    )]
    MissingWithBackup { path: PathBuf, backup: PathBuf },

    #[error("author state at {path} is for author {stored}, not {requested}")]
    AuthorMismatch {
        path: PathBuf,
        stored: u8,
        requested: u8,
    },
}

/// `$XDG_DATA_HOME/scrawl/author_state.json` (or the platform equivalent).
pub fn default_state_path() -> Result<PathBuf, StateError> {
    let dir = dirs::data_dir().ok_or(StateError::NoDataDir)?;
    Ok(dir.join("scrawl").join("author_state.json"))
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Load the state for `author_id`, or a fresh zero-counter state when the
/// file has genuinely never been written.
pub fn load(path: &Path, author_id: u8) -> Result<AuthorState, StateError> {
    match fs::read(path) {
        Ok(bytes) => {
            let state: AuthorState =
                serde_json::from_slice(&bytes).map_err(|source| StateError::Corrupt {
                    path: path.to_path_buf(),
                    source,
                })?;
            if state.author_id != author_id {
                return Err(StateError::AuthorMismatch {
                    path: path.to_path_buf(),
                    stored: state.author_id,
                    requested: author_id,
                });
            }
            Ok(state)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let backup = backup_path(path);
            if backup.exists() {
                // The primary vanished but a backup survived; starting from
                // zero here would reissue every id the backup records.
                Err(StateError::MissingWithBackup {
                    path: path.to_path_buf(),
                    backup,
                })
            } else {
                tracing::debug!(path = %path.display(), "no author state yet, starting fresh");
                Ok(AuthorState::new(author_id))
            }
        }
        Err(source) => Err(StateError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persist `state`, keeping the previous file as `.bak` and replacing the
/// primary atomically.
pub fn save(path: &Path, state: &AuthorState) -> Result<(), StateError> {
    let io_err = |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(io_err)?;

    if path.exists() {
        fs::copy(path, backup_path(path)).map_err(io_err)?;
    }

    let mut tmp = NamedTempFile::new_in(&parent).map_err(io_err)?;
    serde_json::to_writer_pretty(&mut tmp, state).map_err(|source| StateError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    tmp.write_all(b"\n").map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_state_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("author_state.json");
        let state = load(&path, 2).unwrap();
        assert_eq!(state, AuthorState::new(2));
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("author_state.json");
        let state = AuthorState {
            author_id: 2,
            last_counter: 41,
        };
        save(&path, &state).unwrap();
        assert_eq!(load(&path, 2).unwrap(), state);
    }

    #[test]
    fn test_second_save_keeps_backup_of_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("author_state.json");
        save(&path, &AuthorState {
            author_id: 2,
            last_counter: 1,
        })
        .unwrap();
        save(&path, &AuthorState {
            author_id: 2,
            last_counter: 2,
        })
        .unwrap();

        let backup: AuthorState =
            serde_json::from_slice(&fs::read(backup_path(&path)).unwrap()).unwrap();
        assert_eq!(backup.last_counter, 1);
        assert_eq!(load(&path, 2).unwrap().last_counter, 2);
    }

    #[test]
    fn test_corrupt_state_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("author_state.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(load(&path, 2), Err(StateError::Corrupt { .. })));
    }

    #[test]
    fn test_missing_primary_with_backup_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("author_state.json");
        save(&path, &AuthorState {
            author_id: 2,
            last_counter: 1,
        })
        .unwrap();
        save(&path, &AuthorState {
            author_id: 2,
            last_counter: 2,
        })
        .unwrap();
        fs::remove_file(&path).unwrap();
        assert!(matches!(
            load(&path, 2),
            Err(StateError::MissingWithBackup { .. })
        ));
    }

    #[test]
    fn test_author_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("author_state.json");
        save(&path, &AuthorState {
            author_id: 2,
            last_counter: 7,
        })
        .unwrap();
        assert!(matches!(
            load(&path, 3),
            Err(StateError::AuthorMismatch {
                stored: 2,
                requested: 3,
                ..
            })
        ));
    }
}
