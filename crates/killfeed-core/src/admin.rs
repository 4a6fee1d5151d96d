//! Administrative commands against a state file.
//!
//! A running tracker holds a [`RunLock`] beside its state file and watches an
//! [`AdminInbox`] directory. Commands issued from another process while the lock
//! is held are queued in the inbox and applied by the tracker, so they are not
//! overwritten by its next save. Without a tracker they are applied to the file
//! directly.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::engine::SharedState;
use crate::error::{KillfeedError, Result};
use crate::models::PlayerId;
use crate::playtime::LinkOutcome;
use crate::store::{open_store, Persistence};

static SUBMIT_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AdminCommand {
    ResetAll,
    ResetPlaytime,
    Link {
        stable_id: String,
        display_name: String,
    },
}

impl AdminCommand {
    /// Reject a command that could never apply, before it is queued.
    pub fn validate(&self) -> Result<()> {
        if let AdminCommand::Link {
            stable_id,
            display_name,
        } = self
        {
            if PlayerId::stable(stable_id).is_none() {
                return Err(KillfeedError::InvalidIdentity(format!(
                    "'{}' is not a numeric player id",
                    stable_id
                )));
            }
            if display_name.trim().is_empty() {
                return Err(KillfeedError::InvalidIdentity(
                    "display name must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Apply to in-memory state. Only `Link` has an outcome.
    pub fn apply(&self, state: &SharedState) -> Result<Option<LinkOutcome>> {
        match self {
            AdminCommand::ResetAll => {
                state.reset_all();
                log::info!("All statistics reset");
                Ok(None)
            }
            AdminCommand::ResetPlaytime => {
                state.reset_playtime();
                log::info!("Playtime statistics reset");
                Ok(None)
            }
            AdminCommand::Link {
                stable_id,
                display_name,
            } => state.link_identity(stable_id, display_name).map(Some),
        }
    }
}

fn sidecar(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(db_path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Directory of queued commands, one JSON file each, applied oldest first.
#[derive(Debug, Clone)]
pub struct AdminInbox {
    dir: PathBuf,
}

impl AdminInbox {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Inbox of the tracker that owns `db_path`.
    pub fn for_state_file(db_path: &Path) -> Self {
        Self::new(sidecar(db_path, ".inbox"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Queue a command. It is written under a temporary name and renamed, so a
    /// reader never sees half a file.
    pub fn submit(&self, command: &AdminCommand) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let stem = format!(
            "{:020}-{}-{:04}",
            nanos,
            std::process::id(),
            SUBMIT_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let tmp = self.dir.join(format!("{}.tmp", stem));
        let path = self.dir.join(format!("{}.json", stem));
        fs::write(&tmp, serde_json::to_vec(command)?)?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    /// Take every queued command, oldest first. Unreadable entries are logged and dropped.
    pub fn drain(&self) -> Result<Vec<AdminCommand>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        paths.sort();

        let mut commands = Vec::with_capacity(paths.len());
        for path in paths {
            let parsed = fs::read(&path)
                .map_err(KillfeedError::from)
                .and_then(|bytes| {
                    serde_json::from_slice::<AdminCommand>(&bytes).map_err(KillfeedError::from)
                });
            // a command that cannot be removed would be applied again next time
            if let Err(e) = fs::remove_file(&path) {
                log::warn!("Skipping admin command {}: cannot remove it: {}", path.display(), e);
                continue;
            }
            match parsed {
                Ok(command) => commands.push(command),
                Err(e) => log::warn!("Dropping unreadable admin command {}: {}", path.display(), e),
            }
        }
        Ok(commands)
    }
}

/// Marks a state file as owned by a running tracker. Released on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn path_for(db_path: &Path) -> PathBuf {
        sidecar(db_path, ".lock")
    }

    /// Take the lock, or None when another process holds it.
    pub fn try_acquire(db_path: &Path) -> Result<Option<Self>> {
        let path = Self::path_for(db_path);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let lock = Self { path };
        writeln!(file, "{}", std::process::id())?;
        Ok(Some(lock))
    }

    pub fn acquire(db_path: &Path) -> Result<Self> {
        Self::try_acquire(db_path)?.ok_or_else(|| {
            KillfeedError::Config(format!(
                "{} is in use by another tracker; delete {} if none is running",
                db_path.display(),
                Self::path_for(db_path).display()
            ))
        })
    }

    pub fn is_held(db_path: &Path) -> bool {
        Self::path_for(db_path).exists()
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

/// How an admin command reached the state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminDelivery {
    /// Left in the inbox of the running tracker.
    Queued,
    /// Applied to the state file directly.
    Applied(Option<LinkOutcome>),
}

/// Hand `command` to the tracker running on `db_path`, or apply it to the file
/// directly when none is running. Commands still queued from an earlier
/// tracker are applied first, in order.
pub fn submit_or_apply(db_path: &Path, command: &AdminCommand) -> Result<AdminDelivery> {
    command.validate()?;

    let Some(lock) = RunLock::try_acquire(db_path)? else {
        let queued = AdminInbox::for_state_file(db_path).submit(command)?;
        log::info!("Queued {:?} for the running tracker as {}", command, queued.display());
        return Ok(AdminDelivery::Queued);
    };

    let persistence = Persistence::new(open_store(db_path));
    let state = SharedState::from_snapshot(persistence.load_or_empty());
    for queued in AdminInbox::for_state_file(db_path).drain()? {
        if let Err(e) = queued.apply(&state) {
            log::warn!("Queued admin command {:?} rejected: {}", queued, e);
        }
    }
    let outcome = command.apply(&state)?;
    persistence.save(&state.snapshot())?;
    drop(lock);
    Ok(AdminDelivery::Applied(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(id: &str, name: &str) -> AdminCommand {
        AdminCommand::Link {
            stable_id: id.to_string(),
            display_name: name.to_string(),
        }
    }

    #[test]
    fn test_inbox_drains_in_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let inbox = AdminInbox::for_state_file(&dir.path().join("state.db"));
        assert!(inbox.drain().unwrap().is_empty());

        inbox.submit(&link("1", "Ann")).unwrap();
        inbox.submit(&AdminCommand::ResetPlaytime).unwrap();
        inbox.submit(&link("2", "Bob")).unwrap();
        fs::write(inbox.dir().join("zz-garbage.json"), b"{not json").unwrap();

        let drained = inbox.drain().unwrap();
        assert_eq!(
            drained,
            vec![link("1", "Ann"), AdminCommand::ResetPlaytime, link("2", "Bob")]
        );
        assert!(inbox.drain().unwrap().is_empty());
        assert_eq!(fs::read_dir(inbox.dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_command_json_shape() {
        let json = serde_json::to_string(&link("7", "Rex")).unwrap();
        assert_eq!(json, r#"{"op":"link","stable_id":"7","display_name":"Rex"}"#);
        let parsed: AdminCommand = serde_json::from_str(r#"{"op":"reset_all"}"#).unwrap();
        assert_eq!(parsed, AdminCommand::ResetAll);
    }

    #[test]
    fn test_run_lock_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("state.db");
        let lock = RunLock::acquire(&db).unwrap();
        assert!(RunLock::is_held(&db));
        assert!(RunLock::try_acquire(&db).unwrap().is_none());
        assert!(matches!(RunLock::acquire(&db), Err(KillfeedError::Config(_))));
        drop(lock);
        assert!(!RunLock::is_held(&db));
        assert!(RunLock::try_acquire(&db).unwrap().is_some());
    }

    #[test]
    fn test_bad_link_is_rejected_before_queueing() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("state.db");
        let _lock = RunLock::acquire(&db).unwrap();
        let result = submit_or_apply(&db, &link("bob", "Bob"));
        assert!(matches!(result, Err(KillfeedError::InvalidIdentity(_))));
        assert!(submit_or_apply(&db, &link("5", "  ")).is_err());
        assert!(!AdminInbox::for_state_file(&db).dir().exists());
    }

    #[test]
    fn test_without_tracker_applies_queued_then_new_command() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("state.json");
        let persistence = Persistence::new(open_store(&db));
        let state = SharedState::default();
        state.observe_presence(&["Rex".to_string()]);
        persistence.save(&state.snapshot()).unwrap();

        // left behind by a tracker that has since stopped
        AdminInbox::for_state_file(&db).submit(&link("9", "Rex")).unwrap();

        let delivery = submit_or_apply(&db, &link("9", "Rexy")).unwrap();
        assert_eq!(delivery, AdminDelivery::Applied(Some(LinkOutcome::Renamed)));
        assert!(!RunLock::is_held(&db));

        let saved = persistence.load_or_empty();
        assert_eq!(saved.playtime.len(), 1);
        assert_eq!(saved.playtime[0].0, PlayerId::stable("9").unwrap());
        assert_eq!(saved.playtime[0].1.display_name, "Rexy");
    }
}
