//! JSON-file persistence for the position record.
//!
//! Writes go to a temporary file in the same directory followed by a
//! rename, so a crash mid-write never leaves a truncated record behind.
//! A missing file means a fresh start; a file that exists but cannot be
//! parsed is a hard error, because guessing at prior risk is worse than
//! refusing to start.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use perp_scalper_core::PositionState;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("state file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("state file violates position invariants: {0}")]
    Invalid(String),
}

pub struct StateStore {
    path: PathBuf,
    // Serializes read-modify-write sequences (pause toggles from the API
    // racing the control loop's saves).
    lock: Mutex<()>,
}

impl StateStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted position record.
    ///
    /// Returns a closed record when no file exists yet.
    ///
    /// # Errors
    /// Returns `StateStoreError::Corrupt` when the file exists but does not
    /// parse, and `StateStoreError::Invalid` when it parses into a record
    /// that breaks the position invariants. Both are startup-fatal.
    pub fn load(&self) -> Result<PositionState, StateStoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        self.load_unlocked()
    }

    /// Persists the record atomically, stamping `updated_at`.
    ///
    /// The `paused` flag on disk wins over the one in `state`: a pause
    /// request can land between the tick's load and this save, and the
    /// tick's stale copy must not overwrite it. The control loop is the
    /// single writer of every other field, so only `paused` gets merged.
    ///
    /// # Errors
    /// Returns an error when the temp file cannot be written or renamed.
    pub fn save(&self, state: &mut PositionState) -> Result<(), StateStoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(paused) = self.on_disk_paused() {
            state.paused = paused;
        }
        self.save_unlocked(state)
    }

    /// Flips the pause flag under the store lock and returns the new record.
    ///
    /// # Errors
    /// Propagates load/save failures.
    pub fn set_paused(&self, paused: bool) -> Result<PositionState, StateStoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut state = self.load_unlocked()?;
        if state.paused != paused {
            state.paused = paused;
            self.save_unlocked(&mut state)?;
            info!(paused, "pause flag updated");
        }
        Ok(state)
    }

    /// The pause flag currently on disk, if a readable record exists.
    /// Must be called with the store lock held.
    fn on_disk_paused(&self) -> Option<bool> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let state: PositionState = serde_json::from_str(&raw).ok()?;
        Some(state.paused)
    }

    fn load_unlocked(&self) -> Result<PositionState, StateStoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no state file, starting closed");
            return Ok(PositionState::closed());
        }
        let raw = fs::read_to_string(&self.path)?;
        let state: PositionState = serde_json::from_str(&raw)?;
        state
            .validate()
            .map_err(|e| StateStoreError::Invalid(e.to_string()))?;
        Ok(state)
    }

    fn save_unlocked(&self, state: &mut PositionState) -> Result<(), StateStoreError> {
        state.updated_at = Utc::now();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            serde_json::to_writer_pretty(&mut file, state)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), is_open = state.is_open, "state persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perp_scalper_core::{BreakEvenStage, PositionSide};
    use rust_decimal_macros::dec;

    fn store_in(dir: &tempfile::TempDir) -> StateStore {
        StateStore::new(dir.path().join("state.json"))
    }

    #[test]
    fn missing_file_loads_as_closed() {
        let dir = tempfile::tempdir().unwrap();
        let state = store_in(&dir).load().unwrap();
        assert!(!state.is_open);
        assert!(state.side.is_none());
    }

    #[test]
    fn save_then_load_round_trips_open_position() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut state = PositionState::closed();
        state.is_open = true;
        state.side = Some(PositionSide::Long);
        state.entry_price = Some(dec!(50_000));
        state.stop_price = Some(dec!(49_000));
        state.stop_order_id = Some("oid-1".into());
        state.break_even_stage = BreakEvenStage::Stage1;
        store.save(&mut state).unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.is_open);
        assert_eq!(loaded.side, Some(PositionSide::Long));
        assert_eq!(loaded.stop_price, Some(dec!(49_000)));
        assert_eq!(loaded.break_even_stage, BreakEvenStage::Stage1);
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();
        let err = StateStore::new(path).load().unwrap_err();
        assert!(matches!(err, StateStoreError::Corrupt(_)));
    }

    #[test]
    fn invariant_breaking_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        // open but with no side or prices
        fs::write(
            &path,
            r#"{"is_open":true,"side":null,"entry_price":null,"stop_price":null,
                "stop_order_id":null,"take_profits":[],"break_even_stage":"None",
                "reversal_count":0,"paused":false,
                "updated_at":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let err = StateStore::new(path).load().unwrap_err();
        assert!(matches!(err, StateStoreError::Invalid(_)));
    }

    #[test]
    fn set_paused_persists_and_preserves_position_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut state = PositionState::closed();
        state.is_open = true;
        state.side = Some(PositionSide::Long);
        state.entry_price = Some(dec!(50_000));
        state.stop_price = Some(dec!(49_000));
        state.reversal_count = 2;
        store.save(&mut state).unwrap();

        let paused = store.set_paused(true).unwrap();
        assert!(paused.paused);
        assert_eq!(paused.reversal_count, 2);
        assert_eq!(paused.stop_price, Some(dec!(49_000)));

        let reloaded = store.load().unwrap();
        assert!(reloaded.paused);
    }

    #[test]
    fn mid_tick_pause_request_survives_a_stale_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&mut PositionState::closed()).unwrap();

        // the control loop loads its copy at the start of a tick
        let mut tick_state = store.load().unwrap();
        assert!(!tick_state.paused);

        // the operator pauses while the tick is still running
        store.set_paused(true).unwrap();

        // the tick's later save must not clobber the pause request
        store.save(&mut tick_state).unwrap();
        assert!(store.load().unwrap().paused);
        assert!(tick_state.paused);

        // and the same holds for a resume landing mid-tick
        let mut tick_state = store.load().unwrap();
        store.set_paused(false).unwrap();
        store.save(&mut tick_state).unwrap();
        assert!(!store.load().unwrap().paused);
    }

    #[test]
    fn no_tmp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&mut PositionState::closed()).unwrap();
        assert!(!dir.path().join("state.json.tmp").exists());
    }
}
