//! Storage for finalized sessions.
//!
//! Stores keep the most recent sessions only. Saving a session whose id is
//! already stored replaces the old copy and moves it to the newest slot; when
//! the capacity is exceeded the oldest session is dropped.

use biomech_core::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::session::AssessmentSession;

pub const DEFAULT_STORE_CAPACITY: usize = 10;

pub trait SessionStore: Send + Sync {
    fn save(&self, session: &AssessmentSession) -> Result<()>;

    /// Up to `n` sessions, newest first
    fn load_recent(&self, n: usize) -> Result<Vec<AssessmentSession>>;
}

fn upsert_capped(
    sessions: &mut VecDeque<AssessmentSession>,
    session: &AssessmentSession,
    capacity: usize,
) {
    sessions.retain(|s| s.id != session.id);
    sessions.push_back(session.clone());
    while sessions.len() > capacity.max(1) {
        sessions.pop_front();
    }
}

fn newest_first(sessions: &VecDeque<AssessmentSession>, n: usize) -> Vec<AssessmentSession> {
    sessions.iter().rev().take(n).cloned().collect()
}

#[derive(Debug)]
pub struct InMemorySessionStore {
    sessions: RwLock<VecDeque<AssessmentSession>>,
    capacity: usize,
}

impl InMemorySessionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(VecDeque::new()),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_CAPACITY)
    }
}

impl SessionStore for InMemorySessionStore {
    fn save(&self, session: &AssessmentSession) -> Result<()> {
        upsert_capped(&mut self.sessions.write(), session, self.capacity);
        Ok(())
    }

    fn load_recent(&self, n: usize) -> Result<Vec<AssessmentSession>> {
        Ok(newest_first(&self.sessions.read(), n))
    }
}

/// Sessions kept as a JSON array in a single file, oldest first
#[derive(Debug)]
pub struct JsonFileSessionStore {
    path: PathBuf,
    capacity: usize,
    // Serializes read-modify-write cycles on the file
    lock: Mutex<()>,
}

impl JsonFileSessionStore {
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<VecDeque<AssessmentSession>> {
        if !self.path.exists() {
            return Ok(VecDeque::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(VecDeque::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_all(&self, sessions: &VecDeque<AssessmentSession>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(sessions)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| Error::Persistence(format!("{}: {}", self.path.display(), e)))
    }
}

impl SessionStore for JsonFileSessionStore {
    fn save(&self, session: &AssessmentSession) -> Result<()> {
        let _guard = self.lock.lock();
        let mut sessions = self.read_all()?;
        upsert_capped(&mut sessions, session, self.capacity);
        self.write_all(&sessions)?;
        tracing::debug!("Saved session {} to {}", session.id, self.path.display());
        Ok(())
    }

    fn load_recent(&self, n: usize) -> Result<Vec<AssessmentSession>> {
        let _guard = self.lock.lock();
        Ok(newest_first(&self.read_all()?, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionMode;
    use biomech_core::{SessionId, Timestamp};

    fn session() -> AssessmentSession {
        let started = Timestamp::from_secs_f64(1_700_000_000.0).to_datetime();
        AssessmentSession::new(SessionMode::Full, started)
    }

    #[test]
    fn test_capacity_and_order() {
        let store = InMemorySessionStore::new(3);
        let sessions: Vec<_> = (0..5).map(|_| session()).collect();
        for s in &sessions {
            store.save(s).unwrap();
        }

        let recent = store.load_recent(10).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, sessions[4].id);
        assert_eq!(recent[2].id, sessions[2].id);
    }

    #[test]
    fn test_dedup_by_id() {
        let store = InMemorySessionStore::default();
        let a = session();
        let b = session();
        store.save(&a).unwrap();
        store.save(&b).unwrap();
        store.save(&a).unwrap();

        let recent = store.load_recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, a.id);
    }

    #[test]
    fn test_json_file_store() {
        let path = std::env::temp_dir().join(format!("biomech-sessions-{}.json", SessionId::new()));
        let store = JsonFileSessionStore::new(&path, 2);
        assert!(store.load_recent(5).unwrap().is_empty());

        let sessions: Vec<_> = (0..3).map(|_| session()).collect();
        for s in &sessions {
            store.save(s).unwrap();
        }

        let reopened = JsonFileSessionStore::new(&path, 2);
        let recent = reopened.load_recent(5).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0], sessions[2]);
        assert_eq!(recent[1], sessions[1]);

        std::fs::remove_file(&path).unwrap();
    }
}
