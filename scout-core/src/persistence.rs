//! Persistence boundary for session, cycle, path and finding records.
//!
//! The engine calls the store after every state transition and only logs a
//! failure; the running session stays the source of truth. `JsonFileStore`
//! lays records out as
//!
//! ```text
//! <base_dir>/sessions/<session id>/session.json
//! <base_dir>/sessions/<session id>/cycles/<n>.json
//! <base_dir>/sessions/<session id>/paths/<path id>.json
//! <base_dir>/sessions/<session id>/findings.json
//! ```
//!
//! and writes each file atomically (write to `.tmp`, then rename).

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::Result;
use crate::research::model::Finding;
use crate::research::session::{CycleRecord, PathRecord, SessionRecord};

/// Durable storage collaborator.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn record_session(&self, session: &SessionRecord) -> Result<()>;

    async fn record_cycle(&self, cycle: &CycleRecord) -> Result<()>;

    async fn record_path(&self, path: &PathRecord) -> Result<()>;

    /// Replace the stored finding list with `findings`. Findings are
    /// append-only, so the list only ever grows.
    async fn record_findings(&self, session_id: Uuid, findings: &[Finding]) -> Result<()>;
}

/// Atomically write JSON to `path`, creating parent directories.
pub async fn write_json_atomic<T: serde::Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(data)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Load JSON from `path`. `Ok(None)` if the file does not exist.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let value =
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

/// Stores records as JSON files under a base directory.
pub struct JsonFileStore {
    base_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn session_dir(&self, id: Uuid) -> PathBuf {
        self.base_dir.join("sessions").join(id.to_string())
    }

    pub fn load_session(&self, id: Uuid) -> io::Result<Option<SessionRecord>> {
        load_json(&self.session_dir(id).join("session.json"))
    }

    pub fn load_cycle(&self, id: Uuid, number: u32) -> io::Result<Option<CycleRecord>> {
        load_json(&self.session_dir(id).join("cycles").join(format!("{number}.json")))
    }

    pub fn load_findings(&self, id: Uuid) -> io::Result<Vec<Finding>> {
        Ok(load_json(&self.session_dir(id).join("findings.json"))?.unwrap_or_default())
    }

    /// Every stored session, newest first.
    pub fn list_sessions(&self) -> io::Result<Vec<SessionRecord>> {
        let root = self.base_dir.join("sessions");
        if !root.exists() {
            return Ok(Vec::new());
        }
        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let path = entry?.path().join("session.json");
            if let Some(record) = load_json::<SessionRecord>(&path)? {
                sessions.push(record);
            }
        }
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn record_session(&self, session: &SessionRecord) -> Result<()> {
        write_json_atomic(&self.session_dir(session.id).join("session.json"), session).await
    }

    async fn record_cycle(&self, cycle: &CycleRecord) -> Result<()> {
        let path = self
            .session_dir(cycle.session_id)
            .join("cycles")
            .join(format!("{}.json", cycle.number));
        write_json_atomic(&path, cycle).await
    }

    async fn record_path(&self, path: &PathRecord) -> Result<()> {
        let file = self
            .session_dir(path.session_id)
            .join("paths")
            .join(format!("{}.json", path.path_id));
        write_json_atomic(&file, path).await
    }

    async fn record_findings(&self, session_id: Uuid, findings: &[Finding]) -> Result<()> {
        write_json_atomic(&self.session_dir(session_id).join("findings.json"), findings).await
    }
}

#[derive(Default)]
struct Recorded {
    sessions: HashMap<Uuid, SessionRecord>,
    cycles: Vec<CycleRecord>,
    paths: Vec<PathRecord>,
    findings: HashMap<Uuid, Vec<Finding>>,
}

/// In-memory store that keeps every write, for tests and inspection.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Recorded>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn session(&self, id: Uuid) -> Option<SessionRecord> {
        self.lock().sessions.get(&id).cloned()
    }

    /// Every cycle write, in order. Later writes of the same cycle follow
    /// earlier ones.
    pub fn cycles(&self) -> Vec<CycleRecord> {
        self.lock().cycles.clone()
    }

    pub fn paths(&self) -> Vec<PathRecord> {
        self.lock().paths.clone()
    }

    pub fn findings(&self, id: Uuid) -> Vec<Finding> {
        self.lock().findings.get(&id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn record_session(&self, session: &SessionRecord) -> Result<()> {
        self.lock().sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn record_cycle(&self, cycle: &CycleRecord) -> Result<()> {
        self.lock().cycles.push(cycle.clone());
        Ok(())
    }

    async fn record_path(&self, path: &PathRecord) -> Result<()> {
        self.lock().paths.push(path.clone());
        Ok(())
    }

    async fn record_findings(&self, session_id: Uuid, findings: &[Finding]) -> Result<()> {
        self.lock().findings.insert(session_id, findings.to_vec());
        Ok(())
    }
}

/// Discards everything. Used when persistence is disabled.
#[derive(Debug, Default)]
pub struct NullStore;

#[async_trait]
impl SessionStore for NullStore {
    async fn record_session(&self, _session: &SessionRecord) -> Result<()> {
        Ok(())
    }

    async fn record_cycle(&self, _cycle: &CycleRecord) -> Result<()> {
        Ok(())
    }

    async fn record_path(&self, _path: &PathRecord) -> Result<()> {
        Ok(())
    }

    async fn record_findings(&self, _session_id: Uuid, _findings: &[Finding]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::model::{Assignment, FindingCategory, PathId, ResearchInput};
    use crate::research::session::{PathStatus, SessionStatus};
    use tempfile::TempDir;

    fn session() -> SessionRecord {
        SessionRecord::new(
            Uuid::new_v4(),
            ResearchInput::new("Acme Corp", "Manufacturing", "cloud migration"),
        )
    }

    #[tokio::test]
    async fn test_json_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        let mut record = session();
        store.record_session(&record).await.unwrap();
        record.transition(SessionStatus::Running);
        record.cycle_count = 1;
        store.record_session(&record).await.unwrap();

        let loaded = store.load_session(record.id).unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Running);
        assert_eq!(loaded.cycle_count, 1);

        let mut cycle = CycleRecord::start(record.id, 1);
        cycle.end();
        store.record_cycle(&cycle).await.unwrap();
        assert_eq!(store.load_cycle(record.id, 1).unwrap(), Some(cycle));
    }

    #[tokio::test]
    async fn test_json_store_paths_and_findings() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        let id = Uuid::new_v4();
        let path_id = PathId::new(1, "path_1");

        store
            .record_path(&PathRecord {
                session_id: id,
                cycle: 1,
                path_id: path_id.clone(),
                assignment: Assignment::new("path_1", "Cloud vendors"),
                status: PathStatus::Completed,
                action_calls: 3,
                finding_count: 1,
                stop_reason: None,
                error: None,
            })
            .await
            .unwrap();
        assert!(
            store
                .session_dir(id)
                .join("paths")
                .join("c1-path_1.json")
                .exists()
        );

        let findings = vec![Finding::new(FindingCategory::Technology, "Uses AWS", path_id, 1)];
        store.record_findings(id, &findings).await.unwrap();
        assert_eq!(store.load_findings(id).unwrap(), findings);
    }

    #[tokio::test]
    async fn test_no_tmp_leftover() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        let record = session();
        store.record_session(&record).await.unwrap();
        let files: Vec<_> = std::fs::read_dir(store.session_dir(record.id))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(files, vec!["session.json".to_string()]);
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.list_sessions().unwrap().is_empty());
        store.record_session(&session()).await.unwrap();
        store.record_session(&session()).await.unwrap();
        assert_eq!(store.list_sessions().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_memory_store_keeps_writes() {
        let store = MemoryStore::new();
        let record = session();
        store.record_session(&record).await.unwrap();
        store
            .record_cycle(&CycleRecord::start(record.id, 1))
            .await
            .unwrap();
        assert_eq!(store.session(record.id), Some(record));
        assert_eq!(store.cycles().len(), 1);
    }

    #[test]
    fn test_load_json_missing_file() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<SessionRecord> = load_json(&dir.path().join("nope.json")).unwrap();
        assert!(loaded.is_none());
    }
}
