//! File-backed `ThreadStore`: one JSONL file per thread, one line per
//! event, opened with `OpenOptions::new().create(true).append(true)` —
//! the same durability primitive the teacher's `TranscriptWriter` uses.
//!
//! Serialisation is per thread: a `RwLock<HashMap<ThreadId, Arc<Mutex<()>>>>`
//! lock table hands out one mutex per thread id, so concurrent appends to
//! distinct threads never contend, matching the teacher's session-store
//! locking granularity.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use lace_domain::error::{LaceError, Result};
use lace_domain::event::ThreadEvent;
use lace_domain::event::EventData;
use lace_domain::ids::ThreadId;

use crate::{ThreadMeta, ThreadStore};

pub struct JsonlThreadStore {
    data_dir: PathBuf,
    locks: RwLock<HashMap<ThreadId, Arc<Mutex<()>>>>,
}

impl JsonlThreadStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(data_dir.join("threads"))?;
        Ok(Self {
            data_dir,
            locks: RwLock::new(HashMap::new()),
        })
    }

    fn lock_for(&self, thread_id: &ThreadId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().get(thread_id) {
            return lock.clone();
        }
        self.locks
            .write()
            .entry(thread_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn events_path(&self, thread_id: &ThreadId) -> PathBuf {
        self.data_dir.join("threads").join(format!("{thread_id}.jsonl"))
    }

    fn meta_path(&self, thread_id: &ThreadId) -> PathBuf {
        self.data_dir.join("threads").join(format!("{thread_id}.meta.json"))
    }

    fn read_events_unlocked(&self, thread_id: &ThreadId) -> Result<Vec<ThreadEvent>> {
        let path = self.events_path(thread_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        let mut events = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ThreadEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(thread_id = %thread_id, error = %e, "skipping malformed event line");
                }
            }
        }
        Ok(events)
    }

    fn write_meta(&self, meta: &ThreadMeta) -> Result<()> {
        let json = serde_json::to_string_pretty(meta)?;
        std::fs::write(self.meta_path(&meta.id), json)?;
        Ok(())
    }
}

impl ThreadStore for JsonlThreadStore {
    fn create_thread(&self, thread_id: &ThreadId, parent_session_id: Option<String>) -> Result<()> {
        let lock = self.lock_for(thread_id);
        let _guard = lock.lock();
        let meta_path = self.meta_path(thread_id);
        if meta_path.exists() {
            return Ok(());
        }
        self.write_meta(&ThreadMeta {
            id: thread_id.clone(),
            parent_session_id,
            created_at: Utc::now(),
        })
    }

    fn append_event(&self, thread_id: &ThreadId, data: EventData) -> Result<ThreadEvent> {
        let lock = self.lock_for(thread_id);
        let _guard = lock.lock();

        if !self.meta_path(thread_id).exists() {
            self.write_meta(&ThreadMeta {
                id: thread_id.clone(),
                parent_session_id: None,
                created_at: Utc::now(),
            })?;
        }

        let event = ThreadEvent::new(thread_id.clone(), data);
        let line = serde_json::to_string(&event)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.events_path(thread_id))
            .map_err(|e| LaceError::Storage(e.to_string()))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .map_err(|e| LaceError::Storage(e.to_string()))?;

        Ok(event)
    }

    fn get_events(&self, thread_id: &ThreadId) -> Result<Vec<ThreadEvent>> {
        let lock = self.lock_for(thread_id);
        let _guard = lock.lock();
        self.read_events_unlocked(thread_id)
    }

    fn get_events_since(&self, thread_id: &ThreadId, event_id: &str) -> Result<Vec<ThreadEvent>> {
        let events = self.get_events(thread_id)?;
        match events.iter().position(|e| e.id == event_id) {
            Some(idx) => Ok(events[idx + 1..].to_vec()),
            None => Ok(events),
        }
    }

    fn get_thread(&self, thread_id: &ThreadId) -> Result<Option<ThreadMeta>> {
        let path = self.meta_path(thread_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn list_threads(&self) -> Result<Vec<ThreadMeta>> {
        let dir = self.data_dir.join("threads");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json")
                && path.to_string_lossy().ends_with(".meta.json")
            {
                let raw = std::fs::read_to_string(&path)?;
                if let Ok(meta) = serde_json::from_str::<ThreadMeta>(&raw) {
                    out.push(meta);
                }
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract_tests;

    fn store() -> (tempfile::TempDir, JsonlThreadStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlThreadStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn satisfies_append_ordering_contract() {
        let (_dir, store) = store();
        contract_tests::append_is_visible_in_order(&store);
    }

    #[test]
    fn satisfies_get_events_since_contract() {
        let (_dir, store) = store();
        contract_tests::get_events_since_excludes_the_given_id(&store);
    }

    #[test]
    fn satisfies_thread_independence_contract() {
        let (_dir, store) = store();
        contract_tests::distinct_threads_are_independent(&store);
    }

    #[test]
    fn events_survive_reopening_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let thread = ThreadId::parse("lace_20250101_gggggg").unwrap();
        {
            let store = JsonlThreadStore::new(dir.path()).unwrap();
            store.create_thread(&thread, None).unwrap();
            store
                .append_event(&thread, EventData::UserMessage { text: "hi".into() })
                .unwrap();
        }
        let reopened = JsonlThreadStore::new(dir.path()).unwrap();
        let events = reopened.get_events(&thread).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn list_threads_returns_created_threads() {
        let (_dir, store) = store();
        let a = ThreadId::parse("lace_20250101_hhhhhh").unwrap();
        let b = ThreadId::parse("lace_20250101_iiiiii").unwrap();
        store.create_thread(&a, None).unwrap();
        store.create_thread(&b, Some("sess".into())).unwrap();
        let threads = store.list_threads().unwrap();
        assert_eq!(threads.len(), 2);
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let (_dir, store) = store();
        let thread = ThreadId::parse("lace_20250101_jjjjjj").unwrap();
        store.create_thread(&thread, None).unwrap();
        store
            .append_event(&thread, EventData::UserMessage { text: "ok".into() })
            .unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(store.events_path(&thread))
            .unwrap();
        file.write_all(b"not json\n").unwrap();
        let events = store.get_events(&thread).unwrap();
        assert_eq!(events.len(), 1);
    }
}
