//! The thread store: an append-only event log, keyed by thread id, that is
//! the sole source of truth for a conversation.
//!
//! `ThreadStore` is a trait so the agent core never depends on a concrete
//! backend; `MemoryThreadStore` backs tests, `JsonlThreadStore` is the
//! default on-disk implementation, grounded on the teacher's append-only
//! transcript writer (`transcript::TranscriptWriter`).

pub mod jsonl;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lace_domain::error::Result;
use lace_domain::event::{EventData, ThreadEvent};
use lace_domain::ids::ThreadId;

pub use jsonl::JsonlThreadStore;
pub use memory::MemoryThreadStore;

/// Metadata about a thread, independent of its events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMeta {
    pub id: ThreadId,
    /// The session a root thread was started from, if the host tracks one.
    /// Child threads created by delegation carry their parent's lineage in
    /// the id itself and do not need this field.
    pub parent_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The append-only event log. Every method is synchronous: durable writes
/// here are local-disk (or in-memory) operations, not network calls, so the
/// agent calls them directly rather than `.await`ing them — the same
/// choice the teacher's `SessionStore`/`TranscriptWriter` make.
pub trait ThreadStore: Send + Sync {
    /// Register a new thread. Idempotent: re-creating an already-known
    /// thread id is a no-op rather than an error, so callers can always
    /// call this before appending without checking existence first.
    fn create_thread(&self, thread_id: &ThreadId, parent_session_id: Option<String>) -> Result<()>;

    /// Atomically append an event and return the fully populated record.
    /// Implicitly creates the thread if it does not exist yet.
    fn append_event(&self, thread_id: &ThreadId, data: EventData) -> Result<ThreadEvent>;

    /// All events for a thread, in append order.
    fn get_events(&self, thread_id: &ThreadId) -> Result<Vec<ThreadEvent>>;

    /// Events appended after (not including) `event_id`. Used by observers
    /// tailing a thread; `event_id` not found yields the full sequence
    /// (the observer has nothing cached yet).
    fn get_events_since(&self, thread_id: &ThreadId, event_id: &str) -> Result<Vec<ThreadEvent>>;

    fn get_thread(&self, thread_id: &ThreadId) -> Result<Option<ThreadMeta>>;

    fn list_threads(&self) -> Result<Vec<ThreadMeta>>;

    /// Release any resources held by the store. A no-op for in-memory
    /// implementations.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}
