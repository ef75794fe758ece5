//! Per-thread cancellation tokens with group fan-out, used by
//! [`crate::delegation`] to cascade a parent turn's abort to its children
//! (§4.8, §5).
//!
//! Ported from the teacher's `runtime::cancel::CancelMap` essentially
//! verbatim, keyed by [`ThreadId`] rather than an opaque session-key
//! string, and built on [`lace_domain::cancel::CancelToken`] rather than a
//! crate-local token type.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use lace_domain::cancel::CancelToken;
use lace_domain::ids::ThreadId;

pub struct CancelMap {
    tokens: Mutex<HashMap<ThreadId, CancelToken>>,
    groups: Mutex<HashMap<ThreadId, HashSet<ThreadId>>>,
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelMap {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            groups: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, thread_id: &ThreadId) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(thread_id.clone(), token.clone());
        token
    }

    /// Cancel a running turn for a thread, cascading to every thread
    /// registered in its cancel group. Returns `true` if a token was
    /// found for `thread_id` itself.
    pub fn cancel(&self, thread_id: &ThreadId) -> bool {
        let found = if let Some(token) = self.tokens.lock().get(thread_id) {
            token.cancel();
            true
        } else {
            false
        };

        if let Some(children) = self.groups.lock().get(thread_id) {
            let tokens = self.tokens.lock();
            for child in children {
                if let Some(child_token) = tokens.get(child) {
                    child_token.cancel();
                }
            }
        }

        found
    }

    pub fn remove(&self, thread_id: &ThreadId) {
        self.tokens.lock().remove(thread_id);
        self.groups.lock().remove(thread_id);
    }

    pub fn is_running(&self, thread_id: &ThreadId) -> bool {
        self.tokens.lock().contains_key(thread_id)
    }

    pub fn add_to_group(&self, parent: &ThreadId, child: &ThreadId) {
        self.groups
            .lock()
            .entry(parent.clone())
            .or_default()
            .insert(child.clone());
    }

    pub fn remove_from_group(&self, parent: &ThreadId, child: &ThreadId) {
        let mut groups = self.groups.lock();
        if let Some(children) = groups.get_mut(parent) {
            children.remove(child);
            if children.is_empty() {
                groups.remove(parent);
            }
        }
    }
}
