//! The append-only event log's record type.
//!
//! A `ThreadEvent` is immutable once appended. `EventData` is a closed,
//! tagged union keyed by `EventType` rather than an open polymorphic
//! payload — new event kinds are added here, not registered at runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::ThreadId;
use crate::tool::{ToolResultContent, ToolResultMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    UserMessage,
    AgentMessage,
    ToolCall,
    ToolResult,
    LocalSystemMessage,
    SystemPrompt,
    UserSystemPrompt,
    Compaction,
}

/// The type-discriminated payload of a `ThreadEvent`. The variant name
/// matches the corresponding `EventType`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventData {
    #[serde(rename = "USER_MESSAGE")]
    UserMessage { text: String },

    #[serde(rename = "AGENT_MESSAGE")]
    AgentMessage { text: String },

    #[serde(rename = "TOOL_CALL")]
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },

    #[serde(rename = "TOOL_RESULT")]
    ToolResult {
        /// Equals the originating `TOOL_CALL`'s `id`.
        id: String,
        content: Vec<ToolResultContent>,
        is_error: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<ToolResultMetadata>,
    },

    #[serde(rename = "LOCAL_SYSTEM_MESSAGE")]
    LocalSystemMessage { text: String },

    #[serde(rename = "SYSTEM_PROMPT")]
    SystemPrompt { text: String },

    #[serde(rename = "USER_SYSTEM_PROMPT")]
    UserSystemPrompt { text: String },

    #[serde(rename = "COMPACTION")]
    Compaction {
        original_event_count: usize,
        /// Synthetic events that replace the compacted prefix; in
        /// practice a single `AGENT_MESSAGE` carrying the summary.
        compacted_events: Vec<CompactedEvent>,
    },
}

/// A synthetic event embedded in a `COMPACTION` record. Kept minimal
/// (text only) since compaction only ever produces summary text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactedEvent {
    pub event_type: EventType,
    pub text: String,
}

impl EventData {
    pub fn event_type(&self) -> EventType {
        match self {
            EventData::UserMessage { .. } => EventType::UserMessage,
            EventData::AgentMessage { .. } => EventType::AgentMessage,
            EventData::ToolCall { .. } => EventType::ToolCall,
            EventData::ToolResult { .. } => EventType::ToolResult,
            EventData::LocalSystemMessage { .. } => EventType::LocalSystemMessage,
            EventData::SystemPrompt { .. } => EventType::SystemPrompt,
            EventData::UserSystemPrompt { .. } => EventType::UserSystemPrompt,
            EventData::Compaction { .. } => EventType::Compaction,
        }
    }
}

/// An immutable record appended to a thread's event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadEvent {
    pub id: String,
    pub thread_id: ThreadId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub data: EventData,
}

impl ThreadEvent {
    /// Build a fully populated event ready to be handed to a store. The
    /// store is responsible for assigning monotonic-per-thread ordering;
    /// this constructor only fixes identity and payload.
    pub fn new(thread_id: ThreadId, data: EventData) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            thread_id,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.data.event_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let thread = ThreadId::parse("lace_20250101_aaaaaa").unwrap();
        let event = ThreadEvent::new(
            thread,
            EventData::UserMessage {
                text: "hello".into(),
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: ThreadEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.thread_id, event.thread_id);
        assert_eq!(back.event_type(), EventType::UserMessage);
    }

    #[test]
    fn tool_result_id_matches_tool_call_id_by_convention() {
        let thread = ThreadId::parse("lace_20250101_aaaaaa").unwrap();
        let call = ThreadEvent::new(
            thread.clone(),
            EventData::ToolCall {
                id: "c1".into(),
                name: "echo".into(),
                arguments: serde_json::json!({}),
            },
        );
        let result = ThreadEvent::new(
            thread,
            EventData::ToolResult {
                id: "c1".into(),
                content: vec![ToolResultContent::Text { text: "ok".into() }],
                is_error: false,
                metadata: None,
            },
        );
        let EventData::ToolCall { id: call_id, .. } = &call.data else {
            unreachable!()
        };
        let EventData::ToolResult { id: result_id, .. } = &result.data else {
            unreachable!()
        };
        assert_eq!(call_id, result_id);
    }
}
