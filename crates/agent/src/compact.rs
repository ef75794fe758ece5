//! Compaction (§4.9): collapse an old prefix of a thread's event log into
//! a single synthetic summary so provider context stays within budget.
//!
//! Direct, high-fidelity grounding on the teacher's
//! `gateway::runtime::compact` module: `compaction_boundary`,
//! `active_turn_count`, `should_compact`, `split_for_compaction`,
//! `generate_summary`, and the truncate-then-append-marker fallback all
//! carry over, retargeted from `TranscriptLine`/role strings onto typed
//! [`ThreadEvent`]s and their `EventData::Compaction` marker in place of a
//! `metadata.compaction` flag on a freeform transcript line.

use lace_domain::cancel::CancelToken;
use lace_domain::event::{CompactedEvent, EventData, EventType, ThreadEvent};
use lace_domain::ids::ThreadId;
use lace_domain::tool::ToolResultContent;
use lace_providers::traits::Provider;

/// Keep the last two user/assistant exchanges intact across a compaction
/// (an open question in the specification, decided here): `k = 4` active
/// non-system events — counted from the end — are never folded into the
/// summary.
pub const DEFAULT_KEEP_EVENTS: usize = 4;

/// Index of the first event after the most recent `COMPACTION` marker.
/// `0` if no prior compaction has happened.
pub fn compaction_boundary(events: &[ThreadEvent]) -> usize {
    for i in (0..events.len()).rev() {
        if is_compaction_marker(&events[i]) {
            return i + 1;
        }
    }
    0
}

/// Count `USER_MESSAGE` events since the last compaction.
pub fn active_turn_count(events: &[ThreadEvent]) -> usize {
    let start = compaction_boundary(events);
    events[start..]
        .iter()
        .filter(|e| e.event_type() == EventType::UserMessage)
        .count()
}

pub fn should_compact(events: &[ThreadEvent], max_turns: usize) -> bool {
    active_turn_count(events) > max_turns
}

/// Split the active (post-compaction) events into `(to_compact, to_keep)`,
/// keeping the last `keep` events of the active tail untouched.
pub fn split_for_compaction(events: &[ThreadEvent], keep: usize) -> (&[ThreadEvent], &[ThreadEvent]) {
    let start = compaction_boundary(events);
    let active = &events[start..];
    let keep_from = active.len().saturating_sub(keep);
    (&active[..keep_from], &active[keep_from..])
}

/// Ask the provider to summarise a prefix of events, non-streaming, using
/// a dedicated system prompt covering the facets the specification names:
/// goal/plan, decisions, open questions, user facts, and tool/process
/// state.
pub async fn generate_summary(
    provider: &dyn Provider,
    events: &[ThreadEvent],
    cancel: &CancelToken,
) -> lace_domain::error::Result<String> {
    let conversation = build_conversation_text(events);
    let prompt = format!(
        "You are a conversation summarizer. Summarize the following conversation \
         history into a concise summary that preserves:\n\
         1. The current goal or plan being worked on\n\
         2. Key decisions made\n\
         3. Open questions or threads\n\
         4. Important facts learned about the user or context\n\
         5. Tool state (running processes, active calls, pending work)\n\n\
         Be concise but preserve all actionable context. Write in present tense.\n\
         Omit greetings and pleasantries. Focus on substance.\n\n\
         CONVERSATION:\n{conversation}"
    );

    let messages = vec![lace_domain::message::Message::user(prompt)];
    let response = provider.create_response(&messages, &[], cancel).await?;
    Ok(response.content)
}

/// Build the `EventData::Compaction` payload for an original-event-count
/// of `original_event_count` and a single synthetic summary event.
pub fn compaction_event_data(summary: String, original_event_count: usize) -> EventData {
    EventData::Compaction {
        original_event_count,
        compacted_events: vec![CompactedEvent {
            event_type: EventType::AgentMessage,
            text: summary,
        }],
    }
}

/// Run the full compaction flow: split, summarise, append the marker.
/// Best-effort: if summarisation fails, falls back to truncating the
/// oldest events and records them as a marker with an empty summary
/// rather than ending the turn. Returns `None` when there is nothing
/// beyond the keep-window to fold away yet — a marker with
/// `originalEventCount = 0` would still advance `compaction_boundary`
/// past every event preceding it (§3: "a COMPACTION event logically
/// replaces the preceding `originalEventCount` events"), so when that
/// count is genuinely zero the correct marker is no marker at all,
/// leaving the budget check free to see the real shortfall instead of
/// a context window that looks artificially empty.
pub async fn run_compaction(
    provider: &dyn Provider,
    thread_id: &ThreadId,
    events: &[ThreadEvent],
    keep: usize,
    cancel: &CancelToken,
) -> Option<ThreadEvent> {
    let (to_compact, _to_keep) = split_for_compaction(events, keep);

    if to_compact.is_empty() {
        return None;
    }

    let summary = match generate_summary(provider, to_compact, cancel).await {
        Ok(summary) => summary,
        Err(err) => {
            tracing::warn!(thread_id = %thread_id, error = %err, "compaction summarisation failed, truncating instead");
            String::new()
        }
    };

    let event = ThreadEvent::new(
        thread_id.clone(),
        compaction_event_data(summary, to_compact.len()),
    );
    tracing::info!(
        thread_id = %thread_id,
        events_compacted = to_compact.len(),
        "thread compacted"
    );
    Some(event)
}

fn is_compaction_marker(event: &ThreadEvent) -> bool {
    matches!(event.data, EventData::Compaction { .. })
}

fn build_conversation_text(events: &[ThreadEvent]) -> String {
    let mut buf = String::new();
    for event in events {
        let (label, text) = match &event.data {
            EventData::UserMessage { text } => ("User", text.clone()),
            EventData::AgentMessage { text } => ("Assistant", text.clone()),
            EventData::ToolCall { name, arguments, .. } => {
                ("Tool", format!("called {name} with {arguments}"))
            }
            EventData::ToolResult { content, is_error, .. } => {
                let joined = content
                    .iter()
                    .map(|c| match c {
                        ToolResultContent::Text { text } => text.as_str(),
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                (
                    if *is_error { "Tool error" } else { "Tool result" },
                    joined,
                )
            }
            EventData::LocalSystemMessage { text } => ("System", text.clone()),
            EventData::SystemPrompt { text } => ("System", text.clone()),
            EventData::UserSystemPrompt { text } => ("System", text.clone()),
            EventData::Compaction { .. } => continue,
        };
        buf.push_str(label);
        buf.push_str(": ");
        if text.len() > 2000 {
            buf.push_str(&text[..1000]);
            buf.push_str(" [...] ");
            buf.push_str(&text[text.len() - 500..]);
        } else {
            buf.push_str(&text);
        }
        buf.push('\n');
    }
    buf
}
