//! Shared types for every Lace crate: the event-sourced data model (§3),
//! the tool and message wire shapes providers and tools agree on, the
//! error taxonomy (§7), layered configuration (§6), and the cancellation
//! primitive used by every suspension point in the concurrency model
//! (§5).

pub mod cancel;
pub mod config;
pub mod error;
pub mod event;
pub mod ids;
pub mod message;
pub mod stream;
pub mod tool;
