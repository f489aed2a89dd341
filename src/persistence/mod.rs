//! Collaborator contracts for session persistence and analytics.
//!
//! Both sinks are fire-and-forget from the engine's point of view: they return
//! nothing, must not block, and log their own failures.

pub mod analytics;
pub mod saver;

use crate::session::{SessionSnapshot, TerminalRecord};

pub use analytics::{ChannelAnalytics, LogAnalytics};
pub use saver::SnapshotSaver;

pub trait SessionSink: Send + Sync {
    /// Called after every effective mutation and once more with
    /// `is_final = true` when the session ends. Versions increase by one per
    /// call for a given session.
    fn save(&self, snapshot: SessionSnapshot, version: u64, is_final: bool);
}

pub trait AnalyticsSink: Send + Sync {
    /// Called exactly once per session, on completion or abandonment.
    fn record(&self, record: &TerminalRecord);
}

/// Discards snapshots. Used when a screen runs without storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl SessionSink for NullSink {
    fn save(&self, _snapshot: SessionSnapshot, _version: u64, _is_final: bool) {}
}

impl AnalyticsSink for NullSink {
    fn record(&self, _record: &TerminalRecord) {}
}
