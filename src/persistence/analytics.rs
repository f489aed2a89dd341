use log::{error, info};
use tokio::sync::mpsc;

use crate::session::TerminalRecord;

use super::AnalyticsSink;

/// Writes terminal records to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAnalytics;

impl AnalyticsSink for LogAnalytics {
    fn record(&self, record: &TerminalRecord) {
        info!(
            "Session {} ({}) ended {}: pre={:?} post={:?} active={}s triggers={}",
            record.session_id,
            record.config_id,
            record.status,
            record.pre_rating,
            record.post_rating,
            record.total_duration,
            record.triggers.len()
        );
    }
}

/// Forwards terminal records to an async consumer (event transport, insights).
#[derive(Debug, Clone)]
pub struct ChannelAnalytics {
    sender: mpsc::UnboundedSender<TerminalRecord>,
}

impl ChannelAnalytics {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TerminalRecord>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl AnalyticsSink for ChannelAnalytics {
    fn record(&self, record: &TerminalRecord) {
        if let Err(err) = self.sender.send(record.clone()) {
            error!(
                "Analytics consumer gone; dropping record for session {}",
                err.0.session_id
            );
        }
    }
}
